//! Single-authority membership registry.
//!
//! [`Registry`] is a cheap, cloneable handle to one background worker that
//! owns the membership index: every connected client by id, and every
//! scene's set of clients. Handles submit requests on a single ordered
//! queue and wait on a dedicated one-shot reply, so admit, remove and
//! broadcast are executed one at a time in arrival order and no lock is
//! ever taken on the index.
//!
//! # Invariants
//!
//! - A client is in its scene's member set iff it is in the global map.
//! - A scene key exists only while it has at least one member.
//! - Broadcast only enqueues on each member's outbound queue; it never
//!   waits on a slow member and never writes to a socket.
//! - A member found disconnected during a broadcast is dropped from the
//!   index on the spot.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use utoipa::ToSchema;

use super::client::{ClientHandle, DeliveryError, Frame};
use super::{ClientId, SceneId};
use crate::error::RelayError;

/// Result of an admit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// The client is now registered.
    Admitted,
    /// Another live client already holds this id; nothing changed.
    DuplicateId,
}

/// One failed delivery during a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastFailure {
    /// The client that could not be reached, `None` when the scene itself
    /// was not found.
    pub client_id: Option<ClientId>,
    /// What went wrong.
    pub reason: DeliveryError,
}

/// Snapshot of the index sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RegistryStats {
    /// Connected clients across all scenes.
    pub clients: usize,
    /// Scenes with at least one connected client.
    pub scenes: usize,
}

#[derive(Debug)]
enum Request {
    Admit {
        client: ClientHandle,
        reply: oneshot::Sender<AdmitOutcome>,
    },
    Remove {
        client: ClientHandle,
        reply: oneshot::Sender<bool>,
    },
    Broadcast {
        scene_id: SceneId,
        frame: Frame,
        reply: oneshot::Sender<Vec<BroadcastFailure>>,
    },
    Greet {
        client: ClientHandle,
        frame: Frame,
        reply: oneshot::Sender<bool>,
    },
    Stats {
        reply: oneshot::Sender<RegistryStats>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the registry worker.
#[derive(Debug, Clone)]
pub struct Registry {
    requests: mpsc::Sender<Request>,
}

impl Registry {
    /// Spawns the worker on the current tokio runtime and returns a handle.
    ///
    /// `queue_capacity` bounds the number of requests waiting for the
    /// worker; callers beyond it wait for room, preserving arrival order.
    #[must_use]
    pub fn spawn(queue_capacity: usize) -> Self {
        let (requests, queue) = mpsc::channel(queue_capacity.max(1));
        tokio::spawn(run_worker(Membership::default(), queue));
        Self { requests }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, RelayError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| RelayError::RegistryUnavailable)?;
        response.await.map_err(|_| RelayError::RegistryUnavailable)
    }

    /// Registers a client under its id and scene.
    ///
    /// Once this returns [`AdmitOutcome::Admitted`], every broadcast queued
    /// afterwards reaches the client.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RegistryUnavailable`] after shutdown.
    pub async fn admit(&self, client: ClientHandle) -> Result<AdmitOutcome, RelayError> {
        self.call(|reply| Request::Admit { client, reply }).await
    }

    /// Deregisters a client. Removing an absent client is a no-op; returns
    /// whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RegistryUnavailable`] after shutdown.
    pub async fn remove(&self, client: &ClientHandle) -> Result<bool, RelayError> {
        let client = client.clone();
        self.call(|reply| Request::Remove { client, reply }).await
    }

    /// Queues `frame` for every client of `scene_id` and returns the
    /// per-client failures (empty when all deliveries were queued).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RegistryUnavailable`] after shutdown.
    pub async fn broadcast(
        &self,
        scene_id: SceneId,
        frame: Frame,
    ) -> Result<Vec<BroadcastFailure>, RelayError> {
        self.call(|reply| Request::Broadcast {
            scene_id,
            frame,
            reply,
        })
        .await
    }

    /// Queues `frame` for `client` only if no broadcast has reached it yet.
    /// Returns whether the frame was queued.
    ///
    /// The check and the enqueue run on the worker, so no broadcast can land
    /// between them.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RegistryUnavailable`] after shutdown.
    pub async fn greet(&self, client: &ClientHandle, frame: Frame) -> Result<bool, RelayError> {
        let client = client.clone();
        self.call(|reply| Request::Greet {
            client,
            frame,
            reply,
        })
        .await
    }

    /// Returns the current index sizes.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RegistryUnavailable`] after shutdown.
    pub async fn stats(&self) -> Result<RegistryStats, RelayError> {
        self.call(|reply| Request::Stats { reply }).await
    }

    /// Stops the worker. Every registered handle is dropped, which closes
    /// each outbound queue once replay is done with it and makes the
    /// connections send a close frame.
    /// Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        match self.call(|reply| Request::Shutdown { reply }).await {
            Ok(()) => tracing::info!("registry shut down"),
            Err(_) => tracing::debug!("registry already shut down"),
        }
    }
}

async fn run_worker(mut membership: Membership, mut queue: mpsc::Receiver<Request>) {
    tracing::debug!("registry worker started");
    while let Some(request) = queue.recv().await {
        match request {
            Request::Admit { client, reply } => {
                let _ = reply.send(membership.admit(client));
            }
            Request::Remove { client, reply } => {
                let _ = reply.send(membership.remove(&client));
            }
            Request::Broadcast {
                scene_id,
                frame,
                reply,
            } => {
                let _ = reply.send(membership.broadcast(&scene_id, &frame));
            }
            Request::Greet {
                client,
                frame,
                reply,
            } => {
                let queued = !client.has_live_frames() && client.try_deliver(frame).is_ok();
                let _ = reply.send(queued);
            }
            Request::Stats { reply } => {
                let _ = reply.send(membership.stats());
            }
            Request::Shutdown { reply } => {
                let stats = membership.stats();
                membership = Membership::default();
                queue.close();
                tracing::debug!(
                    clients = stats.clients,
                    scenes = stats.scenes,
                    "registry dropped all clients"
                );
                let _ = reply.send(());
                break;
            }
        }
    }
    drop(membership);
    tracing::debug!("registry worker stopped");
}

/// The membership index. Only ever touched by the worker task.
#[derive(Debug, Default)]
struct Membership {
    clients: HashMap<ClientId, ClientHandle>,
    scenes: HashMap<SceneId, HashMap<ClientId, ClientHandle>>,
}

impl Membership {
    fn admit(&mut self, client: ClientHandle) -> AdmitOutcome {
        let Entry::Vacant(slot) = self.clients.entry(client.id().clone()) else {
            tracing::debug!(client_id = %client.id(), "admit refused: id in use");
            return AdmitOutcome::DuplicateId;
        };
        self.scenes
            .entry(client.scene_id().clone())
            .or_default()
            .insert(client.id().clone(), client.clone());
        tracing::debug!(client_id = %client.id(), scene_id = %client.scene_id(), "client admitted");
        slot.insert(client);
        AdmitOutcome::Admitted
    }

    fn remove(&mut self, client: &ClientHandle) -> bool {
        // Only the registered handle may remove itself; a stale handle that
        // shares an id with a newer client is ignored.
        match self.clients.get(client.id()) {
            Some(registered) if registered.same_client(client) => {}
            _ => return false,
        }
        self.clients.remove(client.id());
        if let Entry::Occupied(mut members) = self.scenes.entry(client.scene_id().clone()) {
            members.get_mut().remove(client.id());
            if members.get().is_empty() {
                members.remove();
            }
        }
        tracing::debug!(client_id = %client.id(), scene_id = %client.scene_id(), "client removed");
        true
    }

    fn broadcast(&mut self, scene_id: &SceneId, frame: &Frame) -> Vec<BroadcastFailure> {
        let Some(members) = self.scenes.get(scene_id) else {
            return vec![BroadcastFailure {
                client_id: None,
                reason: DeliveryError::SceneNotFound(scene_id.clone()),
            }];
        };
        let mut gone = Vec::new();
        let failures: Vec<BroadcastFailure> = members
            .values()
            .filter_map(|client| {
                let reason = client.try_deliver(frame.clone()).err()?;
                if reason == DeliveryError::Disconnected {
                    gone.push(client.clone());
                }
                Some(BroadcastFailure {
                    client_id: Some(client.id().clone()),
                    reason,
                })
            })
            .collect();
        // A member whose queue receiver is gone can never be reached again.
        for client in &gone {
            self.remove(client);
        }
        failures
    }

    fn stats(&self) -> RegistryStats {
        RegistryStats {
            clients: self.clients.len(),
            scenes: self.scenes.len(),
        }
    }

    #[cfg(test)]
    fn members(&self, scene_id: &SceneId) -> Option<usize> {
        self.scenes.get(scene_id).map(HashMap::len)
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let indexed: usize = self.scenes.values().map(HashMap::len).sum();
        indexed == self.clients.len()
            && self.scenes.values().all(|members| !members.is_empty())
            && self.clients.values().all(|client| {
                self.scenes
                    .get(client.scene_id())
                    .is_some_and(|members| members.contains_key(client.id()))
            })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use tokio::sync::mpsc::Receiver;

    use super::*;

    fn scene(raw: &str) -> SceneId {
        let Ok(id) = SceneId::parse(raw) else {
            panic!("bad scene id {raw}");
        };
        id
    }

    fn client(raw: &str, scene_raw: &str) -> (ClientHandle, Receiver<Frame>) {
        let Ok(id) = ClientId::parse(raw) else {
            panic!("bad client id {raw}");
        };
        ClientHandle::channel(id, scene(scene_raw), 8)
    }

    #[test]
    fn admit_indexes_both_maps() {
        let mut index = Membership::default();
        let (a, _qa) = client("aaaaaa", "scene1");
        assert_eq!(index.admit(a), AdmitOutcome::Admitted);
        assert_eq!(index.members(&scene("scene1")), Some(1));
        assert!(index.is_consistent());
    }

    #[test]
    fn duplicate_id_is_refused() {
        let mut index = Membership::default();
        let (a, _qa) = client("aaaaaa", "scene1");
        let (b, _qb) = client("aaaaaa", "scene2");
        assert_eq!(index.admit(a), AdmitOutcome::Admitted);
        assert_eq!(index.admit(b), AdmitOutcome::DuplicateId);
        assert_eq!(index.members(&scene("scene2")), None);
        assert!(index.is_consistent());
    }

    #[test]
    fn removing_last_member_drops_scene() {
        let mut index = Membership::default();
        let (a, _qa) = client("aaaaaa", "scene1");
        let (b, _qb) = client("bbbbbb", "scene1");
        index.admit(a.clone());
        index.admit(b.clone());

        assert!(index.remove(&a));
        assert_eq!(index.members(&scene("scene1")), Some(1));
        assert!(index.is_consistent());

        assert!(index.remove(&b));
        assert_eq!(index.members(&scene("scene1")), None);
        assert!(index.is_consistent());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut index = Membership::default();
        let (a, _qa) = client("aaaaaa", "scene1");
        index.admit(a.clone());
        assert!(index.remove(&a));
        assert!(!index.remove(&a));
        assert_eq!(index.stats(), RegistryStats::default());
    }

    #[test]
    fn stale_handle_cannot_remove_newer_client() {
        let mut index = Membership::default();
        let (old, _qo) = client("aaaaaa", "scene1");
        let (new, _qn) = client("aaaaaa", "scene1");
        index.admit(new);
        assert!(!index.remove(&old));
        assert_eq!(index.members(&scene("scene1")), Some(1));
    }

    #[test]
    fn broadcast_to_unknown_scene_reports_one_failure() {
        let mut index = Membership::default();
        let failures = index.broadcast(&scene("nobody"), &Frame::from("{}"));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].client_id, None);
        assert_eq!(
            failures[0].reason,
            DeliveryError::SceneNotFound(scene("nobody"))
        );
    }

    #[test]
    fn broadcast_collects_partial_failures() {
        let mut index = Membership::default();
        let (a, mut qa) = client("aaaaaa", "scene1");
        let (b, qb) = client("bbbbbb", "scene1");
        let (c, mut qc) = client("cccccc", "scene1");
        let (other, mut q_other) = client("dddddd", "scene2");
        for handle in [a, b.clone(), c, other] {
            index.admit(handle);
        }
        drop(qb);

        let failures = index.broadcast(&scene("scene1"), &Frame::from("hello"));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].client_id.as_ref(), Some(b.id()));
        assert_eq!(failures[0].reason, DeliveryError::Disconnected);

        assert_eq!(qa.try_recv().ok().as_ref().map(Frame::as_str), Some("hello"));
        assert_eq!(qc.try_recv().ok().as_ref().map(Frame::as_str), Some("hello"));
        assert!(q_other.try_recv().is_err());

        assert_eq!(index.members(&scene("scene1")), Some(2));
        assert!(index.is_consistent());
    }

    #[test]
    fn broadcast_does_not_wait_on_slow_reader() {
        let mut index = Membership::default();
        let Ok(id) = ClientId::parse("slowww") else {
            panic!("bad id");
        };
        let (slow, _q_slow) = ClientHandle::channel(id, scene("scene1"), 1);
        let (fast, mut q_fast) = client("fastaa", "scene1");
        index.admit(slow);
        index.admit(fast);

        assert!(index.broadcast(&scene("scene1"), &Frame::from("1")).is_empty());
        let failures = index.broadcast(&scene("scene1"), &Frame::from("2"));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].reason, DeliveryError::QueueFull);

        assert_eq!(q_fast.try_recv().ok().as_ref().map(Frame::as_str), Some("1"));
        assert_eq!(q_fast.try_recv().ok().as_ref().map(Frame::as_str), Some("2"));
    }

    #[tokio::test]
    async fn worker_round_trip() {
        let registry = Registry::spawn(16);
        let (a, mut qa) = client("aaaaaa", "scene1");

        let Ok(outcome) = registry.admit(a.clone()).await else {
            panic!("admit failed");
        };
        assert_eq!(outcome, AdmitOutcome::Admitted);
        assert!(matches!(registry.stats().await, Ok(stats) if stats.clients == 1));

        let Ok(failures) = registry.broadcast(scene("scene1"), Frame::from("x")).await else {
            panic!("broadcast failed");
        };
        assert!(failures.is_empty());
        assert_eq!(qa.recv().await.as_ref().map(Frame::as_str), Some("x"));

        assert!(matches!(registry.remove(&a).await, Ok(true)));
        assert!(matches!(registry.remove(&a).await, Ok(false)));
        assert!(matches!(
            registry.stats().await,
            Ok(RegistryStats {
                clients: 0,
                scenes: 0
            })
        ));
    }

    #[tokio::test]
    async fn greet_is_skipped_after_live_traffic() {
        let registry = Registry::spawn(16);
        let (quiet, mut q_quiet) = client("quiet1", "scene1");
        assert!(matches!(registry.greet(&quiet, Frame::from("hello")).await, Ok(true)));
        assert_eq!(q_quiet.recv().await.as_ref().map(Frame::as_str), Some("hello"));

        let (busy, mut q_busy) = client("busy01", "scene2");
        assert!(matches!(registry.admit(busy.clone()).await, Ok(AdmitOutcome::Admitted)));
        let _ = registry.broadcast(scene("scene2"), Frame::from("live")).await;
        assert!(matches!(registry.greet(&busy, Frame::from("hello")).await, Ok(false)));
        assert_eq!(q_busy.recv().await.as_ref().map(Frame::as_str), Some("live"));
        assert!(q_busy.try_recv().is_err());
    }

    #[tokio::test]
    async fn concurrent_operations_linearize() {
        let registry = Registry::spawn(4);
        let (c1, _q1) = client("client", "scene1");
        let (c2, _q2) = client("clien2", "scene1");

        let admit_first = registry.admit(c1.clone()).await;
        assert!(matches!(admit_first, Ok(AdmitOutcome::Admitted)));

        let (r_admit, r_remove) = tokio::join!(registry.admit(c2.clone()), registry.remove(&c1));
        assert!(matches!(r_admit, Ok(AdmitOutcome::Admitted)));
        assert!(matches!(r_remove, Ok(true)));

        // c1's id is free again, c2's is still held.
        let (again, _q3) = client("client", "scene2");
        assert!(matches!(registry.admit(again).await, Ok(AdmitOutcome::Admitted)));
        let (dup, _q4) = client("clien2", "scene2");
        assert!(matches!(registry.admit(dup).await, Ok(AdmitOutcome::DuplicateId)));
        assert!(matches!(
            registry.stats().await,
            Ok(RegistryStats {
                clients: 2,
                scenes: 2
            })
        ));
    }

    #[tokio::test]
    async fn many_tasks_keep_index_consistent() {
        let registry = Registry::spawn(8);
        let mut tasks = Vec::new();
        let mut queues = Vec::new();
        for n in 0..32 {
            let Ok(id) = ClientId::parse(&format!("cli{n:03}")) else {
                panic!("bad id");
            };
            let scene_id = if n % 2 == 0 { scene("evenss") } else { scene("oddsss") };
            let (handle, queue) = ClientHandle::channel(id, scene_id, 8);
            queues.push(queue);
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let admitted = registry.admit(handle.clone()).await;
                if n % 4 == 0 {
                    let _ = registry.remove(&handle).await;
                }
                admitted
            }));
        }
        for task in tasks {
            let Ok(Ok(outcome)) = task.await else {
                panic!("task failed");
            };
            assert_eq!(outcome, AdmitOutcome::Admitted);
        }
        let Ok(stats) = registry.stats().await else {
            panic!("stats failed");
        };
        assert_eq!(stats.clients, 24);
        assert_eq!(stats.scenes, 2);
    }

    #[tokio::test]
    async fn shutdown_closes_client_queues() {
        let registry = Registry::spawn(4);
        let (a, mut qa) = client("aaaaaa", "scene1");
        let _ = registry.admit(a.clone()).await;
        drop(a);

        registry.shutdown().await;
        assert_eq!(qa.recv().await, None);
        assert!(matches!(
            registry.stats().await,
            Err(RelayError::RegistryUnavailable)
        ));
        registry.shutdown().await;
    }
}
