//! Registry-side handle of one connected client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendError, TrySendError};

use super::{ClientId, SceneId};

/// One encoded text frame waiting on a client's outbound queue.
pub type Frame = Utf8Bytes;

/// Why a frame could not be queued for a client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Broadcast target scene has no connected clients.
    #[error("scene {0} not found")]
    SceneNotFound(SceneId),
    /// The client's outbound queue is at capacity (slow reader).
    #[error("outbound queue full")]
    QueueFull,
    /// The client's outbound loop has stopped.
    #[error("connection closed")]
    Disconnected,
}

/// Handle to a client's outbound queue plus its identity.
///
/// The connection's outbound loop owns the receiving end; every byte sent
/// to the peer goes through this queue, so broadcasts never touch the
/// socket directly. Dropping the last handle closes the queue, which the
/// outbound loop treats as a shutdown signal.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    scene_id: SceneId,
    outbound: mpsc::Sender<Frame>,
    live: Arc<AtomicBool>,
}

impl ClientHandle {
    /// Creates a handle together with the receiving end of its queue.
    #[must_use]
    pub fn channel(
        id: ClientId,
        scene_id: SceneId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (outbound, queue) = mpsc::channel(capacity.max(1));
        (
            Self {
                id,
                scene_id,
                outbound,
                live: Arc::new(AtomicBool::new(false)),
            },
            queue,
        )
    }

    /// The client's connection identifier.
    #[must_use]
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// The scene the client is bound to for its whole lifetime.
    #[must_use]
    pub fn scene_id(&self) -> &SceneId {
        &self.scene_id
    }

    /// Queues a live frame without waiting. A frame queued here marks the
    /// client as having seen live traffic.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::QueueFull`] if the reader is behind,
    /// [`DeliveryError::Disconnected`] if the outbound loop is gone.
    pub fn try_deliver(&self, frame: Frame) -> Result<(), DeliveryError> {
        self.outbound.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Disconnected,
        })?;
        self.live.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Returns `true` once any live frame has been queued for this client.
    #[must_use]
    pub fn has_live_frames(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    /// Queues a frame, waiting for capacity.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::Disconnected`] if the outbound loop is gone.
    pub async fn deliver(&self, frame: Frame) -> Result<(), DeliveryError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|SendError(_)| DeliveryError::Disconnected)
    }

    /// Returns `true` if both handles feed the same outbound queue.
    #[must_use]
    pub fn same_client(&self, other: &Self) -> bool {
        self.outbound.same_channel(&other.outbound)
    }

    /// Returns a reference that does not keep the outbound queue open.
    #[must_use]
    pub fn downgrade(&self) -> ClientRef {
        ClientRef {
            id: self.id.clone(),
            scene_id: self.scene_id.clone(),
            outbound: self.outbound.downgrade(),
            live: Arc::clone(&self.live),
        }
    }
}

/// Weak counterpart of [`ClientHandle`], held by the connection itself.
///
/// Once every strong handle is gone the queue closes and [`ClientRef::upgrade`]
/// returns `None`.
#[derive(Debug, Clone)]
pub struct ClientRef {
    id: ClientId,
    scene_id: SceneId,
    outbound: mpsc::WeakSender<Frame>,
    live: Arc<AtomicBool>,
}

impl ClientRef {
    /// The client's connection identifier.
    #[must_use]
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// The scene the client is bound to.
    #[must_use]
    pub fn scene_id(&self) -> &SceneId {
        &self.scene_id
    }

    /// Recovers a strong handle if the queue is still open.
    #[must_use]
    pub fn upgrade(&self) -> Option<ClientHandle> {
        self.outbound.upgrade().map(|outbound| ClientHandle {
            id: self.id.clone(),
            scene_id: self.scene_id.clone(),
            outbound,
            live: Arc::clone(&self.live),
        })
    }
}
