//! WebSocket connection lifecycle.
//!
//! Each listening client gets two tasks: the outbound loop owns the write
//! half and drains the client's outbound queue, interleaving liveness
//! pings; the inbound loop owns the read half and only watches for pongs,
//! peer closure and read errors. Whichever loop stops first triggers
//! teardown of the whole connection.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::{Instant, MissedTickBehavior};

use crate::domain::{ClientHandle, ClientRef, Frame};
use crate::service::RelayService;

/// Per-connection timing and size limits.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Deadline for writing one frame to the peer.
    pub write_timeout: Duration,
    /// Interval between liveness pings.
    pub ping_interval: Duration,
    /// How long a read may stay silent before the peer is considered gone.
    /// Must exceed `ping_interval`.
    pub pong_timeout: Duration,
    /// Largest accepted inbound message, in bytes.
    pub max_message_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(1),
            ping_interval: Duration::from_secs(1),
            pong_timeout: Duration::from_secs(5),
            max_message_size: 32,
        }
    }
}

/// Lifecycle of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Admitted, upgrade not yet complete.
    Connecting,
    /// Both loops running.
    Active,
    /// One loop stopped; teardown in progress.
    Closing,
    /// Deregistered and socket released.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Active)
                | (Self::Connecting, Self::Closing)
                | (Self::Active, Self::Closing)
                | (Self::Closing, Self::Closed)
        )
    }
}

/// Why a connection loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Outbound queue closed; a close frame was sent.
    QueueClosed,
    /// A write to the peer failed.
    WriteFailed,
    /// A write to the peer missed its deadline.
    WriteTimedOut,
    /// The peer sent a close frame or the stream ended.
    PeerClosed,
    /// A read failed, including oversized messages.
    ReadFailed,
    /// Nothing was read within the pong timeout.
    ReadTimedOut,
    /// Replaying cached objects to the client failed.
    ReplayFailed,
    /// A loop task panicked or was cancelled.
    TaskFailed,
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::QueueClosed => "outbound queue closed",
            Self::WriteFailed => "write failed",
            Self::WriteTimedOut => "write timed out",
            Self::PeerClosed => "peer closed",
            Self::ReadFailed => "read failed",
            Self::ReadTimedOut => "read timed out",
            Self::ReplayFailed => "replay failed",
            Self::TaskFailed => "task failed",
        };
        f.write_str(reason)
    }
}

async fn timed_send<S>(sink: &mut S, message: Message, deadline: Duration) -> Result<(), LoopExit>
where
    S: Sink<Message> + Unpin,
{
    match tokio::time::timeout(deadline, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(LoopExit::WriteFailed),
        Err(_) => Err(LoopExit::WriteTimedOut),
    }
}

/// Drains `queue` into `sink`, sending a ping every `ping_interval`.
///
/// Every write is bounded by `write_timeout`. When the queue closes a
/// close frame is sent and the loop returns [`LoopExit::QueueClosed`].
pub async fn outbound_loop<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Frame>,
    settings: ConnectionSettings,
) -> LoopExit
where
    S: Sink<Message> + Unpin,
{
    let mut ticker = tokio::time::interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            frame = queue.recv() => match frame {
                Some(frame) => Message::Text(frame),
                None => {
                    let _ = timed_send(&mut sink, Message::Close(None), settings.write_timeout).await;
                    return LoopExit::QueueClosed;
                }
            },
            _ = ticker.tick() => Message::Ping(Bytes::new()),
        };
        if let Err(exit) = timed_send(&mut sink, message, settings.write_timeout).await {
            return exit;
        }
    }
}

/// Reads and discards inbound messages until the peer goes away.
///
/// The read deadline is refreshed by every message, pongs included.
pub async fn inbound_loop<R, E>(mut stream: R, settings: ConnectionSettings) -> LoopExit
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    loop {
        match tokio::time::timeout(settings.pong_timeout, stream.next()).await {
            Err(_) => return LoopExit::ReadTimedOut,
            Ok(None | Some(Ok(Message::Close(_)))) => return LoopExit::PeerClosed,
            Ok(Some(Err(err))) => {
                tracing::debug!(error = %err, "websocket read failed");
                return LoopExit::ReadFailed;
            }
            Ok(Some(Ok(_))) => {}
        }
    }
}

fn advance(client: &ClientRef, state: &mut ConnectionState, next: ConnectionState) {
    if state.can_transition_to(next) {
        tracing::trace!(client_id = %client.id(), from = ?*state, to = ?next, "connection state");
        *state = next;
    }
}

fn joined(result: Result<LoopExit, JoinError>) -> LoopExit {
    result.unwrap_or(LoopExit::TaskFailed)
}

/// Runs one admitted client's connection to completion.
///
/// Replays the scene's cached objects concurrently with both loops, so a
/// large replay is throttled by the outbound queue instead of blocking
/// the connection. Once replay is done the registry holds the only strong
/// handle, so dropping it from the registry closes the queue. Teardown
/// deregisters the client and then drops both socket halves.
pub async fn run_connection(
    socket: WebSocket,
    client: ClientHandle,
    queue: mpsc::Receiver<Frame>,
    relay: Arc<RelayService>,
    settings: ConnectionSettings,
) {
    let mut state = ConnectionState::Connecting;
    let detached = client.downgrade();
    let (sink, stream) = socket.split();

    let mut outbound = tokio::spawn(outbound_loop(sink, queue, settings));
    let mut inbound = tokio::spawn(inbound_loop(stream, settings));
    let mut replay = {
        let relay = Arc::clone(&relay);
        tokio::spawn(async move { relay.replay_to(&client).await })
    };
    advance(&detached, &mut state, ConnectionState::Active);

    let mut replay_pending = true;
    let exit = loop {
        tokio::select! {
            exit = &mut outbound => break joined(exit),
            exit = &mut inbound => break joined(exit),
            replayed = &mut replay, if replay_pending => {
                replay_pending = false;
                match replayed {
                    Ok(Ok(frames)) => {
                        tracing::debug!(client_id = %detached.id(), frames, "replay complete");
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(client_id = %detached.id(), scene_id = %detached.scene_id(), error = %err, "replay failed");
                        break LoopExit::ReplayFailed;
                    }
                    Err(err) => {
                        tracing::warn!(client_id = %detached.id(), error = %err, "replay task failed");
                        break LoopExit::ReplayFailed;
                    }
                }
            }
        }
    };
    advance(&detached, &mut state, ConnectionState::Closing);
    tracing::info!(client_id = %detached.id(), scene_id = %detached.scene_id(), reason = %exit, "closing connection");

    replay.abort();
    relay.release_detached(&detached).await;
    outbound.abort();
    inbound.abort();
    advance(&detached, &mut state, ConnectionState::Closed);
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::io;
    use std::pin::Pin;

    use futures_util::stream;

    use super::*;

    fn settings(ping_interval: Duration) -> ConnectionSettings {
        ConnectionSettings {
            write_timeout: Duration::from_millis(50),
            ping_interval,
            pong_timeout: Duration::from_millis(100),
            max_message_size: 32,
        }
    }

    type BoxSink = Pin<Box<dyn Sink<Message, Error = io::Error> + Send>>;

    fn failing_sink() -> BoxSink {
        Box::pin(futures_util::sink::unfold((), |(), _msg: Message| async {
            Err::<(), _>(io::Error::other("broken pipe"))
        }))
    }

    fn stalled_sink() -> BoxSink {
        Box::pin(futures_util::sink::unfold((), |(), _msg: Message| {
            std::future::pending::<Result<(), io::Error>>()
        }))
    }

    #[test]
    fn state_transitions() {
        use ConnectionState::*;
        assert!(Connecting.can_transition_to(Active));
        assert!(Active.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Active));
        assert!(!Active.can_transition_to(Connecting));
        assert!(!Active.can_transition_to(Closed));
    }

    #[tokio::test]
    async fn outbound_writes_in_order_then_closes() {
        let (tx, queue) = mpsc::channel(8);
        let _ = tx.send(Frame::from("a")).await;
        let _ = tx.send(Frame::from("b")).await;
        drop(tx);

        let mut written: Vec<Message> = Vec::new();
        let exit = outbound_loop(&mut written, queue, settings(Duration::from_secs(3600))).await;
        assert_eq!(exit, LoopExit::QueueClosed);

        let [Message::Text(a), Message::Text(b), Message::Close(None)] = written.as_slice() else {
            panic!("unexpected frames: {written:?}");
        };
        assert_eq!(a.as_str(), "a");
        assert_eq!(b.as_str(), "b");
    }

    #[tokio::test]
    async fn outbound_sends_periodic_pings() {
        let (_tx, queue) = mpsc::channel::<Frame>(8);
        let mut written: Vec<Message> = Vec::new();
        let run = outbound_loop(&mut written, queue, settings(Duration::from_millis(10)));
        let _ = tokio::time::timeout(Duration::from_millis(80), run).await;

        let pings = written
            .iter()
            .filter(|m| matches!(m, Message::Ping(_)))
            .count();
        assert!(pings >= 2, "expected pings, got {written:?}");
    }

    #[tokio::test]
    async fn outbound_stops_on_write_failure() {
        let (tx, queue) = mpsc::channel(8);
        let _ = tx.send(Frame::from("x")).await;
        let exit = outbound_loop(failing_sink(), queue, settings(Duration::from_secs(3600))).await;
        assert_eq!(exit, LoopExit::WriteFailed);
    }

    #[tokio::test]
    async fn outbound_stops_on_write_deadline() {
        let (tx, queue) = mpsc::channel(8);
        let _ = tx.send(Frame::from("x")).await;
        let exit = outbound_loop(stalled_sink(), queue, settings(Duration::from_secs(3600))).await;
        assert_eq!(exit, LoopExit::WriteTimedOut);
    }

    #[tokio::test]
    async fn outbound_ping_failure_stops_loop() {
        let (_tx, queue) = mpsc::channel::<Frame>(8);
        let exit = outbound_loop(failing_sink(), queue, settings(Duration::from_millis(10))).await;
        assert_eq!(exit, LoopExit::WriteFailed);
    }

    #[tokio::test]
    async fn inbound_ignores_payloads_until_stream_ends() {
        let frames = vec![
            Ok::<_, io::Error>(Message::Pong(Bytes::new())),
            Ok(Message::Text("ignored".into())),
            Ok(Message::Binary(Bytes::from_static(b"\x01"))),
        ];
        let exit = inbound_loop(stream::iter(frames), settings(Duration::from_secs(1))).await;
        assert_eq!(exit, LoopExit::PeerClosed);
    }

    #[tokio::test]
    async fn inbound_close_frame_ends_loop() {
        let frames = vec![
            Ok::<_, io::Error>(Message::Close(None)),
            Ok(Message::Text("never read".into())),
        ];
        let exit = inbound_loop(stream::iter(frames), settings(Duration::from_secs(1))).await;
        assert_eq!(exit, LoopExit::PeerClosed);
    }

    #[tokio::test]
    async fn inbound_read_error_ends_loop() {
        let frames = vec![Err::<Message, _>(io::Error::other("message too long"))];
        let exit = inbound_loop(stream::iter(frames), settings(Duration::from_secs(1))).await;
        assert_eq!(exit, LoopExit::ReadFailed);
    }

    #[tokio::test]
    async fn inbound_silence_times_out() {
        let silent = stream::pending::<Result<Message, io::Error>>();
        let exit = inbound_loop(silent, settings(Duration::from_secs(1))).await;
        assert_eq!(exit, LoopExit::ReadTimedOut);
    }
}
