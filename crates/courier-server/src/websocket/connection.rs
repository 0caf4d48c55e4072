//! WebSocket client connection state and its writer task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use courier_core::{ConnectionId, TransportError, UserId};
use futures::SinkExt;
use futures::stream::SplitSink;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, warn};

use crate::transport::{CloseReason, FrameSink};

/// A frame waiting for the writer task, with a channel for the write result.
pub struct Outbound {
    frame: String,
    ack: oneshot::Sender<Result<(), TransportError>>,
}

/// A connected WebSocket client.
pub struct ClientConnection {
    id: ConnectionId,
    user_id: UserId,
    tx: mpsc::Sender<Outbound>,
    write_timeout: Duration,
    connected_at: Instant,
    /// Refreshed by inbound activity, read by the idle watchdog.
    last_seen: Mutex<Instant>,
    frames_sent: AtomicU64,
    closing: CancellationToken,
    close_reason: Mutex<Option<CloseReason>>,
}

impl ClientConnection {
    /// Create a connection feeding `tx`.
    pub fn new(
        id: ConnectionId,
        user_id: UserId,
        tx: mpsc::Sender<Outbound>,
        write_timeout: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            user_id,
            tx,
            write_timeout,
            connected_at: now,
            last_seen: Mutex::new(now),
            frames_sent: AtomicU64::new(0),
            closing: CancellationToken::new(),
            close_reason: Mutex::new(None),
        }
    }

    /// User this connection is bound to.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Mark the connection as alive (pong or any inbound frame).
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// When inbound activity was last seen.
    pub fn last_seen(&self) -> Instant {
        *self.last_seen.lock()
    }

    /// Time since the last inbound activity.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Frames handed to the socket so far.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Whether a close has been requested.
    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Resolves once a close has been requested.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closing.cancelled()
    }

    /// The reason passed to the first [`FrameSink::close`] call.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }
}

#[async_trait]
impl FrameSink for ClientConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn write_frame(&self, frame: String) -> Result<(), TransportError> {
        if self.is_closing() {
            return Err(TransportError::Closed);
        }
        let (ack, done) = oneshot::channel();
        let write = async {
            self.tx
                .send(Outbound { frame, ack })
                .await
                .map_err(|_| TransportError::Closed)?;
            done.await.map_err(|_| TransportError::Closed)?
        };
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => {
                if result.is_ok() {
                    let _ = self.frames_sent.fetch_add(1, Ordering::Relaxed);
                }
                result
            }
            Err(_) => Err(TransportError::Timeout),
        }
    }

    fn close(&self, reason: CloseReason) {
        {
            let mut slot = self.close_reason.lock();
            if slot.is_some() {
                return;
            }
            *slot = Some(reason);
        }
        debug!(connection_id = %self.id, reason = %reason, "close requested");
        self.closing.cancel();
    }
}

/// Forward outbound frames to the socket and send periodic pings.
///
/// Exits when the channel closes, a socket write fails, or a close is
/// requested (after sending a close frame with the reason). Frames whose
/// writer already gave up waiting are skipped, so a timed-out write is
/// never delivered late.
pub async fn run_writer(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<Outbound>,
    connection: std::sync::Arc<ClientConnection>,
    ping_interval: Duration,
) {
    let mut ping = tokio::time::interval(ping_interval);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            () = connection.closed() => {
                let reason = connection.close_reason().unwrap_or(CloseReason::Shutdown);
                let frame = CloseFrame {
                    code: reason.code(),
                    reason: reason.as_str().into(),
                };
                let _ = ws_tx.send(WsMessage::Close(Some(frame))).await;
                break;
            }
            out = rx.recv() => {
                let Some(Outbound { frame, ack }) = out else { break };
                if ack.is_closed() {
                    continue;
                }
                let result = ws_tx
                    .send(WsMessage::Text(frame.into()))
                    .await
                    .map_err(|e| TransportError::Socket(e.to_string()));
                let failed = result.is_err();
                let _ = ack.send(result);
                if failed {
                    warn!(connection_id = %connection.id(), "socket write failed");
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(WsMessage::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Later writes fail fast instead of waiting on a dead channel.
    connection.close(CloseReason::WriteFailed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn make_connection(
        buffer: usize,
        write_timeout: Duration,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(buffer);
        let conn = ClientConnection::new(ConnectionId::new(), "alice".into(), tx, write_timeout);
        (Arc::new(conn), rx)
    }

    #[tokio::test]
    async fn write_waits_for_ack() {
        let (conn, mut rx) = make_connection(8, Duration::from_secs(1));
        let writer = tokio::spawn(async move {
            let out = rx.recv().await.unwrap();
            assert_eq!(out.frame, "hello");
            out.ack.send(Ok(())).unwrap();
        });
        conn.write_frame("hello".into()).await.unwrap();
        writer.await.unwrap();
        assert_eq!(conn.frames_sent(), 1);
    }

    #[tokio::test]
    async fn socket_error_is_reported() {
        let (conn, mut rx) = make_connection(8, Duration::from_secs(1));
        let _writer = tokio::spawn(async move {
            let out = rx.recv().await.unwrap();
            let _ = out.ack.send(Err(TransportError::Socket("reset".into())));
        });
        let err = conn.write_frame("x".into()).await.unwrap_err();
        assert_eq!(err, TransportError::Socket("reset".into()));
        assert_eq!(conn.frames_sent(), 0);
    }

    #[tokio::test]
    async fn dropped_writer_reports_closed() {
        let (conn, rx) = make_connection(8, Duration::from_secs(1));
        drop(rx);
        assert_eq!(
            conn.write_frame("x".into()).await.unwrap_err(),
            TransportError::Closed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_writer_times_out() {
        let (conn, _rx) = make_connection(8, Duration::from_millis(50));
        assert_eq!(
            conn.write_frame("x".into()).await.unwrap_err(),
            TransportError::Timeout
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_frame_is_marked_abandoned() {
        let (conn, mut rx) = make_connection(8, Duration::from_millis(50));
        let _ = conn.write_frame("late".into()).await;
        let out = rx.recv().await.unwrap();
        assert!(out.ack.is_closed());
    }

    #[tokio::test]
    async fn closed_connection_rejects_writes() {
        let (conn, _rx) = make_connection(8, Duration::from_secs(1));
        conn.close(CloseReason::Superseded);
        assert!(conn.is_closing());
        assert_eq!(
            conn.write_frame("x".into()).await.unwrap_err(),
            TransportError::Closed
        );
    }

    #[test]
    fn first_close_reason_wins() {
        let (conn, _rx) = make_connection(8, Duration::from_secs(1));
        assert_eq!(conn.close_reason(), None);
        conn.close(CloseReason::HeartbeatTimeout);
        conn.close(CloseReason::Shutdown);
        assert_eq!(conn.close_reason(), Some(CloseReason::HeartbeatTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn mark_alive_resets_idle() {
        let (conn, _rx) = make_connection(8, Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(conn.idle_for() >= Duration::from_secs(5));
        conn.mark_alive();
        assert!(conn.idle_for() < Duration::from_secs(1));
        assert!(conn.age() >= Duration::from_secs(5));
    }

    #[test]
    fn exposes_user() {
        let (conn, _rx) = make_connection(8, Duration::from_secs(1));
        assert_eq!(conn.user_id().as_str(), "alice");
        assert!(conn.age() < Duration::from_secs(5));
    }
}
