//! WebSocket session lifecycle: one connected user from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use chrono::Utc;
use courier_core::{ConnectionId, CoreError, Message, UserId};
use courier_store::MessageStore;
use futures::StreamExt;
use futures::stream::SplitStream;
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{ClientConnection, run_writer};
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::config::ServerConfig;
use crate::delivery::{DeliveryEngine, FlushOutcome};
use crate::metrics::{
    MESSAGES_DECODE_FAILURES_TOTAL, MESSAGES_RECEIVED_TOTAL, STORE_APPEND_FAILURES_TOTAL,
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::transport::{CloseReason, FrameSink};

/// How long teardown waits for the writer to send its close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Everything a session needs, shared across sessions.
#[derive(Clone)]
pub struct SessionContext {
    /// Routing and offline queues.
    pub engine: Arc<DeliveryEngine>,
    /// Durable message record.
    pub store: Arc<dyn MessageStore>,
    /// Timeouts and buffer sizes.
    pub config: Arc<ServerConfig>,
    /// Fires on server shutdown.
    pub shutdown: CancellationToken,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer sent a close frame.
    PeerClosed,
    /// The stream ended without a close frame.
    PeerGone,
    /// Reading from the socket failed.
    ReadError,
    /// The connection was closed from the server side.
    Closed(CloseReason),
    /// The server is shutting down.
    Shutdown,
}

impl SessionEnd {
    fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::PeerGone => "peer_gone",
            Self::ReadError => "read_error",
            Self::Closed(reason) => reason.as_str(),
            Self::Shutdown => "shutdown",
        }
    }
}

/// Run a session for an authenticated `user_id`.
///
/// 1. Spawns the writer (outbound frames and pings) and heartbeat tasks
/// 2. Binds the connection and flushes the user's pending queue
/// 3. Reads inbound frames: decode, persist, deliver
/// 4. Tears down on every exit path
#[instrument(skip_all, fields(user_id = %user_id, connection_id))]
pub async fn run_session(socket: WebSocket, user_id: UserId, ctx: SessionContext) -> SessionEnd {
    let (ws_tx, mut ws_rx) = socket.split();
    let (tx, rx) = mpsc::channel(ctx.config.outbound_buffer);
    let connection = Arc::new(ClientConnection::new(
        ConnectionId::new(),
        user_id.clone(),
        tx,
        ctx.config.write_timeout,
    ));
    let _ = tracing::Span::current().record("connection_id", connection.id().as_str());

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let mut writer = tokio::spawn(run_writer(
        ws_tx,
        rx,
        connection.clone(),
        ctx.config.heartbeat_interval,
    ));

    let heartbeat_cancel = CancellationToken::new();
    let heartbeat = {
        let connection = connection.clone();
        let cancel = heartbeat_cancel.clone();
        let interval = ctx.config.heartbeat_interval;
        let timeout = ctx.config.heartbeat_timeout;
        tokio::spawn(async move {
            if run_heartbeat(connection.clone(), interval, timeout, cancel).await
                == HeartbeatResult::TimedOut
            {
                warn!(
                    user_id = %connection.user_id(),
                    connection_id = %connection.id(),
                    idle = ?connection.idle_for(),
                    "client unresponsive, disconnecting"
                );
                connection.close(CloseReason::HeartbeatTimeout);
            }
        })
    };

    let end = match ctx.engine.connect(&user_id, connection.clone()).await {
        FlushOutcome::Aborted { .. } => SessionEnd::Closed(CloseReason::WriteFailed),
        FlushOutcome::Flushed(_) => read_loop(&mut ws_rx, &connection, &user_id, &ctx).await,
    };

    // Teardown
    heartbeat_cancel.cancel();
    heartbeat.abort();
    let _ = ctx.engine.disconnect(&user_id, connection.id()).await;
    if end == SessionEnd::Shutdown {
        connection.close(CloseReason::Shutdown);
    }
    if !connection.is_closing() {
        // Peer-initiated exits: the writer has nothing left to say.
        writer.abort();
    } else if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    info!(
        reason = end.as_str(),
        frames_sent = connection.frames_sent(),
        connected_for = ?connection.age(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => end.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    end
}

async fn read_loop(
    ws_rx: &mut SplitStream<WebSocket>,
    connection: &ClientConnection,
    user_id: &UserId,
    ctx: &SessionContext,
) -> SessionEnd {
    loop {
        let frame = tokio::select! {
            biased;
            () = ctx.shutdown.cancelled() => return SessionEnd::Shutdown,
            () = connection.closed() => {
                return SessionEnd::Closed(
                    connection.close_reason().unwrap_or(CloseReason::WriteFailed),
                );
            }
            frame = ws_rx.next() => frame,
        };

        let msg = match frame {
            None => return SessionEnd::PeerGone,
            Some(Err(e)) => {
                debug!(error = %e, "socket read failed");
                return SessionEnd::ReadError;
            }
            Some(Ok(msg)) => msg,
        };

        connection.mark_alive();
        let received_at = Utc::now();
        let decoded = match msg {
            WsMessage::Text(ref text) => Message::decode(text.as_str(), received_at),
            WsMessage::Binary(ref data) => Message::decode_bytes(data, received_at),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            WsMessage::Close(_) => {
                info!("client sent close frame");
                return SessionEnd::PeerClosed;
            }
        };

        counter!(MESSAGES_RECEIVED_TOTAL).increment(1);
        match decoded {
            Ok(message) => handle_message(message, user_id, ctx).await,
            Err(e) => reject_frame(&e),
        }
    }
}

fn reject_frame(error: &CoreError) {
    warn!(error = %error, kind = error.kind(), "discarding undecodable frame");
    counter!(MESSAGES_DECODE_FAILURES_TOTAL, "kind" => error.kind()).increment(1);
}

async fn handle_message(message: Message, user_id: &UserId, ctx: &SessionContext) {
    if message.sender() != user_id {
        debug!(sender = %message.sender(), "sender differs from connected user");
    }

    persist(ctx.store.as_ref(), &message, ctx.config.append_timeout).await;

    let receiver = message.receiver().clone();
    let outcome = ctx.engine.deliver(message).await;
    debug!(receiver = %receiver, ?outcome, "message routed");
}

/// Best-effort durable write. Failures are logged and counted, never
/// surfaced to the sender or allowed to block delivery past `timeout`.
pub(crate) async fn persist(store: &dyn MessageStore, message: &Message, timeout: Duration) {
    match tokio::time::timeout(timeout, store.append(message)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(error = %e, "failed to persist message");
            counter!(STORE_APPEND_FAILURES_TOTAL).increment(1);
        }
        Err(_) => {
            warn!(timeout = ?timeout, "persisting message timed out");
            counter!(STORE_APPEND_FAILURES_TOTAL).increment(1);
        }
    }
}
