//! `/ws` upgrade: resolve the user id and hand the socket to a session.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use courier_core::UserId;
use metrics::counter;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::session::run_session;
use crate::metrics::CONNECTION_ATTEMPTS_TOTAL;
use crate::server::AppState;

/// Header consulted when the query string carries no user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Query parameters of the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Identity of the connecting user.
    pub user_id: Option<String>,
}

/// Pick the user id: non-empty query parameter first, then the header.
pub fn resolve_user_id(params: &ConnectParams, headers: &HeaderMap) -> Option<UserId> {
    params
        .user_id
        .as_deref()
        .map(UserId::from)
        .filter(|id| !id.is_blank())
        .or_else(|| {
            headers
                .get(USER_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(UserId::from)
                .filter(|id| !id.is_blank())
        })
}

/// Upgrade handler. Every request is counted: ones that are not a valid
/// WebSocket handshake as `handshake_failed`, upgrades without a user id as
/// `rejected` (upgraded, then dropped without binding anything).
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    method: Method,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let method = method.as_str().to_owned();

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(%method, error = %rejection, "websocket handshake failed");
            counter!(CONNECTION_ATTEMPTS_TOTAL, "method" => method, "status" => "handshake_failed")
                .increment(1);
            return rejection.into_response();
        }
    };

    let Some(user_id) = resolve_user_id(&params, &headers) else {
        warn!("connection rejected: no user_id");
        counter!(CONNECTION_ATTEMPTS_TOTAL, "method" => method, "status" => "rejected").increment(1);
        return ws.on_upgrade(|socket| async move { drop(socket) });
    };

    counter!(CONNECTION_ATTEMPTS_TOTAL, "method" => method, "status" => "accepted").increment(1);
    info!(user_id = %user_id, "connection accepted");

    let ctx = state.session_context();
    let guard = state.shutdown.session_guard();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _ = run_session(socket, user_id, ctx).await;
            drop(guard);
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(user: Option<&str>) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Some(u) = user {
            let _ = h.insert(USER_ID_HEADER, HeaderValue::from_str(u).unwrap());
        }
        h
    }

    fn params(user: Option<&str>) -> ConnectParams {
        ConnectParams {
            user_id: user.map(str::to_owned),
        }
    }

    #[test]
    fn query_wins() {
        let id = resolve_user_id(&params(Some("alice")), &headers(Some("bob")));
        assert_eq!(id, Some(UserId::from("alice")));
    }

    #[test]
    fn header_fallback() {
        assert_eq!(
            resolve_user_id(&params(None), &headers(Some("bob"))),
            Some(UserId::from("bob"))
        );
        assert_eq!(
            resolve_user_id(&params(Some("")), &headers(Some("bob"))),
            Some(UserId::from("bob"))
        );
    }

    #[test]
    fn missing_or_empty_is_none() {
        assert_eq!(resolve_user_id(&params(None), &headers(None)), None);
        assert_eq!(resolve_user_id(&params(Some("")), &headers(Some(""))), None);
    }
}
