//! `/history/{user_id}`: recent persisted messages involving a user.

use axum::Json;
use axum::extract::{Path, Query, State};
use courier_core::{Message, UserId};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;
use crate::server::AppState;

/// Limit applied when the request gives none.
pub const DEFAULT_LIMIT: usize = 50;
/// Largest accepted limit.
pub const MAX_LIMIT: usize = 500;

/// Query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    /// Number of messages to return.
    pub limit: Option<usize>,
}

/// Response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    /// The user asked about.
    pub user_id: UserId,
    /// Oldest first.
    pub messages: Vec<Message>,
}

/// Clamp a requested limit into `1..=MAX_LIMIT`.
pub fn effective_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// GET /history/{user_id}
pub async fn history_handler(
    Path(user_id): Path<String>,
    Query(params): Query<HistoryParams>,
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, ServerError> {
    let user_id = UserId::from(user_id);
    let messages = state
        .store
        .recent_for_user(&user_id, effective_limit(params.limit))
        .await?;
    Ok(Json(HistoryResponse { user_id, messages }))
}
