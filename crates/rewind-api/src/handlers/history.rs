//! Action history endpoints.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use rewind_core::HistoryListing;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{ApiError, AppState, RequireUser};

/// Scope (dataset) the history belongs to.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScopeQuery {
    pub scope_id: Uuid,
}

/// Outcome of an undo or redo.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResponse {
    /// False when there was nothing to undo/redo.
    pub applied: bool,
    /// The entry that changed state.
    pub entry: Option<HistoryListing>,
}

impl From<Option<HistoryListing>> for ReplayResponse {
    fn from(entry: Option<HistoryListing>) -> Self {
        Self {
            applied: entry.is_some(),
            entry,
        }
    }
}

/// List the caller's history in a scope, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/history",
    tag = "History",
    params(ScopeQuery),
    responses(
        (status = 200, description = "History entries", body = [HistoryListing]),
        (status = 400, description = "Missing or malformed scope_id"),
        (status = 401, description = "Missing or unknown token")
    )
)]
pub async fn list_history(
    State(state): State<AppState>,
    user: RequireUser,
    query: Result<Query<ScopeQuery>, QueryRejection>,
) -> Result<Json<Vec<HistoryListing>>, ApiError> {
    let Query(query) = query?;
    let listings = state
        .recorder
        .log()
        .list(user.user_id, query.scope_id)
        .await?;
    Ok(Json(listings))
}

/// Revert the caller's most recent active action in the scope.
#[utoipa::path(
    put,
    path = "/api/v1/history/undo",
    tag = "History",
    params(ScopeQuery),
    responses(
        (status = 200, description = "Undo result", body = ReplayResponse),
        (status = 400, description = "Missing or malformed scope_id"),
        (status = 401, description = "Missing or unknown token")
    )
)]
pub async fn undo(
    State(state): State<AppState>,
    user: RequireUser,
    query: Result<Query<ScopeQuery>, QueryRejection>,
) -> Result<Json<ReplayResponse>, ApiError> {
    let Query(query) = query?;
    let entry = state.engine.undo(user.user_id, query.scope_id).await?;
    if entry.is_none() {
        info!(
            subsystem = "api",
            op = "undo",
            user_id = %user.user_id,
            scope_id = %query.scope_id,
            "Nothing to undo"
        );
    }
    Ok(Json(entry.into()))
}

/// Re-apply the oldest undone action in the scope.
#[utoipa::path(
    put,
    path = "/api/v1/history/redo",
    tag = "History",
    params(ScopeQuery),
    responses(
        (status = 200, description = "Redo result", body = ReplayResponse),
        (status = 400, description = "Missing or malformed scope_id"),
        (status = 401, description = "Missing or unknown token")
    )
)]
pub async fn redo(
    State(state): State<AppState>,
    user: RequireUser,
    query: Result<Query<ScopeQuery>, QueryRejection>,
) -> Result<Json<ReplayResponse>, ApiError> {
    let Query(query) = query?;
    let entry = state.engine.redo(user.user_id, query.scope_id).await?;
    if entry.is_none() {
        info!(
            subsystem = "api",
            op = "redo",
            user_id = %user.user_id,
            scope_id = %query.scope_id,
            "Nothing to redo"
        );
    }
    Ok(Json(entry.into()))
}
