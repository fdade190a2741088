use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::AdminIdentity,
    models::session::ListOptions,
    state::AppState,
    validation::session::validate_session_key,
};

/// The query parameters for listing sessions. Values are taken as strings
/// so that malformed numbers fall back to defaults instead of rejecting the
/// request.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsQuery {
    pub use_index: Option<String>,
    pub start: Option<String>,
    pub limit: Option<String>,
    pub cursor: Option<String>,
}

/// The query parameters for searching sessions.
#[derive(Deserialize, Debug, Default)]
pub struct SearchSessionsQuery {
    pub query: Option<String>,
    pub limit: Option<String>,
}

/// The request payload for expiring a session.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExpireSessionRequest {
    pub session_key: Option<String>,
    pub confirm: Option<bool>,
    pub reason: Option<String>,
}

/// The response payload for a successful expire.
#[derive(Serialize)]
pub struct ExpireSessionResponse {
    pub success: bool,
    pub deleted: bool,
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response> {
    let body = sonic_rs::to_string(value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize response: {}", e)))?;
    Ok((status, [(http::header::CONTENT_TYPE, "application/json")], body).into_response())
}

fn parse_flag(raw: Option<&str>) -> bool {
    !matches!(
        raw.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("false" | "0" | "no")
    )
}

fn parse_number(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse().ok())
}

impl ListSessionsQuery {
    pub fn into_options(self) -> ListOptions {
        let start = parse_number(self.start.as_deref())
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0);
        let cursor = self
            .cursor
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "0".to_string());

        ListOptions::default()
            .with_index(parse_flag(self.use_index.as_deref()))
            .with_start(start)
            .with_limit(parse_number(self.limit.as_deref()))
            .with_scan_cursor(cursor)
    }
}

/// Lists sessions, from the index when possible.
#[axum::debug_handler]
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Response> {
    let options = query.into_options();
    tracing::debug!("📋 {} listing sessions: {:?}", admin.admin_id, options);

    let page = state.registry.list_sessions(options).await?;
    json_response(StatusCode::OK, &page)
}

/// Searches sessions by key, user id or destination.
#[axum::debug_handler]
pub async fn search_sessions(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    Query(query): Query<SearchSessionsQuery>,
) -> Result<Response> {
    tracing::debug!("🔎 {} searching sessions for {:?}", admin.admin_id, query.query);

    let result = state
        .registry
        .search_sessions(query.query.as_deref(), parse_number(query.limit.as_deref()))
        .await?;
    json_response(StatusCode::OK, &result)
}

/// Gets a single session.
#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Result<Response> {
    let session = state
        .registry
        .get_session(&session_key)
        .await?
        .ok_or(AppError::NotFound)?;
    json_response(StatusCode::OK, &session)
}

/// Expires (deletes) a session. Requires `confirm: true`.
#[axum::debug_handler]
pub async fn expire_session(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    payload: std::result::Result<Json<ExpireSessionRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(req) = payload.map_err(|e| {
        tracing::debug!("Rejected expire body: {}", e);
        AppError::Validation("Invalid JSON body".to_string())
    })?;

    let session_key = req
        .session_key
        .filter(|key| !key.is_empty())
        .ok_or_else(|| AppError::Validation("Invalid sessionKey".to_string()))?;

    validate_session_key(&session_key)?;

    if req.confirm != Some(true) {
        return Err(AppError::Validation(
            "Operation requires confirm: true".to_string(),
        ));
    }

    let outcome = state
        .registry
        .expire_session(&session_key, &admin.admin_id, req.reason.as_deref())
        .await?;

    if !outcome.existed {
        return json_response(
            StatusCode::NOT_FOUND,
            &sonic_rs::json!({ "message": "Session not found or already expired" }),
        );
    }

    json_response(
        StatusCode::OK,
        &ExpireSessionResponse {
            success: true,
            deleted: outcome.deleted,
        },
    )
}
