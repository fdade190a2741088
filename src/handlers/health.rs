use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

/// Reports whether the session store answers a ping.
pub async fn health(State(state): State<AppState>) -> Response {
    let (status, body) = match state.registry.store().ping().await {
        Ok(()) => (StatusCode::OK, r#"{"status":"ok","store":"up"}"#),
        Err(e) => {
            tracing::warn!("⚠️ Health check: store unreachable: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, r#"{"status":"degraded","store":"down"}"#)
        }
    };

    (status, [(http::header::CONTENT_TYPE, "application/json")], body).into_response()
}
