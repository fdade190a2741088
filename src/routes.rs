use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};

use crate::{handlers, middleware_layer, state::AppState};

/// Builds the application router without the transport layers (CORS, rate
/// limiting, tracing) that `main` adds on top.
pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/api/admin/sessions/search",
            get(handlers::sessions::search_sessions),
        )
        .route(
            "/api/admin/sessions/expire",
            post(handlers::sessions::expire_session),
        )
        .route(
            "/api/admin/sessions/{session_key}",
            get(handlers::sessions::get_session),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_admin,
        ))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .with_state(state);

    Router::new().merge(public_routes).merge(admin_routes)
}
