use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::{config::AdminCredential, error::AppError, state::AppState};

/// The admin resolved by [`require_admin`], available to handlers as a
/// request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    pub admin_id: String,
}

/// Extracts the bearer token from the `Authorization` header.
fn extract_bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Finds the credential matching `token`. Every credential is compared so
/// the time taken does not depend on which one matched.
fn match_credential<'a>(credentials: &'a [AdminCredential], token: &str) -> Option<&'a AdminCredential> {
    credentials.iter().fold(None, |found, credential| {
        let equal: bool = credential.token.as_bytes().ct_eq(token.as_bytes()).into();
        if equal && found.is_none() {
            Some(credential)
        } else {
            found
        }
    })
}

/// A middleware that requires a configured admin bearer token.
///
/// # Returns
///
/// The downstream `Response`, `401` without a token or `403` with an unknown one.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    tracing::debug!("🔐 Checking admin authorization...");

    let token = extract_bearer_token(&request).ok_or_else(|| {
        tracing::warn!("❌ No admin bearer token");
        AppError::Authentication("Missing admin token".to_string())
    })?;

    let admin_id = match_credential(&state.config.admin_tokens, token)
        .map(|credential| credential.admin_id.clone())
        .ok_or(AppError::Unauthorized)?;

    tracing::debug!("✅ Admin authorized: {}", admin_id);

    request.extensions_mut().insert(AdminIdentity { admin_id });

    Ok(next.run(request).await)
}
