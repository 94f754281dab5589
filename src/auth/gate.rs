//! Auth gate middleware: every request must carry valid HTTP Basic credentials.
//!
//! There is no CSRF protection. The API is stateless and keeps no browser session to protect.

use crate::auth::basic;
use crate::error::GatewayError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Resolve the caller and attach the [`crate::auth::Principal`] to the request extensions.
/// Missing, malformed and rejected credentials all get the same 401 challenge.
pub async fn require_basic_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let Some(credentials) = basic::from_headers(request.headers()) else {
        tracing::debug!(path = %request.uri().path(), "missing or malformed basic credentials");
        return challenge(&state);
    };
    match state.credentials.resolve(&credentials.username, &credentials.password).await {
        Ok(principal) => {
            tracing::debug!(user = %principal.identity(), roles = ?principal.roles(), "authenticated");
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(_) => {
            tracing::warn!(user = %credentials.username, path = %request.uri().path(), "authentication failed");
            challenge(&state)
        }
    }
}

fn challenge(state: &AppState) -> Response {
    GatewayError::Unauthorized {
        realm: state.realm.to_string(),
    }
    .into_response()
}
