//! The single wildcard route that serves every resource path.

use crate::auth::require_basic_auth;
use crate::handlers::resource::{get_resource, not_found, post_resource, unsupported_method};
use crate::state::AppState;
use axum::{middleware, routing::get, Router};

/// Resource routes behind the auth gate. The gate also covers the fallback.
pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/*path",
            get(get_resource).post(post_resource).fallback(unsupported_method),
        )
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), require_basic_auth))
        .with_state(state)
}
