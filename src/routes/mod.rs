//! Router assembly: resource routes plus the transport layers around them.

mod resource;

pub use resource::resource_routes;

use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, Router};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// The complete gateway. Tracing wraps everything; CORS sits inside it and ahead of the auth gate,
/// so preflight requests are answered without credentials.
pub fn gateway_router(state: AppState, max_body_bytes: usize) -> Router {
    resource_routes(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(DefaultBodyLimit::max(max_body_bytes)),
    )
}
