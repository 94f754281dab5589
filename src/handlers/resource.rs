//! Resource handlers: classify the path, build the request context, hand off to the runner.
//!
//! The raw `Uri` path is used rather than a `Path` extractor so segments reach the bridge
//! exactly as sent.

use crate::error::GatewayError;
use crate::extractors::{AcceptsJson, Authenticated};
use crate::query::QueryParams;
use crate::route::{Route, RouteParseError};
use crate::runner::{RequestContext, ResponseEnvelope, Verb};
use crate::state::AppState;
use axum::{
    extract::{rejection::StringRejection, State},
    http::{Method, Uri},
};

fn context(principal: crate::auth::Principal, uri: &Uri, body: Option<String>) -> Result<RequestContext, GatewayError> {
    Ok(RequestContext {
        principal,
        route: Route::parse(uri.path())?,
        params: QueryParams::parse(uri.query()),
        body,
    })
}

/// `GET` on any of the four route shapes.
pub async fn get_resource(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    _accept: AcceptsJson,
    uri: Uri,
) -> Result<ResponseEnvelope, GatewayError> {
    let ctx = context(principal, &uri, None)?;
    state.runner.handle(Verb::Get, ctx).await
}

/// `POST` on collection and relationship routes.
pub async fn post_resource(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    _accept: AcceptsJson,
    uri: Uri,
    body: Result<String, StringRejection>,
) -> Result<ResponseEnvelope, GatewayError> {
    let ctx = context(principal, &uri, Some(body?))?;
    state.runner.handle(Verb::Post, ctx).await
}

/// Any other method: 404 when the path is not a route, 405 otherwise.
pub async fn unsupported_method(
    Authenticated(_principal): Authenticated,
    method: Method,
    uri: Uri,
) -> GatewayError {
    match Route::parse(uri.path()) {
        Ok(route) => GatewayError::MethodNotAllowed {
            method: method.to_string(),
            shape: route.shape(),
        },
        Err(e) => e.into(),
    }
}

/// Paths the wildcard route never sees, such as `/`.
pub async fn not_found(uri: Uri) -> GatewayError {
    match Route::parse(uri.path()) {
        Err(e) => e.into(),
        Ok(_) => RouteParseError::Unmatched(uri.path().to_string()).into(),
    }
}
