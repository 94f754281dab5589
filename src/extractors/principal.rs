//! Extract the principal attached by the auth gate.

use crate::auth::Principal;
use crate::error::GatewayError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

/// The resolved caller. Only available behind [`crate::auth::require_basic_auth`].
#[derive(Clone, Debug)]
pub struct Authenticated(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(Authenticated)
            .ok_or_else(|| GatewayError::Unauthorized {
                realm: state.realm.to_string(),
            })
    }
}
