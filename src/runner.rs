//! Gateway runner: one bridge session per request, dispatch, then commit or roll back.

use crate::auth::Principal;
use crate::bridge::{AuthorizationMode, PersistenceBridge, TransactionMode};
use crate::error::GatewayError;
use crate::query::QueryParams;
use crate::route::Route;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;

/// Media type of every successful body.
pub const DOCUMENT_CONTENT_TYPE: &str = "application/vnd.api+json";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
}

impl Verb {
    fn transaction_mode(self) -> TransactionMode {
        match self {
            Verb::Get => TransactionMode::ReadOnly,
            Verb::Post => TransactionMode::ReadWrite,
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
        })
    }
}

/// Everything the runner needs for one request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub principal: Principal,
    pub route: Route,
    pub params: QueryParams,
    pub body: Option<String>,
}

/// A buffered successful document and its status.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseEnvelope {
    pub status: StatusCode,
    pub body: Value,
}

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body.to_string()).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(DOCUMENT_CONTENT_TYPE),
        );
        response
    }
}

#[derive(Clone)]
pub struct GatewayRunner {
    bridge: Arc<dyn PersistenceBridge>,
    create_authorization: AuthorizationMode,
}

impl GatewayRunner {
    pub fn new(bridge: Arc<dyn PersistenceBridge>) -> Self {
        GatewayRunner {
            bridge,
            create_authorization: AuthorizationMode::default(),
        }
    }

    pub fn with_create_authorization(mut self, mode: AuthorizationMode) -> Self {
        self.create_authorization = mode;
        self
    }

    pub fn create_authorization(&self) -> AuthorizationMode {
        self.create_authorization
    }

    pub fn bridge(&self) -> &Arc<dyn PersistenceBridge> {
        &self.bridge
    }

    /// Run one request inside exactly one transaction. Any failure after `begin` rolls back.
    pub async fn handle(&self, verb: Verb, ctx: RequestContext) -> Result<ResponseEnvelope, GatewayError> {
        let status = success_status(verb, &ctx.route)?;
        let mut session = self.bridge.begin(verb.transaction_mode()).await?;
        tracing::debug!(%verb, route = %ctx.route, user = %ctx.principal.identity(), "dispatching");

        let outcome = match verb {
            Verb::Get => session.fetch(&ctx.route, &ctx.params, &ctx.principal).await,
            Verb::Post => {
                session
                    .create(
                        &ctx.route,
                        ctx.body.as_deref().unwrap_or_default(),
                        &ctx.principal,
                        self.create_authorization,
                    )
                    .await
            }
        };

        match outcome {
            Ok(body) => {
                if let Err(e) = session.commit().await {
                    tracing::error!(%verb, route = %ctx.route, error = %e, "commit failed");
                    return Err(GatewayError::Transaction(e.to_string()));
                }
                tracing::info!(%verb, route = %ctx.route, status = status.as_u16(), "committed");
                Ok(ResponseEnvelope { status, body })
            }
            Err(e) => {
                if let Err(rollback) = session.rollback().await {
                    tracing::warn!(%verb, route = %ctx.route, error = %rollback, "rollback failed");
                }
                tracing::info!(%verb, route = %ctx.route, error = %e, "rolled back");
                Err(e.into())
            }
        }
    }
}

/// GET answers 200 on every shape. POST creates on collections (201) and extends relationships (200).
fn success_status(verb: Verb, route: &Route) -> Result<StatusCode, GatewayError> {
    match verb {
        Verb::Get => Ok(StatusCode::OK),
        Verb::Post if !route.accepts_create() => Err(GatewayError::MethodNotAllowed {
            method: verb.to_string(),
            shape: route.shape(),
        }),
        Verb::Post if matches!(route, Route::Collection { .. }) => Ok(StatusCode::CREATED),
        Verb::Post => Ok(StatusCode::OK),
    }
}
