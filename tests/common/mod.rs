//! Shared fixtures: a bridge that records every call and the router wired around it.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use resource_gateway::auth::basic::encode_authorization;
use resource_gateway::{
    gateway_router, AppState, AuthorizationMode, BridgeError, BridgeSession, InMemoryCredentialStore,
    PersistenceBridge, Principal, QueryParams, Route, TransactionMode,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;
use tower::ServiceExt;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Begin(TransactionMode),
    Fetch {
        route: Route,
        params: QueryParams,
        user: String,
    },
    Create {
        route: Route,
        body: String,
        user: String,
        authorization: AuthorizationMode,
    },
    Commit,
    Rollback,
}

type Failure = Box<dyn Fn() -> BridgeError + Send + Sync>;

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<Call>>,
    operation_failure: Option<Failure>,
    commit_failure: bool,
    barrier: Option<Arc<Barrier>>,
}

/// Records calls in order. Fetch echoes the route; create returns a resource with id "1".
#[derive(Clone, Default)]
pub struct RecordingBridge {
    shared: Arc<Shared>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch/create fails with the error built by `f`.
    pub fn failing_with(f: impl Fn() -> BridgeError + Send + Sync + 'static) -> Self {
        RecordingBridge {
            shared: Arc::new(Shared {
                operation_failure: Some(Box::new(f)),
                ..Shared::default()
            }),
        }
    }

    pub fn failing_commit() -> Self {
        RecordingBridge {
            shared: Arc::new(Shared {
                commit_failure: true,
                ..Shared::default()
            }),
        }
    }

    /// Each fetch waits on `barrier` before answering.
    pub fn with_barrier(barrier: Arc<Barrier>) -> Self {
        RecordingBridge {
            shared: Arc::new(Shared {
                barrier: Some(barrier),
                ..Shared::default()
            }),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.shared.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.shared.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PersistenceBridge for RecordingBridge {
    async fn begin(&self, mode: TransactionMode) -> Result<Box<dyn BridgeSession>, BridgeError> {
        self.record(Call::Begin(mode));
        Ok(Box::new(RecordingSession { bridge: self.clone() }))
    }
}

struct RecordingSession {
    bridge: RecordingBridge,
}

#[async_trait]
impl BridgeSession for RecordingSession {
    async fn fetch(&mut self, route: &Route, params: &QueryParams, principal: &Principal) -> Result<Value, BridgeError> {
        self.bridge.record(Call::Fetch {
            route: route.clone(),
            params: params.clone(),
            user: principal.identity().to_string(),
        });
        if let Some(barrier) = &self.bridge.shared.barrier {
            barrier.wait().await;
        }
        if let Some(fail) = &self.bridge.shared.operation_failure {
            return Err(fail());
        }
        Ok(json!({ "data": { "type": route.entity(), "id": route.id() } }))
    }

    async fn create(
        &mut self,
        route: &Route,
        body: &str,
        principal: &Principal,
        authorization: AuthorizationMode,
    ) -> Result<Value, BridgeError> {
        self.bridge.record(Call::Create {
            route: route.clone(),
            body: body.to_string(),
            user: principal.identity().to_string(),
            authorization,
        });
        if let Some(fail) = &self.bridge.shared.operation_failure {
            return Err(fail());
        }
        Ok(json!({ "data": { "type": route.entity(), "id": "1" } }))
    }

    async fn commit(self: Box<Self>) -> Result<(), BridgeError> {
        self.bridge.record(Call::Commit);
        if self.bridge.shared.commit_failure {
            return Err(BridgeError::Internal("connection reset".into()));
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BridgeError> {
        self.bridge.record(Call::Rollback);
        Ok(())
    }
}

pub fn state(bridge: &RecordingBridge) -> AppState {
    AppState::new(Arc::new(bridge.clone()), Arc::new(InMemoryCredentialStore::with_defaults()))
}

pub fn app(bridge: &RecordingBridge) -> Router {
    gateway_router(state(bridge), 64 * 1024)
}

pub fn admin() -> String {
    encode_authorization("admin", "admin")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", admin())
        .body(Body::empty())
        .unwrap()
}

pub fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", admin())
        .header("content-type", "application/vnd.api+json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(app: Router, request: Request<Body>) -> Reply {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    Reply { status, headers, body }
}
