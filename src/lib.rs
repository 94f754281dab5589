//! Resource gateway: a JSON:API-style HTTP front end over a relational store.
//!
//! Every request passes the HTTP Basic auth gate, is classified into one of four route shapes
//! and runs inside exactly one transaction of a [`PersistenceBridge`].

pub mod auth;
pub mod bridge;
pub mod config;
pub mod document;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod query;
pub mod route;
pub mod routes;
pub mod runner;
pub mod settings;
pub mod sql;
pub mod state;
pub mod validation;

pub use auth::{AuthFailure, CredentialStore, InMemoryCredentialStore, Principal};
pub use bridge::{AuthorizationMode, BridgeSession, PersistenceBridge, PgBridge, TransactionMode};
pub use config::{load_from_dir, resolve, FullConfig, ResolvedEntity, ResolvedModel};
pub use error::{BridgeError, ConfigError, GatewayError};
pub use query::QueryParams;
pub use route::{Route, RouteParseError};
pub use routes::{gateway_router, resource_routes};
pub use runner::{GatewayRunner, RequestContext, ResponseEnvelope, Verb};
pub use settings::GatewaySettings;
pub use state::AppState;
