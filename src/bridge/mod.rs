//! Persistence bridge: the seam between the gateway runner and the storage engine.
//!
//! A bridge hands out one [`BridgeSession`] per request. The session owns the transaction;
//! `commit` and `rollback` consume it, so a finished session cannot be reused.

mod postgres;

pub use postgres::{PgBridge, PgSession};

use crate::auth::Principal;
use crate::error::BridgeError;
use crate::query::QueryParams;
use crate::route::Route;
use async_trait::async_trait;
use serde_json::Value;

/// Transaction boundary requested by the runner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

/// Whether the bridge enforces role checks on a write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthorizationMode {
    Active,
    #[default]
    Inactive,
}

impl std::str::FromStr for AuthorizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(AuthorizationMode::Active),
            "inactive" => Ok(AuthorizationMode::Inactive),
            other => Err(format!("expected active or inactive, got '{}'", other)),
        }
    }
}

#[async_trait]
pub trait PersistenceBridge: Send + Sync {
    /// Open a session with its own transaction.
    async fn begin(&self, mode: TransactionMode) -> Result<Box<dyn BridgeSession>, BridgeError>;

    /// Cheap connectivity probe.
    async fn ping(&self) -> Result<(), BridgeError> {
        Ok(())
    }
}

/// One request's view of the store. Dropping a session without commit rolls it back.
#[async_trait]
pub trait BridgeSession: Send {
    /// Read any of the four route shapes. `params` arrive exactly as the client sent them.
    async fn fetch(
        &mut self,
        route: &Route,
        params: &QueryParams,
        principal: &Principal,
    ) -> Result<Value, BridgeError>;

    /// Create a resource (collection route) or add relationship members (relationship route).
    /// `body` is the raw request document.
    async fn create(
        &mut self,
        route: &Route,
        body: &str,
        principal: &Principal,
        authorization: AuthorizationMode,
    ) -> Result<Value, BridgeError>;

    async fn commit(self: Box<Self>) -> Result<(), BridgeError>;

    async fn rollback(self: Box<Self>) -> Result<(), BridgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_mode_parses_case_insensitively() {
        assert_eq!("Active".parse::<AuthorizationMode>(), Ok(AuthorizationMode::Active));
        assert_eq!(" inactive ".parse::<AuthorizationMode>(), Ok(AuthorizationMode::Inactive));
        assert!("off".parse::<AuthorizationMode>().is_err());
        assert_eq!(AuthorizationMode::default(), AuthorizationMode::Inactive);
    }
}
