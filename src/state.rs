//! Shared application state for all routes. Everything here is immutable after startup.

use crate::auth::CredentialStore;
use crate::bridge::{AuthorizationMode, PersistenceBridge};
use crate::runner::GatewayRunner;
use crate::settings::DEFAULT_REALM;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub runner: GatewayRunner,
    pub credentials: Arc<dyn CredentialStore>,
    /// Realm named in the `WWW-Authenticate` challenge.
    pub realm: Arc<str>,
}

impl AppState {
    pub fn new(bridge: Arc<dyn PersistenceBridge>, credentials: Arc<dyn CredentialStore>) -> Self {
        AppState {
            runner: GatewayRunner::new(bridge),
            credentials,
            realm: Arc::from(DEFAULT_REALM),
        }
    }

    pub fn with_realm(mut self, realm: impl AsRef<str>) -> Self {
        self.realm = Arc::from(realm.as_ref());
        self
    }

    pub fn with_create_authorization(mut self, mode: AuthorizationMode) -> Self {
        self.runner = self.runner.with_create_authorization(mode);
        self
    }
}
