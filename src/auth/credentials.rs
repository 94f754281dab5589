//! Credential store: username/password/role tuples resolved to a [`Principal`].
//!
//! Passwords are compared as plain strings and never expire. The in-memory store is meant for
//! demos and tests; a real identity provider plugs in behind [`CredentialStore`].

use crate::error::ConfigError;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Authenticated identity attached to a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    identity: String,
    roles: BTreeSet<String>,
}

impl Principal {
    pub fn new<I, R>(identity: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Principal {
            identity: identity.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// True when `required` is empty or shares at least one role with the principal.
    pub fn satisfies(&self, required: &[String]) -> bool {
        required.is_empty() || required.iter().any(|r| self.has_role(r))
    }
}

/// Unknown user and wrong password are deliberately the same error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("authentication failed")]
pub struct AuthFailure;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn resolve(&self, username: &str, password: &str) -> Result<Principal, AuthFailure>;
}

#[derive(Clone, Debug)]
struct UserRecord {
    password: String,
    roles: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryCredentialStore {
    users: HashMap<String, UserRecord>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `admin/admin` with ADMIN and `user/user` with USER.
    pub fn with_defaults() -> Self {
        InMemoryCredentialStore::new()
            .with_user("admin", "admin", ["ADMIN"])
            .with_user("user", "user", ["USER"])
    }

    pub fn with_user<I, R>(mut self, username: &str, password: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.users.insert(
            username.to_string(),
            UserRecord {
                password: password.to_string(),
                roles: roles.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Parse `name:password:ROLE[,ROLE];name:password:ROLE`. Passwords may not contain `:` or `;`.
    pub fn from_spec(spec: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            name: "GATEWAY_USERS",
            reason,
        };
        let mut store = InMemoryCredentialStore::new();
        for entry in spec.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.splitn(3, ':');
            let (Some(name), Some(password), Some(roles)) = (parts.next(), parts.next(), parts.next()) else {
                return Err(invalid(format!("expected name:password:roles, got '{}'", entry)));
            };
            if name.is_empty() {
                return Err(invalid("empty user name".into()));
            }
            if store.users.contains_key(name) {
                return Err(invalid(format!("duplicate user '{}'", name)));
            }
            let roles: Vec<&str> = roles.split(',').map(str::trim).filter(|r| !r.is_empty()).collect();
            store = store.with_user(name, password, roles);
        }
        if store.users.is_empty() {
            return Err(invalid("no users defined".into()));
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn resolve(&self, username: &str, password: &str) -> Result<Principal, AuthFailure> {
        match self.users.get(username) {
            Some(user) if user.password == password => Ok(Principal::new(username, user.roles.iter().cloned())),
            _ => Err(AuthFailure),
        }
    }
}
