//! Process settings read from the environment (and `.env` via dotenvy).

use crate::auth::InMemoryCredentialStore;
use crate::bridge::AuthorizationMode;
use crate::error::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/gateway";
pub const DEFAULT_REALM: &str = "Realm";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct GatewaySettings {
    pub bind: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub model_path: PathBuf,
    pub realm: String,
    pub create_authorization: AuthorizationMode,
    /// `name:password:ROLE[,ROLE];...`. Unset means the built-in demo users.
    pub users: Option<String>,
    pub max_body_bytes: usize,
}

impl GatewaySettings {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Ok(GatewaySettings {
            bind: parse_or("GATEWAY_BIND", var("GATEWAY_BIND"), DEFAULT_BIND)?,
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", var("DATABASE_MAX_CONNECTIONS"), "5")?,
            model_path: var("MODEL_PATH").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("model")),
            realm: var("GATEWAY_REALM").unwrap_or_else(|| DEFAULT_REALM.into()),
            create_authorization: match var("GATEWAY_CREATE_AUTHORIZATION") {
                Some(v) => v.parse().map_err(|reason| ConfigError::Invalid {
                    name: "GATEWAY_CREATE_AUTHORIZATION",
                    reason,
                })?,
                None => AuthorizationMode::default(),
            },
            users: var("GATEWAY_USERS"),
            max_body_bytes: match var("GATEWAY_MAX_BODY_BYTES") {
                Some(v) => parse_or("GATEWAY_MAX_BODY_BYTES", Some(v), "")?,
                None => DEFAULT_MAX_BODY_BYTES,
            },
        })
    }

    /// Users from `GATEWAY_USERS`, or `admin`/`user` when unset.
    pub fn credential_store(&self) -> Result<InMemoryCredentialStore, ConfigError> {
        match &self.users {
            Some(spec) => InMemoryCredentialStore::from_spec(spec),
            None => Ok(InMemoryCredentialStore::with_defaults()),
        }
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = value.unwrap_or_else(|| default.to_string());
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: format!("'{}': {}", raw, e),
    })
}
