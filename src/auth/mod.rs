//! Authentication: credential store, Basic header parsing, and the request gate.

pub mod basic;
mod credentials;
mod gate;

pub use credentials::{AuthFailure, CredentialStore, InMemoryCredentialStore, Principal};
pub use gate::require_basic_auth;
