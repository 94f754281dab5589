//! Request extractors shared by the resource handlers.

mod accept;
mod principal;

pub use accept::AcceptsJson;
pub use principal::Authenticated;
