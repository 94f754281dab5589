//! Content negotiation: responses are JSON documents only.

use crate::error::GatewayError;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

const ACCEPTABLE: &[&str] = &["*/*", "application/*", "application/json", "application/vnd.api+json"];

/// Passes when the `Accept` header is absent or admits a JSON document.
#[derive(Clone, Copy, Debug)]
pub struct AcceptsJson;

#[async_trait]
impl<S> FromRequestParts<S> for AcceptsJson
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(header::ACCEPT) else {
            return Ok(AcceptsJson);
        };
        let value = value
            .to_str()
            .map_err(|_| GatewayError::NotAcceptable("unreadable Accept header".into()))?;
        if accepts_json(value) {
            Ok(AcceptsJson)
        } else {
            Err(GatewayError::NotAcceptable(format!("cannot produce any of: {}", value)))
        }
    }
}

pub(crate) fn accepts_json(accept: &str) -> bool {
    if accept.trim().is_empty() {
        return true;
    }
    accept.split(',').any(|range| {
        let media = range.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        ACCEPTABLE.contains(&media.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::accepts_json;

    #[test]
    fn json_ranges_are_accepted() {
        assert!(accepts_json("application/json"));
        assert!(accepts_json("application/vnd.api+json"));
        assert!(accepts_json("text/html, application/json;q=0.9"));
        assert!(accepts_json("*/*"));
        assert!(accepts_json("Application/JSON"));
        assert!(accepts_json(""));
    }

    #[test]
    fn other_media_types_are_refused() {
        assert!(!accepts_json("text/html"));
        assert!(!accepts_json("application/xml, text/plain"));
    }
}
