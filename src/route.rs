//! Path resolution: classify a request path into one of the four resource route shapes.
//!
//! Segments are opaque. Entity names and ids are checked by the persistence bridge, not here.

use std::fmt;
use thiserror::Error;

/// Literal segment that marks a relationship view.
pub const RELATIONSHIPS_SEGMENT: &str = "relationships";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteParseError {
    #[error("empty path")]
    Empty,
    #[error("empty segment in path '{0}'")]
    EmptySegment(String),
    #[error("no resource route matches '{0}'")]
    Unmatched(String),
}

/// Classified request path. Built once per request and never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    /// `/{entity}`
    Collection { entity: String },
    /// `/{entity}/{id}`
    Resource { entity: String, id: String },
    /// `/{entity}/{id}/{child}`
    NestedCollection { entity: String, id: String, child: String },
    /// `/{entity}/{id}/relationships/{related}`
    Relationship { entity: String, id: String, related: String },
}

/// Strip one leading separator. Some platforms hand the document layer a backslash instead of
/// a slash, which it then fails to tokenize.
pub fn normalize(raw: &str) -> &str {
    raw.strip_prefix('/')
        .or_else(|| raw.strip_prefix('\\'))
        .unwrap_or(raw)
}

impl Route {
    pub fn parse(raw: &str) -> Result<Route, RouteParseError> {
        let path = normalize(raw);
        if path.is_empty() {
            return Err(RouteParseError::Empty);
        }
        let segments: Vec<&str> = path.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(RouteParseError::EmptySegment(raw.to_string()));
        }
        match segments.as_slice() {
            [entity] => Ok(Route::Collection {
                entity: entity.to_string(),
            }),
            [entity, id] => Ok(Route::Resource {
                entity: entity.to_string(),
                id: id.to_string(),
            }),
            [entity, id, child] => Ok(Route::NestedCollection {
                entity: entity.to_string(),
                id: id.to_string(),
                child: child.to_string(),
            }),
            [entity, id, marker, related] if *marker == RELATIONSHIPS_SEGMENT => Ok(Route::Relationship {
                entity: entity.to_string(),
                id: id.to_string(),
                related: related.to_string(),
            }),
            _ => Err(RouteParseError::Unmatched(raw.to_string())),
        }
    }

    pub fn entity(&self) -> &str {
        match self {
            Route::Collection { entity }
            | Route::Resource { entity, .. }
            | Route::NestedCollection { entity, .. }
            | Route::Relationship { entity, .. } => entity,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Route::Collection { .. } => None,
            Route::Resource { id, .. }
            | Route::NestedCollection { id, .. }
            | Route::Relationship { id, .. } => Some(id),
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Route::Collection { .. } => "collection",
            Route::Resource { .. } => "resource",
            Route::NestedCollection { .. } => "nested collection",
            Route::Relationship { .. } => "relationship",
        }
    }

    /// POST is exposed on collections and relationship views only.
    pub fn accepts_create(&self) -> bool {
        matches!(self, Route::Collection { .. } | Route::Relationship { .. })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Collection { entity } => write!(f, "/{}", entity),
            Route::Resource { entity, id } => write!(f, "/{}/{}", entity, id),
            Route::NestedCollection { entity, id, child } => write!(f, "/{}/{}/{}", entity, id, child),
            Route::Relationship { entity, id, related } => {
                write!(f, "/{}/{}/{}/{}", entity, id, RELATIONSHIPS_SEGMENT, related)
            }
        }
    }
}

impl std::str::FromStr for Route {
    type Err = RouteParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Route::parse(s)
    }
}
