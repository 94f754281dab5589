//! Typed errors and HTTP mapping.

use crate::route::RouteParseError;
use axum::extract::rejection::StringRejection;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while loading settings or the resource model.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} id '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: table {table_id} column {column}")]
    InvalidPrimaryKey { table_id: String, column: String },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("reserved path segment: {0}")]
    ReservedPathSegment(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Failures surfaced by a persistence bridge. Propagated to the client as-is.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
            BridgeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BridgeError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BridgeError::Forbidden(_) => StatusCode::FORBIDDEN,
            BridgeError::Conflict(_) => StatusCode::CONFLICT,
            BridgeError::Db(e) => match db_error_kind(e) {
                DbErrorKind::RowNotFound => StatusCode::NOT_FOUND,
                DbErrorKind::Integrity => StatusCode::CONFLICT,
                DbErrorKind::NotNull | DbErrorKind::InvalidValue => StatusCode::UNPROCESSABLE_ENTITY,
                DbErrorKind::Other => StatusCode::INTERNAL_SERVER_ERROR,
            },
            BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            BridgeError::NotFound(_) => "not_found",
            BridgeError::BadRequest(_) => "bad_request",
            BridgeError::Validation(_) => "validation_error",
            BridgeError::Forbidden(_) => "forbidden",
            BridgeError::Conflict(_) => "conflict",
            BridgeError::Db(e) => match db_error_kind(e) {
                DbErrorKind::RowNotFound => "not_found",
                DbErrorKind::Integrity => "conflict",
                DbErrorKind::NotNull | DbErrorKind::InvalidValue => "validation_error",
                DbErrorKind::Other => "database_error",
            },
            BridgeError::Internal(_) => "internal_error",
        }
    }

    /// Client-facing detail. Database messages stay in the logs.
    fn detail(&self) -> String {
        match self {
            BridgeError::Db(e) => match db_error_kind(e) {
                DbErrorKind::RowNotFound => "resource not found".into(),
                DbErrorKind::Integrity => "integrity constraint violated".into(),
                DbErrorKind::NotNull => "a required attribute is missing".into(),
                DbErrorKind::InvalidValue => "an attribute value has the wrong type or format".into(),
                DbErrorKind::Other => "database error".into(),
            },
            BridgeError::Internal(_) => "internal error".into(),
            BridgeError::NotFound(msg)
            | BridgeError::BadRequest(msg)
            | BridgeError::Validation(msg)
            | BridgeError::Forbidden(msg)
            | BridgeError::Conflict(msg) => msg.clone(),
        }
    }
}

enum DbErrorKind {
    RowNotFound,
    Integrity,
    NotNull,
    InvalidValue,
    Other,
}

fn db_error_kind(e: &sqlx::Error) -> DbErrorKind {
    match e {
        sqlx::Error::RowNotFound => DbErrorKind::RowNotFound,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // unique_violation, foreign_key_violation
            Some("23505") | Some("23503") => DbErrorKind::Integrity,
            Some("23502") => DbErrorKind::NotNull,
            // invalid_text_representation, numeric_value_out_of_range, datetime format and range
            Some("22P02") | Some("22003") | Some("22007") | Some("22008") => DbErrorKind::InvalidValue,
            _ => DbErrorKind::Other,
        },
        _ => DbErrorKind::Other,
    }
}

/// Everything that can end a request before or during dispatch.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("authentication required")]
    Unauthorized { realm: String },
    #[error(transparent)]
    Route(#[from] RouteParseError),
    #[error("method {method} not allowed on {shape} routes")]
    MethodNotAllowed { method: String, shape: &'static str },
    #[error("not acceptable: {0}")]
    NotAcceptable(String),
    #[error("{detail}")]
    Body { status: StatusCode, detail: String },
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("transaction failed: {0}")]
    Transaction(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::Route(_) => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            GatewayError::Body { status, .. } => *status,
            GatewayError::Bridge(e) => e.status(),
            GatewayError::Transaction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized { .. } => "unauthorized",
            GatewayError::Route(_) => "not_found",
            GatewayError::MethodNotAllowed { .. } => "method_not_allowed",
            GatewayError::NotAcceptable(_) => "not_acceptable",
            GatewayError::Body { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE => "payload_too_large",
            GatewayError::Body { .. } => "bad_request",
            GatewayError::Bridge(e) => e.code(),
            GatewayError::Transaction(_) => "transaction_error",
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            GatewayError::Unauthorized { .. } => None,
            GatewayError::Bridge(e) => Some(e.detail()),
            GatewayError::Transaction(_) => Some("transaction could not be completed".into()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub errors: Vec<ErrorObject>,
}

#[derive(Serialize, Debug)]
pub struct ErrorObject {
    pub status: String,
    pub code: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorBody {
    pub fn single(status: StatusCode, code: &str, detail: Option<String>) -> Self {
        ErrorBody {
            errors: vec![ErrorObject {
                status: status.as_u16().to_string(),
                code: code.to_string(),
                title: status.canonical_reason().unwrap_or("Error").to_string(),
                detail,
            }],
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody::single(status, self.code(), self.detail());
        let mut response = (status, Json(body)).into_response();
        if let GatewayError::Unauthorized { realm } = &self {
            let challenge = format!("Basic realm=\"{}\"", realm.replace('"', ""));
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}

/// Body extraction failures, typically an oversized or non-UTF-8 body.
impl From<StringRejection> for GatewayError {
    fn from(rejection: StringRejection) -> Self {
        GatewayError::Body {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        GatewayError::from(self).into_response()
    }
}
