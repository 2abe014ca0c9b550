//! Standardized error types following the `error-registrar-<domain>-<number>` format,
//! plus the OAuth protocol error taxonomy rendered at the HTTP boundary.

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use thiserror::Error;

/// Configuration errors that occur during application startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when a required environment variable is not set
    #[error("error-registrar-config-1 {0} must be set")]
    EnvVarRequired(String),

    /// Error when PORT cannot be parsed
    #[error("error-registrar-config-2 Parsing PORT into u16 failed: {0:?}")]
    PortParsingFailed(std::num::ParseIntError),

    /// Error when version information is not available
    #[error("error-registrar-config-3 One of GIT_HASH or CARGO_PKG_VERSION must be set")]
    VersionNotSet,

    /// Error when a key file cannot be read
    #[error("error-registrar-config-4 Unable to read key file '{0}': {1}")]
    KeyFileUnreadable(String, std::io::Error),

    /// Error when the external base is not an absolute URL
    #[error("error-registrar-config-5 Invalid EXTERNAL_BASE '{0}': {1}")]
    InvalidExternalBase(String, url::ParseError),

    /// Error when the database pool size cannot be parsed
    #[error("error-registrar-config-6 Parsing DATABASE_POOL_SIZE into u32 failed: {0:?}")]
    PoolSizeParsingFailed(std::num::ParseIntError),
}

/// Token codec errors
#[derive(Debug, Error)]
pub enum TokenError {
    /// Key material could not be parsed
    #[error("error-registrar-token-1 Invalid key material: {0}")]
    InvalidKey(String),

    /// Signing the claim set failed
    #[error("error-registrar-token-2 Token signing failed: {0}")]
    SigningFailed(String),

    /// Token header names an algorithm other than RS256
    #[error("error-registrar-token-3 Unexpected signing algorithm: {0}")]
    UnexpectedAlgorithm(String),

    /// Signature, claims, or structure did not verify
    #[error("error-registrar-token-4 Token verification failed: {0}")]
    VerificationFailed(String),
}

/// Database/storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Error when database connection fails
    #[error("error-registrar-storage-1 Database connection failed: {0}")]
    ConnectionFailed(String),

    /// Error when query execution fails
    #[error("error-registrar-storage-2 Query execution failed: {0}")]
    QueryFailed(String),

    /// Error when data serialization fails
    #[error("error-registrar-storage-3 Data serialization failed: {0}")]
    SerializationFailed(String),

    /// Error when database operation fails
    #[error("error-registrar-storage-4 Database error: {0}")]
    DatabaseError(String),

    /// Error when data validation fails
    #[error("error-registrar-storage-5 Invalid data: {0}")]
    InvalidData(String),

    /// Error when a unique column already holds the value
    #[error("error-registrar-storage-6 Value is not unique: {0}")]
    NotUnique(String),

    /// Error when hashing or comparing a secret fails
    #[error("error-registrar-storage-7 Secret hashing failed: {0}")]
    HashingFailed(String),
}

/// Closed vocabulary of protocol error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    AccessDenied,
    UnsupportedGrantType,
    InvalidGrant,
    InternalServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::AccessDenied => "access_denied",
            ErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            ErrorCode::InvalidGrant => "invalid_grant",
            ErrorCode::InternalServerError => "internal_server_error",
        }
    }

    /// `access_denied` is the only code that maps to 401.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::AccessDenied => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol error returned to OAuth callers.
///
/// The description is always safe to expose. Metadata is flattened into the
/// JSON body next to `error` and `error_description`.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
#[error("{code}: {description}")]
pub struct OAuthError {
    #[serde(rename = "error")]
    pub code: ErrorCode,
    #[serde(rename = "error_description")]
    pub description: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl OAuthError {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            metadata: Map::new(),
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, description)
    }

    pub fn access_denied(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::AccessDenied, description)
    }

    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedGrantType, description)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidGrant, description)
    }

    pub fn internal_server_error(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, description)
    }

    /// Attach a metadata entry, e.g. `fields` for validation failures.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

/// Errors surfacing from HTTP handlers.
#[derive(Debug, Error)]
pub enum HttpError {
    /// A protocol error, rendered with its own status
    #[error(transparent)]
    Protocol(#[from] OAuthError),

    /// Anything else reaching the boundary
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HttpError>;

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            HttpError::Protocol(err) => err.into_response(),
            other => {
                tracing::warn!(error = ?other, "non-protocol error reached http boundary");
                let body = json!({ "error_description": other.to_string() });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_access_denied_is_unauthorized() {
        let (status, body) =
            render(OAuthError::access_denied("invalid credentials").into_response()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "access_denied");
        assert_eq!(body["error_description"], "invalid credentials");
    }

    #[tokio::test]
    async fn test_other_codes_are_bad_request() {
        for err in [
            OAuthError::invalid_request("x"),
            OAuthError::unsupported_grant_type("x"),
            OAuthError::invalid_grant("x"),
            OAuthError::internal_server_error("x"),
        ] {
            let (status, _) = render(err.into_response()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_metadata_is_flattened() {
        let err = OAuthError::invalid_request("validation failed")
            .with_metadata("fields", json!({"email": ["email address taken"]}));
        let (_, body) = render(err.into_response()).await;
        assert_eq!(body["error"], "invalid_request");
        assert_eq!(body["fields"]["email"][0], "email address taken");
    }

    #[tokio::test]
    async fn test_unexpected_error_renders_description_only() {
        let err = HttpError::from(anyhow::anyhow!("boom"));
        let (status, body) = render(err.into_response()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("error").is_none());
        assert!(body["error_description"].as_str().unwrap().contains("boom"));
    }

    #[test]
    fn test_display() {
        let err = OAuthError::invalid_grant("refresh token is invalid or expired");
        assert_eq!(
            err.to_string(),
            "invalid_grant: refresh token is invalid or expired"
        );
    }
}
