//! Error types for the CloudWatch datasource
//!
//! Every failure is an ordinary returned value recovered at the boundary of
//! the request being served. Nothing in the crate panics on a request path.

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing field in an inbound query model
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The remote metrics/alarms API call failed
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Host request is malformed or names an unknown action
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Built-in namespace or dimension lookup missed the static catalog
    #[error("Not found: {0}")]
    NotFound(String),

    /// A discovery cache refresh failed; the cached entry was left untouched
    #[error("Cache refresh failed for namespace {namespace}: {source}")]
    CacheRefresh {
        /// Namespace whose refresh failed
        namespace: String,
        /// The underlying upstream failure
        #[source]
        source: UpstreamError,
    },

    /// Credentials could not be resolved for the datasource
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// HTTP status the host should answer with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Parse(_) | Error::InvalidRequest(_) => 400,
            Error::NotFound(_) => 404,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Query model parse errors
///
/// Each variant names the offending field so the caller can point at it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Required field is absent
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Field is present with the wrong JSON type
    #[error("Invalid type for {field}: expected {expected}")]
    InvalidType {
        /// Field name (dimension fields are reported as `dimensions.<name>`)
        field: String,
        /// Expected JSON type
        expected: &'static str,
    },

    /// Field has the right type but an unusable value
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Description of the problem
        message: String,
    },
}

impl ParseError {
    /// Name of the field the error refers to
    pub fn field(&self) -> &str {
        match self {
            ParseError::MissingField(field) => field,
            ParseError::InvalidType { field, .. } => field,
            ParseError::InvalidValue { field, .. } => field,
        }
    }
}

/// A remote CloudWatch call failed
///
/// Wraps the underlying cause (network, auth, throttling or API fault). The
/// client adapter never retries; whether to try again is the caller's call.
#[derive(Error, Debug)]
#[error("upstream call {operation} failed: {source}")]
pub struct UpstreamError {
    /// API operation that failed (e.g. `ListMetrics`)
    pub operation: &'static str,
    /// Underlying cause
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl UpstreamError {
    /// Wrap a failure of `operation`
    pub fn new(
        operation: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
