//! Error types for the webhook adapter
//!
//! The taxonomy follows what the orchestrator needs to decide on: whether to
//! retry on its next poll (`Transient`), alert an operator (`Authentication`,
//! `Fatal`), or fix a desired record (`Validation`). `NotFound` and
//! `Conflict` are produced by the vendor client and absorbed by the engine.

use std::fmt;

use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the adapter
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or revoked credential (HTTP 401/403)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Network failure, timeout, 5xx or 429; the orchestrator retries on its next poll
    #[error("Transient error: {0}")]
    Transient(String),

    /// Unexpected vendor response (malformed body, unexpected 4xx)
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// Rule does not exist (delete of an already-absent rule)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rule already exists (duplicate create)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Endpoint the vendor cannot represent
    #[error("Invalid endpoint {endpoint}: {reason}")]
    Validation {
        /// Human-readable endpoint description (`name (TYPE)`)
        endpoint: String,
        /// Why the endpoint was rejected
        reason: String,
    },

    /// One or more operations of a change set failed
    #[error("{0}")]
    Apply(ApplyFailures),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a fatal error
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a validation error for an endpoint
    pub fn validation(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short machine-readable name of the error class
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Authentication(_) => "authentication",
            Error::Transient(_) => "transient",
            Error::Fatal(_) => "fatal",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Validation { .. } => "validation",
            Error::Apply(_) => "apply",
            Error::Config(_) => "config",
            Error::Json(_) => "json",
        }
    }

    /// Whether the orchestrator's next poll may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Fatal(err.to_string())
    }
}

/// A single failed subject (an endpoint or a rule operation) and its cause
#[derive(Debug)]
pub struct Failure {
    /// What failed, e.g. `create www.example.com -> 1.2.3.4`
    pub subject: String,
    /// Why it failed
    pub error: Error,
}

impl Failure {
    pub fn new(subject: impl Into<String>, error: Error) -> Self {
        Self {
            subject: subject.into(),
            error,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.error)
    }
}

/// Every failure collected while applying one change set
#[derive(Debug, Default)]
pub struct ApplyFailures {
    pub failures: Vec<Failure>,
}

impl ApplyFailures {
    pub fn new(failures: Vec<Failure>) -> Self {
        Self { failures }
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Failure> {
        self.failures.iter()
    }

    /// Number of failures of the given [`Error::kind`]
    pub fn count_kind(&self, kind: &str) -> usize {
        self.failures
            .iter()
            .filter(|f| f.error.kind() == kind)
            .count()
    }
}

impl fmt::Display for ApplyFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} operation(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}
