//! Error types for collaborator calls.
//!
//! Errors are categorized so stages can decide whether a call is worth
//! retrying before the failure is reported to the flow.

use thiserror::Error;

/// Categories of integration errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection, timeout or unavailable service (transient, retryable)
    Network,
    /// Module, route or resource does not exist
    NotFound,
    /// Already exists or conflicting state
    Conflict,
    /// Credentials rejected
    Unauthorized,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Collaborator unreachable",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Conflicting state",
            Self::Unauthorized => "Unauthorized",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors returned by module installer, gateway and auth collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Request rejected with an optional underlying cause
    #[error("{message}")]
    Request {
        message: String,
        cause: Option<String>,
    },
}

impl Error {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network { .. } => ErrorCategory::Network,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Unauthorized { .. } => ErrorCategory::Unauthorized,
            Self::Request { .. } => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Underlying cause, if the collaborator reported one
    pub fn cause(&self) -> Option<&str> {
        match self {
            Self::Request { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }
}

/// Result type for collaborator calls.
pub type Result<T> = std::result::Result<T, Error>;
