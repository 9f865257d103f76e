//! Error types for the appgraph crate

use thiserror::Error;

/// Errors raised while resolving, layering or planning applications.
///
/// Everything except [`Error::NotFound`] is a validation failure: the input
/// cannot be turned into a safe execution order and no work may start.
#[derive(Error, Debug)]
pub enum Error {
    /// Input graph or request is invalid (cycles, empty universe, ...)
    #[error("{0}")]
    Validation(String),

    /// A referenced application could not be resolved
    #[error("{0}")]
    NotFound(String),

    /// Version or version range failed to parse
    #[error("invalid version '{value}': {source}")]
    InvalidVersion {
        value: String,
        #[source]
        source: semver::Error,
    },

    /// Identifier is not in `{name}-{version}` form
    #[error("invalid identifier '{0}': expected '<name>-<semver>'")]
    InvalidId(String),
}

impl Error {
    /// Shorthand for a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Error category name used in user-facing reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFoundError",
            Self::Validation(_) | Self::InvalidVersion { .. } | Self::InvalidId(_) => {
                "ValidationError"
            }
        }
    }

    /// Whether this error is a validation failure
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }
}

/// Result type for appgraph operations
pub type Result<T> = std::result::Result<T, Error>;
