//! Error types for stages, flows and the engine

use crate::types::{ExecutionStatus, StageReport};
use thiserror::Error;

/// Errors raised by a stage's `execute` or `cancel`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// A remote collaborator rejected or failed the request
    #[error("{message}")]
    Integration {
        message: String,
        cause: Option<String>,
    },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl StageError {
    pub fn integration(message: impl Into<String>) -> Self {
        Self::Integration {
            message: message.into(),
            cause: None,
        }
    }

    pub fn integration_with_cause(message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Integration {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Error kind shown in stage details
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Integration { .. } => "IntegrationError",
            Self::Validation(_) => "ValidationError",
            Self::NotFound(_) => "NotFoundError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// `[Kind] message` with `, cause: ...` appended when known
    pub fn detail(&self) -> String {
        match self {
            Self::Integration {
                message,
                cause: Some(cause),
            } => format!("[{}] {message}, cause: {cause}", self.kind()),
            _ => format!("[{}] {self}", self.kind()),
        }
    }
}

impl From<anyhow::Error> for StageError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

/// Failed outcome of a flow, carrying every non-finished stage entry
#[derive(Error, Debug, Clone)]
pub enum FlowOutcomeError {
    #[error("Flow {flow_id} failed: {}", join_details(.stages))]
    Execution {
        flow_id: String,
        stages: Vec<StageReport>,
    },

    #[error("Flow {flow_id} was cancelled: {}", join_details(.stages))]
    Cancelled {
        flow_id: String,
        stages: Vec<StageReport>,
    },

    #[error("Flow {flow_id} cancellation failed: {}", join_details(.stages))]
    CancellationFailed {
        flow_id: String,
        stages: Vec<StageReport>,
    },
}

impl FlowOutcomeError {
    pub fn flow_id(&self) -> &str {
        match self {
            Self::Execution { flow_id, .. }
            | Self::Cancelled { flow_id, .. }
            | Self::CancellationFailed { flow_id, .. } => flow_id,
        }
    }

    pub fn stages(&self) -> &[StageReport] {
        match self {
            Self::Execution { stages, .. }
            | Self::Cancelled { stages, .. }
            | Self::CancellationFailed { stages, .. } => stages,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        match self {
            Self::Execution { .. } => ExecutionStatus::Failed,
            Self::Cancelled { .. } => ExecutionStatus::Cancelled,
            Self::CancellationFailed { .. } => ExecutionStatus::CancellationFailed,
        }
    }
}

fn join_details(stages: &[StageReport]) -> String {
    stages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Engine-level failures (not stage failures)
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to create thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Flow {0} finished without reporting a result")]
    Disconnected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_with_cause() {
        let err = StageError::integration_with_cause("Failed to create route", "request timed out");
        assert_eq!(
            err.detail(),
            "[IntegrationError] Failed to create route, cause: request timed out"
        );
    }

    #[test]
    fn test_detail_without_cause() {
        assert_eq!(
            StageError::NotFound("Application not found".into()).detail(),
            "[NotFoundError] Application not found"
        );
    }

    #[test]
    fn test_from_anyhow_keeps_chain() {
        let err: StageError = anyhow::anyhow!("inner").context("outer").into();
        assert_eq!(err, StageError::Internal("outer: inner".into()));
    }

    #[test]
    fn test_outcome_display() {
        let err = FlowOutcomeError::Execution {
            flow_id: "f1".into(),
            stages: vec![StageReport {
                stage_id: "f1/s2".into(),
                status: ExecutionStatus::Failed,
                detail: "FAILED: [InternalError] boom".into(),
            }],
        };
        assert_eq!(
            err.to_string(),
            "Flow f1 failed: f1/s2: FAILED: [InternalError] boom"
        );
    }
}
