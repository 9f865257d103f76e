//! Core types for flow execution

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status shared by flows, nested flows and stages
///
/// `Queued -> InProgress -> {Finished | Failed | Skipped | Cancelled | CancellationFailed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Queued,
    InProgress,
    Finished,
    Failed,
    Skipped,
    Cancelled,
    CancellationFailed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
            Self::Cancelled => "CANCELLED",
            Self::CancellationFailed => "CANCELLATION_FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "QUEUED" => Some(Self::Queued),
            "IN_PROGRESS" => Some(Self::InProgress),
            "FINISHED" => Some(Self::Finished),
            "FAILED" => Some(Self::Failed),
            "SKIPPED" => Some(Self::Skipped),
            "CANCELLED" => Some(Self::Cancelled),
            "CANCELLATION_FAILED" => Some(Self::CancellationFailed),
            _ => None,
        }
    }

    /// Reached an end state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::InProgress)
    }

    /// Terminal state that counts as a failure for the parent
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Cancelled | Self::CancellationFailed
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a flow does when one of its children fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStrategy {
    /// Stop, then roll back completed siblings in reverse order
    #[default]
    CancelOnError,
    /// Record the failure and keep running siblings
    IgnoreOnError,
}

/// Terminal outcome of a single stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    Finished,
    Failed(String),
    Cancelled(String),
    CancellationFailed(String),
    Skipped(String),
}

impl StageOutcome {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            Self::Finished => ExecutionStatus::Finished,
            Self::Failed(_) => ExecutionStatus::Failed,
            Self::Cancelled(_) => ExecutionStatus::Cancelled,
            Self::CancellationFailed(_) => ExecutionStatus::CancellationFailed,
            Self::Skipped(_) => ExecutionStatus::Skipped,
        }
    }

    /// Detail string, empty for `Finished`
    pub fn detail(&self) -> &str {
        match self {
            Self::Finished => "",
            Self::Failed(d) | Self::Cancelled(d) | Self::CancellationFailed(d) | Self::Skipped(d) => {
                d
            }
        }
    }
}

/// One non-finished entry of a flow report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Fully-qualified stage or flow path
    pub stage_id: String,
    pub status: ExecutionStatus,
    /// e.g. `FAILED: [IntegrationError] timeout, cause: connection reset`
    pub detail: String,
}

impl StageReport {
    pub fn new(stage_id: impl Into<String>, outcome: StageOutcome) -> Self {
        Self {
            stage_id: stage_id.into(),
            status: outcome.status(),
            detail: outcome.detail().to_string(),
        }
    }

    /// Rebuilds the tagged outcome from the status and detail
    pub fn outcome(&self) -> StageOutcome {
        let detail = self.detail.clone();
        match self.status {
            ExecutionStatus::Failed => StageOutcome::Failed(detail),
            ExecutionStatus::Cancelled => StageOutcome::Cancelled(detail),
            ExecutionStatus::CancellationFailed => StageOutcome::CancellationFailed(detail),
            ExecutionStatus::Skipped => StageOutcome::Skipped(detail),
            _ => StageOutcome::Finished,
        }
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage_id, self.detail)
    }
}

/// Result of executing a whole flow tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowReport {
    pub flow_id: String,
    pub status: ExecutionStatus,
    /// Failures, rollbacks and skips in execution/rollback order
    pub stages: Vec<StageReport>,
}

impl FlowReport {
    /// Finished (or skipped as a whole) without failures
    pub fn is_success(&self) -> bool {
        !self.status.is_failure()
    }

    /// Entries with the given status
    pub fn with_status(&self, status: ExecutionStatus) -> impl Iterator<Item = &StageReport> {
        self.stages.iter().filter(move |s| s.status == status)
    }

    /// Convert a failed report into a [`crate::FlowOutcomeError`]
    pub fn into_result(self) -> Result<Self, crate::FlowOutcomeError> {
        use crate::FlowOutcomeError;

        match self.status {
            ExecutionStatus::Finished | ExecutionStatus::Skipped => Ok(self),
            ExecutionStatus::Cancelled => Err(FlowOutcomeError::Cancelled {
                flow_id: self.flow_id,
                stages: self.stages,
            }),
            ExecutionStatus::CancellationFailed => Err(FlowOutcomeError::CancellationFailed {
                flow_id: self.flow_id,
                stages: self.stages,
            }),
            ExecutionStatus::Failed | ExecutionStatus::Queued | ExecutionStatus::InProgress => {
                Err(FlowOutcomeError::Execution {
                    flow_id: self.flow_id,
                    stages: self.stages,
                })
            }
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker threads for parallel stages and async flows
    pub pool_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { pool_size: 4 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_names() {
        for status in [
            ExecutionStatus::Queued,
            ExecutionStatus::InProgress,
            ExecutionStatus::Finished,
            ExecutionStatus::Failed,
            ExecutionStatus::Skipped,
            ExecutionStatus::Cancelled,
            ExecutionStatus::CancellationFailed,
        ] {
            assert_eq!(ExecutionStatus::parse(status.as_str()), Some(status));
        }
        assert!(!ExecutionStatus::InProgress.is_terminal());
        assert!(ExecutionStatus::Skipped.is_terminal());
        assert!(!ExecutionStatus::Skipped.is_failure());
    }

    #[test]
    fn test_into_result() {
        let report = FlowReport {
            flow_id: "f".into(),
            status: ExecutionStatus::CancellationFailed,
            stages: vec![StageReport {
                stage_id: "f/s1".into(),
                status: ExecutionStatus::CancellationFailed,
                detail: "CANCELLATION_FAILED: [InternalError] boom".into(),
            }],
        };

        let err = report.into_result().unwrap_err();
        assert_eq!(err.status(), ExecutionStatus::CancellationFailed);
        assert_eq!(err.stages().len(), 1);
    }

    #[test]
    fn test_report_from_outcome() {
        let report = StageReport::new("f/s2", StageOutcome::Failed("FAILED: [ValidationError] bad".into()));
        assert_eq!(report.status, ExecutionStatus::Failed);
        assert_eq!(report.to_string(), "f/s2: FAILED: [ValidationError] bad");
        assert_eq!(
            report.outcome(),
            StageOutcome::Failed("FAILED: [ValidationError] bad".into())
        );
        assert_eq!(StageOutcome::Finished.detail(), "");
    }
}
