//! Persisted record types

use chrono::{DateTime, Utc};
use flowkit::ExecutionStatus;
use serde::Serialize;

/// Root flow of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowRecord {
    pub id: String,
    pub tenant_id: String,
    /// ENTITLE, REVOKE, UPGRADE or STATE
    pub entitlement_type: String,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Filled when the flow is loaded with its children
    pub application_flows: Vec<ApplicationFlowRecord>,
}

/// Per-application unit of a flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationFlowRecord {
    pub id: String,
    pub flow_id: String,
    pub tenant_id: String,
    pub application_id: String,
    pub entitlement_type: String,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Filled when stages are requested
    pub stages: Vec<StageRecord>,
}

/// One stage, addressed by its fully-qualified path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub id: String,
    /// Innermost flow owning the stage
    pub flow_id: String,
    pub name: String,
    pub status: ExecutionStatus,
    pub detail: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// An application entitled for a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entitlement {
    pub tenant_id: String,
    pub application_id: String,
    pub created_at: DateTime<Utc>,
}

/// New root flow row
#[derive(Debug, Clone)]
pub struct NewFlow<'a> {
    pub id: &'a str,
    pub tenant_id: &'a str,
    pub entitlement_type: &'a str,
}

/// New application flow row
#[derive(Debug, Clone)]
pub struct NewApplicationFlow<'a> {
    pub id: &'a str,
    pub flow_id: &'a str,
    pub tenant_id: &'a str,
    pub application_id: &'a str,
    pub entitlement_type: &'a str,
}
