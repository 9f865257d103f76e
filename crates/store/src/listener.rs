//! Flow listener persisting lifecycle events

use crate::Store;
use crate::types::{NewApplicationFlow, NewFlow};
use flowkit::{ExecutionStatus, FlowInfo, FlowListener, StageInfo};
use std::sync::Arc;

/// Flow parameter holding the tenant id
pub const TENANT_PARAM: &str = "tenantId";
/// Flow parameter holding the entitlement type
pub const TYPE_PARAM: &str = "type";
/// Nested-flow parameter holding the application id
pub const APPLICATION_ID_PARAM: &str = "applicationId";

/// Writes flow, application flow and stage rows as the engine reports them
///
/// The root flow maps to a flow row, nested flows to application flow rows
/// and leaf stages to stage rows. Storage errors are logged, never raised
/// into the engine.
pub struct StoreListener {
    store: Arc<Store>,
}

impl StoreListener {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn report(&self, what: &str, id: &str, result: crate::Result<impl Sized>) {
        if let Err(e) = result {
            log::error!("Failed to persist {what} {id}: {e}");
        }
    }

    fn flow_status(&self, flow: &FlowInfo, status: ExecutionStatus) {
        let result = if flow.is_root() {
            self.store.update_flow_status(&flow.id, status)
        } else {
            self.store.update_application_flow_status(&flow.id, status)
        };
        self.report("flow status", &flow.id, result);
    }

    fn stage_status(&self, stage: &StageInfo, status: ExecutionStatus, detail: Option<&str>) {
        let result = self.store.update_stage_status(&stage.id, status, detail);
        self.report("stage status", &stage.id, result);
    }
}

impl FlowListener for StoreListener {
    fn on_flow_queued(&self, flow: &FlowInfo) {
        let tenant_id = flow.params.get_str(TENANT_PARAM).unwrap_or_default();
        let entitlement_type = flow.params.get_str(TYPE_PARAM).unwrap_or_default();

        let result = if flow.is_root() {
            self.store.insert_flow(&NewFlow {
                id: &flow.id,
                tenant_id,
                entitlement_type,
            })
        } else {
            self.store.insert_application_flow(&NewApplicationFlow {
                id: &flow.id,
                flow_id: &flow.root_id,
                tenant_id,
                application_id: flow.params.get_str(APPLICATION_ID_PARAM).unwrap_or_default(),
                entitlement_type,
            })
        };
        self.report("flow", &flow.id, result);
    }

    fn on_stage_queued(&self, stage: &StageInfo) {
        let result = self.store.insert_stage(&stage.id, &stage.flow_id, &stage.name);
        self.report("stage", &stage.id, result);
    }

    fn on_flow_start(&self, flow: &FlowInfo) {
        self.flow_status(flow, ExecutionStatus::InProgress);
    }

    fn on_flow_finish(&self, flow: &FlowInfo, status: ExecutionStatus) {
        self.flow_status(flow, status);
    }

    fn on_stage_start(&self, stage: &StageInfo) {
        self.stage_status(stage, ExecutionStatus::InProgress, None);
    }

    fn on_stage_success(&self, stage: &StageInfo) {
        self.stage_status(stage, ExecutionStatus::Finished, None);
    }

    fn on_stage_error(&self, stage: &StageInfo, detail: &str) {
        self.stage_status(stage, ExecutionStatus::Failed, Some(detail));
    }

    fn on_stage_rollback(&self, stage: &StageInfo, status: ExecutionStatus, detail: &str) {
        self.stage_status(stage, status, Some(detail));
    }

    fn on_stage_skipped(&self, stage: &StageInfo, reason: &str) {
        self.stage_status(
            stage,
            ExecutionStatus::Skipped,
            Some(&format!("SKIPPED: {reason}")),
        );
    }
}
