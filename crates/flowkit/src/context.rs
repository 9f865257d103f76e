//! Stage context, flow parameters and listener traits
//!
//! Parameters are scoped: a nested flow sees its own values first and falls
//! back to its parents. Stage results are shared across the whole flow tree
//! but each stage only writes its own slot.

use crate::error::StageError;
use crate::types::ExecutionStatus;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

// ============================================================================
// Parameters
// ============================================================================

/// Scoped key/value parameters
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: BTreeMap<String, Value>,
    parent: Option<Arc<Params>>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Insert any serializable value
    pub fn insert_serialized<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), StageError> {
        let value = serde_json::to_value(value)
            .map_err(|e| StageError::internal(format!("Failed to serialize parameter: {e}")))?;
        self.values.insert(key.into(), value);
        Ok(())
    }

    /// Own values over the given parent scope
    pub fn scoped(&self, parent: Arc<Self>) -> Self {
        Self {
            values: self.values.clone(),
            parent: Some(parent),
        }
    }

    /// Look up a key in this scope, then in enclosing scopes
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self.values.get(key) {
            Some(value) => Some(value),
            None => self.parent.as_ref().and_then(|p| p.get(key)),
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Deserialize a required parameter
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, StageError> {
        let value = self
            .get(key)
            .ok_or_else(|| StageError::internal(format!("Missing flow parameter: {key}")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| StageError::internal(format!("Invalid flow parameter {key}: {e}")))
    }

    /// Values of this scope only
    pub fn own_values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// Stage results
// ============================================================================

/// Results written by stages, keyed by stage path
#[derive(Debug, Default)]
pub struct StageResults {
    slots: Mutex<HashMap<String, Value>>,
}

impl StageResults {
    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, stage_id: &str) -> Option<Value> {
        self.slots().get(stage_id).cloned()
    }

    fn set(&self, stage_id: &str, value: Value) {
        self.slots().insert(stage_id.to_string(), value);
    }
}

// ============================================================================
// Stage context
// ============================================================================

/// Context passed to stage `execute` and `cancel`
#[derive(Debug, Clone)]
pub struct StageContext {
    root_flow_id: String,
    flow_id: String,
    stage_id: String,
    params: Arc<Params>,
    results: Arc<StageResults>,
}

impl StageContext {
    pub(crate) fn new(
        info: &StageInfo,
        params: Arc<Params>,
        results: Arc<StageResults>,
    ) -> Self {
        Self {
            root_flow_id: info.root_flow_id.clone(),
            flow_id: info.flow_id.clone(),
            stage_id: info.id.clone(),
            params,
            results,
        }
    }

    /// Stage context outside of an engine run
    pub fn detached(stage_id: impl Into<String>, params: Params) -> Self {
        let stage_id = stage_id.into();
        Self {
            root_flow_id: stage_id.clone(),
            flow_id: stage_id.clone(),
            stage_id,
            params: Arc::new(params),
            results: Arc::default(),
        }
    }

    /// Id of the top-level flow
    pub fn root_flow_id(&self) -> &str {
        &self.root_flow_id
    }

    /// Id of the innermost flow containing this stage
    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    /// Fully-qualified stage path
    pub fn stage_id(&self) -> &str {
        &self.stage_id
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get_str(key)
    }

    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, StageError> {
        self.params.require(key)
    }

    /// Store this stage's result
    pub fn set_result<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), StageError> {
        let value = serde_json::to_value(value)
            .map_err(|e| StageError::internal(format!("Failed to serialize stage result: {e}")))?;
        self.results.set(&self.stage_id, value);
        Ok(())
    }

    /// This stage's result, if it stored one
    pub fn result(&self) -> Option<Value> {
        self.results.get(&self.stage_id)
    }

    /// Deserialized result of this stage
    pub fn result_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.result().and_then(|v| serde_json::from_value(v).ok())
    }

    /// Result of any stage in the tree, by path
    pub fn result_of(&self, stage_id: &str) -> Option<Value> {
        self.results.get(stage_id)
    }

    /// Result of a sibling stage in the same flow or parallel group
    pub fn sibling_result(&self, name: &str) -> Option<Value> {
        let parent = self
            .stage_id
            .rsplit_once('/')
            .map_or("", |(parent, _)| parent);
        self.results.get(&format!("{parent}/{name}"))
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Identity of a flow or nested flow within a run
#[derive(Debug, Clone)]
pub struct FlowInfo {
    pub id: String,
    /// Enclosing flow, `None` for the top-level flow
    pub parent_id: Option<String>,
    pub root_id: String,
    /// Parameters visible to this flow
    pub params: Arc<Params>,
}

impl FlowInfo {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Identity of a stage within a run
#[derive(Debug, Clone)]
pub struct StageInfo {
    /// Fully-qualified path, e.g. `flow/app-flow/appi-l0/mod-a-installer`
    pub id: String,
    pub name: String,
    /// Innermost enclosing flow
    pub flow_id: String,
    pub root_flow_id: String,
}

/// Listener for flow and stage lifecycle events
///
/// Implement this trait to persist or display progress. Methods may be
/// called from worker threads.
#[allow(unused_variables)]
pub trait FlowListener: Send + Sync {
    /// Flow announced before anything runs
    fn on_flow_queued(&self, flow: &FlowInfo) {}

    /// Stage announced before anything runs
    fn on_stage_queued(&self, stage: &StageInfo) {}

    fn on_flow_start(&self, flow: &FlowInfo) {}

    /// Flow reached a terminal status
    ///
    /// Called again with `Cancelled` or `CancellationFailed` when a finished
    /// nested flow is rolled back by its parent.
    fn on_flow_finish(&self, flow: &FlowInfo, status: ExecutionStatus) {}

    fn on_stage_start(&self, stage: &StageInfo) {}

    fn on_stage_success(&self, stage: &StageInfo) {}

    fn on_stage_error(&self, stage: &StageInfo, detail: &str) {}

    /// Rollback of a finished stage; `status` is `Cancelled` or `CancellationFailed`
    fn on_stage_rollback(&self, stage: &StageInfo, status: ExecutionStatus, detail: &str) {}

    fn on_stage_skipped(&self, stage: &StageInfo, reason: &str) {}
}

/// No-op listener
pub struct NoopListener;

impl FlowListener for NoopListener {}

/// Fans events out to several listeners in order
#[derive(Default)]
pub struct Listeners(Vec<Arc<dyn FlowListener>>);

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, listener: Arc<dyn FlowListener>) -> Self {
        self.0.push(listener);
        self
    }
}

impl FlowListener for Listeners {
    fn on_flow_queued(&self, flow: &FlowInfo) {
        self.0.iter().for_each(|l| l.on_flow_queued(flow));
    }

    fn on_stage_queued(&self, stage: &StageInfo) {
        self.0.iter().for_each(|l| l.on_stage_queued(stage));
    }

    fn on_flow_start(&self, flow: &FlowInfo) {
        self.0.iter().for_each(|l| l.on_flow_start(flow));
    }

    fn on_flow_finish(&self, flow: &FlowInfo, status: ExecutionStatus) {
        self.0.iter().for_each(|l| l.on_flow_finish(flow, status));
    }

    fn on_stage_start(&self, stage: &StageInfo) {
        self.0.iter().for_each(|l| l.on_stage_start(stage));
    }

    fn on_stage_success(&self, stage: &StageInfo) {
        self.0.iter().for_each(|l| l.on_stage_success(stage));
    }

    fn on_stage_error(&self, stage: &StageInfo, detail: &str) {
        self.0.iter().for_each(|l| l.on_stage_error(stage, detail));
    }

    fn on_stage_rollback(&self, stage: &StageInfo, status: ExecutionStatus, detail: &str) {
        self.0
            .iter()
            .for_each(|l| l.on_stage_rollback(stage, status, detail));
    }

    fn on_stage_skipped(&self, stage: &StageInfo, reason: &str) {
        self.0.iter().for_each(|l| l.on_stage_skipped(stage, reason));
    }
}
