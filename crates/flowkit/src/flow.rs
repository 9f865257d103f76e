//! Flow tree - sequential flows, nested flows and parallel stage groups

use crate::context::Params;
use crate::stage::{BoxedStage, Stage};
use crate::types::ExecutionStrategy;
use std::sync::Arc;

/// A node in a flow tree
#[derive(Debug)]
pub enum FlowNode {
    Stage(BoxedStage),
    Flow(Flow),
    Parallel(ParallelStage),
}

impl FlowNode {
    /// Name used as this node's path segment
    pub fn name(&self) -> String {
        match self {
            Self::Stage(stage) => stage.name(),
            Self::Flow(flow) => flow.id.clone(),
            Self::Parallel(parallel) => parallel.name.clone(),
        }
    }

    fn collect_stage_paths(&self, parent: &str, out: &mut Vec<String>) {
        let path = format!("{parent}/{}", self.name());
        match self {
            Self::Stage(_) => out.push(path),
            Self::Flow(flow) => flow.collect_stage_paths(&path, out),
            Self::Parallel(parallel) => {
                for child in &parallel.children {
                    child.collect_stage_paths(&path, out);
                }
            }
        }
    }
}

/// Ordered sequence of nodes executed one after another
#[derive(Debug)]
pub struct Flow {
    pub id: String,
    pub strategy: ExecutionStrategy,
    pub params: Params,
    pub nodes: Vec<FlowNode>,
    /// Disqualified flows are reported as skipped and never run
    pub skip_reason: Option<String>,
}

impl Flow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            strategy: ExecutionStrategy::default(),
            params: Params::new(),
            nodes: Vec::new(),
            skip_reason: None,
        }
    }

    #[must_use]
    pub fn strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key, value);
        self
    }

    #[must_use]
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.nodes.push(FlowNode::Stage(Arc::new(stage)));
        self
    }

    #[must_use]
    pub fn boxed_stage(mut self, stage: BoxedStage) -> Self {
        self.nodes.push(FlowNode::Stage(stage));
        self
    }

    #[must_use]
    pub fn flow(mut self, flow: Self) -> Self {
        self.nodes.push(FlowNode::Flow(flow));
        self
    }

    #[must_use]
    pub fn parallel(mut self, parallel: ParallelStage) -> Self {
        self.nodes.push(FlowNode::Parallel(parallel));
        self
    }

    pub fn push(&mut self, node: FlowNode) {
        self.nodes.push(node);
    }

    /// Mark the flow as skipped with a reason
    #[must_use]
    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Paths of every leaf stage, in declaration order
    pub fn stage_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_stage_paths(&self.id, &mut out);
        out
    }

    pub fn stage_count(&self) -> usize {
        self.stage_paths().len()
    }

    fn collect_stage_paths(&self, path: &str, out: &mut Vec<String>) {
        for node in &self.nodes {
            node.collect_stage_paths(path, out);
        }
    }
}

/// Children executed concurrently
///
/// Fails if any child fails; successful children are rolled back by the
/// enclosing flow when its strategy is cancel-on-error.
#[derive(Debug)]
pub struct ParallelStage {
    pub name: String,
    pub children: Vec<FlowNode>,
}

impl ParallelStage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.children.push(FlowNode::Stage(Arc::new(stage)));
        self
    }

    #[must_use]
    pub fn flow(mut self, flow: Flow) -> Self {
        self.children.push(FlowNode::Flow(flow));
        self
    }

    pub fn push(&mut self, node: FlowNode) {
        self.children.push(node);
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
