//! Execution engine - runs flow trees with parallel groups and rollback

use crate::context::{FlowInfo, FlowListener, Params, StageContext, StageInfo, StageResults};
use crate::error::EngineError;
use crate::flow::{Flow, FlowNode, ParallelStage};
use crate::stage::BoxedStage;
use crate::types::{
    EngineConfig, ExecutionStatus, ExecutionStrategy, FlowReport, StageOutcome, StageReport,
};
use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};

const SKIPPED_AFTER_FAILURE: &str = "Flow stopped after a failed stage";

/// Flow execution engine
///
/// Owns a worker pool used for parallel stage groups and asynchronous
/// flows. Every lifecycle event is reported to the listener.
pub struct Engine {
    pool: Arc<rayon::ThreadPool>,
    listener: Arc<dyn FlowListener>,
}

impl Engine {
    pub fn new(config: &EngineConfig, listener: Arc<dyn FlowListener>) -> Result<Self, EngineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.pool_size.max(1))
            .thread_name(|i| format!("flow-worker-{i}"))
            .panic_handler(|_| log::error!("Flow worker panicked"))
            .build()?;

        Ok(Self {
            pool: Arc::new(pool),
            listener,
        })
    }

    /// Execute a flow and block until it reaches a terminal status
    pub fn execute(&self, flow: &Flow) -> FlowReport {
        let runner = Runner::new(&self.pool, self.listener.as_ref(), &flow.id);
        runner.announce(flow);
        runner.run_root(flow)
    }

    /// Queue a flow and return immediately
    ///
    /// The flow and its stages are announced as queued before this returns.
    pub fn execute_async(&self, flow: Flow) -> FlowHandle {
        Runner::new(&self.pool, self.listener.as_ref(), &flow.id).announce(&flow);

        let (sender, receiver) = mpsc::channel();
        let flow_id = flow.id.clone();
        let pool = Arc::clone(&self.pool);
        let listener = Arc::clone(&self.listener);

        self.pool.spawn(move || {
            let report = Runner::new(&pool, listener.as_ref(), &flow.id).run_root(&flow);
            if sender.send(report).is_err() {
                log::debug!("Flow {} finished after its handle was dropped", flow.id);
            }
        });

        FlowHandle { flow_id, receiver }
    }
}

/// Handle to a flow running in the background
pub struct FlowHandle {
    flow_id: String,
    receiver: mpsc::Receiver<FlowReport>,
}

impl fmt::Debug for FlowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowHandle")
            .field("flow_id", &self.flow_id)
            .finish_non_exhaustive()
    }
}

impl FlowHandle {
    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    /// Block until the flow completes
    pub fn wait(self) -> Result<FlowReport, EngineError> {
        let Self { flow_id, receiver } = self;
        receiver
            .recv()
            .map_err(|_| EngineError::Disconnected(flow_id))
    }

    /// Report if the flow already completed
    pub fn try_wait(&self) -> Option<FlowReport> {
        self.receiver.try_recv().ok()
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Work that completed and may be compensated
enum Completed<'f> {
    Stage {
        stage: &'f BoxedStage,
        info: StageInfo,
        ctx: StageContext,
    },
    Flow {
        info: FlowInfo,
        children: Vec<Completed<'f>>,
    },
    Parallel {
        children: Vec<Completed<'f>>,
    },
}

struct NodeRun<'f> {
    status: ExecutionStatus,
    /// Finished work, or the finished part of a failed parallel group
    completed: Option<Completed<'f>>,
    events: Vec<StageReport>,
}

struct Runner<'r> {
    pool: &'r rayon::ThreadPool,
    listener: &'r dyn FlowListener,
    results: Arc<StageResults>,
    root_id: String,
}

impl<'r> Runner<'r> {
    fn new(pool: &'r rayon::ThreadPool, listener: &'r dyn FlowListener, root_id: &str) -> Self {
        Self {
            pool,
            listener,
            results: Arc::default(),
            root_id: root_id.to_string(),
        }
    }

    fn flow_info(&self, flow: &Flow, parent: Option<&FlowInfo>) -> FlowInfo {
        let scope = parent.map_or_else(|| Arc::new(Params::new()), |p| Arc::clone(&p.params));
        FlowInfo {
            id: flow.id.clone(),
            parent_id: parent.map(|p| p.id.clone()),
            root_id: self.root_id.clone(),
            params: Arc::new(flow.params.scoped(scope)),
        }
    }

    fn stage_info(&self, name: String, flow: &FlowInfo, path: &str) -> StageInfo {
        StageInfo {
            id: format!("{path}/{name}"),
            name,
            flow_id: flow.id.clone(),
            root_flow_id: self.root_id.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Announcement and skipping
    // ------------------------------------------------------------------------

    fn announce(&self, flow: &Flow) {
        let info = self.flow_info(flow, None);
        self.listener.on_flow_queued(&info);
        self.announce_nodes(&flow.nodes, &info, &flow.id);
    }

    fn announce_nodes(&self, nodes: &[FlowNode], flow: &FlowInfo, path: &str) {
        for node in nodes {
            match node {
                FlowNode::Stage(stage) => {
                    self.listener
                        .on_stage_queued(&self.stage_info(stage.name(), flow, path));
                }
                FlowNode::Flow(child) => {
                    let info = self.flow_info(child, Some(flow));
                    self.listener.on_flow_queued(&info);
                    self.announce_nodes(&child.nodes, &info, &format!("{path}/{}", child.id));
                }
                FlowNode::Parallel(parallel) => {
                    self.announce_nodes(
                        &parallel.children,
                        flow,
                        &format!("{path}/{}", parallel.name),
                    );
                }
            }
        }
    }

    /// Mark never-entered nodes as skipped
    fn skip_nodes(&self, nodes: &[FlowNode], flow: &FlowInfo, path: &str, reason: &str) {
        for node in nodes {
            match node {
                FlowNode::Stage(stage) => {
                    self.listener
                        .on_stage_skipped(&self.stage_info(stage.name(), flow, path), reason);
                }
                FlowNode::Flow(child) => {
                    let info = self.flow_info(child, Some(flow));
                    self.skip_nodes(&child.nodes, &info, &format!("{path}/{}", child.id), reason);
                    self.listener.on_flow_finish(&info, ExecutionStatus::Skipped);
                }
                FlowNode::Parallel(parallel) => {
                    self.skip_nodes(
                        &parallel.children,
                        flow,
                        &format!("{path}/{}", parallel.name),
                        reason,
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    fn run_root<'f>(&self, flow: &'f Flow) -> FlowReport {
        log::info!("Executing flow {}", flow.id);
        let run = self.run_flow(flow, None, None);
        log::info!("Flow {} completed with status {}", flow.id, run.status);

        FlowReport {
            flow_id: flow.id.clone(),
            status: run.status,
            stages: run.events,
        }
    }

    fn run_node<'f>(&self, node: &'f FlowNode, flow: &FlowInfo, path: &str) -> NodeRun<'f> {
        match node {
            FlowNode::Stage(stage) => self.run_stage(stage, flow, path),
            FlowNode::Flow(child) => self.run_flow(child, Some(flow), Some(path)),
            FlowNode::Parallel(parallel) => self.run_parallel(parallel, flow, path),
        }
    }

    fn run_stage<'f>(&self, stage: &'f BoxedStage, flow: &FlowInfo, path: &str) -> NodeRun<'f> {
        let info = self.stage_info(stage.name(), flow, path);
        let ctx = StageContext::new(&info, Arc::clone(&flow.params), Arc::clone(&self.results));

        self.listener.on_stage_start(&info);
        log::debug!("Stage {} started", info.id);

        match stage.execute(&ctx) {
            Ok(()) => {
                log::debug!("Stage {} finished", info.id);
                self.listener.on_stage_success(&info);
                NodeRun {
                    status: ExecutionStatus::Finished,
                    completed: Some(Completed::Stage { stage, info, ctx }),
                    events: Vec::new(),
                }
            }
            Err(err) => {
                let detail = format!("FAILED: {}", err.detail());
                log::warn!("Stage {} failed: {}", info.id, err.detail());
                self.listener.on_stage_error(&info, &detail);
                NodeRun {
                    status: ExecutionStatus::Failed,
                    completed: None,
                    events: vec![StageReport::new(info.id, StageOutcome::Failed(detail))],
                }
            }
        }
    }

    fn run_flow<'f>(
        &self,
        flow: &'f Flow,
        parent: Option<&FlowInfo>,
        parent_path: Option<&str>,
    ) -> NodeRun<'f> {
        let info = self.flow_info(flow, parent);
        let path = match parent_path {
            Some(parent_path) => format!("{parent_path}/{}", flow.id),
            None => flow.id.clone(),
        };

        if let Some(reason) = &flow.skip_reason {
            log::info!("Flow {path} skipped: {reason}");
            self.skip_nodes(&flow.nodes, &info, &path, reason);
            self.listener.on_flow_finish(&info, ExecutionStatus::Skipped);
            return NodeRun {
                status: ExecutionStatus::Skipped,
                completed: None,
                events: vec![StageReport::new(
                    path,
                    StageOutcome::Skipped(format!("SKIPPED: {reason}")),
                )],
            };
        }

        self.listener.on_flow_start(&info);
        log::debug!("Flow {path} started");

        let mut completed = Vec::new();
        let mut events = Vec::new();
        let mut failed = false;

        for (index, node) in flow.nodes.iter().enumerate() {
            let run = self.run_node(node, &info, &path);
            events.extend(run.events);

            if !run.status.is_failure() {
                completed.extend(run.completed);
                continue;
            }

            failed = true;
            if flow.strategy == ExecutionStrategy::IgnoreOnError {
                continue;
            }

            // Partial work of the failed node first, then earlier siblings
            let mut rolled_back = run.status != ExecutionStatus::CancellationFailed;
            if let Some(partial) = run.completed {
                rolled_back &= self.rollback(partial, &mut events);
            }
            for done in completed.into_iter().rev() {
                rolled_back &= self.rollback(done, &mut events);
            }
            self.skip_nodes(&flow.nodes[index + 1..], &info, &path, SKIPPED_AFTER_FAILURE);

            let status = if rolled_back {
                ExecutionStatus::Cancelled
            } else {
                ExecutionStatus::CancellationFailed
            };
            log::warn!("Flow {path} stopped: {status}");
            self.listener.on_flow_finish(&info, status);
            return NodeRun {
                status,
                completed: None,
                events,
            };
        }

        let status = if failed {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Finished
        };
        log::debug!("Flow {path} completed: {status}");
        self.listener.on_flow_finish(&info, status);

        NodeRun {
            status,
            completed: (!failed).then_some(Completed::Flow {
                info,
                children: completed,
            }),
            events,
        }
    }

    fn run_parallel<'f>(
        &self,
        parallel: &'f ParallelStage,
        flow: &FlowInfo,
        parent_path: &str,
    ) -> NodeRun<'f> {
        let path = format!("{parent_path}/{}", parallel.name);
        log::debug!(
            "Parallel stage {path} started with {} children",
            parallel.children.len()
        );

        // Children are kept in completion order so rollback can reverse it
        let finished = AtomicUsize::new(0);
        let mut runs: Vec<(usize, NodeRun<'f>)> = self.pool.install(|| {
            parallel
                .children
                .par_iter()
                .map(|child| {
                    let run = self.run_node(child, flow, &path);
                    (finished.fetch_add(1, Ordering::SeqCst), run)
                })
                .collect()
        });
        runs.sort_by_key(|(ticket, _)| *ticket);

        let mut status = ExecutionStatus::Finished;
        let mut children = Vec::new();
        let mut events = Vec::new();
        for (_, run) in runs {
            status = match (status, run.status) {
                (ExecutionStatus::CancellationFailed, _) | (_, ExecutionStatus::CancellationFailed) => {
                    ExecutionStatus::CancellationFailed
                }
                (_, child) if child.is_failure() => ExecutionStatus::Failed,
                (current, _) => current,
            };
            children.extend(run.completed);
            events.extend(run.events);
        }

        NodeRun {
            status,
            completed: (!children.is_empty()).then_some(Completed::Parallel { children }),
            events,
        }
    }

    // ------------------------------------------------------------------------
    // Rollback
    // ------------------------------------------------------------------------

    /// Compensate completed work in reverse order; false if any cancel failed
    fn rollback(&self, completed: Completed<'_>, events: &mut Vec<StageReport>) -> bool {
        match completed {
            Completed::Stage { stage, info, ctx } => {
                if !stage.is_cancellable() {
                    log::debug!("Stage {} is not cancellable, leaving it finished", info.id);
                    return true;
                }

                match stage.cancel(&ctx) {
                    Ok(()) => {
                        log::info!("Stage {} cancelled", info.id);
                        let detail = ExecutionStatus::Cancelled.to_string();
                        self.listener
                            .on_stage_rollback(&info, ExecutionStatus::Cancelled, &detail);
                        events.push(StageReport::new(info.id, StageOutcome::Cancelled(detail)));
                        true
                    }
                    Err(err) => {
                        log::error!("Stage {} cancellation failed: {}", info.id, err.detail());
                        let detail = format!("CANCELLATION_FAILED: {}", err.detail());
                        self.listener.on_stage_rollback(
                            &info,
                            ExecutionStatus::CancellationFailed,
                            &detail,
                        );
                        events.push(StageReport::new(
                            info.id,
                            StageOutcome::CancellationFailed(detail),
                        ));
                        false
                    }
                }
            }
            Completed::Flow { info, children } => {
                let mut rolled_back = true;
                for child in children.into_iter().rev() {
                    rolled_back &= self.rollback(child, events);
                }
                let status = if rolled_back {
                    ExecutionStatus::Cancelled
                } else {
                    ExecutionStatus::CancellationFailed
                };
                self.listener.on_flow_finish(&info, status);
                rolled_back
            }
            Completed::Parallel { children } => {
                let mut rolled_back = true;
                for child in children.into_iter().rev() {
                    rolled_back &= self.rollback(child, events);
                }
                rolled_back
            }
        }
    }
}
