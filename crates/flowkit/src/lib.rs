//! # flowkit
//!
//! Staged flow execution with rollback.
//!
//! A [`Flow`] is an ordered list of nodes: leaf [`Stage`]s, nested flows and
//! [`ParallelStage`] groups whose children run concurrently. When a node
//! fails, the flow's [`ExecutionStrategy`] decides what happens next:
//!
//! - **CancelOnError**: stop, call `cancel` on every completed sibling in
//!   reverse completion order, mark the rest as skipped
//! - **IgnoreOnError**: record the failure and keep going
//!
//! ## Example
//!
//! ```
//! use flowkit::{Engine, EngineConfig, ExecutionStatus, Flow, FnStage, NoopListener};
//! use std::sync::Arc;
//!
//! let flow = Flow::new("flow-1")
//!     .param("tenant", "diku")
//!     .stage(FnStage::new("hello", |ctx: &flowkit::StageContext| {
//!         ctx.set_result(ctx.param_str("tenant").unwrap_or_default())
//!     }));
//!
//! let engine = Engine::new(&EngineConfig::default(), Arc::new(NoopListener))?;
//! let report = engine.execute(&flow);
//! assert_eq!(report.status, ExecutionStatus::Finished);
//! # Ok::<(), flowkit::EngineError>(())
//! ```
//!
//! ## Listener
//!
//! [`FlowListener`] receives every lifecycle event (queued, started,
//! finished, failed, cancelled, skipped) so callers can persist or display
//! progress without the engine depending on storage or UI.

pub mod context;
pub mod error;
pub mod executor;
pub mod flow;
pub mod stage;
pub mod types;

pub use context::{
    FlowInfo, FlowListener, Listeners, NoopListener, Params, StageContext, StageInfo,
    StageResults,
};
pub use error::{EngineError, FlowOutcomeError, StageError};
pub use executor::{Engine, FlowHandle};
pub use flow::{Flow, FlowNode, ParallelStage};
pub use stage::{BoxedStage, FnStage, Stage};
pub use types::{
    EngineConfig, ExecutionStatus, ExecutionStrategy, FlowReport, StageOutcome, StageReport,
};
