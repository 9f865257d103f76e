//! Stage trait: the unit of work inside a flow
//!
//! A stage performs one side effect and, when it is cancellable, knows how
//! to undo it. Flows roll back completed stages by calling `cancel` in
//! reverse completion order.

use crate::context::StageContext;
use crate::error::StageError;
use std::fmt;
use std::sync::Arc;

/// Core trait for flow stages
///
/// # Example
///
/// ```
/// use flowkit::{Stage, StageContext, StageError};
///
/// #[derive(Debug)]
/// struct CreateRoute {
///     path: String,
/// }
///
/// impl Stage for CreateRoute {
///     fn name(&self) -> String {
///         "RouteCreator".into()
///     }
///
///     fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
///         ctx.set_result(&self.path)
///     }
///
///     fn is_cancellable(&self) -> bool {
///         true
///     }
///
///     fn cancel(&self, _ctx: &StageContext) -> Result<(), StageError> {
///         Ok(())
///     }
/// }
/// ```
pub trait Stage: Send + Sync + fmt::Debug {
    /// Stage name, unique among its siblings
    fn name(&self) -> String;

    /// Perform the stage's work
    fn execute(&self, ctx: &StageContext) -> Result<(), StageError>;

    /// Whether `cancel` undoes `execute`
    ///
    /// Non-cancellable stages are left as they are during rollback.
    fn is_cancellable(&self) -> bool {
        false
    }

    /// Undo a successful `execute`
    ///
    /// Receives the same context (and result slot) the stage executed with.
    fn cancel(&self, _ctx: &StageContext) -> Result<(), StageError> {
        Ok(())
    }
}

/// A shared stage for type-erased storage
pub type BoxedStage = Arc<dyn Stage>;

/// Stage built from closures, handy for glue work and tests
pub struct FnStage<E, C = fn(&StageContext) -> Result<(), StageError>> {
    name: String,
    execute: E,
    cancel: Option<C>,
}

impl<E> FnStage<E>
where
    E: Fn(&StageContext) -> Result<(), StageError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, execute: E) -> Self {
        Self {
            name: name.into(),
            execute,
            cancel: None,
        }
    }
}

impl<E, C> FnStage<E, C>
where
    E: Fn(&StageContext) -> Result<(), StageError> + Send + Sync,
    C: Fn(&StageContext) -> Result<(), StageError> + Send + Sync,
{
    /// Make the stage cancellable with the given compensation
    pub fn with_cancel<C2>(self, cancel: C2) -> FnStage<E, C2>
    where
        C2: Fn(&StageContext) -> Result<(), StageError> + Send + Sync,
    {
        FnStage {
            name: self.name,
            execute: self.execute,
            cancel: Some(cancel),
        }
    }
}

impl<E, C> fmt::Debug for FnStage<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl<E, C> Stage for FnStage<E, C>
where
    E: Fn(&StageContext) -> Result<(), StageError> + Send + Sync,
    C: Fn(&StageContext) -> Result<(), StageError> + Send + Sync,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        (self.execute)(ctx)
    }

    fn is_cancellable(&self) -> bool {
        self.cancel.is_some()
    }

    fn cancel(&self, ctx: &StageContext) -> Result<(), StageError> {
        match &self.cancel {
            Some(cancel) => cancel(ctx),
            None => Ok(()),
        }
    }
}
