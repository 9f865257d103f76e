//! Entitlement engine
//!
//! The engine orchestrates:
//! 1. Checking - Request shape and the default validators
//! 2. Planning - Desired-state diffs and installation layers
//! 3. Building - One application flow per application, layered in parallel groups
//! 4. Executing - Flow runs with rollback, persisted as they progress

pub mod builder;
pub mod executor;
pub mod planner;
pub mod request;
pub mod stages;
pub mod validation;

pub use builder::ApplicationFlowRef;
pub use executor::EntitlementService;
pub use request::EntitlementRequest;
