//! # integration
//!
//! Contracts for the services an entitlement touches:
//!
//! - [`ModuleInstaller`]: enable, upgrade and disable modules for a tenant
//! - [`GatewayRoutes`]: routes exposed for an application's modules
//! - [`AuthResources`]: authorization resources for an application
//!
//! Calls fail with a categorized [`Error`]; transient failures can be
//! retried with [`retry::with_retry`].
//!
//! ```
//! use integration::{ModuleInstaller, RetryConfig, retry::with_retry};
//! use integration::backend::memory::MemoryBackend;
//!
//! let backend = MemoryBackend::new();
//! with_retry(&RetryConfig::default(), None, || backend.install("diku", "mod-notes-1.0.0"))?;
//! assert!(backend.modules("diku").contains("mod-notes-1.0.0"));
//! # Ok::<(), integration::Error>(())
//! ```

pub mod backend;
pub mod error;
pub mod retry;
pub mod types;

pub use backend::{AuthResources, GatewayRoutes, ModuleInstaller};
pub use error::{Error, ErrorCategory, Result};
pub use types::{ModuleAction, ModuleChange, RetryConfig};
