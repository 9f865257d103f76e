//! # appgraph
//!
//! Dependency graphs for tenant applications.
//!
//! An application is a versioned bundle of modules. Applications depend on
//! other applications by name and version range; modules depend on each
//! other through provided and required interfaces. This crate turns those
//! declarations into safe execution orders:
//!
//! - [`DependencyResolver`]: transitive dependency closure with cycle detection
//! - [`InstallationGraph`]: parallelizable installation layers for a set of applications
//! - [`module_sequence`]: module layers inside one application (install, upgrade, removal)
//! - [`collect_interfaces`] / [`check_dependencies`]: integrity checks before installation
//! - [`ApplicationStateTransitionPlan`]: entitle / upgrade / revoke buckets for a desired state
//!
//! ## Example
//!
//! ```
//! use appgraph::{ApplicationDescriptor, InstallationGraph};
//!
//! let apps = vec![
//!     ApplicationDescriptor::new("app-platform", "1.0.0"),
//!     ApplicationDescriptor::new("app-notes", "1.0.0").depends_on("app-platform", "^1.0.0"),
//! ];
//!
//! let layers = InstallationGraph::new(&apps).installation_sequence()?;
//! assert_eq!(layers, vec![vec!["app-platform-1.0.0"], vec!["app-notes-1.0.0"]]);
//! # Ok::<(), appgraph::Error>(())
//! ```

pub mod descriptor;
pub mod error;
pub mod integrity;
pub mod layering;
pub mod plan;
pub mod resolver;
pub mod sequence;
pub mod version;

pub use descriptor::{
    ApplicationDescriptor, Dependency, EntitlementType, InterfaceReference, ModuleDescriptor,
    ModuleKind, join_id, split_id,
};
pub use error::{Error, Result};
pub use integrity::{
    DependencyMismatch, DependencyReport, InterfaceItem, MissingDependency,
    RequiredProvidedInterfaces, check_dependencies, collect_interfaces,
};
pub use layering::InstallationGraph;
pub use plan::ApplicationStateTransitionPlan;
pub use resolver::DependencyResolver;
pub use sequence::{ModuleDescriptorHolder, ModulesSequence, layer_modules, module_sequence};
pub use version::{InterfaceVersion, VersionRange, interface_compatible, parse_version};
