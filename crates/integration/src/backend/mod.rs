//! Collaborator contracts.
//!
//! The traits abstract the services an entitlement touches, enabling:
//! - Remote implementations talking to real services
//! - A local ledger for single-node use
//! - In-memory fakes with failure injection for testing

pub mod memory;

use crate::error::Result;
use crate::types::{ModuleAction, ModuleChange};

/// Enables, upgrades and disables modules for a tenant.
pub trait ModuleInstaller: Send + Sync {
    /// Enable a module for the tenant.
    fn install(&self, tenant: &str, module_id: &str) -> Result<()>;

    /// Replace an enabled module with another version.
    fn upgrade(&self, tenant: &str, from: &str, to: &str) -> Result<()>;

    /// Disable a module; `purge` also removes its data.
    fn uninstall(&self, tenant: &str, module_id: &str, purge: bool) -> Result<()>;

    /// Modules currently enabled for the tenant.
    fn installed_modules(&self, tenant: &str) -> Result<Vec<String>>;

    /// Apply several changes as one request.
    ///
    /// The default applies them one by one and stops at the first error.
    fn apply_modules(&self, tenant: &str, changes: &[ModuleChange], purge: bool) -> Result<()> {
        for change in changes {
            match (change.action, change.from.as_deref()) {
                (ModuleAction::Enable, _) | (ModuleAction::Upgrade, None) => {
                    self.install(tenant, &change.id)?;
                }
                (ModuleAction::Upgrade, Some(from)) => self.upgrade(tenant, from, &change.id)?,
                (ModuleAction::Disable, _) => self.uninstall(tenant, &change.id, purge)?,
            }
        }
        Ok(())
    }
}

/// Manages gateway routes exposed for an application's modules.
pub trait GatewayRoutes: Send + Sync {
    /// Create routes for the modules, returning the created route ids.
    fn create_routes(
        &self,
        tenant: &str,
        application_id: &str,
        module_ids: &[String],
    ) -> Result<Vec<String>>;

    fn remove_routes(&self, tenant: &str, application_id: &str) -> Result<()>;

    /// Move routes from one application version to another.
    fn update_routes(
        &self,
        tenant: &str,
        from_application_id: &str,
        to_application_id: &str,
        module_ids: &[String],
    ) -> Result<()>;

    /// Routes registered for an application.
    fn routes(&self, tenant: &str, application_id: &str) -> Result<Vec<String>>;
}

/// Manages authorization resources derived from an application's modules.
pub trait AuthResources: Send + Sync {
    fn create_resources(
        &self,
        tenant: &str,
        application_id: &str,
        module_ids: &[String],
    ) -> Result<()>;

    fn remove_resources(&self, tenant: &str, application_id: &str) -> Result<()>;

    fn update_resources(
        &self,
        tenant: &str,
        from_application_id: &str,
        to_application_id: &str,
        module_ids: &[String],
    ) -> Result<()>;

    /// Resources registered for an application.
    fn resources(&self, tenant: &str, application_id: &str) -> Result<Vec<String>>;
}
