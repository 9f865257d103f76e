//! Stages of an application flow
//!
//! Every stage with side effects undoes them in `cancel`. Collaborator calls
//! go through bounded retry before a failure is reported to the flow.

use flowkit::{Stage, StageContext, StageError};
use integration::retry::{LogCallback, with_retry};
use integration::{AuthResources, GatewayRoutes, ModuleChange, ModuleInstaller, RetryConfig};
use std::fmt;
use std::sync::Arc;
use store::{Store, TENANT_PARAM};

/// Flow parameter: remove module data on uninstall
pub const PURGE_PARAM: &str = "purge";

/// Services the stages call into
#[derive(Clone)]
pub struct Collaborators {
    pub installer: Arc<dyn ModuleInstaller>,
    pub gateway: Arc<dyn GatewayRoutes>,
    pub auth: Arc<dyn AuthResources>,
    pub store: Arc<Store>,
    pub retry: RetryConfig,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    fn call<T>(
        &self,
        action: &str,
        operation: impl FnMut() -> integration::Result<T>,
    ) -> Result<T, StageError> {
        with_retry(&self.retry, Some(&LogCallback(action)), operation)
            .map_err(|err| StageError::integration_with_cause(action, err.to_string()))
    }
}

fn tenant(ctx: &StageContext) -> Result<&str, StageError> {
    ctx.param_str(TENANT_PARAM)
        .ok_or_else(|| StageError::Validation(format!("Missing flow parameter: {TENANT_PARAM}")))
}

fn purge(ctx: &StageContext) -> bool {
    ctx.params().get_bool(PURGE_PARAM).unwrap_or(false)
}

fn store_error(action: &str, err: &store::Error) -> StageError {
    StageError::integration_with_cause(action, err.to_string())
}

fn module_name(module_id: &str) -> String {
    appgraph::split_id(module_id).map_or_else(|_| module_id.to_string(), |(name, _)| name)
}

fn apply_change(
    collab: &Collaborators,
    tenant: &str,
    change: &ModuleChange,
    purge: bool,
) -> Result<(), StageError> {
    let action = format!("Failed to {} module {}", change.action, change.id);
    collab.call(&action, || {
        collab
            .installer
            .apply_modules(tenant, std::slice::from_ref(change), purge)
    })
}

/// Apply changes in order, each with its own retry
///
/// A failed change reverts the ones applied before it, so the stage leaves
/// nothing behind when it reports an error.
fn apply_all(
    collab: &Collaborators,
    tenant: &str,
    changes: &[ModuleChange],
    purge: bool,
) -> Result<(), StageError> {
    for (index, change) in changes.iter().enumerate() {
        if let Err(err) = apply_change(collab, tenant, change, purge) {
            revert(collab, tenant, &changes[..index]);
            return Err(err);
        }
    }
    Ok(())
}

fn revert(collab: &Collaborators, tenant: &str, applied: &[ModuleChange]) {
    for change in applied.iter().rev() {
        if let Err(err) = apply_change(collab, tenant, &change.inverse(), false) {
            log::error!("Could not revert module {}: {}", change.id, err.detail());
        }
    }
}

// ============================================================================
// Module stages
// ============================================================================

/// Enables, upgrades or disables one module
#[derive(Debug)]
pub struct ModuleStage {
    change: ModuleChange,
    collab: Collaborators,
}

impl ModuleStage {
    pub fn new(change: ModuleChange, collab: Collaborators) -> Self {
        Self { change, collab }
    }
}

impl Stage for ModuleStage {
    fn name(&self) -> String {
        let suffix = match self.change.action {
            integration::ModuleAction::Enable => "installer",
            integration::ModuleAction::Upgrade => "upgrader",
            integration::ModuleAction::Disable => "uninstaller",
        };
        format!("{}-{suffix}", module_name(&self.change.id))
    }

    fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        apply_change(&self.collab, tenant(ctx)?, &self.change, purge(ctx))
    }

    fn is_cancellable(&self) -> bool {
        true
    }

    fn cancel(&self, ctx: &StageContext) -> Result<(), StageError> {
        apply_change(&self.collab, tenant(ctx)?, &self.change.inverse(), false)
    }
}

/// Applies all module changes of an application in one stage
#[derive(Debug)]
pub struct BatchModulesStage {
    name: &'static str,
    changes: Vec<ModuleChange>,
    collab: Collaborators,
}

impl BatchModulesStage {
    pub fn installer(changes: Vec<ModuleChange>, collab: Collaborators) -> Self {
        Self {
            name: "OkapiModulesInstaller",
            changes,
            collab,
        }
    }

    pub fn uninstaller(changes: Vec<ModuleChange>, collab: Collaborators) -> Self {
        Self {
            name: "OkapiModulesUninstaller",
            changes,
            collab,
        }
    }
}

impl Stage for BatchModulesStage {
    fn name(&self) -> String {
        self.name.to_string()
    }

    fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        apply_all(&self.collab, tenant(ctx)?, &self.changes, purge(ctx))
    }

    fn is_cancellable(&self) -> bool {
        true
    }

    fn cancel(&self, ctx: &StageContext) -> Result<(), StageError> {
        let inverse: Vec<ModuleChange> = self.changes.iter().rev().map(ModuleChange::inverse).collect();
        apply_all(&self.collab, tenant(ctx)?, &inverse, false)
    }
}

/// Disables modules dropped by the new application version
#[derive(Debug)]
pub struct DeprecatedModulesUninstaller {
    /// Module ids in removal order
    modules: Vec<String>,
    collab: Collaborators,
}

impl DeprecatedModulesUninstaller {
    pub fn new(modules: Vec<String>, collab: Collaborators) -> Self {
        Self { modules, collab }
    }
}

impl Stage for DeprecatedModulesUninstaller {
    fn name(&self) -> String {
        "DeprecatedModulesUninstaller".to_string()
    }

    fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        let changes: Vec<ModuleChange> = self.modules.iter().map(ModuleChange::disable).collect();
        apply_all(&self.collab, tenant(ctx)?, &changes, purge(ctx))?;
        ctx.set_result(&self.modules)
    }

    fn is_cancellable(&self) -> bool {
        true
    }

    fn cancel(&self, ctx: &StageContext) -> Result<(), StageError> {
        let removed: Vec<String> = ctx.result_as().unwrap_or_else(|| self.modules.clone());
        let changes: Vec<ModuleChange> = removed.iter().rev().map(ModuleChange::enable).collect();
        apply_all(&self.collab, tenant(ctx)?, &changes, false)
    }
}

// ============================================================================
// Gateway stages
// ============================================================================

/// Creates gateway routes for an application's modules
#[derive(Debug)]
pub struct KongRouteCreator {
    application_id: String,
    module_ids: Vec<String>,
    collab: Collaborators,
}

impl KongRouteCreator {
    pub fn new(application_id: String, module_ids: Vec<String>, collab: Collaborators) -> Self {
        Self {
            application_id,
            module_ids,
            collab,
        }
    }
}

impl Stage for KongRouteCreator {
    fn name(&self) -> String {
        "KongRouteCreator".to_string()
    }

    fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        let tenant = tenant(ctx)?;
        let routes = self.collab.call("Failed to create routes", || {
            self.collab
                .gateway
                .create_routes(tenant, &self.application_id, &self.module_ids)
        })?;
        log::debug!("Created {} routes for {}", routes.len(), self.application_id);
        ctx.set_result(&routes)
    }

    fn is_cancellable(&self) -> bool {
        true
    }

    fn cancel(&self, ctx: &StageContext) -> Result<(), StageError> {
        let tenant = tenant(ctx)?;
        self.collab.call("Failed to remove routes", || {
            self.collab.gateway.remove_routes(tenant, &self.application_id)
        })
    }
}

/// Removes gateway routes of a revoked application
#[derive(Debug)]
pub struct KongRouteCleaner {
    application_id: String,
    module_ids: Vec<String>,
    collab: Collaborators,
}

impl KongRouteCleaner {
    pub fn new(application_id: String, module_ids: Vec<String>, collab: Collaborators) -> Self {
        Self {
            application_id,
            module_ids,
            collab,
        }
    }
}

impl Stage for KongRouteCleaner {
    fn name(&self) -> String {
        "KongRouteCleaner".to_string()
    }

    fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        let tenant = tenant(ctx)?;
        self.collab.call("Failed to remove routes", || {
            self.collab.gateway.remove_routes(tenant, &self.application_id)
        })
    }

    fn is_cancellable(&self) -> bool {
        true
    }

    fn cancel(&self, ctx: &StageContext) -> Result<(), StageError> {
        let tenant = tenant(ctx)?;
        self.collab.call("Failed to restore routes", || {
            self.collab
                .gateway
                .create_routes(tenant, &self.application_id, &self.module_ids)
        })?;
        Ok(())
    }
}

/// Moves gateway routes to the new application version
#[derive(Debug)]
pub struct KongRouteUpdater {
    upgrade: ApplicationUpgrade,
    collab: Collaborators,
}

impl KongRouteUpdater {
    pub fn new(upgrade: ApplicationUpgrade, collab: Collaborators) -> Self {
        Self { upgrade, collab }
    }
}

impl Stage for KongRouteUpdater {
    fn name(&self) -> String {
        "KongRouteUpdater".to_string()
    }

    fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        let tenant = tenant(ctx)?;
        let u = &self.upgrade;
        self.collab.call("Failed to update routes", || {
            self.collab
                .gateway
                .update_routes(tenant, &u.from_id, &u.to_id, &u.to_modules)
        })
    }

    fn is_cancellable(&self) -> bool {
        true
    }

    fn cancel(&self, ctx: &StageContext) -> Result<(), StageError> {
        let tenant = tenant(ctx)?;
        let u = &self.upgrade;
        self.collab.call("Failed to restore routes", || {
            self.collab
                .gateway
                .update_routes(tenant, &u.to_id, &u.from_id, &u.from_modules)
        })
    }
}

// ============================================================================
// Auth stages
// ============================================================================

/// Creates authorization resources for an application's modules
#[derive(Debug)]
pub struct KeycloakAuthResourceCreator {
    application_id: String,
    module_ids: Vec<String>,
    collab: Collaborators,
}

impl KeycloakAuthResourceCreator {
    pub fn new(application_id: String, module_ids: Vec<String>, collab: Collaborators) -> Self {
        Self {
            application_id,
            module_ids,
            collab,
        }
    }
}

impl Stage for KeycloakAuthResourceCreator {
    fn name(&self) -> String {
        "KeycloakAuthResourceCreator".to_string()
    }

    fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        let tenant = tenant(ctx)?;
        self.collab.call("Failed to create auth resources", || {
            self.collab
                .auth
                .create_resources(tenant, &self.application_id, &self.module_ids)
        })
    }

    fn is_cancellable(&self) -> bool {
        true
    }

    fn cancel(&self, ctx: &StageContext) -> Result<(), StageError> {
        let tenant = tenant(ctx)?;
        self.collab.call("Failed to remove auth resources", || {
            self.collab.auth.remove_resources(tenant, &self.application_id)
        })
    }
}

/// Removes authorization resources of a revoked application
#[derive(Debug)]
pub struct KeycloakAuthResourceCleaner {
    application_id: String,
    module_ids: Vec<String>,
    collab: Collaborators,
}

impl KeycloakAuthResourceCleaner {
    pub fn new(application_id: String, module_ids: Vec<String>, collab: Collaborators) -> Self {
        Self {
            application_id,
            module_ids,
            collab,
        }
    }
}

impl Stage for KeycloakAuthResourceCleaner {
    fn name(&self) -> String {
        "KeycloakAuthResourceCleaner".to_string()
    }

    fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        let tenant = tenant(ctx)?;
        self.collab.call("Failed to remove auth resources", || {
            self.collab.auth.remove_resources(tenant, &self.application_id)
        })
    }

    fn is_cancellable(&self) -> bool {
        true
    }

    fn cancel(&self, ctx: &StageContext) -> Result<(), StageError> {
        let tenant = tenant(ctx)?;
        self.collab.call("Failed to restore auth resources", || {
            self.collab
                .auth
                .create_resources(tenant, &self.application_id, &self.module_ids)
        })
    }
}

/// Moves authorization resources to the new application version
#[derive(Debug)]
pub struct KeycloakAuthResourceUpdater {
    upgrade: ApplicationUpgrade,
    collab: Collaborators,
}

impl KeycloakAuthResourceUpdater {
    pub fn new(upgrade: ApplicationUpgrade, collab: Collaborators) -> Self {
        Self { upgrade, collab }
    }
}

impl Stage for KeycloakAuthResourceUpdater {
    fn name(&self) -> String {
        "KeycloakAuthResourceUpdater".to_string()
    }

    fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        let tenant = tenant(ctx)?;
        let u = &self.upgrade;
        self.collab.call("Failed to update auth resources", || {
            self.collab
                .auth
                .update_resources(tenant, &u.from_id, &u.to_id, &u.to_modules)
        })
    }

    fn is_cancellable(&self) -> bool {
        true
    }

    fn cancel(&self, ctx: &StageContext) -> Result<(), StageError> {
        let tenant = tenant(ctx)?;
        let u = &self.upgrade;
        self.collab.call("Failed to restore auth resources", || {
            self.collab
                .auth
                .update_resources(tenant, &u.to_id, &u.from_id, &u.from_modules)
        })
    }
}

// ============================================================================
// Entitlement stages
// ============================================================================

/// Old and new version of an upgraded application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationUpgrade {
    pub from_id: String,
    pub to_id: String,
    /// Backend module ids of the old version
    pub from_modules: Vec<String>,
    /// Backend module ids of the new version
    pub to_modules: Vec<String>,
}

/// Records the entitlement once everything else succeeded
#[derive(Debug)]
pub struct EntitlementSaver {
    application_id: String,
    store: Arc<Store>,
}

impl EntitlementSaver {
    pub fn new(application_id: String, store: Arc<Store>) -> Self {
        Self {
            application_id,
            store,
        }
    }
}

impl Stage for EntitlementSaver {
    fn name(&self) -> String {
        "EntitlementSaver".to_string()
    }

    fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        self.store
            .save_entitlement(tenant(ctx)?, &self.application_id)
            .map_err(|e| store_error("Failed to save entitlement", &e))?;
        Ok(())
    }

    fn is_cancellable(&self) -> bool {
        true
    }

    fn cancel(&self, ctx: &StageContext) -> Result<(), StageError> {
        self.store
            .remove_entitlement(tenant(ctx)?, &self.application_id)
            .map_err(|e| store_error("Failed to remove entitlement", &e))?;
        Ok(())
    }
}

/// Deletes the entitlement of a revoked application
#[derive(Debug)]
pub struct EntitlementRemover {
    application_id: String,
    store: Arc<Store>,
}

impl EntitlementRemover {
    pub fn new(application_id: String, store: Arc<Store>) -> Self {
        Self {
            application_id,
            store,
        }
    }
}

impl Stage for EntitlementRemover {
    fn name(&self) -> String {
        "EntitlementRemover".to_string()
    }

    fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        let removed = self
            .store
            .remove_entitlement(tenant(ctx)?, &self.application_id)
            .map_err(|e| store_error("Failed to remove entitlement", &e))?;
        if !removed {
            return Err(StageError::NotFound(format!(
                "Entitlement not found: {}",
                self.application_id
            )));
        }
        Ok(())
    }

    fn is_cancellable(&self) -> bool {
        true
    }

    fn cancel(&self, ctx: &StageContext) -> Result<(), StageError> {
        self.store
            .save_entitlement(tenant(ctx)?, &self.application_id)
            .map_err(|e| store_error("Failed to restore entitlement", &e))?;
        Ok(())
    }
}

/// Points the entitlement at the new application version
#[derive(Debug)]
pub struct EntitlementUpdater {
    from_id: String,
    to_id: String,
    store: Arc<Store>,
}

impl EntitlementUpdater {
    pub fn new(from_id: String, to_id: String, store: Arc<Store>) -> Self {
        Self {
            from_id,
            to_id,
            store,
        }
    }
}

impl Stage for EntitlementUpdater {
    fn name(&self) -> String {
        "EntitlementUpdater".to_string()
    }

    fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        self.store
            .update_entitlement(tenant(ctx)?, &self.from_id, &self.to_id)
            .map_err(|e| store_error("Failed to update entitlement", &e))
    }

    fn is_cancellable(&self) -> bool {
        true
    }

    fn cancel(&self, ctx: &StageContext) -> Result<(), StageError> {
        self.store
            .update_entitlement(tenant(ctx)?, &self.to_id, &self.from_id)
            .map_err(|e| store_error("Failed to restore entitlement", &e))
    }
}
