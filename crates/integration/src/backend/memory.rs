//! In-memory collaborators with failure injection.

use super::{AuthResources, GatewayRoutes, ModuleInstaller};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

/// Collaborator operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Upgrade,
    Uninstall,
    CreateRoutes,
    RemoveRoutes,
    UpdateRoutes,
    CreateResources,
    RemoveResources,
    UpdateResources,
}

#[derive(Debug)]
struct Failure {
    operation: Operation,
    /// Module or application id the failure applies to
    target: String,
    error: Error,
    /// `None` fails every time
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct MemoryState {
    modules: BTreeMap<String, BTreeSet<String>>,
    routes: BTreeMap<(String, String), Vec<String>>,
    resources: BTreeMap<(String, String), Vec<String>>,
    calls: Vec<String>,
}

/// Thread-safe in-memory implementation of every collaborator trait.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    failures: Mutex<Vec<Failure>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `operation` on `target` with `error`.
    pub fn fail_on(&self, operation: Operation, target: impl Into<String>, error: Error) {
        lock(&self.failures).push(Failure {
            operation,
            target: target.into(),
            error,
            remaining: None,
        });
    }

    /// Fail the next `times` calls of `operation` on `target`.
    pub fn fail_times(
        &self,
        operation: Operation,
        target: impl Into<String>,
        error: Error,
        times: u32,
    ) {
        lock(&self.failures).push(Failure {
            operation,
            target: target.into(),
            error,
            remaining: Some(times),
        });
    }

    /// Calls received so far, e.g. `install:diku:mod-a-1.0.0`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn modules(&self, tenant: &str) -> BTreeSet<String> {
        lock(&self.state)
            .modules
            .get(tenant)
            .cloned()
            .unwrap_or_default()
    }

    fn check(&self, operation: Operation, target: &str) -> Result<()> {
        let mut failures = lock(&self.failures);
        let Some(failure) = failures
            .iter_mut()
            .find(|f| f.operation == operation && f.target == target && f.remaining != Some(0))
        else {
            return Ok(());
        };

        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining -= 1;
        }
        Err(failure.error.clone())
    }

    fn record(&self, operation: Operation, tenant: &str, target: &str) -> Result<MutexGuard<'_, MemoryState>> {
        let name = match operation {
            Operation::Install => "install",
            Operation::Upgrade => "upgrade",
            Operation::Uninstall => "uninstall",
            Operation::CreateRoutes => "create-routes",
            Operation::RemoveRoutes => "remove-routes",
            Operation::UpdateRoutes => "update-routes",
            Operation::CreateResources => "create-resources",
            Operation::RemoveResources => "remove-resources",
            Operation::UpdateResources => "update-resources",
        };
        let mut state = lock(&self.state);
        state.calls.push(format!("{name}:{tenant}:{target}"));
        drop(state);

        self.check(operation, target)?;
        Ok(lock(&self.state))
    }
}

fn route_paths(module_ids: &[String]) -> Vec<String> {
    module_ids.iter().map(|id| format!("/{id}")).collect()
}

impl ModuleInstaller for MemoryBackend {
    fn install(&self, tenant: &str, module_id: &str) -> Result<()> {
        let mut state = self.record(Operation::Install, tenant, module_id)?;
        let modules = state.modules.entry(tenant.to_string()).or_default();
        if !modules.insert(module_id.to_string()) {
            return Err(Error::conflict(format!(
                "Module {module_id} is already enabled for {tenant}"
            )));
        }
        Ok(())
    }

    fn upgrade(&self, tenant: &str, from: &str, to: &str) -> Result<()> {
        let mut state = self.record(Operation::Upgrade, tenant, to)?;
        let modules = state.modules.entry(tenant.to_string()).or_default();
        if !modules.remove(from) {
            return Err(Error::not_found(from));
        }
        modules.insert(to.to_string());
        Ok(())
    }

    fn uninstall(&self, tenant: &str, module_id: &str, _purge: bool) -> Result<()> {
        let mut state = self.record(Operation::Uninstall, tenant, module_id)?;
        let removed = state
            .modules
            .get_mut(tenant)
            .is_some_and(|modules| modules.remove(module_id));
        if removed {
            Ok(())
        } else {
            Err(Error::not_found(module_id))
        }
    }

    fn installed_modules(&self, tenant: &str) -> Result<Vec<String>> {
        Ok(self.modules(tenant).into_iter().collect())
    }
}

impl GatewayRoutes for MemoryBackend {
    fn create_routes(
        &self,
        tenant: &str,
        application_id: &str,
        module_ids: &[String],
    ) -> Result<Vec<String>> {
        let mut state = self.record(Operation::CreateRoutes, tenant, application_id)?;
        let routes = route_paths(module_ids);
        state
            .routes
            .insert((tenant.to_string(), application_id.to_string()), routes.clone());
        Ok(routes)
    }

    fn remove_routes(&self, tenant: &str, application_id: &str) -> Result<()> {
        let mut state = self.record(Operation::RemoveRoutes, tenant, application_id)?;
        state
            .routes
            .remove(&(tenant.to_string(), application_id.to_string()));
        Ok(())
    }

    fn update_routes(
        &self,
        tenant: &str,
        from_application_id: &str,
        to_application_id: &str,
        module_ids: &[String],
    ) -> Result<()> {
        let mut state = self.record(Operation::UpdateRoutes, tenant, to_application_id)?;
        state
            .routes
            .remove(&(tenant.to_string(), from_application_id.to_string()));
        state.routes.insert(
            (tenant.to_string(), to_application_id.to_string()),
            route_paths(module_ids),
        );
        Ok(())
    }

    fn routes(&self, tenant: &str, application_id: &str) -> Result<Vec<String>> {
        Ok(lock(&self.state)
            .routes
            .get(&(tenant.to_string(), application_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

impl AuthResources for MemoryBackend {
    fn create_resources(
        &self,
        tenant: &str,
        application_id: &str,
        module_ids: &[String],
    ) -> Result<()> {
        let mut state = self.record(Operation::CreateResources, tenant, application_id)?;
        state.resources.insert(
            (tenant.to_string(), application_id.to_string()),
            module_ids.to_vec(),
        );
        Ok(())
    }

    fn remove_resources(&self, tenant: &str, application_id: &str) -> Result<()> {
        let mut state = self.record(Operation::RemoveResources, tenant, application_id)?;
        state
            .resources
            .remove(&(tenant.to_string(), application_id.to_string()));
        Ok(())
    }

    fn update_resources(
        &self,
        tenant: &str,
        from_application_id: &str,
        to_application_id: &str,
        module_ids: &[String],
    ) -> Result<()> {
        let mut state = self.record(Operation::UpdateResources, tenant, to_application_id)?;
        state
            .resources
            .remove(&(tenant.to_string(), from_application_id.to_string()));
        state.resources.insert(
            (tenant.to_string(), to_application_id.to_string()),
            module_ids.to_vec(),
        );
        Ok(())
    }

    fn resources(&self, tenant: &str, application_id: &str) -> Result<Vec<String>> {
        Ok(lock(&self.state)
            .resources
            .get(&(tenant.to_string(), application_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModuleChange;

    #[test]
    fn test_install_and_uninstall() {
        let backend = MemoryBackend::new();
        backend.install("diku", "mod-a-1.0.0").unwrap();

        assert!(backend.modules("diku").contains("mod-a-1.0.0"));
        assert!(matches!(
            backend.install("diku", "mod-a-1.0.0"),
            Err(Error::Conflict { .. })
        ));

        backend.uninstall("diku", "mod-a-1.0.0", false).unwrap();
        assert!(backend.modules("diku").is_empty());
        assert!(backend.uninstall("diku", "mod-a-1.0.0", false).is_err());
    }

    #[test]
    fn test_apply_modules_batch() {
        let backend = MemoryBackend::new();
        backend.install("diku", "mod-b-1.0.0").unwrap();
        backend
            .apply_modules(
                "diku",
                &[
                    ModuleChange::enable("mod-a-1.0.0"),
                    ModuleChange::upgrade("mod-b-1.0.0", "mod-b-1.1.0"),
                ],
                false,
            )
            .unwrap();

        let modules: Vec<_> = backend.modules("diku").into_iter().collect();
        assert_eq!(modules, vec!["mod-a-1.0.0", "mod-b-1.1.0"]);
    }

    #[test]
    fn test_injected_failure() {
        let backend = MemoryBackend::new();
        backend.fail_times(
            Operation::CreateRoutes,
            "app-a-1.0.0",
            Error::network("timeout"),
            1,
        );

        let modules = vec!["mod-a-1.0.0".to_string()];
        assert!(backend.create_routes("diku", "app-a-1.0.0", &modules).is_err());
        let routes = backend.create_routes("diku", "app-a-1.0.0", &modules).unwrap();

        assert_eq!(routes, vec!["/mod-a-1.0.0"]);
        assert_eq!(backend.calls().len(), 2);
    }

    #[test]
    fn test_update_moves_routes_and_resources() {
        let backend = MemoryBackend::new();
        let modules = vec!["mod-a-1.0.0".to_string()];
        backend.create_routes("diku", "app-a-1.0.0", &modules).unwrap();
        backend.create_resources("diku", "app-a-1.0.0", &modules).unwrap();

        let upgraded = vec!["mod-a-2.0.0".to_string()];
        backend
            .update_routes("diku", "app-a-1.0.0", "app-a-2.0.0", &upgraded)
            .unwrap();
        backend
            .update_resources("diku", "app-a-1.0.0", "app-a-2.0.0", &upgraded)
            .unwrap();

        assert!(backend.routes("diku", "app-a-1.0.0").unwrap().is_empty());
        assert_eq!(backend.routes("diku", "app-a-2.0.0").unwrap(), vec!["/mod-a-2.0.0"]);
        assert_eq!(backend.resources("diku", "app-a-2.0.0").unwrap(), upgraded);
    }
}
