//! Local collaborator ledger
//!
//! Single-node stand-in for the module installer, gateway and auth services:
//! every enabled module, route and auth resource is recorded in the store's
//! resource table so flows have observable side effects.

use appgraph::split_id;
use integration::{AuthResources, Error, GatewayRoutes, ModuleInstaller, Result};
use std::sync::Arc;
use store::Store;

const MODULE: &str = "module";
const ROUTE: &str = "route";
const AUTH_RESOURCE: &str = "auth-resource";

/// Store-backed implementation of every collaborator trait
pub struct LocalLedger {
    store: Arc<Store>,
}

impl LocalLedger {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

fn ledger_error(err: store::Error) -> Error {
    Error::Request {
        message: "Local ledger update failed".to_string(),
        cause: Some(err.to_string()),
    }
}

fn module_name(module_id: &str) -> String {
    split_id(module_id).map_or_else(|_| module_id.to_string(), |(name, _)| name)
}

fn route_path(module_id: &str) -> String {
    format!("/{}", module_name(module_id))
}

impl ModuleInstaller for LocalLedger {
    fn install(&self, tenant: &str, module_id: &str) -> Result<()> {
        let inserted = self
            .store
            .insert_resource(tenant, MODULE, &module_name(module_id), module_id)
            .map_err(ledger_error)?;
        if !inserted {
            return Err(Error::conflict(format!(
                "Module {module_id} is already enabled for {tenant}"
            )));
        }
        log::debug!("Enabled {module_id} for {tenant}");
        Ok(())
    }

    fn upgrade(&self, tenant: &str, from: &str, to: &str) -> Result<()> {
        let removed = self
            .store
            .delete_resource(tenant, MODULE, &module_name(from), from)
            .map_err(ledger_error)?;
        if !removed {
            return Err(Error::not_found(from));
        }
        self.store
            .insert_resource(tenant, MODULE, &module_name(to), to)
            .map_err(ledger_error)?;
        log::debug!("Upgraded {from} to {to} for {tenant}");
        Ok(())
    }

    fn uninstall(&self, tenant: &str, module_id: &str, purge: bool) -> Result<()> {
        let removed = self
            .store
            .delete_resource(tenant, MODULE, &module_name(module_id), module_id)
            .map_err(ledger_error)?;
        if !removed {
            return Err(Error::not_found(module_id));
        }
        log::debug!("Disabled {module_id} for {tenant} (purge: {purge})");
        Ok(())
    }

    fn installed_modules(&self, tenant: &str) -> Result<Vec<String>> {
        self.store
            .list_resources(tenant, MODULE, None)
            .map_err(ledger_error)
    }
}

impl GatewayRoutes for LocalLedger {
    fn create_routes(
        &self,
        tenant: &str,
        application_id: &str,
        module_ids: &[String],
    ) -> Result<Vec<String>> {
        let mut created = Vec::new();
        for module_id in module_ids {
            let path = route_path(module_id);
            if self
                .store
                .insert_resource(tenant, ROUTE, application_id, &path)
                .map_err(ledger_error)?
            {
                created.push(path);
            }
        }
        Ok(created)
    }

    fn remove_routes(&self, tenant: &str, application_id: &str) -> Result<()> {
        self.store
            .delete_resources(tenant, ROUTE, application_id)
            .map_err(ledger_error)?;
        Ok(())
    }

    fn update_routes(
        &self,
        tenant: &str,
        from_application_id: &str,
        to_application_id: &str,
        module_ids: &[String],
    ) -> Result<()> {
        self.remove_routes(tenant, from_application_id)?;
        self.create_routes(tenant, to_application_id, module_ids)?;
        Ok(())
    }

    fn routes(&self, tenant: &str, application_id: &str) -> Result<Vec<String>> {
        self.store
            .list_resources(tenant, ROUTE, Some(application_id))
            .map_err(ledger_error)
    }
}

impl AuthResources for LocalLedger {
    fn create_resources(
        &self,
        tenant: &str,
        application_id: &str,
        module_ids: &[String],
    ) -> Result<()> {
        for module_id in module_ids {
            self.store
                .insert_resource(tenant, AUTH_RESOURCE, application_id, &module_name(module_id))
                .map_err(ledger_error)?;
        }
        Ok(())
    }

    fn remove_resources(&self, tenant: &str, application_id: &str) -> Result<()> {
        self.store
            .delete_resources(tenant, AUTH_RESOURCE, application_id)
            .map_err(ledger_error)?;
        Ok(())
    }

    fn update_resources(
        &self,
        tenant: &str,
        from_application_id: &str,
        to_application_id: &str,
        module_ids: &[String],
    ) -> Result<()> {
        self.remove_resources(tenant, from_application_id)?;
        self.create_resources(tenant, to_application_id, module_ids)
    }

    fn resources(&self, tenant: &str, application_id: &str) -> Result<Vec<String>> {
        self.store
            .list_resources(tenant, AUTH_RESOURCE, Some(application_id))
            .map_err(ledger_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use integration::ErrorCategory;

    fn ledger() -> LocalLedger {
        LocalLedger::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    #[test]
    fn test_module_lifecycle() {
        let ledger = ledger();
        ledger.install("diku", "mod-users-1.0.0").unwrap();
        let err = ledger.install("diku", "mod-users-1.0.0").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Conflict);

        ledger.upgrade("diku", "mod-users-1.0.0", "mod-users-1.1.0").unwrap();
        assert_eq!(ledger.installed_modules("diku").unwrap(), vec!["mod-users-1.1.0"]);
        assert!(ledger.installed_modules("other").unwrap().is_empty());

        ledger.uninstall("diku", "mod-users-1.1.0", true).unwrap();
        let err = ledger.uninstall("diku", "mod-users-1.1.0", false).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_routes_follow_application_version() {
        let ledger = ledger();
        let modules = vec!["mod-users-1.0.0".to_string(), "mod-login-1.0.0".to_string()];
        let created = ledger.create_routes("diku", "app-a-1.0.0", &modules).unwrap();
        assert_eq!(created, vec!["/mod-users", "/mod-login"]);

        ledger
            .update_routes("diku", "app-a-1.0.0", "app-a-2.0.0", &modules[..1])
            .unwrap();
        assert!(ledger.routes("diku", "app-a-1.0.0").unwrap().is_empty());
        assert_eq!(ledger.routes("diku", "app-a-2.0.0").unwrap(), vec!["/mod-users"]);

        ledger.remove_routes("diku", "app-a-2.0.0").unwrap();
        assert!(ledger.routes("diku", "app-a-2.0.0").unwrap().is_empty());
    }

    #[test]
    fn test_auth_resources() {
        let ledger = ledger();
        let modules = vec!["mod-users-1.0.0".to_string()];
        ledger.create_resources("diku", "app-a-1.0.0", &modules).unwrap();
        assert_eq!(ledger.resources("diku", "app-a-1.0.0").unwrap(), vec!["mod-users"]);

        ledger
            .update_resources("diku", "app-a-1.0.0", "app-a-1.1.0", &modules)
            .unwrap();
        assert!(ledger.resources("diku", "app-a-1.0.0").unwrap().is_empty());

        ledger.remove_resources("diku", "app-a-1.1.0").unwrap();
        assert!(ledger.resources("diku", "app-a-1.1.0").unwrap().is_empty());
    }
}
