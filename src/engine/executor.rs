//! Entitlement service - request checks, flow building and execution

use anyhow::{Context as AnyhowContext, Result};
use appgraph::{ApplicationDescriptor, ApplicationStateTransitionPlan, EntitlementType};
use flowkit::{Engine, EngineConfig, FlowHandle, FlowListener, FlowReport, Listeners};
use integration::{AuthResources, GatewayRoutes, ModuleInstaller};
use std::collections::BTreeSet;
use std::sync::Arc;
use store::{Store, StoreListener};

use super::builder::{ApplicationFlowRef, FlowBuilder, FlowInput, FlowPlan};
use super::planner::plan_desired_state;
use super::request::EntitlementRequest;
use super::stages::Collaborators;
use super::validation::{ValidationContext, validate_request, validate_with};
use crate::config::AppConfig;
use crate::local::LocalLedger;
use crate::registry::{ApplicationRegistry, DirectoryRegistry};

/// A finished synchronous run
#[derive(Debug)]
pub struct Execution {
    pub application_flows: Vec<ApplicationFlowRef>,
    pub report: FlowReport,
}

/// A flow running in the background
#[derive(Debug)]
pub struct Submission {
    pub application_flows: Vec<ApplicationFlowRef>,
    pub handle: FlowHandle,
}

/// Descriptors loaded for one request
struct Loaded {
    applications: Vec<ApplicationDescriptor>,
    entitled: Vec<ApplicationDescriptor>,
    transition: Option<ApplicationStateTransitionPlan>,
}

impl Loaded {
    /// Entitled applications the request is checked against
    ///
    /// For STATE requests everything outside the desired set is revoked, so
    /// only same-name applications count.
    fn validation_entitled(&self, entitlement_type: EntitlementType) -> Vec<ApplicationDescriptor> {
        if entitlement_type != EntitlementType::State {
            return self.entitled.clone();
        }
        let desired: BTreeSet<&str> = self.applications.iter().map(|a| a.name.as_str()).collect();
        self.entitled
            .iter()
            .filter(|a| desired.contains(a.name.as_str()))
            .cloned()
            .collect()
    }
}

/// Runs entitlement requests for tenants
pub struct EntitlementService {
    registry: Arc<dyn ApplicationRegistry>,
    store: Arc<Store>,
    builder: FlowBuilder,
    engine: Engine,
}

impl EntitlementService {
    /// Build a service around explicit collaborators
    ///
    /// Flow events go to the store first, then to `listener`.
    pub fn new(
        registry: Arc<dyn ApplicationRegistry>,
        builder: FlowBuilder,
        store: Arc<Store>,
        engine_config: &EngineConfig,
        listener: Arc<dyn FlowListener>,
    ) -> Result<Self> {
        let listeners = Listeners::new()
            .with(Arc::new(StoreListener::new(Arc::clone(&store))))
            .with(listener);
        let engine = Engine::new(engine_config, Arc::new(listeners))
            .context("Failed to start flow engine")?;
        Ok(Self {
            registry,
            store,
            builder,
            engine,
        })
    }

    /// Service backed by the configured registry directory and database
    ///
    /// Module, route and auth changes are recorded in the local ledger.
    pub fn open(config: &AppConfig, listener: Arc<dyn FlowListener>) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(Store::open(&config.database_path()).with_context(|| {
            format!("Failed to open database {}", config.database_path().display())
        })?);
        let ledger = Arc::new(LocalLedger::new(Arc::clone(&store)));
        let collab = Collaborators {
            installer: Arc::clone(&ledger) as Arc<dyn ModuleInstaller>,
            gateway: Arc::clone(&ledger) as Arc<dyn GatewayRoutes>,
            auth: ledger as Arc<dyn AuthResources>,
            store: Arc::clone(&store),
            retry: config.retry.to_retry_config(),
        };

        Self::new(
            Arc::new(DirectoryRegistry::new(config.registry_path())),
            FlowBuilder::new(config.capabilities, collab),
            store,
            &EngineConfig {
                pool_size: config.pool_size,
            },
            listener,
        )
    }

    fn load(&self, request: &EntitlementRequest) -> Result<Loaded> {
        request.check()?;

        let applications = self.registry.get_application_descriptors(&request.unique_ids())?;
        let entitled_ids = self
            .store
            .entitled_application_ids(&request.tenant_id)
            .with_context(|| format!("Could not read entitlements of {}", request.tenant_id))?;
        let entitled = self
            .registry
            .get_application_descriptors(&entitled_ids)
            .context("Entitled applications are missing from the registry")?;

        let transition = if request.entitlement_type == EntitlementType::State {
            Some(plan_desired_state(&self.store, &request.tenant_id, &request.unique_ids())?)
        } else {
            None
        };

        Ok(Loaded {
            applications,
            entitled,
            transition,
        })
    }

    /// Check a request and build its flow without running anything
    pub fn prepare(&self, request: &EntitlementRequest) -> Result<FlowPlan> {
        let loaded = self.load(request)?;

        let checked = loaded.validation_entitled(request.entitlement_type);
        validate_request(&ValidationContext {
            request,
            applications: &loaded.applications,
            entitled: &checked,
        })?;

        self.builder.create_flow(
            request,
            &FlowInput {
                applications: &loaded.applications,
                entitled: &loaded.entitled,
                plan: loaded.transition.as_ref(),
            },
        )
    }

    /// Run one named validator against a request
    pub fn validate(&self, request: &EntitlementRequest, validator: &str) -> Result<()> {
        let loaded = self.load(request)?;
        let checked = loaded.validation_entitled(request.entitlement_type);
        validate_with(
            validator,
            &ValidationContext {
                request,
                applications: &loaded.applications,
                entitled: &checked,
            },
        )
    }

    /// Transition plan for a desired application set
    pub fn plan(&self, tenant_id: &str, desired_ids: &[String]) -> Result<ApplicationStateTransitionPlan> {
        for id in desired_ids {
            appgraph::split_id(id)?;
        }
        plan_desired_state(&self.store, tenant_id, desired_ids)
    }

    /// Run a request and wait for the outcome
    pub fn execute(&self, request: &EntitlementRequest) -> Result<Execution> {
        let plan = self.prepare(request)?;
        log::info!(
            "Executing {} flow {} for {}",
            request.entitlement_type,
            plan.flow_id(),
            request.tenant_id
        );
        let report = self.engine.execute(&plan.flow);
        Ok(Execution {
            application_flows: plan.application_flows,
            report,
        })
    }

    /// Start a request in the background
    pub fn submit(&self, request: &EntitlementRequest) -> Result<Submission> {
        let plan = self.prepare(request)?;
        log::info!(
            "Submitting {} flow {} for {}",
            request.entitlement_type,
            plan.flow_id(),
            request.tenant_id
        );
        let handle = self.engine.execute_async(plan.flow);
        Ok(Submission {
            application_flows: plan.application_flows,
            handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMode, Capabilities, GatewayMode, ModuleInstallerMode};
    use crate::registry::MemoryRegistry;
    use appgraph::ModuleDescriptor;
    use flowkit::{ExecutionStatus, NoopListener};
    use integration::RetryConfig;
    use integration::backend::memory::{MemoryBackend, Operation};
    use std::time::Duration;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        store: Arc<Store>,
        service: EntitlementService,
    }

    fn users(version: &str) -> ApplicationDescriptor {
        ApplicationDescriptor::new("app-users", version)
            .with_module(ModuleDescriptor::new(format!("mod-users-{version}")).provides("users", "1.0"))
            .with_module(
                ModuleDescriptor::new(format!("mod-login-{version}"))
                    .provides("login", "1.0")
                    .requires("users", "1.0"),
            )
    }

    fn notes() -> ApplicationDescriptor {
        ApplicationDescriptor::new("app-notes", "1.0.0")
            .depends_on("app-users", "^1.0.0")
            .with_module(ModuleDescriptor::new("mod-notes-1.0.0").requires("users", "1.0"))
    }

    fn tags() -> ApplicationDescriptor {
        ApplicationDescriptor::new("app-tags", "1.0.0")
            .with_module(ModuleDescriptor::new("mod-tags-1.0.0"))
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(Store::open_in_memory().unwrap());
        let collab = Collaborators {
            installer: Arc::clone(&backend) as Arc<dyn ModuleInstaller>,
            gateway: Arc::clone(&backend) as Arc<dyn GatewayRoutes>,
            auth: Arc::clone(&backend) as Arc<dyn AuthResources>,
            store: Arc::clone(&store),
            retry: RetryConfig::new(2, Duration::from_millis(1), 1.0),
        };
        let capabilities = Capabilities {
            module_installer: ModuleInstallerMode::Folio,
            gateway: GatewayMode::Kong,
            auth: AuthMode::Keycloak,
        };
        let registry = MemoryRegistry::new(vec![users("1.0.0"), users("1.1.0"), notes(), tags()]);
        let service = EntitlementService::new(
            Arc::new(registry),
            FlowBuilder::new(capabilities, collab),
            Arc::clone(&store),
            &EngineConfig { pool_size: 2 },
            Arc::new(NoopListener),
        )
        .unwrap();
        Fixture {
            backend,
            store,
            service,
        }
    }

    fn request(entitlement_type: EntitlementType, ids: &[&str]) -> EntitlementRequest {
        EntitlementRequest::new("diku", entitlement_type, ids.iter().map(ToString::to_string).collect())
    }

    fn entitled(fx: &Fixture) -> Vec<String> {
        fx.store.entitled_application_ids("diku").unwrap()
    }

    #[test]
    fn test_entitle_installs_in_dependency_order() {
        let fx = fixture();
        let run = fx
            .service
            .execute(&request(EntitlementType::Entitle, &["app-notes-1.0.0", "app-users-1.0.0"]))
            .unwrap();

        assert_eq!(run.report.status, ExecutionStatus::Finished);
        assert_eq!(entitled(&fx), vec!["app-notes-1.0.0", "app-users-1.0.0"]);
        assert_eq!(
            fx.backend.modules("diku").into_iter().collect::<Vec<_>>(),
            vec!["mod-login-1.0.0", "mod-notes-1.0.0", "mod-users-1.0.0"]
        );

        let calls = fx.backend.calls();
        let position = |call: &str| calls.iter().position(|c| c == call).unwrap();
        assert!(position("install:diku:mod-users-1.0.0") < position("install:diku:mod-login-1.0.0"));
        assert!(position("install:diku:mod-login-1.0.0") < position("install:diku:mod-notes-1.0.0"));

        let record = fx.store.find_flow(&run.report.flow_id, true).unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Finished);
        assert_eq!(record.entitlement_type, "ENTITLE");
        assert_eq!(record.application_flows.len(), 2);
        assert!(
            record
                .application_flows
                .iter()
                .all(|f| f.status == ExecutionStatus::Finished)
        );
    }

    #[test]
    fn test_failure_rolls_back_everything() {
        let fx = fixture();
        fx.backend.fail_on(
            Operation::Install,
            "mod-notes-1.0.0",
            integration::Error::conflict("boom"),
        );

        let run = fx
            .service
            .execute(&request(EntitlementType::Entitle, &["app-notes-1.0.0", "app-users-1.0.0"]))
            .unwrap();

        assert_eq!(run.report.status, ExecutionStatus::Cancelled);
        assert!(entitled(&fx).is_empty());
        assert!(fx.backend.modules("diku").is_empty());

        let failed: Vec<_> = run.report.with_status(ExecutionStatus::Failed).collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].stage_id.ends_with("mod-notes-installer"));
        assert!(failed[0].detail.contains("[IntegrationError]"));
    }

    #[test]
    fn test_ignore_errors_keeps_successful_applications() {
        let fx = fixture();
        fx.backend.fail_on(
            Operation::Install,
            "mod-tags-1.0.0",
            integration::Error::conflict("boom"),
        );

        let run = fx
            .service
            .execute(
                &request(EntitlementType::Entitle, &["app-users-1.0.0", "app-tags-1.0.0"])
                    .ignore_errors(true),
            )
            .unwrap();

        assert_eq!(run.report.status, ExecutionStatus::Failed);
        assert_eq!(entitled(&fx), vec!["app-users-1.0.0"]);
        assert!(!fx.backend.modules("diku").contains("mod-tags-1.0.0"));
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let fx = fixture();
        fx.backend.fail_times(
            Operation::Install,
            "mod-tags-1.0.0",
            integration::Error::network("timeout"),
            1,
        );

        let run = fx
            .service
            .execute(&request(EntitlementType::Entitle, &["app-tags-1.0.0"]))
            .unwrap();
        assert!(run.report.is_success());
        assert_eq!(entitled(&fx), vec!["app-tags-1.0.0"]);
    }

    #[test]
    fn test_rejected_requests_run_nothing() {
        let fx = fixture();
        fx.service
            .execute(&request(EntitlementType::Entitle, &["app-users-1.0.0"]))
            .unwrap();

        let err = fx
            .service
            .execute(&request(EntitlementType::Entitle, &["app-users-1.0.0"]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Applications already entitled: app-users-1.0.0");

        let err = fx
            .service
            .execute(&request(EntitlementType::Revoke, &["app-users-1.0.0", "app-tags-1.0.0"]))
            .unwrap_err();
        assert!(err.downcast_ref::<appgraph::Error>().unwrap().is_validation());

        let err = fx
            .service
            .execute(&request(EntitlementType::Entitle, &["app-missing-1.0.0"]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Applications not found: app-missing-1.0.0");
    }

    #[test]
    fn test_upgrade_then_revoke() {
        let fx = fixture();
        fx.service
            .execute(&request(EntitlementType::Entitle, &["app-users-1.0.0"]))
            .unwrap();

        let run = fx
            .service
            .execute(&request(EntitlementType::Upgrade, &["app-users-1.1.0"]))
            .unwrap();
        assert!(run.report.is_success());
        assert_eq!(entitled(&fx), vec!["app-users-1.1.0"]);
        assert!(fx.backend.calls().contains(&"upgrade:diku:mod-users-1.1.0".to_string()));

        let run = fx
            .service
            .execute(&request(EntitlementType::Revoke, &["app-users-1.1.0"]).purge(true))
            .unwrap();
        assert!(run.report.is_success());
        assert!(entitled(&fx).is_empty());
        assert!(fx.backend.modules("diku").is_empty());
    }

    #[test]
    fn test_state_request_syncs_to_desired_set() {
        let fx = fixture();
        fx.service
            .execute(&request(EntitlementType::Entitle, &["app-users-1.0.0", "app-tags-1.0.0"]))
            .unwrap();

        let plan = fx.service.plan("diku", &["app-users-1.1.0".to_string()]).unwrap();
        assert_eq!(plan.revoke_ids(), vec!["app-tags-1.0.0"]);
        assert_eq!(plan.upgrade_ids(), vec!["app-users-1.1.0"]);

        let run = fx
            .service
            .execute(&request(EntitlementType::State, &["app-users-1.1.0"]))
            .unwrap();
        assert!(run.report.is_success());
        assert_eq!(entitled(&fx), vec!["app-users-1.1.0"]);
        let types: Vec<_> = run.application_flows.iter().map(|f| f.entitlement_type).collect();
        assert_eq!(types, vec![EntitlementType::Revoke, EntitlementType::Upgrade]);
    }

    #[test]
    fn test_submit_runs_in_background() {
        let fx = fixture();
        let submission = fx
            .service
            .submit(&request(EntitlementType::Entitle, &["app-tags-1.0.0"]).run_async(true))
            .unwrap();
        let flow_id = submission.handle.flow_id().to_string();
        assert!(format!("{submission:?}").contains(&flow_id));

        let report = submission.handle.wait().unwrap();
        assert_eq!(report.flow_id, flow_id);
        assert!(report.is_success());
        assert_eq!(
            fx.store.find_flow(&flow_id, false).unwrap().unwrap().status,
            ExecutionStatus::Finished
        );
    }

    #[test]
    fn test_validate_single_validator() {
        let fx = fixture();
        let req = request(EntitlementType::Entitle, &["app-notes-1.0.0"]);

        let err = fx.service.validate(&req, "dependency").unwrap_err();
        assert!(err.to_string().starts_with("Missing dependencies found for applications"));

        let err = fx.service.validate(&req, "nope").unwrap_err();
        assert_eq!(err.to_string(), "Invalid validator name: nope");
    }
}
