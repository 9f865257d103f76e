//! Flow construction
//!
//! Turns a validated request into a flow tree: one parallel group per
//! installation layer, one application flow per application, and the
//! stages of each application in dependency-safe order.

use anyhow::{Context, Result};
use appgraph::{
    ApplicationDescriptor, ApplicationStateTransitionPlan, EntitlementType, InstallationGraph,
    ModuleKind, ModulesSequence, module_sequence,
};
use flowkit::{Flow, FlowNode, ParallelStage};
use integration::ModuleChange;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use store::{APPLICATION_ID_PARAM, TENANT_PARAM, TYPE_PARAM};
use uuid::Uuid;

use super::request::EntitlementRequest;
use super::stages::{
    ApplicationUpgrade, BatchModulesStage, Collaborators, DeprecatedModulesUninstaller,
    EntitlementRemover, EntitlementSaver, EntitlementUpdater, KeycloakAuthResourceCleaner,
    KeycloakAuthResourceCreator, KeycloakAuthResourceUpdater, KongRouteCleaner, KongRouteCreator,
    KongRouteUpdater, ModuleStage, PURGE_PARAM,
};
use crate::config::{AuthMode, Capabilities, GatewayMode, ModuleInstallerMode};

/// Reason recorded for repeated application ids
pub const DUPLICATE_REASON: &str = "Duplicate application id in request";

/// Descriptors the builder works from
#[derive(Debug, Clone, Copy)]
pub struct FlowInput<'a> {
    /// Descriptors of the request's unique application ids
    pub applications: &'a [ApplicationDescriptor],
    /// Descriptors currently entitled for the tenant
    pub entitled: &'a [ApplicationDescriptor],
    /// Transition plan, required for STATE requests
    pub plan: Option<&'a ApplicationStateTransitionPlan>,
}

/// One application flow of a built flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationFlowRef {
    pub application_id: String,
    pub flow_id: String,
    pub entitlement_type: EntitlementType,
    pub skipped: bool,
}

/// A flow ready for the engine
#[derive(Debug)]
pub struct FlowPlan {
    pub flow: Flow,
    /// Application flows in layer order
    pub application_flows: Vec<ApplicationFlowRef>,
}

impl FlowPlan {
    pub fn flow_id(&self) -> &str {
        &self.flow.id
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn module_ids(app: &ApplicationDescriptor) -> Vec<String> {
    app.modules.iter().map(|m| m.id.clone()).collect()
}

/// Builds flow trees for entitlement requests
#[derive(Debug, Clone)]
pub struct FlowBuilder {
    capabilities: Capabilities,
    collab: Collaborators,
}

impl FlowBuilder {
    pub fn new(capabilities: Capabilities, collab: Collaborators) -> Self {
        Self {
            capabilities,
            collab,
        }
    }

    pub fn create_flow(&self, request: &EntitlementRequest, input: &FlowInput<'_>) -> Result<FlowPlan> {
        let mut root = Flow::new(new_id())
            .strategy(request.strategy())
            .param(TENANT_PARAM, request.tenant_id.as_str())
            .param(TYPE_PARAM, request.entitlement_type.as_str())
            .param(PURGE_PARAM, request.purge);
        let mut refs = Vec::new();

        let duplicates = duplicate_counts(&request.application_ids);
        let entitled_by_name: BTreeMap<&str, &ApplicationDescriptor> =
            input.entitled.iter().map(|a| (a.name.as_str(), a)).collect();

        match request.entitlement_type {
            EntitlementType::Entitle => {
                let layers = InstallationGraph::new(input.applications).installation_sequence()?;
                self.add_layers(&mut root, &mut refs, "appi", &layers, input.applications, &duplicates, |app| {
                    Ok((EntitlementType::Entitle, self.entitle_flow(app)?))
                })?;
            }
            EntitlementType::Revoke => {
                let layers =
                    InstallationGraph::new(input.applications).reversed_installation_sequence()?;
                self.add_layers(&mut root, &mut refs, "appi", &layers, input.applications, &duplicates, |app| {
                    Ok((EntitlementType::Revoke, self.revoke_flow(app)?))
                })?;
            }
            EntitlementType::Upgrade => {
                let layers = InstallationGraph::new(input.applications).installation_sequence()?;
                self.add_layers(&mut root, &mut refs, "appi", &layers, input.applications, &duplicates, |app| {
                    let old = installed(&entitled_by_name, app)?;
                    Ok((EntitlementType::Upgrade, self.upgrade_flow(app, old)?))
                })?;
            }
            EntitlementType::State => {
                let plan = input
                    .plan
                    .context("A transition plan is required for STATE requests")?;
                self.add_state_layers(&mut root, &mut refs, plan, input, &entitled_by_name)?;
            }
        }

        log::debug!(
            "Built flow {} with {} application flows and {} stages",
            root.id,
            refs.len(),
            root.stage_count()
        );
        Ok(FlowPlan {
            flow: root,
            application_flows: refs,
        })
    }

    fn add_state_layers(
        &self,
        root: &mut Flow,
        refs: &mut Vec<ApplicationFlowRef>,
        plan: &ApplicationStateTransitionPlan,
        input: &FlowInput<'_>,
        entitled_by_name: &BTreeMap<&str, &ApplicationDescriptor>,
    ) -> Result<()> {
        let none = BTreeMap::new();

        let revoked: Vec<ApplicationDescriptor> = input
            .entitled
            .iter()
            .filter(|a| plan.revoke.contains(&a.name))
            .cloned()
            .collect();
        let layers = InstallationGraph::new(&revoked).reversed_installation_sequence()?;
        self.add_layers(root, refs, "appr", &layers, &revoked, &none, |app| {
            Ok((EntitlementType::Revoke, self.revoke_flow(app)?))
        })?;

        let targets: Vec<ApplicationDescriptor> = input
            .applications
            .iter()
            .filter(|a| plan.entitle.contains(&a.name) || plan.upgrade.contains(&a.name))
            .cloned()
            .collect();
        let layers = InstallationGraph::new(&targets).installation_sequence()?;
        self.add_layers(root, refs, "appi", &layers, &targets, &none, |app| {
            if plan.upgrade.contains(&app.name) {
                let old = installed(entitled_by_name, app)?;
                Ok((EntitlementType::Upgrade, self.upgrade_flow(app, old)?))
            } else {
                Ok((EntitlementType::Entitle, self.entitle_flow(app)?))
            }
        })
    }

    /// Append one parallel group per layer
    #[allow(clippy::too_many_arguments)]
    fn add_layers<F>(
        &self,
        root: &mut Flow,
        refs: &mut Vec<ApplicationFlowRef>,
        prefix: &str,
        layers: &[Vec<String>],
        apps: &[ApplicationDescriptor],
        duplicates: &BTreeMap<String, usize>,
        build: F,
    ) -> Result<()>
    where
        F: Fn(&ApplicationDescriptor) -> Result<(EntitlementType, Flow)>,
    {
        let by_id: BTreeMap<String, &ApplicationDescriptor> =
            apps.iter().map(|a| (a.id(), a)).collect();

        for (index, layer) in layers.iter().enumerate() {
            let mut group = ParallelStage::new(format!("{prefix}-l{index}"));
            for id in layer {
                let app = by_id
                    .get(id)
                    .with_context(|| format!("Application {id} missing from layer input"))?;
                let (entitlement_type, flow) = build(app)?;
                refs.push(ApplicationFlowRef {
                    application_id: id.clone(),
                    flow_id: flow.id.clone(),
                    entitlement_type,
                    skipped: false,
                });
                group = group.flow(flow);

                for _ in 0..duplicates.get(id).copied().unwrap_or(0) {
                    let skipped =
                        application_flow(id, entitlement_type).skipped(DUPLICATE_REASON);
                    refs.push(ApplicationFlowRef {
                        application_id: id.clone(),
                        flow_id: skipped.id.clone(),
                        entitlement_type,
                        skipped: true,
                    });
                    group = group.flow(skipped);
                }
            }
            root.push(FlowNode::Parallel(group));
        }
        Ok(())
    }

    // ========================================================================
    // Application flows
    // ========================================================================

    fn entitle_flow(&self, app: &ApplicationDescriptor) -> Result<Flow> {
        let mut flow = application_flow(&app.id(), EntitlementType::Entitle);

        let backend = module_sequence(app, None, EntitlementType::Entitle, ModuleKind::Backend)?;
        let ui = module_sequence(app, None, EntitlementType::Entitle, ModuleKind::Ui)?;
        let layers = |seq: &ModulesSequence| -> Vec<Vec<ModuleChange>> {
            seq.layers
                .iter()
                .map(|layer| layer.iter().map(|h| ModuleChange::enable(&h.new.id)).collect())
                .collect()
        };
        flow = self.add_module_stages(flow, &layers(&backend), &layers(&ui), false);

        let modules = module_ids(app);
        if self.capabilities.gateway == GatewayMode::Kong {
            flow = flow.stage(KongRouteCreator::new(app.id(), modules.clone(), self.collab.clone()));
        }
        if self.capabilities.auth == AuthMode::Keycloak {
            flow = flow.stage(KeycloakAuthResourceCreator::new(app.id(), modules, self.collab.clone()));
        }
        Ok(flow.stage(EntitlementSaver::new(app.id(), self.collab.store.clone())))
    }

    fn revoke_flow(&self, app: &ApplicationDescriptor) -> Result<Flow> {
        let mut flow = application_flow(&app.id(), EntitlementType::Revoke);

        let modules = module_ids(app);
        if self.capabilities.auth == AuthMode::Keycloak {
            flow = flow.stage(KeycloakAuthResourceCleaner::new(app.id(), modules.clone(), self.collab.clone()));
        }
        if self.capabilities.gateway == GatewayMode::Kong {
            flow = flow.stage(KongRouteCleaner::new(app.id(), modules, self.collab.clone()));
        }

        let backend = module_sequence(app, None, EntitlementType::Revoke, ModuleKind::Backend)?;
        let ui = module_sequence(app, None, EntitlementType::Revoke, ModuleKind::Ui)?;
        let layers = |seq: &ModulesSequence| -> Vec<Vec<ModuleChange>> {
            seq.layers
                .iter()
                .map(|layer| layer.iter().map(|h| ModuleChange::disable(&h.new.id)).collect())
                .collect()
        };
        flow = self.add_module_stages(flow, &layers(&backend), &layers(&ui), true);

        Ok(flow.stage(EntitlementRemover::new(app.id(), self.collab.store.clone())))
    }

    fn upgrade_flow(&self, app: &ApplicationDescriptor, old: &ApplicationDescriptor) -> Result<Flow> {
        let mut flow = application_flow(&app.id(), EntitlementType::Upgrade);

        let backend = module_sequence(app, Some(old), EntitlementType::Upgrade, ModuleKind::Backend)?;
        let ui = module_sequence(app, Some(old), EntitlementType::Upgrade, ModuleKind::Ui)?;
        flow = self.add_module_stages(flow, &upgrade_changes(&backend), &upgrade_changes(&ui), false);

        let deprecated: Vec<String> = backend
            .deprecated
            .iter()
            .chain(ui.deprecated.iter())
            .flatten()
            .map(|m| m.id.clone())
            .collect();
        if !deprecated.is_empty() {
            flow = flow.stage(DeprecatedModulesUninstaller::new(deprecated, self.collab.clone()));
        }

        let upgrade = ApplicationUpgrade {
            from_id: old.id(),
            to_id: app.id(),
            from_modules: module_ids(old),
            to_modules: module_ids(app),
        };
        if self.capabilities.gateway == GatewayMode::Kong {
            flow = flow.stage(KongRouteUpdater::new(upgrade.clone(), self.collab.clone()));
        }
        if self.capabilities.auth == AuthMode::Keycloak {
            flow = flow.stage(KeycloakAuthResourceUpdater::new(upgrade, self.collab.clone()));
        }
        Ok(flow.stage(EntitlementUpdater::new(old.id(), app.id(), self.collab.store.clone())))
    }

    /// Module stages for backend and UI layers
    ///
    /// Removal handles UI modules before backend modules; installs do the
    /// opposite.
    fn add_module_stages(
        &self,
        mut flow: Flow,
        backend: &[Vec<ModuleChange>],
        ui: &[Vec<ModuleChange>],
        removal: bool,
    ) -> Flow {
        let groups: [(&str, &[Vec<ModuleChange>]); 2] = if removal {
            [("ui-modules", ui), ("modules", backend)]
        } else {
            [("modules", backend), ("ui-modules", ui)]
        };

        match self.capabilities.module_installer {
            ModuleInstallerMode::Folio => {
                for (prefix, layers) in groups {
                    for (index, layer) in layers.iter().filter(|l| !l.is_empty()).enumerate() {
                        let mut group = ParallelStage::new(format!("{prefix}-l{index}"));
                        for change in layer {
                            group = group.stage(ModuleStage::new(change.clone(), self.collab.clone()));
                        }
                        flow = flow.parallel(group);
                    }
                }
            }
            ModuleInstallerMode::Okapi => {
                let changes: Vec<ModuleChange> = groups
                    .iter()
                    .flat_map(|(_, layers)| layers.iter().flatten().cloned())
                    .collect();
                if !changes.is_empty() {
                    flow = if removal {
                        flow.stage(BatchModulesStage::uninstaller(changes, self.collab.clone()))
                    } else {
                        flow.stage(BatchModulesStage::installer(changes, self.collab.clone()))
                    };
                }
            }
        }
        flow
    }
}

fn application_flow(application_id: &str, entitlement_type: EntitlementType) -> Flow {
    Flow::new(new_id())
        .param(APPLICATION_ID_PARAM, application_id)
        .param(TYPE_PARAM, entitlement_type.as_str())
}

/// Install new modules, upgrade changed ones, leave identical ones alone
fn upgrade_changes(seq: &ModulesSequence) -> Vec<Vec<ModuleChange>> {
    seq.layers
        .iter()
        .map(|layer| {
            layer
                .iter()
                .filter_map(|h| match &h.old {
                    None => Some(ModuleChange::enable(&h.new.id)),
                    Some(old) if old.id != h.new.id => Some(ModuleChange::upgrade(&old.id, &h.new.id)),
                    Some(_) => None,
                })
                .collect()
        })
        .collect()
}

fn installed<'a>(
    entitled_by_name: &BTreeMap<&str, &'a ApplicationDescriptor>,
    app: &ApplicationDescriptor,
) -> Result<&'a ApplicationDescriptor> {
    entitled_by_name.get(app.name.as_str()).copied().ok_or_else(|| {
        appgraph::Error::NotFound(format!("No entitled version of {} to upgrade", app.name)).into()
    })
}

/// Extra occurrences of every repeated id
fn duplicate_counts(ids: &[String]) -> BTreeMap<String, usize> {
    let mut seen = BTreeSet::new();
    let mut extra: BTreeMap<String, usize> = BTreeMap::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            *extra.entry(id.clone()).or_default() += 1;
        }
    }
    extra
}

#[cfg(test)]
mod tests {
    use super::*;
    use appgraph::ModuleDescriptor;
    use integration::backend::memory::MemoryBackend;
    use integration::{AuthResources, GatewayRoutes, ModuleInstaller, RetryConfig};
    use std::sync::Arc;
    use store::Store;

    fn builder(capabilities: Capabilities) -> FlowBuilder {
        let backend = Arc::new(MemoryBackend::new());
        FlowBuilder::new(
            capabilities,
            Collaborators {
                installer: Arc::clone(&backend) as Arc<dyn ModuleInstaller>,
                gateway: Arc::clone(&backend) as Arc<dyn GatewayRoutes>,
                auth: backend as Arc<dyn AuthResources>,
                store: Arc::new(Store::open_in_memory().unwrap()),
                retry: RetryConfig::no_retry(),
            },
        )
    }

    fn full() -> Capabilities {
        Capabilities {
            module_installer: ModuleInstallerMode::Folio,
            gateway: GatewayMode::Kong,
            auth: AuthMode::Keycloak,
        }
    }

    /// Stage paths with application flow ids replaced by application ids
    fn describe(flow: &Flow) -> Vec<String> {
        fn walk(node: &FlowNode, prefix: &str, out: &mut Vec<String>) {
            match node {
                FlowNode::Stage(stage) => out.push(format!("{prefix}{}", stage.name())),
                FlowNode::Parallel(group) => {
                    for child in &group.children {
                        walk(child, &format!("{prefix}{}/", group.name), out);
                    }
                }
                FlowNode::Flow(flow) => {
                    let name = flow.params.get_str(APPLICATION_ID_PARAM).unwrap_or("?");
                    if let Some(reason) = &flow.skip_reason {
                        out.push(format!("{prefix}{name} SKIPPED ({reason})"));
                    }
                    for child in &flow.nodes {
                        walk(child, &format!("{prefix}{name}/"), out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        for node in &flow.nodes {
            walk(node, "", &mut out);
        }
        out
    }

    fn users(version: &str) -> ApplicationDescriptor {
        ApplicationDescriptor::new("app-users", version)
            .with_module(ModuleDescriptor::new(format!("mod-users-{version}")).provides("users", "1.0"))
            .with_module(
                ModuleDescriptor::new(format!("mod-login-{version}"))
                    .provides("login", "1.0")
                    .requires("users", "1.0"),
            )
            .with_module(ModuleDescriptor::new(format!("mod-roles-{version}")).provides("roles", "1.0"))
            .with_ui_module(ModuleDescriptor::new(format!("folio_users-{version}")))
    }

    fn notes() -> ApplicationDescriptor {
        ApplicationDescriptor::new("app-notes", "1.0.0")
            .depends_on("app-users", "^1.0.0")
            .with_module(ModuleDescriptor::new("mod-notes-1.0.0").requires("users", "1.0"))
    }

    fn request(entitlement_type: EntitlementType, ids: &[&str]) -> EntitlementRequest {
        EntitlementRequest::new("diku", entitlement_type, ids.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn test_entitle_flow_layout() {
        let apps = [notes(), users("1.0.0")];
        let plan = builder(full())
            .create_flow(
                &request(EntitlementType::Entitle, &["app-notes-1.0.0", "app-users-1.0.0"]),
                &FlowInput {
                    applications: &apps,
                    entitled: &[],
                    plan: None,
                },
            )
            .unwrap();

        assert_eq!(
            describe(&plan.flow),
            vec![
                "appi-l0/app-users-1.0.0/modules-l0/mod-roles-installer",
                "appi-l0/app-users-1.0.0/modules-l0/mod-users-installer",
                "appi-l0/app-users-1.0.0/modules-l1/mod-login-installer",
                "appi-l0/app-users-1.0.0/ui-modules-l0/folio_users-installer",
                "appi-l0/app-users-1.0.0/KongRouteCreator",
                "appi-l0/app-users-1.0.0/KeycloakAuthResourceCreator",
                "appi-l0/app-users-1.0.0/EntitlementSaver",
                "appi-l1/app-notes-1.0.0/modules-l0/mod-notes-installer",
                "appi-l1/app-notes-1.0.0/KongRouteCreator",
                "appi-l1/app-notes-1.0.0/KeycloakAuthResourceCreator",
                "appi-l1/app-notes-1.0.0/EntitlementSaver",
            ]
        );
        assert_eq!(plan.flow.params.get_str(TENANT_PARAM), Some("diku"));
        assert_eq!(plan.flow.params.get_str(TYPE_PARAM), Some("ENTITLE"));
        assert!(Uuid::parse_str(plan.flow_id()).is_ok());
        let ids: Vec<_> = plan
            .application_flows
            .iter()
            .map(|f| f.application_id.as_str())
            .collect();
        assert_eq!(ids, vec!["app-users-1.0.0", "app-notes-1.0.0"]);
    }

    #[test]
    fn test_okapi_without_integrations() {
        let apps = [users("1.0.0")];
        let plan = builder(Capabilities {
            module_installer: ModuleInstallerMode::Okapi,
            ..Capabilities::default()
        })
        .create_flow(
            &request(EntitlementType::Entitle, &["app-users-1.0.0"]),
            &FlowInput {
                applications: &apps,
                entitled: &[],
                plan: None,
            },
        )
        .unwrap();

        assert_eq!(
            describe(&plan.flow),
            vec![
                "appi-l0/app-users-1.0.0/OkapiModulesInstaller",
                "appi-l0/app-users-1.0.0/EntitlementSaver",
            ]
        );
    }

    #[test]
    fn test_revoke_flow_reverses_everything() {
        let apps = [notes(), users("1.0.0")];
        let plan = builder(full())
            .create_flow(
                &request(EntitlementType::Revoke, &["app-notes-1.0.0", "app-users-1.0.0"]),
                &FlowInput {
                    applications: &apps,
                    entitled: &apps,
                    plan: None,
                },
            )
            .unwrap();

        assert_eq!(
            describe(&plan.flow),
            vec![
                "appi-l0/app-notes-1.0.0/KeycloakAuthResourceCleaner",
                "appi-l0/app-notes-1.0.0/KongRouteCleaner",
                "appi-l0/app-notes-1.0.0/modules-l0/mod-notes-uninstaller",
                "appi-l0/app-notes-1.0.0/EntitlementRemover",
                "appi-l1/app-users-1.0.0/KeycloakAuthResourceCleaner",
                "appi-l1/app-users-1.0.0/KongRouteCleaner",
                "appi-l1/app-users-1.0.0/ui-modules-l0/folio_users-uninstaller",
                "appi-l1/app-users-1.0.0/modules-l0/mod-login-uninstaller",
                "appi-l1/app-users-1.0.0/modules-l1/mod-roles-uninstaller",
                "appi-l1/app-users-1.0.0/modules-l1/mod-users-uninstaller",
                "appi-l1/app-users-1.0.0/EntitlementRemover",
            ]
        );
    }

    #[test]
    fn test_upgrade_flow_changes_only_what_differs() {
        let old = ApplicationDescriptor::new("app-users", "1.0.0")
            .with_module(ModuleDescriptor::new("mod-users-1.0.0"))
            .with_module(ModuleDescriptor::new("mod-roles-1.0.0"))
            .with_module(ModuleDescriptor::new("mod-legacy-1.0.0"));
        let new = ApplicationDescriptor::new("app-users", "1.1.0")
            .with_module(ModuleDescriptor::new("mod-users-1.1.0"))
            .with_module(ModuleDescriptor::new("mod-roles-1.0.0"))
            .with_module(ModuleDescriptor::new("mod-audit-1.0.0"));

        let plan = builder(full())
            .create_flow(
                &request(EntitlementType::Upgrade, &["app-users-1.1.0"]),
                &FlowInput {
                    applications: std::slice::from_ref(&new),
                    entitled: std::slice::from_ref(&old),
                    plan: None,
                },
            )
            .unwrap();

        assert_eq!(
            describe(&plan.flow),
            vec![
                "appi-l0/app-users-1.1.0/modules-l0/mod-audit-installer",
                "appi-l0/app-users-1.1.0/modules-l0/mod-users-upgrader",
                "appi-l0/app-users-1.1.0/DeprecatedModulesUninstaller",
                "appi-l0/app-users-1.1.0/KongRouteUpdater",
                "appi-l0/app-users-1.1.0/KeycloakAuthResourceUpdater",
                "appi-l0/app-users-1.1.0/EntitlementUpdater",
            ]
        );
    }

    #[test]
    fn test_upgrade_without_entitled_version_fails() {
        let apps = [users("1.1.0")];
        let err = builder(full())
            .create_flow(
                &request(EntitlementType::Upgrade, &["app-users-1.1.0"]),
                &FlowInput {
                    applications: &apps,
                    entitled: &[],
                    plan: None,
                },
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "No entitled version of app-users to upgrade");
    }

    #[test]
    fn test_duplicate_application_is_skipped() {
        let apps = [notes()];
        let plan = builder(Capabilities::default())
            .create_flow(
                &request(EntitlementType::Entitle, &["app-notes-1.0.0", "app-notes-1.0.0"]),
                &FlowInput {
                    applications: &apps,
                    entitled: &[],
                    plan: None,
                },
            )
            .unwrap();

        assert_eq!(
            describe(&plan.flow),
            vec![
                "appi-l0/app-notes-1.0.0/modules-l0/mod-notes-installer",
                "appi-l0/app-notes-1.0.0/EntitlementSaver",
                "appi-l0/app-notes-1.0.0 SKIPPED (Duplicate application id in request)",
            ]
        );
        assert_eq!(plan.application_flows.len(), 2);
        assert_eq!(plan.application_flows.iter().filter(|f| f.skipped).count(), 1);
    }

    #[test]
    fn test_state_flow_revokes_first() {
        let entitled = [ApplicationDescriptor::new("app-users", "1.0.0"), notes()];
        let desired = [
            ApplicationDescriptor::new("app-users", "1.1.0"),
            ApplicationDescriptor::new("app-tags", "1.0.0"),
        ];
        let transition = ApplicationStateTransitionPlan::from_ids(
            &entitled.iter().map(ApplicationDescriptor::id).collect::<Vec<_>>(),
            &desired.iter().map(ApplicationDescriptor::id).collect::<Vec<_>>(),
        )
        .unwrap();

        let plan = builder(Capabilities::default())
            .create_flow(
                &request(EntitlementType::State, &["app-users-1.1.0", "app-tags-1.0.0"]),
                &FlowInput {
                    applications: &desired,
                    entitled: &entitled,
                    plan: Some(&transition),
                },
            )
            .unwrap();

        assert_eq!(
            describe(&plan.flow),
            vec![
                "appr-l0/app-notes-1.0.0/modules-l0/mod-notes-uninstaller",
                "appr-l0/app-notes-1.0.0/EntitlementRemover",
                "appi-l0/app-tags-1.0.0/EntitlementSaver",
                "appi-l0/app-users-1.1.0/EntitlementUpdater",
            ]
        );
        let types: Vec<_> = plan
            .application_flows
            .iter()
            .map(|f| f.entitlement_type)
            .collect();
        assert_eq!(
            types,
            vec![
                EntitlementType::Revoke,
                EntitlementType::Entitle,
                EntitlementType::Upgrade,
            ]
        );
    }

    #[test]
    fn test_duplicate_counts() {
        let ids: Vec<String> = ["a-1.0.0", "b-1.0.0", "a-1.0.0", "a-1.0.0"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(duplicate_counts(&ids), BTreeMap::from([("a-1.0.0".to_string(), 2)]));
    }
}
