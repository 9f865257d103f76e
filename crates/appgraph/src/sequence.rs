//! Module install, upgrade and removal ordering inside one application
//!
//! Modules are layered by their provide/require edges: a module requiring
//! interface `X` lands in a later layer than the module of the same
//! application providing `X`. Requirements satisfied outside the
//! application do not constrain the order.

use crate::descriptor::{ApplicationDescriptor, EntitlementType, ModuleDescriptor, ModuleKind};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A module of the target application, paired with its installed predecessor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDescriptorHolder {
    /// Module from the target application version
    pub new: ModuleDescriptor,
    /// Module with the same name from the installed version, if any
    pub old: Option<ModuleDescriptor>,
}

impl ModuleDescriptorHolder {
    pub fn new(new: ModuleDescriptor, old: Option<ModuleDescriptor>) -> Self {
        Self { new, old }
    }

    /// Module did not exist in the installed version
    pub fn is_added(&self) -> bool {
        self.old.is_none()
    }

    /// Module exists in both versions with different ids
    pub fn is_changed(&self) -> bool {
        self.old.as_ref().is_some_and(|old| old.id != self.new.id)
    }
}

/// Ordered module layers for one application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModulesSequence {
    /// Layers in execution order
    pub layers: Vec<Vec<ModuleDescriptorHolder>>,
    /// Modules of the installed version missing from the target version,
    /// in removal order
    pub deprecated: Vec<Vec<ModuleDescriptor>>,
}

impl ModulesSequence {
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty() && self.deprecated.is_empty()
    }

    /// All holders flattened in execution order
    pub fn holders(&self) -> impl Iterator<Item = &ModuleDescriptorHolder> {
        self.layers.iter().flatten()
    }
}

/// Compute module ordering for one application
///
/// * `app` - target application version
/// * `installed` - currently entitled version of the same application
/// * `entitlement_type` - what the request does with the application
/// * `kind` - backend or UI modules
///
/// `State` behaves like `Upgrade` when an installed version is given and
/// like `Entitle` otherwise.
pub fn module_sequence(
    app: &ApplicationDescriptor,
    installed: Option<&ApplicationDescriptor>,
    entitlement_type: EntitlementType,
    kind: ModuleKind,
) -> Result<ModulesSequence> {
    let modules = app.modules_of(kind);

    match (entitlement_type, installed) {
        (EntitlementType::Revoke, _) => {
            let mut layers = layer_modules(&app.id(), modules)?;
            layers.reverse();
            Ok(ModulesSequence {
                layers: holders(layers, |_| None),
                deprecated: Vec::new(),
            })
        }
        (EntitlementType::Upgrade | EntitlementType::State, Some(old_app)) => {
            let old_modules = old_app.modules_of(kind);
            let old_by_name: BTreeMap<String, &ModuleDescriptor> =
                old_modules.iter().map(|m| (m.name(), m)).collect();
            let new_names: BTreeSet<String> = modules.iter().map(ModuleDescriptor::name).collect();

            let layers = layer_modules(&app.id(), modules)?;

            let deprecated_modules: Vec<ModuleDescriptor> = old_modules
                .iter()
                .filter(|m| !new_names.contains(&m.name()))
                .cloned()
                .collect();
            let mut deprecated = layer_modules(&old_app.id(), &deprecated_modules)?;
            deprecated.reverse();

            Ok(ModulesSequence {
                layers: holders(layers, |m| old_by_name.get(&m.name()).map(|o| (*o).clone())),
                deprecated,
            })
        }
        _ => Ok(ModulesSequence {
            layers: holders(layer_modules(&app.id(), modules)?, |_| None),
            deprecated: Vec::new(),
        }),
    }
}

fn holders<F>(layers: Vec<Vec<ModuleDescriptor>>, previous: F) -> Vec<Vec<ModuleDescriptorHolder>>
where
    F: Fn(&ModuleDescriptor) -> Option<ModuleDescriptor>,
{
    layers
        .into_iter()
        .map(|layer| {
            layer
                .into_iter()
                .map(|m| {
                    let old = previous(&m);
                    ModuleDescriptorHolder::new(m, old)
                })
                .collect()
        })
        .collect()
}

/// Peel modules into layers by intra-application interface edges
///
/// Ties inside a layer are broken lexicographically by module id.
pub fn layer_modules(
    application_id: &str,
    modules: &[ModuleDescriptor],
) -> Result<Vec<Vec<ModuleDescriptor>>> {
    let mut providers: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for module in modules {
        for interface in &module.provides {
            providers
                .entry(interface.id.as_str())
                .or_default()
                .insert(module.id.as_str());
        }
    }

    let mut remaining: BTreeMap<&str, (&ModuleDescriptor, BTreeSet<&str>)> = modules
        .iter()
        .map(|module| {
            let deps: BTreeSet<&str> = module
                .requires
                .iter()
                .filter_map(|r| providers.get(r.id.as_str()))
                .flatten()
                .copied()
                .filter(|id| *id != module.id.as_str())
                .collect();
            (module.id.as_str(), (module, deps))
        })
        .collect();

    let mut placed: BTreeSet<&str> = BTreeSet::new();
    let mut layers = Vec::new();

    while !remaining.is_empty() {
        let ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, (_, deps))| deps.iter().all(|d| placed.contains(d)))
            .map(|(id, _)| *id)
            .collect();

        if ready.is_empty() {
            let stuck: Vec<&str> = remaining.keys().copied().collect();
            return Err(Error::validation(format!(
                "Circular module dependency in application {application_id}: {}",
                stuck.join(", ")
            )));
        }

        let mut layer = Vec::with_capacity(ready.len());
        for id in ready {
            if let Some((module, _)) = remaining.remove(id) {
                layer.push(module.clone());
            }
            placed.insert(id);
        }
        layers.push(layer);
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer_ids(seq: &ModulesSequence) -> Vec<Vec<String>> {
        seq.layers
            .iter()
            .map(|l| l.iter().map(|h| h.new.id.clone()).collect())
            .collect()
    }

    fn sample_app() -> ApplicationDescriptor {
        ApplicationDescriptor::new("app-foo", "1.0.0")
            .with_module(
                ModuleDescriptor::new("mod-users-1.0.0")
                    .provides("users", "1.0")
                    .requires("permissions", "1.0"),
            )
            .with_module(ModuleDescriptor::new("mod-permissions-1.0.0").provides("permissions", "1.0"))
            .with_module(
                ModuleDescriptor::new("mod-login-1.0.0")
                    .requires("users", "1.0")
                    .requires("external", "2.0"),
            )
            .with_module(ModuleDescriptor::new("mod-audit-1.0.0"))
            .with_ui_module(ModuleDescriptor::new("folio_users-1.0.0").requires("users", "1.0"))
            .with_ui_module(ModuleDescriptor::new("folio_audit-1.0.0"))
    }

    #[test]
    fn test_entitle_layers() {
        let seq = module_sequence(&sample_app(), None, EntitlementType::Entitle, ModuleKind::Backend)
            .unwrap();

        assert_eq!(
            layer_ids(&seq),
            vec![
                vec!["mod-audit-1.0.0".to_string(), "mod-permissions-1.0.0".to_string()],
                vec!["mod-users-1.0.0".to_string()],
                vec!["mod-login-1.0.0".to_string()],
            ]
        );
        assert!(seq.holders().all(ModuleDescriptorHolder::is_added));
        assert!(seq.deprecated.is_empty());
    }

    #[test]
    fn test_requirer_never_before_provider() {
        let app = sample_app();
        let seq =
            module_sequence(&app, None, EntitlementType::Entitle, ModuleKind::Backend).unwrap();

        let position = |id: &str| {
            seq.layers
                .iter()
                .position(|l| l.iter().any(|h| h.new.id == id))
                .unwrap()
        };
        for module in &app.modules {
            for required in &module.requires {
                for provider in app.modules.iter().filter(|m| {
                    m.provides.iter().any(|p| p.id == required.id)
                }) {
                    assert!(position(&provider.id) < position(&module.id));
                }
            }
        }
    }

    #[test]
    fn test_revoke_reverses_layers() {
        let seq = module_sequence(&sample_app(), None, EntitlementType::Revoke, ModuleKind::Backend)
            .unwrap();
        assert_eq!(layer_ids(&seq)[0], vec!["mod-login-1.0.0".to_string()]);
        assert_eq!(layer_ids(&seq).len(), 3);
    }

    #[test]
    fn test_ui_modules_use_own_edges() {
        let seq = module_sequence(&sample_app(), None, EntitlementType::Entitle, ModuleKind::Ui)
            .unwrap();
        // `users` is provided by a backend module, so it does not order UI modules
        assert_eq!(
            layer_ids(&seq),
            vec![vec![
                "folio_audit-1.0.0".to_string(),
                "folio_users-1.0.0".to_string()
            ]]
        );
    }

    #[test]
    fn test_upgrade_pairs_and_deprecated() {
        let old = ApplicationDescriptor::new("app-foo", "1.0.0")
            .with_module(ModuleDescriptor::new("mod-users-1.0.0").provides("users", "1.0"))
            .with_module(ModuleDescriptor::new("mod-legacy-1.0.0").requires("legacy", "1.0"))
            .with_module(ModuleDescriptor::new("mod-legacy-store-1.0.0").provides("legacy", "1.0"))
            .with_module(ModuleDescriptor::new("mod-audit-1.0.0"));
        let new = ApplicationDescriptor::new("app-foo", "2.0.0")
            .with_module(ModuleDescriptor::new("mod-users-2.0.0").provides("users", "2.0"))
            .with_module(ModuleDescriptor::new("mod-audit-1.0.0"))
            .with_module(ModuleDescriptor::new("mod-notes-1.0.0").requires("users", "2.0"));

        let seq =
            module_sequence(&new, Some(&old), EntitlementType::Upgrade, ModuleKind::Backend).unwrap();

        let users = seq.holders().find(|h| h.new.id == "mod-users-2.0.0").unwrap();
        assert_eq!(users.old.as_ref().unwrap().id, "mod-users-1.0.0");
        assert!(users.is_changed());

        let audit = seq.holders().find(|h| h.new.id == "mod-audit-1.0.0").unwrap();
        assert!(!audit.is_changed() && !audit.is_added());

        let notes = seq.holders().find(|h| h.new.id == "mod-notes-1.0.0").unwrap();
        assert!(notes.is_added());

        // Deprecated modules come out in removal order: dependents first
        let deprecated: Vec<Vec<String>> = seq
            .deprecated
            .iter()
            .map(|l| l.iter().map(|m| m.id.clone()).collect())
            .collect();
        assert_eq!(
            deprecated,
            vec![
                vec!["mod-legacy-1.0.0".to_string()],
                vec!["mod-legacy-store-1.0.0".to_string()]
            ]
        );
    }

    #[test]
    fn test_state_without_installed_acts_like_entitle() {
        let app = sample_app();
        let state = module_sequence(&app, None, EntitlementType::State, ModuleKind::Backend).unwrap();
        let entitle =
            module_sequence(&app, None, EntitlementType::Entitle, ModuleKind::Backend).unwrap();
        assert_eq!(state, entitle);
    }

    #[test]
    fn test_module_cycle() {
        let app = ApplicationDescriptor::new("app-loop", "1.0.0")
            .with_module(ModuleDescriptor::new("mod-a-1.0.0").provides("a", "1.0").requires("b", "1.0"))
            .with_module(ModuleDescriptor::new("mod-b-1.0.0").provides("b", "1.0").requires("a", "1.0"));

        let err = module_sequence(&app, None, EntitlementType::Entitle, ModuleKind::Backend)
            .unwrap_err();
        assert!(err.to_string().starts_with("Circular module dependency in application app-loop-1.0.0"));
    }
}
