//! Interface and dependency integrity across a set of applications
//!
//! Collects which interfaces a candidate application set requires and which
//! ones the candidates plus the tenant's entitled applications provide, so
//! callers can report missing providers and version mismatches before any
//! installation starts.

use crate::descriptor::{ApplicationDescriptor, Dependency};
use crate::error::Result;
use crate::version::{VersionRange, interface_compatible};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// An interface required or provided by a module of an application
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InterfaceItem {
    pub interface_id: String,
    pub version: String,
    /// Application owning the module
    pub application_id: String,
}

/// Required interfaces and their potential providers
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequiredProvidedInterfaces {
    pub required: BTreeSet<InterfaceItem>,
    pub provided: BTreeMap<String, BTreeSet<InterfaceItem>>,
}

impl RequiredProvidedInterfaces {
    /// Required interfaces without a provider at a compatible version
    pub fn missing_interfaces(&self) -> Vec<&InterfaceItem> {
        self.required
            .iter()
            .filter(|req| {
                !self.provided.get(&req.interface_id).is_some_and(|providers| {
                    providers
                        .iter()
                        .any(|p| interface_compatible(&req.version, &p.version))
                })
            })
            .collect()
    }

    /// Whether every required interface is satisfied
    pub fn is_satisfied(&self) -> bool {
        self.missing_interfaces().is_empty()
    }
}

/// Collect required and provided interfaces
///
/// Candidates replace entitled applications of the same name (an upgrade
/// target hides its installed version). With `exclude_entitled`, interfaces
/// required only by entitled applications are left out; entitled providers
/// are always kept.
pub fn collect_interfaces(
    candidates: &[ApplicationDescriptor],
    entitled: &[ApplicationDescriptor],
    exclude_entitled: bool,
) -> RequiredProvidedInterfaces {
    let candidate_names: BTreeSet<&str> = candidates.iter().map(|a| a.name.as_str()).collect();
    let entitled = entitled
        .iter()
        .filter(|a| !candidate_names.contains(a.name.as_str()));

    let mut result = RequiredProvidedInterfaces::default();

    let mut add = |app: &ApplicationDescriptor, include_required: bool| {
        let application_id = app.id();
        for module in app.all_modules() {
            for provided in &module.provides {
                result
                    .provided
                    .entry(provided.id.clone())
                    .or_default()
                    .insert(InterfaceItem {
                        interface_id: provided.id.clone(),
                        version: provided.version.clone(),
                        application_id: application_id.clone(),
                    });
            }
            if include_required {
                for required in &module.requires {
                    result.required.insert(InterfaceItem {
                        interface_id: required.id.clone(),
                        version: required.version.clone(),
                        application_id: application_id.clone(),
                    });
                }
            }
        }
    };

    for app in candidates {
        add(app, true);
    }
    for app in entitled {
        add(app, !exclude_entitled);
    }

    result
}

/// A dependency nobody in the candidate or entitled set satisfies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingDependency {
    pub application_id: String,
    pub dependency: Dependency,
}

/// A dependency whose range rejects the already entitled version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyMismatch {
    pub application_id: String,
    pub dependency: Dependency,
    pub installed_id: String,
}

/// Outcome of checking application dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyReport {
    pub missing: Vec<MissingDependency>,
    pub mismatched: Vec<DependencyMismatch>,
}

impl DependencyReport {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }
}

/// Check candidate dependencies against candidates and entitled apps
///
/// A dependency is satisfied by a candidate of that name at a matching
/// version. Otherwise an entitled application of that name must match,
/// else it is reported as a mismatch; with no application of that name at
/// all the dependency is missing.
pub fn check_dependencies(
    candidates: &[ApplicationDescriptor],
    entitled: &[ApplicationDescriptor],
) -> Result<DependencyReport> {
    let mut report = DependencyReport::default();

    for app in candidates {
        for dependency in &app.dependencies {
            let range: VersionRange = dependency.range()?;

            let candidate_match = candidates
                .iter()
                .filter(|c| c.name == dependency.name)
                .map(|c| Ok((c, range.matches(&c.semver()?))))
                .collect::<Result<Vec<_>>>()?;
            if candidate_match.iter().any(|(_, ok)| *ok) {
                continue;
            }

            let installed = entitled.iter().find(|e| e.name == dependency.name);
            match installed {
                Some(installed) if range.matches(&installed.semver()?) => {}
                Some(installed) => report.mismatched.push(DependencyMismatch {
                    application_id: app.id(),
                    dependency: dependency.clone(),
                    installed_id: installed.id(),
                }),
                None => match candidate_match.first() {
                    Some((c, _)) => report.mismatched.push(DependencyMismatch {
                        application_id: app.id(),
                        dependency: dependency.clone(),
                        installed_id: c.id(),
                    }),
                    None => report.missing.push(MissingDependency {
                        application_id: app.id(),
                        dependency: dependency.clone(),
                    }),
                },
            }
        }
    }

    Ok(report)
}
