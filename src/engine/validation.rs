//! Request validation
//!
//! Validation runs after descriptors are loaded and before any flow is
//! queued. A failed check aborts the request with a validation error.

use anyhow::{Result, bail};
use appgraph::{
    ApplicationDescriptor, DependencyResolver, EntitlementType, check_dependencies,
    collect_interfaces,
};
use std::collections::{BTreeMap, BTreeSet};

use super::request::EntitlementRequest;

/// Name of the application dependency validator
pub const DEPENDENCY: &str = "dependency";
/// Name of the module interface validator
pub const INTERFACE_INTEGRITY: &str = "interface-integrity";

/// Validators run for every request, in order
pub const DEFAULT_VALIDATORS: [&str; 2] = [DEPENDENCY, INTERFACE_INTEGRITY];

/// Everything a validator may look at
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub request: &'a EntitlementRequest,
    /// Descriptors of the requested application ids
    pub applications: &'a [ApplicationDescriptor],
    /// Descriptors currently entitled for the tenant
    pub entitled: &'a [ApplicationDescriptor],
}

impl ValidationContext<'_> {
    /// Entitled applications that survive the request
    ///
    /// Revoked applications and the old versions of upgraded ones are gone.
    fn remaining(&self) -> Vec<ApplicationDescriptor> {
        let touched: BTreeSet<&str> = self.applications.iter().map(|a| a.name.as_str()).collect();
        self.entitled
            .iter()
            .filter(|a| !touched.contains(a.name.as_str()))
            .cloned()
            .collect()
    }
}

/// A named check over a request
pub trait RequestValidator {
    fn name(&self) -> &'static str;

    /// Whether the check applies to the request type
    fn applies_to(&self, entitlement_type: EntitlementType) -> bool;

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()>;
}

/// Look up a validator by name
pub fn validator(name: &str) -> Result<Box<dyn RequestValidator>> {
    match name {
        DEPENDENCY => Ok(Box::new(DependencyValidator)),
        INTERFACE_INTEGRITY => Ok(Box::new(InterfaceIntegrityValidator)),
        _ => bail!(appgraph::Error::validation(format!(
            "Invalid validator name: {name}"
        ))),
    }
}

/// Run one named validator
pub fn validate_with(name: &str, ctx: &ValidationContext<'_>) -> Result<()> {
    let validator = validator(name)?;
    if validator.applies_to(ctx.request.entitlement_type) {
        log::debug!("Running {} validator", validator.name());
        validator.validate(ctx)?;
    }
    Ok(())
}

/// Type-specific checks followed by every default validator
pub fn validate_request(ctx: &ValidationContext<'_>) -> Result<()> {
    match ctx.request.entitlement_type {
        EntitlementType::Entitle => check_not_entitled(ctx)?,
        EntitlementType::Upgrade => check_upgradable(ctx)?,
        EntitlementType::Revoke => check_entitled(ctx)?,
        EntitlementType::State => {}
    }

    for name in DEFAULT_VALIDATORS {
        validate_with(name, ctx)?;
    }
    Ok(())
}

fn validation_error(message: String) -> anyhow::Error {
    appgraph::Error::validation(message).into()
}

fn entitled_versions(entitled: &[ApplicationDescriptor]) -> BTreeMap<&str, &ApplicationDescriptor> {
    entitled.iter().map(|a| (a.name.as_str(), a)).collect()
}

fn check_not_entitled(ctx: &ValidationContext<'_>) -> Result<()> {
    let entitled = entitled_versions(ctx.entitled);
    let already: Vec<String> = ctx
        .applications
        .iter()
        .filter(|a| entitled.contains_key(a.name.as_str()))
        .map(ApplicationDescriptor::id)
        .collect();

    if !already.is_empty() {
        return Err(validation_error(format!(
            "Applications already entitled: {}",
            already.join(", ")
        )));
    }
    Ok(())
}

fn check_entitled(ctx: &ValidationContext<'_>) -> Result<()> {
    let entitled: BTreeSet<String> = ctx.entitled.iter().map(ApplicationDescriptor::id).collect();
    let missing: Vec<String> = ctx
        .applications
        .iter()
        .map(ApplicationDescriptor::id)
        .filter(|id| !entitled.contains(id))
        .collect();

    if !missing.is_empty() {
        return Err(validation_error(format!(
            "Applications not entitled: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

fn check_upgradable(ctx: &ValidationContext<'_>) -> Result<()> {
    let entitled = entitled_versions(ctx.entitled);
    let mut problems = Vec::new();

    for app in ctx.applications {
        match entitled.get(app.name.as_str()) {
            None => problems.push(format!("{} is not entitled", app.name)),
            Some(current) if app.semver()? <= current.semver()? => problems.push(format!(
                "{} must be newer than {}",
                app.id(),
                current.id()
            )),
            Some(_) => {}
        }
    }

    if !problems.is_empty() {
        return Err(validation_error(format!(
            "Invalid upgrade request: {}",
            problems.join("; ")
        )));
    }
    Ok(())
}

// ============================================================================
// Dependency validator
// ============================================================================

/// Every application dependency is satisfied by the request or by an
/// entitled application, and no revoked application is still needed
struct DependencyValidator;

impl DependencyValidator {
    fn validate_install(ctx: &ValidationContext<'_>) -> Result<()> {
        let remaining = ctx.remaining();

        let mut universe = ctx.applications.to_vec();
        universe.extend(remaining.iter().cloned());
        if !universe.is_empty() {
            let resolver = DependencyResolver::new(&universe)?;
            for app in ctx.applications {
                resolver.get_all_dependencies(app)?;
            }
        }

        let report = check_dependencies(ctx.applications, &remaining)?;
        if report.is_ok() {
            return Ok(());
        }

        let mut problems: Vec<String> = report
            .missing
            .iter()
            .map(|m| {
                format!(
                    "{} requires {} {}",
                    m.application_id, m.dependency.name, m.dependency.version
                )
            })
            .collect();
        problems.extend(report.mismatched.iter().map(|m| {
            format!(
                "{} requires {} {} but found {}",
                m.application_id, m.dependency.name, m.dependency.version, m.installed_id
            )
        }));

        Err(validation_error(format!(
            "Missing dependencies found for applications: {}",
            problems.join("; ")
        )))
    }

    fn validate_revoke(ctx: &ValidationContext<'_>) -> Result<()> {
        let revoked: BTreeSet<&str> = ctx.applications.iter().map(|a| a.name.as_str()).collect();
        let remaining = ctx.remaining();

        let report = check_dependencies(&remaining, &[])?;
        let dependents: Vec<String> = report
            .missing
            .iter()
            .filter(|m| revoked.contains(m.dependency.name.as_str()))
            .map(|m| format!("{} is required by {}", m.dependency.name, m.application_id))
            .collect();

        if !dependents.is_empty() {
            return Err(validation_error(format!(
                "Applications are still in use: {}",
                dependents.join("; ")
            )));
        }
        Ok(())
    }
}

impl RequestValidator for DependencyValidator {
    fn name(&self) -> &'static str {
        DEPENDENCY
    }

    fn applies_to(&self, _entitlement_type: EntitlementType) -> bool {
        true
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        match ctx.request.entitlement_type {
            EntitlementType::Revoke => Self::validate_revoke(ctx),
            _ => Self::validate_install(ctx),
        }
    }
}

// ============================================================================
// Interface integrity validator
// ============================================================================

/// Every interface required by a requested module is provided by the
/// request or by an entitled application
struct InterfaceIntegrityValidator;

impl RequestValidator for InterfaceIntegrityValidator {
    fn name(&self) -> &'static str {
        INTERFACE_INTEGRITY
    }

    fn applies_to(&self, entitlement_type: EntitlementType) -> bool {
        entitlement_type != EntitlementType::Revoke
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let interfaces = collect_interfaces(ctx.applications, &ctx.remaining(), true);
        let missing: Vec<String> = interfaces
            .missing_interfaces()
            .iter()
            .map(|item| {
                format!(
                    "{} {} (required by {})",
                    item.interface_id, item.version, item.application_id
                )
            })
            .collect();

        if !missing.is_empty() {
            return Err(validation_error(format!(
                "Missing interfaces: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}
