//! Desired-state planning against the tenant's stored entitlements

use anyhow::{Context, Result};
use appgraph::ApplicationStateTransitionPlan;
use store::Store;

/// Diff the tenant's entitlements against the desired application ids
pub fn plan_desired_state(
    store: &Store,
    tenant_id: &str,
    desired_ids: &[String],
) -> Result<ApplicationStateTransitionPlan> {
    let entitled = store
        .entitled_application_ids(tenant_id)
        .with_context(|| format!("Could not read entitlements of {tenant_id}"))?;

    let plan = ApplicationStateTransitionPlan::from_ids(&entitled, desired_ids)?;
    log::info!(
        "Plan for {tenant_id}: {} to entitle, {} to upgrade, {} to revoke",
        plan.entitle.len(),
        plan.upgrade.len(),
        plan.revoke.len()
    );
    Ok(plan)
}
