//! Entitlement request model

use anyhow::{Result, bail};
use appgraph::EntitlementType;
use flowkit::ExecutionStrategy;
use serde::Serialize;

/// A request to change which applications a tenant has
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitlementRequest {
    pub tenant_id: String,
    pub entitlement_type: EntitlementType,
    /// `{name}-{version}` ids; for STATE the complete desired set
    pub application_ids: Vec<String>,
    /// Keep going after a failed application instead of rolling back
    pub ignore_errors: bool,
    /// Remove module data on revoke
    pub purge: bool,
    /// Return the flow id without waiting for completion
    pub run_async: bool,
}

impl EntitlementRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        entitlement_type: EntitlementType,
        application_ids: Vec<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            entitlement_type,
            application_ids,
            ignore_errors: false,
            purge: false,
            run_async: false,
        }
    }

    pub fn ignore_errors(mut self, ignore_errors: bool) -> Self {
        self.ignore_errors = ignore_errors;
        self
    }

    pub fn purge(mut self, purge: bool) -> Self {
        self.purge = purge;
        self
    }

    pub fn run_async(mut self, run_async: bool) -> Self {
        self.run_async = run_async;
        self
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        if self.ignore_errors {
            ExecutionStrategy::IgnoreOnError
        } else {
            ExecutionStrategy::CancelOnError
        }
    }

    /// Reject requests that cannot be planned at all
    ///
    /// STATE requests may carry an empty desired set, meaning revoke all.
    pub fn check(&self) -> Result<()> {
        if self.tenant_id.trim().is_empty() {
            bail!(appgraph::Error::validation("Tenant id must not be empty"));
        }
        if self.application_ids.is_empty() && self.entitlement_type != EntitlementType::State {
            bail!(appgraph::Error::validation(
                "At least one application id is required"
            ));
        }
        for id in &self.application_ids {
            appgraph::split_id(id)?;
        }
        Ok(())
    }

    /// Ids with later duplicates removed, in request order
    pub fn unique_ids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.application_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(ids: &[&str]) -> EntitlementRequest {
        EntitlementRequest::new(
            "diku",
            EntitlementType::Entitle,
            ids.iter().map(ToString::to_string).collect(),
        )
    }

    #[test]
    fn test_strategy_follows_ignore_errors() {
        assert_eq!(request(&["app-a-1.0.0"]).strategy(), ExecutionStrategy::CancelOnError);
        assert_eq!(
            request(&["app-a-1.0.0"]).ignore_errors(true).strategy(),
            ExecutionStrategy::IgnoreOnError
        );
    }

    #[test]
    fn test_check_rejects_malformed_requests() {
        assert!(request(&["app-a-1.0.0"]).check().is_ok());
        assert!(request(&[]).check().is_err());
        assert!(request(&["not-a-version"]).check().is_err());

        let mut blank_tenant = request(&["app-a-1.0.0"]);
        blank_tenant.tenant_id = " ".into();
        let err = blank_tenant.check().unwrap_err();
        assert!(err.downcast_ref::<appgraph::Error>().unwrap().is_validation());

        let state = EntitlementRequest::new("diku", EntitlementType::State, Vec::new());
        assert!(state.check().is_ok());
    }

    #[test]
    fn test_unique_ids_keep_first_occurrence() {
        let req = request(&["app-b-1.0.0", "app-a-1.0.0", "app-b-1.0.0"]);
        assert_eq!(req.unique_ids(), vec!["app-b-1.0.0", "app-a-1.0.0"]);
    }
}
