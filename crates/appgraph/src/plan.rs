//! Desired-state transition planning
//!
//! Diffs the tenant's entitled applications against a desired set and
//! produces the minimal entitle / upgrade / revoke buckets.

use crate::descriptor::{join_id, split_id};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Application names grouped by the action needed to reach a desired state
///
/// The three buckets are disjoint. Applications already at the desired
/// version appear in none of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplicationStateTransitionPlan {
    pub entitle: BTreeSet<String>,
    pub upgrade: BTreeSet<String>,
    pub revoke: BTreeSet<String>,
    /// name -> version currently entitled
    entitled: BTreeMap<String, String>,
    /// name -> version desired
    desired: BTreeMap<String, String>,
}

impl ApplicationStateTransitionPlan {
    /// Compute the plan from entitled and desired application ids
    pub fn from_ids(entitled: &[String], desired: &[String]) -> Result<Self> {
        let entitled = versions_by_name(entitled, "Entitled")?;
        let desired = versions_by_name(desired, "Desired")?;
        Ok(Self::from_versions(entitled, desired))
    }

    /// Compute the plan from `name -> version` maps
    pub fn from_versions(
        entitled: BTreeMap<String, String>,
        desired: BTreeMap<String, String>,
    ) -> Self {
        let mut plan = Self::default();

        for (name, version) in &desired {
            match entitled.get(name) {
                None => {
                    plan.entitle.insert(name.clone());
                }
                Some(current) if current != version => {
                    plan.upgrade.insert(name.clone());
                }
                Some(_) => {}
            }
        }

        plan.revoke = entitled
            .keys()
            .filter(|name| !desired.contains_key(*name))
            .cloned()
            .collect();

        plan.entitled = entitled;
        plan.desired = desired;
        plan
    }

    /// Nothing to do
    pub fn is_empty(&self) -> bool {
        self.entitle.is_empty() && self.upgrade.is_empty() && self.revoke.is_empty()
    }

    /// Number of applications touched by the plan
    pub fn len(&self) -> usize {
        self.entitle.len() + self.upgrade.len() + self.revoke.len()
    }

    /// Desired ids of applications to entitle
    pub fn entitle_ids(&self) -> Vec<String> {
        self.ids(&self.entitle, &self.desired)
    }

    /// Desired ids of applications to upgrade
    pub fn upgrade_ids(&self) -> Vec<String> {
        self.ids(&self.upgrade, &self.desired)
    }

    /// Currently entitled ids of applications to revoke
    pub fn revoke_ids(&self) -> Vec<String> {
        self.ids(&self.revoke, &self.entitled)
    }

    /// `(desired id, entitled id)` for every upgrade
    pub fn upgrade_pairs(&self) -> Vec<(String, String)> {
        self.upgrade
            .iter()
            .filter_map(|name| {
                let to = self.desired.get(name)?;
                let from = self.entitled.get(name)?;
                Some((join_id(name, to), join_id(name, from)))
            })
            .collect()
    }

    fn ids(&self, names: &BTreeSet<String>, versions: &BTreeMap<String, String>) -> Vec<String> {
        names
            .iter()
            .filter_map(|name| versions.get(name).map(|v| join_id(name, v)))
            .collect()
    }
}

fn versions_by_name(ids: &[String], label: &str) -> Result<BTreeMap<String, String>> {
    let mut versions = BTreeMap::new();
    for id in ids {
        let (name, version) = split_id(id)?;
        if let Some(existing) = versions.insert(name.clone(), version.clone())
            && existing != version
        {
            return Err(Error::validation(format!(
                "{label} state contains several versions of {name}: {existing}, {version}"
            )));
        }
    }
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_entitle_and_upgrade() {
        let plan = ApplicationStateTransitionPlan::from_ids(
            &ids(&["app-a-1.0.0", "app-b-1.0.0"]),
            &ids(&["app-a-1.0.0", "app-b-2.0.0", "app-c-1.0.0"]),
        )
        .unwrap();

        assert_eq!(plan.entitle, set(&["app-c"]));
        assert_eq!(plan.upgrade, set(&["app-b"]));
        assert!(plan.revoke.is_empty());
        assert_eq!(plan.entitle_ids(), ids(&["app-c-1.0.0"]));
        assert_eq!(
            plan.upgrade_pairs(),
            vec![("app-b-2.0.0".to_string(), "app-b-1.0.0".to_string())]
        );
    }

    #[test]
    fn test_empty_desired_revokes_everything() {
        let plan = ApplicationStateTransitionPlan::from_ids(
            &ids(&["app-a-1.0.0", "app-b-1.0.0"]),
            &[],
        )
        .unwrap();

        assert_eq!(plan.revoke, set(&["app-a", "app-b"]));
        assert!(plan.entitle.is_empty());
        assert!(plan.upgrade.is_empty());
        assert_eq!(plan.revoke_ids(), ids(&["app-a-1.0.0", "app-b-1.0.0"]));
    }

    #[test]
    fn test_same_state_is_noop() {
        let current = ids(&["app-a-1.0.0"]);
        let plan = ApplicationStateTransitionPlan::from_ids(&current, &current).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_buckets_disjoint() {
        let plan = ApplicationStateTransitionPlan::from_ids(
            &ids(&["app-a-1.0.0", "app-b-1.0.0", "app-d-1.0.0"]),
            &ids(&["app-b-1.1.0", "app-c-1.0.0", "app-d-1.0.0"]),
        )
        .unwrap();

        assert!(plan.entitle.is_disjoint(&plan.upgrade));
        assert!(plan.entitle.is_disjoint(&plan.revoke));
        assert!(plan.upgrade.is_disjoint(&plan.revoke));
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_conflicting_desired_versions() {
        let err = ApplicationStateTransitionPlan::from_ids(
            &[],
            &ids(&["app-a-1.0.0", "app-a-2.0.0"]),
        )
        .unwrap_err();
        assert!(err.is_validation());
    }
}
