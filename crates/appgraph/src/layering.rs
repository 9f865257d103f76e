//! Installation layering for a set of applications
//!
//! Applications are peeled off in rounds: every round takes the applications
//! whose in-set dependencies were all placed in earlier rounds. Applications
//! in one layer are independent of each other and may be installed in
//! parallel; layers must run in order.

use crate::descriptor::ApplicationDescriptor;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Dependency graph restricted to one set of applications
#[derive(Debug, Clone)]
pub struct InstallationGraph {
    /// application id -> ids of in-set applications it depends on
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl InstallationGraph {
    /// Build the graph
    ///
    /// Dependencies are matched against set members by application name;
    /// dependencies on applications outside the set are ignored.
    pub fn new(apps: &[ApplicationDescriptor]) -> Self {
        let mut ids_by_name: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for app in apps {
            ids_by_name.entry(app.name.as_str()).or_default().push(app.id());
        }

        let edges = apps
            .iter()
            .map(|app| {
                let id = app.id();
                let deps: BTreeSet<String> = app
                    .dependencies
                    .iter()
                    .filter_map(|d| ids_by_name.get(d.name.as_str()))
                    .flatten()
                    .filter(|dep_id| **dep_id != id)
                    .cloned()
                    .collect();
                (id, deps)
            })
            .collect();

        Self { edges }
    }

    /// Number of applications in the graph
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Layers of application ids in installation order
    ///
    /// Ids within a layer are sorted lexicographically.
    pub fn installation_sequence(&self) -> Result<Vec<Vec<String>>> {
        let mut remaining: BTreeMap<&String, &BTreeSet<String>> = self.edges.iter().collect();
        let mut placed: BTreeSet<&str> = BTreeSet::new();
        let mut layers = Vec::new();

        while !remaining.is_empty() {
            let layer: Vec<String> = remaining
                .iter()
                .filter(|(_, deps)| deps.iter().all(|d| placed.contains(d.as_str())))
                .map(|(id, _)| (*id).clone())
                .collect();

            if layer.is_empty() {
                let stuck: Vec<&str> = remaining.keys().map(|id| id.as_str()).collect();
                log::debug!("Unplaceable applications: {}", stuck.join(", "));
                return Err(Error::validation(
                    "No more independent applications can be found",
                ));
            }

            for id in &layer {
                remaining.remove(id);
            }
            for id in &layer {
                if let Some((key, _)) = self.edges.get_key_value(id) {
                    placed.insert(key.as_str());
                }
            }
            layers.push(layer);
        }

        Ok(layers)
    }

    /// Layers in removal order: dependents before their dependencies
    pub fn reversed_installation_sequence(&self) -> Result<Vec<Vec<String>>> {
        let mut layers = self.installation_sequence()?;
        layers.reverse();
        Ok(layers)
    }
}
