//! Transitive application dependency resolution
//!
//! The resolver owns a snapshot of the application universe and answers
//! "which applications does this one need, directly or indirectly". Every
//! call walks the graph from scratch, so results never depend on which
//! targets were resolved before.

use crate::descriptor::{ApplicationDescriptor, Dependency};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashSet};

/// Resolves dependency closures over a fixed set of applications
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    /// Applications grouped by name, highest version first
    by_name: BTreeMap<String, Vec<(semver::Version, ApplicationDescriptor)>>,
}

impl DependencyResolver {
    /// Create a resolver over the given universe
    pub fn new(universe: &[ApplicationDescriptor]) -> Result<Self> {
        if universe.is_empty() {
            return Err(Error::validation("No applications provided"));
        }

        let mut by_name: BTreeMap<String, Vec<(semver::Version, ApplicationDescriptor)>> =
            BTreeMap::new();
        for app in universe {
            let version = app.semver()?;
            by_name
                .entry(app.name.clone())
                .or_default()
                .push((version, app.clone()));
        }
        for versions in by_name.values_mut() {
            versions.sort_by(|a, b| b.0.cmp(&a.0));
            versions.dedup_by(|a, b| a.0 == b.0);
        }

        Ok(Self { by_name })
    }

    /// All applications reachable from `target` through dependency edges
    ///
    /// The result is sorted by application id and never contains `target`
    /// itself. Dependencies without a matching universe member are skipped.
    pub fn get_all_dependencies(
        &self,
        target: &ApplicationDescriptor,
    ) -> Result<Vec<ApplicationDescriptor>> {
        let mut path = vec![target.name.clone()];
        let mut on_path: HashSet<String> = HashSet::from([target.name.clone()]);
        let mut found: BTreeMap<String, ApplicationDescriptor> = BTreeMap::new();

        self.visit(target, &mut path, &mut on_path, &mut found)?;

        Ok(found.into_values().collect())
    }

    /// Find the best universe member satisfying a dependency
    pub fn find_match(&self, dependency: &Dependency) -> Result<Option<&ApplicationDescriptor>> {
        let Some(candidates) = self.by_name.get(&dependency.name) else {
            return Ok(None);
        };
        let range = dependency.range()?;

        Ok(candidates
            .iter()
            .find(|(version, _)| range.matches(version))
            .map(|(_, app)| app))
    }

    fn visit(
        &self,
        app: &ApplicationDescriptor,
        path: &mut Vec<String>,
        on_path: &mut HashSet<String>,
        found: &mut BTreeMap<String, ApplicationDescriptor>,
    ) -> Result<()> {
        for dependency in &app.dependencies {
            let Some(candidate) = self.find_match(dependency)? else {
                log::debug!(
                    "Dependency {}@{} of {} not in universe",
                    dependency.name,
                    dependency.version,
                    app.id()
                );
                continue;
            };

            if on_path.contains(&candidate.name) {
                return Err(cycle_error(path, &candidate.name));
            }

            let id = candidate.id();
            if found.contains_key(&id) {
                continue;
            }

            path.push(candidate.name.clone());
            on_path.insert(candidate.name.clone());
            self.visit(candidate, path, on_path, found)?;
            on_path.remove(&candidate.name);
            path.pop();

            found.insert(id, candidate.clone());
        }

        Ok(())
    }
}

/// Build the cycle error for a revisit of `repeated` while on `path`
///
/// The chain starts and ends at the repeated application and lists
/// dependents right to left: `a <- c <- b <- a` for `a -> b -> c -> a`.
fn cycle_error(path: &[String], repeated: &str) -> Error {
    let start = path.iter().position(|n| n == repeated).unwrap_or(0);
    let mut chain: Vec<&str> = path[start..].iter().map(String::as_str).collect();
    chain.push(repeated);
    chain.reverse();

    Error::validation(format!(
        "Circular application dependency detected. Chain is: {}",
        chain.join(" <- ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str, version: &str, deps: &[(&str, &str)]) -> ApplicationDescriptor {
        deps.iter().fold(ApplicationDescriptor::new(name, version), |a, (n, r)| {
            a.depends_on(n, r)
        })
    }

    fn ids(apps: &[ApplicationDescriptor]) -> Vec<String> {
        apps.iter().map(ApplicationDescriptor::id).collect()
    }

    fn universe() -> Vec<ApplicationDescriptor> {
        vec![
            app("app-a", "1.0.0", &[("app-b", "^1.0.0"), ("app-c", "^1.0.0")]),
            app("app-b", "1.0.0", &[("app-d", "^1.0.0")]),
            app("app-c", "1.0.0", &[("app-d", "^1.0.0")]),
            app("app-d", "1.0.0", &[]),
            app("app-d", "1.2.0", &[]),
            app("app-e", "1.0.0", &[("app-a", "^1.0.0")]),
            app("app-f", "1.0.0", &[("app-missing", "^1.0.0")]),
        ]
    }

    #[test]
    fn test_empty_universe() {
        let err = DependencyResolver::new(&[]).unwrap_err();
        assert_eq!(err.to_string(), "No applications provided");
    }

    #[test]
    fn test_transitive_closure() {
        let apps = universe();
        let resolver = DependencyResolver::new(&apps).unwrap();

        let deps = resolver.get_all_dependencies(&apps[5]).unwrap();
        assert_eq!(
            ids(&deps),
            vec!["app-a-1.0.0", "app-b-1.0.0", "app-c-1.0.0", "app-d-1.2.0"]
        );
    }

    #[test]
    fn test_highest_matching_version_selected() {
        let apps = universe();
        let resolver = DependencyResolver::new(&apps).unwrap();

        let pinned = Dependency::new("app-d", ">=1.0.0 <1.1.0");
        let found = resolver.find_match(&pinned).unwrap().unwrap();
        assert_eq!(found.id(), "app-d-1.0.0");
    }

    #[test]
    fn test_unknown_dependency_ignored() {
        let apps = universe();
        let resolver = DependencyResolver::new(&apps).unwrap();

        assert!(resolver.get_all_dependencies(&apps[6]).unwrap().is_empty());
    }

    #[test]
    fn test_results_independent_of_call_order() {
        let apps = universe();
        let resolver = DependencyResolver::new(&apps).unwrap();

        let expected: Vec<Vec<String>> = apps
            .iter()
            .map(|a| ids(&resolver.get_all_dependencies(a).unwrap()))
            .collect();

        // Walk the targets in several permuted orders on the same instance
        for rotation in 0..apps.len() {
            let mut order: Vec<usize> = (0..apps.len()).collect();
            order.rotate_left(rotation);
            if rotation % 2 == 1 {
                order.reverse();
            }
            for i in order {
                let deps = ids(&resolver.get_all_dependencies(&apps[i]).unwrap());
                assert_eq!(deps, expected[i], "closure for {} changed", apps[i].id());
            }
        }
    }

    #[test]
    fn test_cycle_names_chain() {
        let apps = vec![
            app("app-foo", "1.0.0", &[("app-baz", "^1.0.0")]),
            app("app-baz", "1.0.0", &[("app-qux", "^1.0.0")]),
            app("app-qux", "1.0.0", &[("app-quux", "^1.0.0")]),
            app("app-quux", "1.0.0", &[("app-foo", "^1.0.0")]),
        ];
        let resolver = DependencyResolver::new(&apps).unwrap();

        let err = resolver.get_all_dependencies(&apps[0]).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Circular application dependency detected. Chain is: \
             app-foo <- app-quux <- app-qux <- app-baz <- app-foo"
        );
    }

    #[test]
    fn test_cycle_not_through_target() {
        let apps = vec![
            app("app-root", "1.0.0", &[("app-x", "^1.0.0")]),
            app("app-x", "1.0.0", &[("app-y", "^1.0.0")]),
            app("app-y", "1.0.0", &[("app-x", "^1.0.0")]),
        ];
        let resolver = DependencyResolver::new(&apps).unwrap();

        let err = resolver.get_all_dependencies(&apps[0]).unwrap_err();
        assert!(err.to_string().ends_with("app-x <- app-y <- app-x"));
    }
}
