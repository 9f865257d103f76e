//! Application descriptor registry
//!
//! Descriptors are JSON documents, one application per file, anywhere under
//! the registry directory.

use anyhow::{Context, Result};
use appgraph::ApplicationDescriptor;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Source of application descriptors
pub trait ApplicationRegistry: Send + Sync {
    /// Every known application
    fn all_applications(&self) -> Result<Vec<ApplicationDescriptor>>;

    /// Descriptors for the given ids, in request order
    ///
    /// Fails with a not-found error naming every unresolved id.
    fn get_application_descriptors(&self, ids: &[String]) -> Result<Vec<ApplicationDescriptor>> {
        let by_id: BTreeMap<String, ApplicationDescriptor> = self
            .all_applications()?
            .into_iter()
            .map(|app| (app.id(), app))
            .collect();

        let missing: Vec<&str> = ids
            .iter()
            .filter(|id| !by_id.contains_key(id.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(appgraph::Error::NotFound(format!(
                "Applications not found: {}",
                missing.join(", ")
            ))
            .into());
        }

        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }
}

/// Registry reading `*.json` descriptors from a directory tree
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    root: PathBuf,
}

impl DirectoryRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn load_file(path: &Path) -> Result<ApplicationDescriptor> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read descriptor {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid application descriptor {}", path.display()))
    }
}

impl ApplicationRegistry for DirectoryRegistry {
    fn all_applications(&self) -> Result<Vec<ApplicationDescriptor>> {
        if !self.root.exists() {
            log::warn!("Registry directory {} does not exist", self.root.display());
            return Ok(Vec::new());
        }

        let mut apps = Vec::new();
        for entry in WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }
            apps.push(Self::load_file(path)?);
        }

        log::debug!("Loaded {} descriptors from {}", apps.len(), self.root.display());
        Ok(apps)
    }
}

/// Fixed set of descriptors held in memory
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    apps: Vec<ApplicationDescriptor>,
}

#[cfg(test)]
impl MemoryRegistry {
    pub fn new(apps: Vec<ApplicationDescriptor>) -> Self {
        Self { apps }
    }
}

#[cfg(test)]
impl ApplicationRegistry for MemoryRegistry {
    fn all_applications(&self) -> Result<Vec<ApplicationDescriptor>> {
        Ok(self.apps.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appgraph::ModuleDescriptor;
    use tempfile::TempDir;

    const FOO: &str = r#"{
        "name": "app-foo",
        "version": "1.0.0",
        "dependencies": [{"name": "app-bar", "version": "^1.0.0"}],
        "moduleDescriptors": [
            {"id": "mod-foo-1.0.0", "requires": [{"id": "bar-api", "version": "1.0"}]}
        ]
    }"#;

    const BAR: &str = r#"{
        "name": "app-bar",
        "version": "1.2.0",
        "modules": [
            {"id": "mod-bar-1.2.0", "provides": [{"id": "bar-api", "version": "1.1"}]}
        ],
        "uiModules": [{"id": "folio_bar-1.2.0"}]
    }"#;

    fn registry() -> (TempDir, DirectoryRegistry) {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("app-foo.json"), FOO).unwrap();
        fs::write(tmp.path().join("nested").join("app-bar.json"), BAR).unwrap();
        fs::write(tmp.path().join("README.md"), "not a descriptor").unwrap();
        let registry = DirectoryRegistry::new(tmp.path());
        (tmp, registry)
    }

    #[test]
    fn test_loads_descriptors_recursively() {
        let (_tmp, registry) = registry();
        let mut ids: Vec<String> = registry
            .all_applications()
            .unwrap()
            .iter()
            .map(ApplicationDescriptor::id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["app-bar-1.2.0", "app-foo-1.0.0"]);
    }

    #[test]
    fn test_get_descriptors_in_request_order() {
        let (_tmp, registry) = registry();
        let apps = registry
            .get_application_descriptors(&["app-foo-1.0.0".into(), "app-bar-1.2.0".into()])
            .unwrap();
        assert_eq!(apps[0].name, "app-foo");
        assert_eq!(apps[0].modules[0].requires[0].id, "bar-api");
        assert_eq!(apps[1].ui_modules, vec![ModuleDescriptor::new("folio_bar-1.2.0")]);
    }

    #[test]
    fn test_unresolved_ids_are_not_found() {
        let (_tmp, registry) = registry();
        let err = registry
            .get_application_descriptors(&["app-foo-1.0.0".into(), "app-baz-2.0.0".into()])
            .unwrap_err();
        let graph_err = err.downcast_ref::<appgraph::Error>().unwrap();
        assert_eq!(graph_err.kind(), "NotFoundError");
        assert_eq!(err.to_string(), "Applications not found: app-baz-2.0.0");
    }

    #[test]
    fn test_invalid_descriptor_reports_path() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("broken.json"), "{").unwrap();
        let err = DirectoryRegistry::new(tmp.path()).all_applications().unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let registry = DirectoryRegistry::new("/nonexistent/registry");
        assert!(registry.all_applications().unwrap().is_empty());
    }
}
