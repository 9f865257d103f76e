//! Application and module descriptors
//!
//! Descriptors are loaded once per request and treated as immutable.

use crate::error::{Error, Result};
use crate::version::{VersionRange, parse_version};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>.+?)-(?P<version>\d+\.\d+\.\d+.*)$").expect("valid id regex")
});

/// Split an identifier like `app-foo-1.2.0` into `("app-foo", "1.2.0")`
pub fn split_id(id: &str) -> Result<(String, String)> {
    let caps = ID_PATTERN
        .captures(id.trim())
        .ok_or_else(|| Error::InvalidId(id.to_string()))?;
    Ok((caps["name"].to_string(), caps["version"].to_string()))
}

/// Build an identifier from name and version
pub fn join_id(name: &str, version: &str) -> String {
    format!("{name}-{version}")
}

/// A dependency of one application on another
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dependency {
    /// Name of the required application
    pub name: String,
    /// Accepted version range (npm style)
    pub version: String,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Parse the version range
    pub fn range(&self) -> Result<VersionRange> {
        VersionRange::parse(&self.version)
    }
}

/// An interface reference: provided with a version, required with a version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceReference {
    /// Interface identifier (e.g. `users`)
    pub id: String,
    /// Interface version, or space separated versions when required
    pub version: String,
}

impl InterfaceReference {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }
}

/// A deployable module inside an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Module identifier, `{name}-{version}`
    pub id: String,
    #[serde(default)]
    pub provides: Vec<InterfaceReference>,
    #[serde(default)]
    pub requires: Vec<InterfaceReference>,
}

impl ModuleDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provides: Vec::new(),
            requires: Vec::new(),
        }
    }

    /// Add a provided interface
    pub fn provides(mut self, interface: &str, version: &str) -> Self {
        self.provides.push(InterfaceReference::new(interface, version));
        self
    }

    /// Add a required interface
    pub fn requires(mut self, interface: &str, version: &str) -> Self {
        self.requires.push(InterfaceReference::new(interface, version));
        self
    }

    /// Module name without version; falls back to the full id
    pub fn name(&self) -> String {
        split_id(&self.id).map_or_else(|_| self.id.clone(), |(name, _)| name)
    }

    /// Module version, if the id carries one
    pub fn version(&self) -> Option<String> {
        split_id(&self.id).ok().map(|(_, version)| version)
    }
}

/// A bundle of modules installed together for a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default, alias = "moduleDescriptors")]
    pub modules: Vec<ModuleDescriptor>,
    #[serde(default, alias = "uiModuleDescriptors")]
    pub ui_modules: Vec<ModuleDescriptor>,
}

impl ApplicationDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            dependencies: Vec::new(),
            modules: Vec::new(),
            ui_modules: Vec::new(),
        }
    }

    /// Build a descriptor from an `{name}-{version}` id
    pub fn from_id(id: &str) -> Result<Self> {
        let (name, version) = split_id(id)?;
        Ok(Self::new(name, version))
    }

    /// Add a dependency on another application
    pub fn depends_on(mut self, name: &str, range: &str) -> Self {
        self.dependencies.push(Dependency::new(name, range));
        self
    }

    /// Add a backend module
    pub fn with_module(mut self, module: ModuleDescriptor) -> Self {
        self.modules.push(module);
        self
    }

    /// Add a UI module
    pub fn with_ui_module(mut self, module: ModuleDescriptor) -> Self {
        self.ui_modules.push(module);
        self
    }

    /// Application identifier, `{name}-{version}`
    pub fn id(&self) -> String {
        join_id(&self.name, &self.version)
    }

    /// Parsed semantic version
    pub fn semver(&self) -> Result<semver::Version> {
        parse_version(&self.version)
    }

    /// All modules of the given kind
    pub fn modules_of(&self, kind: ModuleKind) -> &[ModuleDescriptor] {
        match kind {
            ModuleKind::Backend => &self.modules,
            ModuleKind::Ui => &self.ui_modules,
        }
    }

    /// Backend and UI modules together
    pub fn all_modules(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.iter().chain(self.ui_modules.iter())
    }
}

/// Which module list of an application to work on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Backend,
    Ui,
}

/// Kind of entitlement request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementType {
    Entitle,
    Revoke,
    Upgrade,
    State,
}

impl EntitlementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entitle => "ENTITLE",
            Self::Revoke => "REVOKE",
            Self::Upgrade => "UPGRADE",
            Self::State => "STATE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "ENTITLE" => Some(Self::Entitle),
            "REVOKE" => Some(Self::Revoke),
            "UPGRADE" => Some(Self::Upgrade),
            "STATE" => Some(Self::State),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntitlementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_id() {
        assert_eq!(
            split_id("app-foo-1.2.0").unwrap(),
            ("app-foo".to_string(), "1.2.0".to_string())
        );
        assert_eq!(
            split_id("mod-foo2-2.0.0-SNAPSHOT.7").unwrap(),
            ("mod-foo2".to_string(), "2.0.0-SNAPSHOT.7".to_string())
        );
        assert!(split_id("app-foo").is_err());
    }

    #[test]
    fn test_descriptor_json() {
        let json = r#"{
            "name": "app-foo",
            "version": "1.0.0",
            "dependencies": [{"name": "app-bar", "version": "^1.0.0"}],
            "moduleDescriptors": [
                {"id": "mod-foo-1.0.0", "provides": [{"id": "foo", "version": "1.0"}]}
            ],
            "uiModules": [{"id": "folio_foo-1.0.0", "requires": [{"id": "foo", "version": "1.0"}]}]
        }"#;

        let app: ApplicationDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(app.id(), "app-foo-1.0.0");
        assert_eq!(app.dependencies[0].name, "app-bar");
        assert_eq!(app.modules[0].name(), "mod-foo");
        assert_eq!(app.ui_modules[0].requires[0].id, "foo");
    }

    #[test]
    fn test_entitlement_type_parse() {
        assert_eq!(EntitlementType::parse("revoke"), Some(EntitlementType::Revoke));
        assert_eq!(EntitlementType::parse("bogus"), None);
    }
}
