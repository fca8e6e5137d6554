//! Module manifests and catalogs
//!
//! A catalog is the config-time list of modules a deployment ships with.
//! It replaces directory scanning: the deployment decides which modules
//! exist, the runtime only registers what it is given.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::module::registry::descriptor::ModuleDescriptor;

/// Module manifest (one `[[modules]]` entry of a catalog)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Module identifier
    pub name: String,
    /// Module version (semantic versioning)
    pub version: String,
    /// Human-readable description
    pub description: Option<String>,
    /// Modules that must be ready before this one starts
    #[serde(default)]
    pub requires: Vec<String>,
    /// Capability tags
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl ModuleManifest {
    /// Convert to a descriptor
    pub fn to_descriptor(&self) -> ModuleDescriptor {
        let descriptor = ModuleDescriptor::new(self.name.clone(), self.version.clone())
            .with_dependencies(self.requires.iter().cloned())
            .with_description(self.description.clone().unwrap_or_default());
        self.capabilities
            .iter()
            .fold(descriptor, |d, cap| d.with_capability(cap.clone()))
    }
}

impl From<&ModuleManifest> for ModuleDescriptor {
    fn from(manifest: &ModuleManifest) -> Self {
        manifest.to_descriptor()
    }
}

/// Catalog file (`modules.toml`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleCatalog {
    #[serde(default)]
    pub modules: Vec<ModuleManifest>,
}

impl ModuleCatalog {
    /// Parse a catalog from TOML text
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("Failed to parse module catalog TOML")
    }

    /// Load a catalog from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read module catalog {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// Descriptors in catalog order, optionally restricted to an allow-list
    ///
    /// An empty allow-list keeps every module.
    pub fn descriptors(&self, enabled: &[String]) -> Vec<ModuleDescriptor> {
        self.modules
            .iter()
            .filter(|m| enabled.is_empty() || enabled.contains(&m.name))
            .map(ModuleManifest::to_descriptor)
            .collect()
    }
}
