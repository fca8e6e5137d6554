//! Module descriptors
//!
//! Static identity, dependencies and capabilities of one module.

use serde::Serialize;
use std::collections::BTreeSet;

/// Static identity, dependency and capability record for a module
///
/// Immutable once built; the registry stores it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDescriptor {
    id: String,
    version: String,
    description: String,
    /// Ordered, duplicate-free
    dependencies: Vec<String>,
    capabilities: BTreeSet<String>,
}

impl ModuleDescriptor {
    /// Create a descriptor with no dependencies or capabilities
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            description: String::new(),
            dependencies: Vec::new(),
            capabilities: BTreeSet::new(),
        }
    }

    /// Add a required dependency (ignored if already declared)
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// Add several required dependencies, preserving order
    pub fn with_dependencies<I, S>(self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        dependencies
            .into_iter()
            .fold(self, |descriptor, dep| descriptor.depends_on(dep))
    }

    /// Declare a capability tag
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}
