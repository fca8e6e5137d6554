//! Module registry data
//!
//! Descriptors, manifest catalogs, and dependency resolution.

pub mod dependencies;
pub mod descriptor;
pub mod manifest;

pub use dependencies::{DependencyResolution, ModuleDependencies};
pub use descriptor::ModuleDescriptor;
pub use manifest::{ModuleCatalog, ModuleManifest};
