//! Descriptor validation
//!
//! Validates module descriptors for structure before they are registered.

use tracing::{debug, warn};

use crate::module::registry::descriptor::ModuleDescriptor;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Descriptor is valid
    Valid,
    /// Descriptor is invalid with specific errors
    Invalid(Vec<String>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// Descriptor validator
pub struct DescriptorValidator {
    /// Maximum identifier length
    max_name_len: usize,
    /// Maximum number of declared dependencies
    max_dependencies: usize,
}

impl DescriptorValidator {
    /// Create a new descriptor validator
    pub fn new() -> Self {
        Self {
            max_name_len: 64,
            max_dependencies: 64,
        }
    }

    /// Validate a module descriptor
    pub fn validate(&self, descriptor: &ModuleDescriptor) -> ValidationResult {
        let mut errors = Vec::new();

        if !self.is_valid_name(descriptor.id()) {
            errors.push(format!(
                "Invalid module identifier: {:?} (must be alphanumeric with dashes/underscores)",
                descriptor.id()
            ));
        }

        if descriptor.version().is_empty() {
            errors.push("Module version cannot be empty".to_string());
        } else if !self.is_valid_version(descriptor.version()) {
            errors.push(format!(
                "Invalid version format: {} (expected semantic versioning)",
                descriptor.version()
            ));
        }

        if let Err(dep_errors) = self.validate_dependencies(descriptor) {
            errors.extend(dep_errors);
        }

        for cap in descriptor.capabilities() {
            if cap.trim().is_empty() || cap.chars().any(char::is_whitespace) {
                errors.push(format!("Invalid capability tag: {:?}", cap));
            }
        }

        if errors.is_empty() {
            debug!("Descriptor validation passed for module: {}", descriptor.id());
            ValidationResult::Valid
        } else {
            warn!(
                "Descriptor validation failed for module {}: {:?}",
                descriptor.id(),
                errors
            );
            ValidationResult::Invalid(errors)
        }
    }

    /// Validate module identifier format
    #[inline]
    fn is_valid_name(&self, name: &str) -> bool {
        if name.is_empty() || name.len() > self.max_name_len {
            return false;
        }

        // Must start with alphanumeric
        if !name.chars().next().map_or(false, |c| c.is_ascii_alphanumeric()) {
            return false;
        }

        name.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    /// Validate version format (semantic versioning)
    ///
    /// Accepts: major.minor[.patch][-prerelease][+build]
    #[inline]
    fn is_valid_version(&self, version: &str) -> bool {
        let base = version.split('+').next().unwrap_or_default();
        let version_part = base.split('-').next().unwrap_or_default();

        let nums: Vec<&str> = version_part.split('.').collect();
        if nums.len() < 2 || nums.len() > 3 {
            return false;
        }

        nums.iter().all(|n| {
            !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) && n.parse::<u32>().is_ok()
        })
    }

    fn validate_dependencies(&self, descriptor: &ModuleDescriptor) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if descriptor.dependencies().len() > self.max_dependencies {
            errors.push(format!(
                "Too many dependencies: {} (max {})",
                descriptor.dependencies().len(),
                self.max_dependencies
            ));
        }

        for dep in descriptor.dependencies() {
            if !self.is_valid_name(dep) {
                errors.push(format!("Invalid dependency identifier: {:?}", dep));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for DescriptorValidator {
    fn default() -> Self {
        Self::new()
    }
}
