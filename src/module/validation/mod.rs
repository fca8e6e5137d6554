//! Module validation framework
//!
//! Structural checks applied to descriptors at registration time.

pub mod manifest_validator;

pub use manifest_validator::{DescriptorValidator, ValidationResult};
