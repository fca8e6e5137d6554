//! Validate a module catalog
//!
//! Loads a catalog TOML file, validates every descriptor, checks that all
//! dependencies resolve and prints the initialization order.
//!
//! Usage:
//!   validate-catalog modules.toml
//!   validate-catalog modules.toml --config runtime.toml --json

use anyhow::{Context, Result};
use clap::Parser;
use platform_core::config::RuntimeConfig;
use platform_core::module::validation::{DescriptorValidator, ValidationResult};
use platform_core::module::{ModuleCatalog, ModuleDependencies};
use platform_core::utils::init_logging_from_config;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "validate-catalog")]
#[command(about = "Validate a module catalog and print its initialization order")]
struct Args {
    /// Catalog file (TOML, one [[modules]] entry per module)
    catalog: PathBuf,

    /// Runtime configuration; its enabled_modules list filters the catalog
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_toml_file(path)?,
        None => RuntimeConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;
    init_logging_from_config(&config.logging);

    let catalog = ModuleCatalog::from_file(&args.catalog)
        .with_context(|| format!("Cannot load catalog {}", args.catalog.display()))?;
    let descriptors = catalog.descriptors(&config.modules.enabled_modules);

    let validator = DescriptorValidator::new();
    let mut errors: Vec<String> = Vec::new();
    for descriptor in &descriptors {
        if let ValidationResult::Invalid(problems) = validator.validate(descriptor) {
            errors.extend(problems.into_iter().map(|p| format!("{}: {}", descriptor.id(), p)));
        }
    }

    let order = if errors.is_empty() {
        match ModuleDependencies::resolve(&descriptors) {
            Ok(resolution) => resolution.load_order,
            Err(e) => {
                errors.push(e.to_string());
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    if args.json {
        let report = json!({
            "catalog": args.catalog.display().to_string(),
            "modules": descriptors.len(),
            "valid": errors.is_empty(),
            "errors": errors,
            "initialization_order": order,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if errors.is_empty() {
        println!("✓ {} module(s) valid", descriptors.len());
        for (i, id) in order.iter().enumerate() {
            println!("  {}. {}", i + 1, id);
        }
    } else {
        eprintln!("✗ Catalog {} is invalid:", args.catalog.display());
        for error in &errors {
            eprintln!("  - {}", error);
        }
    }

    Ok(if errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
