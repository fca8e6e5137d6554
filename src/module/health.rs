//! Module health reports
//!
//! Produced by [`ModuleRegistry::health`](crate::module::ModuleRegistry::health).

use serde::{Deserialize, Serialize};

use crate::module::traits::{HealthStatus, ModuleState};

/// Health of a single module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleHealthReport {
    /// Module identifier
    pub module_id: String,
    /// Lifecycle phase after this check was applied
    pub phase: ModuleState,
    /// Health status
    pub status: HealthStatus,
    /// Optional message describing the status
    pub message: Option<String>,
    /// Consecutive failed checks, including event delivery failures
    pub consecutive_failures: u32,
    /// Response time in milliseconds (absent when the module was not probed)
    pub response_time_ms: Option<f64>,
}

/// Registry-wide health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Worst status across all modules
    pub overall_status: HealthStatus,
    /// Per-module health, in registration order
    pub modules: Vec<ModuleHealthReport>,
    /// Timestamp of report generation
    pub timestamp: u64,
}

impl HealthReport {
    /// Build a report, deriving the overall status from its modules
    pub fn new(modules: Vec<ModuleHealthReport>, timestamp: u64) -> Self {
        let overall_status = overall_status(modules.iter().map(|m| m.status));
        Self {
            overall_status,
            modules,
            timestamp,
        }
    }

    /// Look up one module's report
    pub fn module(&self, module_id: &str) -> Option<&ModuleHealthReport> {
        self.modules.iter().find(|m| m.module_id == module_id)
    }

    pub fn is_healthy(&self) -> bool {
        self.overall_status == HealthStatus::Healthy
    }
}

/// Worst of a set of statuses; `Healthy` when empty
pub fn overall_status(statuses: impl IntoIterator<Item = HealthStatus>) -> HealthStatus {
    statuses
        .into_iter()
        .max_by_key(|s| s.severity())
        .unwrap_or(HealthStatus::Healthy)
}
