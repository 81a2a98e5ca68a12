//! Provider configuration.
//!
//! The host framework hands configuration over as a `serde_json::Value`. Every
//! field has a default, so an empty object is a valid configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::error::ProviderError;
use crate::validation::Diagnostic;

/// Settings that shape how the lifecycle adapter behaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Account locator. Informational; used in log fields.
    pub account: Option<String>,
    /// Re-read and re-plan after every apply, warning when the plan is not empty.
    pub verify_convergence: bool,
    /// Log readings whose scope is outside a parameter's hierarchy.
    pub report_scope_anomalies: bool,
    /// Log filter used when `RUST_LOG` is not set.
    pub default_log_level: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            account: None,
            verify_convergence: true,
            report_scope_anomalies: true,
            default_log_level: "info".to_string(),
        }
    }
}

impl ProviderConfig {
    /// Parse configuration, treating `null` as all defaults.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_value(value)?;
        let errors: Vec<String> = config
            .validate()
            .into_iter()
            .filter(Diagnostic::is_error)
            .map(|d| match d.detail {
                Some(detail) => format!("{}: {}", d.summary, detail),
                None => d.summary,
            })
            .collect();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ProviderError::Configuration(errors.join("; ")))
        }
    }

    /// Check field values.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if let Some(account) = &self.account {
            if account.trim().is_empty() {
                diagnostics.push(
                    Diagnostic::warning("Empty account locator")
                        .with_detail("Remove the attribute or set a locator")
                        .with_attribute("account"),
                );
            }
        }
        if let Err(err) = EnvFilter::try_new(&self.default_log_level) {
            diagnostics.push(
                Diagnostic::error("Invalid log filter")
                    .with_detail(err.to_string())
                    .with_attribute("default_log_level"),
            );
        }
        diagnostics
    }
}
