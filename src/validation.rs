//! Configuration validation helpers.
//!
//! This module checks a resource configuration (`serde_json::Value`) against an
//! [`ObjectKind`] before any planning happens, and reports every problem at
//! once as [`Diagnostic`]s instead of stopping at the first one.
//!
//! # Example
//!
//! ```
//! use dataplat_params::kinds::ObjectKind;
//! use dataplat_params::validation::validate;
//! use serde_json::json;
//!
//! let warehouse = ObjectKind::warehouse();
//!
//! let diagnostics = validate(&warehouse, &json!({"name": "WH", "auto_suspend": 0}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&warehouse, &json!({"name": "WH", "auto_suspend": "soon"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("auto_suspend".to_string()));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::kinds::{ObjectKind, Placement};
use crate::value::{json_type_name, TriState};

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation but should be addressed.
    Warning,
}

/// A diagnostic message about a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }

    /// Convert an error into a diagnostic, keeping the parameter as attribute.
    pub fn from_error(err: &ProviderError) -> Self {
        match err {
            ProviderError::Validation {
                parameter,
                literal,
                reason,
                ..
            } => Diagnostic::error(format!("Invalid value for parameter '{}'", parameter))
                .with_detail(format!("{} (got {})", reason, literal))
                .with_attribute(parameter.clone()),
            other => Diagnostic::error(other.to_string()),
        }
    }
}

/// Validate a resource configuration for an object kind.
///
/// Returns a list of diagnostics. An empty list means the configuration is valid.
///
/// # Validation Rules
///
/// - Identity attributes required by the kind's placement must be non-empty strings
/// - Every declared parameter must parse as a tri-state slot of its type
/// - Undeclared keys produce a warning, since they are never managed
pub fn validate(kind: &ObjectKind, config: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let obj = match config {
        Value::Object(map) => map,
        other => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", json_type_name(other))),
            );
            return diagnostics;
        },
    };

    for key in identity_keys(kind.placement) {
        validate_identity_attribute(obj.get(*key), key, &mut diagnostics);
    }

    for descriptor in kind.parameters.iter() {
        if let Err(err) = TriState::parse(descriptor, obj.get(&descriptor.name)) {
            diagnostics.push(Diagnostic::from_error(&err));
        }
    }

    for key in obj.keys() {
        if !kind.parameters.contains(key) && !identity_keys(kind.placement).contains(&key.as_str()) {
            diagnostics.push(
                Diagnostic::warning(format!("Unknown parameter '{}'", key))
                    .with_detail(format!("'{}' is not a {} parameter and is ignored", key, kind.name))
                    .with_attribute(key.clone()),
            );
        }
    }

    diagnostics
}

/// Validate a configuration, returning Ok if there are no errors or Err with
/// all diagnostics. Warnings alone do not fail validation.
pub fn validate_result(kind: &ObjectKind, config: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(kind, config);
    if diagnostics.iter().any(Diagnostic::is_error) {
        Err(diagnostics)
    } else {
        Ok(())
    }
}

/// Check if a configuration is valid for an object kind.
pub fn is_valid(kind: &ObjectKind, config: &Value) -> bool {
    validate_result(kind, config).is_ok()
}

fn identity_keys(placement: Placement) -> &'static [&'static str] {
    match placement {
        Placement::Account => &["name"],
        Placement::Database => &["name", "database"],
        Placement::Schema => &["name", "database", "schema"],
    }
}

fn validate_identity_attribute(value: Option<&Value>, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    match value {
        None | Some(Value::Null) => {
            diagnostics.push(
                Diagnostic::error(format!("Missing required attribute '{}'", path))
                    .with_detail("This attribute is required and must be provided")
                    .with_attribute(path),
            );
        },
        Some(Value::String(s)) if s.trim().is_empty() => {
            diagnostics.push(
                Diagnostic::error(format!("Empty attribute '{}'", path))
                    .with_detail("Object names cannot be empty")
                    .with_attribute(path),
            );
        },
        Some(Value::String(_)) => {},
        Some(v) => {
            diagnostics.push(
                Diagnostic::error(format!("Invalid type for attribute '{}'", path))
                    .with_detail(format!("Expected string, got {}", json_type_name(v)))
                    .with_attribute(path),
            );
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_valid_warehouse() {
        let diagnostics = validate(
            &ObjectKind::warehouse(),
            &json!({
                "name": "WH",
                "warehouse_size": "small",
                "auto_suspend": 0,
                "auto_resume": "default",
                "max_concurrency_level": null,
                "comment": ""
            }),
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_validate_collects_every_error() {
        let diagnostics = validate(
            &ObjectKind::warehouse(),
            &json!({
                "name": "WH",
                "auto_suspend": "soon",
                "max_cluster_count": 42,
                "warehouse_size": "GIGANTIC"
            }),
        );
        assert_eq!(diagnostics.len(), 3);
        assert!(diagnostics.iter().all(Diagnostic::is_error));
        let attributes: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.clone())
            .collect();
        assert!(attributes.contains(&"auto_suspend".to_string()));
        assert!(attributes.contains(&"max_cluster_count".to_string()));
        assert!(attributes.contains(&"warehouse_size".to_string()));
    }

    #[test]
    fn test_validate_identity_attributes() {
        let diagnostics = validate(&ObjectKind::schema(), &json!({"name": "S"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("database".to_string()));
        assert!(diagnostics[0].summary.contains("Missing required"));

        let diagnostics = validate(&ObjectKind::warehouse(), &json!({"name": 5}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));

        let diagnostics = validate(&ObjectKind::warehouse(), &json!({"name": " "}));
        assert!(diagnostics[0].summary.contains("Empty attribute"));
    }

    #[test]
    fn test_unknown_keys_are_warnings() {
        let config = json!({"name": "WH", "autosuspend": 60});
        let diagnostics = validate(&ObjectKind::warehouse(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, DiagnosticSeverity::Warning);
        assert!(is_valid(&ObjectKind::warehouse(), &config));
    }

    #[test]
    fn test_validate_non_object() {
        let result = validate_result(&ObjectKind::warehouse(), &json!("WH"));
        let diagnostics = result.unwrap_err();
        assert_eq!(diagnostics[0].summary, "Expected object");
    }

    #[test]
    fn test_diagnostic_builders() {
        let err = Diagnostic::error("Invalid configuration")
            .with_detail("The value must be positive")
            .with_attribute("auto_suspend");
        assert_eq!(err.severity, DiagnosticSeverity::Error);
        assert_eq!(err.detail, Some("The value must be positive".to_string()));
        assert_eq!(err.attribute, Some("auto_suspend".to_string()));
        assert!(!Diagnostic::warning("careful").is_error());
    }

    #[test]
    fn test_diagnostic_from_error() {
        let diag = Diagnostic::from_error(&ProviderError::validation(
            "log_level",
            "\"LOUD\"",
            "must be one of [OFF]",
        ));
        assert_eq!(diag.attribute, Some("log_level".to_string()));
        assert_eq!(diag.detail, Some("must be one of [OFF] (got \"LOUD\")".to_string()));

        let diag = Diagnostic::from_error(&ProviderError::Transient("timeout".to_string()));
        assert_eq!(diag.summary, "Transient error: timeout");
        assert!(diag.attribute.is_none());
    }
}
