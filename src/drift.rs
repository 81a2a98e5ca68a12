//! Drift detection.
//!
//! Drift is measured against what the provider recorded after its last
//! successful apply, never against the desired configuration. A parameter that
//! changed outside the tool shows up here even when the new configuration is
//! about to change it too; the planner reports the latter separately.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resolve::{ResolvedParameter, ResolvedState};
use crate::types::{ObjectIdentity, ParameterChange};

/// The resolved values recorded after the last successful apply.
///
/// Only parameters the configuration manages are recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedState {
    /// The object the snapshot belongs to.
    pub identity: ObjectIdentity,
    /// Resolved parameters at the time of the apply.
    #[serde(default)]
    pub parameters: BTreeMap<String, ResolvedParameter>,
}

impl AppliedState {
    /// Create an empty snapshot.
    pub fn new(identity: ObjectIdentity) -> Self {
        Self {
            identity,
            parameters: BTreeMap::new(),
        }
    }

    /// Record one parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, resolved: ResolvedParameter) -> Self {
        self.parameters.insert(name.into(), resolved);
        self
    }

    /// Capture the named parameters from a resolved state.
    pub fn capture<'a>(
        identity: ObjectIdentity,
        resolved: &ResolvedState,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let parameters = names
            .into_iter()
            .filter_map(|name| resolved.get(name).map(|r| (name.to_string(), r.clone())))
            .collect();
        Self {
            identity,
            parameters,
        }
    }

    /// Look up a recorded parameter.
    pub fn get(&self, name: &str) -> Option<&ResolvedParameter> {
        self.parameters.get(name)
    }
}

/// Drift status for one parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DriftStatus {
    /// The parameter still resolves as it did after the last apply.
    NoDrift,
    /// The parameter changed outside the tool.
    Drifted {
        /// What the last apply left behind.
        old: ResolvedParameter,
        /// What the platform reports now.
        new: ResolvedParameter,
    },
}

impl DriftStatus {
    /// Whether this status is a drift.
    pub fn is_drifted(&self) -> bool {
        matches!(self, Self::Drifted { .. })
    }
}

/// Per-parameter drift for one object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    entries: BTreeMap<String, DriftStatus>,
}

impl DriftReport {
    /// An empty report.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Status for a parameter, if it was compared.
    pub fn status(&self, name: &str) -> Option<&DriftStatus> {
        self.entries.get(name)
    }

    /// Whether any parameter drifted.
    pub fn has_drift(&self) -> bool {
        self.entries.values().any(DriftStatus::is_drifted)
    }

    /// Drifted parameters with their old and new resolutions.
    pub fn drifted(&self) -> impl Iterator<Item = (&str, &ResolvedParameter, &ResolvedParameter)> {
        self.entries.iter().filter_map(|(name, status)| match status {
            DriftStatus::Drifted { old, new } => Some((name.as_str(), old, new)),
            DriftStatus::NoDrift => None,
        })
    }

    /// All compared parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DriftStatus)> {
        self.entries.iter().map(|(name, status)| (name.as_str(), status))
    }

    /// Number of compared parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was compared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drifted parameters as user-facing changes.
    pub fn changes(&self) -> Vec<ParameterChange> {
        self.drifted()
            .map(|(name, old, new)| {
                ParameterChange::modified(name, old.value.to_json(), new.value.to_json())
            })
            .collect()
    }
}

/// Compare the last applied snapshot with freshly resolved state.
///
/// A parameter drifts when its value or its governing scope changed. Recorded
/// parameters missing from `current` are not compared.
///
/// # Example
///
/// ```
/// use dataplat_params::{detect_drift, AppliedState, ObjectIdentity, ResolvedParameter, ResolvedState, Scope};
///
/// let mut before = ResolvedState::new();
/// before.insert("auto_suspend".to_string(), ResolvedParameter::new(60, Scope::Object));
/// let applied = AppliedState::capture(
///     ObjectIdentity::account_level("WH"),
///     &before,
///     ["auto_suspend"],
/// );
///
/// // Same value, but the override was removed and the account now supplies it.
/// let mut after = ResolvedState::new();
/// after.insert("auto_suspend".to_string(), ResolvedParameter::new(60, Scope::Account));
///
/// let report = detect_drift(&applied, &after);
/// assert!(report.has_drift());
/// ```
pub fn detect_drift(previous: &AppliedState, current: &ResolvedState) -> DriftReport {
    let entries = previous
        .parameters
        .iter()
        .filter_map(|(name, old)| {
            let new = current.get(name)?;
            let status = if old == new {
                DriftStatus::NoDrift
            } else {
                DriftStatus::Drifted {
                    old: old.clone(),
                    new: new.clone(),
                }
            };
            Some((name.clone(), status))
        })
        .collect();
    DriftReport { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Scope;
    use serde_json::json;

    fn identity() -> ObjectIdentity {
        ObjectIdentity::account_level("WH")
    }

    #[test]
    fn test_external_change_is_reported() {
        let previous = AppliedState::new(identity()).with_parameter(
            "statement_timeout_in_seconds",
            ResolvedParameter::new(43200, Scope::Object),
        );
        let mut current = ResolvedState::new();
        current.insert(
            "statement_timeout_in_seconds".to_string(),
            ResolvedParameter::new(86400, Scope::Account),
        );

        let report = detect_drift(&previous, &current);
        assert!(report.has_drift());
        assert_eq!(
            report.status("statement_timeout_in_seconds"),
            Some(&DriftStatus::Drifted {
                old: ResolvedParameter::new(43200, Scope::Object),
                new: ResolvedParameter::new(86400, Scope::Account),
            })
        );
        assert_eq!(
            report.changes(),
            vec![ParameterChange::modified(
                "statement_timeout_in_seconds",
                json!(43200),
                json!(86400)
            )]
        );
    }

    #[test]
    fn test_unchanged_is_no_drift() {
        let previous = AppliedState::new(identity())
            .with_parameter("auto_suspend", ResolvedParameter::new(0, Scope::Object));
        let mut current = ResolvedState::new();
        current.insert(
            "auto_suspend".to_string(),
            ResolvedParameter::new(0, Scope::Object),
        );
        current.insert(
            "auto_resume".to_string(),
            ResolvedParameter::new(false, Scope::Object),
        );

        let report = detect_drift(&previous, &current);
        assert!(!report.has_drift());
        assert_eq!(report.len(), 1);
        assert_eq!(report.status("auto_suspend"), Some(&DriftStatus::NoDrift));
        assert_eq!(report.status("auto_resume"), None);
    }

    #[test]
    fn test_scope_only_change_is_drift() {
        let previous = AppliedState::new(identity())
            .with_parameter("max_concurrency_level", ResolvedParameter::new(8, Scope::Object));
        let mut current = ResolvedState::new();
        current.insert(
            "max_concurrency_level".to_string(),
            ResolvedParameter::new(8, Scope::System),
        );

        let report = detect_drift(&previous, &current);
        assert_eq!(report.drifted().count(), 1);
    }

    #[test]
    fn test_capture_only_named_parameters() {
        let mut resolved = ResolvedState::new();
        resolved.insert("a".to_string(), ResolvedParameter::new(1, Scope::Object));
        resolved.insert("b".to_string(), ResolvedParameter::new(2, Scope::System));

        let applied = AppliedState::capture(identity(), &resolved, ["b", "missing"]);
        assert_eq!(applied.parameters.len(), 1);
        assert_eq!(applied.get("b"), Some(&ResolvedParameter::new(2, Scope::System)));
    }

    #[test]
    fn test_applied_state_serde() {
        let applied = AppliedState::new(identity())
            .with_parameter("auto_suspend", ResolvedParameter::new(0, Scope::Object));
        let json = serde_json::to_value(&applied).unwrap();
        assert_eq!(json["parameters"]["auto_suspend"]["governing_scope"], "object");
        let back: AppliedState = serde_json::from_value(json).unwrap();
        assert_eq!(back, applied);
    }
}
