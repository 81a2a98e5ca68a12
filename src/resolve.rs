//! Scope hierarchy resolution.
//!
//! Given a parameter's readings at every scope the platform reports, the
//! resolver walks the descriptor's scope order from most to least specific and
//! picks the first scope at which the parameter is set. When nothing is set the
//! system default governs.
//!
//! A reading that is set to the empty string is still set; only a reading with
//! no value means "inherits".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::descriptor::{DescriptorTable, ParameterDescriptor, Scope};
use crate::error::ProviderError;
use crate::value::ParamValue;

/// One observation of a parameter at one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterReading {
    /// The scope the observation belongs to.
    pub scope: Scope,
    /// The value pinned at this scope, or `None` if the scope inherits.
    pub value: Option<ParamValue>,
}

impl ParameterReading {
    /// A reading for a scope at which the parameter is explicitly set.
    pub fn set(scope: Scope, value: impl Into<ParamValue>) -> Self {
        Self {
            scope,
            value: Some(value.into()),
        }
    }

    /// A reading for a scope that inherits the parameter.
    pub fn inherited(scope: Scope) -> Self {
        Self { scope, value: None }
    }

    /// Whether the parameter is set at this scope.
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

/// The effective value of a parameter and the scope that governs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedParameter {
    /// The effective value.
    pub value: ParamValue,
    /// The most specific scope at which the parameter is set.
    pub governing_scope: Scope,
}

impl ResolvedParameter {
    /// Create a resolved parameter.
    pub fn new(value: impl Into<ParamValue>, governing_scope: Scope) -> Self {
        Self {
            value: value.into(),
            governing_scope,
        }
    }

    /// Whether the object itself pins the value.
    pub fn is_object_level(&self) -> bool {
        self.governing_scope == Scope::Object
    }
}

/// Readings for one object, keyed by parameter name.
pub type ObjectReadings = BTreeMap<String, Vec<ParameterReading>>;

/// Resolved parameters for one object, keyed by parameter name.
pub type ResolvedState = BTreeMap<String, ResolvedParameter>;

/// Resolve one parameter. Never fails: the system default is the fallback.
///
/// Readings are matched to scopes by their `scope` field. Readings for scopes
/// outside the descriptor's scope order are ignored; see [`scope_anomalies`].
///
/// # Arguments
///
/// * `descriptor` - The parameter, with its scope order and system default
/// * `readings` - Observations per scope; `None` values mean the scope inherits
///
/// # Example
///
/// ```
/// use dataplat_params::{resolve, ParameterDescriptor, ParameterReading, ResolvedParameter, Scope};
///
/// let descriptor = ParameterDescriptor::int("data_retention_time_in_days", 1)
///     .with_scopes(&[Scope::Object, Scope::Container, Scope::Account]);
/// let readings = vec![
///     ParameterReading::inherited(Scope::Object),
///     ParameterReading::set(Scope::Container, 7),
///     ParameterReading::set(Scope::Account, 3),
/// ];
///
/// // The database's value wins over the account's.
/// assert_eq!(
///     resolve(&descriptor, &readings),
///     ResolvedParameter::new(7, Scope::Container)
/// );
/// ```
pub fn resolve(descriptor: &ParameterDescriptor, readings: &[ParameterReading]) -> ResolvedParameter {
    for scope in &descriptor.scope_order {
        let pinned = readings
            .iter()
            .filter(|r| r.scope == *scope)
            .find_map(|r| r.value.as_ref());
        if let Some(value) = pinned {
            return ResolvedParameter::new(value.clone(), *scope);
        }
    }
    ResolvedParameter::new(descriptor.system_default.clone(), Scope::System)
}

/// Scopes reported as set that the descriptor's hierarchy does not know about.
pub fn scope_anomalies(descriptor: &ParameterDescriptor, readings: &[ParameterReading]) -> Vec<Scope> {
    readings
        .iter()
        .filter(|r| r.is_set() && !descriptor.supports_scope(r.scope))
        .map(|r| r.scope)
        .collect()
}

/// Resolve every parameter in a table.
///
/// Parameters with no readings resolve to their system default. Readings for
/// parameters the table does not declare are skipped.
pub fn resolve_all(
    table: &DescriptorTable,
    readings: &ObjectReadings,
    report_anomalies: bool,
) -> ResolvedState {
    for name in readings.keys() {
        if !table.contains(name) {
            debug!(parameter = %name, "ignoring readings for undeclared parameter");
        }
    }

    table
        .iter()
        .map(|descriptor| {
            let observed = readings
                .get(&descriptor.name)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            if report_anomalies {
                for scope in scope_anomalies(descriptor, observed) {
                    warn!(
                        parameter = %descriptor.name,
                        %scope,
                        "platform reports parameter set at a scope outside its hierarchy"
                    );
                }
            }
            (descriptor.name.clone(), resolve(descriptor, observed))
        })
        .collect()
}

/// A `SHOW PARAMETERS`-style row: effective value, platform default and the
/// level at which the value is set (empty when nothing overrides the default).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRow {
    /// Parameter name.
    pub key: String,
    /// Effective value as text.
    pub value: String,
    /// Platform default as text.
    pub default: String,
    /// Level name, e.g. `WAREHOUSE`, `DATABASE`, `ACCOUNT`, or empty.
    pub level: String,
}

/// Translate a parameter row into a readings sequence.
///
/// `scope_for_level` maps a platform level name to a scope. The returned
/// sequence follows the descriptor's scope order; the `System` reading carries
/// the platform's reported default.
pub fn readings_from_row<F>(
    descriptor: &ParameterDescriptor,
    row: &ParameterRow,
    scope_for_level: F,
) -> Result<Vec<ParameterReading>, ProviderError>
where
    F: Fn(&str) -> Option<Scope>,
{
    let remote_error = |message: String| ProviderError::RemoteData {
        parameter: descriptor.name.clone(),
        message,
    };

    let level = row.level.trim();
    let pinned_scope = if level.is_empty() {
        None
    } else {
        match scope_for_level(level) {
            Some(scope) => Some(scope),
            None => return Err(remote_error(format!("unknown parameter level '{}'", level))),
        }
    };

    let mut readings: Vec<ParameterReading> = descriptor
        .scope_order
        .iter()
        .filter(|scope| **scope != Scope::System)
        .map(|scope| ParameterReading::inherited(*scope))
        .collect();

    if let Some(scope) = pinned_scope {
        let value = descriptor.parse_remote(&row.value).map_err(remote_error)?;
        match readings.iter_mut().find(|r| r.scope == scope) {
            Some(reading) => reading.value = Some(value),
            // Kept so the resolver can report it as an anomaly.
            None => readings.push(ParameterReading::set(scope, value)),
        }
    }

    let default = descriptor.parse_remote(&row.default).map_err(remote_error)?;
    readings.push(ParameterReading::set(Scope::System, default));
    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auto_suspend() -> ParameterDescriptor {
        ParameterDescriptor::int("auto_suspend", 600).with_scopes(&[Scope::Object, Scope::Account])
    }

    fn data_retention() -> ParameterDescriptor {
        ParameterDescriptor::int("data_retention_time_in_days", 1).with_scopes(&[
            Scope::Object,
            Scope::Container,
            Scope::Account,
        ])
    }

    #[test]
    fn test_all_unset_resolves_to_system_default() {
        let readings = vec![
            ParameterReading::inherited(Scope::Object),
            ParameterReading::inherited(Scope::Account),
        ];
        assert_eq!(
            resolve(&auto_suspend(), &readings),
            ResolvedParameter::new(600, Scope::System)
        );
        assert_eq!(
            resolve(&auto_suspend(), &[]),
            ResolvedParameter::new(600, Scope::System)
        );
    }

    #[test]
    fn test_most_specific_set_scope_wins() {
        let readings = vec![
            ParameterReading::inherited(Scope::Object),
            ParameterReading::set(Scope::Container, 7),
            ParameterReading::set(Scope::Account, 3),
        ];
        assert_eq!(
            resolve(&data_retention(), &readings),
            ResolvedParameter::new(7, Scope::Container)
        );

        let readings = vec![
            ParameterReading::set(Scope::Object, 0),
            ParameterReading::set(Scope::Container, 7),
        ];
        let resolved = resolve(&data_retention(), &readings);
        assert_eq!(resolved, ResolvedParameter::new(0, Scope::Object));
        assert!(resolved.is_object_level());
    }

    #[test]
    fn test_reading_order_does_not_matter() {
        let readings = vec![
            ParameterReading::set(Scope::Account, 3),
            ParameterReading::set(Scope::Object, 5),
        ];
        assert_eq!(
            resolve(&data_retention(), &readings),
            ResolvedParameter::new(5, Scope::Object)
        );
    }

    #[test]
    fn test_empty_string_set_is_not_inherited() {
        let d = ParameterDescriptor::string("default_ddl_collation", "en").with_scopes(&[
            Scope::Object,
            Scope::Account,
        ]);
        let readings = vec![
            ParameterReading::set(Scope::Object, ""),
            ParameterReading::set(Scope::Account, "de"),
        ];
        assert_eq!(
            resolve(&d, &readings),
            ResolvedParameter::new("", Scope::Object)
        );
    }

    #[test]
    fn test_platform_reported_system_value_wins_over_compiled_default() {
        let readings = vec![
            ParameterReading::inherited(Scope::Object),
            ParameterReading::set(Scope::System, 300),
        ];
        assert_eq!(
            resolve(&auto_suspend(), &readings),
            ResolvedParameter::new(300, Scope::System)
        );
    }

    #[test]
    fn test_out_of_hierarchy_scope_is_ignored_and_reported() {
        let d = ParameterDescriptor::bool("auto_resume", true);
        let readings = vec![ParameterReading::set(Scope::Account, false)];
        assert_eq!(resolve(&d, &readings), ResolvedParameter::new(true, Scope::System));
        assert_eq!(scope_anomalies(&d, &readings), vec![Scope::Account]);
    }

    #[test]
    fn test_resolve_all_is_total() {
        let table = DescriptorTable::new()
            .with_parameter(auto_suspend())
            .with_parameter(ParameterDescriptor::bool("auto_resume", true));

        let mut readings = ObjectReadings::new();
        readings.insert(
            "auto_suspend".to_string(),
            vec![ParameterReading::set(Scope::Object, 60)],
        );
        readings.insert(
            "not_declared".to_string(),
            vec![ParameterReading::set(Scope::Object, 1)],
        );

        let resolved = resolve_all(&table, &readings, true);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved["auto_suspend"], ResolvedParameter::new(60, Scope::Object));
        assert_eq!(resolved["auto_resume"], ResolvedParameter::new(true, Scope::System));
    }

    fn level_map(level: &str) -> Option<Scope> {
        match level.to_uppercase().as_str() {
            "DATABASE" => Some(Scope::Object),
            "ACCOUNT" => Some(Scope::Account),
            _ => None,
        }
    }

    #[test]
    fn test_readings_from_row_with_empty_level() {
        let d = ParameterDescriptor::int("data_retention_time_in_days", 1)
            .with_scopes(&[Scope::Object, Scope::Account]);
        let row = ParameterRow {
            key: "DATA_RETENTION_TIME_IN_DAYS".to_string(),
            value: "1".to_string(),
            default: "1".to_string(),
            level: String::new(),
        };
        let readings = readings_from_row(&d, &row, level_map).unwrap();
        assert_eq!(
            readings,
            vec![
                ParameterReading::inherited(Scope::Object),
                ParameterReading::inherited(Scope::Account),
                ParameterReading::set(Scope::System, 1),
            ]
        );
        assert_eq!(resolve(&d, &readings), ResolvedParameter::new(1, Scope::System));
    }

    #[test]
    fn test_readings_from_row_with_named_level() {
        let d = ParameterDescriptor::int("data_retention_time_in_days", 1)
            .with_scopes(&[Scope::Object, Scope::Account]);
        let row = ParameterRow {
            key: "DATA_RETENTION_TIME_IN_DAYS".to_string(),
            value: "5".to_string(),
            default: "1".to_string(),
            level: "ACCOUNT".to_string(),
        };
        let readings = readings_from_row(&d, &row, level_map).unwrap();
        assert_eq!(resolve(&d, &readings), ResolvedParameter::new(5, Scope::Account));
    }

    #[test]
    fn test_readings_from_row_keeps_out_of_hierarchy_level() {
        let d = ParameterDescriptor::int("data_retention_time_in_days", 1)
            .with_scopes(&[Scope::Object, Scope::Account]);
        let row = ParameterRow {
            key: "DATA_RETENTION_TIME_IN_DAYS".to_string(),
            value: "7".to_string(),
            default: "1".to_string(),
            level: "DATABASE".to_string(),
        };
        let container_level = |level: &str| match level {
            "DATABASE" => Some(Scope::Container),
            "ACCOUNT" => Some(Scope::Account),
            _ => None,
        };

        let readings = readings_from_row(&d, &row, container_level).unwrap();
        assert!(readings.contains(&ParameterReading::set(Scope::Container, 7)));
        assert_eq!(scope_anomalies(&d, &readings), vec![Scope::Container]);
        assert_eq!(resolve(&d, &readings), ResolvedParameter::new(1, Scope::System));
    }

    #[test]
    fn test_readings_from_row_rejects_unknown_level_and_bad_value() {
        let d = ParameterDescriptor::int("data_retention_time_in_days", 1);
        let row = ParameterRow {
            key: "DATA_RETENTION_TIME_IN_DAYS".to_string(),
            value: "5".to_string(),
            default: "1".to_string(),
            level: "ORGANIZATION".to_string(),
        };
        let err = readings_from_row(&d, &row, level_map).unwrap_err();
        assert!(matches!(err, ProviderError::RemoteData { .. }));

        let row = ParameterRow {
            level: "DATABASE".to_string(),
            value: "five".to_string(),
            ..row
        };
        assert!(readings_from_row(&d, &row, level_map).is_err());
    }
}
