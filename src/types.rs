//! Object identity, desired state and plan summaries.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::DescriptorTable;
use crate::drift::DriftReport;
use crate::error::ProviderError;
use crate::plan::ReconciliationPlan;
use crate::value::{ParamValue, TriState};

static UNSET: TriState<ParamValue> = TriState::Unset;

/// The name and container path of a remote object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectIdentity {
    /// Containing database, for database-scoped objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Containing schema, for schema-scoped objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// The object's own name.
    pub name: String,
}

impl ObjectIdentity {
    /// An account-level object such as a warehouse or database.
    pub fn account_level(name: impl Into<String>) -> Self {
        Self {
            database: None,
            schema: None,
            name: name.into(),
        }
    }

    /// A database-scoped object such as a schema.
    pub fn in_database(database: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            schema: None,
            name: name.into(),
        }
    }

    /// A schema-scoped object such as a task.
    pub fn in_schema(
        database: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            database: Some(database.into()),
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// The same container with a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Whether two identities live in the same container.
    pub fn same_container(&self, other: &Self) -> bool {
        self.database == other.database && self.schema == other.schema
    }

    /// Key of the containing object, if any (`db` or `db.schema`).
    pub fn container_key(&self) -> Option<String> {
        match (&self.database, &self.schema) {
            (Some(db), Some(schema)) => Some(format!("{}.{}", db, schema)),
            (Some(db), None) => Some(db.clone()),
            _ => None,
        }
    }

    /// Quoted, dot-separated fully qualified name.
    pub fn fully_qualified_name(&self) -> String {
        [&self.database, &self.schema]
            .into_iter()
            .flatten()
            .chain(std::iter::once(&self.name))
            .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fully_qualified_name())
    }
}

/// Desired configuration for one object, built fresh every plan/apply cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredObjectState {
    /// The object the configuration targets.
    pub identity: ObjectIdentity,
    /// Parsed slots keyed by parameter name. Missing names are `Unset`.
    pub parameters: BTreeMap<String, TriState<ParamValue>>,
}

impl DesiredObjectState {
    /// A desired state with nothing managed.
    pub fn new(identity: ObjectIdentity) -> Self {
        Self {
            identity,
            parameters: BTreeMap::new(),
        }
    }

    /// Parse every declared parameter from a configuration object.
    ///
    /// Keys the table does not declare are left alone; identity attributes
    /// such as `name` live alongside parameters in the same object.
    pub fn from_config(
        identity: ObjectIdentity,
        table: &DescriptorTable,
        config: &Value,
    ) -> Result<Self, ProviderError> {
        let obj = match config {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::new(identity)),
            other => {
                return Err(ProviderError::Configuration(format!(
                    "expected an object for {}, got {}",
                    identity,
                    crate::value::json_type_name(other)
                )))
            },
        };

        let mut parameters = BTreeMap::new();
        for descriptor in table.iter() {
            let slot = TriState::parse(descriptor, obj.get(&descriptor.name))
                .map_err(|e| e.with_object(&identity))?;
            if slot.is_managed() {
                parameters.insert(descriptor.name.clone(), slot);
            }
        }
        Ok(Self {
            identity,
            parameters,
        })
    }

    /// Set one slot. `Unset` removes the entry.
    pub fn with_parameter(mut self, name: impl Into<String>, slot: TriState<ParamValue>) -> Self {
        let name = name.into();
        if slot.is_unset() {
            self.parameters.remove(&name);
        } else {
            self.parameters.insert(name, slot);
        }
        self
    }

    /// The slot for a parameter; `Unset` when not configured.
    pub fn get(&self, name: &str) -> &TriState<ParamValue> {
        self.parameters.get(name).unwrap_or(&UNSET)
    }

    /// Names of managed parameters.
    pub fn managed_names(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|(_, slot)| slot.is_managed())
            .map(|(name, _)| name.as_str())
    }

    /// Explicit values in table declaration order, normalized for the platform.
    pub fn explicit_parameters(&self, table: &DescriptorTable) -> Vec<(String, ParamValue)> {
        table
            .iter()
            .filter_map(|d| {
                self.get(&d.name)
                    .explicit()
                    .map(|v| (d.name.clone(), d.normalize(v.clone())))
            })
            .collect()
    }
}

/// A user-facing change to one parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterChange {
    /// The parameter name.
    pub parameter: String,
    /// The value before the change (None if not previously known).
    pub before: Option<Value>,
    /// The value after the change (None when it returns to the remote default).
    pub after: Option<Value>,
}

impl ParameterChange {
    /// Create a new parameter change.
    pub fn new(parameter: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            parameter: parameter.into(),
            before,
            after,
        }
    }

    /// A value that appears where none was known.
    pub fn added(parameter: impl Into<String>, value: Value) -> Self {
        Self::new(parameter, None, Some(value))
    }

    /// A value that is released back to the remote default.
    pub fn removed(parameter: impl Into<String>, value: Value) -> Self {
        Self::new(parameter, Some(value), None)
    }

    /// A value that changes.
    pub fn modified(parameter: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(parameter, Some(before), Some(after))
    }
}

/// What happens to the object as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ObjectAction {
    /// Nothing to do.
    NoOp,
    /// The object does not exist and will be created.
    Create,
    /// Parameters change in place.
    Update,
    /// The object is renamed in place, then updated.
    Rename {
        /// The current identity.
        from: ObjectIdentity,
    },
    /// The object is dropped and recreated.
    Replace {
        /// The current identity.
        from: ObjectIdentity,
    },
}

/// The plan for one object: detected drift and planned operations, kept apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectPlan {
    /// The target identity.
    pub identity: ObjectIdentity,
    /// Object-level action.
    pub action: ObjectAction,
    /// Changes made outside the tool since the last apply.
    pub drift: DriftReport,
    /// Operations to run, in execution order. For creates and replaces these
    /// are the creation-time parameters.
    pub operations: ReconciliationPlan,
    /// Planned changes in user-facing form.
    pub changes: Vec<ParameterChange>,
}

impl ObjectPlan {
    /// A plan that changes nothing.
    pub fn no_change(identity: ObjectIdentity, drift: DriftReport) -> Self {
        Self {
            identity,
            action: ObjectAction::NoOp,
            drift,
            operations: ReconciliationPlan::empty(),
            changes: Vec::new(),
        }
    }

    /// Whether applying this plan touches the remote object.
    pub fn has_changes(&self) -> bool {
        !matches!(self.action, ObjectAction::NoOp)
    }

    /// Whether the object must be dropped and recreated.
    pub fn requires_replace(&self) -> bool {
        matches!(self.action, ObjectAction::Replace { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ParameterDescriptor;
    use serde_json::json;

    fn table() -> DescriptorTable {
        DescriptorTable::new()
            .with_parameter(ParameterDescriptor::int("auto_suspend", 600))
            .with_parameter(ParameterDescriptor::bool("auto_resume", true))
            .with_parameter(
                ParameterDescriptor::enumeration("warehouse_size", &["XSMALL", "SMALL"], "XSMALL")
                    .case_insensitive(),
            )
    }

    #[test]
    fn test_identity_names() {
        let wh = ObjectIdentity::account_level("WH");
        assert_eq!(wh.fully_qualified_name(), "\"WH\"");
        assert_eq!(wh.container_key(), None);

        let task = ObjectIdentity::in_schema("DB", "PUBLIC", "NIGHTLY");
        assert_eq!(task.to_string(), "\"DB\".\"PUBLIC\".\"NIGHTLY\"");
        assert_eq!(task.container_key(), Some("DB.PUBLIC".to_string()));

        let odd = ObjectIdentity::in_database("DB", "my\"schema");
        assert_eq!(odd.fully_qualified_name(), "\"DB\".\"my\"\"schema\"");
    }

    #[test]
    fn test_identity_container_comparison() {
        let a = ObjectIdentity::in_database("DB", "A");
        assert!(a.same_container(&a.renamed("B")));
        assert!(!a.same_container(&ObjectIdentity::in_database("OTHER", "A")));
    }

    #[test]
    fn test_desired_from_config() {
        let config = json!({
            "name": "WH",
            "auto_suspend": 0,
            "auto_resume": null,
            "warehouse_size": "small"
        });
        let desired =
            DesiredObjectState::from_config(ObjectIdentity::account_level("WH"), &table(), &config)
                .unwrap();

        assert_eq!(desired.get("auto_suspend"), &TriState::Explicit(ParamValue::Int(0)));
        assert_eq!(desired.get("auto_resume"), &TriState::UseDefault);
        assert_eq!(
            desired.get("warehouse_size"),
            &TriState::Explicit(ParamValue::from("SMALL"))
        );
        assert_eq!(desired.get("comment"), &TriState::Unset);
        assert_eq!(
            desired.managed_names().collect::<Vec<_>>(),
            vec!["auto_resume", "auto_suspend", "warehouse_size"]
        );
        assert_eq!(
            desired.explicit_parameters(&table()),
            vec![
                ("auto_suspend".to_string(), ParamValue::Int(0)),
                ("warehouse_size".to_string(), ParamValue::from("SMALL")),
            ]
        );
    }

    #[test]
    fn test_desired_from_config_names_object_on_error() {
        let err = DesiredObjectState::from_config(
            ObjectIdentity::account_level("WH"),
            &table(),
            &json!({"auto_suspend": "later"}),
        )
        .unwrap_err();
        match err {
            ProviderError::Validation {
                object, parameter, ..
            } => {
                assert_eq!(object, "\"WH\"");
                assert_eq!(parameter, "auto_suspend");
            },
            other => panic!("unexpected error: {:?}", other),
        }

        let err = DesiredObjectState::from_config(
            ObjectIdentity::account_level("WH"),
            &table(),
            &json!([1, 2]),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_with_parameter_unset_removes() {
        let desired = DesiredObjectState::new(ObjectIdentity::account_level("WH"))
            .with_parameter("auto_suspend", TriState::Explicit(ParamValue::Int(1)))
            .with_parameter("auto_suspend", TriState::Unset);
        assert!(desired.parameters.is_empty());
    }

    #[test]
    fn test_parameter_change_constructors() {
        let added = ParameterChange::added("auto_suspend", json!(0));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!(0)));

        let removed = ParameterChange::removed("auto_suspend", json!(60));
        assert_eq!(removed.before, Some(json!(60)));
        assert!(removed.after.is_none());
    }

    #[test]
    fn test_object_plan() {
        let identity = ObjectIdentity::account_level("WH");
        let plan = ObjectPlan::no_change(identity.clone(), DriftReport::empty());
        assert!(!plan.has_changes());
        assert!(!plan.requires_replace());

        let replace = ObjectPlan {
            action: ObjectAction::Replace {
                from: identity.renamed("OLD"),
            },
            ..plan
        };
        assert!(replace.requires_replace());
        let json = serde_json::to_value(&replace.action).unwrap();
        assert_eq!(json["action"], "replace");
    }
}
