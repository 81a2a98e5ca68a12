//! Parameter descriptors: name, type, override hierarchy and system default.
//!
//! Descriptors are built with the same builder style as the rest of the crate
//! and grouped per object kind into a [`DescriptorTable`]. A descriptor's scope
//! order always ends with [`Scope::System`], so every parameter resolves to
//! some value.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::ParamValue;

/// A level in the override hierarchy at which a parameter may be pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// The managed object itself.
    Object,
    /// The object's container (database, schema).
    Container,
    /// The account.
    Account,
    /// The platform's built-in default.
    System,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Object => "object",
            Self::Container => "container",
            Self::Account => "account",
            Self::System => "system",
        };
        write!(f, "{}", name)
    }
}

/// The data type of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// A 64-bit integer.
    Int,
    /// A boolean.
    Bool,
    /// Free-form text.
    String,
    /// One of a fixed set of values.
    Enum(Vec<String>),
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Bool => write!(f, "bool"),
            Self::String => write!(f, "string"),
            Self::Enum(values) => write!(f, "one of [{}]", values.join(", ")),
        }
    }
}

/// Static metadata for one configurable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// The parameter name as used in configuration.
    pub name: String,
    /// The value type.
    pub data_type: DataType,
    /// Override hierarchy, most specific first. Always ends with `System`.
    pub scope_order: Vec<Scope>,
    /// The value that applies when nothing is set at any scope.
    pub system_default: ParamValue,
    /// Whether the platform normalizes input casing (to upper case).
    #[serde(default)]
    pub case_insensitive: bool,
    /// Inclusive integer bounds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<(i64, i64)>,
    /// Whether the platform accepts an UNSET at object scope.
    #[serde(default = "default_true")]
    pub unsettable_at_object: bool,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ParameterDescriptor {
    /// Create a descriptor governed at object scope, falling back to the system default.
    pub fn new(name: impl Into<String>, data_type: DataType, system_default: ParamValue) -> Self {
        Self {
            name: name.into(),
            data_type,
            scope_order: vec![Scope::Object, Scope::System],
            system_default,
            case_insensitive: false,
            range: None,
            unsettable_at_object: true,
            description: None,
        }
    }

    /// Create an integer parameter.
    pub fn int(name: impl Into<String>, system_default: i64) -> Self {
        Self::new(name, DataType::Int, ParamValue::Int(system_default))
    }

    /// Create a boolean parameter.
    pub fn bool(name: impl Into<String>, system_default: bool) -> Self {
        Self::new(name, DataType::Bool, ParamValue::Bool(system_default))
    }

    /// Create a string parameter.
    pub fn string(name: impl Into<String>, system_default: impl Into<String>) -> Self {
        Self::new(
            name,
            DataType::String,
            ParamValue::String(system_default.into()),
        )
    }

    /// Create an enum parameter with its allowed values.
    pub fn enumeration(
        name: impl Into<String>,
        values: &[&str],
        system_default: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            DataType::Enum(values.iter().map(|v| v.to_string()).collect()),
            ParamValue::String(system_default.into()),
        )
    }

    /// Set the override hierarchy. `System` is appended if missing and
    /// anything listed after it is dropped.
    pub fn with_scopes(mut self, scopes: &[Scope]) -> Self {
        let mut order = Vec::with_capacity(scopes.len() + 1);
        for scope in scopes {
            if order.contains(scope) {
                continue;
            }
            order.push(*scope);
            if *scope == Scope::System {
                break;
            }
        }
        if order.last() != Some(&Scope::System) {
            order.push(Scope::System);
        }
        self.scope_order = order;
        self
    }

    /// Mark the parameter as case-insensitive; values are normalized to upper case.
    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self.system_default = self.normalize(self.system_default.clone());
        self
    }

    /// Restrict integer values to an inclusive range.
    pub fn with_range(mut self, min: i64, max: i64) -> Self {
        self.range = Some((min, max));
        self
    }

    /// Mark the parameter as not unsettable at object scope.
    pub fn not_unsettable(mut self) -> Self {
        self.unsettable_at_object = false;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether the parameter can be pinned at the given scope.
    pub fn supports_scope(&self, scope: Scope) -> bool {
        self.scope_order.contains(&scope)
    }

    /// Normalize a value the way the platform does.
    pub fn normalize(&self, value: ParamValue) -> ParamValue {
        match value {
            ParamValue::String(s) if self.case_insensitive => ParamValue::String(s.to_uppercase()),
            other => other,
        }
    }

    /// Compare two values after normalization.
    pub fn values_equal(&self, a: &ParamValue, b: &ParamValue) -> bool {
        if self.case_insensitive {
            self.normalize(a.clone()) == self.normalize(b.clone())
        } else {
            a == b
        }
    }

    /// Check a value against the type, allowed values and range.
    pub fn check_value(&self, value: &ParamValue) -> Result<(), String> {
        match (&self.data_type, value) {
            (DataType::Int, ParamValue::Int(i)) => match self.range {
                Some((min, max)) if *i < min || *i > max => {
                    Err(format!("must be between {} and {}", min, max))
                },
                _ => Ok(()),
            },
            (DataType::Bool, ParamValue::Bool(_)) => Ok(()),
            (DataType::String, ParamValue::String(_)) => Ok(()),
            (DataType::Enum(allowed), ParamValue::String(s)) => {
                let found = allowed.iter().any(|a| {
                    if self.case_insensitive {
                        a.eq_ignore_ascii_case(s)
                    } else {
                        a == s
                    }
                });
                if found {
                    Ok(())
                } else {
                    Err(format!("must be one of [{}]", allowed.join(", ")))
                }
            },
            (expected, got) => Err(format!("expected {}, got {}", expected, got.type_name())),
        }
    }

    /// Parse a raw textual value as reported by the platform.
    pub fn parse_remote(&self, raw: &str) -> Result<ParamValue, String> {
        match self.data_type {
            DataType::Int => raw
                .trim()
                .parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|_| format!("expected an integer, got '{}'", raw)),
            DataType::Bool => match raw.trim().to_lowercase().as_str() {
                "true" => Ok(ParamValue::Bool(true)),
                "false" => Ok(ParamValue::Bool(false)),
                _ => Err(format!("expected a boolean, got '{}'", raw)),
            },
            DataType::String | DataType::Enum(_) => Ok(ParamValue::String(raw.to_string())),
        }
    }
}

/// The descriptors for one object kind, in declaration order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DescriptorTable {
    parameters: Vec<ParameterDescriptor>,
}

impl DescriptorTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor, replacing any existing one with the same name.
    pub fn with_parameter(mut self, descriptor: ParameterDescriptor) -> Self {
        match self
            .parameters
            .iter_mut()
            .find(|d| d.name == descriptor.name)
        {
            Some(existing) => *existing = descriptor,
            None => self.parameters.push(descriptor),
        }
        self
    }

    /// Add several descriptors.
    pub fn with_parameters(self, descriptors: impl IntoIterator<Item = ParameterDescriptor>) -> Self {
        descriptors
            .into_iter()
            .fold(self, |table, d| table.with_parameter(d))
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|d| d.name == name)
    }

    /// Whether the table declares the parameter.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate descriptors in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.parameters.iter()
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.parameters.iter().map(|d| d.name.as_str()).collect()
    }

    /// Position of a parameter in declaration order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|d| d.name == name)
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}
