//! Reconciliation planning.
//!
//! For each parameter the planner looks at the desired slot and the current
//! resolution, then emits at most one operation:
//!
//! | Desired        | Current                           | Operation       |
//! |----------------|-----------------------------------|-----------------|
//! | `Unset`        | anything                          | none            |
//! | `UseDefault`   | governed above object scope       | none            |
//! | `UseDefault`   | governed at object scope          | `Unset`         |
//! | `Explicit(v)`  | governed above object scope       | `Set(v)`        |
//! | `Explicit(v)`  | object scope, value differs       | `Set(v)`        |
//! | `Explicit(v)`  | object scope, value equal         | none            |
//!
//! Returning to the default is an `Unset`, never a `Set` of the default value:
//! on some platforms an explicitly set default still shows up as an override.
//!
//! # Example
//!
//! ```
//! use dataplat_params::descriptor::{DescriptorTable, ParameterDescriptor, Scope};
//! use dataplat_params::plan::{plan, Operation};
//! use dataplat_params::resolve::{resolve_all, ObjectReadings};
//! use dataplat_params::types::{DesiredObjectState, ObjectIdentity};
//! use dataplat_params::value::{ParamValue, TriState};
//!
//! let table = DescriptorTable::new().with_parameter(
//!     ParameterDescriptor::int("auto_suspend", 600).with_scopes(&[Scope::Object, Scope::Account]),
//! );
//! let current = resolve_all(&table, &ObjectReadings::new(), false);
//! let desired = DesiredObjectState::new(ObjectIdentity::account_level("WH"))
//!     .with_parameter("auto_suspend", TriState::Explicit(ParamValue::Int(0)));
//!
//! let operations = plan(&table, &desired, &current);
//! assert_eq!(operations.operations(), &[Operation::set("auto_suspend", ParamValue::Int(0))]);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::{DescriptorTable, ParameterDescriptor, Scope};
use crate::resolve::{ResolvedParameter, ResolvedState};
use crate::types::DesiredObjectState;
use crate::value::{ParamValue, TriState};

/// The kind of a remote mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Pin a value at object scope.
    Set,
    /// Remove the object-scope value.
    Unset,
}

/// One remote mutation against one parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Set or unset.
    pub kind: OperationKind,
    /// The parameter name.
    pub parameter: String,
    /// The value to set; `None` for unsets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<ParamValue>,
}

impl Operation {
    /// Create a set operation.
    pub fn set(parameter: impl Into<String>, value: ParamValue) -> Self {
        Self {
            kind: OperationKind::Set,
            parameter: parameter.into(),
            new_value: Some(value),
        }
    }

    /// Create an unset operation.
    pub fn unset(parameter: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Unset,
            parameter: parameter.into(),
            new_value: None,
        }
    }

    /// Whether this is a set.
    pub fn is_set(&self) -> bool {
        self.kind == OperationKind::Set
    }

    /// Whether this is an unset.
    pub fn is_unset(&self) -> bool {
        self.kind == OperationKind::Unset
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.new_value) {
            (OperationKind::Set, Some(value)) => {
                write!(f, "SET {} = {}", self.parameter, value.to_sql_literal())
            },
            (OperationKind::Set, None) => write!(f, "SET {}", self.parameter),
            (OperationKind::Unset, _) => write!(f, "UNSET {}", self.parameter),
        }
    }
}

/// The order in which an object kind wants its operations executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOrder {
    /// Parameter declaration order.
    #[default]
    AsPlanned,
    /// All unsets, then all sets.
    UnsetsFirst,
    /// All sets, then all unsets.
    SetsFirst,
}

/// The ordered operations needed to converge one object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    operations: Vec<Operation>,
}

impl ReconciliationPlan {
    /// An empty plan.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a plan from operations in the given order.
    pub fn from_operations(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    /// Whether there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// The operations in execution order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Iterate operations in execution order.
    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    /// The operation for a parameter, if any.
    pub fn operation_for(&self, parameter: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.parameter == parameter)
    }

    /// Reorder for execution. The sort is stable, so declaration order is
    /// kept within each group.
    pub fn ordered(mut self, order: ExecutionOrder) -> Self {
        match order {
            ExecutionOrder::AsPlanned => {},
            ExecutionOrder::UnsetsFirst => self.operations.sort_by_key(|op| op.is_set()),
            ExecutionOrder::SetsFirst => self.operations.sort_by_key(|op| op.is_unset()),
        }
        self
    }
}

impl IntoIterator for ReconciliationPlan {
    type Item = Operation;
    type IntoIter = std::vec::IntoIter<Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}

impl<'a> IntoIterator for &'a ReconciliationPlan {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

/// Plan a single parameter.
pub fn plan_parameter(
    descriptor: &ParameterDescriptor,
    desired: &TriState<ParamValue>,
    current: &ResolvedParameter,
) -> Option<Operation> {
    match desired {
        TriState::Unset => None,
        TriState::UseDefault if current.governing_scope == Scope::Object => {
            Some(Operation::unset(&descriptor.name))
        },
        TriState::UseDefault => None,
        TriState::Explicit(value) => {
            let wanted = descriptor.normalize(value.clone());
            let in_place = current.governing_scope == Scope::Object
                && descriptor.values_equal(&current.value, &wanted);
            if in_place {
                None
            } else {
                Some(Operation::set(&descriptor.name, wanted))
            }
        },
    }
}

/// Plan every parameter in the table, in declaration order.
///
/// Parameters missing from `current` are treated as governed by the system
/// default. Desired entries the table does not declare are ignored.
pub fn plan(
    table: &DescriptorTable,
    desired: &DesiredObjectState,
    current: &ResolvedState,
) -> ReconciliationPlan {
    let mut operations = Vec::new();
    for descriptor in table.iter() {
        let slot = desired.get(&descriptor.name);
        if slot.is_unset() {
            continue;
        }
        let fallback;
        let resolved = match current.get(&descriptor.name) {
            Some(resolved) => resolved,
            None => {
                fallback = ResolvedParameter::new(descriptor.system_default.clone(), Scope::System);
                &fallback
            },
        };
        if let Some(op) = plan_parameter(descriptor, slot, resolved) {
            debug!(
                object = %desired.identity,
                parameter = %descriptor.name,
                current = %resolved.value,
                scope = %resolved.governing_scope,
                operation = %op,
                "planned operation"
            );
            operations.push(op);
        }
    }
    ReconciliationPlan::from_operations(operations)
}
