//! Testing utilities for reconcilers.
//!
//! This module provides an in-memory platform that implements the remote
//! client traits, a harness that drives plan/apply/refresh cycles against it,
//! and assertion helpers for plans and drift reports.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dataplat_params::config::ProviderConfig;
//! use dataplat_params::kinds::ObjectKind;
//! use dataplat_params::lifecycle::LifecycleAdapter;
//! use dataplat_params::testing::{assert_plan_empty, InMemoryPlatform, LifecycleTester};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let platform = Arc::new(InMemoryPlatform::new());
//! let adapter = LifecycleAdapter::new(platform, ObjectKind::warehouse(), ProviderConfig::default());
//! let mut tester = LifecycleTester::new(adapter);
//!
//! let replan = tester.converge(json!({"name": "WH", "auto_suspend": 0})).await.unwrap();
//! assert_plan_empty(&replan.operations);
//! # });
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::descriptor::Scope;
use crate::drift::{AppliedState, DriftReport, DriftStatus};
use crate::error::ProviderError;
use crate::kinds::ObjectKind;
use crate::lifecycle::{ApplyReport, LifecycleAdapter, Refresh, RemoteClient, RemoteMutator, RemoteReader};
use crate::plan::{Operation, ReconciliationPlan};
use crate::resolve::{ObjectReadings, ParameterReading};
use crate::types::{ObjectIdentity, ObjectPlan};
use crate::validation::Diagnostic;
use crate::value::ParamValue;

// =========================================================================
// In-memory platform
// =========================================================================

/// A call received by [`InMemoryPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    /// `describe`
    Describe {
        /// Object kind name.
        kind: String,
        /// Target object.
        object: ObjectIdentity,
    },
    /// `create`
    Create {
        /// Object kind name.
        kind: String,
        /// Target object.
        object: ObjectIdentity,
    },
    /// `apply`
    Apply {
        /// Object kind name.
        kind: String,
        /// Target object.
        object: ObjectIdentity,
        /// The operation.
        operation: Operation,
    },
    /// `rename`
    Rename {
        /// Object kind name.
        kind: String,
        /// Old identity.
        from: ObjectIdentity,
        /// New identity.
        to: ObjectIdentity,
    },
    /// `drop_object`
    Drop {
        /// Object kind name.
        kind: String,
        /// Target object.
        object: ObjectIdentity,
    },
}

/// An error to return from a scheduled `apply` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedFailure {
    /// A network-style failure.
    Transient(String),
    /// A platform refusal.
    Constraint(String),
    /// The object vanished.
    NotFound,
}

impl InjectedFailure {
    fn into_error(self, identity: &ObjectIdentity, operation: &Operation) -> ProviderError {
        match self {
            Self::Transient(message) => ProviderError::Transient(message),
            Self::Constraint(message) => {
                ProviderError::constraint(identity.to_string(), operation.clone(), message)
            },
            Self::NotFound => ProviderError::NotFound(identity.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct StoredObject {
    values: BTreeMap<String, ParamValue>,
    created_with: Vec<(String, ParamValue)>,
}

#[derive(Debug, Default)]
struct PlatformState {
    objects: BTreeMap<(String, ObjectIdentity), StoredObject>,
    container_values: HashMap<String, BTreeMap<String, ParamValue>>,
    account_values: BTreeMap<String, ParamValue>,
    system_defaults: BTreeMap<String, ParamValue>,
    calls: Vec<PlatformCall>,
    apply_count: usize,
    failures: BTreeMap<usize, InjectedFailure>,
    refuse_unset: HashSet<String>,
    blocked_drops: HashSet<ObjectIdentity>,
}

/// A fake remote platform holding parameter values at object, container and
/// account level.
///
/// Objects are keyed by kind name and identity. Container values are keyed by
/// [`ObjectIdentity::container_key`]; a schema-scoped object sees its schema's
/// values first, then its database's.
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    state: AsyncMutex<PlatformState>,
}

impl InMemoryPlatform {
    /// An empty platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure an object exists, with no parameters pinned.
    pub async fn insert_object(&self, kind: &str, identity: &ObjectIdentity) {
        let mut state = self.state.lock().await;
        state
            .objects
            .entry((kind.to_string(), identity.clone()))
            .or_default();
    }

    /// Whether an object exists.
    pub async fn exists(&self, kind: &str, identity: &ObjectIdentity) -> bool {
        let state = self.state.lock().await;
        state
            .objects
            .contains_key(&(kind.to_string(), identity.clone()))
    }

    /// Pin a parameter on an object, creating the object if needed.
    pub async fn set_object_parameter(
        &self,
        kind: &str,
        identity: &ObjectIdentity,
        name: &str,
        value: ParamValue,
    ) {
        let mut state = self.state.lock().await;
        state
            .objects
            .entry((kind.to_string(), identity.clone()))
            .or_default()
            .values
            .insert(name.to_string(), value);
    }

    /// Remove an object-level override.
    pub async fn unset_object_parameter(&self, kind: &str, identity: &ObjectIdentity, name: &str) {
        let mut state = self.state.lock().await;
        if let Some(object) = state.objects.get_mut(&(kind.to_string(), identity.clone())) {
            object.values.remove(name);
        }
    }

    /// The object-level value of a parameter, if pinned.
    pub async fn object_parameter(
        &self,
        kind: &str,
        identity: &ObjectIdentity,
        name: &str,
    ) -> Option<ParamValue> {
        let state = self.state.lock().await;
        state
            .objects
            .get(&(kind.to_string(), identity.clone()))
            .and_then(|object| object.values.get(name).cloned())
    }

    /// Pin a parameter on a container (`db` or `db.schema`).
    pub async fn set_container_parameter(&self, container: &str, name: &str, value: ParamValue) {
        let mut state = self.state.lock().await;
        state
            .container_values
            .entry(container.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Pin a parameter at account level.
    pub async fn set_account_parameter(&self, name: &str, value: ParamValue) {
        let mut state = self.state.lock().await;
        state.account_values.insert(name.to_string(), value);
    }

    /// Remove an account-level value.
    pub async fn unset_account_parameter(&self, name: &str) {
        let mut state = self.state.lock().await;
        state.account_values.remove(name);
    }

    /// Report a different platform default than the descriptor declares.
    pub async fn set_system_default(&self, name: &str, value: ParamValue) {
        let mut state = self.state.lock().await;
        state.system_defaults.insert(name.to_string(), value);
    }

    /// Fail the `nth` apply call from now (1-based) with `failure`.
    pub async fn fail_operation(&self, nth: usize, failure: InjectedFailure) {
        let mut state = self.state.lock().await;
        let at = state.apply_count + nth;
        state.failures.insert(at, failure);
    }

    /// Refuse every unset of `name` with a constraint error.
    pub async fn refuse_unset(&self, name: &str) {
        let mut state = self.state.lock().await;
        state.refuse_unset.insert(name.to_string());
    }

    /// Make drop preconditions fail for an object.
    pub async fn block_drop(&self, identity: &ObjectIdentity) {
        let mut state = self.state.lock().await;
        state.blocked_drops.insert(identity.clone());
    }

    /// Every call received so far.
    pub async fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().await.calls.clone()
    }

    /// Operations received through `apply`, in order, whether or not they succeeded.
    pub async fn applied_operations(&self) -> Vec<Operation> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::Apply { operation, .. } => Some(operation.clone()),
                _ => None,
            })
            .collect()
    }

    /// The parameters an object was created with, if it was created through `create`.
    pub async fn created_with(
        &self,
        kind: &str,
        identity: &ObjectIdentity,
    ) -> Option<Vec<(String, ParamValue)>> {
        let state = self.state.lock().await;
        state
            .objects
            .get(&(kind.to_string(), identity.clone()))
            .map(|object| object.created_with.clone())
    }
}

fn reading(scope: Scope, value: Option<&ParamValue>) -> ParameterReading {
    match value {
        Some(value) => ParameterReading::set(scope, value.clone()),
        None => ParameterReading::inherited(scope),
    }
}

/// Nearest container first: `db.schema`, then `db`.
fn container_keys(identity: &ObjectIdentity) -> Vec<String> {
    let mut keys: Vec<String> = identity.container_key().into_iter().collect();
    if identity.schema.is_some() {
        keys.extend(identity.database.clone());
    }
    keys
}

#[async_trait]
impl RemoteReader for InMemoryPlatform {
    async fn describe(
        &self,
        kind: &ObjectKind,
        identity: &ObjectIdentity,
    ) -> Result<Option<ObjectReadings>, ProviderError> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::Describe {
            kind: kind.name.clone(),
            object: identity.clone(),
        });

        let object = match state.objects.get(&(kind.name.clone(), identity.clone())) {
            Some(object) => object,
            None => return Ok(None),
        };

        let mut readings = ObjectReadings::new();
        for descriptor in kind.parameters.iter() {
            let name = &descriptor.name;
            let mut observed = Vec::new();
            for scope in &descriptor.scope_order {
                match scope {
                    Scope::Object => observed.push(reading(Scope::Object, object.values.get(name))),
                    Scope::Container => {
                        for key in container_keys(identity) {
                            let value = state.container_values.get(&key).and_then(|v| v.get(name));
                            observed.push(reading(Scope::Container, value));
                        }
                    },
                    Scope::Account => {
                        observed.push(reading(Scope::Account, state.account_values.get(name)))
                    },
                    Scope::System => {
                        let default = state
                            .system_defaults
                            .get(name)
                            .unwrap_or(&descriptor.system_default);
                        observed.push(ParameterReading::set(Scope::System, default.clone()));
                    },
                }
            }
            readings.insert(name.clone(), observed);
        }
        Ok(Some(readings))
    }

    async fn check_drop_preconditions(
        &self,
        _kind: &ObjectKind,
        identity: &ObjectIdentity,
    ) -> Result<(), ProviderError> {
        let state = self.state.lock().await;
        if state.blocked_drops.contains(identity) {
            return Err(ProviderError::FailedPrecondition(format!(
                "{} is in use by the current session",
                identity
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteMutator for InMemoryPlatform {
    async fn create(
        &self,
        kind: &ObjectKind,
        identity: &ObjectIdentity,
        parameters: &[(String, ParamValue)],
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::Create {
            kind: kind.name.clone(),
            object: identity.clone(),
        });

        let key = (kind.name.clone(), identity.clone());
        if state.objects.contains_key(&key) {
            return Err(ProviderError::AlreadyExists(identity.to_string()));
        }

        let mut values = BTreeMap::new();
        for (name, value) in parameters {
            let descriptor = kind
                .parameters
                .get(name)
                .ok_or_else(|| ProviderError::RemoteData {
                    parameter: name.clone(),
                    message: format!("not a {} parameter", kind.name),
                })?;
            values.insert(name.clone(), descriptor.normalize(value.clone()));
        }
        state.objects.insert(
            key,
            StoredObject {
                values,
                created_with: parameters.to_vec(),
            },
        );
        Ok(())
    }

    async fn apply(
        &self,
        kind: &ObjectKind,
        identity: &ObjectIdentity,
        operation: &Operation,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::Apply {
            kind: kind.name.clone(),
            object: identity.clone(),
            operation: operation.clone(),
        });
        state.apply_count += 1;

        let call = state.apply_count;
        if let Some(failure) = state.failures.remove(&call) {
            debug!(call, %operation, "injecting failure");
            return Err(failure.into_error(identity, operation));
        }
        if operation.is_unset() && state.refuse_unset.contains(&operation.parameter) {
            return Err(ProviderError::constraint(
                identity.to_string(),
                operation.clone(),
                format!("invalid property '{}' for UNSET", operation.parameter),
            ));
        }

        let descriptor = kind
            .parameters
            .get(&operation.parameter)
            .ok_or_else(|| ProviderError::RemoteData {
                parameter: operation.parameter.clone(),
                message: format!("not a {} parameter", kind.name),
            })?;
        let object = state
            .objects
            .get_mut(&(kind.name.clone(), identity.clone()))
            .ok_or_else(|| ProviderError::NotFound(identity.to_string()))?;
        match &operation.new_value {
            Some(value) => {
                object
                    .values
                    .insert(operation.parameter.clone(), descriptor.normalize(value.clone()));
            },
            None => {
                object.values.remove(&operation.parameter);
            },
        }
        Ok(())
    }

    async fn rename(
        &self,
        kind: &ObjectKind,
        from: &ObjectIdentity,
        to: &ObjectIdentity,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::Rename {
            kind: kind.name.clone(),
            from: from.clone(),
            to: to.clone(),
        });

        let target = (kind.name.clone(), to.clone());
        if state.objects.contains_key(&target) {
            return Err(ProviderError::AlreadyExists(to.to_string()));
        }
        let object = state
            .objects
            .remove(&(kind.name.clone(), from.clone()))
            .ok_or_else(|| ProviderError::NotFound(from.to_string()))?;
        state.objects.insert(target, object);
        Ok(())
    }

    async fn drop_object(
        &self,
        kind: &ObjectKind,
        identity: &ObjectIdentity,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::Drop {
            kind: kind.name.clone(),
            object: identity.clone(),
        });
        state
            .objects
            .remove(&(kind.name.clone(), identity.clone()))
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(identity.to_string()))
    }
}

// =========================================================================
// Configuration cache
// =========================================================================

/// Parsed provider configurations keyed by name.
///
/// Pass one cache to the tests that should share it; separate caches never
/// see each other's entries.
#[derive(Debug, Default)]
pub struct ConfigCache {
    entries: Mutex<HashMap<String, Arc<ProviderConfig>>>,
}

impl ConfigCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached configuration for `key`, parsing `value` on a miss.
    /// A parse failure is not cached.
    pub fn get_or_parse(&self, key: &str, value: Value) -> Result<Arc<ProviderConfig>, ProviderError> {
        if let Some(config) = self.get(key) {
            return Ok(config);
        }
        let config = ProviderConfig::from_value(value)?;
        Ok(self.insert(key, config))
    }

    /// Cache a configuration, replacing any previous entry.
    pub fn insert(&self, key: &str, config: ProviderConfig) -> Arc<ProviderConfig> {
        let config = Arc::new(config);
        self.lock().insert(key.to_string(), Arc::clone(&config));
        config
    }

    /// The cached configuration for `key`.
    pub fn get(&self, key: &str) -> Option<Arc<ProviderConfig>> {
        self.lock().get(key).cloned()
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<ProviderConfig>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// =========================================================================
// Lifecycle harness
// =========================================================================

/// Drives plan/apply/refresh cycles and remembers the last applied state,
/// the way a host framework would between runs.
pub struct LifecycleTester<C> {
    adapter: LifecycleAdapter<C>,
    state: Option<AppliedState>,
}

impl<C: RemoteClient> LifecycleTester<C> {
    /// Create a tester with no recorded state.
    pub fn new(adapter: LifecycleAdapter<C>) -> Self {
        Self {
            adapter,
            state: None,
        }
    }

    /// The wrapped adapter.
    pub fn adapter(&self) -> &LifecycleAdapter<C> {
        &self.adapter
    }

    /// The state recorded by the last apply, refresh or import.
    pub fn state(&self) -> Option<&AppliedState> {
        self.state.as_ref()
    }

    /// Plan a configuration against the recorded state.
    pub async fn plan(&self, config: Value) -> Result<ObjectPlan, ProviderError> {
        let desired = self.adapter.desired_from_config(&config)?;
        self.adapter.plan(self.state.as_ref(), &desired).await
    }

    /// Plan and apply a configuration, recording the re-read state even when
    /// an operation failed.
    pub async fn apply(&mut self, config: Value) -> Result<ApplyReport, ProviderError> {
        let desired = self.adapter.desired_from_config(&config)?;
        let plan = self.adapter.plan(self.state.as_ref(), &desired).await?;
        let report = self.adapter.apply(plan, &desired).await?;
        if let Some(state) = &report.state {
            self.state = Some(state.clone());
        }
        Ok(report)
    }

    /// Apply a configuration, fail on partial failure, and return the
    /// follow-up plan. A converged object yields an empty one.
    pub async fn converge(&mut self, config: Value) -> Result<ObjectPlan, ProviderError> {
        self.apply(config.clone()).await?.into_result()?;
        self.plan(config).await
    }

    /// Refresh the recorded state. Forgets it if the object is gone.
    pub async fn refresh(&mut self) -> Result<Option<Refresh>, ProviderError> {
        let previous = self
            .state
            .as_ref()
            .ok_or_else(|| ProviderError::FailedPrecondition("nothing has been applied".to_string()))?;
        let refresh = self.adapter.refresh(previous).await?;
        self.state = refresh.as_ref().map(|r| r.applied.clone());
        Ok(refresh)
    }

    /// Adopt an existing object.
    pub async fn import(&mut self, identity: &ObjectIdentity) -> Result<AppliedState, ProviderError> {
        let state = self.adapter.import(identity).await?;
        self.state = Some(state.clone());
        Ok(state)
    }

    /// Drop the recorded object and forget its state.
    pub async fn destroy(&mut self) -> Result<(), ProviderError> {
        let previous = self
            .state
            .take()
            .ok_or_else(|| ProviderError::FailedPrecondition("nothing has been applied".to_string()))?;
        if let Err(error) = self.adapter.delete(&previous.identity).await {
            self.state = Some(previous);
            return Err(error);
        }
        Ok(())
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan has no operations.
///
/// # Panics
///
/// Panics if the plan has any operations.
pub fn assert_plan_empty(plan: &ReconciliationPlan) {
    assert!(
        plan.is_empty(),
        "Expected no operations, but got {}: {:?}",
        plan.len(),
        plan.iter().map(ToString::to_string).collect::<Vec<_>>()
    );
}

/// Assert that a plan sets `parameter` to `value`.
///
/// # Panics
///
/// Panics if there is no such set.
pub fn assert_plan_sets(plan: &ReconciliationPlan, parameter: &str, value: impl Into<ParamValue>) {
    let expected = Operation::set(parameter, value.into());
    assert!(
        plan.iter().any(|op| *op == expected),
        "Expected plan to contain '{}', got {:?}",
        expected,
        plan.iter().map(ToString::to_string).collect::<Vec<_>>()
    );
}

/// Assert that a plan unsets `parameter`.
///
/// # Panics
///
/// Panics if there is no such unset.
pub fn assert_plan_unsets(plan: &ReconciliationPlan, parameter: &str) {
    let expected = Operation::unset(parameter);
    assert!(
        plan.iter().any(|op| *op == expected),
        "Expected plan to contain '{}', got {:?}",
        expected,
        plan.iter().map(ToString::to_string).collect::<Vec<_>>()
    );
}

/// Assert that `parameter` drifted.
///
/// # Panics
///
/// Panics if the parameter was not compared or did not drift.
pub fn assert_drifted(report: &DriftReport, parameter: &str) {
    assert!(
        matches!(report.status(parameter), Some(DriftStatus::Drifted { .. })),
        "Expected '{}' to have drifted, got {:?}",
        parameter,
        report.status(parameter)
    );
}

/// Assert that nothing drifted.
///
/// # Panics
///
/// Panics if any parameter drifted.
pub fn assert_no_drift(report: &DriftReport) {
    assert!(
        !report.has_drift(),
        "Expected no drift, but got: {:?}",
        report.changes()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if any diagnostic is an error.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that some error diagnostic's summary contains `substring`.
///
/// # Panics
///
/// Panics if no error matches.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    assert!(
        diagnostics
            .iter()
            .any(|d| d.is_error() && d.summary.contains(substring)),
        "Expected an error containing '{}', got {:?}",
        substring,
        diagnostics.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}
