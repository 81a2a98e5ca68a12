//! Object lifecycle adapter.
//!
//! The adapter drives one object kind through create, read, update and delete
//! against a remote platform. It reads remote state, resolves it, detects
//! drift, plans, executes the plan in the kind's declared order and re-reads to
//! confirm convergence.
//!
//! The remote platform is reached only through [`RemoteReader`] and
//! [`RemoteMutator`]; the client is handed to the adapter when it is built.
//!
//! ```text
//!            create                 update
//! Absent ──────────► Creating ──► Present ◄──────► Updating
//!    ▲                               │
//!    └──────────── Destroying ◄──────┘ delete
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::ProviderConfig;
use crate::drift::{detect_drift, AppliedState, DriftReport};
use crate::error::ProviderError;
use crate::kinds::ObjectKind;
use crate::plan::{plan as plan_operations, Operation, ReconciliationPlan};
use crate::resolve::{resolve_all, ObjectReadings, ResolvedState};
use crate::types::{DesiredObjectState, ObjectAction, ObjectIdentity, ObjectPlan, ParameterChange};
use crate::value::ParamValue;

/// Reads parameter state from the remote platform.
#[async_trait]
pub trait RemoteReader: Send + Sync {
    /// Describe an object: readings for each parameter at every reported scope.
    ///
    /// Returns `Ok(None)` when the object does not exist.
    async fn describe(
        &self,
        kind: &ObjectKind,
        identity: &ObjectIdentity,
    ) -> Result<Option<ObjectReadings>, ProviderError>;

    /// Check kind-specific conditions that must hold before a drop, such as
    /// the object not being the session's current warehouse.
    async fn check_drop_preconditions(
        &self,
        kind: &ObjectKind,
        identity: &ObjectIdentity,
    ) -> Result<(), ProviderError> {
        let _ = (kind, identity);
        Ok(())
    }
}

/// Mutates the remote platform.
#[async_trait]
pub trait RemoteMutator: Send + Sync {
    /// Create an object with the given creation-time parameters.
    async fn create(
        &self,
        kind: &ObjectKind,
        identity: &ObjectIdentity,
        parameters: &[(String, ParamValue)],
    ) -> Result<(), ProviderError>;

    /// Apply one set or unset.
    async fn apply(
        &self,
        kind: &ObjectKind,
        identity: &ObjectIdentity,
        operation: &Operation,
    ) -> Result<(), ProviderError>;

    /// Rename an object in place.
    async fn rename(
        &self,
        kind: &ObjectKind,
        from: &ObjectIdentity,
        to: &ObjectIdentity,
    ) -> Result<(), ProviderError>;

    /// Drop an object.
    async fn drop_object(
        &self,
        kind: &ObjectKind,
        identity: &ObjectIdentity,
    ) -> Result<(), ProviderError>;
}

/// A client that can both read and mutate.
pub trait RemoteClient: RemoteReader + RemoteMutator {}

impl<T: RemoteReader + RemoteMutator> RemoteClient for T {}

/// Lifecycle state of a managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectState {
    /// No remote object.
    Absent,
    /// Creation in progress.
    Creating,
    /// The object exists.
    Present,
    /// Operations are being applied.
    Updating,
    /// Drop in progress.
    Destroying,
}

impl ObjectState {
    /// Whether the move to `to` is legal.
    pub fn can_transition(self, to: ObjectState) -> bool {
        use ObjectState::*;
        matches!(
            (self, to),
            (Absent, Creating)
                | (Creating, Present)
                | (Creating, Absent)
                | (Present, Updating)
                | (Updating, Present)
                | (Present, Destroying)
                | (Destroying, Absent)
                | (Destroying, Present)
        )
    }

    /// Move to `to`, or fail with [`ProviderError::InvalidTransition`].
    pub fn transition(self, to: ObjectState) -> Result<ObjectState, ProviderError> {
        if self.can_transition(to) {
            debug!(from = %self, %to, "lifecycle transition");
            Ok(to)
        } else {
            Err(ProviderError::InvalidTransition { from: self, to })
        }
    }

    /// Whether the state is one an operation may end in.
    pub fn is_terminal(self) -> bool {
        matches!(self, ObjectState::Absent | ObjectState::Present)
    }
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Present => "present",
            Self::Updating => "updating",
            Self::Destroying => "destroying",
        };
        write!(f, "{}", name)
    }
}

/// The operation that failed and why.
#[derive(Debug)]
pub struct OperationFailure {
    /// The failed operation.
    pub operation: Operation,
    /// The error, unchanged from the remote boundary.
    pub error: ProviderError,
}

/// Outcome of an apply. A failure partway through is reported here rather
/// than as an error, together with freshly re-read state.
#[derive(Debug)]
pub struct ApplyReport {
    /// The object's identity after the apply.
    pub identity: ObjectIdentity,
    /// What was done to the object as a whole.
    pub action: ObjectAction,
    /// Operations that succeeded, in order.
    pub applied: Vec<Operation>,
    /// The operation that failed, if any. Nothing after it was attempted.
    pub failure: Option<OperationFailure>,
    /// State re-read after the apply; `None` if that read failed too.
    pub state: Option<AppliedState>,
    /// Final lifecycle state.
    pub object_state: ObjectState,
    /// Whether a re-plan against re-read state was empty (`None` if not verified).
    pub converged: Option<bool>,
}

impl ApplyReport {
    /// Whether every planned operation succeeded.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// The recorded state, or the original error of the failed operation.
    pub fn into_result(self) -> Result<AppliedState, ProviderError> {
        if let Some(failure) = self.failure {
            return Err(failure.error);
        }
        let identity = self.identity;
        self.state
            .ok_or_else(|| ProviderError::NotFound(identity.to_string()))
    }
}

/// Freshly observed state compared with the last apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refresh {
    /// Resolved parameters as observed now.
    pub current: ResolvedState,
    /// Changes made outside the tool.
    pub drift: DriftReport,
    /// The snapshot to record in place of the previous one.
    pub applied: AppliedState,
}

/// Drives one object kind against a remote client.
pub struct LifecycleAdapter<C> {
    client: Arc<C>,
    kind: ObjectKind,
    config: ProviderConfig,
}

impl<C: RemoteClient> LifecycleAdapter<C> {
    /// Create an adapter.
    pub fn new(client: Arc<C>, kind: ObjectKind, config: ProviderConfig) -> Self {
        Self {
            client,
            kind,
            config,
        }
    }

    /// The object kind.
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// The provider configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// The remote client.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Parse identity and parameters from a resource configuration.
    pub fn desired_from_config(&self, config: &Value) -> Result<DesiredObjectState, ProviderError> {
        let identity = self.kind.identity_from_config(config)?;
        DesiredObjectState::from_config(identity, &self.kind.parameters, config)
    }

    /// Read and resolve an object. `Ok(None)` if it does not exist.
    #[instrument(skip_all, fields(kind = %self.kind.name, object = %identity))]
    pub async fn read(
        &self,
        identity: &ObjectIdentity,
    ) -> Result<Option<ResolvedState>, ProviderError> {
        let readings = self.client.describe(&self.kind, identity).await?;
        Ok(readings.map(|readings| {
            resolve_all(
                &self.kind.parameters,
                &readings,
                self.config.report_scope_anomalies,
            )
        }))
    }

    /// Re-read an object and compare with the last apply. `Ok(None)` if the
    /// object is gone.
    #[instrument(skip_all, fields(kind = %self.kind.name, object = %previous.identity))]
    pub async fn refresh(&self, previous: &AppliedState) -> Result<Option<Refresh>, ProviderError> {
        let current = match self.read(&previous.identity).await? {
            Some(current) => current,
            None => {
                info!("object no longer exists");
                return Ok(None);
            },
        };

        let drift = detect_drift(previous, &current);
        for (name, old, new) in drift.drifted() {
            warn!(
                parameter = name,
                old = %old.value,
                old_scope = %old.governing_scope,
                new = %new.value,
                new_scope = %new.governing_scope,
                "detected external change"
            );
        }

        let applied = AppliedState::capture(
            previous.identity.clone(),
            &current,
            previous.parameters.keys().map(String::as_str),
        );
        Ok(Some(Refresh {
            current,
            drift,
            applied,
        }))
    }

    /// Plan the changes that bring the object to the desired state.
    ///
    /// With no previous state the object must not exist yet; adopting an
    /// existing object goes through [`LifecycleAdapter::import`]. If the
    /// recorded object has vanished, the plan is a `Create` under the desired
    /// identity. Otherwise a container move, or a rename on a kind that cannot
    /// rename in place, plans a `Replace`.
    ///
    /// Drift against `previous` is reported on the plan but never changes the
    /// operations, which depend only on the desired and current state.
    ///
    /// # Arguments
    ///
    /// * `previous` - The state recorded after the last apply, if any
    /// * `desired` - The configured state
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use dataplat_params::{LifecycleAdapter, ObjectAction, ObjectKind, ProviderConfig};
    /// use dataplat_params::testing::InMemoryPlatform;
    /// use serde_json::json;
    ///
    /// # tokio_test::block_on(async {
    /// let adapter = LifecycleAdapter::new(
    ///     Arc::new(InMemoryPlatform::new()),
    ///     ObjectKind::warehouse(),
    ///     ProviderConfig::default(),
    /// );
    /// let first = adapter.desired_from_config(&json!({"name": "WH", "auto_suspend": 60})).unwrap();
    /// let state = adapter.create(&first).await.unwrap().into_result().unwrap();
    ///
    /// let second = adapter.desired_from_config(&json!({"name": "WH", "auto_suspend": 0})).unwrap();
    /// let plan = adapter.plan(Some(&state), &second).await.unwrap();
    /// assert_eq!(plan.action, ObjectAction::Update);
    /// assert_eq!(plan.operations.len(), 1);
    /// # });
    /// ```
    #[instrument(skip_all, fields(kind = %self.kind.name, object = %desired.identity))]
    pub async fn plan(
        &self,
        previous: Option<&AppliedState>,
        desired: &DesiredObjectState,
    ) -> Result<ObjectPlan, ProviderError> {
        let previous = match previous {
            Some(previous) => previous,
            None => {
                if self.client.describe(&self.kind, &desired.identity).await?.is_some() {
                    return Err(ProviderError::AlreadyExists(desired.identity.to_string()));
                }
                return Ok(self.creation_plan(desired, ObjectAction::Create, DriftReport::empty()));
            },
        };

        // A vanished object is recreated, whatever the new identity.
        let refresh = match self.refresh(previous).await? {
            Some(refresh) => refresh,
            None => {
                info!(previous = %previous.identity, "object no longer exists; planning create");
                return Ok(self.creation_plan(desired, ObjectAction::Create, DriftReport::empty()));
            },
        };

        if self.kind.requires_replace(&previous.identity, &desired.identity) {
            let action = ObjectAction::Replace {
                from: previous.identity.clone(),
            };
            return Ok(self.creation_plan(desired, action, refresh.drift));
        }

        let operations = plan_operations(&self.kind.parameters, desired, &refresh.current)
            .ordered(self.kind.execution_order);
        let changes = operations
            .iter()
            .map(|op| change_for(op, &refresh.current))
            .collect();
        let action = if previous.identity.name != desired.identity.name {
            ObjectAction::Rename {
                from: previous.identity.clone(),
            }
        } else if operations.is_empty() {
            ObjectAction::NoOp
        } else {
            ObjectAction::Update
        };
        debug!(operations = operations.len(), ?action, "plan computed");

        Ok(ObjectPlan {
            identity: desired.identity.clone(),
            action,
            drift: refresh.drift,
            operations,
            changes,
        })
    }

    /// Create the object with only its explicit parameters, then re-read.
    #[instrument(skip_all, fields(kind = %self.kind.name, object = %desired.identity))]
    pub async fn create(&self, desired: &DesiredObjectState) -> Result<ApplyReport, ProviderError> {
        self.create_as(desired, ObjectAction::Create).await
    }

    async fn create_as(
        &self,
        desired: &DesiredObjectState,
        action: ObjectAction,
    ) -> Result<ApplyReport, ProviderError> {
        let creating = ObjectState::Absent.transition(ObjectState::Creating)?;
        let parameters = desired.explicit_parameters(&self.kind.parameters);
        info!(parameters = parameters.len(), "creating object");

        if let Err(error) = self
            .client
            .create(&self.kind, &desired.identity, &parameters)
            .await
        {
            creating.transition(ObjectState::Absent)?;
            warn!(%error, "creation failed");
            return Err(error);
        }

        let present = creating.transition(ObjectState::Present)?;
        let applied = parameters
            .into_iter()
            .map(|(name, value)| Operation::set(name, value))
            .collect();
        self.finish(desired, action, applied, None, present).await
    }

    /// Plan and apply in one step.
    pub async fn update(
        &self,
        previous: &AppliedState,
        desired: &DesiredObjectState,
    ) -> Result<ApplyReport, ProviderError> {
        let plan = self.plan(Some(previous), desired).await?;
        self.apply(plan, desired).await
    }

    /// Apply a plan computed by [`LifecycleAdapter::plan`].
    ///
    /// Unsets the kind cannot perform are rejected before anything runs.
    #[instrument(skip_all, fields(kind = %self.kind.name, object = %desired.identity))]
    pub async fn apply(
        &self,
        plan: ObjectPlan,
        desired: &DesiredObjectState,
    ) -> Result<ApplyReport, ProviderError> {
        match plan.action.clone() {
            ObjectAction::Create => self.create(desired).await,
            ObjectAction::Replace { from } => {
                info!(from = %from, "replacing object");
                self.delete(&from).await?;
                self.create_as(desired, ObjectAction::Replace { from }).await
            },
            ObjectAction::NoOp => {
                self.finish(desired, ObjectAction::NoOp, Vec::new(), None, ObjectState::Present)
                    .await
            },
            ObjectAction::Rename { from } => {
                self.check_constraints(&plan)?;
                let updating = ObjectState::Present.transition(ObjectState::Updating)?;
                info!(from = %from, "renaming object");
                if let Err(error) = self.client.rename(&self.kind, &from, &desired.identity).await {
                    updating.transition(ObjectState::Present)?;
                    return Err(error);
                }
                self.execute(plan, desired, updating).await
            },
            ObjectAction::Update => {
                self.check_constraints(&plan)?;
                let updating = ObjectState::Present.transition(ObjectState::Updating)?;
                self.execute(plan, desired, updating).await
            },
        }
    }

    /// Drop the object after its kind-specific preconditions pass.
    ///
    /// An object the platform no longer knows counts as dropped.
    #[instrument(skip_all, fields(kind = %self.kind.name, object = %identity))]
    pub async fn delete(&self, identity: &ObjectIdentity) -> Result<(), ProviderError> {
        self.client
            .check_drop_preconditions(&self.kind, identity)
            .await?;
        let destroying = ObjectState::Present.transition(ObjectState::Destroying)?;
        match self.client.drop_object(&self.kind, identity).await {
            Ok(()) => {
                destroying.transition(ObjectState::Absent)?;
                info!("object dropped");
                Ok(())
            },
            Err(ProviderError::NotFound(_)) => {
                destroying.transition(ObjectState::Absent)?;
                info!("object already absent");
                Ok(())
            },
            Err(error) => {
                destroying.transition(ObjectState::Present)?;
                Err(error)
            },
        }
    }

    /// Adopt an existing object. Only parameters the object pins itself are
    /// recorded, so adoption never claims values inherited from elsewhere.
    #[instrument(skip_all, fields(kind = %self.kind.name, object = %identity))]
    pub async fn import(&self, identity: &ObjectIdentity) -> Result<AppliedState, ProviderError> {
        let current = self
            .read(identity)
            .await?
            .ok_or_else(|| ProviderError::NotFound(identity.to_string()))?;
        let owned: Vec<&str> = current
            .iter()
            .filter(|(_, resolved)| resolved.is_object_level())
            .map(|(name, _)| name.as_str())
            .collect();
        info!(parameters = owned.len(), "imported object");
        Ok(AppliedState::capture(identity.clone(), &current, owned))
    }

    fn creation_plan(
        &self,
        desired: &DesiredObjectState,
        action: ObjectAction,
        drift: DriftReport,
    ) -> ObjectPlan {
        let parameters = desired.explicit_parameters(&self.kind.parameters);
        let changes = parameters
            .iter()
            .map(|(name, value)| ParameterChange::added(name.clone(), value.to_json()))
            .collect();
        let operations = ReconciliationPlan::from_operations(
            parameters
                .into_iter()
                .map(|(name, value)| Operation::set(name, value))
                .collect(),
        );
        ObjectPlan {
            identity: desired.identity.clone(),
            action,
            drift,
            operations,
            changes,
        }
    }

    fn check_constraints(&self, plan: &ObjectPlan) -> Result<(), ProviderError> {
        for op in plan.operations.iter().filter(|op| op.is_unset()) {
            let unsettable = self
                .kind
                .parameters
                .get(&op.parameter)
                .map_or(true, |d| d.unsettable_at_object);
            if !unsettable {
                return Err(ProviderError::constraint(
                    plan.identity.to_string(),
                    op.clone(),
                    format!(
                        "{} '{}' cannot be unset at object scope; configure an explicit value",
                        self.kind.name, op.parameter
                    ),
                ));
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        plan: ObjectPlan,
        desired: &DesiredObjectState,
        updating: ObjectState,
    ) -> Result<ApplyReport, ProviderError> {
        let mut applied = Vec::with_capacity(plan.operations.len());
        let mut failure = None;
        for op in plan.operations {
            debug!(operation = %op, "applying operation");
            match self.client.apply(&self.kind, &desired.identity, &op).await {
                Ok(()) => applied.push(op),
                Err(error) => {
                    warn!(
                        operation = %op,
                        %error,
                        applied = applied.len(),
                        "operation failed; re-reading remote state"
                    );
                    failure = Some(OperationFailure {
                        operation: op,
                        error,
                    });
                    break;
                },
            }
        }
        let present = updating.transition(ObjectState::Present)?;
        self.finish(desired, plan.action, applied, failure, present)
            .await
    }

    async fn finish(
        &self,
        desired: &DesiredObjectState,
        action: ObjectAction,
        applied: Vec<Operation>,
        failure: Option<OperationFailure>,
        object_state: ObjectState,
    ) -> Result<ApplyReport, ProviderError> {
        let current = match self.read(&desired.identity).await {
            Ok(Some(current)) => Some(current),
            Ok(None) if failure.is_none() => {
                return Err(ProviderError::NotFound(desired.identity.to_string()))
            },
            Ok(None) => None,
            Err(error) if failure.is_none() => return Err(error),
            Err(error) => {
                warn!(%error, "re-read after failed operation also failed");
                None
            },
        };

        let converged = match (&current, &failure) {
            (Some(current), None) if self.config.verify_convergence => {
                let remaining = plan_operations(&self.kind.parameters, desired, current);
                if !remaining.is_empty() {
                    warn!(
                        remaining = remaining.len(),
                        "object did not converge after apply"
                    );
                }
                Some(remaining.is_empty())
            },
            (_, Some(_)) => Some(false),
            _ => None,
        };

        let state = current.as_ref().map(|current| {
            AppliedState::capture(desired.identity.clone(), current, desired.managed_names())
        });

        Ok(ApplyReport {
            identity: desired.identity.clone(),
            action,
            applied,
            failure,
            state,
            object_state,
            converged,
        })
    }
}

fn change_for(op: &Operation, current: &ResolvedState) -> ParameterChange {
    let before = current.get(&op.parameter).map(|r| r.value.to_json());
    let after = op.new_value.as_ref().map(ParamValue::to_json);
    ParameterChange::new(op.parameter.clone(), before, after)
}
