//! Data Platform Parameter Reconciliation
//!
//! This crate provides the parameter engine behind a declarative provider for
//! a cloud data platform. Remote objects (warehouses, databases, schemas,
//! tasks) expose parameters that can be pinned at several scopes: on the
//! object itself, on a container such as a database, at account level, or left
//! at the platform's system default. For each parameter the crate works out
//! the effective value and the scope that governs it, whether it changed
//! outside the tool, and the minimal `SET`/`UNSET` sequence that converges it
//! to configuration.
//!
//! # Overview
//!
//! - **Value model** ([`value`]): typed values and the tri-state slot that
//!   keeps "not managed", "use the remote default" and "explicitly `0`" apart
//! - **Descriptors** ([`descriptor`], [`kinds`]): per-kind parameter tables
//!   with scope orders, defaults and constraints
//! - **Resolver** ([`resolve`]): effective value and governing scope
//! - **Drift detector** ([`drift`]): comparison with the last applied snapshot
//! - **Planner** ([`plan`]): least-surprise `SET`/`UNSET` planning
//! - **Lifecycle adapter** ([`lifecycle`]): create, read, update, delete and
//!   import against a remote client
//! - **Error types**, **configuration**, **logging** and **testing** helpers
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use dataplat_params::{LifecycleAdapter, ObjectKind, ProviderConfig};
//! use dataplat_params::testing::InMemoryPlatform;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let adapter = LifecycleAdapter::new(
//!     Arc::new(InMemoryPlatform::new()),
//!     ObjectKind::warehouse(),
//!     ProviderConfig::default(),
//! );
//!
//! let desired = adapter
//!     .desired_from_config(&json!({"name": "ETL_WH", "auto_suspend": 0}))
//!     .unwrap();
//! let plan = adapter.plan(None, &desired).await.unwrap();
//! let state = adapter.apply(plan, &desired).await.unwrap().into_result().unwrap();
//!
//! // Zero is a managed value, pinned on the warehouse itself.
//! let auto_suspend = state.get("auto_suspend").unwrap();
//! assert_eq!(auto_suspend.value.as_int(), Some(0));
//! assert!(auto_suspend.is_object_level());
//! # });
//! ```
//!
//! # Planning Rules
//!
//! For each parameter, given the desired slot and the current resolution:
//!
//! - **Unset**: never touched
//! - **UseDefault**, governed at object scope: `UNSET`
//! - **UseDefault**, governed elsewhere: nothing
//! - **Explicit(v)**, already `v` at object scope: nothing
//! - **Explicit(v)**, otherwise: `SET v`, even when an inherited value already
//!   equals `v`, so the object stops following its container

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod descriptor;
pub mod drift;
pub mod error;
pub mod kinds;
pub mod lifecycle;
pub mod logging;
pub mod plan;
pub mod resolve;
pub mod testing;
pub mod types;
pub mod validation;
pub mod value;

// Re-export main types at crate root
pub use config::ProviderConfig;
pub use descriptor::{DataType, DescriptorTable, ParameterDescriptor, Scope};
pub use drift::{detect_drift, AppliedState, DriftReport, DriftStatus};
pub use error::ProviderError;
pub use kinds::{ObjectKind, Placement, RenamePolicy};
pub use lifecycle::{
    ApplyReport, LifecycleAdapter, ObjectState, RemoteClient, RemoteMutator, RemoteReader,
};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use plan::{plan, ExecutionOrder, Operation, OperationKind, ReconciliationPlan};
pub use resolve::{resolve, resolve_all, ParameterReading, ResolvedParameter, ResolvedState};
pub use types::{DesiredObjectState, ObjectAction, ObjectIdentity, ObjectPlan, ParameterChange};
pub use validation::{is_valid, validate, validate_result, Diagnostic, DiagnosticSeverity};
pub use value::{ParamValue, TriState};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
