//! Object kinds: descriptor tables plus the lifecycle policies that differ
//! between kinds (rename handling, execution order, level names).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::{DescriptorTable, ParameterDescriptor, Scope};
use crate::error::ProviderError;
use crate::plan::ExecutionOrder;
use crate::types::ObjectIdentity;

/// How a name change is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenamePolicy {
    /// The platform renames the object in place.
    InPlace,
    /// The object is dropped and recreated under the new name.
    ForceReplace,
}

/// Where an object lives, which decides which identity fields it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Directly in the account.
    Account,
    /// Inside a database.
    Database,
    /// Inside a schema.
    Schema,
}

/// Everything the lifecycle adapter needs to know about one kind of object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectKind {
    /// Kind name, e.g. `warehouse`.
    pub name: String,
    /// Where objects of this kind live.
    pub placement: Placement,
    /// Parameter descriptors.
    pub parameters: DescriptorTable,
    /// How renames are handled.
    pub rename_policy: RenamePolicy,
    /// How planned operations are ordered for execution.
    pub execution_order: ExecutionOrder,
    /// Platform level names and the scope each maps to.
    pub levels: Vec<(String, Scope)>,
}

/// Kind names with built-in tables.
pub const KNOWN_KINDS: &[&str] = &["warehouse", "database", "schema", "task"];

impl ObjectKind {
    /// Create a kind with in-place renames and plan-order execution.
    pub fn new(name: impl Into<String>, placement: Placement, parameters: DescriptorTable) -> Self {
        Self {
            name: name.into(),
            placement,
            parameters,
            rename_policy: RenamePolicy::InPlace,
            execution_order: ExecutionOrder::AsPlanned,
            levels: vec![("ACCOUNT".to_string(), Scope::Account)],
        }
    }

    /// Set the rename policy.
    pub fn with_rename_policy(mut self, policy: RenamePolicy) -> Self {
        self.rename_policy = policy;
        self
    }

    /// Set the execution order.
    pub fn with_execution_order(mut self, order: ExecutionOrder) -> Self {
        self.execution_order = order;
        self
    }

    /// Map a platform level name to a scope.
    pub fn with_level(mut self, level: impl Into<String>, scope: Scope) -> Self {
        self.levels.push((level.into().to_uppercase(), scope));
        self
    }

    /// The scope a platform level name refers to.
    pub fn scope_for_level(&self, level: &str) -> Option<Scope> {
        let level = level.trim().to_uppercase();
        self.levels
            .iter()
            .find(|(name, _)| *name == level)
            .map(|(_, scope)| *scope)
    }

    /// Look up a built-in kind by name.
    pub fn lookup(name: &str) -> Result<Self, ProviderError> {
        match name {
            "warehouse" => Ok(Self::warehouse()),
            "database" => Ok(Self::database()),
            "schema" => Ok(Self::schema()),
            "task" => Ok(Self::task()),
            other => Err(ProviderError::UnknownObjectKind(other.to_string())),
        }
    }

    /// Build the identity from configuration attributes.
    pub fn identity_from_config(&self, config: &Value) -> Result<ObjectIdentity, ProviderError> {
        let field = |key: &str| -> Result<String, ProviderError> {
            match config.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
                Some(other) => Err(ProviderError::validation(
                    key,
                    other.to_string(),
                    "expected a non-empty string",
                )),
                None => Err(ProviderError::validation(key, "null", "required attribute")),
            }
        };
        let name = field("name")?;
        let identity = match self.placement {
            Placement::Account => ObjectIdentity::account_level(name),
            Placement::Database => ObjectIdentity::in_database(field("database")?, name),
            Placement::Schema => {
                ObjectIdentity::in_schema(field("database")?, field("schema")?, name)
            },
        };
        Ok(identity)
    }

    /// Whether moving from `from` to `to` needs a drop and recreate.
    pub fn requires_replace(&self, from: &ObjectIdentity, to: &ObjectIdentity) -> bool {
        if !from.same_container(to) {
            return true;
        }
        from.name != to.name && self.rename_policy == RenamePolicy::ForceReplace
    }

    /// Warehouses: sizing, scaling and suspension settings.
    pub fn warehouse() -> Self {
        let parameters = DescriptorTable::new().with_parameters([
            ParameterDescriptor::enumeration("warehouse_type", &["STANDARD", "SNOWPARK-OPTIMIZED"], "STANDARD")
                .case_insensitive(),
            ParameterDescriptor::enumeration("warehouse_size", WAREHOUSE_SIZES, "XSMALL")
                .case_insensitive()
                .not_unsettable()
                .with_description("Size is reset by setting it; the platform has no UNSET for it."),
            ParameterDescriptor::int("max_cluster_count", 1).with_range(1, 10),
            ParameterDescriptor::int("min_cluster_count", 1).with_range(1, 10),
            ParameterDescriptor::enumeration("scaling_policy", &["STANDARD", "ECONOMY"], "STANDARD")
                .case_insensitive(),
            ParameterDescriptor::int("auto_suspend", 600)
                .with_range(0, i64::MAX)
                .with_description("Seconds of inactivity before suspending; 0 never suspends."),
            ParameterDescriptor::bool("auto_resume", true),
            ParameterDescriptor::string("resource_monitor", ""),
            ParameterDescriptor::string("comment", ""),
            ParameterDescriptor::bool("enable_query_acceleration", false),
            ParameterDescriptor::int("query_acceleration_max_scale_factor", 8).with_range(0, 100),
            ParameterDescriptor::int("max_concurrency_level", 8)
                .with_scopes(&[Scope::Object, Scope::Account])
                .with_range(1, i64::MAX),
            ParameterDescriptor::int("statement_queue_timeout_in_seconds", 0)
                .with_scopes(&[Scope::Object, Scope::Account])
                .with_range(0, i64::MAX),
            ParameterDescriptor::int("statement_timeout_in_seconds", 172800)
                .with_scopes(&[Scope::Object, Scope::Account])
                .with_range(0, 604800),
        ]);
        Self::new("warehouse", Placement::Account, parameters)
            .with_execution_order(ExecutionOrder::UnsetsFirst)
            .with_level("WAREHOUSE", Scope::Object)
    }

    /// Databases: retention, logging and task defaults inherited by children.
    pub fn database() -> Self {
        let parameters = DescriptorTable::new()
            .with_parameter(ParameterDescriptor::string("comment", ""))
            .with_parameters(container_parameters(&[Scope::Object, Scope::Account]));
        Self::new("database", Placement::Account, parameters).with_level("DATABASE", Scope::Object)
    }

    /// Schemas: database parameters plus managed access, inheriting from the database.
    pub fn schema() -> Self {
        let parameters = DescriptorTable::new()
            .with_parameter(ParameterDescriptor::string("comment", ""))
            .with_parameter(ParameterDescriptor::bool("with_managed_access", false))
            .with_parameters(container_parameters(&[
                Scope::Object,
                Scope::Container,
                Scope::Account,
            ]));
        Self::new("schema", Placement::Database, parameters)
            .with_level("SCHEMA", Scope::Object)
            .with_level("DATABASE", Scope::Container)
    }

    /// Tasks: scheduling plus session parameters inherited through schema and database.
    pub fn task() -> Self {
        let inherited = &[Scope::Object, Scope::Container, Scope::Account];
        let parameters = DescriptorTable::new().with_parameters([
            ParameterDescriptor::string("warehouse", ""),
            ParameterDescriptor::string("schedule", ""),
            ParameterDescriptor::string("config", ""),
            ParameterDescriptor::bool("allow_overlapping_execution", false),
            ParameterDescriptor::string("error_integration", ""),
            ParameterDescriptor::string("comment", ""),
            ParameterDescriptor::enumeration(
                "user_task_managed_initial_warehouse_size",
                WAREHOUSE_SIZES,
                "MEDIUM",
            )
            .case_insensitive()
            .with_scopes(inherited),
            ParameterDescriptor::int("user_task_timeout_ms", 3600000)
                .with_scopes(inherited)
                .with_range(0, 86400000),
            ParameterDescriptor::int("suspend_task_after_num_failures", 10)
                .with_scopes(inherited)
                .with_range(0, i64::MAX),
            ParameterDescriptor::int("task_auto_retry_attempts", 0)
                .with_scopes(inherited)
                .with_range(0, 30),
            log_level().with_scopes(inherited),
            trace_level().with_scopes(inherited),
        ]);
        // Task parameters may be pinned on the schema or the database; both
        // are outside the task's ownership, so both map to the container scope.
        Self::new("task", Placement::Schema, parameters)
            .with_rename_policy(RenamePolicy::ForceReplace)
            .with_execution_order(ExecutionOrder::SetsFirst)
            .with_level("TASK", Scope::Object)
            .with_level("SCHEMA", Scope::Container)
            .with_level("DATABASE", Scope::Container)
    }
}

const WAREHOUSE_SIZES: &[&str] = &[
    "XSMALL", "SMALL", "MEDIUM", "LARGE", "XLARGE", "XXLARGE", "XXXLARGE", "X4LARGE", "X5LARGE",
    "X6LARGE",
];

fn log_level() -> ParameterDescriptor {
    ParameterDescriptor::enumeration(
        "log_level",
        &["TRACE", "DEBUG", "INFO", "WARN", "ERROR", "FATAL", "OFF"],
        "OFF",
    )
    .case_insensitive()
}

fn trace_level() -> ParameterDescriptor {
    ParameterDescriptor::enumeration("trace_level", &["ALWAYS", "ON_EVENT", "OFF"], "OFF")
        .case_insensitive()
}

fn container_parameters(scopes: &[Scope]) -> Vec<ParameterDescriptor> {
    vec![
        ParameterDescriptor::int("data_retention_time_in_days", 1)
            .with_scopes(scopes)
            .with_range(0, 90),
        ParameterDescriptor::int("max_data_extension_time_in_days", 14)
            .with_scopes(scopes)
            .with_range(0, 90),
        ParameterDescriptor::string("external_volume", "").with_scopes(scopes),
        ParameterDescriptor::string("catalog", "").with_scopes(scopes),
        ParameterDescriptor::bool("replace_invalid_characters", false).with_scopes(scopes),
        ParameterDescriptor::string("default_ddl_collation", "").with_scopes(scopes),
        ParameterDescriptor::enumeration(
            "storage_serialization_policy",
            &["COMPATIBLE", "OPTIMIZED"],
            "OPTIMIZED",
        )
        .case_insensitive()
        .with_scopes(scopes),
        log_level().with_scopes(scopes),
        trace_level().with_scopes(scopes),
        ParameterDescriptor::int("suspend_task_after_num_failures", 10)
            .with_scopes(scopes)
            .with_range(0, i64::MAX),
        ParameterDescriptor::int("task_auto_retry_attempts", 0)
            .with_scopes(scopes)
            .with_range(0, 30),
        ParameterDescriptor::enumeration(
            "user_task_managed_initial_warehouse_size",
            WAREHOUSE_SIZES,
            "MEDIUM",
        )
        .case_insensitive()
        .with_scopes(scopes),
        ParameterDescriptor::int("user_task_timeout_ms", 3600000)
            .with_scopes(scopes)
            .with_range(0, 86400000),
        ParameterDescriptor::int("user_task_minimum_trigger_interval_in_seconds", 30)
            .with_scopes(scopes)
            .with_range(10, 604800),
        ParameterDescriptor::bool("quoted_identifiers_ignore_case", false).with_scopes(scopes),
        ParameterDescriptor::bool("enable_console_output", false).with_scopes(scopes),
    ]
}
