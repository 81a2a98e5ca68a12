//! Error types for parameter reconciliation.

use thiserror::Error;

use crate::lifecycle::ObjectState;
use crate::plan::Operation;

/// Errors raised while resolving, planning or applying parameter changes.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A desired-configuration literal could not be parsed for its parameter.
    #[error("Validation error: {object}: parameter '{parameter}': {reason} (got {literal})")]
    Validation {
        /// The object the configuration belongs to (empty until attached).
        object: String,
        /// The parameter name.
        parameter: String,
        /// The offending literal as written in configuration.
        literal: String,
        /// Why the literal was rejected.
        reason: String,
    },

    /// The platform refused a structurally valid operation.
    #[error("Constraint violated: {object}: {operation}: {message}")]
    Constraint {
        /// The object the operation targeted.
        object: String,
        /// The operation that was attempted.
        operation: Operation,
        /// The platform's explanation.
        message: String,
    },

    /// A network or availability failure at the remote boundary.
    #[error("Transient error: {0}")]
    Transient(String),

    /// The object does not exist remotely.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The object already exists (create conflict).
    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    /// The requested object kind has no descriptor table.
    #[error("Unknown object kind: {0}")]
    UnknownObjectKind(String),

    /// Provider configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A precondition for the operation is not met.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The remote reported data that does not fit the parameter descriptor.
    #[error("Unexpected remote data for parameter '{parameter}': {message}")]
    RemoteData {
        /// The parameter name.
        parameter: String,
        /// What was wrong with the reported data.
        message: String,
    },

    /// The lifecycle state machine was asked for an illegal move.
    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        /// The current state.
        from: ObjectState,
        /// The requested state.
        to: ObjectState,
    },

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Build a validation error that is not yet attached to an object.
    pub fn validation(
        parameter: impl Into<String>,
        literal: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            object: String::new(),
            parameter: parameter.into(),
            literal: literal.into(),
            reason: reason.into(),
        }
    }

    /// Build a constraint error for an attempted operation.
    pub fn constraint(
        object: impl Into<String>,
        operation: Operation,
        message: impl Into<String>,
    ) -> Self {
        Self::Constraint {
            object: object.into(),
            operation,
            message: message.into(),
        }
    }

    /// Attach an object identity to a validation error. Other variants pass through.
    pub fn with_object(self, identity: impl std::fmt::Display) -> Self {
        match self {
            Self::Validation {
                parameter,
                literal,
                reason,
                ..
            } => Self::Validation {
                object: identity.to_string(),
                parameter,
                literal,
                reason,
            },
            other => other,
        }
    }

    /// Whether the caller may retry the failed call against fresh state.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { reason, .. } => reason,
            Self::Constraint { message, .. } => message,
            Self::Transient(msg) => msg,
            Self::NotFound(msg) => msg,
            Self::AlreadyExists(msg) => msg,
            Self::UnknownObjectKind(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::FailedPrecondition(msg) => msg,
            Self::RemoteData { message, .. } => message,
            Self::InvalidTransition { .. } => "invalid lifecycle transition",
            Self::Serialization(_err) => "serialization error (see Debug output)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ParamValue;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("\"WH\"".to_string());
        assert_eq!(format!("{}", err), "Object not found: \"WH\"");

        let err = ProviderError::UnknownObjectKind("pipe".to_string());
        assert_eq!(format!("{}", err), "Unknown object kind: pipe");

        let err = ProviderError::validation("auto_suspend", "\"abc\"", "expected an integer")
            .with_object("\"WH\"");
        assert_eq!(
            format!("{}", err),
            "Validation error: \"WH\": parameter 'auto_suspend': expected an integer (got \"abc\")"
        );
    }

    #[test]
    fn test_constraint_carries_operation() {
        let err = ProviderError::constraint(
            "\"WH\"",
            Operation::unset("warehouse_size"),
            "cannot unset",
        );
        match &err {
            ProviderError::Constraint { operation, .. } => {
                assert_eq!(operation.parameter, "warehouse_size");
            },
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(format!("{}", err).contains("UNSET warehouse_size"));

        let err = ProviderError::constraint(
            "\"WH\"",
            Operation::set("max_cluster_count", ParamValue::Int(11)),
            "out of range",
        );
        assert!(format!("{}", err).contains("SET max_cluster_count = 11"));
    }

    #[test]
    fn test_with_object_leaves_other_variants() {
        let err = ProviderError::Transient("timeout".to_string()).with_object("\"WH\"");
        assert!(matches!(err, ProviderError::Transient(_)));
    }

    #[test]
    fn test_is_transient() {
        assert!(ProviderError::Transient("reset".to_string()).is_transient());
        assert!(!ProviderError::NotFound("x".to_string()).is_transient());
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Configuration("bad config".to_string());
        assert_eq!(err.message(), "bad config");

        let err = ProviderError::validation("log_level", "\"LOUD\"", "not an allowed value");
        assert_eq!(err.message(), "not an allowed value");

        let err = ProviderError::InvalidTransition {
            from: ObjectState::Absent,
            to: ObjectState::Updating,
        };
        assert_eq!(err.message(), "invalid lifecycle transition");
        assert_eq!(
            format!("{}", err),
            "Invalid lifecycle transition: absent -> updating"
        );
    }
}
