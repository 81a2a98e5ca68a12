//! Parameter values and the tri-state configuration slot.
//!
//! A configuration slot is one of three things:
//!
//! - [`TriState::Unset`]: the slot is absent. The parameter is not managed and
//!   whatever the remote holds is accepted.
//! - [`TriState::UseDefault`]: the slot is present but empty (`null`, `""`, or
//!   `"default"` for booleans). The parameter is managed and should fall back
//!   to the remote default.
//! - [`TriState::Explicit`]: the slot holds a value, including zero, `false`
//!   and (for string parameters) the empty string.
//!
//! # Example
//!
//! ```
//! use dataplat_params::descriptor::ParameterDescriptor;
//! use dataplat_params::value::{ParamValue, TriState};
//! use serde_json::json;
//!
//! let auto_suspend = ParameterDescriptor::int("auto_suspend", 600);
//!
//! assert_eq!(TriState::parse(&auto_suspend, None).unwrap(), TriState::Unset);
//! assert_eq!(
//!     TriState::parse(&auto_suspend, Some(&json!(null))).unwrap(),
//!     TriState::UseDefault
//! );
//! assert_eq!(
//!     TriState::parse(&auto_suspend, Some(&json!(0))).unwrap(),
//!     TriState::Explicit(ParamValue::Int(0))
//! );
//! assert!(TriState::parse(&auto_suspend, Some(&json!("soon"))).is_err());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::{DataType, ParameterDescriptor};
use crate::error::ProviderError;

/// A typed parameter value. Enum-typed parameters carry their value as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A boolean value.
    Bool(bool),
    /// A 64-bit integer.
    Int(i64),
    /// A string or enum value.
    String(String),
}

impl ParamValue {
    /// The integer payload, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The boolean payload, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::String(_) => "string",
        }
    }

    /// Convert to the JSON representation used in configuration and state.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::String(s) => Value::String(s.clone()),
        }
    }

    /// Render as a SQL literal, quoting and escaping strings.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string().to_uppercase(),
            Self::Int(i) => i.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Outcome of comparing a configuration slot with a remote value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// The slot is not explicit, so no difference is forced.
    Unmanaged,
    /// The explicit value equals the remote value.
    Equal,
    /// The explicit value differs from the remote value.
    Different,
}

/// A parsed configuration slot.
///
/// The derived `PartialEq` is structural. Use [`TriState::explicit_eq`] or
/// [`TriState::compare_remote`] when asking whether two values agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriState<T> {
    /// Not specified: the parameter is not managed.
    Unset,
    /// Specified as "use the remote default".
    UseDefault,
    /// Specified with a concrete value.
    Explicit(T),
}

impl<T> Default for TriState<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T> TriState<T> {
    /// Whether the slot was absent.
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Whether the slot asks for the remote default.
    pub fn is_use_default(&self) -> bool {
        matches!(self, Self::UseDefault)
    }

    /// Whether the slot holds a value.
    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Explicit(_))
    }

    /// Whether the parameter is managed (anything but `Unset`).
    pub fn is_managed(&self) -> bool {
        !self.is_unset()
    }

    /// The explicit value, if any.
    pub fn explicit(&self) -> Option<&T> {
        match self {
            Self::Explicit(v) => Some(v),
            _ => None,
        }
    }

    /// Consume the slot, returning the explicit value if any.
    pub fn into_explicit(self) -> Option<T> {
        match self {
            Self::Explicit(v) => Some(v),
            _ => None,
        }
    }

    /// Map the explicit payload, keeping the slot kind.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> TriState<U> {
        match self {
            Self::Unset => TriState::Unset,
            Self::UseDefault => TriState::UseDefault,
            Self::Explicit(v) => TriState::Explicit(f(v)),
        }
    }
}

impl<T: PartialEq> TriState<T> {
    /// Value equality, defined only when both sides are explicit.
    pub fn explicit_eq(&self, other: &Self) -> Option<bool> {
        match (self, other) {
            (Self::Explicit(a), Self::Explicit(b)) => Some(a == b),
            _ => None,
        }
    }

    /// Compare against a remote reading. Non-explicit slots never force a diff.
    pub fn compare_remote(&self, remote: &T) -> Comparison {
        match self {
            Self::Explicit(v) if v == remote => Comparison::Equal,
            Self::Explicit(_) => Comparison::Different,
            _ => Comparison::Unmanaged,
        }
    }
}

impl TriState<ParamValue> {
    /// Parse a configuration slot for the given parameter.
    ///
    /// `None` means the key is absent from configuration. Case-insensitive
    /// parameters are normalized on the way in, so the explicit value is
    /// directly comparable with what the platform reports.
    pub fn parse(
        descriptor: &ParameterDescriptor,
        slot: Option<&Value>,
    ) -> Result<Self, ProviderError> {
        let value = match slot {
            None => return Ok(Self::Unset),
            Some(Value::Null) => return Ok(Self::UseDefault),
            Some(v) => v,
        };
        let reject =
            |reason: &str| ProviderError::validation(&descriptor.name, value.to_string(), reason);

        let parsed = match (&descriptor.data_type, value) {
            (DataType::Int, Value::Number(n)) => match json_number_to_i64(n) {
                Some(i) => ParamValue::Int(i),
                None => return Err(reject("expected an integer")),
            },
            (DataType::Int, Value::String(s)) if s.trim().is_empty() => {
                return Ok(Self::UseDefault)
            },
            (DataType::Int, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(i) => ParamValue::Int(i),
                Err(_) => return Err(reject("expected an integer")),
            },
            (DataType::Bool, Value::Bool(b)) => ParamValue::Bool(*b),
            (DataType::Bool, Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "" | "default" => return Ok(Self::UseDefault),
                "true" => ParamValue::Bool(true),
                "false" => ParamValue::Bool(false),
                _ => return Err(reject("expected true, false or \"default\"")),
            },
            (DataType::String, Value::String(s)) => ParamValue::String(s.clone()),
            (DataType::Enum(_), Value::String(s)) if s.trim().is_empty() => {
                return Ok(Self::UseDefault)
            },
            (DataType::Enum(_), Value::String(s)) => ParamValue::String(s.clone()),
            (expected, other) => {
                return Err(reject(&format!(
                    "expected {}, got {}",
                    expected,
                    json_type_name(other)
                )))
            },
        };

        let parsed = descriptor.normalize(parsed);
        descriptor.check_value(&parsed).map_err(|reason| reject(&reason))?;
        Ok(Self::Explicit(parsed))
    }

    /// Re-serialize the slot: `None` for `Unset`, `null` for `UseDefault`.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Unset => None,
            Self::UseDefault => Some(Value::Null),
            Self::Explicit(v) => Some(v.to_json()),
        }
    }
}

impl<T: fmt::Display> fmt::Display for TriState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "<unset>"),
            Self::UseDefault => write!(f, "<default>"),
            Self::Explicit(v) => write!(f, "{}", v),
        }
    }
}

fn json_number_to_i64(n: &serde_json::Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    // Accept floats with no fractional part, e.g. 42.0. `i64::MAX as f64` is
    // 2^63, one past the largest i64, so the upper bound is exclusive.
    n.as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
        .map(|f| f as i64)
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ParameterDescriptor;
    use serde_json::json;

    fn log_level() -> ParameterDescriptor {
        ParameterDescriptor::enumeration("log_level", &["TRACE", "DEBUG", "INFO", "OFF"], "OFF")
            .case_insensitive()
    }

    #[test]
    fn test_parse_int_slots() {
        let d = ParameterDescriptor::int("auto_suspend", 600).with_range(0, i64::MAX);

        assert_eq!(TriState::parse(&d, None).unwrap(), TriState::Unset);
        assert_eq!(
            TriState::parse(&d, Some(&json!(null))).unwrap(),
            TriState::UseDefault
        );
        assert_eq!(
            TriState::parse(&d, Some(&json!(""))).unwrap(),
            TriState::UseDefault
        );
        assert_eq!(
            TriState::parse(&d, Some(&json!(0))).unwrap(),
            TriState::Explicit(ParamValue::Int(0))
        );
        assert_eq!(
            TriState::parse(&d, Some(&json!("120"))).unwrap(),
            TriState::Explicit(ParamValue::Int(120))
        );
        assert_eq!(
            TriState::parse(&d, Some(&json!(60.0))).unwrap(),
            TriState::Explicit(ParamValue::Int(60))
        );
    }

    #[test]
    fn test_parse_int_rejects_malformed_literal() {
        let d = ParameterDescriptor::int("auto_suspend", 600);

        let err = TriState::parse(&d, Some(&json!("ten minutes"))).unwrap_err();
        match err {
            ProviderError::Validation {
                parameter, literal, ..
            } => {
                assert_eq!(parameter, "auto_suspend");
                assert_eq!(literal, "\"ten minutes\"");
            },
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(TriState::parse(&d, Some(&json!(1.5))).is_err());
        assert!(TriState::parse(&d, Some(&json!(true))).is_err());
    }

    #[test]
    fn test_parse_int_range() {
        let d = ParameterDescriptor::int("max_cluster_count", 1).with_range(1, 10);
        assert!(TriState::parse(&d, Some(&json!(10))).is_ok());
        assert!(TriState::parse(&d, Some(&json!(0))).is_err());
        assert!(TriState::parse(&d, Some(&json!(11))).is_err());
    }

    #[test]
    fn test_parse_bool_slots() {
        let d = ParameterDescriptor::bool("auto_resume", true);

        assert_eq!(
            TriState::parse(&d, Some(&json!(false))).unwrap(),
            TriState::Explicit(ParamValue::Bool(false))
        );
        assert_eq!(
            TriState::parse(&d, Some(&json!("TRUE"))).unwrap(),
            TriState::Explicit(ParamValue::Bool(true))
        );
        assert_eq!(
            TriState::parse(&d, Some(&json!("default"))).unwrap(),
            TriState::UseDefault
        );
        assert!(TriState::parse(&d, Some(&json!("yes"))).is_err());
        assert!(TriState::parse(&d, Some(&json!(1))).is_err());
    }

    #[test]
    fn test_parse_string_keeps_empty_as_explicit() {
        let d = ParameterDescriptor::string("comment", "");
        assert_eq!(
            TriState::parse(&d, Some(&json!(""))).unwrap(),
            TriState::Explicit(ParamValue::String(String::new()))
        );
        assert!(TriState::parse(&d, Some(&json!(5))).is_err());
    }

    #[test]
    fn test_parse_enum_normalizes_case() {
        let d = log_level();
        assert_eq!(
            TriState::parse(&d, Some(&json!("debug"))).unwrap(),
            TriState::Explicit(ParamValue::String("DEBUG".to_string()))
        );
        assert_eq!(
            TriState::parse(&d, Some(&json!(""))).unwrap(),
            TriState::UseDefault
        );
        assert!(TriState::parse(&d, Some(&json!("LOUD"))).is_err());
    }

    #[test]
    fn test_parse_integral_floats() {
        let d = ParameterDescriptor::int("auto_suspend", 600).with_range(0, i64::MAX);
        assert_eq!(
            TriState::parse(&d, Some(&json!(42.0))).unwrap(),
            TriState::Explicit(ParamValue::Int(42))
        );
        assert_eq!(
            TriState::parse(&d, Some(&json!(9.0e18))).unwrap(),
            TriState::Explicit(ParamValue::Int(9_000_000_000_000_000_000))
        );
        assert!(TriState::parse(&d, Some(&json!(1.5))).is_err());

        // 2^63 would saturate to i64::MAX if it were cast.
        let err = TriState::parse(&d, Some(&json!(9223372036854775808.0))).unwrap_err();
        assert!(matches!(err, ProviderError::Validation { .. }));
    }

    #[test]
    fn test_parse_case_sensitive_enum() {
        let d = ParameterDescriptor::enumeration("scaling_policy", &["STANDARD", "ECONOMY"], "STANDARD");
        assert!(TriState::parse(&d, Some(&json!("ECONOMY"))).is_ok());
        assert!(TriState::parse(&d, Some(&json!("economy"))).is_err());
    }

    #[test]
    fn test_explicit_round_trip() {
        let cases = vec![
            (ParameterDescriptor::int("auto_suspend", 600), ParamValue::Int(0)),
            (ParameterDescriptor::bool("auto_resume", true), ParamValue::Bool(false)),
            (ParameterDescriptor::string("comment", ""), ParamValue::String(String::new())),
            (log_level(), ParamValue::String("INFO".to_string())),
        ];

        for (descriptor, value) in cases {
            let slot = TriState::Explicit(value.clone());
            let json = slot.to_json();
            let back = TriState::parse(&descriptor, json.as_ref()).unwrap();
            assert_eq!(back, TriState::Explicit(value));
        }
    }

    #[test]
    fn test_unset_never_round_trips_to_zero() {
        let d = ParameterDescriptor::int("auto_suspend", 600);
        let unset: TriState<ParamValue> = TriState::Unset;
        let back = TriState::parse(&d, unset.to_json().as_ref()).unwrap();
        assert!(back.is_unset());

        let use_default: TriState<ParamValue> = TriState::UseDefault;
        let back = TriState::parse(&d, use_default.to_json().as_ref()).unwrap();
        assert!(back.is_use_default());
    }

    #[test]
    fn test_explicit_eq_only_between_explicit() {
        let zero = TriState::Explicit(0);
        assert_eq!(zero.explicit_eq(&TriState::Explicit(0)), Some(true));
        assert_eq!(zero.explicit_eq(&TriState::Explicit(1)), Some(false));
        assert_eq!(zero.explicit_eq(&TriState::Unset), None);
        assert_eq!(TriState::<i64>::UseDefault.explicit_eq(&TriState::UseDefault), None);
    }

    #[test]
    fn test_compare_remote() {
        assert_eq!(TriState::Unset.compare_remote(&5), Comparison::Unmanaged);
        assert_eq!(TriState::UseDefault.compare_remote(&5), Comparison::Unmanaged);
        assert_eq!(TriState::Explicit(5).compare_remote(&5), Comparison::Equal);
        assert_eq!(TriState::Explicit(0).compare_remote(&5), Comparison::Different);
    }

    #[test]
    fn test_param_value_rendering() {
        assert_eq!(ParamValue::Int(0).to_sql_literal(), "0");
        assert_eq!(ParamValue::Bool(true).to_sql_literal(), "TRUE");
        assert_eq!(ParamValue::from("it's").to_sql_literal(), "'it''s'");
        assert_eq!(ParamValue::from("x").to_json(), json!("x"));
        assert_eq!(format!("{}", TriState::Explicit(ParamValue::Int(3))), "3");
        assert_eq!(format!("{}", TriState::<ParamValue>::UseDefault), "<default>");
    }

    #[test]
    fn test_param_value_serde_untagged() {
        let v: ParamValue = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(v, ParamValue::Int(42));
        let v: ParamValue = serde_json::from_value(json!(false)).unwrap();
        assert_eq!(v, ParamValue::Bool(false));
        let v: ParamValue = serde_json::from_value(json!("OFF")).unwrap();
        assert_eq!(v, ParamValue::String("OFF".to_string()));
    }
}
