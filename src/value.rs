//! Dynamic payload values.
//!
//! Metadata maps crossing the store boundary (tool arguments, document
//! metadata, filter values) are typed as this tagged variant rather than
//! exposed as raw `serde_json::Value` reflection, per the design note on
//! dynamic payloads: unknown shapes fall back to their string
//! representation instead of leaking arbitrary JSON structure.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A dynamically-typed scalar value used in metadata maps and tool
/// arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DynValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl DynValue {
    /// Render the value as a plain string, used both for display and as the
    /// explicit fallback representation for value kinds this type doesn't
    /// model natively.
    pub fn as_display(&self) -> String {
        match self {
            DynValue::String(s) => s.clone(),
            DynValue::Int(i) => i.to_string(),
            DynValue::Float(f) => f.to_string(),
            DynValue::Bool(b) => b.to_string(),
        }
    }
}

impl fmt::Display for DynValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for DynValue {
    fn from(s: &str) -> Self {
        DynValue::String(s.to_string())
    }
}

impl From<String> for DynValue {
    fn from(s: String) -> Self {
        DynValue::String(s)
    }
}

impl From<i64> for DynValue {
    fn from(i: i64) -> Self {
        DynValue::Int(i)
    }
}

impl From<bool> for DynValue {
    fn from(b: bool) -> Self {
        DynValue::Bool(b)
    }
}

impl From<f64> for DynValue {
    fn from(f: f64) -> Self {
        DynValue::Float(f)
    }
}

/// Converts an arbitrary `serde_json::Value` into a `DynValue`, falling
/// back to the value's string representation for shapes we don't model
/// (arrays, objects, null).
impl From<serde_json::Value> for DynValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::String(s) => DynValue::String(s),
            serde_json::Value::Bool(b) => DynValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DynValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    DynValue::Float(f)
                } else {
                    DynValue::String(n.to_string())
                }
            }
            other => DynValue::String(other.to_string()),
        }
    }
}

/// A map of dynamic metadata values, the shape carried on every stored
/// entity and tool argument payload.
pub type DynMap = HashMap<String, DynValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_json_shapes_fall_back_to_string_repr() {
        let arr = serde_json::json!([1, 2, 3]);
        let v: DynValue = arr.into();
        assert_eq!(v, DynValue::String("[1,2,3]".to_string()));
    }

    #[test]
    fn scalars_convert_natively() {
        assert_eq!(DynValue::from(serde_json::json!(true)), DynValue::Bool(true));
        assert_eq!(DynValue::from(serde_json::json!(42)), DynValue::Int(42));
        assert_eq!(
            DynValue::from(serde_json::json!("hi")),
            DynValue::String("hi".into())
        );
    }
}
