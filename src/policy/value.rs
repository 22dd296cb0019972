//! A tagged-variant value type used throughout condition evaluation.
//!
//! Policy JSON and evaluation-context attributes are both heterogeneously
//! typed (strings, numbers, bools, arrays, nested maps). Rather than
//! re-deriving type information from `serde_json::Value` at every
//! comparison site, we funnel everything through this one sum type once,
//! so operators receive a well-typed argument instead of performing ad hoc
//! reflection on `serde_json::Value`.

use std::collections::BTreeMap;
use std::fmt;

/// A single attribute or condition-argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Coerce to a canonical string per §4.5: `nil -> ""`, numbers/bools
    /// formatted canonically.
    pub fn coerce_to_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::coerce_to_string).collect();
                parts.join(",")
            }
            Value::Map(_) => String::new(),
        }
    }

    /// Coerce to a number per §4.5: strings parsed as int64 then float64,
    /// bools become 1/0, nil becomes 0.
    pub fn coerce_to_number(&self) -> Option<f64> {
        match self {
            Value::Null => Some(0.0),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Some(*n),
            Value::String(s) => {
                if let Ok(i) = s.parse::<i64>() {
                    Some(i as f64)
                } else {
                    s.parse::<f64>().ok()
                }
            }
            Value::List(_) | Value::Map(_) => None,
        }
    }

    /// Coerce to a bool per §4.5: `nil -> false`; strings
    /// `"true"/"1" -> true`, `"false"/"0"/"" -> false`.
    pub fn coerce_to_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => matches!(s.as_str(), "true" | "1"),
            Value::List(items) => !items.is_empty(),
            Value::Map(_) => true,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coerce_to_string())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_to_string() {
        assert_eq!(Value::Null.coerce_to_string(), "");
        assert_eq!(Value::Bool(true).coerce_to_string(), "true");
        assert_eq!(Value::Number(42.0).coerce_to_string(), "42");
        assert_eq!(Value::Number(3.5).coerce_to_string(), "3.5");
        assert_eq!(Value::String("abc".into()).coerce_to_string(), "abc");
    }

    #[test]
    fn test_coerce_to_number() {
        assert_eq!(Value::Null.coerce_to_number(), Some(0.0));
        assert_eq!(Value::Bool(true).coerce_to_number(), Some(1.0));
        assert_eq!(Value::Bool(false).coerce_to_number(), Some(0.0));
        assert_eq!(Value::String("42".into()).coerce_to_number(), Some(42.0));
        assert_eq!(Value::String("3.5".into()).coerce_to_number(), Some(3.5));
        assert_eq!(Value::String("nope".into()).coerce_to_number(), None);
    }

    #[test]
    fn test_coerce_to_bool() {
        assert!(!Value::Null.coerce_to_bool());
        assert!(Value::String("true".into()).coerce_to_bool());
        assert!(Value::String("1".into()).coerce_to_bool());
        assert!(!Value::String("false".into()).coerce_to_bool());
        assert!(!Value::String("0".into()).coerce_to_bool());
        assert!(!Value::String("".into()).coerce_to_bool());
    }

    #[test]
    fn test_from_json() {
        let json: serde_json::Value = serde_json::json!({"a": 1, "b": [true, "x"]});
        let value = Value::from(json);
        match value {
            Value::Map(m) => {
                assert_eq!(m.get("a"), Some(&Value::Number(1.0)));
                assert_eq!(
                    m.get("b"),
                    Some(&Value::List(vec![Value::Bool(true), Value::String("x".into())]))
                );
            }
            _ => panic!("expected map"),
        }
    }
}
