use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use crate::map::ValueMap;

/// A dynamic value.
///
/// Template expressions evaluate to values, widget state is a record of
/// values, and dynamic attributes carry values until they are written to
/// the document as strings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    /// Truthiness follows the host-dialect rules: `null`, `false`, zero and
    /// the empty string are falsy; collections are always truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(n) => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Member lookup: string keys index maps, integer keys index lists.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match (self, key) {
            (Value::Map(map), Value::Str(key)) => map.get(key),
            (Value::List(list), Value::Int(index)) => {
                let index = usize::try_from(*index).ok()?;
                list.get(index)
            }
            _ => None,
        }
    }

    pub fn get_key(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Numeric-coercing equality: `1 == 1.0` holds, everything else is
    /// strict per-variant equality.
    pub fn loosely_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_float() == other.as_float()
            }
            _ => self == other,
        }
    }

    /// Ordering for the comparison operators: numbers compare numerically,
    /// strings lexicographically, anything else does not compare.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_float()?.partial_cmp(&other.as_float()?)
            }
            (Value::Str(lhs), Value::Str(rhs)) => Some(lhs.cmp(rhs)),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => {
                // Whole floats print without the trailing fraction
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => write!(f, "{s}"),
            Value::List(list) => {
                let s = list.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",");
                write!(f, "{s}")
            }
            Value::Map(map) => {
                let s = map
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{s}}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<ValueMap> for Value {
    fn from(value: ValueMap) -> Self {
        Value::Map(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn truthiness() {
        let falsy = [Value::Null, Value::Bool(false), Value::Int(0), Value::Str("".into())];
        for value in falsy {
            assert!(!value.is_truthy(), "{value:?} should be falsy");
        }

        let truthy = [
            Value::Bool(true),
            Value::Int(-1),
            Value::Str("x".into()),
            Value::List(vec![]),
            Value::Map(ValueMap::new()),
        ];
        for value in truthy {
            assert!(value.is_truthy(), "{value:?} should be truthy");
        }
    }

    #[test]
    fn display() {
        let inputs = [
            (Value::Int(0), "0"),
            (Value::Float(1.5), "1.5"),
            (Value::Float(2.0), "2"),
            (Value::Str("hi".into()), "hi"),
            (Value::Bool(true), "true"),
            (Value::Null, ""),
            (Value::List(vec![1.into(), 2.into()]), "1,2"),
        ];

        for (value, expected) in inputs {
            assert_eq!(value.to_string(), expected);
        }
    }

    #[test]
    fn loose_equality() {
        assert!(Value::Int(1).loosely_eq(&Value::Float(1.0)));
        assert!(!Value::Int(1).loosely_eq(&Value::Str("1".into())));
    }

    #[test]
    fn compare_numbers_and_strings() {
        assert_eq!(Value::Int(1).compare(&Value::Float(2.0)), Some(Ordering::Less));
        assert_eq!(
            Value::Str("b".into()).compare(&Value::Str("a".into())),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Int(1).compare(&Value::Str("a".into())), None);
    }

    #[test]
    fn member_lookup() {
        let mut map = ValueMap::new();
        map.insert("a", 1);
        let value = Value::Map(map);
        assert_eq!(value.get_key("a"), Some(&Value::Int(1)));
        assert_eq!(value.get_key("b"), None);

        let list = Value::List(vec![10.into(), 20.into()]);
        assert_eq!(list.get(&Value::Int(1)), Some(&Value::Int(20)));
    }
}
