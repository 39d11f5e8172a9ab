use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

///
/// Value
///
/// Literal values carried by criteria and query ASTs. `Param` marks a
/// placeholder bound from an ancestor scope's current row at runtime.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Param(String),
}

impl Value {
    /// Return the parameter name when this value is a binding placeholder.
    #[must_use]
    pub fn as_param(&self) -> Option<&str> {
        match self {
            Self::Param(name) => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::Text(_) => 4,
            Self::List(_) => 5,
            Self::Param(_) => 6,
        }
    }
}

// Floats compare by total order so values are usable as map keys and
// canonical sorting is stable.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Param(a), Self::Param(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::List(a), Self::List(b)) => a.cmp(b),
            (Self::Param(a), Self::Param(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Self::Param(name) => write!(f, "?{name}"),
        }
    }
}

///
/// FieldType
///
/// Schema-level type of a relational column, as reported by the catalog.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    Text,
}

impl FieldType {
    /// Check whether a literal can legally compare against a column of
    /// this type. `Null` and binding placeholders match any type; lists
    /// match when every element matches.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match value {
            Value::Null | Value::Param(_) => true,
            Value::Bool(_) => *self == Self::Bool,
            Value::Int(_) => *self == Self::Int,
            Value::Float(_) => matches!(self, Self::Float | Self::Int),
            Value::Text(_) => *self == Self::Text,
            Value::List(items) => items.iter().all(|item| self.matches(item)),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_equality_is_bitwise() {
        assert_eq!(Value::Float(1.5), Value::Float(1.5));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
    }

    #[test]
    fn ordering_ranks_across_variants() {
        assert!(Value::Null < Value::Bool(false));
        assert!(Value::Int(9) < Value::Float(0.1));
        assert!(Value::Text("a".into()) < Value::List(vec![]));
    }

    #[test]
    fn type_matching_accepts_null_and_params() {
        assert!(FieldType::Int.matches(&Value::Null));
        assert!(FieldType::Text.matches(&Value::Param("p".into())));
        assert!(!FieldType::Int.matches(&Value::Text("x".into())));
        assert!(FieldType::Int.matches(&Value::List(vec![Value::Int(1), Value::Int(2)])));
    }
}
