//! Runtime values for sandboxed matcher-script execution.
//!
//! The value domain is deliberately small: the artifact language only
//! needs strings, integers, booleans, `none`, sequences, and string-keyed
//! mappings. Mappings use `BTreeMap` so iteration order, rendering, and
//! equality are deterministic.

use std::collections::BTreeMap;
use std::fmt;

/// A matcher-script runtime value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Stable type label used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Convenience constructor for string values.
    pub fn str(text: impl Into<String>) -> Self {
        Self::Str(text.into())
    }

    /// Convenience constructor for map values.
    pub fn map(entries: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        Self::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Int(number) => write!(f, "{number}"),
            Self::Str(text) => f.write_str(text),
            Self::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality_is_deep() {
        let left = Value::map([("evidence", Value::List(vec![Value::str("test")]))]);
        let right = Value::map([("evidence", Value::List(vec![Value::str("test")]))]);
        assert_eq!(left, right);
    }

    #[test]
    fn display_renders_nested_values_deterministically() {
        let value = Value::map([
            ("kind", Value::str("contains")),
            ("is_match", Value::Bool(true)),
        ]);
        assert_eq!(value.to_string(), "{is_match: true, kind: contains}");
    }

    #[test]
    fn type_names_are_stable() {
        assert_eq!(Value::None.type_name(), "none");
        assert_eq!(Value::Int(3).type_name(), "int");
        assert_eq!(Value::List(Vec::new()).type_name(), "list");
    }
}
