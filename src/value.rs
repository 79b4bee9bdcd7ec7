//! Runtime value sum type and its stringification
//! rules for text-template interpolation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Sum type of every value the interpreter and the expression evaluator can
/// produce or store.
#[derive(Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    /// A reference to a declared character, by name. Current field values
    /// live in [`crate::store::Store::characters`]; this variant is just a
    /// handle.
    Character(String),
    /// A reference to a script-level or host-registered function, by name.
    Function(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Number(_) => "Number",
            Value::Text(_) => "Text",
            Value::Character(_) => "Character",
            Value::Function(_) => "Function",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            Value::Character(_) | Value::Function(_) => true,
        }
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(fields) => fields.get(name).cloned(),
            _ => None,
        }
    }
}

/// Stringification for text-template interpolation: numbers in
/// their natural form, booleans as `true`/`false`, null as `null`, arrays
/// as `[elt, ...]`, objects as `{name: value, ...}`, characters as the
/// character's current `name` field or, failing that, its declared
/// identifier.
///
/// Character and function display both need a lookup the bare `Value`
/// doesn't carry (current field state, display-name fallback), so callers
/// that can reach a [`crate::store::Store`] should prefer
/// [`crate::store::Store::display_value`] over this impl when the value
/// might be a `Character`. This impl is the fallback used when no store is
/// reachable (e.g. inside `{:?}`-style debug output and for non-character
/// values, which is the common case).
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Character(name) => write!(f, "{}", name),
            Value::Function(name) => write!(f, "{}", name),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            },
            Value::Object(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, "}}")
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", self)
    }
}

/// JSON-shape serialization used by delta records. `Value`
/// round-trips through `serde_json::Value` rather than deriving `Serialize`
/// directly so the on-disk shape stays a plain JSON value regardless of how
/// this enum's variants evolve.
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let json = value_to_json(self);
        json.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(json_to_value(&json))
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as J;
    match value {
        Value::Null => J::Null,
        Value::Boolean(b) => J::Bool(*b),
        Value::Integer(i) => J::Number((*i).into()),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(J::Number)
            .unwrap_or(J::Null),
        Value::Text(s) => J::String(s.clone()),
        Value::Character(name) => {
            let mut map = serde_json::Map::new();
            map.insert("$character".into(), J::String(name.clone()));
            J::Object(map)
        },
        Value::Function(name) => {
            let mut map = serde_json::Map::new();
            map.insert("$function".into(), J::String(name.clone()));
            J::Object(map)
        },
        Value::Array(items) => J::Array(items.iter().map(value_to_json).collect()),
        Value::Object(fields) => {
            let mut map = serde_json::Map::new();
            for (name, value) in fields {
                map.insert(name.clone(), value_to_json(value));
            }
            J::Object(map)
        },
    }
}

fn json_to_value(json: &serde_json::Value) -> Value {
    use serde_json::Value as J;
    match json {
        J::Null => Value::Null,
        J::Bool(b) => Value::Boolean(*b),
        J::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Number(n.as_f64().unwrap_or(0.0))
            }
        },
        J::String(s) => Value::Text(s.clone()),
        J::Array(items) => Value::Array(items.iter().map(json_to_value).collect()),
        J::Object(map) => {
            if let Some(J::String(name)) = map.get("$character") {
                return Value::Character(name.clone());
            }
            if let Some(J::String(name)) = map.get("$function") {
                return Value::Function(name.clone());
            }
            let mut fields = BTreeMap::new();
            for (k, v) in map {
                fields.insert(k.clone(), json_to_value(v));
            }
            Value::Object(fields)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_interpolation_rules() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Integer(90).to_string(), "90");
        assert_eq!(
            Value::Array(vec![Value::Integer(1), Value::Integer(2)]).to_string(),
            "[1, 2]"
        );
        let mut fields = BTreeMap::new();
        fields.insert("x".to_string(), Value::Integer(1));
        assert_eq!(Value::Object(fields).to_string(), "{x: 1}");
    }

    #[test]
    fn json_round_trip_preserves_shape() {
        let value = Value::Array(vec![Value::Text("a".into()), Value::Boolean(false)]);
        let json = serde_json::to_value(&value).unwrap();
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(value, back);
    }
}
