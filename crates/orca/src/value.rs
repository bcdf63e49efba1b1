//! value representation
//!
//! The plan output model contains the following data types
//! - null
//! - boolean (true/false)
//! - integer (signed, i64)
//! - decimal (f64)
//! - string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map"/"dictionary", where the key is of type string)
//!
//! The only valid **implicit** conversion: every `integer` is also a `decimal`
//!
use crate::document::{Data, Node};
use indexmap::IndexMap;
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};

/// All possible value types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the value's kind, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "list",
            Value::Object(_) => "map",
        }
    }

    /// Walks nested objects by key
    pub fn lookup<'v>(&'v self, keys: &[String]) -> Option<&'v Value> {
        keys.iter().try_fold(self, |value, key| match value {
            Value::Object(object) => object.get(key),
            Value::Array(array) => key.parse::<usize>().ok().and_then(|i| array.get(i)),
            _ => None,
        })
    }

    /// Renders scalars the way they are spelled in a template
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<K: ToString, V: Into<Value>> From<IndexMap<K, V>> for Value {
    fn from(value: IndexMap<K, V>) -> Self {
        Value::Object(
            value
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect(),
        )
    }
}

impl From<&Node> for Value {
    fn from(node: &Node) -> Self {
        match &node.data {
            Data::Null => Value::Null,
            Data::Boolean(b) => Value::Boolean(*b),
            Data::Integer(i) => Value::Integer(*i),
            Data::Float(f) => Value::Decimal(*f),
            Data::String(s) => Value::String(s.clone()),
            Data::Sequence(sequence) => Value::Array(sequence.iter().map(Into::into).collect()),
            Data::Mapping(mapping) => Value::Object(
                mapping
                    .iter()
                    .map(|(key, child)| (key.clone(), child.into()))
                    .collect(),
            ),
        }
    }
}

impl From<&Value> for Node {
    fn from(value: &Value) -> Self {
        let data = match value {
            Value::Null => Data::Null,
            Value::Boolean(b) => Data::Boolean(*b),
            Value::Integer(i) => Data::Integer(*i),
            Value::Decimal(d) => Data::Float(*d),
            Value::String(s) => Data::String(s.clone()),
            Value::Array(array) => Data::Sequence(array.iter().map(Into::into).collect()),
            Value::Object(object) => Data::Mapping(
                object
                    .iter()
                    .map(|(key, child)| (key.clone(), child.into()))
                    .collect(),
            ),
        };
        Node::new(data)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            other => f.write_str(&other.to_plain_string()),
        }
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Decimal(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Array(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::documents;
    use pretty_assertions::assert_eq;

    #[test]
    fn lookup_walks_objects_and_arrays() {
        let docs = documents!("a:\n  b:\n    - x\n    - y");
        let value = Value::from(docs.get_document(0).2);

        let found = value.lookup(&["a".into(), "b".into(), "1".into()]);
        assert_eq!(found, Some(&Value::from("y")));
        assert_eq!(value.lookup(&["a".into(), "missing".into()]), None);
    }

    #[test]
    fn serializes_in_insertion_order() {
        let docs = documents!("z: 1\na: null\nm: [true, 1.5]");
        let value = Value::from(docs.get_document(0).2);

        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"z":1,"a":null,"m":[true,1.5]}"#
        );
    }
}
