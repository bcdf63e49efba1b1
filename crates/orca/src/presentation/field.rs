//! Field descriptors
//!
//! A descriptor separates the *shape* of a field ([FieldKind]) from the *coercion* of its
//! elements ([Element]) and from its *constraints* (required, default, allowed values, validator).
use super::{Presentation, ValidationContext};
use crate::document::{Data, Node};
use crate::issue::Error;
use crate::value::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    ScalarList,
    Object,
    ObjectList,
    ObjectMap,
    /// List of single-key mappings, order-significant, names may repeat
    SequencedObjectList,
    /// Every key of the mapping not claimed by another descriptor
    ObjectMapUnknownKeys,
}

/// Primitive coercions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    /// Any scalar, rendered as a string
    String,
    Integer,
    Float,
    Boolean,
    Map,
    List,
    /// Anything, converted as is
    Any,
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::String => "string",
            Primitive::Integer => "integer",
            Primitive::Float => "float",
            Primitive::Boolean => "boolean",
            Primitive::Map => "map",
            Primitive::List => "list",
            Primitive::Any => "any",
        }
    }

    /// Coerces a node. On failure returns the shape that was found.
    pub fn coerce(&self, node: &Node) -> Result<Value, &'static str> {
        match (self, &node.data) {
            (Primitive::Any, _) => Ok(node.into()),
            (Primitive::String, Data::String(s)) => Ok(Value::String(s.clone())),
            (Primitive::String, Data::Integer(i)) => Ok(Value::String(i.to_string())),
            (Primitive::String, Data::Float(f)) => Ok(Value::String(f.to_string())),
            (Primitive::String, Data::Boolean(b)) => Ok(Value::String(b.to_string())),
            (Primitive::Integer, Data::Integer(i)) => Ok(Value::Integer(*i)),
            (Primitive::Integer, Data::String(s)) => s
                .trim()
                .parse()
                .map(Value::Integer)
                .map_err(|_| node.shape()),
            (Primitive::Float, Data::Float(f)) => Ok(Value::Decimal(*f)),
            (Primitive::Float, Data::Integer(i)) => Ok(Value::Decimal(*i as f64)),
            (Primitive::Boolean, Data::Boolean(b)) => Ok(Value::Boolean(*b)),
            (Primitive::Map, Data::Mapping(_)) => Ok(node.into()),
            (Primitive::List, Data::Sequence(_)) => Ok(node.into()),
            _ => Err(node.shape()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Primitive(Primitive),
    /// Name of a registered schema
    Presentation(&'static str),
}

pub type Validator = Arc<
    dyn for<'a> Fn(&Presentation<'a>, &FieldDescriptor, &mut ValidationContext<'_>) -> Result<(), Error>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub element: Element,
    pub default: Option<Value>,
    pub required: bool,
    pub allowed: Option<Vec<Value>>,
    pub validator: Option<Validator>,
}

impl std::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("element", &self.element)
            .field("default", &self.default)
            .field("required", &self.required)
            .field("allowed", &self.allowed)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

impl FieldDescriptor {
    fn new(name: &'static str, kind: FieldKind, element: Element) -> Self {
        Self {
            name,
            kind,
            element,
            default: None,
            required: false,
            allowed: None,
            validator: None,
        }
    }

    pub fn scalar(name: &'static str, primitive: Primitive) -> Self {
        Self::new(name, FieldKind::Scalar, Element::Primitive(primitive))
    }

    pub fn scalar_list(name: &'static str, primitive: Primitive) -> Self {
        Self::new(name, FieldKind::ScalarList, Element::Primitive(primitive))
    }

    pub fn object(name: &'static str, schema: &'static str) -> Self {
        Self::new(name, FieldKind::Object, Element::Presentation(schema))
    }

    pub fn object_list(name: &'static str, schema: &'static str) -> Self {
        Self::new(name, FieldKind::ObjectList, Element::Presentation(schema))
    }

    pub fn object_map(name: &'static str, schema: &'static str) -> Self {
        Self::new(name, FieldKind::ObjectMap, Element::Presentation(schema))
    }

    pub fn sequenced(name: &'static str, element: Element) -> Self {
        Self::new(name, FieldKind::SequencedObjectList, element)
    }

    pub fn unknown_keys(name: &'static str, schema: &'static str) -> Self {
        Self::new(
            name,
            FieldKind::ObjectMapUnknownKeys,
            Element::Presentation(schema),
        )
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn allowed<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn is_allowed(&self, value: &Value) -> bool {
        self.allowed
            .as_ref()
            .map_or(true, |allowed| allowed.contains(value))
    }
}
