//! Typed, validated views over document nodes
//!
//! A [Presentation] pairs a [Node] with the [Schema] describing it. Field values are computed
//! on access from the node; nothing is cached. The only link to the containing presentation is
//! its locator, used as a fallback when a node carries none.
pub mod field;
pub mod schema;
pub mod validate;

pub use field::{Element, FieldDescriptor, FieldKind, Primitive};
pub use schema::{Presenters, Schema, SchemaBuilder};
pub use validate::{NameIndex, ValidationContext};

use crate::document::{Locator, Node};
use crate::issue::{Error, Issue, IssueKind};
use crate::value::Value;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy)]
pub struct Presentation<'a> {
    presenters: &'a Presenters,
    schema: &'a Schema,
    node: &'a Node,
    name: Option<&'a str>,
    fallback: Option<&'a Locator>,
}

/// Result of reading a field
#[derive(Debug, Clone)]
pub enum FieldValue<'a> {
    Value(Value),
    Presentation(Presentation<'a>),
    List(Vec<FieldValue<'a>>),
    Map(IndexMap<&'a str, FieldValue<'a>>),
    /// Entries of a sequenced list, names may repeat
    Sequenced(Vec<(&'a str, FieldValue<'a>)>),
}

impl<'a> FieldValue<'a> {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_presentation(&self) -> Option<Presentation<'a>> {
        match self {
            FieldValue::Presentation(presentation) => Some(*presentation),
            _ => None,
        }
    }

    /// Every nested presentation, in document order
    pub fn presentations(&self) -> Vec<Presentation<'a>> {
        match self {
            FieldValue::Value(_) => vec![],
            FieldValue::Presentation(presentation) => vec![*presentation],
            FieldValue::List(list) => list.iter().flat_map(FieldValue::presentations).collect(),
            FieldValue::Map(map) => map.values().flat_map(FieldValue::presentations).collect(),
            FieldValue::Sequenced(entries) => entries
                .iter()
                .flat_map(|(_, value)| value.presentations())
                .collect(),
        }
    }

    /// Every coerced scalar value, in document order
    pub fn values(&self) -> Vec<&Value> {
        match self {
            FieldValue::Value(Value::Array(array)) => array.iter().collect(),
            FieldValue::Value(value) => vec![value],
            FieldValue::Presentation(_) => vec![],
            FieldValue::List(list) => list.iter().flat_map(FieldValue::values).collect(),
            FieldValue::Map(map) => map.values().flat_map(FieldValue::values).collect(),
            FieldValue::Sequenced(entries) => {
                entries.iter().flat_map(|(_, value)| value.values()).collect()
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FieldError {
    #[error("required field `{field}` is missing")]
    RequiredFieldMissing {
        field: String,
        locator: Option<Locator>,
    },
    #[error("field `{field}`: cannot coerce {found} to {expected}")]
    TypeCoercion {
        field: String,
        expected: &'static str,
        found: &'static str,
        locator: Option<Locator>,
    },
    #[error("field `{field}`: expected {expected}, found {found}")]
    WrongShape {
        field: String,
        expected: &'static str,
        found: &'static str,
        locator: Option<Locator>,
    },
    #[error("field `{field}`: {value} is not one of {allowed}")]
    NotAllowed {
        field: String,
        value: String,
        allowed: String,
        locator: Option<Locator>,
    },
    #[error("field `{field}` is not declared on {schema}")]
    Undeclared { field: String, schema: String },
    #[error(transparent)]
    Fatal(#[from] Error),
}

impl FieldError {
    /// Converts a user-data problem into an issue; engine errors are returned as is
    pub fn into_issue(self) -> Result<Issue, Error> {
        let message = self.to_string();
        let (kind, locator) = match self {
            FieldError::RequiredFieldMissing { locator, .. } => (IssueKind::RequiredFieldMissing, locator),
            FieldError::TypeCoercion { locator, .. } => (IssueKind::TypeCoercion, locator),
            FieldError::WrongShape { locator, .. } => (IssueKind::WrongShape, locator),
            FieldError::NotAllowed { locator, .. } => (IssueKind::NotAllowed, locator),
            FieldError::Undeclared { .. } => return Err(Error::Invariant(message)),
            FieldError::Fatal(error) => return Err(error),
        };
        Ok(Issue::error(kind, message).at(locator.as_ref()))
    }
}

impl<'a> Presentation<'a> {
    /// Presentation of a registered schema over a node
    pub fn new(presenters: &'a Presenters, schema: &str, node: &'a Node) -> Result<Self, Error> {
        Ok(Self::from_schema(presenters, presenters.get(schema)?, node))
    }

    pub fn from_schema(presenters: &'a Presenters, schema: &'a Schema, node: &'a Node) -> Self {
        Self {
            presenters,
            schema,
            node,
            name: None,
            fallback: None,
        }
    }

    fn nested(&self, schema: &'a Schema, node: &'a Node, name: Option<&'a str>) -> Self {
        Self {
            presenters: self.presenters,
            schema,
            node,
            name,
            fallback: self.locator(),
        }
    }

    /// Key under which this presentation was found in its container
    pub fn name(&self) -> Option<&'a str> {
        self.name
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn presenters(&self) -> &'a Presenters {
        self.presenters
    }

    /// The node's locator, or the closest container's
    pub fn locator(&self) -> Option<&'a Locator> {
        self.node.locator.as_ref().or(self.fallback)
    }

    /// Locator of a field, falling back to this presentation's
    pub fn field_locator(&self, field: &str) -> Option<&'a Locator> {
        self.raw(field)
            .and_then(|node| node.locator.as_ref())
            .or_else(|| self.locator())
    }

    fn is_short_form(&self) -> bool {
        self.schema.short_form.is_some() && self.node.as_mapping().is_none()
    }

    /// Raw child node of a field, honoring the short form
    pub fn raw(&self, field: &str) -> Option<&'a Node> {
        if self.is_short_form() {
            return (self.schema.short_form == Some(field)).then_some(self.node);
        }
        self.node.get(field)
    }

    /// Reads a field: coerces the raw node, falls back to the default, enforces `required`
    pub fn get(&self, field: &str) -> Result<Option<FieldValue<'a>>, FieldError> {
        let descriptor = self.schema.field(field).ok_or_else(|| FieldError::Undeclared {
            field: field.to_string(),
            schema: self.schema.name.to_string(),
        })?;

        if descriptor.kind == FieldKind::ObjectMapUnknownKeys {
            return self.unknown_keys(descriptor).map(Some);
        }

        let raw = self.raw(field).filter(|node| node.data != crate::document::Data::Null);
        let Some(raw) = raw else {
            if let Some(default) = &descriptor.default {
                return Ok(Some(FieldValue::Value(default.clone())));
            }
            if descriptor.required {
                return Err(FieldError::RequiredFieldMissing {
                    field: field.to_string(),
                    locator: self.locator().cloned(),
                });
            }
            return Ok(None);
        };

        self.coerce(descriptor, raw).map(Some)
    }

    fn coerce(&self, descriptor: &FieldDescriptor, raw: &'a Node) -> Result<FieldValue<'a>, FieldError> {
        let shape_error = |expected: &'static str, node: &Node| FieldError::WrongShape {
            field: descriptor.name.to_string(),
            expected,
            found: node.shape(),
            locator: node.locator.clone().or_else(|| self.locator().cloned()),
        };

        match descriptor.kind {
            FieldKind::Scalar => self.element(descriptor, raw, Some(descriptor.name)),
            FieldKind::ScalarList => {
                let items = raw.as_sequence().ok_or_else(|| shape_error("sequence", raw))?;
                let values = items
                    .iter()
                    .map(|item| match self.element(descriptor, item, None)? {
                        FieldValue::Value(value) => Ok(value),
                        _ => Err(shape_error("scalar", item)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FieldValue::Value(Value::Array(values)))
            }
            FieldKind::Object => self.element(descriptor, raw, Some(descriptor.name)),
            FieldKind::ObjectList => {
                let items = raw.as_sequence().ok_or_else(|| shape_error("sequence", raw))?;
                items
                    .iter()
                    .map(|item| self.element(descriptor, item, None))
                    .collect::<Result<Vec<_>, _>>()
                    .map(FieldValue::List)
            }
            FieldKind::ObjectMap => {
                let mapping = raw.as_mapping().ok_or_else(|| shape_error("mapping", raw))?;
                mapping
                    .iter()
                    .map(|(key, item)| Ok((key.as_str(), self.element(descriptor, item, Some(key.as_str()))?)))
                    .collect::<Result<IndexMap<_, _>, FieldError>>()
                    .map(FieldValue::Map)
            }
            FieldKind::SequencedObjectList => {
                let items = raw.as_sequence().ok_or_else(|| shape_error("sequence", raw))?;
                items
                    .iter()
                    .map(|item| {
                        let entry = item
                            .as_mapping()
                            .filter(|mapping| mapping.len() == 1)
                            .and_then(|mapping| mapping.first())
                            .ok_or_else(|| shape_error("single-key mapping", item))?;
                        Ok((entry.0.as_str(), self.element(descriptor, entry.1, Some(entry.0.as_str()))?))
                    })
                    .collect::<Result<Vec<_>, FieldError>>()
                    .map(FieldValue::Sequenced)
            }
            FieldKind::ObjectMapUnknownKeys => self.unknown_keys(descriptor),
        }
    }

    fn unknown_keys(&self, descriptor: &FieldDescriptor) -> Result<FieldValue<'a>, FieldError> {
        let Some(mapping) = self.node.as_mapping() else {
            return Ok(FieldValue::Map(IndexMap::new()));
        };

        mapping
            .iter()
            .filter(|(key, _)| !self.schema.claims(key))
            .map(|(key, item)| Ok((key.as_str(), self.element(descriptor, item, Some(key.as_str()))?)))
            .collect::<Result<IndexMap<_, _>, FieldError>>()
            .map(FieldValue::Map)
    }

    /// Coerces a single element of a field
    fn element(
        &self,
        descriptor: &FieldDescriptor,
        node: &'a Node,
        name: Option<&'a str>,
    ) -> Result<FieldValue<'a>, FieldError> {
        match descriptor.element {
            Element::Primitive(primitive) => {
                let value = primitive.coerce(node).map_err(|found| FieldError::TypeCoercion {
                    field: descriptor.name.to_string(),
                    expected: primitive.name(),
                    found,
                    locator: node.locator.clone().or_else(|| self.locator().cloned()),
                })?;
                if !descriptor.is_allowed(&value) {
                    return Err(FieldError::NotAllowed {
                        field: descriptor.name.to_string(),
                        value: value.to_string(),
                        allowed: descriptor
                            .allowed
                            .iter()
                            .flatten()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", "),
                        locator: node.locator.clone().or_else(|| self.locator().cloned()),
                    });
                }
                Ok(FieldValue::Value(value))
            }
            Element::Presentation(schema) => {
                let schema = self.presenters.get(schema)?;
                if node.as_mapping().is_none() && schema.short_form.is_none() {
                    return Err(FieldError::WrongShape {
                        field: descriptor.name.to_string(),
                        expected: "mapping",
                        found: node.shape(),
                        locator: node.locator.clone().or_else(|| self.locator().cloned()),
                    });
                }
                Ok(FieldValue::Presentation(self.nested(schema, node, name)))
            }
        }
    }

    /// Validates every field and reports unknown keys
    ///
    /// User-data problems go to the context's issue collector. Only engine errors are returned.
    pub fn validate(&self, context: &mut ValidationContext<'_>) -> Result<(), Error> {
        if self.node.as_mapping().is_none() && self.schema.short_form.is_none() {
            context.issues.log(
                Issue::error(
                    IssueKind::WrongShape,
                    format!("{} must be a mapping, found {}", self.schema.name, self.node.shape()),
                )
                .at(self.locator()),
            );
            return Ok(());
        }

        for descriptor in self.schema.fields() {
            match &descriptor.validator {
                Some(validator) => validator(self, descriptor, context)?,
                None => validate::default_validator(self, descriptor, context)?,
            }
        }

        if self.schema.allow_unknown_fields || self.schema.collects_unknown_keys() {
            return Ok(());
        }

        if let Some(mapping) = self.node.as_mapping() {
            for (key, child) in mapping {
                if self.schema.field(key).is_none() {
                    context.issues.log(
                        Issue::error(
                            IssueKind::UnknownField,
                            format!("unknown field `{key}` in {}", self.schema.name),
                        )
                        .at(child.locator.as_ref().or_else(|| self.locator())),
                    );
                }
            }
        }

        Ok(())
    }
}

/// Lenient accessors used after validation. Problems were already reported by
/// [Presentation::validate], so errors read as absent.
impl<'a> Presentation<'a> {
    pub fn value(&self, field: &str) -> Option<Value> {
        match self.get(field).ok()?? {
            FieldValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn string(&self, field: &str) -> Option<String> {
        match self.value(field)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn boolean(&self, field: &str) -> Option<bool> {
        match self.value(field)? {
            Value::Boolean(b) => Some(b),
            _ => None,
        }
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        self.value(field)?.as_i64()
    }

    pub fn strings(&self, field: &str) -> Option<Vec<String>> {
        match self.value(field)? {
            Value::Array(items) => Some(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn object(&self, field: &str) -> Option<Presentation<'a>> {
        self.get(field).ok()??.as_presentation()
    }

    pub fn objects(&self, field: &str) -> Vec<Presentation<'a>> {
        match self.get(field) {
            Ok(Some(FieldValue::List(items))) => {
                items.iter().filter_map(FieldValue::as_presentation).collect()
            }
            _ => vec![],
        }
    }

    /// Named entries of an object map (or the unknown-keys catch-all)
    pub fn object_map(&self, field: &str) -> Vec<(&'a str, Presentation<'a>)> {
        match self.get(field) {
            Ok(Some(FieldValue::Map(map))) => map
                .into_iter()
                .filter_map(|(name, value)| Some((name, value.as_presentation()?)))
                .collect(),
            _ => vec![],
        }
    }

    /// Named entries of a sequenced list, in order, names may repeat
    pub fn sequenced(&self, field: &str) -> Vec<(&'a str, FieldValue<'a>)> {
        match self.get(field) {
            Ok(Some(FieldValue::Sequenced(entries))) => entries,
            _ => vec![],
        }
    }

    /// Raw values of a map-typed field
    pub fn value_map(&self, field: &str) -> IndexMap<String, Value> {
        match self.value(field) {
            Some(Value::Object(object)) => object,
            _ => IndexMap::new(),
        }
    }
}
