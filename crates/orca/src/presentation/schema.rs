//! Static field tables and the registry that holds them
use super::field::{Element, FieldDescriptor, FieldKind};
use super::{FieldError, Presentation};
use crate::document::{Data, Node};
use crate::issue::Error;
use indexmap::IndexMap;
use std::sync::Arc;

/// Field table of one presentation type. Fixed once built.
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    fields: IndexMap<&'static str, FieldDescriptor>,
    /// Field that receives the whole node when the node is not a mapping
    pub short_form: Option<&'static str>,
    pub allow_unknown_fields: bool,
}

impl Schema {
    pub fn builder(name: &'static str) -> SchemaBuilder {
        SchemaBuilder {
            schema: Schema {
                name,
                fields: IndexMap::new(),
                short_form: None,
                allow_unknown_fields: false,
            },
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }

    /// Whether a mapping key belongs to a named descriptor
    pub fn claims(&self, key: &str) -> bool {
        self.fields
            .get(key)
            .is_some_and(|field| field.kind != FieldKind::ObjectMapUnknownKeys)
    }

    pub fn collects_unknown_keys(&self) -> bool {
        self.fields
            .values()
            .any(|field| field.kind == FieldKind::ObjectMapUnknownKeys)
    }

    /// Writes a field through to the node and re-reads it.
    ///
    /// When the re-read fails the node is restored and the error is returned.
    pub fn set(
        &self,
        presenters: &Presenters,
        node: &mut Node,
        field: &str,
        value: Node,
    ) -> Result<(), FieldError> {
        let descriptor = self.field(field).ok_or_else(|| FieldError::Undeclared {
            field: field.to_string(),
            schema: self.name.to_string(),
        })?;

        if node.is_scalar() {
            // short form node, the whole node is the short form field
            if self.short_form != Some(descriptor.name) {
                return Err(FieldError::WrongShape {
                    field: field.to_string(),
                    expected: "mapping",
                    found: node.shape(),
                    locator: node.locator.clone(),
                });
            }
            let previous = std::mem::replace(node, value);
            let outcome = Presentation::from_schema(presenters, self, node).get(field).map(|_| ());
            if outcome.is_err() {
                *node = previous;
            }
            return outcome;
        }

        let found = node.shape();
        let locator = node.locator.clone();
        let mapping = node.as_mapping_mut().ok_or_else(|| FieldError::WrongShape {
            field: field.to_string(),
            expected: "mapping",
            found,
            locator,
        })?;
        let previous = mapping.insert(field.to_string(), value);

        let outcome = Presentation::from_schema(presenters, self, node).get(field).map(|_| ());
        if let Err(error) = outcome {
            tracing::debug!(field, %error, "rolling back field write");
            if let Some(mapping) = node.as_mapping_mut() {
                match previous {
                    Some(previous) => {
                        mapping.insert(field.to_string(), previous);
                    }
                    None => {
                        mapping.shift_remove(field);
                    }
                }
            }
            return Err(error);
        }

        Ok(())
    }
}

pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        assert!(
            !self.schema.fields.contains_key(field.name),
            "field `{}` declared twice on {}",
            field.name,
            self.schema.name,
        );
        self.schema.fields.insert(field.name, field);
        self
    }

    pub fn short_form(mut self, field: &'static str) -> Self {
        assert!(
            self.schema.fields.contains_key(field),
            "short form field `{field}` is not declared on {}",
            self.schema.name,
        );
        self.schema.short_form = Some(field);
        self
    }

    pub fn allow_unknown_fields(mut self) -> Self {
        self.schema.allow_unknown_fields = true;
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

/// Registry of presentation schemas
///
/// Constructed by the caller and extended through explicit registration calls
/// (see [crate::tosca::register]).
#[derive(Debug, Default)]
pub struct Presenters {
    schemas: IndexMap<&'static str, Arc<Schema>>,
}

impl Presenters {
    pub fn register(&mut self, schema: Schema) {
        if self.schemas.contains_key(schema.name) {
            tracing::debug!(schema = schema.name, "replacing registered schema");
        }
        self.schemas.insert(schema.name, Arc::new(schema));
    }

    pub fn get(&self, name: &str) -> Result<&Schema, Error> {
        self.schemas
            .get(name)
            .map(Arc::as_ref)
            .ok_or_else(|| Error::UnknownPresenter(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Checks that every nested presentation element names a registered schema
    pub fn verify(&self) -> Result<(), Error> {
        for schema in self.schemas.values() {
            for field in schema.fields() {
                if let Element::Presentation(nested) = field.element {
                    self.get(nested)?;
                }
            }
        }
        Ok(())
    }
}

/// Wraps a value node in a fresh mapping under `field`
pub fn mapping_with(field: &str, value: Node) -> Node {
    let mut mapping = IndexMap::new();
    mapping.insert(field.to_string(), value);
    Node::new(Data::Mapping(mapping))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::presentation::field::Primitive;
    use crate::value::Value;

    fn presenters() -> Presenters {
        let mut presenters = Presenters::default();
        presenters.register(
            Schema::builder("Port")
                .field(FieldDescriptor::scalar("number", Primitive::Integer).required())
                .field(FieldDescriptor::scalar("protocol", Primitive::String).allowed(["tcp", "udp"]))
                .short_form("number")
                .build(),
        );
        presenters
    }

    #[test]
    fn set_writes_through() {
        let presenters = presenters();
        let schema = presenters.get("Port").unwrap();
        let mut node = mapping_with("number", Node::from(80));

        schema
            .set(&presenters, &mut node, "protocol", Node::from("udp"))
            .unwrap();

        assert_eq!(node.get("protocol").and_then(Node::as_str), Some("udp"));
    }

    #[test]
    fn failed_set_rolls_back() {
        let presenters = presenters();
        let schema = presenters.get("Port").unwrap();
        let mut node = mapping_with("number", Node::from(80));
        node.as_mapping_mut()
            .unwrap()
            .insert("protocol".into(), Node::from("tcp"));
        let before = node.clone();

        let result = schema.set(&presenters, &mut node, "protocol", Node::from("icmp"));
        assert!(matches!(result, Err(FieldError::NotAllowed { .. })));
        assert_eq!(node, before);

        let result = schema.set(&presenters, &mut node, "number", Node::from("eighty"));
        assert!(matches!(result, Err(FieldError::TypeCoercion { .. })));
        assert_eq!(node, before);
    }

    #[test]
    fn set_on_short_form() {
        let presenters = presenters();
        let schema = presenters.get("Port").unwrap();
        let mut node = Node::from(80);

        schema.set(&presenters, &mut node, "number", Node::from(443)).unwrap();
        let presentation = Presentation::from_schema(&presenters, schema, &node);
        assert_eq!(presentation.value("number"), Some(Value::Integer(443)));
    }

    #[test]
    #[should_panic(expected = "declared twice")]
    fn duplicate_fields_are_rejected() {
        Schema::builder("Broken")
            .field(FieldDescriptor::scalar("a", Primitive::Any))
            .field(FieldDescriptor::scalar("a", Primitive::Any));
    }

    #[test]
    fn verify_reports_missing_nested_schema() {
        let mut presenters = Presenters::default();
        presenters.register(
            Schema::builder("Outer")
                .field(FieldDescriptor::object("inner", "Inner"))
                .build(),
        );

        assert!(matches!(presenters.verify(), Err(Error::UnknownPresenter(name)) if name == "Inner"));
    }
}
