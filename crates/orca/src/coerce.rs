//! Property values against primitive and data types
//!
//! Coercion never fails: a value that does not fit is reported and kept as written. Function
//! calls are left alone; they are coerced after evaluation, or never for runtime functions.
use crate::constraints::Constraint;
use crate::definitions::PropertyDefinition;
use crate::document::Locator;
use crate::functions::is_function_call;
use crate::hierarchy::Hierarchy;
use crate::issue::{Issue, IssueKind, Issues};
use crate::registry::Category;
use crate::value::Value;
use indexmap::IndexMap;

pub const PRIMITIVE_TYPES: [&str; 14] = [
    "string",
    "integer",
    "float",
    "boolean",
    "timestamp",
    "null",
    "version",
    "range",
    "list",
    "map",
    "scalar-unit.size",
    "scalar-unit.time",
    "scalar-unit.frequency",
    "scalar-unit.bitrate",
];

pub fn is_primitive_type(name: &str) -> bool {
    PRIMITIVE_TYPES.contains(&name)
}

/// Where a value is being coerced, for messages
#[derive(Debug, Clone, Copy)]
pub struct Site<'s> {
    /// e.g. "node template `web`"
    pub owner: &'s str,
    pub locator: Option<&'s Locator>,
}

#[derive(Debug, Clone, Copy)]
pub struct Coercer<'r> {
    hierarchy: Hierarchy<'r>,
}

impl<'r> Coercer<'r> {
    pub fn new(hierarchy: Hierarchy<'r>) -> Self {
        Self { hierarchy }
    }

    /// Assignments overlaid on definition defaults, in definition order.
    ///
    /// Required properties without value and assignments without definition are reported.
    pub fn merge(
        &self,
        definitions: &IndexMap<String, PropertyDefinition>,
        assigned: &IndexMap<String, Value>,
        site: Site<'_>,
        issues: &mut Issues,
    ) -> IndexMap<String, Value> {
        let mut values = IndexMap::new();
        for (name, definition) in definitions {
            match assigned.get(name).or(definition.default.as_ref()) {
                Some(value) => {
                    values.insert(name.clone(), value.clone());
                }
                None if definition.is_required() => issues.log(
                    Issue::error(
                        IssueKind::RequiredPropertyNotAssigned,
                        format!("required property `{name}` of {} is not assigned", site.owner),
                    )
                    .at(site.locator),
                ),
                None => {}
            }
        }

        for name in assigned.keys().filter(|name| !definitions.contains_key(*name)) {
            issues.log(
                Issue::error(IssueKind::UnknownProperty, format!("{} has no property `{name}`", site.owner))
                    .at(site.locator),
            );
        }

        values
    }

    /// Coerces every value that has a definition and checks its constraints
    pub fn check(
        &self,
        definitions: &IndexMap<String, PropertyDefinition>,
        values: IndexMap<String, Value>,
        site: Site<'_>,
        issues: &mut Issues,
    ) -> IndexMap<String, Value> {
        values
            .into_iter()
            .map(|(name, value)| {
                let value = match definitions.get(&name) {
                    Some(definition) => self.property(&name, definition, value, site, issues),
                    None => value,
                };
                (name, value)
            })
            .collect()
    }

    /// Coerces one property value and checks the definition's constraints
    pub fn property(
        &self,
        name: &str,
        definition: &PropertyDefinition,
        value: Value,
        site: Site<'_>,
        issues: &mut Issues,
    ) -> Value {
        let Some(type_name) = &definition.type_name else {
            return value;
        };
        let value = self.value(type_name, definition.entry_schema.as_deref(), value, name, site, issues);
        if !is_function_call(&value) {
            violations(&definition.parsed_constraints(), &value, name, site, issues);
        }
        value
    }

    /// Coerces a value to a primitive type or a data type
    pub fn value(
        &self,
        type_name: &str,
        entry_schema: Option<&str>,
        value: Value,
        path: &str,
        site: Site<'_>,
        issues: &mut Issues,
    ) -> Value {
        if is_function_call(&value) {
            return value;
        }
        if is_primitive_type(type_name) {
            return self.primitive(type_name, entry_schema, value, path, site, issues);
        }
        if self.hierarchy.registry().get_type(Category::Data, type_name).is_none() {
            // unknown types were reported during validation
            return value;
        }
        self.data_type(type_name, value, path, site, issues)
    }

    fn primitive(
        &self,
        type_name: &str,
        entry_schema: Option<&str>,
        value: Value,
        path: &str,
        site: Site<'_>,
        issues: &mut Issues,
    ) -> Value {
        let coerced = match (type_name, value) {
            ("string", value @ Value::String(_)) => Ok(value),
            ("integer", value @ Value::Integer(_)) => Ok(value),
            ("float", Value::Integer(integer)) => Ok(Value::Decimal(integer as f64)),
            ("float", value @ Value::Decimal(_)) => Ok(value),
            ("boolean", value @ Value::Boolean(_)) => Ok(value),
            ("null", Value::Null) => Ok(Value::Null),
            ("timestamp" | "version", value @ (Value::String(_) | Value::Integer(_) | Value::Decimal(_))) => Ok(value),
            ("range", Value::Array(bounds)) if bounds.len() == 2 => Ok(Value::Array(bounds)),
            (unit, value @ Value::String(_)) if unit.starts_with("scalar-unit.") => Ok(value),
            ("list", Value::Array(items)) => Ok(Value::Array(match entry_schema {
                Some(entry) => items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| self.value(entry, None, item, &format!("{path}[{index}]"), site, issues))
                    .collect(),
                None => items,
            })),
            ("map", Value::Object(entries)) => Ok(Value::Object(match entry_schema {
                Some(entry) => entries
                    .into_iter()
                    .map(|(key, item)| {
                        let item = self.value(entry, None, item, &format!("{path}.{key}"), site, issues);
                        (key, item)
                    })
                    .collect(),
                None => entries,
            })),
            (_, value) => Err(value),
        };

        coerced.unwrap_or_else(|value| {
            issues.log(
                Issue::error(
                    IssueKind::TypeCoercion,
                    format!("{}: `{path}` expects {type_name}, found {} {value}", site.owner, value.kind()),
                )
                .at(site.locator),
            );
            value
        })
    }

    fn data_type(&self, type_name: &str, value: Value, path: &str, site: Site<'_>, issues: &mut Issues) -> Value {
        let chain = self.hierarchy.chain(Category::Data, type_name, issues);
        let constraints: Vec<Constraint> = chain
            .iter()
            .rev()
            .flat_map(|entity| entity.constraints.iter())
            .filter_map(|clause| Constraint::parse(clause).ok())
            .collect();

        // derived from a primitive: the root names it
        let primitive = chain
            .last()
            .and_then(|root| root.derived_from.as_deref())
            .filter(|parent| is_primitive_type(parent));

        let value = match primitive {
            Some(primitive) => self.primitive(primitive, None, value, path, site, issues),
            None => self.complex(type_name, value, path, site, issues),
        };
        violations(&constraints, &value, path, site, issues);
        value
    }

    fn complex(&self, type_name: &str, value: Value, path: &str, site: Site<'_>, issues: &mut Issues) -> Value {
        let Value::Object(fields) = value else {
            issues.log(
                Issue::error(
                    IssueKind::TypeCoercion,
                    format!("{}: `{path}` expects data type `{type_name}`, found {} {value}", site.owner, value.kind()),
                )
                .at(site.locator),
            );
            return value;
        };

        let definitions = self.hierarchy.effective_properties(Category::Data, type_name, issues);
        let mut coerced = IndexMap::new();
        for (name, definition) in &definitions {
            let field_path = format!("{path}.{name}");
            match fields.get(name).or(definition.default.as_ref()) {
                Some(field) => {
                    let field = self.property(&field_path, definition, field.clone(), site, issues);
                    coerced.insert(name.clone(), field);
                }
                None if definition.is_required() => issues.log(
                    Issue::error(
                        IssueKind::RequiredPropertyNotAssigned,
                        format!("{}: required field `{field_path}` of data type `{type_name}` is not assigned", site.owner),
                    )
                    .at(site.locator),
                ),
                None => {}
            }
        }

        for (name, field) in fields {
            if !definitions.contains_key(&name) {
                issues.log(
                    Issue::error(
                        IssueKind::UnknownProperty,
                        format!("{}: data type `{type_name}` has no field `{path}.{name}`", site.owner),
                    )
                    .at(site.locator),
                );
                coerced.insert(name, field);
            }
        }

        Value::Object(coerced)
    }
}

fn violations(constraints: &[Constraint], value: &Value, path: &str, site: Site<'_>, issues: &mut Issues) {
    for constraint in constraints.iter().filter(|constraint| !constraint.check(value)) {
        issues.log(
            Issue::error(
                IssueKind::ConstraintViolation,
                format!("{}: `{path}` value {value} violates {constraint}", site.owner),
            )
            .at(site.locator),
        );
    }
}
