//! Field validators
//!
//! The default validator re-reads the field and recurses into nested presentations. The other
//! validators wrap it and add checks against the [NameIndex].
use super::field::{FieldDescriptor, Validator};
use super::Presentation;
use crate::constraints::Constraint;
use crate::definitions::parse_occurrences;
use crate::document::{Documents, Node};
use crate::issue::{Error, Issue, IssueKind, Issues};
use crate::registry::Category;
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

/// Names declared across all loaded documents, gathered before validation
#[derive(Debug, Default, Clone)]
pub struct NameIndex {
    types: IndexMap<Category, IndexSet<String>>,
    pub node_templates: IndexSet<String>,
    pub relationship_templates: IndexSet<String>,
    pub groups: IndexSet<String>,
}

impl NameIndex {
    pub fn collect(documents: &Documents) -> Self {
        let mut index = Self::default();
        for (_, _, root) in documents.documents() {
            for category in Category::ALL {
                let names = index.types.entry(category).or_default();
                names.extend(keys_of(root.get(category.section())));
            }

            let topology = root.get("topology_template");
            let section = |name| topology.and_then(|topology| topology.get(name));
            index.node_templates.extend(keys_of(section("node_templates")));
            index
                .relationship_templates
                .extend(keys_of(section("relationship_templates")));
            index.groups.extend(keys_of(section("groups")));
        }
        index
    }

    pub fn has_type(&self, category: Category, name: &str) -> bool {
        self.types
            .get(&category)
            .is_some_and(|names| names.contains(name))
    }
}

fn keys_of(node: Option<&Node>) -> Vec<String> {
    node.and_then(Node::as_mapping)
        .map(|mapping| mapping.keys().cloned().collect())
        .unwrap_or_default()
}

pub struct ValidationContext<'c> {
    pub issues: &'c mut Issues,
    pub names: &'c NameIndex,
}

impl<'c> ValidationContext<'c> {
    pub fn new(issues: &'c mut Issues, names: &'c NameIndex) -> Self {
        Self { issues, names }
    }
}

/// Re-runs `get` and recurses into nested presentations
pub fn default_validator(
    presentation: &Presentation<'_>,
    descriptor: &FieldDescriptor,
    context: &mut ValidationContext<'_>,
) -> Result<(), Error> {
    match presentation.get(descriptor.name) {
        Ok(Some(value)) => {
            for nested in value.presentations() {
                nested.validate(context)?;
            }
        }
        Ok(None) => {}
        Err(error) => context.issues.log(error.into_issue()?),
    }
    Ok(())
}

/// Runs the default validator, then checks every string value of the field with `check`
fn with_names(
    check: impl Fn(&str, &NameIndex) -> Option<String> + Send + Sync + 'static,
) -> Validator {
    Arc::new(move |presentation: &Presentation<'_>, descriptor: &FieldDescriptor, context: &mut ValidationContext<'_>| {
        default_validator(presentation, descriptor, context)?;
        let Ok(Some(value)) = presentation.get(descriptor.name) else {
            return Ok(());
        };
        for name in value.values().into_iter().filter_map(Value::as_str) {
            if let Some(message) = check(name, context.names) {
                context.issues.log(
                    Issue::error(IssueKind::UnknownType, message)
                        .at(presentation.field_locator(descriptor.name)),
                );
            }
        }
        Ok(())
    })
}

/// Value must name a type of the category
pub fn known_type(category: Category) -> Validator {
    with_names(move |name, names| {
        (!names.has_type(category, name)).then(|| format!("unknown {category} `{name}`"))
    })
}

/// Value must name a primitive type or a data type
pub fn known_data_type() -> Validator {
    with_names(|name, names| {
        (!crate::coerce::is_primitive_type(name) && !names.has_type(Category::Data, name))
            .then(|| format!("unknown data type `{name}`"))
    })
}

/// Value must name a node template or a node type
pub fn node_template_or_type() -> Validator {
    with_names(|name, names| {
        (!names.node_templates.contains(name) && !names.has_type(Category::Node, name))
            .then(|| format!("unknown node template or node type `{name}`"))
    })
}

/// Value must name a relationship template or a relationship type
pub fn relationship_template_or_type() -> Validator {
    with_names(|name, names| {
        (!names.relationship_templates.contains(name)
            && !names.has_type(Category::Relationship, name))
        .then(|| format!("unknown relationship template or relationship type `{name}`"))
    })
}

/// Every value must name a node template or group
pub fn known_members() -> Validator {
    with_names(|name, names| {
        (!names.node_templates.contains(name) && !names.groups.contains(name))
            .then(|| format!("unknown member `{name}`"))
    })
}

/// Every entry must be a single valid constraint clause
pub fn constraint_clauses() -> Validator {
    Arc::new(|presentation: &Presentation<'_>, descriptor: &FieldDescriptor, context: &mut ValidationContext<'_>| {
        default_validator(presentation, descriptor, context)?;
        for clause in presentation.objects(descriptor.name) {
            if let Err(message) = Constraint::parse(&Value::from(clause.node())) {
                context.issues.log(
                    Issue::error(IssueKind::NotAllowed, message).at(clause.locator()),
                );
            }
        }
        Ok(())
    })
}

/// `[min, max]` with `max` an integer or `UNBOUNDED`
pub fn occurrences() -> Validator {
    Arc::new(|presentation: &Presentation<'_>, descriptor: &FieldDescriptor, context: &mut ValidationContext<'_>| {
        default_validator(presentation, descriptor, context)?;
        if let Some(value) = presentation.value(descriptor.name) {
            if let Err(message) = parse_occurrences(&value) {
                context.issues.log(
                    Issue::error(IssueKind::NotAllowed, message)
                        .at(presentation.field_locator(descriptor.name)),
                );
            }
        }
        Ok(())
    })
}

/// Node filter property entries: `name: {clause}` or `name: [clauses]`
pub fn filter_clauses() -> Validator {
    Arc::new(|presentation: &Presentation<'_>, descriptor: &FieldDescriptor, context: &mut ValidationContext<'_>| {
        default_validator(presentation, descriptor, context)?;
        for (name, value) in presentation.sequenced(descriptor.name) {
            let Some(value) = value.as_value() else {
                continue;
            };
            if let Err(message) = Constraint::parse_many(value) {
                context.issues.log(
                    Issue::error(IssueKind::NotAllowed, format!("node filter on `{name}`: {message}"))
                        .at(presentation.field_locator(descriptor.name)),
                );
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::documents;
    use crate::presentation::{Presenters, Primitive, Schema};

    #[test]
    fn collects_names_across_documents() {
        let documents = documents! {
            "types.yaml" => "node_types:\n  Web: {}\ndata_types:\n  Port: {}",
            "topology.yaml" => "topology_template:\n  node_templates:\n    web1: {type: Web}"
        };
        let names = NameIndex::collect(&documents);

        assert!(names.has_type(Category::Node, "Web"));
        assert!(names.has_type(Category::Data, "Port"));
        assert!(!names.has_type(Category::Node, "Port"));
        assert!(names.node_templates.contains("web1"));
    }

    #[test]
    fn known_type_wraps_default_validation() {
        let mut presenters = Presenters::default();
        presenters.register(
            Schema::builder("Template")
                .field(
                    FieldDescriptor::scalar("type", Primitive::String)
                        .required()
                        .validator(known_type(Category::Node)),
                )
                .build(),
        );
        let documents = documents!("node_types:\n  Web: {}");
        let names = NameIndex::collect(&documents);

        for (text, expected) in [("type: Web", None), ("type: Db", Some(IssueKind::UnknownType)), ("{}", Some(IssueKind::RequiredFieldMissing))] {
            let docs = documents!(text);
            let mut issues = Issues::new();
            Presentation::new(&presenters, "Template", docs.get_document(0).2)
                .unwrap()
                .validate(&mut ValidationContext::new(&mut issues, &names))
                .unwrap();
            assert_eq!(issues.iter().next().map(|issue| issue.kind), expected, "{text}");
        }
    }
}
