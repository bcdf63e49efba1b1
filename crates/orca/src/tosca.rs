//! Built-in schema table
//!
//! [register] adds every presentation schema of the template language to a [Presenters]
//! registry. Callers that want extra schemas register them afterwards; a later registration
//! replaces an earlier one of the same name.
use crate::presentation::validate::{
    constraint_clauses, filter_clauses, known_data_type, known_members, known_type,
    node_template_or_type, occurrences, relationship_template_or_type,
};
use crate::presentation::{Element, FieldDescriptor as F, Presenters, Primitive, Schema, SchemaBuilder};
use crate::registry::Category;

pub const VERSIONS: [&str; 4] = [
    "tosca_simple_yaml_1_0",
    "tosca_simple_yaml_1_1",
    "tosca_simple_yaml_1_2",
    "tosca_simple_yaml_1_3",
];

pub fn register(presenters: &mut Presenters) {
    for schema in [
        service_template(),
        topology_template(),
        node_type(),
        relationship_type(),
        capability_type(),
        interface_type(),
        artifact_type(),
        data_type(),
        group_type(),
        policy_type(),
        property_definition(),
        attribute_definition(),
        entry_schema(),
        constraint_clause(),
        capability_definition(),
        requirement_definition(),
        relationship_definition(),
        interface_definition(),
        operation_definition(),
        artifact_definition(),
        node_template(),
        capability_assignment(),
        requirement_assignment(),
        relationship_assignment(),
        node_filter(),
        node_filter_capability(),
        relationship_template(),
        group_definition(),
        policy_definition(),
        output_definition(),
        workflow_definition(),
    ] {
        presenters.register(schema);
    }
    tracing::debug!(schemas = presenters.len(), "registered built-in schemas");
}

fn service_template() -> Schema {
    let mut builder = Schema::builder("ServiceTemplate")
        .field(F::scalar("tosca_definitions_version", Primitive::String).required().allowed(VERSIONS))
        .field(F::scalar("description", Primitive::String))
        .field(F::scalar("metadata", Primitive::Map))
        .field(F::scalar("imports", Primitive::List))
        .field(F::scalar("repositories", Primitive::Map))
        .field(F::scalar("dsl_definitions", Primitive::Any));
    for category in Category::ALL {
        builder = builder.field(F::object_map(category.section(), type_schema(category)));
    }
    builder
        .field(F::object("topology_template", "TopologyTemplate"))
        .build()
}

fn type_schema(category: Category) -> &'static str {
    match category {
        Category::Node => "NodeType",
        Category::Relationship => "RelationshipType",
        Category::Capability => "CapabilityType",
        Category::Interface => "InterfaceType",
        Category::Artifact => "ArtifactType",
        Category::Data => "DataType",
        Category::Group => "GroupType",
        Category::Policy => "PolicyType",
    }
}

fn topology_template() -> Schema {
    Schema::builder("TopologyTemplate")
        .field(F::scalar("description", Primitive::String))
        .field(F::object_map("inputs", "PropertyDefinition"))
        .field(F::object_map("node_templates", "NodeTemplate"))
        .field(F::object_map("relationship_templates", "RelationshipTemplate"))
        .field(F::object_map("groups", "GroupDefinition"))
        .field(F::object_map("policies", "PolicyDefinition"))
        .field(F::object_map("outputs", "OutputDefinition"))
        .field(F::object_map("workflows", "WorkflowDefinition"))
        .field(F::scalar("substitution_mappings", Primitive::Map))
        .build()
}

/// Fields shared by all type categories
fn type_builder(category: Category) -> SchemaBuilder {
    let derived_from = match category {
        // data types may derive from a primitive
        Category::Data => F::scalar("derived_from", Primitive::String).validator(known_data_type()),
        category => F::scalar("derived_from", Primitive::String).validator(known_type(category)),
    };
    Schema::builder(type_schema(category))
        .field(derived_from)
        .field(F::scalar("version", Primitive::String))
        .field(F::scalar("description", Primitive::String))
        .field(F::scalar("metadata", Primitive::Map))
}

fn node_type() -> Schema {
    type_builder(Category::Node)
        .field(F::object_map("properties", "PropertyDefinition"))
        .field(F::object_map("attributes", "AttributeDefinition"))
        .field(F::object_map("capabilities", "CapabilityDefinition"))
        .field(F::sequenced("requirements", Element::Presentation("RequirementDefinition")))
        .field(F::object_map("interfaces", "InterfaceDefinition"))
        .field(F::object_map("artifacts", "ArtifactDefinition"))
        .build()
}

fn relationship_type() -> Schema {
    type_builder(Category::Relationship)
        .field(F::object_map("properties", "PropertyDefinition"))
        .field(F::object_map("attributes", "AttributeDefinition"))
        .field(F::object_map("interfaces", "InterfaceDefinition"))
        .field(F::scalar_list("valid_target_types", Primitive::String).validator(known_type(Category::Capability)))
        .build()
}

fn capability_type() -> Schema {
    type_builder(Category::Capability)
        .field(F::object_map("properties", "PropertyDefinition"))
        .field(F::object_map("attributes", "AttributeDefinition"))
        .field(F::scalar_list("valid_source_types", Primitive::String).validator(known_type(Category::Node)))
        .build()
}

fn interface_type() -> Schema {
    type_builder(Category::Interface)
        .field(F::object_map("inputs", "PropertyDefinition"))
        .field(F::unknown_keys("operations", "OperationDefinition"))
        .build()
}

fn artifact_type() -> Schema {
    type_builder(Category::Artifact)
        .field(F::scalar("mime_type", Primitive::String))
        .field(F::scalar_list("file_ext", Primitive::String))
        .field(F::object_map("properties", "PropertyDefinition"))
        .build()
}

fn data_type() -> Schema {
    type_builder(Category::Data)
        .field(F::object_map("properties", "PropertyDefinition"))
        .field(F::object_list("constraints", "ConstraintClause").validator(constraint_clauses()))
        .build()
}

fn group_type() -> Schema {
    type_builder(Category::Group)
        .field(F::object_map("properties", "PropertyDefinition"))
        .field(F::scalar_list("members", Primitive::String))
        .field(F::object_map("interfaces", "InterfaceDefinition"))
        .build()
}

fn policy_type() -> Schema {
    type_builder(Category::Policy)
        .field(F::object_map("properties", "PropertyDefinition"))
        .field(F::scalar_list("targets", Primitive::String))
        .build()
}

/// Also used for topology inputs, interface inputs and workflow parameters
fn property_definition() -> Schema {
    Schema::builder("PropertyDefinition")
        .field(F::scalar("type", Primitive::String).validator(known_data_type()))
        .field(F::scalar("description", Primitive::String))
        .field(F::scalar("required", Primitive::Boolean))
        .field(F::scalar("default", Primitive::Any))
        .field(F::scalar("value", Primitive::Any))
        .field(status())
        .field(F::object_list("constraints", "ConstraintClause").validator(constraint_clauses()))
        .field(F::object("entry_schema", "EntrySchema"))
        .field(F::scalar("metadata", Primitive::Map))
        .build()
}

fn attribute_definition() -> Schema {
    Schema::builder("AttributeDefinition")
        .field(F::scalar("type", Primitive::String).validator(known_data_type()))
        .field(F::scalar("description", Primitive::String))
        .field(F::scalar("default", Primitive::Any))
        .field(status())
        .field(F::object("entry_schema", "EntrySchema"))
        .build()
}

fn status() -> F {
    F::scalar("status", Primitive::String).allowed(["supported", "unsupported", "experimental", "deprecated"])
}

fn entry_schema() -> Schema {
    Schema::builder("EntrySchema")
        .field(F::scalar("type", Primitive::String).required().validator(known_data_type()))
        .field(F::scalar("description", Primitive::String))
        .field(F::object_list("constraints", "ConstraintClause").validator(constraint_clauses()))
        .short_form("type")
        .build()
}

/// Single-key mapping, checked by the `constraint_clauses` validator of the containing field
fn constraint_clause() -> Schema {
    Schema::builder("ConstraintClause").allow_unknown_fields().build()
}

fn capability_definition() -> Schema {
    Schema::builder("CapabilityDefinition")
        .field(F::scalar("type", Primitive::String).required().validator(known_type(Category::Capability)))
        .field(F::scalar("description", Primitive::String))
        .field(F::object_map("properties", "PropertyDefinition"))
        .field(F::object_map("attributes", "AttributeDefinition"))
        .field(F::scalar_list("valid_source_types", Primitive::String).validator(known_type(Category::Node)))
        .field(F::scalar("occurrences", Primitive::List).validator(occurrences()))
        .field(F::scalar("min_occurrences", Primitive::Integer))
        .field(F::scalar("max_occurrences", Primitive::Any))
        .short_form("type")
        .build()
}

fn requirement_definition() -> Schema {
    Schema::builder("RequirementDefinition")
        .field(F::scalar("capability", Primitive::String).required().validator(known_type(Category::Capability)))
        .field(F::scalar("node", Primitive::String).validator(known_type(Category::Node)))
        .field(F::object("relationship", "RelationshipDefinition"))
        .field(F::scalar("occurrences", Primitive::List).validator(occurrences()))
        .field(F::object("node_filter", "NodeFilter"))
        .short_form("capability")
        .build()
}

fn relationship_definition() -> Schema {
    Schema::builder("RelationshipDefinition")
        .field(F::scalar("type", Primitive::String).required().validator(known_type(Category::Relationship)))
        .field(F::object_map("interfaces", "InterfaceDefinition"))
        .short_form("type")
        .build()
}

fn interface_definition() -> Schema {
    Schema::builder("InterfaceDefinition")
        .field(F::scalar("type", Primitive::String).validator(known_type(Category::Interface)))
        .field(F::scalar("inputs", Primitive::Map))
        .field(F::unknown_keys("operations", "OperationDefinition"))
        .build()
}

fn operation_definition() -> Schema {
    Schema::builder("OperationDefinition")
        .field(F::scalar("description", Primitive::String))
        .field(F::scalar("implementation", Primitive::String))
        .field(F::scalar("inputs", Primitive::Map))
        .field(F::scalar("executor", Primitive::String))
        .field(F::scalar("max_retries", Primitive::Integer))
        .field(F::scalar("retry_interval", Primitive::Integer))
        .short_form("implementation")
        .build()
}

fn artifact_definition() -> Schema {
    Schema::builder("ArtifactDefinition")
        .field(F::scalar("type", Primitive::String).validator(known_type(Category::Artifact)))
        .field(F::scalar("file", Primitive::String).required())
        .field(F::scalar("description", Primitive::String))
        .field(F::scalar("repository", Primitive::String))
        .field(F::scalar("deploy_path", Primitive::String))
        .short_form("file")
        .build()
}

fn node_template() -> Schema {
    Schema::builder("NodeTemplate")
        .field(F::scalar("type", Primitive::String).required().validator(known_type(Category::Node)))
        .field(F::scalar("description", Primitive::String))
        .field(F::scalar("metadata", Primitive::Map))
        .field(F::scalar_list("directives", Primitive::String))
        .field(F::scalar("properties", Primitive::Map))
        .field(F::scalar("attributes", Primitive::Map))
        .field(F::sequenced("requirements", Element::Presentation("RequirementAssignment")))
        .field(F::object_map("capabilities", "CapabilityAssignment"))
        .field(F::object_map("interfaces", "InterfaceDefinition"))
        .field(F::object_map("artifacts", "ArtifactDefinition"))
        .field(F::object("node_filter", "NodeFilter"))
        .build()
}

fn capability_assignment() -> Schema {
    Schema::builder("CapabilityAssignment")
        .field(F::scalar("properties", Primitive::Map))
        .field(F::scalar("attributes", Primitive::Map))
        .build()
}

fn requirement_assignment() -> Schema {
    Schema::builder("RequirementAssignment")
        .field(F::scalar("capability", Primitive::String))
        .field(F::scalar("node", Primitive::String).validator(node_template_or_type()))
        .field(F::object("relationship", "RelationshipAssignment"))
        .field(F::object("node_filter", "NodeFilter"))
        .short_form("node")
        .build()
}

fn relationship_assignment() -> Schema {
    Schema::builder("RelationshipAssignment")
        .field(F::scalar("type", Primitive::String).required().validator(relationship_template_or_type()))
        .field(F::scalar("properties", Primitive::Map))
        .field(F::object_map("interfaces", "InterfaceDefinition"))
        .short_form("type")
        .build()
}

fn node_filter() -> Schema {
    Schema::builder("NodeFilter")
        .field(F::sequenced("properties", Element::Primitive(Primitive::Any)).validator(filter_clauses()))
        .field(F::sequenced("capabilities", Element::Presentation("NodeFilterCapability")))
        .build()
}

fn node_filter_capability() -> Schema {
    Schema::builder("NodeFilterCapability")
        .field(F::sequenced("properties", Element::Primitive(Primitive::Any)).validator(filter_clauses()))
        .build()
}

fn relationship_template() -> Schema {
    Schema::builder("RelationshipTemplate")
        .field(F::scalar("type", Primitive::String).required().validator(known_type(Category::Relationship)))
        .field(F::scalar("description", Primitive::String))
        .field(F::scalar("properties", Primitive::Map))
        .field(F::scalar("attributes", Primitive::Map))
        .field(F::object_map("interfaces", "InterfaceDefinition"))
        .build()
}

fn group_definition() -> Schema {
    Schema::builder("GroupDefinition")
        .field(F::scalar("type", Primitive::String).required().validator(known_type(Category::Group)))
        .field(F::scalar("description", Primitive::String))
        .field(F::scalar_list("members", Primitive::String).validator(known_members()))
        .field(F::scalar("properties", Primitive::Map))
        .field(F::object_map("interfaces", "InterfaceDefinition"))
        .build()
}

fn policy_definition() -> Schema {
    Schema::builder("PolicyDefinition")
        .field(F::scalar("type", Primitive::String).required().validator(known_type(Category::Policy)))
        .field(F::scalar("description", Primitive::String))
        .field(F::scalar_list("targets", Primitive::String).validator(known_members()))
        .field(F::scalar("properties", Primitive::Map))
        .build()
}

fn output_definition() -> Schema {
    Schema::builder("OutputDefinition")
        .field(F::scalar("description", Primitive::String))
        .field(F::scalar("value", Primitive::Any).required())
        .build()
}

fn workflow_definition() -> Schema {
    Schema::builder("WorkflowDefinition")
        .field(F::scalar("mapping", Primitive::String).required())
        .field(F::object_map("parameters", "PropertyDefinition"))
        .short_form("mapping")
        .build()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::documents;
    use crate::issue::{IssueKind, Issues};
    use crate::presentation::{NameIndex, Presentation, ValidationContext};
    use pretty_assertions::assert_eq;

    fn validate(text: &str) -> Issues {
        let mut presenters = Presenters::default();
        register(&mut presenters);
        let documents = documents!(text);
        let names = NameIndex::collect(&documents);
        let mut issues = Issues::new();
        Presentation::new(&presenters, "ServiceTemplate", documents.get_document(0).2)
            .unwrap()
            .validate(&mut ValidationContext::new(&mut issues, &names))
            .unwrap();
        issues
    }

    #[test]
    fn every_nested_schema_is_registered() {
        let mut presenters = Presenters::default();
        register(&mut presenters);
        presenters.verify().unwrap();
    }

    #[test]
    fn accepts_short_forms() {
        let issues = validate(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
capability_types:
  Container: {}
relationship_types:
  HostedOn: {}
node_types:
  Server:
    capabilities:
      host: Container
  App:
    properties:
      tags:
        type: list
        entry_schema: string
    requirements:
      - host: Container
      - peer:
          capability: Container
          relationship: HostedOn
          occurrences: [0, UNBOUNDED]
    interfaces:
      Standard:
        create: scripts/create.sh
topology_template:
  node_templates:
    server: {type: Server}
    app:
      type: App
      requirements:
        - host: server
  workflows:
    install: default.install
"#,
        );
        assert!(issues.is_empty(), "{issues}");
    }

    #[test]
    fn reports_unknown_names_and_values() {
        let issues = validate(
            r#"
tosca_definitions_version: tosca_simple_yaml_9_9
node_types:
  App:
    derived_from: Missing
    properties:
      port:
        type: integer
        constraints:
          - between: [1, 2]
topology_template:
  node_templates:
    app:
      type: App
      requirements:
        - host: nowhere
"#,
        );

        let kinds: Vec<_> = issues.iter().map(|issue| issue.kind).collect();
        assert_eq!(
            kinds,
            [
                IssueKind::NotAllowed,
                IssueKind::UnknownType,
                IssueKind::NotAllowed,
                IssueKind::UnknownType,
            ]
        );
    }
}
