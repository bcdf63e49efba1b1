//! Arena of types and templates
//!
//! Every entity lives in a table keyed by name. Entities refer to each other by name only, so
//! derivation chains and requirement targets are resolved as lookups into this arena.
//!
//! A registry is filled from all loaded documents and then sealed. Linking and instantiation
//! refuse an unsealed registry.
use crate::constraints::NodeFilter;
use crate::definitions::{
    artifacts_of, definitions_of, interfaces_of, ArtifactDefinition, CapabilityDefinition,
    InterfaceDefinition, OperationDefinition, PropertyDefinition, RequirementDefinition,
};
use crate::document::{Documents, Locator};
use crate::issue::{Error, Issue, IssueKind, Issues};
use crate::presentation::{NameIndex, Presentation, Presenters, ValidationContext};
use crate::value::Value;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Node,
    Relationship,
    Capability,
    Interface,
    Artifact,
    Data,
    Group,
    Policy,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Node,
        Category::Relationship,
        Category::Capability,
        Category::Interface,
        Category::Artifact,
        Category::Data,
        Category::Group,
        Category::Policy,
    ];

    /// Top level section of a service template
    pub fn section(&self) -> &'static str {
        match self {
            Category::Node => "node_types",
            Category::Relationship => "relationship_types",
            Category::Capability => "capability_types",
            Category::Interface => "interface_types",
            Category::Artifact => "artifact_types",
            Category::Data => "data_types",
            Category::Group => "group_types",
            Category::Policy => "policy_types",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Category::Node => "node type",
            Category::Relationship => "relationship type",
            Category::Capability => "capability type",
            Category::Interface => "interface type",
            Category::Artifact => "artifact type",
            Category::Data => "data type",
            Category::Group => "group type",
            Category::Policy => "policy type",
        };
        f.write_str(name)
    }
}

/// A type of any category. Category-specific tables stay empty where they do not apply.
#[derive(Debug, Clone, Default)]
pub struct TypeEntity {
    pub name: String,
    pub derived_from: Option<String>,
    pub description: Option<String>,
    pub locator: Option<Locator>,
    pub properties: IndexMap<String, PropertyDefinition>,
    pub attributes: IndexMap<String, PropertyDefinition>,
    pub capabilities: IndexMap<String, CapabilityDefinition>,
    pub requirements: Vec<(String, RequirementDefinition)>,
    pub interfaces: IndexMap<String, InterfaceDefinition>,
    pub artifacts: IndexMap<String, ArtifactDefinition>,
    /// interface types
    pub inputs: IndexMap<String, PropertyDefinition>,
    /// interface types
    pub operations: IndexMap<String, OperationDefinition>,
    /// capability types
    pub valid_source_types: Option<Vec<String>>,
    /// relationship types
    pub valid_target_types: Option<Vec<String>>,
    /// group types
    pub members: Option<Vec<String>>,
    /// policy types
    pub targets: Option<Vec<String>>,
    /// data types
    pub constraints: Vec<Value>,
}

impl TypeEntity {
    /// Fields the category's schema does not declare read as empty
    pub fn from_presentation(name: &str, presentation: &Presentation<'_>) -> Self {
        Self {
            name: name.to_string(),
            derived_from: presentation.string("derived_from"),
            description: presentation.string("description"),
            locator: presentation.locator().cloned(),
            properties: definitions_of(presentation, "properties"),
            attributes: definitions_of(presentation, "attributes"),
            capabilities: presentation
                .object_map("capabilities")
                .into_iter()
                .map(|(name, capability)| {
                    (name.to_string(), CapabilityDefinition::from_presentation(&capability))
                })
                .collect(),
            requirements: presentation
                .sequenced("requirements")
                .into_iter()
                .filter_map(|(name, value)| {
                    let requirement = value.as_presentation()?;
                    Some((name.to_string(), RequirementDefinition::from_presentation(&requirement)))
                })
                .collect(),
            interfaces: interfaces_of(presentation),
            artifacts: artifacts_of(presentation),
            inputs: definitions_of(presentation, "inputs"),
            operations: presentation
                .object_map("operations")
                .into_iter()
                .map(|(name, operation)| {
                    (name.to_string(), OperationDefinition::from_presentation(&operation))
                })
                .collect(),
            valid_source_types: presentation.strings("valid_source_types"),
            valid_target_types: presentation.strings("valid_target_types"),
            members: presentation.strings("members"),
            targets: presentation.strings("targets"),
            constraints: presentation
                .objects("constraints")
                .iter()
                .map(|clause| Value::from(clause.node()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeTemplate {
    pub name: String,
    pub type_name: String,
    pub description: Option<String>,
    pub directives: Vec<String>,
    pub properties: IndexMap<String, Value>,
    pub attributes: IndexMap<String, Value>,
    pub capabilities: IndexMap<String, CapabilityAssignment>,
    /// Declared order is the fulfillment priority
    pub requirements: Vec<(String, RequirementAssignment)>,
    pub interfaces: IndexMap<String, InterfaceDefinition>,
    pub artifacts: IndexMap<String, ArtifactDefinition>,
    /// Constrains every requirement target of this template
    pub node_filter: Option<NodeFilter>,
    pub locator: Option<Locator>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityAssignment {
    pub properties: IndexMap<String, Value>,
    pub attributes: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct RequirementAssignment {
    pub capability: Option<String>,
    pub node: Option<String>,
    pub relationship: Option<RelationshipAssignment>,
    pub node_filter: Option<NodeFilter>,
    pub locator: Option<Locator>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipAssignment {
    /// Relationship template name or relationship type name
    pub type_or_template: String,
    pub properties: IndexMap<String, Value>,
    pub interfaces: IndexMap<String, InterfaceDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipTemplate {
    pub name: String,
    pub type_name: String,
    pub description: Option<String>,
    pub properties: IndexMap<String, Value>,
    pub interfaces: IndexMap<String, InterfaceDefinition>,
    pub locator: Option<Locator>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupDefinition {
    pub name: String,
    pub type_name: String,
    pub members: Vec<String>,
    pub properties: IndexMap<String, Value>,
    pub interfaces: IndexMap<String, InterfaceDefinition>,
    pub locator: Option<Locator>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDefinition {
    pub name: String,
    pub type_name: String,
    pub targets: Vec<String>,
    pub properties: IndexMap<String, Value>,
    pub locator: Option<Locator>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputDefinition {
    pub description: Option<String>,
    pub value: Value,
    pub locator: Option<Locator>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowDefinition {
    pub mapping: String,
    pub parameters: IndexMap<String, PropertyDefinition>,
}

#[derive(Debug)]
pub struct Registry {
    types: IndexMap<Category, IndexMap<String, TypeEntity>>,
    pub node_templates: IndexMap<String, NodeTemplate>,
    pub relationship_templates: IndexMap<String, RelationshipTemplate>,
    pub groups: IndexMap<String, GroupDefinition>,
    pub policies: IndexMap<String, PolicyDefinition>,
    pub inputs: IndexMap<String, PropertyDefinition>,
    pub outputs: IndexMap<String, OutputDefinition>,
    pub workflows: IndexMap<String, WorkflowDefinition>,
    pub description: Option<String>,
    sealed: bool,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            types: Category::ALL
                .into_iter()
                .map(|category| (category, IndexMap::new()))
                .collect(),
            node_templates: Default::default(),
            relationship_templates: Default::default(),
            groups: Default::default(),
            policies: Default::default(),
            inputs: Default::default(),
            outputs: Default::default(),
            workflows: Default::default(),
            description: None,
            sealed: false,
        }
    }
}

impl Registry {
    /// Validates every document and merges it into one sealed registry
    #[tracing::instrument(level = "debug", skip_all, fields(documents = documents.document_count()))]
    pub fn load(documents: &Documents, presenters: &Presenters, issues: &mut Issues) -> Result<Self, Error> {
        let names = NameIndex::collect(documents);
        let mut registry = Registry::default();

        for (index, _source, root) in documents.documents() {
            let service_template = Presentation::new(presenters, "ServiceTemplate", root)?;
            service_template.validate(&mut ValidationContext::new(issues, &names))?;
            tracing::debug!(document = index, "validated");

            registry.extend(&service_template, issues);
        }

        registry.seal();
        Ok(registry)
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn ensure_sealed(&self) -> Result<(), Error> {
        if self.sealed {
            Ok(())
        } else {
            Err(Error::RegistryNotSealed)
        }
    }

    pub fn types(&self, category: Category) -> impl Iterator<Item = &TypeEntity> {
        self.types.get(&category).into_iter().flat_map(IndexMap::values)
    }

    pub fn type_count(&self, category: Category) -> usize {
        self.types.get(&category).map_or(0, IndexMap::len)
    }

    pub fn get_type(&self, category: Category, name: &str) -> Option<&TypeEntity> {
        self.types.get(&category)?.get(name)
    }

    /// Inserts a type; a second type of the same name is reported and dropped
    pub fn insert_type(&mut self, category: Category, entity: TypeEntity, issues: &mut Issues) {
        let table = self.types.entry(category).or_default();
        if let Some(existing) = table.get(&entity.name) {
            issues.log(
                Issue::error(
                    IssueKind::DuplicateName,
                    format!("{category} `{}` is declared more than once", entity.name),
                )
                .at(entity.locator.as_ref())
                .caused_by(format!(
                    "first declared at {}",
                    existing.locator.as_ref().map_or("<unknown>".to_string(), ToString::to_string)
                )),
            );
            return;
        }
        table.insert(entity.name.clone(), entity);
    }

    /// Merges one validated service template
    pub fn extend(&mut self, service_template: &Presentation<'_>, issues: &mut Issues) {
        if self.description.is_none() {
            self.description = service_template.string("description");
        }

        for category in Category::ALL {
            for (name, presentation) in service_template.object_map(category.section()) {
                self.insert_type(category, TypeEntity::from_presentation(name, &presentation), issues);
            }
        }

        let Some(topology) = service_template.object("topology_template") else {
            return;
        };

        if let Some(description) = topology.string("description") {
            self.description = Some(description);
        }

        for (name, presentation) in topology.object_map("inputs") {
            insert_unique(&mut self.inputs, "input", name, PropertyDefinition::from_presentation(&presentation), presentation.locator(), issues);
        }

        for (name, presentation) in topology.object_map("node_templates") {
            let template = node_template(name, &presentation);
            insert_unique(&mut self.node_templates, "node template", name, template, presentation.locator(), issues);
        }

        for (name, presentation) in topology.object_map("relationship_templates") {
            let template = RelationshipTemplate {
                name: name.to_string(),
                type_name: presentation.string("type").unwrap_or_default(),
                description: presentation.string("description"),
                properties: presentation.value_map("properties"),
                interfaces: interfaces_of(&presentation),
                locator: presentation.locator().cloned(),
            };
            insert_unique(&mut self.relationship_templates, "relationship template", name, template, presentation.locator(), issues);
        }

        for (name, presentation) in topology.object_map("groups") {
            let group = GroupDefinition {
                name: name.to_string(),
                type_name: presentation.string("type").unwrap_or_default(),
                members: presentation.strings("members").unwrap_or_default(),
                properties: presentation.value_map("properties"),
                interfaces: interfaces_of(&presentation),
                locator: presentation.locator().cloned(),
            };
            insert_unique(&mut self.groups, "group", name, group, presentation.locator(), issues);
        }

        for (name, presentation) in topology.object_map("policies") {
            let policy = PolicyDefinition {
                name: name.to_string(),
                type_name: presentation.string("type").unwrap_or_default(),
                targets: presentation.strings("targets").unwrap_or_default(),
                properties: presentation.value_map("properties"),
                locator: presentation.locator().cloned(),
            };
            insert_unique(&mut self.policies, "policy", name, policy, presentation.locator(), issues);
        }

        for (name, presentation) in topology.object_map("outputs") {
            let output = OutputDefinition {
                description: presentation.string("description"),
                value: presentation.value("value").unwrap_or_default(),
                locator: presentation.locator().cloned(),
            };
            insert_unique(&mut self.outputs, "output", name, output, presentation.locator(), issues);
        }

        for (name, presentation) in topology.object_map("workflows") {
            let workflow = WorkflowDefinition {
                mapping: presentation.string("mapping").unwrap_or_default(),
                parameters: definitions_of(&presentation, "parameters"),
            };
            insert_unique(&mut self.workflows, "workflow", name, workflow, presentation.locator(), issues);
        }
    }
}

fn insert_unique<T>(
    table: &mut IndexMap<String, T>,
    what: &str,
    name: &str,
    entity: T,
    locator: Option<&Locator>,
    issues: &mut Issues,
) {
    if table.contains_key(name) {
        issues.log(
            Issue::error(IssueKind::DuplicateName, format!("{what} `{name}` is declared more than once"))
                .at(locator),
        );
        return;
    }
    table.insert(name.to_string(), entity);
}

fn node_template(name: &str, presentation: &Presentation<'_>) -> NodeTemplate {
    NodeTemplate {
        name: name.to_string(),
        type_name: presentation.string("type").unwrap_or_default(),
        description: presentation.string("description"),
        directives: presentation.strings("directives").unwrap_or_default(),
        properties: presentation.value_map("properties"),
        attributes: presentation.value_map("attributes"),
        capabilities: presentation
            .object_map("capabilities")
            .into_iter()
            .map(|(name, capability)| {
                let assignment = CapabilityAssignment {
                    properties: capability.value_map("properties"),
                    attributes: capability.value_map("attributes"),
                };
                (name.to_string(), assignment)
            })
            .collect(),
        requirements: presentation
            .sequenced("requirements")
            .into_iter()
            .filter_map(|(name, value)| {
                let requirement = value.as_presentation()?;
                let assignment = RequirementAssignment {
                    capability: requirement.string("capability"),
                    node: requirement.string("node"),
                    relationship: requirement.object("relationship").map(|relationship| {
                        RelationshipAssignment {
                            type_or_template: relationship.string("type").unwrap_or_default(),
                            properties: relationship.value_map("properties"),
                            interfaces: interfaces_of(&relationship),
                        }
                    }),
                    node_filter: requirement
                        .object("node_filter")
                        .map(|filter| NodeFilter::from_presentation(&filter)),
                    locator: requirement.locator().cloned(),
                };
                Some((name.to_string(), assignment))
            })
            .collect(),
        interfaces: interfaces_of(presentation),
        artifacts: artifacts_of(presentation),
        node_filter: presentation
            .object("node_filter")
            .map(|filter| NodeFilter::from_presentation(&filter)),
        locator: presentation.locator().cloned(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::documents;
    use pretty_assertions::assert_eq;

    fn load(documents: Documents) -> (Registry, Issues) {
        let mut presenters = Presenters::default();
        crate::tosca::register(&mut presenters);
        let mut issues = Issues::new();
        let registry = Registry::load(&documents, &presenters, &mut issues).expect("no engine errors");
        (registry, issues)
    }

    #[test]
    fn merges_documents_and_seals() {
        let (registry, issues) = load(documents! {
            "types.yaml" => "tosca_definitions_version: tosca_simple_yaml_1_3\nnode_types:\n  Web:\n    properties:\n      port: {type: integer, default: 80}\n  Db: {}",
            "topology.yaml" => "tosca_definitions_version: tosca_simple_yaml_1_3\ntopology_template:\n  node_templates:\n    server: {type: Web}\n    web1:\n      type: Web\n      requirements:\n        - host: server\n        - db: {node: Db, capability: Endpoint}"
        });

        assert!(issues.is_empty(), "{issues}");
        assert!(registry.is_sealed());
        let web = registry.get_type(Category::Node, "Web").unwrap();
        assert_eq!(web.properties["port"].default, Some(Value::Integer(80)));

        let template = &registry.node_templates["web1"];
        let names: Vec<_> = template.requirements.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["host", "db"]);
        assert_eq!(template.requirements[0].1.node.as_deref(), Some("server"));
        assert_eq!(template.requirements[1].1.capability.as_deref(), Some("Endpoint"));
    }

    #[test]
    fn duplicate_types_are_reported() {
        let (registry, issues) = load(documents! {
            "a.yaml" => "tosca_definitions_version: tosca_simple_yaml_1_3\nnode_types:\n  Web: {description: first}",
            "b.yaml" => "tosca_definitions_version: tosca_simple_yaml_1_3\nnode_types:\n  Web: {description: second}"
        });

        assert_eq!(issues.of_kind(IssueKind::DuplicateName).count(), 1);
        let web = registry.get_type(Category::Node, "Web").unwrap();
        assert_eq!(web.description.as_deref(), Some("first"));
    }

    #[test]
    fn unsealed_registries_are_rejected() {
        let registry = Registry::default();
        assert!(matches!(registry.ensure_sealed(), Err(Error::RegistryNotSealed)));
    }
}
