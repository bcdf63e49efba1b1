//! Topology linking
//!
//! Every requirement of every node template is bound to a capability of another node template.
//! Templates are linked in declaration order and their requirements in declared order. Matching
//! is first-fit: the first candidate with a matching capability that still accepts a
//! relationship wins, and earlier bindings are never reconsidered.
//!
//! Capability occurrence counters are shared between all requirements, so linking is strictly
//! sequential and the binding order is part of the result.
use crate::constraints::NodeFilter;
use crate::definitions::{overlay_map, Bound, InterfaceDefinition, PropertyDefinition, RequirementDefinition};
use crate::document::Locator;
use crate::hierarchy::Hierarchy;
use crate::issue::{Error, Issue, IssueKind, Issues};
use crate::registry::{Category, NodeTemplate, Registry, RequirementAssignment};
use crate::value::Value;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unlinked,
    Linking,
    Linked,
    /// At least one requirement found no target
    Unsatisfied,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("capability `{capability}` already has {max} relationship(s)")]
pub struct Exhausted {
    pub capability: String,
    pub max: Bound,
}

/// A capability of a node template
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    pub name: String,
    pub type_name: String,
    /// Capability type properties overlaid with the capability definition's
    pub definitions: IndexMap<String, PropertyDefinition>,
    /// Defaults overlaid with the template's assignments
    pub properties: IndexMap<String, Value>,
    pub min_occurrences: u32,
    pub max_occurrences: Bound,
    pub valid_source_types: Option<Vec<String>>,
    /// Number of requirements bound so far
    pub occurrences: u32,
}

impl Capability {
    /// Accounts for one more bound requirement
    pub fn relate(&mut self) -> Result<(), Exhausted> {
        if !self.max_occurrences.allows(self.occurrences + 1) {
            return Err(Exhausted {
                capability: self.name.clone(),
                max: self.max_occurrences,
            });
        }
        self.occurrences += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTarget {
    Template(String),
    Type(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityTarget {
    /// Capability definition name
    Name(String),
    Type(String),
}

/// Relationship a bound requirement creates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipSpec {
    pub type_name: Option<String>,
    pub template: Option<String>,
    pub properties: IndexMap<String, Value>,
    pub interfaces: IndexMap<String, InterfaceDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub node: String,
    pub capability: String,
}

/// A requirement definition combined with its assignment
#[derive(Debug, Clone)]
pub struct Requirement {
    pub name: String,
    pub node: Option<NodeTarget>,
    pub capability: Option<CapabilityTarget>,
    pub relationship: RelationshipSpec,
    pub node_filter: Option<NodeFilter>,
    pub occurrences: (u32, Bound),
    /// Set once bound
    pub target: Option<Target>,
    pub locator: Option<Locator>,
}

#[derive(Debug, Clone)]
pub struct LinkedNode {
    pub name: String,
    pub type_name: String,
    pub state: LinkState,
    /// Defaults overlaid with assignments, before function evaluation
    pub properties: IndexMap<String, Value>,
    pub capabilities: IndexMap<String, Capability>,
    pub requirements: Vec<Requirement>,
    pub node_filter: Option<NodeFilter>,
    pub locator: Option<Locator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipEdge {
    pub source: String,
    pub requirement: String,
    pub target: String,
    pub capability: String,
    pub relationship: RelationshipSpec,
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub nodes: IndexMap<String, LinkedNode>,
    /// In binding order
    pub relationships: Vec<RelationshipEdge>,
}

impl Topology {
    pub fn node(&self, name: &str) -> Option<&LinkedNode> {
        self.nodes.get(name)
    }

    pub fn occurrences(&self, node: &str, capability: &str) -> Option<u32> {
        Some(self.nodes.get(node)?.capabilities.get(capability)?.occurrences)
    }

    pub fn relationships_from<'t>(&'t self, source: &'t str) -> impl Iterator<Item = &'t RelationshipEdge> + 't {
        self.relationships.iter().filter(move |edge| edge.source == source)
    }
}

pub struct Linker<'r> {
    registry: &'r Registry,
    hierarchy: Hierarchy<'r>,
}

impl<'r> Linker<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            hierarchy: Hierarchy::new(registry),
        }
    }

    /// Links all node templates of a sealed registry
    #[tracing::instrument(level = "debug", skip_all, fields(templates = self.registry.node_templates.len()))]
    pub fn link(&self, issues: &mut Issues) -> Result<Topology, Error> {
        self.registry.ensure_sealed()?;

        let mut nodes: IndexMap<String, LinkedNode> = self
            .registry
            .node_templates
            .values()
            .map(|template| (template.name.clone(), self.node(template, issues)))
            .collect();
        let mut relationships = vec![];

        let names: Vec<String> = nodes.keys().cloned().collect();
        for name in &names {
            let node = node_mut(&mut nodes, name)?;
            node.state = LinkState::Linking;
            let mut requirements = std::mem::take(&mut node.requirements);
            let source_type = node.type_name.clone();
            let source_filter = node.node_filter.clone();

            let mut satisfied = true;
            for requirement in &mut requirements {
                let Some(target) = self.bind(name, &source_type, source_filter.as_ref(), requirement, &mut nodes) else {
                    satisfied = false;
                    issues.log(
                        Issue::error(
                            IssueKind::NoTargetFound,
                            format!("requirement `{}` of node template `{name}` found no target", requirement.name),
                        )
                        .at(requirement.locator.as_ref()),
                    );
                    continue;
                };
                tracing::trace!(source = %name, requirement = %requirement.name, target = %target.node, capability = %target.capability, "bound");
                relationships.push(RelationshipEdge {
                    source: name.clone(),
                    requirement: requirement.name.clone(),
                    target: target.node.clone(),
                    capability: target.capability.clone(),
                    relationship: requirement.relationship.clone(),
                });
                requirement.target = Some(target);
            }

            let node = node_mut(&mut nodes, name)?;
            node.requirements = requirements;
            node.state = if satisfied { LinkState::Linked } else { LinkState::Unsatisfied };
            tracing::debug!(node = %name, state = ?node.state, "linked");
        }

        check_occurrences(&nodes, issues);
        Ok(Topology { nodes, relationships })
    }

    fn node(&self, template: &NodeTemplate, issues: &mut Issues) -> LinkedNode {
        let definitions = self
            .hierarchy
            .effective_properties(Category::Node, &template.type_name, issues);
        let mut properties = defaults(&definitions);
        properties.extend(template.properties.clone());

        LinkedNode {
            name: template.name.clone(),
            type_name: template.type_name.clone(),
            state: LinkState::Unlinked,
            properties,
            capabilities: self.capabilities(template, issues),
            requirements: self.requirements(template, issues),
            node_filter: template.node_filter.clone(),
            locator: template.locator.clone(),
        }
    }

    fn capabilities(&self, template: &NodeTemplate, issues: &mut Issues) -> IndexMap<String, Capability> {
        let definitions = self
            .hierarchy
            .effective_capabilities(Category::Node, &template.type_name, issues);

        for name in template.capabilities.keys().filter(|name| !definitions.contains_key(*name)) {
            issues.log(
                Issue::error(
                    IssueKind::UnknownCapability,
                    format!("node template `{}`: node type `{}` has no capability `{name}`", template.name, template.type_name),
                )
                .at(template.locator.as_ref()),
            );
        }

        definitions
            .into_iter()
            .map(|(name, definition)| {
                let type_name = definition.type_name.clone().unwrap_or_default();
                let mut definitions = self
                    .hierarchy
                    .effective_properties(Category::Capability, &type_name, issues);
                let mut conflicts = vec![];
                overlay_map(&mut definitions, &definition.properties, &format!("capabilities.{name}.properties"), &mut conflicts);
                for conflict in conflicts {
                    issues.log(
                        Issue::error(
                            IssueKind::TypeOverrideConflict,
                            format!(
                                "node type `{}` cannot change the data type of {} from `{}` to `{}`",
                                template.type_name, conflict.path, conflict.kept, conflict.attempted
                            ),
                        )
                        .at(conflict.locator.as_ref()),
                    );
                }

                let mut properties = defaults(&definitions);
                if let Some(assignment) = template.capabilities.get(&name) {
                    properties.extend(assignment.properties.clone());
                }

                let valid_source_types = definition.valid_source_types.clone().or_else(|| {
                    self.hierarchy
                        .effective_list(Category::Capability, &type_name, |entity| entity.valid_source_types.as_ref())
                });
                let capability = Capability {
                    name: name.clone(),
                    type_name,
                    definitions,
                    properties,
                    min_occurrences: definition.min_occurrences.unwrap_or(1),
                    max_occurrences: definition.max_occurrences.unwrap_or(Bound::Unbounded),
                    valid_source_types,
                    occurrences: 0,
                };
                (name, capability)
            })
            .collect()
    }

    /// Assignments in declared order, then definitions that still need fulfilling
    fn requirements(&self, template: &NodeTemplate, issues: &mut Issues) -> Vec<Requirement> {
        let definitions = self
            .hierarchy
            .effective_requirements(Category::Node, &template.type_name, issues);
        let mut requirements = vec![];

        for (name, assignment) in &template.requirements {
            match definitions.iter().find(|(defined, _)| defined == name) {
                Some((_, definition)) => requirements.push(self.requirement(name, definition, Some(assignment), template)),
                None => issues.log(
                    Issue::error(
                        IssueKind::UnknownRequirement,
                        format!("node template `{}`: node type `{}` has no requirement `{name}`", template.name, template.type_name),
                    )
                    .at(assignment.locator.as_ref().or(template.locator.as_ref())),
                ),
            }
        }

        for (name, definition) in &definitions {
            let assigned = template.requirements.iter().filter(|(assigned, _)| assigned == name).count();
            let assigned = u32::try_from(assigned).unwrap_or(u32::MAX);
            let (min, max) = occurrences_of(definition);
            if !max.allows(assigned) {
                issues.log(
                    Issue::error(
                        IssueKind::NotAllowed,
                        format!("node template `{}`: requirement `{name}` is assigned {assigned} times, at most {max} allowed", template.name),
                    )
                    .at(template.locator.as_ref()),
                );
            }
            for _ in assigned..min {
                requirements.push(self.requirement(name, definition, None, template));
            }
        }

        requirements
    }

    fn requirement(
        &self,
        name: &str,
        definition: &RequirementDefinition,
        assignment: Option<&RequirementAssignment>,
        template: &NodeTemplate,
    ) -> Requirement {
        let node = assignment
            .and_then(|assignment| assignment.node.clone())
            .or_else(|| definition.node.clone())
            .map(|node| {
                if self.registry.node_templates.contains_key(&node) {
                    NodeTarget::Template(node)
                } else {
                    NodeTarget::Type(node)
                }
            });
        let capability = assignment
            .and_then(|assignment| assignment.capability.clone())
            .or_else(|| definition.capability.clone())
            .map(|capability| match self.registry.get_type(Category::Capability, &capability) {
                Some(_) => CapabilityTarget::Type(capability),
                None => CapabilityTarget::Name(capability),
            });

        Requirement {
            name: name.to_string(),
            node,
            capability,
            relationship: self.relationship(definition, assignment),
            node_filter: assignment
                .and_then(|assignment| assignment.node_filter.clone())
                .or_else(|| definition.node_filter.clone()),
            occurrences: occurrences_of(definition),
            target: None,
            locator: assignment
                .and_then(|assignment| assignment.locator.clone())
                .or_else(|| template.locator.clone()),
        }
    }

    /// Definition, then relationship template, then assignment
    fn relationship(&self, definition: &RequirementDefinition, assignment: Option<&RequirementAssignment>) -> RelationshipSpec {
        let mut spec = RelationshipSpec::default();
        let mut conflicts = vec![];
        if let Some(relationship) = &definition.relationship {
            spec.type_name.clone_from(&relationship.type_name);
            spec.interfaces = relationship.interfaces.clone();
        }

        let Some(assigned) = assignment.and_then(|assignment| assignment.relationship.as_ref()) else {
            return spec;
        };
        match self.registry.relationship_templates.get(&assigned.type_or_template) {
            Some(template) => {
                spec.template = Some(template.name.clone());
                spec.type_name = Some(template.type_name.clone());
                spec.properties = template.properties.clone();
                overlay_map(&mut spec.interfaces, &template.interfaces, "interfaces", &mut conflicts);
            }
            None => spec.type_name = Some(assigned.type_or_template.clone()),
        }
        spec.properties.extend(assigned.properties.clone());
        overlay_map(&mut spec.interfaces, &assigned.interfaces, "interfaces", &mut conflicts);
        spec
    }

    /// First-fit over candidates, then over their matching capabilities
    fn bind(
        &self,
        source: &str,
        source_type: &str,
        source_filter: Option<&NodeFilter>,
        requirement: &Requirement,
        nodes: &mut IndexMap<String, LinkedNode>,
    ) -> Option<Target> {
        let (candidates, explicit): (Vec<String>, bool) = match &requirement.node {
            Some(NodeTarget::Template(template)) => (vec![template.clone()], true),
            _ => (nodes.keys().cloned().collect(), false),
        };

        for candidate in candidates.iter().filter(|candidate| candidate.as_str() != source) {
            let Some(node) = nodes.get(candidate) else {
                continue;
            };
            if !explicit && !self.accepts(source_filter, requirement, node) {
                continue;
            }
            let capabilities = self.matching_capabilities(source_type, requirement, node);

            let Some(node) = nodes.get_mut(candidate) else {
                continue;
            };
            for name in capabilities {
                let Some(capability) = node.capabilities.get_mut(&name) else {
                    continue;
                };
                match capability.relate() {
                    Ok(()) => {
                        return Some(Target {
                            node: candidate.clone(),
                            capability: name,
                        })
                    }
                    Err(exhausted) => tracing::trace!(%exhausted, candidate = %candidate, "capability exhausted"),
                }
            }
        }

        None
    }

    /// Node type and node filters
    fn accepts(&self, source_filter: Option<&NodeFilter>, requirement: &Requirement, candidate: &LinkedNode) -> bool {
        if let Some(NodeTarget::Type(node_type)) = &requirement.node {
            if !self.hierarchy.is_descendant(Category::Node, &candidate.type_name, node_type) {
                return false;
            }
        }

        let capability = |name: &str| {
            candidate
                .capabilities
                .get(name)
                .or_else(|| {
                    candidate
                        .capabilities
                        .values()
                        .find(|capability| self.hierarchy.is_descendant(Category::Capability, &capability.type_name, name))
                })
                .map(|capability| &capability.properties)
        };

        source_filter.map_or(true, |filter| filter.accepts(&candidate.properties, capability))
            && requirement
                .node_filter
                .as_ref()
                .map_or(true, |filter| filter.accepts(&candidate.properties, capability))
    }

    /// Capabilities of the candidate the requirement may bind to, in declaration order
    fn matching_capabilities(&self, source_type: &str, requirement: &Requirement, candidate: &LinkedNode) -> Vec<String> {
        let valid_target_types = requirement
            .relationship
            .type_name
            .as_deref()
            .and_then(|relationship| self.valid_target_types(relationship));

        candidate
            .capabilities
            .values()
            .filter(|capability| match &requirement.capability {
                Some(CapabilityTarget::Name(name)) => capability.name == *name,
                Some(CapabilityTarget::Type(type_name)) => {
                    self.hierarchy.is_descendant(Category::Capability, &capability.type_name, type_name)
                }
                None => true,
            })
            .filter(|capability| {
                capability
                    .valid_source_types
                    .as_ref()
                    .map_or(true, |types| self.hierarchy.descends_from_any(Category::Node, source_type, types))
            })
            .filter(|capability| {
                valid_target_types
                    .as_ref()
                    .map_or(true, |types| self.hierarchy.descends_from_any(Category::Capability, &capability.type_name, types))
            })
            .map(|capability| capability.name.clone())
            .collect()
    }

    /// Nearest declaration along the relationship type's chain
    fn valid_target_types(&self, relationship: &str) -> Option<Vec<String>> {
        let mut issues = Issues::new();
        self.hierarchy
            .chain(Category::Relationship, relationship, &mut issues)
            .into_iter()
            .find_map(|entity| entity.valid_target_types.clone())
    }
}

fn node_mut<'n>(nodes: &'n mut IndexMap<String, LinkedNode>, name: &str) -> Result<&'n mut LinkedNode, Error> {
    nodes
        .get_mut(name)
        .ok_or_else(|| Error::Invariant(format!("node template `{name}` vanished while linking")))
}

fn occurrences_of(definition: &RequirementDefinition) -> (u32, Bound) {
    definition.occurrences.unwrap_or((1, Bound::Limited(1)))
}

pub fn defaults(definitions: &IndexMap<String, PropertyDefinition>) -> IndexMap<String, Value> {
    definitions
        .iter()
        .filter_map(|(name, definition)| Some((name.clone(), definition.default.clone()?)))
        .collect()
}

fn check_occurrences(nodes: &IndexMap<String, LinkedNode>, issues: &mut Issues) {
    for node in nodes.values() {
        for capability in node.capabilities.values() {
            if capability.occurrences < capability.min_occurrences {
                issues.log(
                    Issue::warning(
                        IssueKind::CapabilityUnderFulfilled,
                        format!(
                            "capability `{}` of node template `{}` has {} relationship(s), at least {} expected",
                            capability.name, node.name, capability.occurrences, capability.min_occurrences
                        ),
                    )
                    .at(node.locator.as_ref()),
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::documents;
    use crate::presentation::Presenters;
    use pretty_assertions::assert_eq;

    const TYPES: &str = r#"
tosca_definitions_version: tosca_simple_yaml_1_3
capability_types:
  Container: {}
  Endpoint: {}
  Database:
    derived_from: Endpoint
    properties:
      engine: {type: string, default: postgres}
relationship_types:
  ConnectsTo:
    valid_target_types: [Endpoint]
node_types:
  A:
    capabilities:
      host: {type: Container, max_occurrences: 1, min_occurrences: 0}
  B:
    requirements:
      - needs_host: Container
  Db:
    properties:
      tier: {type: string, default: gold}
    capabilities:
      admin: {type: Container, min_occurrences: 0, max_occurrences: 1}
      sql: {type: Database, min_occurrences: 0}
  App:
    requirements:
      - db: {capability: Endpoint, relationship: ConnectsTo}
"#;

    const SOURCE_TYPES: &str = r#"
tosca_definitions_version: tosca_simple_yaml_1_3
capability_types:
  Slot: {}
  Guarded:
    derived_from: Slot
    valid_source_types: [Trusted]
node_types:
  Client:
    requirements:
      - slot: Slot
  Trusted:
    derived_from: Client
  Strict:
    capabilities:
      slot: {type: Slot, valid_source_types: [Trusted], min_occurrences: 0}
  Guard:
    capabilities:
      slot: {type: Guarded, min_occurrences: 0}
  Open:
    capabilities:
      slot: {type: Slot, min_occurrences: 0}
"#;

    fn link(topology: &str) -> (Topology, Issues) {
        link_with(TYPES, topology)
    }

    fn link_with(types: &str, topology: &str) -> (Topology, Issues) {
        let mut presenters = Presenters::default();
        crate::tosca::register(&mut presenters);
        let mut issues = Issues::new();
        let documents = documents! {
            "types.yaml" => types,
            "topology.yaml" => topology
        };
        let registry = Registry::load(&documents, &presenters, &mut issues).unwrap();
        assert!(issues.is_empty(), "{issues}");
        let topology = Linker::new(&registry).link(&mut issues).unwrap();
        (topology, issues)
    }

    fn edges(topology: &Topology) -> Vec<(&str, &str, &str, &str)> {
        topology
            .relationships
            .iter()
            .map(|edge| (edge.source.as_str(), edge.requirement.as_str(), edge.target.as_str(), edge.capability.as_str()))
            .collect()
    }

    #[test]
    fn binds_by_capability_type() {
        let (topology, issues) = link(
            "tosca_definitions_version: tosca_simple_yaml_1_3\ntopology_template:\n  node_templates:\n    a1: {type: A}\n    b1: {type: B}",
        );

        assert!(issues.is_empty(), "{issues}");
        assert_eq!(edges(&topology), [("b1", "needs_host", "a1", "host")]);
        assert_eq!(topology.occurrences("a1", "host"), Some(1));
        assert_eq!(topology.node("b1").map(|node| node.state), Some(LinkState::Linked));
    }

    #[test]
    fn exhausted_capabilities_fall_through() {
        let (topology, issues) = link(
            "tosca_definitions_version: tosca_simple_yaml_1_3\ntopology_template:\n  node_templates:\n    a1: {type: A}\n    db: {type: Db}\n    b1: {type: B}\n    b2: {type: B}\n    b3: {type: B}",
        );

        assert_eq!(
            edges(&topology),
            [("b1", "needs_host", "a1", "host"), ("b2", "needs_host", "db", "admin")]
        );
        assert_eq!(topology.occurrences("a1", "host"), Some(1));
        assert_eq!(topology.node("b3").map(|node| node.state), Some(LinkState::Unsatisfied));
        let failures: Vec<_> = issues.of_kind(IssueKind::NoTargetFound).map(|issue| issue.message.as_str()).collect();
        assert_eq!(failures, ["requirement `needs_host` of node template `b3` found no target"]);
    }

    #[test]
    fn explicit_targets_and_capability_names() {
        let (topology, issues) = link(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
topology_template:
  node_templates:
    db1: {type: Db}
    db2: {type: Db}
    app:
      type: App
      requirements:
        - db: db2
    b1:
      type: B
      requirements:
        - needs_host: {node: db2, capability: admin}
"#,
        );

        assert!(issues.is_empty(), "{issues}");
        assert_eq!(
            edges(&topology),
            [("app", "db", "db2", "sql"), ("b1", "needs_host", "db2", "admin")]
        );
        assert_eq!(topology.relationships[0].relationship.type_name.as_deref(), Some("ConnectsTo"));
    }

    #[test]
    fn valid_target_types_restrict_capabilities() {
        // ConnectsTo only targets endpoints, admin is a container
        let (topology, issues) = link(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
topology_template:
  node_templates:
    db: {type: Db}
    app:
      type: App
      requirements:
        - db: {node: db, capability: admin}
"#,
        );

        assert!(topology.relationships.is_empty());
        assert_eq!(issues.of_kind(IssueKind::NoTargetFound).count(), 1);
    }

    #[test]
    fn valid_source_types_of_capability_definitions() {
        let (topology, issues) = link_with(
            SOURCE_TYPES,
            "tosca_definitions_version: tosca_simple_yaml_1_3\ntopology_template:\n  node_templates:\n    strict: {type: Strict}\n    open: {type: Open}\n    client: {type: Client}\n    trusted: {type: Trusted}",
        );

        assert!(issues.is_empty(), "{issues}");
        assert_eq!(
            edges(&topology),
            [("client", "slot", "open", "slot"), ("trusted", "slot", "strict", "slot")]
        );
    }

    #[test]
    fn valid_source_types_of_capability_types() {
        let (topology, issues) = link_with(
            SOURCE_TYPES,
            "tosca_definitions_version: tosca_simple_yaml_1_3\ntopology_template:\n  node_templates:\n    guard: {type: Guard}\n    open: {type: Open}\n    client: {type: Client}\n    trusted: {type: Trusted}",
        );

        assert!(issues.is_empty(), "{issues}");
        assert_eq!(
            edges(&topology),
            [("client", "slot", "open", "slot"), ("trusted", "slot", "guard", "slot")]
        );
    }

    #[test]
    fn node_filters_select_candidates() {
        let (topology, issues) = link(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
topology_template:
  node_templates:
    bronze: {type: Db, properties: {tier: bronze}}
    gold: {type: Db}
    app:
      type: App
      requirements:
        - db:
            node_filter:
              properties:
                - tier: {equal: gold}
              capabilities:
                - Database:
                    properties:
                      - engine: {valid_values: [postgres]}
"#,
        );

        assert!(issues.is_empty(), "{issues}");
        assert_eq!(edges(&topology), [("app", "db", "gold", "sql")]);
    }

    #[test]
    fn unknown_requirements_are_reported() {
        let (topology, issues) = link(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
topology_template:
  node_templates:
    db:
      type: Db
      requirements:
        - storage: db
"#,
        );

        assert!(topology.relationships.is_empty());
        assert_eq!(issues.of_kind(IssueKind::UnknownRequirement).count(), 1);
    }

    #[test]
    fn templates_never_satisfy_themselves() {
        let (topology, issues) = link(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
node_types:
  Both:
    capabilities:
      host: Container
    requirements:
      - peer: Container
topology_template:
  node_templates:
    solo: {type: Both}
"#,
        );

        assert!(topology.relationships.is_empty());
        assert_eq!(topology.node("solo").map(|node| node.state), Some(LinkState::Unsatisfied));
        assert_eq!(issues.of_kind(IssueKind::NoTargetFound).count(), 1);
    }

    #[test]
    fn under_fulfilled_capabilities_are_warnings() {
        let (_, issues) = link(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
node_types:
  Lonely:
    capabilities:
      feature: Container
topology_template:
  node_templates:
    alone: {type: Lonely}
"#,
        );

        assert!(!issues.has_errors(), "{issues}");
        assert_eq!(issues.of_kind(IssueKind::CapabilityUnderFulfilled).count(), 1);
    }

    #[test]
    fn linking_is_deterministic() {
        let topology = "tosca_definitions_version: tosca_simple_yaml_1_3\ntopology_template:\n  node_templates:\n    db: {type: Db}\n    a1: {type: A}\n    b1: {type: B}\n    b2: {type: B}\n    app: {type: App}";
        let (first, _) = link(topology);
        let (second, _) = link(topology);

        assert_eq!(first.relationships, second.relationships);
        for (name, node) in &first.nodes {
            for (capability, state) in &node.capabilities {
                assert_eq!(second.occurrences(name, capability), Some(state.occurrences));
            }
        }
    }

    #[test]
    fn unsealed_registry_is_fatal() {
        let registry = Registry::default();
        let mut issues = Issues::new();

        assert!(matches!(Linker::new(&registry).link(&mut issues), Err(Error::RegistryNotSealed)));
    }
}
