//! Deployment plan instantiation
//!
//! A linked [Topology] becomes one node record per node template and one instance record per
//! requested replica. Property values are merged, evaluated and coerced here, so missing required
//! properties and assignments without definition are reported by this pass, not by the linker.
//!
//! Instance identifiers and the instance-level relationship fan-out are pluggable through
//! [PlanOptions].
use crate::coerce::{Coercer, Site};
use crate::definitions::{overlay_map, Conflict, InterfaceDefinition, PropertyDefinition};
use crate::document::Locator;
use crate::functions::{Context, Evaluator, NodeValues, Subject};
use crate::hierarchy::Hierarchy;
use crate::issue::{Error, Issue, IssueKind, Issues};
use crate::linker::{defaults, LinkedNode, Topology};
use crate::registry::{Category, Registry};
use crate::value::Value;
use indexmap::IndexMap;
use serde::Serialize;

pub const HOSTED_ON: &str = "tosca.relationships.HostedOn";
pub const SCALABLE: &str = "tosca.capabilities.Scalable";

pub trait IdGenerator {
    fn generate(&mut self, node: &str) -> String;
}

/// `<node>_<uuid>`
#[derive(Debug, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn generate(&mut self, node: &str) -> String {
        format!("{node}_{}", uuid::Uuid::new_v4().simple())
    }
}

/// `<node>_1`, `<node>_2`, ... for reproducible output
#[derive(Debug, Default)]
pub struct SequentialIds {
    counters: IndexMap<String, u32>,
}

impl IdGenerator for SequentialIds {
    fn generate(&mut self, node: &str) -> String {
        let counter = self.counters.entry(node.to_string()).or_default();
        *counter += 1;
        format!("{node}_{counter}")
    }
}

/// Chooses the target instances of one source instance
pub trait RelationshipPolicy {
    fn select<'t>(&self, index: usize, count: usize, targets: &'t [String]) -> Vec<&'t String>;
}

/// Every source instance relates to every target instance
#[derive(Debug, Default)]
pub struct AllTargets;

impl RelationshipPolicy for AllTargets {
    fn select<'t>(&self, _index: usize, _count: usize, targets: &'t [String]) -> Vec<&'t String> {
        targets.iter().collect()
    }
}

#[derive(derive_new::new)]
pub struct PlanOptions {
    pub ids: Box<dyn IdGenerator>,
    pub policy: Box<dyn RelationshipPolicy>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self::new(Box::new(RandomIds), Box::new(AllTargets))
    }
}

impl PlanOptions {
    pub fn sequential() -> Self {
        Self::new(Box::<SequentialIds>::default(), Box::new(AllTargets))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeploymentPlan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub inputs: IndexMap<String, Value>,
    pub nodes: Vec<NodeRecord>,
    pub node_instances: Vec<NodeInstance>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub groups: IndexMap<String, GroupRecord>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub policies: IndexMap<String, PolicyRecord>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub workflows: IndexMap<String, WorkflowRecord>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, OutputRecord>,
}

impl DeploymentPlan {
    pub fn node(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn instances_of<'p>(&'p self, node: &'p str) -> impl Iterator<Item = &'p NodeInstance> + 'p {
        self.node_instances.iter().filter(move |instance| instance.node_id == node)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// Root first
    pub type_hierarchy: Vec<String>,
    pub properties: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub capabilities: IndexMap<String, CapabilityRecord>,
    pub operations: IndexMap<String, Operation>,
    pub relationships: Vec<RelationshipRecord>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub artifacts: IndexMap<String, ArtifactRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    pub instances: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityRecord {
    #[serde(rename = "type")]
    pub type_name: String,
    pub properties: IndexMap<String, Value>,
    pub occurrences: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub interface: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipRecord {
    pub requirement: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub type_hierarchy: Vec<String>,
    pub target_id: String,
    pub capability: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    pub properties: IndexMap<String, Value>,
    pub source_operations: IndexMap<String, Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactRecord {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeInstance {
    pub id: String,
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    pub relationships: Vec<InstanceRelationship>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceRelationship {
    pub requirement: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub target_name: String,
    pub target_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRecord {
    #[serde(rename = "type")]
    pub type_name: String,
    pub members: Vec<String>,
    pub properties: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyRecord {
    #[serde(rename = "type")]
    pub type_name: String,
    pub targets: Vec<String>,
    pub properties: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowRecord {
    pub mapping: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: Value,
}

pub struct Planner<'r> {
    registry: &'r Registry,
    hierarchy: Hierarchy<'r>,
    coercer: Coercer<'r>,
}

impl<'r> Planner<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        let hierarchy = Hierarchy::new(registry);
        Self {
            registry,
            hierarchy,
            coercer: Coercer::new(hierarchy),
        }
    }

    /// Builds the plan of a linked topology with caller-provided input values
    #[tracing::instrument(level = "debug", skip_all, fields(nodes = topology.nodes.len()))]
    pub fn instantiate(
        &self,
        topology: &Topology,
        provided: &IndexMap<String, Value>,
        options: &mut PlanOptions,
        issues: &mut Issues,
    ) -> Result<DeploymentPlan, Error> {
        self.registry.ensure_sealed()?;

        let inputs = self.inputs(provided, issues);
        let mut definitions = IndexMap::new();
        let mut values = IndexMap::new();
        for node in topology.nodes.values() {
            let (node_definitions, node_values) = self.node_values(node, issues)?;
            definitions.insert(node.name.clone(), node_definitions);
            values.insert(node.name.clone(), node_values);
        }

        let mut evaluator = Evaluator::new(&inputs, &values);
        let mut nodes = vec![];
        for node in topology.nodes.values() {
            let record = self.node(node, topology, &definitions, &values, &mut evaluator, issues)?;
            nodes.push(record);
        }

        let hosts = hosts(&nodes);
        for (node, host) in nodes.iter_mut().zip(hosts) {
            node.host_id = host;
        }
        let node_instances = instances(&nodes, options);

        let plan = DeploymentPlan {
            description: self.registry.description.clone(),
            groups: self.groups(&mut evaluator, issues),
            policies: self.policies(&mut evaluator, issues),
            workflows: self
                .registry
                .workflows
                .iter()
                .map(|(name, workflow)| {
                    let record = WorkflowRecord {
                        mapping: workflow.mapping.clone(),
                        parameters: defaults(&workflow.parameters),
                    };
                    (name.clone(), record)
                })
                .collect(),
            outputs: self.outputs(&mut evaluator, issues),
            inputs,
            nodes,
            node_instances,
        };
        tracing::debug!(nodes = plan.nodes.len(), instances = plan.node_instances.len(), "plan created");
        Ok(plan)
    }

    /// Provided values over defaults, coerced to the declared types
    fn inputs(&self, provided: &IndexMap<String, Value>, issues: &mut Issues) -> IndexMap<String, Value> {
        let site = Site {
            owner: "topology inputs",
            locator: None,
        };
        let mut values = IndexMap::new();
        for (name, definition) in &self.registry.inputs {
            match provided.get(name).or(definition.default.as_ref()) {
                Some(value) => {
                    let value = self.coercer.property(name, definition, value.clone(), site, issues);
                    values.insert(name.clone(), value);
                }
                None if definition.is_required() => issues.log(
                    Issue::error(IssueKind::RequiredPropertyNotAssigned, format!("required input `{name}` is not provided"))
                        .at(definition.locator.as_ref()),
                ),
                None => {}
            }
        }

        for name in provided.keys().filter(|name| !self.registry.inputs.contains_key(*name)) {
            issues.log(Issue::error(IssueKind::UnknownInput, format!("input `{name}` is not declared by the topology")));
        }
        values
    }

    /// Merged property and capability values of one node template, before evaluation
    fn node_values(
        &self,
        node: &LinkedNode,
        issues: &mut Issues,
    ) -> Result<(IndexMap<String, PropertyDefinition>, NodeValues), Error> {
        let template = self
            .registry
            .node_templates
            .get(&node.name)
            .ok_or_else(|| Error::Invariant(format!("linked node `{}` has no node template", node.name)))?;
        let owner = format!("node template `{}`", node.name);
        let site = Site {
            owner: &owner,
            locator: node.locator.as_ref(),
        };

        let definitions = self.hierarchy.effective_properties(Category::Node, &node.type_name, issues);
        let properties = self.coercer.merge(&definitions, &template.properties, site, issues);

        let mut capabilities = IndexMap::new();
        for (name, capability) in &node.capabilities {
            let owner = format!("capability `{name}` of node template `{}`", node.name);
            let site = Site {
                owner: &owner,
                locator: node.locator.as_ref(),
            };
            let assigned = template
                .capabilities
                .get(name)
                .map(|assignment| assignment.properties.clone())
                .unwrap_or_default();
            capabilities.insert(name.clone(), self.coercer.merge(&capability.definitions, &assigned, site, issues));
        }

        let values = NodeValues {
            properties,
            capabilities,
            locator: node.locator.clone(),
        };
        Ok((definitions, values))
    }

    fn node(
        &self,
        node: &LinkedNode,
        topology: &Topology,
        definitions: &IndexMap<String, IndexMap<String, PropertyDefinition>>,
        values: &IndexMap<String, NodeValues>,
        evaluator: &mut Evaluator<'_>,
        issues: &mut Issues,
    ) -> Result<NodeRecord, Error> {
        let missing = || Error::Invariant(format!("node `{}` was not prepared for planning", node.name));
        let template = self.registry.node_templates.get(&node.name).ok_or_else(missing)?;
        let raw = values.get(&node.name).ok_or_else(missing)?;
        let definitions = definitions.get(&node.name).ok_or_else(missing)?;

        let owner = format!("node template `{}`", node.name);
        let site = Site {
            owner: &owner,
            locator: node.locator.as_ref(),
        };
        let context = Context::node(&node.name, node.locator.as_ref());

        let mut properties = IndexMap::new();
        for (name, value) in &raw.properties {
            let value = evaluator
                .node_property(&node.name, name, issues)
                .unwrap_or_else(|| value.clone());
            properties.insert(name.clone(), value);
        }
        let properties = self.coercer.check(definitions, properties, site, issues);

        let mut capabilities = IndexMap::new();
        for (name, capability) in &node.capabilities {
            let owner = format!("capability `{name}` of node template `{}`", node.name);
            let site = Site {
                owner: &owner,
                locator: node.locator.as_ref(),
            };
            let mut evaluated = IndexMap::new();
            for (property, value) in raw.capabilities.get(name).into_iter().flatten() {
                let value = evaluator
                    .capability_property(&node.name, name, property, issues)
                    .unwrap_or_else(|| value.clone());
                evaluated.insert(property.clone(), value);
            }
            let record = CapabilityRecord {
                type_name: capability.type_name.clone(),
                properties: self.coercer.check(&capability.definitions, evaluated, site, issues),
                occurrences: capability.occurrences,
            };
            capabilities.insert(name.clone(), record);
        }

        let mut interfaces = self.hierarchy.effective_interfaces(Category::Node, &node.type_name, issues);
        let mut conflicts = vec![];
        overlay_map(&mut interfaces, &template.interfaces, "interfaces", &mut conflicts);
        let mut artifacts = self.hierarchy.effective_artifacts(Category::Node, &node.type_name, issues);
        overlay_map(&mut artifacts, &template.artifacts, "artifacts", &mut conflicts);
        report_conflicts(&owner, conflicts, issues);

        let instances = self.instance_count(&capabilities);
        Ok(NodeRecord {
            id: node.name.clone(),
            type_name: node.type_name.clone(),
            type_hierarchy: self.hierarchy.type_hierarchy(Category::Node, &node.type_name),
            properties,
            capabilities,
            operations: operations(&interfaces, context, evaluator, issues),
            relationships: self.relationships(node, topology, evaluator, issues),
            artifacts: artifacts
                .into_iter()
                .map(|(name, artifact)| {
                    let record = ArtifactRecord {
                        type_name: artifact.type_name,
                        file: artifact.file,
                        repository: artifact.repository,
                        deploy_path: artifact.deploy_path,
                    };
                    (name, record)
                })
                .collect(),
            host_id: None,
            instances,
        })
    }

    fn relationships(
        &self,
        node: &LinkedNode,
        topology: &Topology,
        evaluator: &mut Evaluator<'_>,
        issues: &mut Issues,
    ) -> Vec<RelationshipRecord> {
        let mut records = vec![];
        for (index, edge) in topology.relationships_from(&node.name).enumerate() {
            let spec = &edge.relationship;
            let owner = format!("relationship `{}` of node template `{}`", edge.requirement, node.name);
            let site = Site {
                owner: &owner,
                locator: node.locator.as_ref(),
            };

            let (definitions, mut interfaces, type_hierarchy) = match &spec.type_name {
                Some(type_name) => (
                    self.hierarchy.effective_properties(Category::Relationship, type_name, issues),
                    self.hierarchy.effective_interfaces(Category::Relationship, type_name, issues),
                    self.hierarchy.type_hierarchy(Category::Relationship, type_name),
                ),
                None => Default::default(),
            };
            let mut conflicts = vec![];
            overlay_map(&mut interfaces, &spec.interfaces, "interfaces", &mut conflicts);
            report_conflicts(&owner, conflicts, issues);

            let raw = self.coercer.merge(&definitions, &spec.properties, site, issues);
            let label = format!("{}.{}[{index}]", node.name, edge.requirement);
            let context = Context {
                this: Some(Subject::Local {
                    label: &label,
                    properties: &raw,
                }),
                source: Some(node.name.as_str()),
                target: Some(edge.target.as_str()),
                locator: node.locator.as_ref(),
            };
            let properties = evaluate_each(evaluator, raw.clone(), context, issues);

            records.push(RelationshipRecord {
                requirement: edge.requirement.clone(),
                type_name: spec.type_name.clone(),
                type_hierarchy,
                target_id: edge.target.clone(),
                capability: edge.capability.clone(),
                template: spec.template.clone(),
                properties: self.coercer.check(&definitions, properties, site, issues),
                source_operations: operations(&interfaces, context, evaluator, issues),
            });
        }
        records
    }

    /// `default_instances` of the scalable capability, 1 without one
    fn instance_count(&self, capabilities: &IndexMap<String, CapabilityRecord>) -> u32 {
        capabilities
            .iter()
            .find(|(name, capability)| {
                *name == "scalable" || self.hierarchy.is_descendant(Category::Capability, &capability.type_name, SCALABLE)
            })
            .and_then(|(_, capability)| capability.properties.get("default_instances"))
            .and_then(Value::as_i64)
            .and_then(|count| u32::try_from(count).ok())
            .unwrap_or(1)
    }

    fn groups(&self, evaluator: &mut Evaluator<'_>, issues: &mut Issues) -> IndexMap<String, GroupRecord> {
        let mut groups = IndexMap::new();
        for group in self.registry.groups.values() {
            let owner = format!("group `{}`", group.name);
            let allowed = self
                .hierarchy
                .effective_list(Category::Group, &group.type_name, |entity| entity.members.as_ref());

            for member in &group.members {
                // unknown names are reported during validation
                let Some(template) = self.registry.node_templates.get(member) else {
                    continue;
                };
                let Some(allowed) = &allowed else {
                    continue;
                };
                if !self.hierarchy.descends_from_any(Category::Node, &template.type_name, allowed) {
                    issues.log(
                        Issue::error(
                            IssueKind::InvalidMember,
                            format!(
                                "{owner}: member `{member}` of type `{}` is not one of [{}]",
                                template.type_name,
                                allowed.join(", ")
                            ),
                        )
                        .at(group.locator.as_ref()),
                    );
                }
            }

            let definitions = self.hierarchy.effective_properties(Category::Group, &group.type_name, issues);
            let record = GroupRecord {
                type_name: group.type_name.clone(),
                members: group.members.clone(),
                properties: self.values(&definitions, &group.properties, &owner, group.locator.as_ref(), evaluator, issues),
            };
            groups.insert(group.name.clone(), record);
        }
        groups
    }

    fn policies(&self, evaluator: &mut Evaluator<'_>, issues: &mut Issues) -> IndexMap<String, PolicyRecord> {
        let mut policies = IndexMap::new();
        for policy in self.registry.policies.values() {
            let owner = format!("policy `{}`", policy.name);
            let allowed = self
                .hierarchy
                .effective_list(Category::Policy, &policy.type_name, |entity| entity.targets.as_ref());

            if let Some(allowed) = &allowed {
                for target in &policy.targets {
                    let accepted = match (self.registry.node_templates.get(target), self.registry.groups.get(target)) {
                        (Some(template), _) => self.hierarchy.descends_from_any(Category::Node, &template.type_name, allowed),
                        (None, Some(group)) => self.hierarchy.descends_from_any(Category::Group, &group.type_name, allowed),
                        (None, None) => continue,
                    };
                    if !accepted {
                        issues.log(
                            Issue::error(
                                IssueKind::InvalidMember,
                                format!("{owner}: target `{target}` is not one of [{}]", allowed.join(", ")),
                            )
                            .at(policy.locator.as_ref()),
                        );
                    }
                }
            }

            let definitions = self.hierarchy.effective_properties(Category::Policy, &policy.type_name, issues);
            let record = PolicyRecord {
                type_name: policy.type_name.clone(),
                targets: policy.targets.clone(),
                properties: self.values(&definitions, &policy.properties, &owner, policy.locator.as_ref(), evaluator, issues),
            };
            policies.insert(policy.name.clone(), record);
        }
        policies
    }

    fn outputs(&self, evaluator: &mut Evaluator<'_>, issues: &mut Issues) -> IndexMap<String, OutputRecord> {
        self.registry
            .outputs
            .iter()
            .map(|(name, output)| {
                let context = Context {
                    locator: output.locator.as_ref(),
                    ..Default::default()
                };
                let record = OutputRecord {
                    description: output.description.clone(),
                    value: evaluator.evaluate(output.value.clone(), context, issues),
                };
                (name.clone(), record)
            })
            .collect()
    }

    /// Merge, evaluate and coerce values that have no `SELF`
    fn values(
        &self,
        definitions: &IndexMap<String, PropertyDefinition>,
        assigned: &IndexMap<String, Value>,
        owner: &str,
        locator: Option<&Locator>,
        evaluator: &mut Evaluator<'_>,
        issues: &mut Issues,
    ) -> IndexMap<String, Value> {
        let site = Site { owner, locator };
        let context = Context {
            locator,
            ..Default::default()
        };
        let merged = self.coercer.merge(definitions, assigned, site, issues);
        let evaluated = evaluate_each(evaluator, merged, context, issues);
        self.coercer.check(definitions, evaluated, site, issues)
    }
}

fn evaluate_each(
    evaluator: &mut Evaluator<'_>,
    values: IndexMap<String, Value>,
    context: Context<'_>,
    issues: &mut Issues,
) -> IndexMap<String, Value> {
    values
        .into_iter()
        .map(|(name, value)| (name, evaluator.evaluate(value, context, issues)))
        .collect()
}

/// Qualified `interface.operation` keys for all operations, unqualified keys for the first
/// interface declaring an operation name
fn operations(
    interfaces: &IndexMap<String, InterfaceDefinition>,
    context: Context<'_>,
    evaluator: &mut Evaluator<'_>,
    issues: &mut Issues,
) -> IndexMap<String, Operation> {
    let mut operations = IndexMap::new();
    for (interface, definition) in interfaces {
        for (name, operation) in &definition.operations {
            let mut inputs = definition.inputs.clone();
            inputs.extend(operation.inputs.clone());
            let record = Operation {
                interface: interface.clone(),
                name: name.clone(),
                implementation: operation.implementation.clone(),
                inputs: evaluate_each(evaluator, inputs, context, issues),
                executor: operation.executor.clone(),
                max_retries: operation.max_retries,
                retry_interval: operation.retry_interval,
            };
            operations.entry(name.clone()).or_insert_with(|| record.clone());
            operations.insert(format!("{interface}.{name}"), record);
        }
    }
    operations
}

fn report_conflicts(owner: &str, conflicts: Vec<Conflict>, issues: &mut Issues) {
    for conflict in conflicts {
        issues.log(
            Issue::error(
                IssueKind::TypeOverrideConflict,
                format!("{owner} cannot change the data type of {} from `{}` to `{}`", conflict.path, conflict.kept, conflict.attempted),
            )
            .at(conflict.locator.as_ref()),
        );
    }
}

fn is_hosted_on(type_hierarchy: &[String]) -> bool {
    type_hierarchy.iter().any(|name| name == HOSTED_ON)
}

/// Follows direct hosts to the outermost one, bounded by the number of hosted entries
fn outermost(direct: &IndexMap<String, String>, start: &str) -> Option<String> {
    let mut host = direct.get(start)?;
    for _ in 0..direct.len() {
        match direct.get(host) {
            Some(next) if next != start => host = next,
            _ => break,
        }
    }
    Some(host.clone())
}

fn hosts(nodes: &[NodeRecord]) -> Vec<Option<String>> {
    let direct: IndexMap<String, String> = nodes
        .iter()
        .filter_map(|node| {
            let relationship = node
                .relationships
                .iter()
                .find(|relationship| is_hosted_on(&relationship.type_hierarchy))?;
            Some((node.id.clone(), relationship.target_id.clone()))
        })
        .collect();
    nodes.iter().map(|node| outermost(&direct, &node.id)).collect()
}

fn instances(nodes: &[NodeRecord], options: &mut PlanOptions) -> Vec<NodeInstance> {
    let ids: IndexMap<&str, Vec<String>> = nodes
        .iter()
        .map(|node| {
            let ids = (0..node.instances).map(|_| options.ids.generate(&node.id)).collect();
            (node.id.as_str(), ids)
        })
        .collect();

    let mut instances = vec![];
    let mut direct = IndexMap::new();
    for node in nodes {
        let own = ids.get(node.id.as_str()).map(Vec::as_slice).unwrap_or_default();
        for (index, id) in own.iter().enumerate() {
            let mut relationships = vec![];
            for relationship in &node.relationships {
                let targets = ids
                    .get(relationship.target_id.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let selected = options.policy.select(index, own.len(), targets);
                if let [host] = selected.as_slice() {
                    if is_hosted_on(&relationship.type_hierarchy) && !direct.contains_key(id) {
                        direct.insert(id.clone(), (*host).clone());
                    }
                }
                relationships.extend(selected.into_iter().map(|target| InstanceRelationship {
                    requirement: relationship.requirement.clone(),
                    type_name: relationship.type_name.clone(),
                    target_name: relationship.target_id.clone(),
                    target_id: target.clone(),
                }));
            }
            instances.push(NodeInstance {
                id: id.clone(),
                node_id: node.id.clone(),
                host_id: None,
                relationships,
            });
        }
    }

    for instance in &mut instances {
        instance.host_id = outermost(&direct, &instance.id);
    }
    instances
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::documents;
    use crate::linker::Linker;
    use crate::presentation::Presenters;
    use pretty_assertions::assert_eq;

    const TYPES: &str = r#"
tosca_definitions_version: tosca_simple_yaml_1_3
capability_types:
  Container: {}
  tosca.capabilities.Scalable:
    properties:
      default_instances: {type: integer, default: 1}
relationship_types:
  tosca.relationships.HostedOn: {}
  ConnectsTo:
    properties:
      weight: {type: integer, default: 1}
    interfaces:
      Configure:
        pre_configure_source: hooks/pre.sh
node_types:
  Server:
    capabilities:
      host: Container
  Web:
    properties:
      port: {type: integer, default: 80}
      name: {type: string}
      url: {type: string, required: false}
    capabilities:
      scalable:
        type: tosca.capabilities.Scalable
        min_occurrences: 0
    requirements:
      - host:
          capability: Container
          relationship: tosca.relationships.HostedOn
    interfaces:
      Standard:
        create: scripts/create.sh
        configure:
          implementation: scripts/configure.sh
          inputs:
            port: {get_property: [SELF, port]}
      Custom:
        create: scripts/custom.sh
    artifacts:
      site: {file: site.tar.gz}
"#;

    fn plan(topology: &str, inputs: &[(&str, Value)]) -> (DeploymentPlan, Issues) {
        let mut presenters = Presenters::default();
        crate::tosca::register(&mut presenters);
        let documents = documents!("types.yaml" => TYPES, "topology.yaml" => topology);
        let mut issues = Issues::new();
        let registry = Registry::load(&documents, &presenters, &mut issues).unwrap();
        assert!(issues.is_empty(), "{issues}");
        let topology = Linker::new(&registry).link(&mut issues).unwrap();
        let inputs: IndexMap<String, Value> = inputs.iter().map(|(name, value)| (name.to_string(), value.clone())).collect();
        let plan = Planner::new(&registry)
            .instantiate(&topology, &inputs, &mut PlanOptions::sequential(), &mut issues)
            .unwrap();
        (plan, issues)
    }

    #[test]
    fn defaults_and_required_properties() {
        let (plan, issues) = plan(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
topology_template:
  node_templates:
    server: {type: Server}
    web: {type: Web}
"#,
            &[],
        );

        let web = plan.node("web").unwrap();
        assert_eq!(web.properties.get("port"), Some(&Value::Integer(80)));
        assert_eq!(web.properties.get("name"), None);
        let required: Vec<_> = issues
            .of_kind(IssueKind::RequiredPropertyNotAssigned)
            .map(|issue| issue.message.as_str())
            .collect();
        assert_eq!(required, ["required property `name` of node template `web` is not assigned"]);
    }

    #[test]
    fn operations_are_flattened() {
        let (plan, issues) = plan(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
topology_template:
  node_templates:
    server: {type: Server}
    web:
      type: Web
      properties:
        name: shop
        port: 8080
"#,
            &[],
        );

        assert!(issues.is_empty(), "{issues}");
        let web = plan.node("web").unwrap();
        let keys: Vec<_> = web.operations.keys().map(String::as_str).collect();
        assert_eq!(keys, ["create", "Standard.create", "configure", "Standard.configure", "Custom.create"]);
        assert_eq!(web.operations["create"].implementation.as_deref(), Some("scripts/create.sh"));
        assert_eq!(web.operations["Custom.create"].implementation.as_deref(), Some("scripts/custom.sh"));
        assert_eq!(web.operations["configure"].inputs.get("port"), Some(&Value::Integer(8080)));
        assert_eq!(web.artifacts["site"].file.as_deref(), Some("site.tar.gz"));
        assert_eq!(web.type_hierarchy, ["Web"]);
    }

    #[test]
    fn instances_hosts_and_relationships() {
        let (plan, issues) = plan(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
topology_template:
  node_templates:
    server: {type: Server}
    web:
      type: Web
      properties:
        name: shop
      capabilities:
        scalable:
          properties:
            default_instances: 2
"#,
            &[],
        );

        assert!(issues.is_empty(), "{issues}");
        let web = plan.node("web").unwrap();
        assert_eq!(web.instances, 2);
        assert_eq!(web.host_id.as_deref(), Some("server"));
        assert_eq!(plan.node("server").unwrap().host_id, None);

        let instances: Vec<_> = plan.instances_of("web").collect();
        assert_eq!(instances.len(), 2);
        for instance in instances {
            assert_eq!(instance.host_id.as_deref(), Some("server_1"));
            assert_eq!(instance.relationships.len(), 1);
            assert_eq!(instance.relationships[0].target_id, "server_1");
        }
        assert_eq!(plan.node_instances.len(), 3);
    }

    #[test]
    fn relationship_properties_and_operations() {
        let (plan, issues) = plan(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
node_types:
  Client:
    properties:
      retries: {type: integer, default: 3}
    requirements:
      - server:
          capability: Container
          relationship: ConnectsTo
topology_template:
  node_templates:
    server: {type: Server}
    client:
      type: Client
      requirements:
        - server:
            node: server
            relationship:
              type: ConnectsTo
              properties:
                weight: {get_property: [SOURCE, retries]}
"#,
            &[],
        );

        assert!(issues.is_empty(), "{issues}");
        let relationship = &plan.node("client").unwrap().relationships[0];
        assert_eq!(relationship.target_id, "server");
        assert_eq!(relationship.capability, "host");
        assert_eq!(relationship.properties.get("weight"), Some(&Value::Integer(3)));
        assert!(relationship.source_operations.contains_key("pre_configure_source"));
        assert!(relationship.source_operations.contains_key("Configure.pre_configure_source"));
    }

    #[test]
    fn inputs_and_outputs() {
        let (plan, issues) = plan(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
topology_template:
  inputs:
    name: {type: string}
    port: {type: integer, default: 8000}
    region: {type: string}
  node_templates:
    server: {type: Server}
    web:
      type: Web
      properties:
        name: {get_input: name}
        port: {get_input: port}
  outputs:
    url:
      value: {concat: ["http://", {get_property: [web, name]}, ":", {get_property: [web, port]}]}
"#,
            &[("name", "shop".into()), ("zone", "eu".into())],
        );

        assert_eq!(plan.inputs.get("port"), Some(&Value::Integer(8000)));
        assert_eq!(plan.node("web").unwrap().properties.get("name"), Some(&Value::from("shop")));
        assert_eq!(plan.outputs["url"].value, Value::from("http://shop:8000"));
        assert_eq!(issues.of_kind(IssueKind::RequiredPropertyNotAssigned).count(), 1);
        assert_eq!(issues.of_kind(IssueKind::UnknownInput).count(), 1);
    }

    #[test]
    fn group_members_and_policy_targets() {
        let (plan, issues) = plan(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
group_types:
  Servers:
    members: [Server]
policy_types:
  Placement:
    properties:
      zone: {type: string, default: eu}
    targets: [Servers]
topology_template:
  node_templates:
    server: {type: Server}
    web:
      type: Web
      properties:
        name: shop
  groups:
    machines:
      type: Servers
      members: [server, web]
  policies:
    placement:
      type: Placement
      targets: [machines, web]
  workflows:
    install: default_workflows.install
"#,
            &[],
        );

        let invalid: Vec<_> = issues
            .of_kind(IssueKind::InvalidMember)
            .map(|issue| issue.message.as_str())
            .collect();
        assert_eq!(
            invalid,
            [
                "group `machines`: member `web` of type `Web` is not one of [Server]",
                "policy `placement`: target `web` is not one of [Servers]",
            ]
        );
        assert_eq!(plan.groups["machines"].members, ["server", "web"]);
        assert_eq!(plan.policies["placement"].properties.get("zone"), Some(&Value::from("eu")));
        assert_eq!(plan.workflows["install"].mapping, "default_workflows.install");
    }

    struct FirstOnly;

    impl RelationshipPolicy for FirstOnly {
        fn select<'t>(&self, _index: usize, _count: usize, targets: &'t [String]) -> Vec<&'t String> {
            targets.iter().take(1).collect()
        }
    }

    #[test]
    fn relationship_policy_is_pluggable() {
        let mut presenters = Presenters::default();
        crate::tosca::register(&mut presenters);
        let documents = documents!(
            "types.yaml" => TYPES,
            "topology.yaml" => r#"
tosca_definitions_version: tosca_simple_yaml_1_3
node_types:
  Cluster:
    capabilities:
      host: Container
      scalable:
        type: tosca.capabilities.Scalable
        properties:
          default_instances: {type: integer, default: 3}
topology_template:
  node_templates:
    cluster: {type: Cluster}
    web: {type: Web, properties: {name: shop}}
"#
        );
        let mut issues = Issues::new();
        let registry = Registry::load(&documents, &presenters, &mut issues).unwrap();
        let topology = Linker::new(&registry).link(&mut issues).unwrap();

        let mut all = PlanOptions::sequential();
        let mut first = PlanOptions::new(Box::<SequentialIds>::default(), Box::new(FirstOnly));
        let planner = Planner::new(&registry);
        let fanned = planner.instantiate(&topology, &IndexMap::new(), &mut all, &mut issues).unwrap();
        let narrowed = planner.instantiate(&topology, &IndexMap::new(), &mut first, &mut issues).unwrap();

        assert!(!issues.has_errors(), "{issues}");
        let web = |plan: &DeploymentPlan| plan.instances_of("web").next().cloned().unwrap();
        assert_eq!(web(&fanned).relationships.len(), 3);
        assert_eq!(web(&fanned).host_id, None);
        assert_eq!(web(&narrowed).relationships.len(), 1);
        assert_eq!(web(&narrowed).host_id.as_deref(), Some("cluster_1"));
    }

    #[test]
    fn random_ids_are_unique() {
        let mut ids = RandomIds;
        let first = ids.generate("web");
        let second = ids.generate("web");

        assert!(first.starts_with("web_"));
        assert_ne!(first, second);
    }
}
