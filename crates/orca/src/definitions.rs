//! Typed definition records and their overlay rules
//!
//! Definitions are extracted from validated presentations. Overlaying a child definition onto
//! a parent merges field by field with the child winning, except for the data type of a
//! property, which an override may not change.
use crate::constraints::{Constraint, NodeFilter};
use crate::document::Locator;
use crate::presentation::Presentation;
use crate::value::Value;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Limited(u32),
    Unbounded,
}

impl Bound {
    pub fn allows(&self, count: u32) -> bool {
        match self {
            Bound::Limited(max) => count <= *max,
            Bound::Unbounded => true,
        }
    }
}

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bound::Limited(max) => write!(f, "{max}"),
            Bound::Unbounded => f.write_str("UNBOUNDED"),
        }
    }
}

fn parse_bound(value: &Value) -> Result<Bound, String> {
    match value {
        Value::String(s) if s == "UNBOUNDED" => Ok(Bound::Unbounded),
        value => value
            .as_i64()
            .and_then(|max| u32::try_from(max).ok())
            .map(Bound::Limited)
            .ok_or_else(|| format!("expected a non-negative integer or UNBOUNDED, found {value}")),
    }
}

/// `[min, max]`, `max` may be `UNBOUNDED`
pub fn parse_occurrences(value: &Value) -> Result<(u32, Bound), String> {
    let Some([min, max]) = value.as_array() else {
        return Err(format!("occurrences must be a list of two values, found {value}"));
    };
    let min = min
        .as_i64()
        .and_then(|min| u32::try_from(min).ok())
        .ok_or_else(|| format!("lower occurrence bound must be a non-negative integer, found {min}"))?;
    let max = parse_bound(max)?;
    if !max.allows(min) {
        return Err(format!("lower occurrence bound {min} exceeds upper bound {max}"));
    }
    Ok((min, max))
}

/// A data type change attempted by an override
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub path: String,
    pub kept: String,
    pub attempted: String,
    pub locator: Option<Locator>,
}

pub trait Overlay {
    /// Merges `child` onto `self`, recording conflicts under `path`
    fn overlay(&mut self, child: &Self, path: &str, conflicts: &mut Vec<Conflict>);
}

/// Merges definitions by name: same names overlay, new names append
pub fn overlay_map<T: Overlay + Clone>(
    parent: &mut IndexMap<String, T>,
    child: &IndexMap<String, T>,
    path: &str,
    conflicts: &mut Vec<Conflict>,
) {
    for (name, definition) in child {
        match parent.get_mut(name) {
            Some(inherited) => inherited.overlay(definition, &format!("{path}.{name}"), conflicts),
            None => {
                parent.insert(name.clone(), definition.clone());
            }
        }
    }
}

fn overlay_values(parent: &mut IndexMap<String, Value>, child: &IndexMap<String, Value>) {
    for (name, value) in child {
        parent.insert(name.clone(), value.clone());
    }
}

fn child_wins<T: Clone>(parent: &mut Option<T>, child: &Option<T>) {
    if child.is_some() {
        parent.clone_from(child);
    }
}

/// Property, attribute and parameter definitions share this record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyDefinition {
    pub type_name: Option<String>,
    pub description: Option<String>,
    pub required: Option<bool>,
    pub default: Option<Value>,
    /// Constraint clauses as written, parsed on use
    pub constraints: Vec<Value>,
    pub entry_schema: Option<String>,
    pub status: Option<String>,
    pub locator: Option<Locator>,
}

impl PropertyDefinition {
    pub fn from_presentation(presentation: &Presentation<'_>) -> Self {
        Self {
            type_name: presentation.string("type"),
            description: presentation.string("description"),
            required: presentation
                .raw("required")
                .and_then(|_| presentation.boolean("required")),
            default: presentation.value("default"),
            constraints: constraint_clauses(presentation),
            entry_schema: presentation
                .object("entry_schema")
                .and_then(|schema| schema.string("type")),
            status: presentation.string("status"),
            locator: presentation.locator().cloned(),
        }
    }

    /// `required` defaults to true
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(true)
    }

    pub fn parsed_constraints(&self) -> Vec<Constraint> {
        self.constraints
            .iter()
            .filter_map(|clause| Constraint::parse(clause).ok())
            .collect()
    }
}

fn constraint_clauses(presentation: &Presentation<'_>) -> Vec<Value> {
    presentation
        .objects("constraints")
        .iter()
        .map(|clause| Value::from(clause.node()))
        .collect()
}

impl Overlay for PropertyDefinition {
    fn overlay(&mut self, child: &Self, path: &str, conflicts: &mut Vec<Conflict>) {
        match (&self.type_name, &child.type_name) {
            (Some(kept), Some(attempted)) if kept != attempted => conflicts.push(Conflict {
                path: path.to_string(),
                kept: kept.clone(),
                attempted: attempted.clone(),
                locator: child.locator.clone(),
            }),
            (None, Some(_)) => self.type_name.clone_from(&child.type_name),
            _ => {}
        }
        child_wins(&mut self.description, &child.description);
        child_wins(&mut self.required, &child.required);
        child_wins(&mut self.default, &child.default);
        child_wins(&mut self.entry_schema, &child.entry_schema);
        child_wins(&mut self.status, &child.status);
        if !child.constraints.is_empty() {
            self.constraints.clone_from(&child.constraints);
        }
        child_wins(&mut self.locator, &child.locator);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityDefinition {
    pub type_name: Option<String>,
    pub description: Option<String>,
    pub properties: IndexMap<String, PropertyDefinition>,
    pub attributes: IndexMap<String, PropertyDefinition>,
    pub valid_source_types: Option<Vec<String>>,
    pub min_occurrences: Option<u32>,
    pub max_occurrences: Option<Bound>,
}

impl CapabilityDefinition {
    pub fn from_presentation(presentation: &Presentation<'_>) -> Self {
        let occurrences = presentation
            .value("occurrences")
            .and_then(|value| parse_occurrences(&value).ok());
        Self {
            type_name: presentation.string("type"),
            description: presentation.string("description"),
            properties: definitions_of(presentation, "properties"),
            attributes: definitions_of(presentation, "attributes"),
            valid_source_types: presentation.strings("valid_source_types"),
            min_occurrences: presentation
                .integer("min_occurrences")
                .and_then(|min| u32::try_from(min).ok())
                .or(occurrences.map(|(min, _)| min)),
            max_occurrences: presentation
                .value("max_occurrences")
                .and_then(|max| parse_bound(&max).ok())
                .or(occurrences.map(|(_, max)| max)),
        }
    }
}

impl Overlay for CapabilityDefinition {
    fn overlay(&mut self, child: &Self, path: &str, conflicts: &mut Vec<Conflict>) {
        child_wins(&mut self.type_name, &child.type_name);
        child_wins(&mut self.description, &child.description);
        overlay_map(&mut self.properties, &child.properties, &format!("{path}.properties"), conflicts);
        overlay_map(&mut self.attributes, &child.attributes, &format!("{path}.attributes"), conflicts);
        child_wins(&mut self.valid_source_types, &child.valid_source_types);
        child_wins(&mut self.min_occurrences, &child.min_occurrences);
        child_wins(&mut self.max_occurrences, &child.max_occurrences);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipDefinition {
    pub type_name: Option<String>,
    pub interfaces: IndexMap<String, InterfaceDefinition>,
}

impl Overlay for RelationshipDefinition {
    fn overlay(&mut self, child: &Self, path: &str, conflicts: &mut Vec<Conflict>) {
        child_wins(&mut self.type_name, &child.type_name);
        overlay_map(&mut self.interfaces, &child.interfaces, &format!("{path}.interfaces"), conflicts);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequirementDefinition {
    pub capability: Option<String>,
    pub node: Option<String>,
    pub relationship: Option<RelationshipDefinition>,
    pub occurrences: Option<(u32, Bound)>,
    pub node_filter: Option<NodeFilter>,
}

impl RequirementDefinition {
    pub fn from_presentation(presentation: &Presentation<'_>) -> Self {
        Self {
            capability: presentation.string("capability"),
            node: presentation.string("node"),
            relationship: presentation.object("relationship").map(|relationship| RelationshipDefinition {
                type_name: relationship.string("type"),
                interfaces: interfaces_of(&relationship),
            }),
            occurrences: presentation
                .value("occurrences")
                .and_then(|value| parse_occurrences(&value).ok()),
            node_filter: presentation
                .object("node_filter")
                .map(|filter| NodeFilter::from_presentation(&filter)),
        }
    }

    /// Lower occurrence bound, `[1, 1]` when undeclared
    pub fn min_occurrences(&self) -> u32 {
        self.occurrences.map_or(1, |(min, _)| min)
    }
}

impl Overlay for RequirementDefinition {
    fn overlay(&mut self, child: &Self, path: &str, conflicts: &mut Vec<Conflict>) {
        child_wins(&mut self.capability, &child.capability);
        child_wins(&mut self.node, &child.node);
        match (&mut self.relationship, &child.relationship) {
            (Some(inherited), Some(relationship)) => {
                inherited.overlay(relationship, &format!("{path}.relationship"), conflicts)
            }
            (None, Some(_)) => self.relationship.clone_from(&child.relationship),
            _ => {}
        }
        child_wins(&mut self.occurrences, &child.occurrences);
        child_wins(&mut self.node_filter, &child.node_filter);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationDefinition {
    pub description: Option<String>,
    pub implementation: Option<String>,
    pub inputs: IndexMap<String, Value>,
    pub executor: Option<String>,
    pub max_retries: Option<i64>,
    pub retry_interval: Option<i64>,
}

impl OperationDefinition {
    pub fn from_presentation(presentation: &Presentation<'_>) -> Self {
        Self {
            description: presentation.string("description"),
            implementation: presentation.string("implementation"),
            inputs: presentation.value_map("inputs"),
            executor: presentation.string("executor"),
            max_retries: presentation.integer("max_retries"),
            retry_interval: presentation.integer("retry_interval"),
        }
    }
}

impl Overlay for OperationDefinition {
    fn overlay(&mut self, child: &Self, _path: &str, _conflicts: &mut Vec<Conflict>) {
        child_wins(&mut self.description, &child.description);
        child_wins(&mut self.implementation, &child.implementation);
        overlay_values(&mut self.inputs, &child.inputs);
        child_wins(&mut self.executor, &child.executor);
        child_wins(&mut self.max_retries, &child.max_retries);
        child_wins(&mut self.retry_interval, &child.retry_interval);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceDefinition {
    pub type_name: Option<String>,
    pub inputs: IndexMap<String, Value>,
    pub operations: IndexMap<String, OperationDefinition>,
}

impl InterfaceDefinition {
    pub fn from_presentation(presentation: &Presentation<'_>) -> Self {
        Self {
            type_name: presentation.string("type"),
            inputs: presentation.value_map("inputs"),
            operations: presentation
                .object_map("operations")
                .into_iter()
                .map(|(name, operation)| {
                    (name.to_string(), OperationDefinition::from_presentation(&operation))
                })
                .collect(),
        }
    }
}

impl Overlay for InterfaceDefinition {
    fn overlay(&mut self, child: &Self, path: &str, conflicts: &mut Vec<Conflict>) {
        child_wins(&mut self.type_name, &child.type_name);
        overlay_values(&mut self.inputs, &child.inputs);
        overlay_map(&mut self.operations, &child.operations, path, conflicts);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactDefinition {
    pub type_name: Option<String>,
    pub file: Option<String>,
    pub description: Option<String>,
    pub repository: Option<String>,
    pub deploy_path: Option<String>,
}

impl ArtifactDefinition {
    pub fn from_presentation(presentation: &Presentation<'_>) -> Self {
        Self {
            type_name: presentation.string("type"),
            file: presentation.string("file"),
            description: presentation.string("description"),
            repository: presentation.string("repository"),
            deploy_path: presentation.string("deploy_path"),
        }
    }
}

impl Overlay for ArtifactDefinition {
    fn overlay(&mut self, child: &Self, _path: &str, _conflicts: &mut Vec<Conflict>) {
        child_wins(&mut self.type_name, &child.type_name);
        child_wins(&mut self.file, &child.file);
        child_wins(&mut self.description, &child.description);
        child_wins(&mut self.repository, &child.repository);
        child_wins(&mut self.deploy_path, &child.deploy_path);
    }
}

/// Property-style definitions of an object map field
pub fn definitions_of(presentation: &Presentation<'_>, field: &str) -> IndexMap<String, PropertyDefinition> {
    presentation
        .object_map(field)
        .into_iter()
        .map(|(name, definition)| (name.to_string(), PropertyDefinition::from_presentation(&definition)))
        .collect()
}

pub fn interfaces_of(presentation: &Presentation<'_>) -> IndexMap<String, InterfaceDefinition> {
    presentation
        .object_map("interfaces")
        .into_iter()
        .map(|(name, interface)| (name.to_string(), InterfaceDefinition::from_presentation(&interface)))
        .collect()
}

pub fn artifacts_of(presentation: &Presentation<'_>) -> IndexMap<String, ArtifactDefinition> {
    presentation
        .object_map("artifacts")
        .into_iter()
        .map(|(name, artifact)| (name.to_string(), ArtifactDefinition::from_presentation(&artifact)))
        .collect()
}
