//! Type hierarchy resolution
//!
//! Parents are looked up by name in the [Registry]. Walks are bounded by the number of types in
//! the category and stop at the first revisited name, so every cycle is found and every walk
//! terminates.
//!
//! Resolution is best-effort: a broken chain is reported and the part of the chain that could be
//! walked is still used. Nothing here mutates the registry.
use crate::definitions::{
    overlay_map, ArtifactDefinition, CapabilityDefinition, Conflict, InterfaceDefinition, Overlay, PropertyDefinition,
    RequirementDefinition,
};
use crate::document::Locator;
use crate::issue::{Issue, IssueKind, Issues};
use crate::registry::{Category, Registry, TypeEntity};
use indexmap::IndexMap;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum HierarchyError {
    #[error("{category} `{name}` derives from unknown {category} `{parent}`")]
    UnknownParentType {
        category: Category,
        name: String,
        parent: String,
        locator: Option<Locator>,
    },
    #[error("circular derivation of {category}s: {}", .cycle.join(" -> "))]
    CircularHierarchy {
        category: Category,
        /// Starts and ends with the smallest member name
        cycle: Vec<String>,
        locator: Option<Locator>,
    },
}

impl HierarchyError {
    pub fn to_issue(&self) -> Issue {
        let (kind, locator) = match self {
            HierarchyError::UnknownParentType { locator, .. } => (IssueKind::UnknownParentType, locator),
            HierarchyError::CircularHierarchy { locator, .. } => (IssueKind::CircularHierarchy, locator),
        };
        Issue::error(kind, self.to_string()).at(locator.as_ref())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Hierarchy<'r> {
    registry: &'r Registry,
}

impl<'r> Hierarchy<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// The `derived_from` target of a type
    ///
    /// A data type deriving from a primitive type has no parent in the registry.
    pub fn resolve_parent(
        &self,
        category: Category,
        entity: &TypeEntity,
    ) -> Result<Option<&'r TypeEntity>, HierarchyError> {
        let Some(parent) = &entity.derived_from else {
            return Ok(None);
        };
        if category == Category::Data && crate::coerce::is_primitive_type(parent) {
            return Ok(None);
        }
        match self.registry.get_type(category, parent) {
            Some(parent) => Ok(Some(parent)),
            None => Err(HierarchyError::UnknownParentType {
                category,
                name: entity.name.clone(),
                parent: parent.clone(),
                locator: entity.locator.clone(),
            }),
        }
    }

    /// Walks from `name` towards the root. Returns what could be walked and the problem that
    /// stopped the walk, if any.
    fn walk(&self, category: Category, name: &str) -> (Vec<&'r TypeEntity>, Option<HierarchyError>) {
        let Some(mut current) = self.registry.get_type(category, name) else {
            return (vec![], None);
        };
        let mut chain = vec![current];

        for _ in 0..self.registry.type_count(category) {
            match self.resolve_parent(category, current) {
                Ok(None) => return (chain, None),
                Ok(Some(parent)) => {
                    if let Some(position) = chain.iter().position(|seen| seen.name == parent.name) {
                        let error = circular(category, &chain[position..]);
                        return (chain, Some(error));
                    }
                    chain.push(parent);
                    current = parent;
                }
                Err(error) => return (chain, Some(error)),
            }
        }

        (chain, None)
    }

    /// The type followed by its ancestors, nearest first
    pub fn ancestry(&self, category: Category, name: &str) -> Result<Vec<&'r TypeEntity>, HierarchyError> {
        match self.walk(category, name) {
            (_, Some(error)) => Err(error),
            (chain, None) => Ok(chain),
        }
    }

    /// Like [Hierarchy::ancestry], reporting a broken chain and returning the walked part
    pub fn chain(&self, category: Category, name: &str, issues: &mut Issues) -> Vec<&'r TypeEntity> {
        let (chain, error) = self.walk(category, name);
        if let Some(error) = error {
            issues.log(error.to_issue());
        }
        chain
    }

    /// Ancestor names, root first, ending with the type itself
    pub fn type_hierarchy(&self, category: Category, name: &str) -> Vec<String> {
        let (chain, _) = self.walk(category, name);
        chain.iter().rev().map(|entity| entity.name.clone()).collect()
    }

    /// Whether `name` is `ancestor` or derives from it
    pub fn is_descendant(&self, category: Category, name: &str, ancestor: &str) -> bool {
        if name == ancestor {
            return true;
        }
        let (chain, _) = self.walk(category, name);
        chain.iter().any(|entity| entity.name == ancestor)
    }

    /// Whether `name` descends from any of `ancestors`
    pub fn descends_from_any(&self, category: Category, name: &str, ancestors: &[String]) -> bool {
        ancestors
            .iter()
            .any(|ancestor| self.is_descendant(category, name, ancestor))
    }

    fn effective_map<T: Overlay + Clone + 'r>(
        &self,
        category: Category,
        name: &str,
        facet: &str,
        select: impl Fn(&'r TypeEntity) -> &'r IndexMap<String, T>,
        issues: &mut Issues,
    ) -> IndexMap<String, T> {
        let mut effective = IndexMap::new();
        for entity in self.chain(category, name, issues).into_iter().rev() {
            let mut conflicts = vec![];
            overlay_map(&mut effective, select(entity), facet, &mut conflicts);
            report_conflicts(category, entity, conflicts, issues);
        }
        effective
    }

    pub fn effective_properties(
        &self,
        category: Category,
        name: &str,
        issues: &mut Issues,
    ) -> IndexMap<String, PropertyDefinition> {
        self.effective_map(category, name, "properties", |entity| &entity.properties, issues)
    }

    pub fn effective_attributes(
        &self,
        category: Category,
        name: &str,
        issues: &mut Issues,
    ) -> IndexMap<String, PropertyDefinition> {
        self.effective_map(category, name, "attributes", |entity| &entity.attributes, issues)
    }

    pub fn effective_capabilities(
        &self,
        category: Category,
        name: &str,
        issues: &mut Issues,
    ) -> IndexMap<String, CapabilityDefinition> {
        self.effective_map(category, name, "capabilities", |entity| &entity.capabilities, issues)
    }

    pub fn effective_interfaces(
        &self,
        category: Category,
        name: &str,
        issues: &mut Issues,
    ) -> IndexMap<String, InterfaceDefinition> {
        self.effective_map(category, name, "interfaces", |entity| &entity.interfaces, issues)
    }

    pub fn effective_artifacts(
        &self,
        category: Category,
        name: &str,
        issues: &mut Issues,
    ) -> IndexMap<String, ArtifactDefinition> {
        self.effective_map(category, name, "artifacts", |entity| &entity.artifacts, issues)
    }

    /// Nearest declaration of an optional list along the chain, e.g. `members` of a group type
    pub fn effective_list(
        &self,
        category: Category,
        name: &str,
        select: impl Fn(&'r TypeEntity) -> Option<&'r Vec<String>>,
    ) -> Option<Vec<String>> {
        let (chain, _) = self.walk(category, name);
        chain.into_iter().find_map(select).cloned()
    }

    /// Ordered append: a redeclared name replaces the inherited entry in place
    pub fn effective_requirements(
        &self,
        category: Category,
        name: &str,
        issues: &mut Issues,
    ) -> Vec<(String, RequirementDefinition)> {
        let mut effective: Vec<(String, RequirementDefinition)> = vec![];
        for entity in self.chain(category, name, issues).into_iter().rev() {
            for (name, requirement) in &entity.requirements {
                match effective.iter_mut().find(|(inherited, _)| inherited == name) {
                    Some(inherited) => inherited.1 = requirement.clone(),
                    None => effective.push((name.clone(), requirement.clone())),
                }
            }
        }
        effective
    }

    /// Resolves every type of every category, reporting all hierarchy problems
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn check_all(&self, issues: &mut Issues) {
        for category in Category::ALL {
            for entity in self.registry.types(category) {
                let name = entity.name.as_str();
                self.effective_properties(category, name, issues);
                self.effective_attributes(category, name, issues);
                self.effective_capabilities(category, name, issues);
                self.effective_interfaces(category, name, issues);
                self.effective_artifacts(category, name, issues);
                self.effective_requirements(category, name, issues);
            }
            tracing::trace!(%category, types = self.registry.type_count(category), "hierarchy checked");
        }
    }
}

/// Rotates the cycle to start at its smallest name so that every walk into the same cycle
/// produces the same issue
fn circular(category: Category, members: &[&TypeEntity]) -> HierarchyError {
    let start = members
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.name.cmp(&b.name))
        .map_or(0, |(index, _)| index);
    let rotated: Vec<&TypeEntity> = members[start..].iter().chain(&members[..start]).copied().collect();

    let mut cycle: Vec<String> = rotated.iter().map(|entity| entity.name.clone()).collect();
    if let Some(first) = cycle.first().cloned() {
        cycle.push(first);
    }
    HierarchyError::CircularHierarchy {
        category,
        cycle,
        locator: rotated.first().and_then(|entity| entity.locator.clone()),
    }
}

fn report_conflicts(category: Category, entity: &TypeEntity, conflicts: Vec<Conflict>, issues: &mut Issues) {
    for conflict in conflicts {
        issues.log(
            Issue::error(
                IssueKind::TypeOverrideConflict,
                format!(
                    "{category} `{}` cannot change the data type of {} from `{}` to `{}`",
                    entity.name, conflict.path, conflict.kept, conflict.attempted
                ),
            )
            .at(conflict.locator.as_ref().or(entity.locator.as_ref())),
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::documents;
    use crate::presentation::Presenters;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn registry(text: &str) -> (Registry, Issues) {
        let mut presenters = Presenters::default();
        crate::tosca::register(&mut presenters);
        let mut issues = Issues::new();
        let documents = documents!(text);
        let registry = Registry::load(&documents, &presenters, &mut issues).unwrap();
        (registry, issues)
    }

    #[test]
    fn properties_overlay_along_the_chain() {
        let (registry, mut issues) = registry(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
node_types:
  Root:
    properties:
      name: {type: string, default: root}
      port: {type: integer}
  Web:
    derived_from: Root
    properties:
      port: {type: integer, default: 80}
      path: {type: string, required: false}
"#,
        );
        let hierarchy = Hierarchy::new(&registry);

        let properties = hierarchy.effective_properties(Category::Node, "Web", &mut issues);

        assert!(issues.is_empty(), "{issues}");
        let names: Vec<_> = properties.keys().map(String::as_str).collect();
        assert_eq!(names, ["name", "port", "path"]);
        assert_eq!(properties["name"].default, Some("root".into()));
        assert_eq!(properties["port"].default, Some(Value::Integer(80)));
        assert_eq!(hierarchy.type_hierarchy(Category::Node, "Web"), ["Root", "Web"]);
        assert!(hierarchy.is_descendant(Category::Node, "Web", "Root"));
        assert!(!hierarchy.is_descendant(Category::Node, "Root", "Web"));
    }

    #[test]
    fn type_changes_are_reported_and_parent_type_kept() {
        let (registry, mut issues) = registry(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
node_types:
  Root:
    properties:
      port: {type: integer}
  Web:
    derived_from: Root
    properties:
      port: {type: string, default: eighty}
  Site:
    derived_from: Web
"#,
        );
        let hierarchy = Hierarchy::new(&registry);

        let web = hierarchy.effective_properties(Category::Node, "Web", &mut issues);
        let site = hierarchy.effective_properties(Category::Node, "Site", &mut issues);

        assert_eq!(web["port"].type_name.as_deref(), Some("integer"));
        assert_eq!(site["port"].default, Some("eighty".into()));
        assert_eq!(issues.of_kind(IssueKind::TypeOverrideConflict).count(), 1);
        assert!(issues.as_slice()[0].message.contains("`Web`"));
    }

    #[test]
    fn requirements_replace_in_place_and_append() {
        let (registry, mut issues) = registry(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
capability_types:
  Container: {}
  Endpoint: {}
node_types:
  Root:
    requirements:
      - host: Container
      - db: Endpoint
  App:
    derived_from: Root
    requirements:
      - cache: Endpoint
      - host: {capability: Container, occurrences: [0, 1]}
"#,
        );
        let hierarchy = Hierarchy::new(&registry);

        let requirements = hierarchy.effective_requirements(Category::Node, "App", &mut issues);

        let names: Vec<_> = requirements.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["host", "db", "cache"]);
        assert_eq!(requirements[0].1.min_occurrences(), 0);
    }

    #[test]
    fn one_issue_per_cycle() {
        let (registry, mut issues) = registry(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
node_types:
  C: {derived_from: A}
  A: {derived_from: B}
  B: {derived_from: C}
  D: {derived_from: A}
  E: {derived_from: E}
"#,
        );
        let hierarchy = Hierarchy::new(&registry);

        hierarchy.check_all(&mut issues);

        let cycles: Vec<_> = issues
            .of_kind(IssueKind::CircularHierarchy)
            .map(|issue| issue.message.as_str())
            .collect();
        assert_eq!(
            cycles,
            [
                "circular derivation of node types: A -> B -> C -> A",
                "circular derivation of node types: E -> E",
            ]
        );
        assert!(matches!(
            hierarchy.ancestry(Category::Node, "D"),
            Err(HierarchyError::CircularHierarchy { .. })
        ));
    }

    #[test]
    fn unknown_parents_keep_the_walked_chain() {
        let mut registry = Registry::default();
        let mut issues = Issues::new();
        registry.insert_type(
            Category::Node,
            TypeEntity {
                name: "Web".into(),
                derived_from: Some("Missing".into()),
                ..Default::default()
            },
            &mut issues,
        );
        let hierarchy = Hierarchy::new(&registry);

        assert_eq!(hierarchy.type_hierarchy(Category::Node, "Web"), ["Web"]);
        assert_eq!(hierarchy.chain(Category::Node, "Web", &mut issues).len(), 1);
        assert_eq!(issues.of_kind(IssueKind::UnknownParentType).count(), 1);
    }

    #[test]
    fn resolution_is_idempotent() {
        let (registry, mut issues) = registry(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_3
capability_types:
  Container: {}
node_types:
  Root:
    capabilities:
      host: {type: Container, occurrences: [0, 2]}
  Web:
    derived_from: Root
    capabilities:
      host: {type: Container, valid_source_types: [Root]}
"#,
        );
        let hierarchy = Hierarchy::new(&registry);

        let first = hierarchy.effective_capabilities(Category::Node, "Web", &mut issues);
        let second = hierarchy.effective_capabilities(Category::Node, "Web", &mut issues);

        assert_eq!(first, second);
        assert_eq!(first["host"].min_occurrences, Some(0));
        assert_eq!(first["host"].valid_source_types, Some(vec!["Root".to_string()]));
    }
}
