//! End-to-end tests
//!
//! Literal documents run through every stage via [orca::process].

use indexmap::IndexMap;
use orca::document::Documents;
use orca::hierarchy::Hierarchy;
use orca::issue::IssueKind;
use orca::plan::PlanOptions;
use orca::registry::Category;
use orca::value::Value;
use orca::{documents, Outcome};
use pretty_assertions::assert_eq;

const TYPES: &str = r#"
tosca_definitions_version: tosca_simple_yaml_1_3
capability_types:
  Container: {}
node_types:
  A:
    capabilities:
      host:
        type: Container
        max_occurrences: 1
  B:
    requirements:
      - needs_host: Container
"#;

fn process(documents: &Documents) -> Outcome {
    orca::process(documents, &IndexMap::new(), &mut PlanOptions::sequential()).expect("pass must complete")
}

fn edges(outcome: &Outcome) -> Vec<(&str, &str, &str, &str)> {
    outcome
        .topology
        .relationships
        .iter()
        .map(|edge| {
            (
                edge.source.as_str(),
                edge.requirement.as_str(),
                edge.target.as_str(),
                edge.capability.as_str(),
            )
        })
        .collect()
}

#[test]
fn host_is_bound_by_capability_type() {
    let documents = documents!(
        "types.yaml" => TYPES,
        "topology.yaml" => r#"
tosca_definitions_version: tosca_simple_yaml_1_3
topology_template:
  node_templates:
    a1: {type: A}
    b1: {type: B}
"#
    );

    let outcome = process(&documents);

    assert!(outcome.issues.is_empty(), "{}", outcome.issues);
    assert_eq!(edges(&outcome), [("b1", "needs_host", "a1", "host")]);
    assert_eq!(outcome.topology.occurrences("a1", "host"), Some(1));
    insta::assert_json_snapshot!(outcome.plan.node_instances, @r###"
    [
      {
        "id": "a1_1",
        "node_id": "a1",
        "relationships": []
      },
      {
        "id": "b1_1",
        "node_id": "b1",
        "relationships": [
          {
            "requirement": "needs_host",
            "target_name": "a1",
            "target_id": "a1_1"
          }
        ]
      }
    ]
    "###);
}

#[test]
fn exhausted_host_leaves_later_requirement_unbound() {
    let documents = documents!(
        "types.yaml" => TYPES,
        "topology.yaml" => r#"
tosca_definitions_version: tosca_simple_yaml_1_3
topology_template:
  node_templates:
    a1: {type: A}
    b1: {type: B}
    b2: {type: B}
"#
    );

    let outcome = process(&documents);

    assert_eq!(edges(&outcome), [("b1", "needs_host", "a1", "host")]);
    assert_eq!(outcome.topology.occurrences("a1", "host"), Some(1));
    let unbound: Vec<_> = outcome
        .issues
        .of_kind(IssueKind::NoTargetFound)
        .map(|issue| issue.message.as_str())
        .collect();
    assert_eq!(unbound, ["requirement `needs_host` of node template `b2` found no target"]);
    assert_eq!(outcome.issues.len(), 1);
}

#[test]
fn circular_derivation_is_reported_once() {
    let documents = documents!(
        r#"
tosca_definitions_version: tosca_simple_yaml_1_3
node_types:
  X: {derived_from: Z}
  Y: {derived_from: X}
  Z: {derived_from: Y}
  Leaf: {derived_from: X}
topology_template:
  node_templates:
    leaf: {type: Leaf}
"#
    );

    let outcome = process(&documents);

    let cycles: Vec<_> = outcome
        .issues
        .of_kind(IssueKind::CircularHierarchy)
        .map(|issue| issue.message.as_str())
        .collect();
    assert_eq!(cycles, ["circular derivation of node types: X -> Z -> Y -> X"]);
    assert_eq!(outcome.plan.nodes.len(), 1);
}

#[test]
fn defaults_fill_and_required_properties_are_reported() {
    let documents = documents!(
        r#"
tosca_definitions_version: tosca_simple_yaml_1_3
node_types:
  Db:
    properties:
      port: {type: integer, default: 5432}
      password: {type: string}
      replicas: {type: integer, required: false}
topology_template:
  node_templates:
    db: {type: Db}
"#
    );

    let outcome = process(&documents);

    let db = outcome.plan.node("db").expect("db is planned");
    assert_eq!(db.properties.get("port"), Some(&Value::Integer(5432)));
    assert_eq!(db.properties.get("password"), None);
    assert_eq!(db.properties.get("replicas"), None);
    let required: Vec<_> = outcome
        .issues
        .of_kind(IssueKind::RequiredPropertyNotAssigned)
        .map(|issue| issue.message.as_str())
        .collect();
    assert_eq!(required, ["required property `password` of node template `db` is not assigned"]);
}

#[test]
fn inputs_flow_into_properties_and_outputs() {
    let documents = documents!(
        r#"
tosca_definitions_version: tosca_simple_yaml_1_3
node_types:
  Web:
    properties:
      port: {type: integer}
topology_template:
  inputs:
    port:
      type: integer
      constraints:
        - in_range: [1, 65535]
  node_templates:
    web:
      type: Web
      properties:
        port: {get_input: port}
  outputs:
    endpoint:
      value: {concat: ["web:", {get_property: [web, port]}]}
"#
    );
    let inputs = IndexMap::from([("port".to_string(), Value::Integer(8080))]);

    let outcome = orca::process(&documents, &inputs, &mut PlanOptions::sequential()).unwrap();

    assert!(outcome.issues.is_empty(), "{}", outcome.issues);
    assert_eq!(outcome.plan.node("web").unwrap().properties.get("port"), Some(&Value::Integer(8080)));
    assert_eq!(outcome.plan.outputs["endpoint"].value, Value::from("web:8080"));
}

#[test]
fn effective_definitions_are_idempotent() {
    let documents = documents!(
        r#"
tosca_definitions_version: tosca_simple_yaml_1_3
node_types:
  Root:
    properties:
      port: {type: integer, default: 80}
  Web:
    derived_from: Root
    properties:
      port: {type: string}
      tls: {type: boolean, default: false}
"#
    );
    let outcome = process(&documents);
    let hierarchy = Hierarchy::new(&outcome.registry);
    let mut issues = outcome.issues.clone();

    let first = hierarchy.effective_properties(Category::Node, "Web", &mut issues);
    let second = hierarchy.effective_properties(Category::Node, "Web", &mut issues);

    assert_eq!(first, second);
    assert_eq!(first["port"].type_name.as_deref(), Some("integer"));
    assert_eq!(issues.of_kind(IssueKind::TypeOverrideConflict).count(), 1);
}

#[test]
fn repeated_passes_are_identical() {
    let documents = documents!(
        "types.yaml" => TYPES,
        "topology.yaml" => r#"
tosca_definitions_version: tosca_simple_yaml_1_3
topology_template:
  node_templates:
    b1: {type: B}
    a1: {type: A}
    a2: {type: A}
    b2: {type: B}
    b3: {type: B}
"#
    );

    let first = process(&documents);
    let second = process(&documents);

    assert_eq!(edges(&first), edges(&second));
    assert_eq!(
        edges(&first),
        [("b1", "needs_host", "a1", "host"), ("b2", "needs_host", "a2", "host")]
    );
    assert_eq!(first.plan, second.plan);
    assert_eq!(first.issues.as_slice(), second.issues.as_slice());
}

#[test]
fn capability_property_referring_to_itself_is_reported() {
    let documents = documents!(
        r#"
tosca_definitions_version: tosca_simple_yaml_1_3
capability_types:
  Endpoint:
    properties:
      port: {type: integer, required: false}
node_types:
  Web:
    capabilities:
      api: Endpoint
topology_template:
  node_templates:
    web:
      type: Web
      capabilities:
        api:
          properties:
            port: {get_property: [SELF, api, port]}
"#
    );

    let outcome = process(&documents);

    let loops: Vec<_> = outcome
        .issues
        .of_kind(IssueKind::FunctionLoop)
        .map(|issue| issue.message.as_str())
        .collect();
    assert_eq!(loops, ["circular get_property chain: web.api.port -> web.api.port"]);
    assert_eq!(outcome.plan.nodes.len(), 1);
}
