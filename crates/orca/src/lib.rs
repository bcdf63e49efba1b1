//! # orca - orchestration templates to deployment plans
//!
//! For CLI usage see the `orca` binary (`orca --help`).
//!
//! ## Introduction for developers
//!
//! Read this to understand how `orca` works internally.
//!
//! ### Template terms
//!
//! Quick introduction to terms used to describe orchestration templates.
//!
//! - a `type` (node type, capability type, ...) is a reusable definition. Types derive from at most one
//!   parent of the same category via `derived_from`
//! - a `template` (node template, relationship template) is a named instance of a type inside a topology.
//!   Templates carry *assignments* (values) where types carry *definitions*
//! - a `capability` is a typed socket a node offers
//! - a `requirement` is a typed plug a node needs bound to some other node's capability
//!
//! This is a valid template:
//! ```yaml
//! tosca_definitions_version: tosca_simple_yaml_1_3
//!
//! capability_types:
//!   Container: {}
//!
//! node_types:
//!   Server:
//!     capabilities:
//!       host: {type: Container, max_occurrences: 1}
//!   App:
//!     properties:
//!       port: {type: integer, default: 8080}
//!     requirements:
//!       - host: Container
//!
//! topology_template:
//!   node_templates:
//!     server: {type: Server}
//!     app: {type: App}
//! ```
//!
//! ### Loading files
//!
//! Documents are parsed with [serde_yaml] and converted into a [document::Node] tree. Every node carries a
//! [document::Locator] (source file and key path) so issues can point at the offending part of a document.
//! [document::Documents] holds all loaded documents; [document::Documents::load_file] follows `imports`.
//!
//! At this point documents only have to be valid YAML to be accepted.
//!
//! ### Presentations
//!
//! see [presentation::Presentation]
//!
//! A presentation is a typed view over one document node. Its shape is declared as data: a
//! [presentation::Schema] is a table of [presentation::FieldDescriptor]s (kind, element type, default,
//! required flag, allowed values, validator). The built-in table lives in [tosca] and is registered into a
//! [presentation::Presenters] registry by the caller.
//!
//! Validation walks a presentation tree and never fails on user data: every problem is appended to an
//! [issue::Issues] collector. Only engine problems (an unregistered schema) are returned as errors.
//!
//! ### Registry
//!
//! see [registry::Registry::load]
//!
//! Validated documents are merged into one registry: types per category and templates, all keyed by name.
//! Entities reference each other by name only, never by pointer. Once every document is merged the registry
//! is sealed; linking refuses unsealed registries.
//!
//! ### Type hierarchy
//!
//! see [hierarchy::Hierarchy]
//!
//! Effective definitions of a type are its parent's effective definitions overlaid with its own. Overlays
//! merge field by field, but may not change the data type of a property. Requirements are an ordered list
//! where a redeclared name replaces the inherited entry in place.
//!
//! **Example**
//!
//! | **type** | **declares**                       | **effective properties**        |
//! |----------|------------------------------------|---------------------------------|
//! | `Root`   | `port: integer = 80`               | `port: integer = 80`            |
//! | `Web`    | `port: default 8080`, `tls: bool`  | `port: integer = 8080`, `tls`   |
//! | `Bad`    | `port: string`                     | `port: integer = 80` (+ issue)  |
//!
//! ### Linking
//!
//! see [linker::Linker::link]
//!
//! Each requirement of each node template is bound to a capability of another node template. Templates are
//! linked in declaration order, requirements in declared order, candidates are tried in declaration order
//! and the first one with a matching capability that still accepts a relationship wins. Earlier bindings
//! are never reconsidered, so the order of templates in a document is observable in the result.
//!
//! ### Evaluation
//!
//! see [functions::Evaluator]
//!
//! Property values may be intrinsic function calls (`get_input`, `get_property`, `concat`). Calls are found
//! by a visitor ([visit::VisitFunctionsMut]) and replaced in place. A property whose value depends on
//! another property is evaluated on demand; the properties being evaluated are kept on a stack so
//! circular references are reported instead of followed.
//!
//! ### Output
//!
//! see [plan::Planner::instantiate]
//!
//! The linked topology becomes a [plan::DeploymentPlan]: node records with evaluated, coerced properties,
//! flattened operations and relationships, and node instance records with generated identifiers. The plan
//! is serialized via [serde].
//!
pub mod coerce;
pub mod constraints;
pub mod definitions;
pub mod document;
pub mod functions;
pub mod hierarchy;
pub mod issue;
pub mod linker;
pub mod plan;
pub mod presentation;
pub mod registry;
pub mod tosca;
pub mod value;
mod visit;

use crate::document::Documents;
use crate::hierarchy::Hierarchy;
use crate::issue::{Error, Issues};
use crate::linker::{Linker, Topology};
use crate::plan::{DeploymentPlan, PlanOptions, Planner};
use crate::presentation::Presenters;
use crate::registry::Registry;
use crate::value::Value;
use indexmap::IndexMap;

/// Presenters with the built-in schema table registered
pub fn presenters() -> Result<Presenters, Error> {
    let mut presenters = Presenters::default();
    tosca::register(&mut presenters);
    presenters.verify()?;
    Ok(presenters)
}

/// Everything one pass produces
#[derive(Debug)]
pub struct Outcome {
    pub registry: Registry,
    pub topology: Topology,
    pub plan: DeploymentPlan,
    pub issues: Issues,
}

/// Runs all stages: validation, hierarchy checks, linking and instantiation
///
/// User-data problems end up in [Outcome::issues]. An outcome with error issues holds a provisional plan.
#[tracing::instrument(level = "debug", skip_all, fields(documents = documents.document_count()))]
pub fn process(
    documents: &Documents,
    inputs: &IndexMap<String, Value>,
    options: &mut PlanOptions,
) -> Result<Outcome, Error> {
    let presenters = presenters()?;
    let mut issues = Issues::new();

    let registry = Registry::load(documents, &presenters, &mut issues)?;
    Hierarchy::new(&registry).check_all(&mut issues);
    let topology = Linker::new(&registry).link(&mut issues)?;
    let plan = Planner::new(&registry).instantiate(&topology, inputs, options, &mut issues)?;

    tracing::info!(issues = issues.len(), errors = issues.has_errors(), "processed");
    Ok(Outcome {
        registry,
        topology,
        plan,
        issues,
    })
}
