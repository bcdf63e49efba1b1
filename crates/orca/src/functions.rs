//! Intrinsic functions
//!
//! A function call is a single-key mapping such as `{ get_input: port }`. Calls are replaced in
//! place by their result. `get_attribute` depends on runtime state and is kept as written, as is
//! any call with an argument that cannot be evaluated yet.
//!
//! `get_property` may refer to properties that are themselves calls. Those are evaluated on
//! demand; the chain of properties being evaluated is kept on a stack, and a property that is
//! already on the stack is a loop.
use crate::document::Locator;
use crate::issue::{Issue, IssueKind, Issues};
use crate::value::Value;
use crate::visit::VisitFunctionsMut;
use indexmap::IndexMap;

pub const FUNCTIONS: [&str; 4] = ["get_input", "get_property", "get_attribute", "concat"];

pub fn is_function_call(value: &Value) -> bool {
    match value {
        Value::Object(object) if object.len() == 1 => object
            .keys()
            .next()
            .is_some_and(|key| FUNCTIONS.contains(&key.as_str())),
        _ => false,
    }
}

/// Values of one node template before evaluation
#[derive(Debug, Clone, Default)]
pub struct NodeValues {
    pub properties: IndexMap<String, Value>,
    pub capabilities: IndexMap<String, IndexMap<String, Value>>,
    pub locator: Option<Locator>,
}

/// What `SELF` refers to
#[derive(Debug, Clone, Copy)]
pub enum Subject<'c> {
    Node(&'c str),
    /// Properties that do not belong to a node template, e.g. a relationship's
    Local {
        label: &'c str,
        properties: &'c IndexMap<String, Value>,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Context<'c> {
    pub this: Option<Subject<'c>>,
    pub source: Option<&'c str>,
    pub target: Option<&'c str>,
    pub locator: Option<&'c Locator>,
}

impl<'c> Context<'c> {
    pub fn node(name: &'c str, locator: Option<&'c Locator>) -> Self {
        Self {
            this: Some(Subject::Node(name)),
            locator,
            ..Default::default()
        }
    }
}

pub struct Evaluator<'e> {
    inputs: &'e IndexMap<String, Value>,
    nodes: &'e IndexMap<String, NodeValues>,
    resolved: IndexMap<(String, String), Value>,
    stack: Vec<(String, String)>,
    loops: usize,
}

impl<'e> Evaluator<'e> {
    pub fn new(inputs: &'e IndexMap<String, Value>, nodes: &'e IndexMap<String, NodeValues>) -> Self {
        Self {
            inputs,
            nodes,
            resolved: IndexMap::new(),
            stack: vec![],
            loops: 0,
        }
    }

    /// Replaces every call in `value` that can be evaluated
    pub fn evaluate(&mut self, mut value: Value, context: Context<'_>, issues: &mut Issues) -> Value {
        value.visit_functions_mut(&mut |call: &mut Value| {
            if let Some(result) = self.call(call, context, issues) {
                *call = result;
            }
        });
        value
    }

    /// Evaluated property of a node template, memoized
    pub fn node_property(&mut self, node: &str, property: &str, issues: &mut Issues) -> Option<Value> {
        let nodes = self.nodes;
        let values = nodes.get(node)?;
        let raw = values.properties.get(property)?;
        let context = Context::node(node, values.locator.as_ref());
        self.resolve(node, property, raw, context, issues)
    }

    /// Evaluated property of a node template's capability, memoized as `capability.property`
    pub fn capability_property(
        &mut self,
        node: &str,
        capability: &str,
        property: &str,
        issues: &mut Issues,
    ) -> Option<Value> {
        let nodes = self.nodes;
        let values = nodes.get(node)?;
        let raw = values.capabilities.get(capability)?.get(property)?;
        let context = Context::node(node, values.locator.as_ref());
        self.resolve(node, &format!("{capability}.{property}"), raw, context, issues)
    }

    fn resolve(
        &mut self,
        owner: &str,
        property: &str,
        raw: &Value,
        context: Context<'_>,
        issues: &mut Issues,
    ) -> Option<Value> {
        let key = (owner.to_string(), property.to_string());
        if let Some(value) = self.resolved.get(&key) {
            return Some(value.clone());
        }

        if let Some(position) = self.stack.iter().position(|entry| *entry == key) {
            issues.log(
                Issue::error(IssueKind::FunctionLoop, loop_message(&self.stack[position..])).at(context.locator),
            );
            self.loops += 1;
            return None;
        }

        let loops = self.loops;
        self.stack.push(key.clone());
        let value = self.evaluate(raw.clone(), context, issues);
        self.stack.pop();

        // anything evaluated on top of a loop stays as written
        if self.loops != loops {
            return None;
        }
        self.resolved.insert(key, value.clone());
        Some(value)
    }

    /// Result of one call, or `None` to keep the call as written
    fn call(&mut self, call: &Value, context: Context<'_>, issues: &mut Issues) -> Option<Value> {
        let (name, argument) = call.as_object()?.first()?;
        let fail = |issues: &mut Issues, kind: IssueKind, message: String| {
            issues.log(Issue::error(kind, message).at(context.locator));
            None
        };

        match name.as_str() {
            "get_input" => {
                let (input, keys): (&str, Vec<String>) = match argument {
                    Value::String(input) => (input.as_str(), vec![]),
                    Value::Array(items) => match items.split_first() {
                        Some((Value::String(input), keys)) => {
                            (input.as_str(), keys.iter().map(Value::to_plain_string).collect())
                        }
                        _ => return fail(issues, IssueKind::FunctionError, format!("get_input: expected an input name, found {argument}")),
                    },
                    _ => return fail(issues, IssueKind::FunctionError, format!("get_input: expected an input name, found {argument}")),
                };
                let Some(value) = self.inputs.get(input) else {
                    return fail(issues, IssueKind::UnknownInput, format!("get_input: unknown input `{input}`"));
                };
                nested(value, &keys).or_else(|| {
                    fail(issues, IssueKind::FunctionError, format!("get_input: `{input}` has no value at {}", path_of(&keys)))
                })
            }
            "get_property" => {
                let arguments = match argument.as_array() {
                    Some(arguments) if arguments.len() >= 2 => arguments,
                    _ => return fail(issues, IssueKind::FunctionError, format!("get_property: expected [entity, property, ...], found {argument}")),
                };
                let names: Option<Vec<&str>> = arguments.iter().map(Value::as_str).collect();
                let Some([entity, property, keys @ ..]) = names.as_deref() else {
                    return fail(issues, IssueKind::FunctionError, format!("get_property: arguments must be names, found {argument}"));
                };
                self.get_property(entity, property, keys, context, issues)
            }
            "concat" => {
                let Some(parts) = argument.as_array() else {
                    return fail(issues, IssueKind::FunctionError, format!("concat: expected a list, found {argument}"));
                };
                let mut joined = String::new();
                for part in parts {
                    let part = self.evaluate(part.clone(), context, issues);
                    if is_function_call(&part) || contains_call(&part) {
                        return None;
                    }
                    joined.push_str(&part.to_plain_string());
                }
                Some(Value::String(joined))
            }
            // runtime
            _ => None,
        }
    }

    fn get_property(
        &mut self,
        entity: &str,
        property: &str,
        keys: &[&str],
        context: Context<'_>,
        issues: &mut Issues,
    ) -> Option<Value> {
        let subject = match entity {
            "SELF" => context.this,
            "SOURCE" => context.source.map(Subject::Node),
            "TARGET" => context.target.map(Subject::Node),
            node => Some(Subject::Node(node)),
        };
        let fail = |issues: &mut Issues, message: String| {
            issues.log(Issue::error(IssueKind::FunctionError, message).at(context.locator));
            None
        };

        let value = match subject {
            None => return fail(issues, format!("get_property: `{entity}` is not available here")),
            Some(Subject::Local { label, properties }) => match properties.get(property) {
                Some(raw) => self.resolve(label, property, raw, context, issues)?,
                None => return fail(issues, format!("get_property: {label} has no property `{property}`")),
            },
            Some(Subject::Node(node)) => {
                let nodes = self.nodes;
                let Some(values) = nodes.get(node) else {
                    return fail(issues, format!("get_property: unknown node template `{node}`"));
                };
                if values.properties.contains_key(property) {
                    self.node_property(node, property, issues)?
                } else if let Some(capability) = values.capabilities.get(property) {
                    // [node, capability, property, ...]
                    let Some((name, keys)) = keys.split_first() else {
                        let mut evaluated = IndexMap::new();
                        for name in capability.keys() {
                            let value = self.capability_property(node, property, name, issues)?;
                            evaluated.insert(name.clone(), value);
                        }
                        return Some(Value::Object(evaluated));
                    };
                    if !capability.contains_key(*name) {
                        return fail(issues, format!("get_property: capability `{property}` of node template `{node}` has no property `{name}`"));
                    }
                    let value = self.capability_property(node, property, name, issues)?;
                    return nested(&value, keys)
                        .or_else(|| fail(issues, format!("get_property: `{property}.{name}` has no value at {}", path_of(keys))));
                } else {
                    return fail(issues, format!("get_property: node template `{node}` has no property or capability `{property}`"));
                }
            }
        };

        nested(&value, keys).or_else(|| fail(issues, format!("get_property: `{property}` has no value at {}", path_of(keys))))
    }
}

fn nested<K: AsRef<str>>(value: &Value, keys: &[K]) -> Option<Value> {
    let keys: Vec<String> = keys.iter().map(|key| key.as_ref().to_string()).collect();
    value.lookup(&keys).cloned()
}

fn path_of<K: AsRef<str>>(keys: &[K]) -> String {
    keys.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(".")
}

fn contains_call(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|item| is_function_call(item) || contains_call(item)),
        Value::Object(object) => object.values().any(|item| is_function_call(item) || contains_call(item)),
        _ => false,
    }
}

/// Rotated to start at the smallest entry so every entry point into the loop reads the same
fn loop_message(members: &[(String, String)]) -> String {
    let start = members
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map_or(0, |(index, _)| index);
    let mut names: Vec<String> = members[start..]
        .iter()
        .chain(&members[..start])
        .map(|(owner, property)| format!("{owner}.{property}"))
        .collect();
    if let Some(first) = names.first().cloned() {
        names.push(first);
    }
    format!("circular get_property chain: {}", names.join(" -> "))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(name: &str, argument: Value) -> Value {
        Value::Object(IndexMap::from([(name.to_string(), argument)]))
    }

    fn list(items: &[&str]) -> Value {
        Value::Array(items.iter().map(|item| Value::from(*item)).collect())
    }

    fn nodes() -> IndexMap<String, NodeValues> {
        let web = NodeValues {
            properties: IndexMap::from([
                ("port".to_string(), call("get_input", "port".into())),
                ("url".to_string(), call("concat", Value::Array(vec!["http://db:".into(), call("get_property", list(&["db", "port"]))]))),
                ("ip".to_string(), call("get_attribute", list(&["SELF", "ip"]))),
            ]),
            ..Default::default()
        };
        let db = NodeValues {
            properties: IndexMap::from([
                ("port".to_string(), Value::Integer(5432)),
                ("settings".to_string(), Value::Object(IndexMap::from([("mode".to_string(), "ha".into())]))),
            ]),
            capabilities: IndexMap::from([(
                "endpoint".to_string(),
                IndexMap::from([("protocol".to_string(), "tcp".into())]),
            )]),
            ..Default::default()
        };
        let a = NodeValues {
            properties: IndexMap::from([("x".to_string(), call("get_property", list(&["b", "y"])))]),
            ..Default::default()
        };
        let b = NodeValues {
            properties: IndexMap::from([("y".to_string(), call("get_property", list(&["a", "x"])))]),
            ..Default::default()
        };
        let api = NodeValues {
            capabilities: IndexMap::from([(
                "api".to_string(),
                IndexMap::from([
                    ("port".to_string(), call("get_property", list(&["SELF", "api", "port"]))),
                    ("scheme".to_string(), "https".into()),
                ]),
            )]),
            ..Default::default()
        };
        IndexMap::from([
            ("web".to_string(), web),
            ("api".to_string(), api),
            ("db".to_string(), db),
            ("a".to_string(), a),
            ("b".to_string(), b),
        ])
    }

    #[test]
    fn evaluates_inputs_properties_and_concat() {
        let inputs = IndexMap::from([("port".to_string(), Value::Integer(8080))]);
        let nodes = nodes();
        let mut evaluator = Evaluator::new(&inputs, &nodes);
        let mut issues = Issues::new();

        assert_eq!(evaluator.node_property("web", "port", &mut issues), Some(Value::Integer(8080)));
        assert_eq!(evaluator.node_property("web", "url", &mut issues), Some("http://db:5432".into()));
        assert_eq!(
            evaluator.evaluate(call("get_property", list(&["db", "settings", "mode"])), Context::default(), &mut issues),
            Value::from("ha")
        );
        assert_eq!(
            evaluator.evaluate(call("get_property", list(&["db", "endpoint", "protocol"])), Context::default(), &mut issues),
            Value::from("tcp")
        );
        assert!(issues.is_empty(), "{issues}");
    }

    #[test]
    fn runtime_calls_are_kept() {
        let inputs = IndexMap::new();
        let nodes = nodes();
        let mut evaluator = Evaluator::new(&inputs, &nodes);
        let mut issues = Issues::new();

        let ip = evaluator.node_property("web", "ip", &mut issues);
        let joined = evaluator.evaluate(
            call("concat", Value::Array(vec!["x".into(), call("get_attribute", list(&["SELF", "ip"]))])),
            Context::node("web", None),
            &mut issues,
        );

        assert_eq!(ip, Some(call("get_attribute", list(&["SELF", "ip"]))));
        assert!(is_function_call(&joined));
        assert!(issues.is_empty());
    }

    #[test]
    fn self_source_and_target() {
        let inputs = IndexMap::new();
        let nodes = nodes();
        let local = IndexMap::from([("weight".to_string(), Value::Integer(3))]);
        let mut evaluator = Evaluator::new(&inputs, &nodes);
        let mut issues = Issues::new();
        let context = Context {
            this: Some(Subject::Local { label: "relationship web.db", properties: &local }),
            source: Some("web"),
            target: Some("db"),
            locator: None,
        };

        let value = evaluator.evaluate(
            Value::Array(vec![
                call("get_property", list(&["SELF", "weight"])),
                call("get_property", list(&["TARGET", "port"])),
            ]),
            context,
            &mut issues,
        );

        assert_eq!(value, Value::Array(vec![Value::Integer(3), Value::Integer(5432)]));
        evaluator.evaluate(call("get_property", list(&["SOURCE", "port"])), Context::default(), &mut issues);
        assert_eq!(issues.of_kind(IssueKind::FunctionError).count(), 1);
    }

    #[test]
    fn loops_are_reported_once() {
        let inputs = IndexMap::new();
        let nodes = nodes();
        let mut evaluator = Evaluator::new(&inputs, &nodes);
        let mut issues = Issues::new();

        evaluator.node_property("a", "x", &mut issues);
        evaluator.node_property("b", "y", &mut issues);

        let loops: Vec<_> = issues.of_kind(IssueKind::FunctionLoop).map(|issue| issue.message.as_str()).collect();
        assert_eq!(loops, ["circular get_property chain: a.x -> b.y -> a.x"]);
    }

    #[test]
    fn looping_values_are_not_memoized() {
        let inputs = IndexMap::new();
        let nodes = nodes();
        let mut evaluator = Evaluator::new(&inputs, &nodes);
        let mut issues = Issues::new();

        let first = evaluator.node_property("a", "x", &mut issues);
        let second = evaluator.node_property("a", "x", &mut issues);

        assert_eq!(first, None);
        assert_eq!(second, None);
        assert!(evaluator.resolved.is_empty());
        assert_eq!(issues.of_kind(IssueKind::FunctionLoop).count(), 1);
    }

    #[test]
    fn capability_property_referring_to_itself_is_a_loop() {
        let inputs = IndexMap::new();
        let nodes = nodes();
        let mut evaluator = Evaluator::new(&inputs, &nodes);
        let mut issues = Issues::new();

        let port = evaluator.capability_property("api", "api", "port", &mut issues);
        let scheme = evaluator.evaluate(call("get_property", list(&["api", "api", "scheme"])), Context::default(), &mut issues);

        assert_eq!(port, None);
        assert_eq!(scheme, Value::from("https"));
        let loops: Vec<_> = issues.of_kind(IssueKind::FunctionLoop).map(|issue| issue.message.as_str()).collect();
        assert_eq!(loops, ["circular get_property chain: api.api.port -> api.api.port"]);
    }

    #[test]
    fn unknown_inputs() {
        let inputs = IndexMap::new();
        let nodes = IndexMap::new();
        let mut evaluator = Evaluator::new(&inputs, &nodes);
        let mut issues = Issues::new();

        let value = evaluator.evaluate(call("get_input", "missing".into()), Context::default(), &mut issues);

        assert!(is_function_call(&value));
        assert_eq!(issues.of_kind(IssueKind::UnknownInput).count(), 1);
    }
}
