//! Constraint clauses and node filters
use crate::presentation::Presentation;
use crate::value::Value;
use indexmap::IndexMap;
use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub enum Constraint {
    Equal(Value),
    GreaterThan(Value),
    GreaterOrEqual(Value),
    LessThan(Value),
    LessOrEqual(Value),
    InRange(Value, Value),
    ValidValues(Vec<Value>),
    Length(usize),
    MinLength(usize),
    MaxLength(usize),
    Pattern(regex::Regex),
}

impl Constraint {
    /// Parses a single-key clause such as `{ greater_than: 1 }`
    pub fn parse(clause: &Value) -> Result<Self, String> {
        let Some(object) = clause.as_object().filter(|object| object.len() == 1) else {
            return Err(format!("constraint clause must be a single-key mapping, found {clause}"));
        };
        let Some((operator, argument)) = object.first() else {
            return Err("empty constraint clause".into());
        };

        let length = |argument: &Value| {
            argument
                .as_i64()
                .and_then(|length| usize::try_from(length).ok())
                .ok_or_else(|| format!("`{operator}` needs a non-negative integer"))
        };

        Ok(match operator.as_str() {
            "equal" => Constraint::Equal(argument.clone()),
            "greater_than" => Constraint::GreaterThan(argument.clone()),
            "greater_or_equal" => Constraint::GreaterOrEqual(argument.clone()),
            "less_than" => Constraint::LessThan(argument.clone()),
            "less_or_equal" => Constraint::LessOrEqual(argument.clone()),
            "in_range" => match argument.as_array() {
                Some([lower, upper]) => Constraint::InRange(lower.clone(), upper.clone()),
                _ => return Err("`in_range` needs a list of two values".into()),
            },
            "valid_values" => match argument.as_array() {
                Some(values) => Constraint::ValidValues(values.to_vec()),
                None => return Err("`valid_values` needs a list".into()),
            },
            "length" => Constraint::Length(length(argument)?),
            "min_length" => Constraint::MinLength(length(argument)?),
            "max_length" => Constraint::MaxLength(length(argument)?),
            "pattern" => {
                let pattern = argument
                    .as_str()
                    .ok_or_else(|| "`pattern` needs a string".to_string())?;
                let regex = regex::Regex::new(&format!("^(?:{pattern})$"))
                    .map_err(|error| format!("invalid pattern: {error}"))?;
                Constraint::Pattern(regex)
            }
            other => return Err(format!("unknown constraint operator `{other}`")),
        })
    }

    /// A single clause or a list of clauses
    pub fn parse_many(value: &Value) -> Result<Vec<Self>, String> {
        match value {
            Value::Array(clauses) => clauses.iter().map(Constraint::parse).collect(),
            clause => Constraint::parse(clause).map(|constraint| vec![constraint]),
        }
    }

    pub fn check(&self, value: &Value) -> bool {
        let ordering = |bound: &Value| compare(value, bound);
        match self {
            Constraint::Equal(expected) => ordering(expected) == Some(Ordering::Equal),
            Constraint::GreaterThan(bound) => ordering(bound) == Some(Ordering::Greater),
            Constraint::GreaterOrEqual(bound) => {
                matches!(ordering(bound), Some(Ordering::Greater | Ordering::Equal))
            }
            Constraint::LessThan(bound) => ordering(bound) == Some(Ordering::Less),
            Constraint::LessOrEqual(bound) => {
                matches!(ordering(bound), Some(Ordering::Less | Ordering::Equal))
            }
            Constraint::InRange(lower, upper) => {
                matches!(ordering(lower), Some(Ordering::Greater | Ordering::Equal))
                    && (upper.as_str() == Some("UNBOUNDED")
                        || matches!(ordering(upper), Some(Ordering::Less | Ordering::Equal)))
            }
            Constraint::ValidValues(values) => values
                .iter()
                .any(|candidate| compare(value, candidate) == Some(Ordering::Equal)),
            Constraint::Length(length) => length_of(value) == Some(*length),
            Constraint::MinLength(length) => length_of(value).is_some_and(|l| l >= *length),
            Constraint::MaxLength(length) => length_of(value).is_some_and(|l| l <= *length),
            Constraint::Pattern(regex) => value.as_str().is_some_and(|s| regex.is_match(s)),
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::Equal(v) => write!(f, "equal {v}"),
            Constraint::GreaterThan(v) => write!(f, "greater_than {v}"),
            Constraint::GreaterOrEqual(v) => write!(f, "greater_or_equal {v}"),
            Constraint::LessThan(v) => write!(f, "less_than {v}"),
            Constraint::LessOrEqual(v) => write!(f, "less_or_equal {v}"),
            Constraint::InRange(lower, upper) => write!(f, "in_range [{lower}, {upper}]"),
            Constraint::ValidValues(values) => {
                let values: Vec<_> = values.iter().map(ToString::to_string).collect();
                write!(f, "valid_values [{}]", values.join(", "))
            }
            Constraint::Length(l) => write!(f, "length {l}"),
            Constraint::MinLength(l) => write!(f, "min_length {l}"),
            Constraint::MaxLength(l) => write!(f, "max_length {l}"),
            Constraint::Pattern(regex) => {
                let pattern = regex.as_str();
                let pattern = pattern
                    .strip_prefix("^(?:")
                    .and_then(|p| p.strip_suffix(")$"))
                    .unwrap_or(pattern);
                write!(f, "pattern {pattern:?}")
            }
        }
    }
}

/// Numbers compare numerically (integers are decimals), strings lexically, the rest by equality
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (l, r) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => (l == r).then_some(Ordering::Equal),
        },
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(array) => Some(array.len()),
        Value::Object(object) => Some(object.len()),
        _ => None,
    }
}

/// Constraints a candidate node template must satisfy
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub properties: Vec<(String, Vec<Constraint>)>,
    /// Capability name or type, with constraints on its properties
    pub capabilities: Vec<(String, Vec<(String, Vec<Constraint>)>)>,
}

impl NodeFilter {
    pub fn from_presentation(presentation: &Presentation<'_>) -> Self {
        Self {
            properties: property_clauses(presentation),
            capabilities: presentation
                .sequenced("capabilities")
                .into_iter()
                .filter_map(|(name, value)| {
                    let capability = value.as_presentation()?;
                    Some((name.to_string(), property_clauses(&capability)))
                })
                .collect(),
        }
    }

    /// Checks node properties and, through `capability`, capability properties.
    ///
    /// `capability` looks a capability up by name or type and returns its properties.
    pub fn accepts<'v>(
        &self,
        properties: &IndexMap<String, Value>,
        capability: impl Fn(&str) -> Option<&'v IndexMap<String, Value>>,
    ) -> bool {
        let satisfied = |values: &IndexMap<String, Value>, clauses: &[(String, Vec<Constraint>)]| {
            clauses.iter().all(|(name, constraints)| {
                values
                    .get(name)
                    .is_some_and(|value| constraints.iter().all(|c| c.check(value)))
            })
        };

        satisfied(properties, &self.properties)
            && self.capabilities.iter().all(|(name, clauses)| {
                capability(name).is_some_and(|values| satisfied(values, clauses))
            })
    }
}

fn property_clauses(presentation: &Presentation<'_>) -> Vec<(String, Vec<Constraint>)> {
    presentation
        .sequenced("properties")
        .into_iter()
        .filter_map(|(name, value)| {
            let constraints = Constraint::parse_many(value.as_value()?).ok()?;
            Some((name.to_string(), constraints))
        })
        .collect()
}
