use super::VisitMut;
use crate::functions::is_function_call;
use crate::value::Value;

/// Recursively visit all function calls mutably
///
/// Arguments of a call are not visited; the visitor decides how to evaluate them.
pub trait VisitFunctionsMut {
    fn visit_functions_mut(&mut self, visitor: &mut dyn VisitMut<Value>);
}

impl VisitFunctionsMut for Value {
    fn visit_functions_mut(&mut self, visitor: &mut dyn VisitMut<Value>) {
        if is_function_call(self) {
            visitor.visit_mut(self);
            return;
        }
        match self {
            Value::Array(items) => {
                for item in items {
                    item.visit_functions_mut(visitor);
                }
            }
            Value::Object(object) => {
                for value in object.values_mut() {
                    value.visit_functions_mut(visitor);
                }
            }
            _ => {}
        }
    }
}

impl<K> VisitFunctionsMut for indexmap::IndexMap<K, Value> {
    fn visit_functions_mut(&mut self, visitor: &mut dyn VisitMut<Value>) {
        for value in self.values_mut() {
            value.visit_functions_mut(visitor);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    #[test]
    fn visits_calls_but_not_their_arguments() {
        let call = |name: &str, argument: Value| Value::Object(IndexMap::from([(name.to_string(), argument)]));
        let mut value = Value::Array(vec![
            "plain".into(),
            call("get_input", "a".into()),
            call("concat", Value::Array(vec![call("get_input", "b".into())])),
        ]);
        let mut seen = vec![];

        value.visit_functions_mut(&mut |call: &mut Value| {
            seen.push(call.as_object().and_then(|o| o.keys().next().cloned()));
            *call = Value::Null;
        });

        assert_eq!(seen, [Some("get_input".to_string()), Some("concat".to_string())]);
        assert_eq!(value, Value::Array(vec!["plain".into(), Value::Null, Value::Null]));
    }
}
