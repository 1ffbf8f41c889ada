use serde_json::{Map, Value};

use crate::errors::PreflightError;

/// Merge caller-supplied values over chart defaults.
///
/// Maps merge recursively and anything else in `overrides` replaces the
/// default. An explicit `null` stays in the result: helm coalesces the values
/// file over the chart defaults again and drops keys set to `null`.
pub fn merge_values(
    defaults: &Value,
    overrides: Option<&Value>,
) -> Result<Value, PreflightError> {
    let base = match defaults {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(PreflightError::ValuesMerge(format!(
                "chart defaults must be a map, got {}",
                type_name(other)
            )));
        }
    };
    match overrides {
        None | Some(Value::Null) => Ok(Value::Object(base)),
        Some(Value::Object(over)) => Ok(Value::Object(merge_maps(base, over))),
        Some(other) => Err(PreflightError::ValuesMerge(format!(
            "values must be a map, got {}",
            type_name(other)
        ))),
    }
}

fn merge_maps(mut base: Map<String, Value>, over: &Map<String, Value>) -> Map<String, Value> {
    for (key, value) in over {
        match value {
            Value::Object(child) => {
                let merged = match base.remove(key) {
                    Some(Value::Object(existing)) => merge_maps(existing, child),
                    _ => merge_maps(Map::new(), child),
                };
                base.insert(key.clone(), Value::Object(merged));
            }
            other => {
                base.insert(key.clone(), other.clone());
            }
        }
    }
    base
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}
