use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ApiError, Result};

/// Params is the ordered parameter set passed to API requests.
/// Keys keep their insertion order.
pub type Params = Map<String, Value>;

/// Maximum nesting accepted by [`standardize`]
pub const MAX_DEPTH: usize = 64;

/// Serialize caller parameters into a [`Params`] map.
///
/// `null` (or `()`) yields an empty set; anything else that is not a JSON
/// object is rejected.
pub fn to_params<P: Serialize>(param: P) -> Result<Params> {
    match serde_json::to_value(param)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Params::new()),
        other => Err(ApiError::InvalidParams(format!(
            "expected a key/value object, got {}",
            kind(&other)
        ))),
    }
}

/// Convert every terminal value of `params` to its textual form.
///
/// Keys, key order and nesting are preserved; only leaves change. Running it
/// on already standardized parameters is a no-op.
pub fn standardize(params: &Params) -> Result<Params> {
    standardize_map(params, 1)
}

fn standardize_map(map: &Params, depth: usize) -> Result<Params> {
    if depth > MAX_DEPTH {
        return Err(ApiError::ParamsTooDeep { limit: MAX_DEPTH });
    }
    map.iter()
        .map(|(key, value)| Ok::<_, ApiError>((key.clone(), standardize_value(value, depth)?)))
        .collect()
}

fn standardize_value(value: &Value, depth: usize) -> Result<Value> {
    match value {
        Value::Object(map) => Ok(Value::Object(standardize_map(map, depth + 1)?)),
        Value::Array(items) => {
            if depth + 1 > MAX_DEPTH {
                return Err(ApiError::ParamsTooDeep { limit: MAX_DEPTH });
            }
            items
                .iter()
                .map(|item| standardize_value(item, depth + 1))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        terminal => Ok(Value::String(scalar_text(terminal).unwrap_or_default())),
    }
}

/// Textual form of a terminal value, `None` for objects and arrays
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Flatten parameters into `key=value` pairs using bracket notation for
/// nested entries (`filter[status]`, `ids[0]`). Empty nested sets produce no
/// pair.
pub fn flatten(params: &Params) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in params {
        flatten_into(key.clone(), value, &mut pairs);
    }
    pairs
}

fn flatten_into(prefix: String, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                flatten_into(format!("{}[{}]", prefix, key), inner, pairs);
            }
        }
        Value::Array(items) => {
            for (index, inner) in items.iter().enumerate() {
                flatten_into(format!("{}[{}]", prefix, index), inner, pairs);
            }
        }
        terminal => pairs.push((prefix, scalar_text(terminal).unwrap_or_default())),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
