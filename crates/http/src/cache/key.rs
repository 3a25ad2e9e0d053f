//! Deterministic cache keys for requests

use reqwest::Method;
use serde_json::{Map, Value};
use url::form_urlencoded;

/// Derive the cache key of a request from its method, path and query parameters.
///
/// Parameters are sorted by name and nested objects are serialized with sorted
/// keys, so logically identical requests always produce the same key.
pub fn derive_key(method: &Method, path: &str, params: &Map<String, Value>) -> String {
    let pairs = canonical_query(params);
    if pairs.is_empty() {
        return format!("{method} {path}");
    }

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish();
    format!("{method} {path}?{query}")
}

/// Flatten parameters into name/value pairs sorted by name.
///
/// Arrays produce one pair per element, in element order.
pub fn canonical_query(params: &Map<String, Value>) -> Vec<(String, String)> {
    let mut names: Vec<&String> = params.keys().collect();
    names.sort();

    let mut pairs = Vec::with_capacity(names.len());
    for name in names {
        match &params[name.as_str()] {
            Value::Array(items) => {
                pairs.extend(items.iter().map(|item| (name.clone(), scalar(item))));
            }
            value => pairs.push((name.clone(), scalar(value))),
        }
    }
    pairs
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => canonical_json(value),
    }
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut names: Vec<&String> = map.keys().collect();
            names.sort();
            let fields: Vec<String> = names
                .into_iter()
                .map(|name| {
                    format!(
                        "{}:{}",
                        Value::String(name.clone()),
                        canonical_json(&map[name.as_str()])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        scalar => scalar.to_string(),
    }
}
