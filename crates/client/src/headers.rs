//! Custom HTTP headers stored inside data source JSON data
//!
//! Grafana keeps data source headers as numbered pairs: the header name in
//! `jsonData.httpHeaderName{N}` and its value in
//! `secureJsonData.httpHeaderValue{N}`, with N starting at 1.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

const NAME_PREFIX: &str = "httpHeaderName";
const VALUE_PREFIX: &str = "httpHeaderValue";

/// Merge `headers` into copies of the JSON data maps.
///
/// Headers are numbered in name order so the same header set always produces
/// the same keys.
pub fn json_data_with_headers(
    json_data: &Map<String, Value>,
    secure_json_data: &Map<String, Value>,
    headers: &BTreeMap<String, String>,
) -> (Map<String, Value>, Map<String, Value>) {
    let mut json_data = json_data.clone();
    let mut secure_json_data = secure_json_data.clone();

    for (idx, (name, value)) in headers.iter().enumerate() {
        let n = idx + 1;
        json_data.insert(format!("{NAME_PREFIX}{n}"), Value::String(name.clone()));
        secure_json_data.insert(format!("{VALUE_PREFIX}{n}"), Value::String(value.clone()));
    }

    (json_data, secure_json_data)
}

/// Split header entries back out of the JSON data maps.
///
/// Returns the maps without any header keys plus the header map. A header's
/// value is empty when the secure data does not carry it, which is always the
/// case for data read back from the API.
pub fn extract_headers_from_json_data(
    json_data: &Map<String, Value>,
    secure_json_data: &Map<String, Value>,
) -> (Map<String, Value>, Map<String, Value>, BTreeMap<String, String>) {
    let mut json_data = json_data.clone();
    let mut secure_json_data = secure_json_data.clone();
    let mut headers = BTreeMap::new();

    let name_keys: Vec<String> = json_data
        .keys()
        .filter(|k| k.starts_with(NAME_PREFIX))
        .cloned()
        .collect();

    for key in name_keys {
        let Some(name) = json_data.remove(&key) else {
            continue;
        };
        let value_key = key.replacen(NAME_PREFIX, VALUE_PREFIX, 1);
        let value = match secure_json_data.remove(&value_key) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let name = match name {
            Value::String(s) => s,
            other => other.to_string(),
        };
        headers.insert(name, value);
    }

    (json_data, secure_json_data, headers)
}
