//! Data Source Resource handler for Terraform

use anyhow::{anyhow, bail, Context, Result};
use grafana_client::{extract_headers_from_json_data, json_data_with_headers, DataSource, GrafanaClient};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::Diagnostic;
use crate::schema::{self, Schema};
use crate::state::{
    bool_value, get_bool_attr, get_optional_string_attr, get_string_attr, get_string_map_attr,
    make_state, string_map_value, string_value, DynamicValue,
};
use super::{plan_defaults, Resource};

pub struct DataSourceResource;

/// Attributes holding serialized JSON documents
const JSON_ATTRIBUTES: &[&str] = &["json_data_encoded", "secure_json_data_encoded"];

#[async_trait::async_trait]
impl Resource for DataSourceResource {
    fn type_name() -> &'static str {
        "grafana_data_source"
    }

    fn schema() -> Schema {
        schema::data_source_schema()
    }

    fn validate(config: &DynamicValue) -> Vec<Diagnostic> {
        JSON_ATTRIBUTES
            .iter()
            .filter_map(|key| {
                let raw = config.get(key)?.as_string()?;
                if raw.is_empty() {
                    return None;
                }
                serde_json::from_str::<Value>(raw).err().map(|e| {
                    Diagnostic::error(
                        "Invalid JSON",
                        format!("\"{}\" contains an invalid JSON: {}", key, e),
                    )
                    .at(*key)
                })
            })
            .collect()
    }

    fn plan(prior: &DynamicValue, proposed: &DynamicValue, _config: &DynamicValue) -> Result<DynamicValue> {
        let mut planned = plan_defaults(&Self::schema(), prior, proposed)?;
        if planned.is_null() {
            return Ok(planned);
        }

        for key in JSON_ATTRIBUTES {
            let new = match planned.get(key) {
                Some(DynamicValue::String(s)) => s.clone(),
                Some(DynamicValue::Unknown) => continue,
                _ => String::new(),
            };
            let old = get_string_attr(prior, key);
            if !prior.is_null() && suppress_json_diff(&old, &new) {
                planned.set(key, string_value(old));
            } else if let Ok(normalized) = normalize_json(&new) {
                planned.set(key, string_value(normalized));
            }
        }

        Ok(planned)
    }

    async fn create(client: &GrafanaClient, planned: &DynamicValue) -> Result<DynamicValue> {
        let data_source = make_data_source(planned)?;

        let id = client.new_data_source(&data_source).await?;
        info!("Created datasource {} with id {}", data_source.name, id);

        let mut state = planned.clone();
        state.set("id", string_value(id.to_string()));
        match Self::read(client, &state).await? {
            Some(state) => Ok(state),
            None => bail!("datasource {} was not found after creation", id),
        }
    }

    async fn read(client: &GrafanaClient, state: &DynamicValue) -> Result<Option<DynamicValue>> {
        let id = parse_id(state)?;

        match client.data_source(id).await {
            Ok(data_source) => Ok(Some(data_source_to_state(&data_source, state)?)),
            Err(e) if e.is_not_found() => {
                warn!(
                    "removing datasource {} from state because it no longer exists in grafana",
                    get_string_attr(state, "name")
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(client: &GrafanaClient, prior: &DynamicValue, planned: &DynamicValue) -> Result<DynamicValue> {
        let mut state = planned.clone();
        state.set("id", string_value(parse_id(prior)?.to_string()));

        let data_source = make_data_source(&state)?;
        client.update_data_source(&data_source).await?;
        info!("Updated datasource {}", data_source.id);

        Ok(state)
    }

    async fn delete(client: &GrafanaClient, state: &DynamicValue) -> Result<()> {
        client.delete_data_source(parse_id(state)?).await?;
        Ok(())
    }

    /// Import either by numeric id or by uid
    async fn import(client: &GrafanaClient, id: &str) -> Result<Option<DynamicValue>> {
        let id = match id.parse::<i64>() {
            Ok(id) => id,
            Err(_) => client
                .data_source_by_uid(id)
                .await
                .map_err(|e| anyhow!("failed to find datasource by ID or UID '{}': {}", id, e))?
                .id,
        };

        let initial_state = make_state(vec![("id", string_value(id.to_string()))]);
        Self::read(client, &initial_state).await
    }
}

fn parse_id(state: &DynamicValue) -> Result<i64> {
    let raw = get_string_attr(state, "id");
    raw.parse::<i64>().map_err(|_| anyhow!("Invalid id: {:?}", raw))
}

/// Rebuild objects with their keys in sorted order, at every depth
fn sorted_keys(value: Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut entries: Vec<(String, Value)> = obj.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sorted_keys(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted_keys).collect()),
        other => other,
    }
}

/// Re-encode a JSON document with sorted keys and no whitespace
pub fn normalize_json(raw: &str) -> Result<String> {
    let value: Value = serde_json::from_str(raw)?;
    Ok(serde_json::to_string(&sorted_keys(value))?)
}

/// True when two encoded JSON attributes carry no meaningful difference
pub fn suppress_json_diff(old: &str, new: &str) -> bool {
    if old == "{}" && new.is_empty() {
        return true;
    }
    match (
        serde_json::from_str::<Value>(old),
        serde_json::from_str::<Value>(new),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn parse_json_object(state: &DynamicValue, key: &str) -> Result<Map<String, Value>> {
    let raw = get_string_attr(state, key);
    if raw.is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("failed to unmarshal {}", key))
}

/// Build the API payload from planned or current state
pub fn make_data_source(state: &DynamicValue) -> Result<DataSource> {
    let id = match get_optional_string_attr(state, "id") {
        Some(raw) => raw.parse::<i64>().map_err(|_| anyhow!("Invalid id: {:?}", raw))?,
        None => 0,
    };

    let json_data = parse_json_object(state, "json_data_encoded")?;
    let secure_json_data = parse_json_object(state, "secure_json_data_encoded")?;
    let headers = get_string_map_attr(state, "http_headers");
    let (json_data, secure_json_data) = json_data_with_headers(&json_data, &secure_json_data, &headers);

    Ok(DataSource {
        id,
        uid: get_optional_string_attr(state, "uid").unwrap_or_default(),
        name: get_string_attr(state, "name"),
        type_name: get_string_attr(state, "type"),
        url: get_string_attr(state, "url"),
        access: get_string_attr(state, "access_mode"),
        database: get_string_attr(state, "database_name"),
        user: get_string_attr(state, "username"),
        is_default: get_bool_attr(state, "is_default", false),
        basic_auth: get_bool_attr(state, "basic_auth_enabled", false),
        basic_auth_user: get_string_attr(state, "basic_auth_username"),
        json_data,
        secure_json_data,
        secure_json_fields: Default::default(),
    })
}

/// Map an API data source back onto state.
///
/// Secret values are never returned by Grafana, so `secure_json_data_encoded`
/// and header values are carried over from `prior`; headers that disappeared
/// remotely are dropped.
pub fn data_source_to_state(ds: &DataSource, prior: &DynamicValue) -> Result<DynamicValue> {
    let (json_data, _, remote_headers) = extract_headers_from_json_data(&ds.json_data, &Map::new());
    let encoded_json_data = serde_json::to_string(&sorted_keys(Value::Object(json_data)))
        .context("Failed to marshal JSON data")?;

    let http_headers = match prior.get("http_headers") {
        Some(v) if v.is_known() => {
            let mut headers = get_string_map_attr(prior, "http_headers");
            headers.retain(|name, _| remote_headers.contains_key(name));
            string_map_value(&headers)
        }
        _ => DynamicValue::Null,
    };

    Ok(make_state(vec![
        ("id", string_value(ds.id.to_string())),
        ("access_mode", string_value(&ds.access)),
        ("database_name", string_value(&ds.database)),
        ("is_default", bool_value(ds.is_default)),
        ("name", string_value(&ds.name)),
        ("type", string_value(&ds.type_name)),
        ("url", string_value(&ds.url)),
        ("username", string_value(&ds.user)),
        ("uid", string_value(&ds.uid)),
        ("json_data_encoded", string_value(encoded_json_data)),
        ("http_headers", http_headers),
        ("basic_auth_enabled", bool_value(ds.basic_auth)),
        ("basic_auth_username", string_value(&ds.basic_auth_user)),
        (
            "secure_json_data_encoded",
            prior.get("secure_json_data_encoded").cloned().unwrap_or_default(),
        ),
    ]))
}
