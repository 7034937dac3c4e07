//! Resource Implementations
//!
//! Implements the CRUD operations for each resource type.

pub mod data_source;
pub mod role;

use anyhow::Result;
use grafana_client::GrafanaClient;

use crate::error::Diagnostic;
use crate::schema::Schema;
use crate::state::{make_state, string_value, DynamicValue};

/// Trait for resource operations
#[async_trait::async_trait]
pub trait Resource {
    /// Resource type name
    fn type_name() -> &'static str;

    /// Resource schema
    fn schema() -> Schema;

    /// Check a configuration before planning
    fn validate(_config: &DynamicValue) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Compute the planned state from the proposed new state.
    ///
    /// Fills defaults and, on create, marks computed attributes without a
    /// configured value as unknown.
    fn plan(prior: &DynamicValue, proposed: &DynamicValue, _config: &DynamicValue) -> Result<DynamicValue> {
        plan_defaults(&Self::schema(), prior, proposed)
    }

    /// Create a new resource
    async fn create(client: &GrafanaClient, planned: &DynamicValue) -> Result<DynamicValue>;

    /// Read an existing resource; `None` means it no longer exists remotely
    async fn read(client: &GrafanaClient, state: &DynamicValue) -> Result<Option<DynamicValue>>;

    /// Update an existing resource
    async fn update(client: &GrafanaClient, prior: &DynamicValue, planned: &DynamicValue) -> Result<DynamicValue>;

    /// Delete a resource
    async fn delete(client: &GrafanaClient, state: &DynamicValue) -> Result<()>;

    /// Import an existing resource by its identifier
    async fn import(client: &GrafanaClient, id: &str) -> Result<Option<DynamicValue>> {
        let initial_state = make_state(vec![("id", string_value(id))]);
        Self::read(client, &initial_state).await
    }
}

/// Shared planning step for all resources
pub fn plan_defaults(schema: &Schema, prior: &DynamicValue, proposed: &DynamicValue) -> Result<DynamicValue> {
    if proposed.is_null() {
        return Ok(DynamicValue::Null);
    }

    let mut planned = schema.block.apply_defaults(proposed);
    for attr in &schema.block.attributes {
        if !planned.get(attr.name).map_or(true, DynamicValue::is_null) {
            continue;
        }
        if prior.is_null() {
            if attr.computed {
                planned.set(attr.name, DynamicValue::Unknown);
            }
        } else if let Some(old) = prior.get(attr.name).filter(|v| attr.computed || is_zero(v)) {
            // Grafana reports unset attributes as zero values
            planned.set(attr.name, old.clone());
        }
    }
    Ok(planned)
}

fn is_zero(value: &DynamicValue) -> bool {
    match value {
        DynamicValue::String(s) => s.is_empty(),
        DynamicValue::Bool(b) => !b,
        DynamicValue::Number(n) => n.as_f64() == Some(0.0),
        DynamicValue::List(items) => items.is_empty(),
        DynamicValue::Map(m) => m.is_empty(),
        DynamicValue::Null | DynamicValue::Unknown => false,
    }
}

/// Attribute names that differ between two object values, excluding `ignored`
pub fn changed_attributes(prior: &DynamicValue, planned: &DynamicValue, ignored: &[&str]) -> Vec<String> {
    let empty = Default::default();
    let before = prior.as_map().unwrap_or(&empty);
    let after = planned.as_map().unwrap_or(&empty);

    let mut keys: Vec<&String> = before.keys().chain(after.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter(|k| !ignored.contains(&k.as_str()))
        .filter(|k| before.get(*k).unwrap_or(&DynamicValue::Null) != after.get(*k).unwrap_or(&DynamicValue::Null))
        .cloned()
        .collect()
}
