//! `grafana_data_source` data source

use anyhow::{anyhow, Result};
use grafana_client::GrafanaClient;
use tracing::debug;

use crate::error::Diagnostic;
use crate::resources::data_source::data_source_to_state;
use crate::schema::{self, Schema};
use crate::state::{get_optional_string_attr, DynamicValue};
use super::DataSourceReader;

pub struct DataSourceLookup;

const SELECTORS: &[&str] = &["id", "uid", "name"];

#[async_trait::async_trait]
impl DataSourceReader for DataSourceLookup {
    fn type_name() -> &'static str {
        "grafana_data_source"
    }

    fn schema() -> Schema {
        schema::data_source_data_schema()
    }

    fn validate(config: &DynamicValue) -> Vec<Diagnostic> {
        // selectors wired to other resources may still be unknown
        if SELECTORS.iter().any(|k| config.get(k).is_some_and(DynamicValue::is_unknown)) {
            return Vec::new();
        }

        let set: Vec<&str> = SELECTORS
            .iter()
            .copied()
            .filter(|k| get_optional_string_attr(config, k).is_some())
            .collect();

        if set.len() == 1 {
            return Vec::new();
        }
        vec![Diagnostic::error(
            "Invalid data source lookup",
            format!("exactly one of `id`, `uid` or `name` must be set, got {}", set.len()),
        )]
    }

    async fn read(client: &GrafanaClient, config: &DynamicValue) -> Result<DynamicValue> {
        let data_source = if let Some(id) = get_optional_string_attr(config, "id") {
            let id = id.parse::<i64>().map_err(|_| anyhow!("Invalid id: {:?}", id))?;
            client.data_source(id).await?
        } else if let Some(uid) = get_optional_string_attr(config, "uid") {
            client.data_source_by_uid(&uid).await?
        } else if let Some(name) = get_optional_string_attr(config, "name") {
            client.data_source_by_name(&name).await?
        } else {
            return Err(anyhow!("one of `id`, `uid` or `name` must be set"));
        };
        debug!("Resolved datasource {} ({})", data_source.name, data_source.id);

        let state = data_source_to_state(&data_source, &DynamicValue::Null)?;
        Ok(Self::schema().block.conform(&state))
    }
}
