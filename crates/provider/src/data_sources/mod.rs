//! Data Source Implementations
//!
//! Read-only lookups exposed as Terraform `data` blocks.

pub mod data_source;

use anyhow::Result;
use grafana_client::GrafanaClient;

use crate::error::Diagnostic;
use crate::schema::Schema;
use crate::state::DynamicValue;

/// Trait for data source reads
#[async_trait::async_trait]
pub trait DataSourceReader {
    /// Data source type name
    fn type_name() -> &'static str;

    /// Data source schema
    fn schema() -> Schema;

    /// Check a configuration before reading
    fn validate(_config: &DynamicValue) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Resolve the configuration into a full state
    async fn read(client: &GrafanaClient, config: &DynamicValue) -> Result<DynamicValue>;
}
