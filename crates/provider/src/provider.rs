//! Grafana Terraform Provider Implementation
//!
//! Protocol-independent provider logic. The gRPC layer in `server` decodes
//! requests into [`DynamicValue`]s and calls into [`GrafanaProvider`].

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use grafana_client::GrafanaClient;

use crate::config::{self, Env, ProcessEnv};
use crate::data_sources::{data_source::DataSourceLookup, DataSourceReader};
use crate::error::{has_errors, Diagnostic, ProviderError, Result};
use crate::resources::{data_source::DataSourceResource, role::RoleResource, Resource};
use crate::schema::{self, Schema};
use crate::state::{decode_json_state, DynamicValue};

/// Outcome of planning a resource change
#[derive(Debug, Clone, Default)]
pub struct PlanResult {
    pub planned_state: DynamicValue,
    pub requires_replace: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// New state produced by apply, read or import
#[derive(Debug, Clone, Default)]
pub struct StateResult {
    pub state: DynamicValue,
    pub diagnostics: Vec<Diagnostic>,
}

impl StateResult {
    fn ok(state: DynamicValue) -> Self {
        Self { state, diagnostics: Vec::new() }
    }

    fn failed(state: DynamicValue, summary: &str, err: anyhow::Error) -> Self {
        error!("{}: {:#}", summary, err);
        Self {
            state,
            diagnostics: vec![Diagnostic::error(summary, format!("{:#}", err))],
        }
    }
}

/// Grafana Terraform Provider
pub struct GrafanaProvider {
    /// Client for communicating with Grafana, set by `configure`
    client: Arc<RwLock<Option<GrafanaClient>>>,
    env: Box<dyn Env + Send + Sync>,
}

impl Default for GrafanaProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GrafanaProvider {
    pub fn new() -> Self {
        Self {
            client: Arc::new(RwLock::new(None)),
            env: Box::new(ProcessEnv),
        }
    }

    /// Provider with environment lookups served from `env`
    pub fn with_env(env: impl Env + Send + Sync + 'static) -> Self {
        Self {
            client: Arc::new(RwLock::new(None)),
            env: Box::new(env),
        }
    }

    async fn get_client(&self) -> Result<GrafanaClient> {
        self.client
            .read()
            .await
            .clone()
            .ok_or(ProviderError::NotConfigured)
    }

    pub fn provider_schema() -> Schema {
        schema::provider_schema()
    }

    pub fn resource_schemas() -> Vec<(&'static str, Schema)> {
        vec![
            (RoleResource::type_name(), RoleResource::schema()),
            (DataSourceResource::type_name(), DataSourceResource::schema()),
        ]
    }

    pub fn data_source_schemas() -> Vec<(&'static str, Schema)> {
        vec![(DataSourceLookup::type_name(), DataSourceLookup::schema())]
    }

    pub fn resource_schema(type_name: &str) -> Result<Schema> {
        match type_name {
            "grafana_role" => Ok(RoleResource::schema()),
            "grafana_data_source" => Ok(DataSourceResource::schema()),
            _ => Err(ProviderError::UnknownResourceType(type_name.to_string())),
        }
    }

    pub fn data_source_schema(type_name: &str) -> Result<Schema> {
        match type_name {
            "grafana_data_source" => Ok(DataSourceLookup::schema()),
            _ => Err(ProviderError::UnknownDataSourceType(type_name.to_string())),
        }
    }

    pub fn validate_provider_config(&self, config: &DynamicValue) -> Vec<Diagnostic> {
        match config.get("url").and_then(|v| v.as_string()) {
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                vec![Diagnostic::error(
                    "Invalid Grafana URL",
                    format!("expected an http:// or https:// URL, got {:?}", url),
                )
                .at("url")]
            }
            _ => Vec::new(),
        }
    }

    /// Build the Grafana client from the provider block
    pub async fn configure(&self, config: &DynamicValue) -> Vec<Diagnostic> {
        let client_config = match config::client_config(config, self.env.as_ref()) {
            Ok(c) => c,
            Err(diag) => return vec![diag],
        };

        info!("Configuring Grafana client for {}", client_config.url);
        match GrafanaClient::new(&client_config) {
            Ok(client) => {
                *self.client.write().await = Some(client);
                Vec::new()
            }
            Err(e) => {
                error!("Failed to create Grafana client: {}", e);
                vec![Diagnostic::error("Failed to create Grafana client", e.to_string())]
            }
        }
    }

    pub fn validate_resource_config(&self, type_name: &str, config: &DynamicValue) -> Result<Vec<Diagnostic>> {
        debug!("ValidateResourceConfig for {}", type_name);
        match type_name {
            "grafana_role" => Ok(RoleResource::validate(config)),
            "grafana_data_source" => Ok(DataSourceResource::validate(config)),
            _ => Err(ProviderError::UnknownResourceType(type_name.to_string())),
        }
    }

    pub fn validate_data_source_config(&self, type_name: &str, config: &DynamicValue) -> Result<Vec<Diagnostic>> {
        match type_name {
            "grafana_data_source" => Ok(DataSourceLookup::validate(config)),
            _ => Err(ProviderError::UnknownDataSourceType(type_name.to_string())),
        }
    }

    /// Bring stored state of any schema version onto the current schema.
    ///
    /// Attributes the current schema no longer declares are dropped and new
    /// ones start out null.
    pub fn upgrade_resource_state(&self, type_name: &str, version: i64, raw_json: &[u8]) -> Result<DynamicValue> {
        let schema = Self::resource_schema(type_name)?;
        debug!(
            "Upgrading {} state from version {} to {}",
            type_name, version, schema.version
        );
        let raw = decode_json_state(raw_json)?;
        Ok(schema.block.conform(&raw))
    }

    pub fn plan_resource_change(
        &self,
        type_name: &str,
        prior: &DynamicValue,
        proposed: &DynamicValue,
        config: &DynamicValue,
    ) -> Result<PlanResult> {
        debug!("PlanResourceChange for {}", type_name);
        match type_name {
            "grafana_role" => Ok(plan::<RoleResource>(prior, proposed, config)),
            "grafana_data_source" => Ok(plan::<DataSourceResource>(prior, proposed, config)),
            _ => Err(ProviderError::UnknownResourceType(type_name.to_string())),
        }
    }

    pub async fn apply_resource_change(
        &self,
        type_name: &str,
        prior: &DynamicValue,
        planned: &DynamicValue,
    ) -> Result<StateResult> {
        info!("ApplyResourceChange for {}", type_name);
        let client = self.get_client().await?;
        match type_name {
            "grafana_role" => Ok(apply::<RoleResource>(&client, prior, planned).await),
            "grafana_data_source" => Ok(apply::<DataSourceResource>(&client, prior, planned).await),
            _ => Err(ProviderError::UnknownResourceType(type_name.to_string())),
        }
    }

    pub async fn read_resource(&self, type_name: &str, current: &DynamicValue) -> Result<StateResult> {
        info!("ReadResource for {}", type_name);
        let client = self.get_client().await?;
        match type_name {
            "grafana_role" => Ok(read::<RoleResource>(&client, current).await),
            "grafana_data_source" => Ok(read::<DataSourceResource>(&client, current).await),
            _ => Err(ProviderError::UnknownResourceType(type_name.to_string())),
        }
    }

    pub async fn import_resource_state(&self, type_name: &str, id: &str) -> Result<StateResult> {
        info!("ImportResourceState for {} with ID {}", type_name, id);
        let client = self.get_client().await?;
        match type_name {
            "grafana_role" => Ok(import::<RoleResource>(&client, id).await),
            "grafana_data_source" => Ok(import::<DataSourceResource>(&client, id).await),
            _ => Err(ProviderError::UnknownResourceType(type_name.to_string())),
        }
    }

    pub async fn read_data_source(&self, type_name: &str, config: &DynamicValue) -> Result<StateResult> {
        info!("ReadDataSource for {}", type_name);
        let client = self.get_client().await?;
        match type_name {
            "grafana_data_source" => Ok(read_data::<DataSourceLookup>(&client, config).await),
            _ => Err(ProviderError::UnknownDataSourceType(type_name.to_string())),
        }
    }
}

fn plan<R: Resource>(prior: &DynamicValue, proposed: &DynamicValue, config: &DynamicValue) -> PlanResult {
    let diagnostics = if config.is_null() { Vec::new() } else { R::validate(config) };
    if has_errors(&diagnostics) {
        return PlanResult { planned_state: proposed.clone(), requires_replace: Vec::new(), diagnostics };
    }

    let schema = R::schema();
    match R::plan(prior, proposed, config) {
        Ok(planned) => {
            let planned = schema.block.conform(&planned);
            PlanResult {
                requires_replace: schema.requires_replace(prior, &planned),
                planned_state: planned,
                diagnostics,
            }
        }
        Err(e) => PlanResult {
            planned_state: proposed.clone(),
            requires_replace: Vec::new(),
            diagnostics: vec![Diagnostic::error("Failed to plan resource change", format!("{:#}", e))],
        },
    }
}

/// Create, update or delete depending on which side of the change is null
async fn apply<R: Resource>(client: &GrafanaClient, prior: &DynamicValue, planned: &DynamicValue) -> StateResult {
    let conform = |state: DynamicValue| R::schema().block.conform(&state);

    match (prior.is_null(), planned.is_null()) {
        (true, false) => match R::create(client, planned).await {
            Ok(state) => StateResult::ok(conform(state)),
            Err(e) => StateResult::failed(DynamicValue::Null, "Failed to create resource", e),
        },
        (false, true) => match R::delete(client, prior).await {
            Ok(()) => StateResult::ok(DynamicValue::Null),
            Err(e) => StateResult::failed(prior.clone(), "Failed to delete resource", e),
        },
        (false, false) => match R::update(client, prior, planned).await {
            Ok(state) => StateResult::ok(conform(state)),
            Err(e) => StateResult::failed(prior.clone(), "Failed to update resource", e),
        },
        (true, true) => StateResult::ok(DynamicValue::Null),
    }
}

async fn read<R: Resource>(client: &GrafanaClient, current: &DynamicValue) -> StateResult {
    if current.is_null() {
        return StateResult::ok(DynamicValue::Null);
    }
    match R::read(client, current).await {
        Ok(Some(state)) => StateResult::ok(R::schema().block.conform(&state)),
        // Resource not found - return null state
        Ok(None) => StateResult::ok(DynamicValue::Null),
        Err(e) => StateResult::failed(current.clone(), "Failed to read resource", e),
    }
}

async fn import<R: Resource + Send>(client: &GrafanaClient, id: &str) -> StateResult {
    match R::import(client, id).await {
        Ok(Some(state)) => StateResult::ok(R::schema().block.conform(&state)),
        Ok(None) => StateResult {
            state: DynamicValue::Null,
            diagnostics: vec![Diagnostic::error(
                "Cannot import non-existent remote object",
                format!("{} {:?} does not exist in Grafana", R::type_name(), id),
            )],
        },
        Err(e) => StateResult::failed(DynamicValue::Null, "Failed to import resource", e),
    }
}

async fn read_data<D: DataSourceReader>(client: &GrafanaClient, config: &DynamicValue) -> StateResult {
    let diagnostics = D::validate(config);
    if has_errors(&diagnostics) {
        return StateResult { state: DynamicValue::Null, diagnostics };
    }
    match D::read(client, config).await {
        Ok(state) => StateResult::ok(state),
        Err(e) => StateResult::failed(DynamicValue::Null, "Failed to read data source", e),
    }
}
