//! gRPC server for the Terraform plugin protocol
//!
//! Translates tfplugin6 messages to and from [`GrafanaProvider`] calls and
//! performs the go-plugin handshake Terraform expects on startup.

use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::error::Diagnostic;
use crate::provider::GrafanaProvider;
use crate::state::{decode_dynamic_value, decode_json_state, encode_dynamic_value, DynamicValue};
use crate::tfplugin6::{
    self as proto,
    provider_server::{Provider, ProviderServer},
    *,
};

pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4c6991ca9872b2";

const CORE_PROTOCOL_VERSION: u32 = 1;
const PLUGIN_PROTOCOL_VERSION: u32 = 6;

/// tfplugin6 service backed by a [`GrafanaProvider`]
#[derive(Clone)]
pub struct ProviderService {
    provider: Arc<GrafanaProvider>,
}

impl ProviderService {
    pub fn new(provider: GrafanaProvider) -> Self {
        Self { provider: Arc::new(provider) }
    }
}

fn decode(value: Option<proto::DynamicValue>) -> Result<DynamicValue, Status> {
    let Some(value) = value else {
        return Ok(DynamicValue::Null);
    };
    let decoded = if !value.msgpack.is_empty() {
        decode_dynamic_value(&value.msgpack)
    } else {
        decode_json_state(&value.json)
    };
    decoded.map_err(|e| Status::invalid_argument(format!("{:#}", e)))
}

fn encode(value: &DynamicValue) -> Result<Option<proto::DynamicValue>, Status> {
    let msgpack = encode_dynamic_value(value).map_err(|e| Status::internal(format!("{:#}", e)))?;
    Ok(Some(proto::DynamicValue { msgpack, json: Vec::new() }))
}

fn attribute_path(name: &str) -> AttributePath {
    AttributePath {
        steps: vec![attribute_path::Step {
            selector: Some(attribute_path::step::Selector::AttributeName(name.to_string())),
        }],
    }
}

fn diagnostics(diags: Vec<Diagnostic>) -> Vec<proto::Diagnostic> {
    diags
        .into_iter()
        .map(|d| proto::Diagnostic {
            severity: diagnostic::Severity::Error as i32,
            summary: d.summary,
            detail: d.detail,
            attribute: d.attribute.as_deref().map(attribute_path),
        })
        .collect()
}

fn capabilities() -> ServerCapabilities {
    ServerCapabilities {
        plan_destroy: true,
        get_provider_schema_optional: false,
        move_resource_state: false,
    }
}

#[tonic::async_trait]
impl Provider for ProviderService {
    async fn get_metadata(
        &self,
        _request: Request<get_metadata::Request>,
    ) -> Result<Response<get_metadata::Response>, Status> {
        Ok(Response::new(get_metadata::Response {
            server_capabilities: Some(capabilities()),
            diagnostics: vec![],
            data_sources: GrafanaProvider::data_source_schemas()
                .into_iter()
                .map(|(name, _)| get_metadata::DataSourceMetadata { type_name: name.to_string() })
                .collect(),
            resources: GrafanaProvider::resource_schemas()
                .into_iter()
                .map(|(name, _)| get_metadata::ResourceMetadata { type_name: name.to_string() })
                .collect(),
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<get_provider_schema::Request>,
    ) -> Result<Response<get_provider_schema::Response>, Status> {
        let resource_schemas: HashMap<String, Schema> = GrafanaProvider::resource_schemas()
            .into_iter()
            .map(|(name, schema)| (name.to_string(), schema.to_proto()))
            .collect();
        let data_source_schemas: HashMap<String, Schema> = GrafanaProvider::data_source_schemas()
            .into_iter()
            .map(|(name, schema)| (name.to_string(), schema.to_proto()))
            .collect();

        Ok(Response::new(get_provider_schema::Response {
            provider: Some(GrafanaProvider::provider_schema().to_proto()),
            resource_schemas,
            data_source_schemas,
            diagnostics: vec![],
            provider_meta: None,
            server_capabilities: Some(capabilities()),
        }))
    }

    async fn validate_provider_config(
        &self,
        request: Request<validate_provider_config::Request>,
    ) -> Result<Response<validate_provider_config::Response>, Status> {
        let config = decode(request.into_inner().config)?;
        Ok(Response::new(validate_provider_config::Response {
            diagnostics: diagnostics(self.provider.validate_provider_config(&config)),
        }))
    }

    async fn validate_resource_config(
        &self,
        request: Request<validate_resource_config::Request>,
    ) -> Result<Response<validate_resource_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode(req.config)?;
        let diags = self.provider.validate_resource_config(&req.type_name, &config)?;
        Ok(Response::new(validate_resource_config::Response {
            diagnostics: diagnostics(diags),
        }))
    }

    async fn validate_data_resource_config(
        &self,
        request: Request<validate_data_resource_config::Request>,
    ) -> Result<Response<validate_data_resource_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode(req.config)?;
        let diags = self.provider.validate_data_source_config(&req.type_name, &config)?;
        Ok(Response::new(validate_data_resource_config::Response {
            diagnostics: diagnostics(diags),
        }))
    }

    async fn upgrade_resource_state(
        &self,
        request: Request<upgrade_resource_state::Request>,
    ) -> Result<Response<upgrade_resource_state::Response>, Status> {
        let req = request.into_inner();
        let raw = req.raw_state.unwrap_or_default();

        if raw.json.is_empty() && !raw.flatmap.is_empty() {
            return Ok(Response::new(upgrade_resource_state::Response {
                upgraded_state: None,
                diagnostics: diagnostics(vec![Diagnostic::error(
                    "Unsupported state format",
                    format!("{} state is stored in the legacy flatmap format", req.type_name),
                )]),
            }));
        }

        let upgraded = self
            .provider
            .upgrade_resource_state(&req.type_name, req.version, &raw.json)?;
        Ok(Response::new(upgrade_resource_state::Response {
            upgraded_state: encode(&upgraded)?,
            diagnostics: vec![],
        }))
    }

    async fn configure_provider(
        &self,
        request: Request<configure_provider::Request>,
    ) -> Result<Response<configure_provider::Response>, Status> {
        let req = request.into_inner();
        info!("Configuring provider (terraform {})", req.terraform_version);
        let config = decode(req.config)?;
        let diags = self.provider.configure(&config).await;
        Ok(Response::new(configure_provider::Response {
            diagnostics: diagnostics(diags),
        }))
    }

    async fn read_resource(
        &self,
        request: Request<read_resource::Request>,
    ) -> Result<Response<read_resource::Response>, Status> {
        let req = request.into_inner();
        let current = decode(req.current_state)?;
        let result = self.provider.read_resource(&req.type_name, &current).await?;
        Ok(Response::new(read_resource::Response {
            new_state: encode(&result.state)?,
            diagnostics: diagnostics(result.diagnostics),
            private: req.private,
        }))
    }

    async fn plan_resource_change(
        &self,
        request: Request<plan_resource_change::Request>,
    ) -> Result<Response<plan_resource_change::Response>, Status> {
        let req = request.into_inner();
        let prior = decode(req.prior_state)?;
        let proposed = decode(req.proposed_new_state)?;
        let config = decode(req.config)?;

        let plan = self
            .provider
            .plan_resource_change(&req.type_name, &prior, &proposed, &config)?;
        Ok(Response::new(plan_resource_change::Response {
            planned_state: encode(&plan.planned_state)?,
            requires_replace: plan.requires_replace.iter().map(String::as_str).map(attribute_path).collect(),
            planned_private: req.prior_private,
            diagnostics: diagnostics(plan.diagnostics),
            legacy_type_system: true,
        }))
    }

    async fn apply_resource_change(
        &self,
        request: Request<apply_resource_change::Request>,
    ) -> Result<Response<apply_resource_change::Response>, Status> {
        let req = request.into_inner();
        let prior = decode(req.prior_state)?;
        let planned = decode(req.planned_state)?;

        let result = self
            .provider
            .apply_resource_change(&req.type_name, &prior, &planned)
            .await?;
        Ok(Response::new(apply_resource_change::Response {
            new_state: encode(&result.state)?,
            private: Vec::new(),
            diagnostics: diagnostics(result.diagnostics),
            legacy_type_system: true,
        }))
    }

    async fn import_resource_state(
        &self,
        request: Request<import_resource_state::Request>,
    ) -> Result<Response<import_resource_state::Response>, Status> {
        let req = request.into_inner();
        let result = self.provider.import_resource_state(&req.type_name, &req.id).await?;

        let imported_resources = if result.state.is_null() {
            vec![]
        } else {
            vec![import_resource_state::ImportedResource {
                type_name: req.type_name,
                state: encode(&result.state)?,
                private: Vec::new(),
            }]
        };
        Ok(Response::new(import_resource_state::Response {
            imported_resources,
            diagnostics: diagnostics(result.diagnostics),
        }))
    }

    async fn read_data_source(
        &self,
        request: Request<read_data_source::Request>,
    ) -> Result<Response<read_data_source::Response>, Status> {
        let req = request.into_inner();
        let config = decode(req.config)?;
        let result = self.provider.read_data_source(&req.type_name, &config).await?;
        Ok(Response::new(read_data_source::Response {
            state: encode(&result.state)?,
            diagnostics: diagnostics(result.diagnostics),
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<stop_provider::Request>,
    ) -> Result<Response<stop_provider::Response>, Status> {
        info!("Stop requested");
        Ok(Response::new(stop_provider::Response { error: String::new() }))
    }
}

/// Line Terraform reads from stdout to find the plugin server
pub fn handshake_line(addr: SocketAddr) -> String {
    format!(
        "{}|{}|tcp|{}|grpc",
        CORE_PROTOCOL_VERSION, PLUGIN_PROTOCOL_VERSION, addr
    )
}

/// Run the provider as a Terraform plugin until interrupted
pub async fn serve(provider: GrafanaProvider) -> anyhow::Result<()> {
    if std::env::var(MAGIC_COOKIE_KEY).as_deref() != Ok(MAGIC_COOKIE_VALUE) {
        bail!(
            "This binary is a plugin. These are not meant to be executed directly. \
             Please execute the program that consumes these plugins, which will \
             load any plugins automatically"
        );
    }

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind plugin listener")?;
    let addr = listener.local_addr()?;
    info!("Provider listening on {}", addr);

    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", handshake_line(addr))?;
    stdout.flush()?;

    Server::builder()
        .add_service(ProviderServer::new(ProviderService::new(provider)))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Provider stopped");
    Ok(())
}
