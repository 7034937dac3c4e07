//! Acceptance test harness
//!
//! Plays Terraform's part in the plugin protocol: builds configuration and
//! proposed new state from the schema, then drives validate, plan, apply and
//! refresh through the gRPC service. Runs against the in-memory emulator
//! unless `TF_ACC=1` and `GRAFANA_URL` point at a live instance.

#![allow(dead_code)]

pub mod fake_grafana;

use std::collections::BTreeMap;

use grafana_client::{ClientConfig, GrafanaClient};
use grafana_provider::schema::Schema;
use grafana_provider::state::{
    decode_dynamic_value, encode_dynamic_value, make_state, string_value, DynamicValue,
};
use grafana_provider::tfplugin6::{self as proto, provider_server::Provider, *};
use grafana_provider::{GrafanaProvider, ProviderService};
use tonic::Request;

use fake_grafana::FakeGrafana;

pub type Attrs<'a> = Vec<(&'a str, DynamicValue)>;

fn live_requested() -> bool {
    std::env::var("TF_ACC").as_deref() == Ok("1") && std::env::var("GRAFANA_URL").is_ok()
}

/// Random name so parallel runs against a live instance never collide
pub fn random_name(prefix: &str) -> String {
    format!("{}-{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..10])
}

fn encode(value: &DynamicValue) -> Option<proto::DynamicValue> {
    Some(proto::DynamicValue {
        msgpack: encode_dynamic_value(value).unwrap(),
        json: Vec::new(),
    })
}

fn decode(value: Option<proto::DynamicValue>) -> DynamicValue {
    value
        .map(|v| decode_dynamic_value(&v.msgpack).unwrap())
        .unwrap_or_default()
}

fn errors(diagnostics: &[proto::Diagnostic]) -> Vec<String> {
    diagnostics
        .iter()
        .filter(|d| d.severity == diagnostic::Severity::Error as i32)
        .map(|d| format!("{}: {}", d.summary, d.detail))
        .collect()
}

fn check(diagnostics: &[proto::Diagnostic]) -> Result<(), Vec<String>> {
    let errs = errors(diagnostics);
    if errs.is_empty() { Ok(()) } else { Err(errs) }
}

/// Full configuration object: every attribute present, unset ones null
pub fn config_value(schema: &Schema, attrs: Attrs) -> DynamicValue {
    schema.block.conform(&make_state(attrs))
}

/// Proposed new state the way Terraform derives it: configured values win,
/// computed attributes left unset keep their prior value.
pub fn proposed_new_state(schema: &Schema, prior: &DynamicValue, config: &DynamicValue) -> DynamicValue {
    let mut proposed = config.clone();
    for attr in schema.block.attributes.iter().filter(|a| a.computed) {
        if config.get(attr.name).map_or(true, DynamicValue::is_null) {
            proposed.set(attr.name, prior.get(attr.name).cloned().unwrap_or_default());
        }
    }
    proposed
}

struct Managed {
    type_name: String,
    state: DynamicValue,
}

pub struct Harness {
    service: ProviderService,
    client: GrafanaClient,
    resources: BTreeMap<String, Managed>,
    fake: Option<FakeGrafana>,
}

impl Harness {
    /// Harness for the current test mode; `None` means the test should be
    /// skipped because it needs Grafana Enterprise on a live instance.
    pub async fn start(enterprise: bool) -> Option<Self> {
        let (provider_attrs, client_config, fake): (Attrs, ClientConfig, _) = if live_requested() {
            if enterprise && std::env::var("TF_ACC_ENTERPRISE").is_err() {
                eprintln!("skipping: TF_ACC_ENTERPRISE must be set");
                return None;
            }
            let client_config = ClientConfig {
                url: std::env::var("GRAFANA_URL").unwrap(),
                auth: std::env::var("GRAFANA_AUTH").ok(),
                ..Default::default()
            };
            // provider reads the same variables itself
            (vec![], client_config, None)
        } else {
            let fake = FakeGrafana::start().await;
            let client_config = ClientConfig {
                url: fake.url.clone(),
                auth: Some("admin:admin".to_string()),
                ..Default::default()
            };
            let provider_attrs = vec![
                ("url", string_value(&fake.url)),
                ("auth", string_value("admin:admin")),
            ];
            (provider_attrs, client_config, Some(fake))
        };

        let service = ProviderService::new(GrafanaProvider::new());
        let provider_config = config_value(&GrafanaProvider::provider_schema(), provider_attrs);
        let configured = service
            .configure_provider(Request::new(configure_provider::Request {
                terraform_version: "1.7.0".to_string(),
                config: encode(&provider_config),
            }))
            .await
            .unwrap()
            .into_inner();
        check(&configured.diagnostics).expect("provider configuration failed");

        Some(Self {
            service,
            client: GrafanaClient::new(&client_config).unwrap(),
            resources: BTreeMap::new(),
            fake,
        })
    }

    /// Direct API access for checking remote state
    pub fn client(&self) -> &GrafanaClient {
        &self.client
    }

    pub fn fake(&self) -> Option<&FakeGrafana> {
        self.fake.as_ref()
    }

    pub fn state(&self, address: &str) -> &DynamicValue {
        &self.resources[address].state
    }

    pub async fn validate(&self, type_name: &str, attrs: Attrs<'_>) -> Result<(), Vec<String>> {
        let schema = GrafanaProvider::resource_schema(type_name).unwrap();
        self.validate_config(type_name, &config_value(&schema, attrs)).await
    }

    async fn plan(
        &self,
        type_name: &str,
        prior: &DynamicValue,
        proposed: &DynamicValue,
        config: &DynamicValue,
    ) -> Result<plan_resource_change::Response, Vec<String>> {
        let resp = self
            .service
            .plan_resource_change(Request::new(plan_resource_change::Request {
                type_name: type_name.to_string(),
                prior_state: encode(prior),
                proposed_new_state: encode(proposed),
                config: encode(config),
                prior_private: Vec::new(),
                provider_meta: None,
            }))
            .await
            .unwrap()
            .into_inner();
        check(&resp.diagnostics)?;
        Ok(resp)
    }

    async fn apply_planned(
        &self,
        type_name: &str,
        prior: &DynamicValue,
        planned: &DynamicValue,
        config: &DynamicValue,
    ) -> Result<DynamicValue, Vec<String>> {
        let resp = self
            .service
            .apply_resource_change(Request::new(apply_resource_change::Request {
                type_name: type_name.to_string(),
                prior_state: encode(prior),
                planned_state: encode(planned),
                config: encode(config),
                planned_private: Vec::new(),
                provider_meta: None,
            }))
            .await
            .unwrap()
            .into_inner();
        check(&resp.diagnostics)?;
        assert!(resp.legacy_type_system);
        Ok(decode(resp.new_state))
    }

    async fn read(&self, type_name: &str, current: &DynamicValue) -> Result<DynamicValue, Vec<String>> {
        let resp = self
            .service
            .read_resource(Request::new(read_resource::Request {
                type_name: type_name.to_string(),
                current_state: encode(current),
                private: Vec::new(),
                provider_meta: None,
            }))
            .await
            .unwrap()
            .into_inner();
        check(&resp.diagnostics)?;
        Ok(decode(resp.new_state))
    }

    /// Refresh a managed resource; a vanished remote object leaves null state
    pub async fn refresh(&mut self, address: &str) -> Result<DynamicValue, Vec<String>> {
        let managed = &self.resources[address];
        let state = self.read(&managed.type_name, &managed.state).await?;
        self.resources.get_mut(address).unwrap().state = state.clone();
        Ok(state)
    }

    /// One `terraform apply` of a single resource block, followed by the
    /// empty-plan check acceptance tests perform after every step.
    pub async fn apply(&mut self, address: &str, type_name: &str, attrs: Attrs<'_>) -> Result<DynamicValue, Vec<String>> {
        let schema = GrafanaProvider::resource_schema(type_name).unwrap();
        let config = config_value(&schema, attrs);

        self.validate_config(type_name, &config).await?;

        let mut prior = match self.resources.get(address) {
            Some(_) => self.refresh(address).await?,
            None => DynamicValue::Null,
        };

        let proposed = proposed_new_state(&schema, &prior, &config);
        let mut plan = self.plan(type_name, &prior, &proposed, &config).await?;

        if !plan.requires_replace.is_empty() {
            self.apply_planned(type_name, &prior, &DynamicValue::Null, &DynamicValue::Null).await?;
            prior = DynamicValue::Null;
            let proposed = proposed_new_state(&schema, &prior, &config);
            plan = self.plan(type_name, &prior, &proposed, &config).await?;
        }

        let planned = decode(plan.planned_state);
        let state = if planned == prior {
            prior
        } else {
            self.apply_planned(type_name, &prior, &planned, &config).await?
        };

        let attribute_count = schema.block.attributes.len() + schema.block.blocks.len();
        assert_eq!(
            state.as_map().map(|m| m.len()),
            Some(attribute_count),
            "state must carry exactly the schema attributes"
        );

        self.resources.insert(
            address.to_string(),
            Managed { type_name: type_name.to_string(), state: state.clone() },
        );

        let refreshed = self.refresh(address).await?;
        let proposed = proposed_new_state(&schema, &refreshed, &config);
        let replan = self.plan(type_name, &refreshed, &proposed, &config).await?;
        let replanned = decode(replan.planned_state);
        if replanned != refreshed || !replan.requires_replace.is_empty() {
            return Err(vec![format!(
                "plan not empty after apply:\n  state:   {:?}\n  planned: {:?}",
                refreshed, replanned
            )]);
        }

        Ok(refreshed)
    }

    async fn validate_config(&self, type_name: &str, config: &DynamicValue) -> Result<(), Vec<String>> {
        let resp = self
            .service
            .validate_resource_config(Request::new(validate_resource_config::Request {
                type_name: type_name.to_string(),
                config: encode(config),
            }))
            .await
            .unwrap()
            .into_inner();
        check(&resp.diagnostics)
    }

    /// `terraform destroy` of a managed resource
    pub async fn destroy(&mut self, address: &str) -> Result<(), Vec<String>> {
        let Some(managed) = self.resources.remove(address) else {
            return Ok(());
        };
        if managed.state.is_null() {
            return Ok(());
        }

        let plan = self
            .plan(&managed.type_name, &managed.state, &DynamicValue::Null, &DynamicValue::Null)
            .await?;
        assert!(decode(plan.planned_state).is_null());

        let state = self
            .apply_planned(&managed.type_name, &managed.state, &DynamicValue::Null, &DynamicValue::Null)
            .await?;
        assert!(state.is_null());
        Ok(())
    }

    /// `terraform import`: import followed by a read of the imported object
    pub async fn import(&mut self, address: &str, type_name: &str, id: &str) -> Result<DynamicValue, Vec<String>> {
        let resp = self
            .service
            .import_resource_state(Request::new(import_resource_state::Request {
                type_name: type_name.to_string(),
                id: id.to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        check(&resp.diagnostics)?;
        assert_eq!(resp.imported_resources.len(), 1);

        let imported = resp.imported_resources.into_iter().next().unwrap();
        let state = self.read(type_name, &decode(imported.state)).await?;
        self.resources.insert(
            address.to_string(),
            Managed { type_name: type_name.to_string(), state: state.clone() },
        );
        Ok(state)
    }

    /// Read a `data` block
    pub async fn read_data(&self, type_name: &str, attrs: Attrs<'_>) -> Result<DynamicValue, Vec<String>> {
        let schema = GrafanaProvider::data_source_schema(type_name).unwrap();
        let config = config_value(&schema, attrs);

        let validated = self
            .service
            .validate_data_resource_config(Request::new(validate_data_resource_config::Request {
                type_name: type_name.to_string(),
                config: encode(&config),
            }))
            .await
            .unwrap()
            .into_inner();
        check(&validated.diagnostics)?;

        let resp = self
            .service
            .read_data_source(Request::new(read_data_source::Request {
                type_name: type_name.to_string(),
                config: encode(&config),
                provider_meta: None,
            }))
            .await
            .unwrap()
            .into_inner();
        check(&resp.diagnostics)?;
        Ok(decode(resp.state))
    }
}
