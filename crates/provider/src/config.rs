//! Provider configuration
//!
//! Values from the `provider "grafana"` block win over environment variables.

use grafana_client::ClientConfig;

use crate::error::Diagnostic;
use crate::state::{
    get_optional_int_attr, get_optional_string_attr, get_string_map_attr, DynamicValue,
};

pub const ENV_URL: &str = "GRAFANA_URL";
pub const ENV_AUTH: &str = "GRAFANA_AUTH";
pub const ENV_ORG_ID: &str = "GRAFANA_ORG_ID";
pub const ENV_INSECURE_SKIP_VERIFY: &str = "GRAFANA_INSECURE_SKIP_VERIFY";

/// Source of environment variables, replaceable in tests
pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

/// Process environment
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// Build the client configuration from the provider block and environment
pub fn client_config(config: &DynamicValue, env: &dyn Env) -> Result<ClientConfig, Diagnostic> {
    let url = get_optional_string_attr(config, "url")
        .or_else(|| env.var(ENV_URL))
        .ok_or_else(|| {
            Diagnostic::error(
                "Missing Grafana URL",
                format!("Set the `url` provider attribute or the {} environment variable.", ENV_URL),
            )
            .at("url")
        })?;

    let auth = get_optional_string_attr(config, "auth").or_else(|| env.var(ENV_AUTH));

    let org_id = match get_optional_int_attr(config, "org_id") {
        Some(id) => Some(id),
        None => match env.var(ENV_ORG_ID) {
            Some(raw) => Some(raw.parse::<i64>().map_err(|e| {
                Diagnostic::error(
                    "Invalid organization id",
                    format!("{}={:?} is not a number: {}", ENV_ORG_ID, raw, e),
                )
                .at("org_id")
            })?),
            None => None,
        },
    };

    let insecure_skip_verify = match config.get("insecure_skip_verify").and_then(|v| v.as_bool()) {
        Some(b) => b,
        None => env
            .var(ENV_INSECURE_SKIP_VERIFY)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true"))
            .unwrap_or(false),
    };

    Ok(ClientConfig {
        url,
        auth,
        org_id,
        http_headers: get_string_map_attr(config, "http_headers"),
        insecure_skip_verify,
    })
}
