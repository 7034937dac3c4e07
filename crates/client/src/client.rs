//! HTTP client for the Grafana API

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{CreatedDataSource, DataSource, MessageResponse, Role};

/// Header selecting the organization a request acts on
pub const ORG_ID_HEADER: &str = "x-grafana-org-id";

/// Connection settings for a Grafana instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Root URL of the instance, e.g. `http://localhost:3000`
    pub url: String,

    /// API token, or `user:password` for basic auth
    #[serde(default)]
    pub auth: Option<String>,

    /// Organization to act on
    #[serde(default)]
    pub org_id: Option<i64>,

    /// Extra headers sent with every request
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

/// Credentials attached to each request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    Token(String),
    Basic { user: String, password: String },
}

impl Auth {
    /// `user:password` selects basic auth, anything else is a bearer token
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((user, password)) => Auth::Basic {
                user: user.to_string(),
                password: password.to_string(),
            },
            None => Auth::Token(raw.to_string()),
        }
    }
}

/// Client wrapper for Grafana API communication
#[derive(Debug, Clone)]
pub struct GrafanaClient {
    http: reqwest::Client,
    base_url: Url,
    auth: Option<Auth>,
}

impl GrafanaClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(Error::InvalidConfig("url must not be empty".to_string()));
        }
        if !config.url.starts_with("http://") && !config.url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "url must start with http:// or https://, got {}",
                config.url
            )));
        }
        let base_url = Url::parse(&config.url)
            .map_err(|e| Error::InvalidConfig(format!("invalid url {}: {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!("url {} cannot hold an API path", config.url)));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &config.http_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::InvalidConfig(format!("invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::InvalidConfig(format!("invalid header value for {}: {}", name, e)))?;
            headers.insert(name, value);
        }
        if let Some(org_id) = config.org_id {
            headers.insert(ORG_ID_HEADER, HeaderValue::from(org_id));
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()?;

        Ok(Self {
            http,
            base_url,
            auth: config.auth.as_deref().filter(|a| !a.is_empty()).map(Auth::parse),
        })
    }

    /// Request to the API path made of `segments`, each one percent-encoded
    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let mut url = self.base_url.clone();
        // never fails: new() rejects cannot-be-a-base urls
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        debug!("{} {}", method, url);
        let builder = self.http.request(method, url);
        match &self.auth {
            Some(Auth::Token(token)) => builder.bearer_auth(token),
            Some(Auth::Basic { user, password }) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    /// Map non-success statuses onto client errors
    async fn check(resp: Response, kind: &str, id: &str) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status.as_u16() == 404 {
            return Err(Error::not_found(kind, id));
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<MessageResponse>(&body)
            .ok()
            .map(|m| m.message)
            .filter(|m| !m.is_empty())
            .unwrap_or(body);

        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }

    // Data source operations

    pub async fn new_data_source(&self, ds: &DataSource) -> Result<i64> {
        let resp = self
            .request(Method::POST, &["api", "datasources"])
            .json(ds)
            .send()
            .await?;
        let created: CreatedDataSource = Self::check(resp, "datasource", &ds.name).await?.json().await?;
        Ok(created.id)
    }

    pub async fn update_data_source(&self, ds: &DataSource) -> Result<()> {
        let id = ds.id.to_string();
        let resp = self
            .request(Method::PUT, &["api", "datasources", &id])
            .json(ds)
            .send()
            .await?;
        Self::check(resp, "datasource", &id).await?;
        Ok(())
    }

    pub async fn data_source(&self, id: i64) -> Result<DataSource> {
        let id = id.to_string();
        let resp = self
            .request(Method::GET, &["api", "datasources", &id])
            .send()
            .await?;
        Ok(Self::check(resp, "datasource", &id).await?.json().await?)
    }

    pub async fn data_source_by_uid(&self, uid: &str) -> Result<DataSource> {
        let resp = self
            .request(Method::GET, &["api", "datasources", "uid", uid])
            .send()
            .await?;
        Ok(Self::check(resp, "datasource", uid).await?.json().await?)
    }

    pub async fn data_source_by_name(&self, name: &str) -> Result<DataSource> {
        let resp = self
            .request(Method::GET, &["api", "datasources", "name", name])
            .send()
            .await?;
        Ok(Self::check(resp, "datasource", name).await?.json().await?)
    }

    pub async fn delete_data_source(&self, id: i64) -> Result<()> {
        let id = id.to_string();
        let resp = self
            .request(Method::DELETE, &["api", "datasources", &id])
            .send()
            .await?;
        Self::check(resp, "datasource", &id).await?;
        Ok(())
    }

    // Role operations

    pub async fn new_role(&self, role: &Role) -> Result<Role> {
        let resp = self
            .request(Method::POST, &["api", "access-control", "roles"])
            .json(role)
            .send()
            .await?;
        Ok(Self::check(resp, "role", &role.name).await?.json().await?)
    }

    pub async fn get_role(&self, uid: &str) -> Result<Role> {
        let resp = self
            .request(Method::GET, &["api", "access-control", "roles", uid])
            .send()
            .await?;
        Ok(Self::check(resp, "role", uid).await?.json().await?)
    }

    pub async fn update_role(&self, role: &Role) -> Result<()> {
        let resp = self
            .request(Method::PUT, &["api", "access-control", "roles", &role.uid])
            .json(role)
            .send()
            .await?;
        Self::check(resp, "role", &role.uid).await?;
        Ok(())
    }

    pub async fn delete_role(&self, uid: &str, global: bool) -> Result<()> {
        let resp = self
            .request(Method::DELETE, &["api", "access-control", "roles", uid])
            .query(&[("global", global)])
            .send()
            .await?;
        Self::check(resp, "role", uid).await?;
        Ok(())
    }
}
