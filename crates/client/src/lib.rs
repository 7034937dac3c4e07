//! Grafana API Client
//!
//! Typed wrappers over the Grafana HTTP endpoints used by the Terraform
//! provider: data sources and access-control roles.

pub mod client;
pub mod error;
pub mod headers;
pub mod types;

pub use client::{Auth, ClientConfig, GrafanaClient, ORG_ID_HEADER};
pub use error::{Error, Result};
pub use headers::{extract_headers_from_json_data, json_data_with_headers};
pub use types::{DataSource, Permission, Role};
