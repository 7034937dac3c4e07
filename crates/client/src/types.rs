//! Grafana API models

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Data source as exchanged with `/api/datasources`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub uid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub access: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub basic_auth: bool,
    #[serde(default)]
    pub basic_auth_user: String,
    #[serde(default)]
    pub json_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub secure_json_data: Map<String, Value>,
    /// Names of secure fields that hold a value; Grafana never returns the values
    #[serde(default, skip_serializing)]
    pub secure_json_fields: BTreeMap<String, bool>,
}

/// Response body of a data source creation
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedDataSource {
    pub id: i64,
    #[serde(default)]
    pub message: String,
}

/// Single permission granted by a role
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Permission {
    pub action: String,
    #[serde(default)]
    pub scope: String,
}

/// Access-control role (RoleDTO)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub global: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
}

impl Role {
    /// Global roles live outside any organization (org id 0)
    pub fn is_global(&self) -> bool {
        self.global || self.org_id == Some(0)
    }
}

/// Generic `{"message": "..."}` body returned by most mutating endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}
