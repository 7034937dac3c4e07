//! Schema declarations
//!
//! Provider, resource and data source schemas, plus the schema-driven value
//! shaping shared by every resource: default filling, conforming values to
//! the declared attribute set, and force-new detection.

use std::collections::BTreeMap;

use crate::state::{bool_value, string_value, DynamicValue};
use crate::tfplugin6 as proto;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Bool,
    Number,
    StringMap,
}

impl AttributeType {
    /// cty type in its JSON wire form
    pub fn type_json(&self) -> &'static [u8] {
        match self {
            AttributeType::String => br#""string""#,
            AttributeType::Bool => br#""bool""#,
            AttributeType::Number => br#""number""#,
            AttributeType::StringMap => br#"["map","string"]"#,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: &'static str,
    pub ty: AttributeType,
    pub description: &'static str,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    /// Changing the value destroys and recreates the resource
    pub force_new: bool,
    pub default: Option<DynamicValue>,
}

impl Attribute {
    fn new(name: &'static str, ty: AttributeType) -> Self {
        Self {
            name,
            ty,
            description: "",
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            force_new: false,
            default: None,
        }
    }

    pub fn required(name: &'static str, ty: AttributeType) -> Self {
        Self { required: true, ..Self::new(name, ty) }
    }

    pub fn optional(name: &'static str, ty: AttributeType) -> Self {
        Self { optional: true, ..Self::new(name, ty) }
    }

    pub fn computed(name: &'static str, ty: AttributeType) -> Self {
        Self { computed: true, ..Self::new(name, ty) }
    }

    pub fn and_computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_default(mut self, value: DynamicValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    fn to_proto(&self) -> proto::schema::Attribute {
        proto::schema::Attribute {
            name: self.name.to_string(),
            r#type: self.ty.type_json().to_vec(),
            description: self.description.to_string(),
            required: self.required,
            optional: self.optional,
            computed: self.computed,
            sensitive: self.sensitive,
            description_kind: proto::StringKind::Markdown as i32,
            deprecated: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestingMode {
    List,
    Set,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedBlock {
    pub type_name: &'static str,
    pub block: Block,
    pub nesting: NestingMode,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub description: &'static str,
    pub attributes: Vec<Attribute>,
    pub blocks: Vec<NestedBlock>,
}

impl Block {
    /// Reshape an object so it carries exactly the declared attributes.
    ///
    /// Unknown keys are dropped, missing attributes become null and nested
    /// blocks become (possibly empty) lists. Terraform rejects objects whose
    /// attribute count differs from the schema.
    pub fn conform(&self, value: &DynamicValue) -> DynamicValue {
        let Some(map) = value.as_map() else {
            return value.clone();
        };

        let mut out = BTreeMap::new();
        for attr in &self.attributes {
            out.insert(
                attr.name.to_string(),
                map.get(attr.name).cloned().unwrap_or_default(),
            );
        }
        for nested in &self.blocks {
            let items = match map.get(nested.type_name) {
                Some(DynamicValue::List(items)) => items.iter().map(|i| nested.block.conform(i)).collect(),
                Some(DynamicValue::Unknown) => {
                    out.insert(nested.type_name.to_string(), DynamicValue::Unknown);
                    continue;
                }
                _ => Vec::new(),
            };
            out.insert(nested.type_name.to_string(), DynamicValue::List(items));
        }
        DynamicValue::Map(out)
    }

    /// Fill null attributes that declare a default
    pub fn apply_defaults(&self, value: &DynamicValue) -> DynamicValue {
        let DynamicValue::Map(map) = value else {
            return value.clone();
        };

        let mut out = map.clone();
        for attr in &self.attributes {
            if let Some(default) = &attr.default {
                let entry = out.entry(attr.name.to_string()).or_default();
                if entry.is_null() {
                    *entry = default.clone();
                }
            }
        }
        for nested in &self.blocks {
            if let Some(DynamicValue::List(items)) = out.get(nested.type_name) {
                let items = items.iter().map(|i| nested.block.apply_defaults(i)).collect();
                out.insert(nested.type_name.to_string(), DynamicValue::List(items));
            }
        }
        DynamicValue::Map(out)
    }

    fn to_proto(&self, version: i64) -> proto::schema::Block {
        proto::schema::Block {
            version,
            attributes: self.attributes.iter().map(Attribute::to_proto).collect(),
            block_types: self
                .blocks
                .iter()
                .map(|nested| proto::schema::NestedBlock {
                    type_name: nested.type_name.to_string(),
                    block: Some(nested.block.to_proto(version)),
                    nesting: match nested.nesting {
                        NestingMode::List => proto::schema::nested_block::NestingMode::List as i32,
                        NestingMode::Set => proto::schema::nested_block::NestingMode::Set as i32,
                    },
                    min_items: 0,
                    max_items: 0,
                })
                .collect(),
            description: self.description.to_string(),
            description_kind: proto::StringKind::Markdown as i32,
            deprecated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub version: i64,
    pub block: Block,
}

impl Schema {
    /// Force-new attributes whose planned value differs from the prior state
    pub fn requires_replace(&self, prior: &DynamicValue, planned: &DynamicValue) -> Vec<String> {
        if prior.is_null() || planned.is_null() {
            return Vec::new();
        }
        self.block
            .attributes
            .iter()
            .filter(|a| a.force_new)
            .filter(|a| {
                let before = prior.get(a.name).cloned().unwrap_or_default();
                let after = planned.get(a.name).cloned().unwrap_or_default();
                !after.is_null() && before != after
            })
            .map(|a| a.name.to_string())
            .collect()
    }

    pub fn to_proto(&self) -> proto::Schema {
        proto::Schema {
            version: self.version,
            block: Some(self.block.to_proto(self.version)),
        }
    }
}

/// Provider configuration block
pub fn provider_schema() -> Schema {
    use AttributeType::*;

    Schema {
        version: 0,
        block: Block {
            description: "Manages Grafana through its HTTP API.",
            attributes: vec![
                Attribute::optional("url", String)
                    .describe("The root URL of a Grafana server. May alternatively be set via the `GRAFANA_URL` environment variable."),
                Attribute::optional("auth", String)
                    .sensitive()
                    .describe("API token or basic auth `username:password`. May alternatively be set via the `GRAFANA_AUTH` environment variable."),
                Attribute::optional("org_id", Number)
                    .describe("The default organization id to operate on within Grafana. May alternatively be set via the `GRAFANA_ORG_ID` environment variable."),
                Attribute::optional("http_headers", StringMap)
                    .sensitive()
                    .describe("Optional. HTTP headers mapping keys to values used for accessing the Grafana API."),
                Attribute::optional("insecure_skip_verify", Bool)
                    .describe("Skip TLS certificate verification. May alternatively be set via the `GRAFANA_INSECURE_SKIP_VERIFY` environment variable."),
            ],
            blocks: vec![],
        },
    }
}

/// `grafana_role` resource
pub fn role_schema() -> Schema {
    use AttributeType::*;

    Schema {
        version: 0,
        block: Block {
            description: "* [Official documentation](https://grafana.com/docs/grafana/latest/administration/roles-and-permissions/access-control/)\n* [HTTP API](https://grafana.com/docs/grafana/latest/developers/http_api/access_control/)\n\n**Note:** This resource is available only with Grafana Enterprise 8.+.",
            attributes: vec![
                Attribute::computed("id", String),
                Attribute::optional("uid", String)
                    .and_computed()
                    .force_new()
                    .describe("Unique identifier of the role. Used for assignments."),
                Attribute::required("name", String)
                    .describe("Name of the role"),
                Attribute::optional("description", String)
                    .with_default(string_value(""))
                    .describe("Description of the role."),
                Attribute::optional("display_name", String)
                    .with_default(string_value(""))
                    .describe("Display name of the role. Available with Grafana 8.5+."),
                Attribute::optional("group", String)
                    .with_default(string_value(""))
                    .describe("Group of the role. Available with Grafana 8.5+."),
                Attribute::optional("version", Number)
                    .and_computed()
                    .describe("Version of the role. A role is updated only on version increase. This field or `auto_increment_version` should be set."),
                Attribute::optional("auto_increment_version", Bool)
                    .with_default(bool_value(false))
                    .describe("Whether the role version should be incremented automatically on updates (and set to 1 on creation). This field or `version` should be set."),
                Attribute::optional("global", Bool)
                    .with_default(bool_value(false))
                    .force_new()
                    .describe("Boolean to state whether the role is available across all organizations or not."),
                Attribute::optional("hidden", Bool)
                    .with_default(bool_value(false))
                    .describe("Boolean to state whether the role should be visible in the Grafana UI or not. Available with Grafana 8.5+."),
            ],
            blocks: vec![NestedBlock {
                type_name: "permissions",
                nesting: NestingMode::Set,
                block: Block {
                    description: "Specific set of actions granted by the role.",
                    attributes: vec![
                        Attribute::required("action", String)
                            .describe("Specific action users granted with the role will be allowed to perform (for example: `users:read`)"),
                        Attribute::optional("scope", String)
                            .with_default(string_value(""))
                            .describe("Scope to restrict the action to a set of resources (for example: `users:*` or `roles:customrole1`)"),
                    ],
                    blocks: vec![],
                },
            }],
        },
    }
}

/// `grafana_data_source` resource
pub fn data_source_schema() -> Schema {
    use AttributeType::*;

    Schema {
        version: 1,
        block: Block {
            description: "* [Official documentation](https://grafana.com/docs/grafana/latest/datasources/)\n* [HTTP API](https://grafana.com/docs/grafana/latest/developers/http_api/data_source/)\n\nThe required arguments for this resource vary depending on the type of data source selected (via the 'type' argument).",
            attributes: vec![
                Attribute::computed("id", String),
                Attribute::optional("access_mode", String)
                    .with_default(string_value("proxy"))
                    .describe("The method by which Grafana will access the data source: `proxy` or `direct`."),
                Attribute::optional("basic_auth_enabled", Bool)
                    .with_default(bool_value(false))
                    .describe("Whether to enable basic auth for the data source."),
                Attribute::optional("basic_auth_username", String)
                    .with_default(string_value(""))
                    .describe("Basic auth username."),
                Attribute::optional("database_name", String)
                    .with_default(string_value(""))
                    .describe("(Required by some data source types) The name of the database to use on the selected data source server."),
                Attribute::optional("http_headers", StringMap)
                    .sensitive()
                    .describe("Custom HTTP headers"),
                Attribute::optional("is_default", Bool)
                    .with_default(bool_value(false))
                    .describe("Whether to set the data source as default. This should only be `true` to a single data source."),
                Attribute::optional("uid", String)
                    .and_computed()
                    .force_new()
                    .describe("Unique identifier. If unset, this will be automatically generated."),
                Attribute::required("name", String)
                    .describe("A unique name for the data source."),
                Attribute::required("type", String)
                    .describe("The data source type. Must be one of the supported data source keywords."),
                Attribute::optional("url", String)
                    .describe("The URL for the data source. The type of URL required varies depending on the chosen data source type."),
                Attribute::optional("username", String)
                    .with_default(string_value(""))
                    .describe("(Required by some data source types) The username to use to authenticate to the data source."),
                Attribute::optional("json_data_encoded", String)
                    .describe("Serialized JSON string containing the json data. This attribute can be used to pass configuration options to the data source. Note that keys in this map are usually camelCased."),
                Attribute::optional("secure_json_data_encoded", String)
                    .sensitive()
                    .describe("Serialized JSON string containing the secure json data. This attribute can be used to pass secure configuration options to the data source. Note that keys in this map are usually camelCased."),
            ],
            blocks: vec![],
        },
    }
}

/// `grafana_data_source` data source
pub fn data_source_data_schema() -> Schema {
    use AttributeType::*;

    Schema {
        version: 0,
        block: Block {
            description: "Get details about a Grafana data source by exactly one of `id`, `uid` or `name`.",
            attributes: vec![
                Attribute::optional("id", String).and_computed(),
                Attribute::optional("uid", String).and_computed(),
                Attribute::optional("name", String).and_computed(),
                Attribute::computed("type", String),
                Attribute::computed("url", String),
                Attribute::computed("access_mode", String),
                Attribute::computed("database_name", String),
                Attribute::computed("username", String),
                Attribute::computed("is_default", Bool),
                Attribute::computed("basic_auth_enabled", Bool),
                Attribute::computed("basic_auth_username", String),
                Attribute::computed("json_data_encoded", String),
            ],
            blocks: vec![],
        },
    }
}
