//! Terraform State Management
//!
//! Handles encoding and decoding of Terraform dynamic values. Terraform sends
//! msgpack for configuration, plans and state, and JSON for raw stored state
//! handed to `UpgradeResourceState`.

use anyhow::{Context, Result};
use std::collections::BTreeMap;

/// msgpack extension type Terraform uses for values not known until apply
const UNKNOWN_EXT_TYPE: i8 = 0;

/// Dynamic value that can be encoded/decoded from Terraform state
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DynamicValue {
    #[default]
    Null,
    /// Value will only be known after apply
    Unknown,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<DynamicValue>),
    Map(BTreeMap<String, DynamicValue>),
}

impl DynamicValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DynamicValue::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, DynamicValue::Unknown)
    }

    /// True when neither null nor unknown
    pub fn is_known(&self) -> bool {
        !self.is_null() && !self.is_unknown()
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            DynamicValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Large numbers arrive as strings, so both encodings are accepted
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DynamicValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            DynamicValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynamicValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[DynamicValue]> {
        match self {
            DynamicValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, DynamicValue>> {
        match self {
            DynamicValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.as_map()?.get(key)
    }

    /// Set an attribute, turning a null value into an empty object first
    pub fn set(&mut self, key: &str, value: DynamicValue) {
        if self.is_null() {
            *self = DynamicValue::Map(BTreeMap::new());
        }
        if let DynamicValue::Map(m) = self {
            m.insert(key.to_string(), value);
        }
    }

    /// Convert from a JSON document
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DynamicValue::Null,
            serde_json::Value::Bool(b) => DynamicValue::Bool(b),
            serde_json::Value::Number(n) => DynamicValue::Number(n),
            serde_json::Value::String(s) => DynamicValue::String(s),
            serde_json::Value::Array(items) => {
                DynamicValue::List(items.into_iter().map(DynamicValue::from_json).collect())
            }
            serde_json::Value::Object(obj) => DynamicValue::Map(
                obj.into_iter()
                    .map(|(k, v)| (k, DynamicValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to a JSON document; unknown values have no JSON form
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            DynamicValue::Null => serde_json::Value::Null,
            DynamicValue::Unknown => anyhow::bail!("unknown values cannot be encoded as JSON"),
            DynamicValue::Bool(b) => serde_json::Value::Bool(*b),
            DynamicValue::Number(n) => serde_json::Value::Number(n.clone()),
            DynamicValue::String(s) => serde_json::Value::String(s.clone()),
            DynamicValue::List(items) => serde_json::Value::Array(
                items.iter().map(|v| v.to_json()).collect::<Result<Vec<_>>>()?,
            ),
            DynamicValue::Map(m) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in m {
                    obj.insert(k.clone(), v.to_json()?);
                }
                serde_json::Value::Object(obj)
            }
        })
    }
}

fn from_msgpack(value: rmpv::Value) -> DynamicValue {
    match value {
        rmpv::Value::Nil => DynamicValue::Null,
        rmpv::Value::Boolean(b) => DynamicValue::Bool(b),
        rmpv::Value::Integer(i) => {
            if let Some(n) = i.as_i64() {
                DynamicValue::Number(n.into())
            } else if let Some(n) = i.as_u64() {
                DynamicValue::Number(n.into())
            } else {
                DynamicValue::Null
            }
        }
        rmpv::Value::F32(f) => float_value(f as f64),
        rmpv::Value::F64(f) => float_value(f),
        rmpv::Value::String(s) => DynamicValue::String(s.into_str().unwrap_or_default()),
        rmpv::Value::Binary(b) => DynamicValue::String(String::from_utf8_lossy(&b).into_owned()),
        rmpv::Value::Array(items) => DynamicValue::List(items.into_iter().map(from_msgpack).collect()),
        rmpv::Value::Map(pairs) => DynamicValue::Map(
            pairs
                .into_iter()
                .map(|(k, v)| {
                    let key = match k {
                        rmpv::Value::String(s) => s.into_str().unwrap_or_default(),
                        other => other.to_string(),
                    };
                    (key, from_msgpack(v))
                })
                .collect(),
        ),
        rmpv::Value::Ext(_, _) => DynamicValue::Unknown,
    }
}

fn to_msgpack(value: &DynamicValue) -> rmpv::Value {
    match value {
        DynamicValue::Null => rmpv::Value::Nil,
        DynamicValue::Unknown => rmpv::Value::Ext(UNKNOWN_EXT_TYPE, vec![0]),
        DynamicValue::Bool(b) => rmpv::Value::Boolean(*b),
        DynamicValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                rmpv::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                rmpv::Value::from(u)
            } else {
                rmpv::Value::F64(n.as_f64().unwrap_or_default())
            }
        }
        DynamicValue::String(s) => rmpv::Value::from(s.as_str()),
        DynamicValue::List(items) => rmpv::Value::Array(items.iter().map(to_msgpack).collect()),
        DynamicValue::Map(m) => rmpv::Value::Map(
            m.iter()
                .map(|(k, v)| (rmpv::Value::from(k.as_str()), to_msgpack(v)))
                .collect(),
        ),
    }
}

/// Decode a Terraform DynamicValue from msgpack bytes
pub fn decode_dynamic_value(data: &[u8]) -> Result<DynamicValue> {
    if data.is_empty() {
        return Ok(DynamicValue::Null);
    }

    let mut reader = data;
    let value = rmpv::decode::read_value(&mut reader).context("invalid msgpack dynamic value")?;
    Ok(from_msgpack(value))
}

/// Encode a value to Terraform DynamicValue msgpack bytes
pub fn encode_dynamic_value(value: &DynamicValue) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    rmpv::encode::write_value(&mut bytes, &to_msgpack(value))?;
    Ok(bytes)
}

/// Decode raw JSON state as stored by Terraform
pub fn decode_json_state(data: &[u8]) -> Result<DynamicValue> {
    if data.is_empty() {
        return Ok(DynamicValue::Null);
    }
    let value: serde_json::Value = serde_json::from_slice(data).context("invalid JSON state")?;
    Ok(DynamicValue::from_json(value))
}

/// Helper to extract a string attribute from a DynamicValue
pub fn get_string_attr(value: &DynamicValue, key: &str) -> String {
    value.get(key)
        .and_then(|v| v.as_string())
        .unwrap_or("")
        .to_string()
}

/// Helper to extract an optional string attribute from a DynamicValue
pub fn get_optional_string_attr(value: &DynamicValue, key: &str) -> Option<String> {
    value.get(key)
        .and_then(|v| match v {
            DynamicValue::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
}

/// Helper to extract an integer attribute from a DynamicValue
pub fn get_int_attr(value: &DynamicValue, key: &str, default: i64) -> i64 {
    get_optional_int_attr(value, key).unwrap_or(default)
}

/// Helper to extract an integer attribute that may be unset
pub fn get_optional_int_attr(value: &DynamicValue, key: &str) -> Option<i64> {
    value.get(key).and_then(|v| v.as_i64())
}

/// Helper to extract a bool attribute from a DynamicValue
pub fn get_bool_attr(value: &DynamicValue, key: &str, default: bool) -> bool {
    value.get(key)
        .and_then(|v| v.as_bool())
        .unwrap_or(default)
}

/// Helper to extract a map(string) attribute; null entries are skipped
pub fn get_string_map_attr(value: &DynamicValue, key: &str) -> BTreeMap<String, String> {
    value.get(key)
        .and_then(|v| v.as_map())
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_string().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Helper to extract the elements of a list, set or nested block attribute
pub fn get_list_attr<'a>(value: &'a DynamicValue, key: &str) -> &'a [DynamicValue] {
    value.get(key)
        .and_then(|v| v.as_list())
        .unwrap_or(&[])
}

/// Create a DynamicValue map with the given attributes
pub fn make_state(attrs: Vec<(&str, DynamicValue)>) -> DynamicValue {
    let mut map = BTreeMap::new();
    for (key, value) in attrs {
        map.insert(key.to_string(), value);
    }
    DynamicValue::Map(map)
}

/// Create a string DynamicValue
pub fn string_value(s: impl Into<String>) -> DynamicValue {
    DynamicValue::String(s.into())
}

/// Create a number DynamicValue from i64
pub fn int_value(n: i64) -> DynamicValue {
    DynamicValue::Number(serde_json::Number::from(n))
}

/// Create a number DynamicValue from f64
pub fn float_value(n: f64) -> DynamicValue {
    serde_json::Number::from_f64(n)
        .map(DynamicValue::Number)
        .unwrap_or(DynamicValue::Null)
}

/// Create a bool DynamicValue
pub fn bool_value(b: bool) -> DynamicValue {
    DynamicValue::Bool(b)
}

/// Create a map(string) DynamicValue
pub fn string_map_value(m: &BTreeMap<String, String>) -> DynamicValue {
    DynamicValue::Map(
        m.iter()
            .map(|(k, v)| (k.clone(), string_value(v.as_str())))
            .collect(),
    )
}

/// Create a null DynamicValue
pub fn null_value() -> DynamicValue {
    DynamicValue::Null
}
