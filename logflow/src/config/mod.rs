//! Plugin configuration decoding.
//!
//! Raw configurations are untyped maps discriminated by their `type` field.
//! The [`ConfigRegistry`] maps each type to a strict schema and decodes the
//! rest of the map into it.

mod registry;

pub use registry::{ConfigRegistry, DecodeHook};

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A configuration document: a top-level `plugins` list of untyped maps.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginDocument {
    /// The raw plugin configurations, in declaration order.
    #[serde(default)]
    pub plugins: Vec<Value>,
}

/// Deserializes an `output` field given as a single id, a list of ids, or null.
///
/// # Errors
///
/// Fails if the value is not a string, a list of strings, or null.
pub fn deserialize_outputs<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(id)) => vec![id],
        Some(OneOrMany::Many(ids)) => ids,
    })
}

/// Deserializes `value` into `T`, rejecting every field `T` does not read.
///
/// Applies whether or not `T` denies unknown fields itself, including
/// inside nested structs.
///
/// # Errors
///
/// Fails on schema mismatches and on any unrecognized field.
pub fn from_value_strict<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    let mut ignored = Vec::new();
    let decoded = serde_ignored::deserialize(value, |path| ignored.push(path.to_string()))?;
    if ignored.is_empty() {
        Ok(decoded)
    } else {
        Err(serde_json::Error::custom(format!(
            "unknown field(s): {}",
            ignored.join(", ")
        )))
    }
}

/// Names the JSON kind of a value for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}
