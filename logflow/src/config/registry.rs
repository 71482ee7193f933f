//! Registry of plugin configuration types.

use super::{from_value_strict, value_kind, PluginDocument};
use crate::errors::DecodeError;
use crate::plugin::{PluginConfig, PluginSpec};
use figment::providers::{Format, Yaml};
use figment::Figment;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// A rewrite applied to a raw configuration map before strict decoding.
///
/// Hooks see the map without its `type` field and may rename, convert or
/// default fields. An `Err` fails the decode with the returned message.
pub type DecodeHook = Box<dyn Fn(&mut Map<String, Value>) -> Result<(), String> + Send + Sync>;

type DecodeFn =
    Box<dyn Fn(Value) -> Result<Box<dyn PluginSpec>, serde_json::Error> + Send + Sync>;

struct Registration {
    decode: DecodeFn,
    hooks: Vec<DecodeHook>,
}

/// Maps plugin type discriminators to their configuration schemas.
///
/// Populate the registry once at startup, then share it (typically behind an
/// `Arc`) for every decode, including the nested documents rendered by
/// bundles.
#[derive(Default)]
pub struct ConfigRegistry {
    registrations: BTreeMap<String, Registration>,
}

impl ConfigRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in plugin type registered.
    ///
    /// # Errors
    ///
    /// Propagates registration failures.
    pub fn with_builtins() -> Result<Self, DecodeError> {
        let mut registry = Self::new();
        crate::builtin::register_builtins(&mut registry)?;
        Ok(registry)
    }

    /// Registers `T` as the schema for `plugin_type`.
    ///
    /// Fields `T` does not read are rejected even if `T` does not deny
    /// unknown fields.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateRegistration` if the type is already registered.
    pub fn register<T>(&mut self, plugin_type: impl Into<String>) -> Result<(), DecodeError>
    where
        T: PluginSpec + DeserializeOwned + 'static,
    {
        self.register_fn(plugin_type, |value| {
            from_value_strict::<T>(value).map(|spec| Box::new(spec) as Box<dyn PluginSpec>)
        })
    }

    /// Registers `T` together with a decode hook.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateRegistration` if the type is already registered.
    pub fn register_with_hook<T, H>(
        &mut self,
        plugin_type: impl Into<String>,
        hook: H,
    ) -> Result<(), DecodeError>
    where
        T: PluginSpec + DeserializeOwned + 'static,
        H: Fn(&mut Map<String, Value>) -> Result<(), String> + Send + Sync + 'static,
    {
        let plugin_type = plugin_type.into();
        self.register::<T>(plugin_type.clone())?;
        self.add_hook(&plugin_type, hook)
    }

    /// Registers a custom decode function for `plugin_type`.
    ///
    /// Useful when the decoded spec needs state that is not part of the
    /// configuration itself. `decode` should go through
    /// [`from_value_strict`](super::from_value_strict) to keep rejecting
    /// unknown fields.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateRegistration` if the type is already registered.
    pub fn register_fn<F>(&mut self, plugin_type: impl Into<String>, decode: F) -> Result<(), DecodeError>
    where
        F: Fn(Value) -> Result<Box<dyn PluginSpec>, serde_json::Error> + Send + Sync + 'static,
    {
        let plugin_type = plugin_type.into();
        if self.registrations.contains_key(&plugin_type) {
            return Err(DecodeError::DuplicateRegistration { plugin_type });
        }
        debug!(plugin_type = %plugin_type, "registered plugin type");
        self.registrations.insert(
            plugin_type,
            Registration {
                decode: Box::new(decode),
                hooks: Vec::new(),
            },
        );
        Ok(())
    }

    /// Appends a decode hook to an already registered type.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if the type is not registered.
    pub fn add_hook<H>(&mut self, plugin_type: &str, hook: H) -> Result<(), DecodeError>
    where
        H: Fn(&mut Map<String, Value>) -> Result<(), String> + Send + Sync + 'static,
    {
        let registration =
            self.registrations
                .get_mut(plugin_type)
                .ok_or_else(|| DecodeError::UnknownType {
                    plugin_id: None,
                    plugin_type: plugin_type.to_string(),
                })?;
        registration.hooks.push(Box::new(hook));
        Ok(())
    }

    /// Returns true if `plugin_type` is registered.
    #[must_use]
    pub fn contains(&self, plugin_type: &str) -> bool {
        self.registrations.contains_key(plugin_type)
    }

    /// Returns the registered types in sorted order.
    #[must_use]
    pub fn registered_types(&self) -> Vec<&str> {
        self.registrations.keys().map(String::as_str).collect()
    }

    /// Decodes one untyped configuration map.
    ///
    /// # Errors
    ///
    /// Fails if the value is not a map, if `type` is missing or not a string,
    /// if the type is unknown, or if the remaining fields do not match the
    /// type's schema (including unrecognized fields).
    pub fn decode(&self, raw: Value) -> Result<PluginConfig, DecodeError> {
        let mut map = match raw {
            Value::Object(map) => map,
            other => {
                return Err(DecodeError::NotAMap {
                    found: value_kind(&other),
                })
            }
        };
        let plugin_id = map.get("id").and_then(Value::as_str).map(str::to_string);

        let plugin_type = match map.remove("type") {
            None => return Err(DecodeError::MissingType { plugin_id }),
            Some(Value::String(plugin_type)) => plugin_type,
            Some(other) => {
                return Err(DecodeError::InvalidType {
                    plugin_id,
                    found: value_kind(&other),
                })
            }
        };

        let Some(registration) = self.registrations.get(&plugin_type) else {
            return Err(DecodeError::UnknownType {
                plugin_id,
                plugin_type,
            });
        };

        for hook in &registration.hooks {
            if let Err(message) = hook(&mut map) {
                return Err(DecodeError::Invalid {
                    plugin_id,
                    plugin_type,
                    message,
                });
            }
        }

        match (registration.decode)(Value::Object(map)) {
            Ok(spec) => {
                debug!(plugin_id = spec.id(), plugin_type = %plugin_type, "decoded plugin config");
                Ok(PluginConfig::new(plugin_type, spec))
            }
            Err(err) => Err(DecodeError::Invalid {
                plugin_id,
                plugin_type,
                message: err.to_string(),
            }),
        }
    }

    /// Decodes a list of untyped configurations, preserving order.
    ///
    /// # Errors
    ///
    /// Returns the first failure wrapped with its list index.
    pub fn decode_all(&self, raws: Vec<Value>) -> Result<Vec<PluginConfig>, DecodeError> {
        raws.into_iter()
            .enumerate()
            .map(|(index, raw)| {
                self.decode(raw).map_err(|err| DecodeError::AtIndex {
                    index,
                    source: Box::new(err),
                })
            })
            .collect()
    }

    /// Parses a YAML document with a top-level `plugins` list and decodes it.
    ///
    /// # Errors
    ///
    /// Returns `Document` if the text is not a valid document, otherwise the
    /// first decode failure.
    pub fn decode_document(&self, text: &str) -> Result<Vec<PluginConfig>, DecodeError> {
        let document: PluginDocument = Figment::from(Yaml::string(text))
            .extract()
            .map_err(|err| DecodeError::Document {
                message: err.to_string(),
            })?;
        self.decode_all(document.plugins)
    }
}

impl fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}
