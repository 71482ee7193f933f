//! The plugin contract.
//!
//! A [`Plugin`] is a live pipeline stage. It is produced from a
//! [`PluginConfig`], which pairs the type discriminator a configuration was
//! decoded as with the type-specific [`PluginSpec`].

mod context;
mod output;

pub use context::{AdapterSet, BuildContext, DEFAULT_MAX_BUNDLE_DEPTH};
pub use output::OutputSlot;

use crate::entry::Entry;
use crate::errors::{BuildError, PluginError};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Trait for pipeline stages.
///
/// Capabilities are explicit predicates: a plugin that can output entries
/// returns `true` from [`can_output`](Plugin::can_output) and accepts a list
/// of targets exactly once through [`set_outputs`](Plugin::set_outputs); a
/// plugin that accepts entries returns `true` from
/// [`can_process`](Plugin::can_process).
///
/// `process` may be called concurrently by several upstream producers, so
/// implementations must be internally synchronized.
#[async_trait]
pub trait Plugin: Send + Sync + Debug {
    /// Returns the plugin id.
    fn id(&self) -> &str;

    /// Returns the plugin type.
    fn plugin_type(&self) -> &str;

    /// Starts the plugin.
    async fn start(&self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Stops the plugin.
    async fn stop(&self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Whether the plugin emits entries to outputs.
    fn can_output(&self) -> bool {
        false
    }

    /// Returns the connected outputs.
    fn outputs(&self) -> Vec<Arc<dyn Plugin>> {
        Vec::new()
    }

    /// Connects the plugin to its outputs.
    ///
    /// # Errors
    ///
    /// Fails if the plugin cannot output, if the outputs were already set, or
    /// if any target cannot process entries.
    fn set_outputs(&self, outputs: Vec<Arc<dyn Plugin>>) -> Result<(), PluginError> {
        if outputs.is_empty() {
            Ok(())
        } else {
            Err(PluginError::NotAnOutputter {
                plugin_id: self.id().to_string(),
            })
        }
    }

    /// Whether the plugin accepts entries.
    fn can_process(&self) -> bool {
        false
    }

    /// Processes an entry.
    async fn process(&self, entry: Entry) -> Result<(), PluginError> {
        drop(entry);
        Err(PluginError::NotProcessable {
            plugin_id: self.id().to_string(),
        })
    }
}

/// Identity shared by every built plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginIdentity {
    id: String,
    plugin_type: String,
}

impl PluginIdentity {
    /// Creates a new identity.
    #[must_use]
    pub fn new(id: impl Into<String>, plugin_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plugin_type: plugin_type.into(),
        }
    }

    /// Returns the plugin id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the plugin type.
    #[must_use]
    pub fn plugin_type(&self) -> &str {
        &self.plugin_type
    }
}

/// Type-specific configuration of a plugin.
///
/// Implementations are decoded strictly from the untyped configuration map
/// (minus the `type` discriminator) and know how to build their plugin.
pub trait PluginSpec: Send + Sync + Debug {
    /// Returns the configured id.
    fn id(&self) -> &str;

    /// Returns the ids of the downstream plugins.
    fn outputs(&self) -> &[String] {
        &[]
    }

    /// Builds the plugin.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be turned into a plugin.
    fn build(
        &self,
        identity: PluginIdentity,
        ctx: &BuildContext,
    ) -> Result<Arc<dyn Plugin>, PluginError>;
}

/// A decoded plugin configuration, tagged with its type.
#[derive(Debug)]
pub struct PluginConfig {
    plugin_type: String,
    spec: Box<dyn PluginSpec>,
}

impl PluginConfig {
    /// Creates a new tagged configuration.
    #[must_use]
    pub fn new(plugin_type: impl Into<String>, spec: Box<dyn PluginSpec>) -> Self {
        Self {
            plugin_type: plugin_type.into(),
            spec,
        }
    }

    /// Returns the plugin id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.spec.id()
    }

    /// Returns the plugin type.
    #[must_use]
    pub fn plugin_type(&self) -> &str {
        &self.plugin_type
    }

    /// Returns the ids of the downstream plugins.
    #[must_use]
    pub fn outputs(&self) -> &[String] {
        self.spec.outputs()
    }

    /// Returns the type-specific configuration.
    #[must_use]
    pub fn spec(&self) -> &dyn PluginSpec {
        self.spec.as_ref()
    }

    /// Builds the plugin, tagging failures with the plugin id and type.
    ///
    /// # Errors
    ///
    /// Returns `BuildError` wrapping the type-specific failure.
    pub fn build(&self, ctx: &BuildContext) -> Result<Arc<dyn Plugin>, BuildError> {
        let identity = PluginIdentity::new(self.id(), &self.plugin_type);
        self.spec.build(identity, ctx).map_err(|source| BuildError {
            plugin_id: self.id().to_string(),
            plugin_type: self.plugin_type.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_accessors() {
        let identity = PluginIdentity::new("parser", "noop");
        assert_eq!(identity.id(), "parser");
        assert_eq!(identity.plugin_type(), "noop");
    }
}
