//! The `noop` plugin: forwards entries unchanged.

use crate::config::deserialize_outputs;
use crate::entry::Entry;
use crate::errors::PluginError;
use crate::plugin::{BuildContext, OutputSlot, Plugin, PluginIdentity, PluginSpec};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Configuration of the `noop` plugin type.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoopConfig {
    /// Plugin id.
    pub id: String,
    /// Downstream plugin ids.
    #[serde(default, deserialize_with = "deserialize_outputs")]
    pub output: Vec<String>,
}

impl PluginSpec for NoopConfig {
    fn id(&self) -> &str {
        &self.id
    }

    fn outputs(&self) -> &[String] {
        &self.output
    }

    fn build(
        &self,
        identity: PluginIdentity,
        _ctx: &BuildContext,
    ) -> Result<Arc<dyn Plugin>, PluginError> {
        Ok(Arc::new(Noop {
            identity,
            outputs: OutputSlot::new(),
        }))
    }
}

/// Forwards every entry to its outputs.
#[derive(Debug)]
pub struct Noop {
    identity: PluginIdentity,
    outputs: OutputSlot,
}

#[async_trait]
impl Plugin for Noop {
    fn id(&self) -> &str {
        self.identity.id()
    }

    fn plugin_type(&self) -> &str {
        self.identity.plugin_type()
    }

    fn can_output(&self) -> bool {
        true
    }

    fn outputs(&self) -> Vec<Arc<dyn Plugin>> {
        self.outputs.targets()
    }

    fn set_outputs(&self, outputs: Vec<Arc<dyn Plugin>>) -> Result<(), PluginError> {
        self.outputs.set(self.id(), outputs)
    }

    fn can_process(&self) -> bool {
        true
    }

    async fn process(&self, entry: Entry) -> Result<(), PluginError> {
        self.outputs.emit(entry).await
    }
}
