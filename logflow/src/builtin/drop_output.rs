//! The `drop_output` plugin: a terminal that discards entries.

use crate::entry::Entry;
use crate::errors::PluginError;
use crate::plugin::{BuildContext, Plugin, PluginIdentity, PluginSpec};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Configuration of the `drop_output` plugin type.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropOutputConfig {
    /// Plugin id.
    pub id: String,
}

impl PluginSpec for DropOutputConfig {
    fn id(&self) -> &str {
        &self.id
    }

    fn build(
        &self,
        identity: PluginIdentity,
        _ctx: &BuildContext,
    ) -> Result<Arc<dyn Plugin>, PluginError> {
        Ok(Arc::new(DropOutput {
            identity,
            dropped: AtomicU64::new(0),
        }))
    }
}

/// Discards every entry it receives.
#[derive(Debug)]
pub struct DropOutput {
    identity: PluginIdentity,
    dropped: AtomicU64,
}

impl DropOutput {
    /// Returns how many entries were discarded.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Plugin for DropOutput {
    fn id(&self) -> &str {
        self.identity.id()
    }

    fn plugin_type(&self) -> &str {
        self.identity.plugin_type()
    }

    fn can_process(&self) -> bool {
        true
    }

    async fn process(&self, entry: Entry) -> Result<(), PluginError> {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(plugin_id = self.id(), dropped, timestamp = %entry.timestamp, "dropped entry");
        Ok(())
    }
}
