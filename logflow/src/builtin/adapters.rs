//! Adapters bridging a bundle's inner graph to the outside.
//!
//! `bundle_input` receives whatever is sent to the bundle and re-emits it
//! into the inner graph. `bundle_output` receives from the inner graph and
//! forwards to whatever the bundle is wired to. Both only build inside a
//! bundle.

use super::bundle::Bundle;
use crate::config::deserialize_outputs;
use crate::entry::Entry;
use crate::errors::{BundleError, PluginError};
use crate::plugin::{BuildContext, OutputSlot, Plugin, PluginIdentity, PluginSpec};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, OnceLock, Weak};

/// Plugin type of the input adapter.
pub const BUNDLE_INPUT_TYPE: &str = "bundle_input";
/// Plugin type of the output adapter.
pub const BUNDLE_OUTPUT_TYPE: &str = "bundle_output";

/// Configuration of the `bundle_input` plugin type.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleInputConfig {
    /// Plugin id.
    pub id: String,
    /// Inner plugins that receive the bundle's entries.
    #[serde(default, deserialize_with = "deserialize_outputs")]
    pub output: Vec<String>,
}

impl PluginSpec for BundleInputConfig {
    fn id(&self) -> &str {
        &self.id
    }

    fn outputs(&self) -> &[String] {
        &self.output
    }

    fn build(
        &self,
        identity: PluginIdentity,
        ctx: &BuildContext,
    ) -> Result<Arc<dyn Plugin>, PluginError> {
        let adapters = ctx.adapters().ok_or_else(|| BundleError::AdapterOutsideBundle {
            plugin_type: identity.plugin_type().to_string(),
        })?;
        let adapter = Arc::new(BundleInput {
            identity,
            outputs: OutputSlot::new(),
        });
        adapters.register_input(Arc::clone(&adapter));
        Ok(adapter)
    }
}

/// Entry point of a bundle's inner graph.
#[derive(Debug)]
pub struct BundleInput {
    identity: PluginIdentity,
    outputs: OutputSlot,
}

#[async_trait]
impl Plugin for BundleInput {
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

/// Configuration of the `bundle_output` plugin type.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleOutputConfig {
    /// Plugin id.
    pub id: String,
}

impl PluginSpec for BundleOutputConfig {
    fn id(&self) -> &str {
        &self.id
    }

    fn build(
        &self,
        identity: PluginIdentity,
        ctx: &BuildContext,
    ) -> Result<Arc<dyn Plugin>, PluginError> {
        let adapters = ctx.adapters().ok_or_else(|| BundleError::AdapterOutsideBundle {
            plugin_type: identity.plugin_type().to_string(),
        })?;
        let adapter = Arc::new(BundleOutput {
            identity,
            bundle: OnceLock::new(),
        });
        adapters.register_output(Arc::clone(&adapter));
        Ok(adapter)
    }
}

/// Exit point of a bundle's inner graph.
///
/// Holds a non-owning reference to its bundle, attached once the bundle
/// exists.
#[derive(Debug)]
pub struct BundleOutput {
    identity: PluginIdentity,
    bundle: OnceLock<Weak<Bundle>>,
}

impl BundleOutput {
    /// Attaches the owning bundle. Later calls are ignored.
    pub(crate) fn attach(&self, bundle: Weak<Bundle>) {
        let _ = self.bundle.set(bundle);
    }
}

#[async_trait]
impl Plugin for BundleOutput {
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
        let bundle = self
            .bundle
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| BundleError::Detached {
                plugin_id: self.id().to_string(),
            })?;
        bundle.emit(entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build_context, Journal};

    #[test]
    fn test_adapters_rejected_at_top_level() {
        let ctx = build_context(&Journal::new()).unwrap();

        let input = BundleInputConfig {
            id: "in".to_string(),
            output: Vec::new(),
        };
        let err = input
            .build(PluginIdentity::new("in", BUNDLE_INPUT_TYPE), &ctx)
            .unwrap_err();
        assert!(err.to_string().contains("can only be used inside a bundle"));

        let output = BundleOutputConfig {
            id: "out".to_string(),
        };
        assert!(output
            .build(PluginIdentity::new("out", BUNDLE_OUTPUT_TYPE), &ctx)
            .is_err());
    }

    #[test]
    fn test_adapters_register_when_nested() {
        let ctx = build_context(&Journal::new())
            .unwrap()
            .enter_bundle("b", "simple")
            .unwrap();

        let output = BundleOutputConfig {
            id: "out".to_string(),
        };
        let plugin = output
            .build(PluginIdentity::new("out", BUNDLE_OUTPUT_TYPE), &ctx)
            .unwrap();
        assert!(plugin.can_process());
        assert!(!plugin.can_output());
        assert_eq!(ctx.adapters().unwrap().outputs().len(), 1);
    }

    #[tokio::test]
    async fn test_detached_output_fails() {
        let adapter = BundleOutput {
            identity: PluginIdentity::new("out", BUNDLE_OUTPUT_TYPE),
            bundle: OnceLock::new(),
        };
        let err = adapter.process(Entry::new()).await.unwrap_err();
        assert!(err.to_string().contains("not attached"));
    }
}
