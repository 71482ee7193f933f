//! The `generate_input` plugin: emits a fixed record.
//!
//! The number of entries emitted so far is kept in the persistent store under
//! the plugin id, so a bounded generator resumes where it left off instead of
//! starting over.

use crate::config::deserialize_outputs;
use crate::entry::Entry;
use crate::errors::{PluginError, StoreError};
use crate::lifecycle::CancellationToken;
use crate::plugin::{BuildContext, OutputSlot, Plugin, PluginIdentity, PluginSpec};
use crate::store::PersistentStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument, Span};

const EMITTED_KEY: &str = "emitted";

/// Configuration of the `generate_input` plugin type.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateConfig {
    /// Plugin id.
    pub id: String,
    /// Downstream plugin ids.
    #[serde(default, deserialize_with = "deserialize_outputs")]
    pub output: Vec<String>,
    /// The record every entry carries.
    #[serde(default)]
    pub record: Value,
    /// Total entries to emit; unbounded when absent.
    #[serde(default)]
    pub count: Option<u64>,
    /// Pause between entries in milliseconds.
    #[serde(default)]
    pub interval_ms: u64,
}

impl PluginSpec for GenerateConfig {
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
        Ok(Arc::new(GenerateInput {
            shared: Arc::new(Shared {
                identity,
                record: self.record.clone(),
                count: self.count,
                interval: Duration::from_millis(self.interval_ms),
                outputs: OutputSlot::new(),
                store: ctx.store(),
            }),
            span: ctx.span().clone(),
            running: Mutex::new(None),
        }))
    }
}

#[derive(Debug)]
struct Shared {
    identity: PluginIdentity,
    record: Value,
    count: Option<u64>,
    interval: Duration,
    outputs: OutputSlot,
    store: Arc<dyn PersistentStore>,
}

impl Shared {
    fn emitted(&self) -> Result<u64, StoreError> {
        let bucket = self.identity.id();
        let Some(bytes) = self.store.get(bucket, EMITTED_KEY)? else {
            return Ok(0);
        };
        std::str::from_utf8(&bytes)
            .ok()
            .and_then(|text| text.parse().ok())
            .ok_or_else(|| StoreError::Corrupt {
                bucket: bucket.to_string(),
                key: EMITTED_KEY.to_string(),
                message: "expected a decimal count".to_string(),
            })
    }

    async fn run(self: Arc<Self>, token: Arc<CancellationToken>, mut emitted: u64) {
        let id = self.identity.id();
        while !token.is_cancelled() && self.count.map_or(true, |limit| emitted < limit) {
            if let Err(err) = self.outputs.emit(Entry::with_record(self.record.clone())).await {
                warn!(plugin_id = id, error = %err, "failed to deliver generated entry");
            }
            emitted += 1;
            if let Err(err) = self
                .store
                .put(id, EMITTED_KEY, emitted.to_string().into_bytes())
            {
                warn!(plugin_id = id, error = %err, "failed to persist emitted count");
            }

            if self.interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(self.interval) => {}
                }
            }
        }
        debug!(plugin_id = id, emitted, "generator finished");
    }
}

/// Emits copies of a configured record until stopped or exhausted.
#[derive(Debug)]
pub struct GenerateInput {
    shared: Arc<Shared>,
    span: Span,
    running: Mutex<Option<(Arc<CancellationToken>, JoinHandle<()>)>>,
}

impl GenerateInput {
    /// Returns how many entries this generator has emitted, across restarts.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or `Corrupt` if the stored count is invalid.
    pub fn emitted(&self) -> Result<u64, StoreError> {
        self.shared.emitted()
    }
}

#[async_trait]
impl Plugin for GenerateInput {
    fn id(&self) -> &str {
        self.shared.identity.id()
    }

    fn plugin_type(&self) -> &str {
        self.shared.identity.plugin_type()
    }

    async fn start(&self) -> Result<(), PluginError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }

        let emitted = self.shared.emitted()?;
        let token = Arc::new(CancellationToken::new());
        let task = Arc::clone(&self.shared)
            .run(Arc::clone(&token), emitted)
            .instrument(self.span.clone());
        *running = Some((token, tokio::spawn(task)));
        debug!(plugin_id = self.id(), resume_from = emitted, "generator started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), PluginError> {
        let Some((token, handle)) = self.running.lock().take() else {
            return Ok(());
        };
        token.cancel("generator stopped");
        handle
            .await
            .map_err(|err| PluginError::Stop(format!("generator task failed: {err}")))
    }

    fn can_output(&self) -> bool {
        true
    }

    fn outputs(&self) -> Vec<Arc<dyn Plugin>> {
        self.shared.outputs.targets()
    }

    fn set_outputs(&self, outputs: Vec<Arc<dyn Plugin>>) -> Result<(), PluginError> {
        self.shared.outputs.set(self.id(), outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::testing::{build_context, Journal, RecordingPlugin};
    use serde_json::json;

    fn generator(config: Value, ctx: &BuildContext) -> Arc<dyn Plugin> {
        let config: GenerateConfig = serde_json::from_value(config).unwrap();
        config
            .build(PluginIdentity::new(config.id.clone(), "generate_input"), ctx)
            .unwrap()
    }

    async fn wait_for(journal: &Journal, id: &str, n: usize) {
        for _ in 0..200 {
            if journal.records(id).len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{id} never received {n} records");
    }

    #[tokio::test]
    async fn test_bounded_generator_emits_count() {
        let journal = Journal::new();
        let ctx = build_context(&journal).unwrap();
        let plugin = generator(json!({"id": "gen", "record": {"msg": "x"}, "count": 3}), &ctx);
        plugin
            .set_outputs(vec![Arc::new(RecordingPlugin::sink("out", journal.clone()))])
            .unwrap();

        plugin.start().await.unwrap();
        wait_for(&journal, "out", 3).await;
        plugin.stop().await.unwrap();

        assert_eq!(journal.records("out"), vec![json!({"msg": "x"}); 3]);
    }

    #[tokio::test]
    async fn test_generator_resumes_from_store() {
        let journal = Journal::new();
        let store = Arc::new(InMemoryStore::new());
        store.put("gen", EMITTED_KEY, b"2".to_vec()).unwrap();
        let ctx = BuildContext::new(
            Arc::new(crate::testing::mock_registry(&journal).unwrap()),
            Arc::new(crate::bundle::BundleCatalog::default()),
            store.clone(),
        );
        let plugin = generator(json!({"id": "gen", "count": 3}), &ctx);
        plugin
            .set_outputs(vec![Arc::new(RecordingPlugin::sink("out", journal.clone()))])
            .unwrap();

        plugin.start().await.unwrap();
        wait_for(&journal, "out", 1).await;
        plugin.stop().await.unwrap();

        assert_eq!(journal.records("out").len(), 1);
        assert_eq!(store.get("gen", EMITTED_KEY).unwrap(), Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn test_unbounded_generator_stops() {
        let journal = Journal::new();
        let ctx = build_context(&journal).unwrap();
        let plugin = generator(json!({"id": "gen", "interval_ms": 1}), &ctx);
        plugin
            .set_outputs(vec![Arc::new(RecordingPlugin::sink("out", journal.clone()))])
            .unwrap();

        plugin.start().await.unwrap();
        wait_for(&journal, "out", 2).await;
        plugin.stop().await.unwrap();

        let seen = journal.records("out").len();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(journal.records("out").len(), seen);
        plugin.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_count_fails_start() {
        let journal = Journal::new();
        let ctx = build_context(&journal).unwrap();
        ctx.store().put("gen", EMITTED_KEY, b"many".to_vec()).unwrap();
        let plugin = generator(json!({"id": "gen"}), &ctx);

        let err = plugin.start().await.unwrap_err();
        assert!(matches!(err, PluginError::Store(StoreError::Corrupt { .. })));
    }
}
