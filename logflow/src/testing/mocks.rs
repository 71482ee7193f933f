//! Mock plugins for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::deserialize_outputs;
use crate::entry::{Entry, Field};
use crate::errors::PluginError;
use crate::plugin::{BuildContext, OutputSlot, Plugin, PluginIdentity, PluginSpec};

/// A shared log of lifecycle events and received records.
///
/// Clones share the same log, so a journal handed to several plugins shows
/// their interleaving.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    inner: Arc<Mutex<JournalInner>>,
}

#[derive(Debug, Default)]
struct JournalInner {
    events: Vec<String>,
    records: BTreeMap<String, Vec<Value>>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event such as `start:in`.
    pub fn event(&self, event: impl Into<String>) {
        self.inner.lock().events.push(event.into());
    }

    /// Returns every event in order.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.inner.lock().events.clone()
    }

    /// Records a received entry for a plugin.
    pub fn record(&self, plugin_id: &str, record: Value) {
        self.inner
            .lock()
            .records
            .entry(plugin_id.to_string())
            .or_default()
            .push(record);
    }

    /// Returns the records received by a plugin.
    #[must_use]
    pub fn records(&self, plugin_id: &str) -> Vec<Value> {
        self.inner
            .lock()
            .records
            .get(plugin_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Clears events and records.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.events.clear();
        inner.records.clear();
    }
}

/// A plugin that records its lifecycle and received entries into a
/// [`Journal`] and can be told to fail.
#[derive(Debug)]
pub struct RecordingPlugin {
    identity: PluginIdentity,
    journal: Journal,
    can_process: bool,
    can_output: bool,
    fail_start: bool,
    fail_stop: bool,
    fail_process: bool,
    start_delay: Option<Duration>,
    set: Option<(Field, Value)>,
    outputs: OutputSlot,
}

impl RecordingPlugin {
    /// Creates a plugin that both processes and outputs entries.
    #[must_use]
    pub fn new(identity: PluginIdentity, journal: Journal) -> Self {
        Self {
            identity,
            journal,
            can_process: true,
            can_output: true,
            fail_start: false,
            fail_stop: false,
            fail_process: false,
            start_delay: None,
            set: None,
            outputs: OutputSlot::new(),
        }
    }

    /// Creates a terminal plugin.
    #[must_use]
    pub fn sink(id: &str, journal: Journal) -> Self {
        Self {
            can_output: false,
            ..Self::new(PluginIdentity::new(id, "mock"), journal)
        }
    }

    /// Creates a plugin that only outputs entries.
    #[must_use]
    pub fn producer(id: &str, journal: Journal) -> Self {
        Self {
            can_process: false,
            ..Self::new(PluginIdentity::new(id, "mock"), journal)
        }
    }

    /// Makes `start` fail.
    #[must_use]
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Makes `stop` fail.
    #[must_use]
    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Makes `process` fail.
    #[must_use]
    pub fn failing_process(mut self) -> Self {
        self.fail_process = true;
        self
    }

    /// Delays `start`.
    #[must_use]
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// Sets `field` to `value` on every entry before emitting it.
    #[must_use]
    pub fn with_set(mut self, field: Field, value: Value) -> Self {
        self.set = Some((field, value));
        self
    }

    /// Emits an entry to the outputs, as a producer would.
    ///
    /// # Errors
    ///
    /// Propagates downstream failures.
    pub async fn emit(&self, entry: Entry) -> Result<(), PluginError> {
        self.outputs.emit(entry).await
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    fn id(&self) -> &str {
        self.identity.id()
    }

    fn plugin_type(&self) -> &str {
        self.identity.plugin_type()
    }

    async fn start(&self) -> Result<(), PluginError> {
        self.journal.event(format!("start:{}", self.id()));
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_start {
            return Err(PluginError::Start(format!("{} refused to start", self.id())));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), PluginError> {
        self.journal.event(format!("stop:{}", self.id()));
        if self.fail_stop {
            return Err(PluginError::Stop(format!("{} refused to stop", self.id())));
        }
        Ok(())
    }

    fn can_output(&self) -> bool {
        self.can_output
    }

    fn outputs(&self) -> Vec<Arc<dyn Plugin>> {
        self.outputs.targets()
    }

    fn set_outputs(&self, outputs: Vec<Arc<dyn Plugin>>) -> Result<(), PluginError> {
        if !self.can_output {
            return Err(PluginError::NotAnOutputter {
                plugin_id: self.id().to_string(),
            });
        }
        self.outputs.set(self.id(), outputs)
    }

    fn can_process(&self) -> bool {
        self.can_process
    }

    async fn process(&self, mut entry: Entry) -> Result<(), PluginError> {
        if !self.can_process {
            return Err(PluginError::NotProcessable {
                plugin_id: self.id().to_string(),
            });
        }
        self.journal.record(self.id(), entry.record.clone());
        if self.fail_process {
            return Err(PluginError::Process(format!("{} rejected the entry", self.id())));
        }
        if let Some((field, value)) = &self.set {
            entry.set(field, value.clone())?;
        }
        self.outputs.emit(entry).await
    }
}

fn default_true() -> bool {
    true
}

/// Configuration of the `mock` plugin type.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockConfig {
    /// Plugin id.
    pub id: String,
    /// Downstream plugin ids.
    #[serde(default, deserialize_with = "deserialize_outputs")]
    pub output: Vec<String>,
    /// Whether the plugin accepts entries.
    #[serde(default = "default_true")]
    pub can_process: bool,
    /// Whether the plugin emits entries.
    #[serde(default = "default_true")]
    pub can_output: bool,
    /// Fail while building.
    #[serde(default)]
    pub fail_build: bool,
    /// Fail in `start`.
    #[serde(default)]
    pub fail_start: bool,
    /// Fail in `stop`.
    #[serde(default)]
    pub fail_stop: bool,
    /// Fail in `process`.
    #[serde(default)]
    pub fail_process: bool,
    /// Delay `start` by this many milliseconds.
    #[serde(default)]
    pub start_delay_ms: u64,
    /// Field to set on every processed entry.
    #[serde(default)]
    pub set: Option<Field>,
    /// Value written to `set`.
    #[serde(default)]
    pub value: Value,
    /// Journal the built plugin records into.
    #[serde(skip)]
    pub journal: Journal,
}

impl PluginSpec for MockConfig {
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
        if self.fail_build {
            return Err(PluginError::InvalidConfig(format!(
                "mock '{}' refused to build",
                self.id
            )));
        }

        let mut plugin = RecordingPlugin::new(identity, self.journal.clone());
        plugin.can_process = self.can_process;
        plugin.can_output = self.can_output;
        plugin.fail_start = self.fail_start;
        plugin.fail_stop = self.fail_stop;
        plugin.fail_process = self.fail_process;
        if self.start_delay_ms > 0 {
            plugin.start_delay = Some(Duration::from_millis(self.start_delay_ms));
        }
        if let Some(field) = &self.set {
            plugin.set = Some((field.clone(), self.value.clone()));
        }
        Ok(Arc::new(plugin))
    }
}
