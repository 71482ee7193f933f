//! Set-once output wiring shared by every plugin that emits entries.

use super::Plugin;
use crate::entry::Entry;
use crate::errors::PluginError;
use futures::future::join_all;
use std::sync::{Arc, OnceLock};

/// The downstream targets of an outputting plugin.
///
/// Targets are set exactly once during wiring. Emitting before wiring, or
/// with no targets, silently drops the entry.
#[derive(Debug, Default)]
pub struct OutputSlot {
    targets: OnceLock<Vec<Arc<dyn Plugin>>>,
}

impl OutputSlot {
    /// Creates an unwired slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the targets on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// Fails with `TargetCannotProcess` if any target does not accept
    /// entries, and with `OutputsAlreadySet` on a second call.
    pub fn set(&self, owner: &str, targets: Vec<Arc<dyn Plugin>>) -> Result<(), PluginError> {
        if let Some(target) = targets.iter().find(|t| !t.can_process()) {
            return Err(PluginError::TargetCannotProcess {
                target_id: target.id().to_string(),
            });
        }
        self.targets
            .set(targets)
            .map_err(|_| PluginError::OutputsAlreadySet {
                plugin_id: owner.to_string(),
            })
    }

    /// Returns the wired targets.
    #[must_use]
    pub fn targets(&self) -> Vec<Arc<dyn Plugin>> {
        self.targets.get().cloned().unwrap_or_default()
    }

    /// Returns true once targets have been set.
    #[must_use]
    pub fn is_wired(&self) -> bool {
        self.targets.get().is_some()
    }

    /// Delivers `entry` to every target and waits for all of them.
    ///
    /// With several targets each receives its own clone and deliveries run
    /// concurrently.
    ///
    /// # Errors
    ///
    /// Returns the target's error when exactly one delivery fails, otherwise
    /// a `Process` error listing every failure.
    pub async fn emit(&self, entry: Entry) -> Result<(), PluginError> {
        let targets = match self.targets.get() {
            Some(targets) if !targets.is_empty() => targets,
            _ => return Ok(()),
        };

        if let [target] = targets.as_slice() {
            return target.process(entry).await;
        }

        let results = join_all(targets.iter().map(|target| {
            let entry = entry.clone();
            async move { (target.id(), target.process(entry).await) }
        }))
        .await;

        let mut failures: Vec<(&str, PluginError)> = results
            .into_iter()
            .filter_map(|(id, result)| result.err().map(|err| (id, err)))
            .collect();

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0).1),
            _ => Err(PluginError::Process(
                failures
                    .iter()
                    .map(|(id, err)| format!("'{id}': {err}"))
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Journal, RecordingPlugin};
    use serde_json::json;

    fn sink(id: &str, journal: &Journal) -> Arc<dyn Plugin> {
        Arc::new(RecordingPlugin::sink(id, journal.clone()))
    }

    #[tokio::test]
    async fn test_emit_fans_out_to_every_target() {
        let journal = Journal::new();
        let slot = OutputSlot::new();
        slot.set("src", vec![sink("a", &journal), sink("b", &journal)])
            .unwrap();

        slot.emit(Entry::with_record(json!({"n": 1}))).await.unwrap();

        assert_eq!(journal.records("a"), vec![json!({"n": 1})]);
        assert_eq!(journal.records("b"), vec![json!({"n": 1})]);
    }

    #[tokio::test]
    async fn test_emit_without_targets_drops() {
        let slot = OutputSlot::new();
        slot.emit(Entry::new()).await.unwrap();
        assert!(!slot.is_wired());
    }

    #[test]
    fn test_set_twice_fails() {
        let journal = Journal::new();
        let slot = OutputSlot::new();
        slot.set("src", vec![sink("a", &journal)]).unwrap();

        let err = slot.set("src", vec![sink("b", &journal)]).unwrap_err();
        assert!(matches!(err, PluginError::OutputsAlreadySet { plugin_id } if plugin_id == "src"));
        assert_eq!(slot.targets().len(), 1);
    }

    #[test]
    fn test_set_rejects_non_processing_target() {
        let journal = Journal::new();
        let producer: Arc<dyn Plugin> = Arc::new(RecordingPlugin::producer("p", journal));
        let slot = OutputSlot::new();

        let err = slot.set("src", vec![producer]).unwrap_err();
        assert!(err.to_string().contains("target cannot receive entries"));
        assert!(!slot.is_wired());
    }
}
