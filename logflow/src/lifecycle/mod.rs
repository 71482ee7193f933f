//! Start and stop orchestration across a built plugin graph.
//!
//! Plugins start in build order, so every consumer is running before the
//! producers that feed it. They stop in the reverse order, so producers stop
//! emitting before their consumers go away.

mod token;

pub use token::CancellationToken;

use crate::errors::{LifecycleError, StopFailure};
use crate::graph::PluginGraph;
use crate::plugin::Plugin;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument, Span};

/// Lifecycle state of a single plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Not started yet.
    Unstarted,
    /// `start` is in progress.
    Starting,
    /// Started successfully.
    Running,
    /// `stop` is in progress.
    Stopping,
    /// Stopped (successfully or not).
    Stopped,
    /// `start` failed.
    Failed,
}

impl PluginState {
    /// Returns the state name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrates start and stop of a plugin set.
///
/// `stop` may be called before, during or after `start`. A stop issued while
/// start is running cancels it: start rolls back whatever it started and
/// returns `Cancelled`. Once stopped, a lifecycle cannot be started again.
#[derive(Debug)]
pub struct Lifecycle {
    plugins: Vec<Arc<dyn Plugin>>,
    states: Mutex<Vec<PluginState>>,
    token: CancellationToken,
    gate: tokio::sync::Mutex<()>,
    span: Span,
}

impl Lifecycle {
    /// Creates a lifecycle over a built graph.
    #[must_use]
    pub fn new(graph: &PluginGraph) -> Self {
        Self::from_plugins(graph.plugins_in_build_order())
    }

    /// Creates a lifecycle over plugins given in start order.
    #[must_use]
    pub fn from_plugins(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        let states = Mutex::new(vec![PluginState::Unstarted; plugins.len()]);
        Self {
            plugins,
            states,
            token: CancellationToken::new(),
            gate: tokio::sync::Mutex::new(()),
            span: Span::current(),
        }
    }

    /// Sets the logging span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Returns the plugins in start order.
    #[must_use]
    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    /// Returns the state of a plugin.
    #[must_use]
    pub fn state(&self, id: &str) -> Option<PluginState> {
        let position = self.plugins.iter().position(|p| p.id() == id)?;
        Some(self.states.lock()[position])
    }

    /// Returns every plugin id with its state, in start order.
    #[must_use]
    pub fn states(&self) -> Vec<(String, PluginState)> {
        let states = self.states.lock();
        self.plugins
            .iter()
            .zip(states.iter())
            .map(|(plugin, state)| (plugin.id().to_string(), *state))
            .collect()
    }

    /// Returns true once `stop` has been requested or a start has failed.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Starts every plugin in start order.
    ///
    /// Plugins already running are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StartFailed` if a plugin fails to start, after stopping the
    /// plugins already running in reverse order. A failed start is terminal.
    /// Returns `Cancelled` if stop was requested before or during start, or
    /// if an earlier start failed.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        self.start_all().instrument(self.span.clone()).await
    }

    async fn start_all(&self) -> Result<(), LifecycleError> {
        let _gate = self.gate.lock().await;

        for (position, plugin) in self.plugins.iter().enumerate() {
            if self.token.is_cancelled() {
                return Err(self.cancelled().await);
            }
            if !self.transition(position, PluginState::Unstarted, PluginState::Starting) {
                continue;
            }

            debug!(plugin_id = plugin.id(), plugin_type = plugin.plugin_type(), "starting plugin");
            if let Err(source) = plugin.start().await {
                self.set_state(position, PluginState::Failed);
                error!(plugin_id = plugin.id(), error = %source, "plugin failed to start");
                self.token
                    .cancel(format!("plugin '{}' failed to start", plugin.id()));
                let rollback_failures = self.stop_running().await;
                return Err(LifecycleError::StartFailed {
                    plugin_id: plugin.id().to_string(),
                    source,
                    rollback_failures,
                });
            }
            self.set_state(position, PluginState::Running);
        }

        if self.token.is_cancelled() {
            return Err(self.cancelled().await);
        }
        info!(plugins = self.plugins.len(), "started plugins");
        Ok(())
    }

    /// Stops every running plugin in reverse start order.
    ///
    /// Stop is best-effort and idempotent: every running plugin is asked to
    /// stop exactly once, even if others fail.
    ///
    /// # Errors
    ///
    /// Returns `StopFailed` listing every plugin that failed to stop.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        self.stop_all().instrument(self.span.clone()).await
    }

    async fn stop_all(&self) -> Result<(), LifecycleError> {
        self.token.cancel("stop requested");
        let _gate = self.gate.lock().await;

        let failures = self.stop_running().await;
        if failures.is_empty() {
            info!(plugins = self.plugins.len(), "stopped plugins");
            Ok(())
        } else {
            Err(LifecycleError::StopFailed { failures })
        }
    }

    async fn cancelled(&self) -> LifecycleError {
        let reason = self.token.reason().unwrap_or_default();
        warn!(reason = %reason, "start cancelled, rolling back");
        LifecycleError::Cancelled {
            reason,
            rollback_failures: self.stop_running().await,
        }
    }

    async fn stop_running(&self) -> Vec<StopFailure> {
        let mut failures = Vec::new();
        for (position, plugin) in self.plugins.iter().enumerate().rev() {
            if !self.transition(position, PluginState::Running, PluginState::Stopping) {
                continue;
            }

            debug!(plugin_id = plugin.id(), "stopping plugin");
            if let Err(error) = plugin.stop().await {
                warn!(plugin_id = plugin.id(), error = %error, "plugin failed to stop");
                failures.push(StopFailure {
                    plugin_id: plugin.id().to_string(),
                    error,
                });
            }
            self.set_state(position, PluginState::Stopped);
        }
        failures
    }

    fn transition(&self, position: usize, from: PluginState, to: PluginState) -> bool {
        let mut states = self.states.lock();
        if states[position] == from {
            states[position] = to;
            true
        } else {
            false
        }
    }

    fn set_state(&self, position: usize, state: PluginState) {
        self.states.lock()[position] = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Journal, RecordingPlugin};
    use std::time::Duration;

    fn sink(id: &str, journal: &Journal) -> Arc<dyn Plugin> {
        Arc::new(RecordingPlugin::sink(id, journal.clone()))
    }

    #[tokio::test]
    async fn test_start_and_stop_order() {
        let journal = Journal::new();
        let lifecycle = Lifecycle::from_plugins(vec![
            sink("out", &journal),
            sink("transform", &journal),
            sink("in", &journal),
        ]);

        lifecycle.start().await.unwrap();
        lifecycle.stop().await.unwrap();

        assert_eq!(
            journal.events(),
            vec![
                "start:out",
                "start:transform",
                "start:in",
                "stop:in",
                "stop:transform",
                "stop:out",
            ]
        );
        assert!(lifecycle
            .states()
            .iter()
            .all(|(_, state)| *state == PluginState::Stopped));
    }

    #[tokio::test]
    async fn test_start_failure_rolls_back() {
        let journal = Journal::new();
        let lifecycle = Lifecycle::from_plugins(vec![
            sink("a", &journal),
            sink("b", &journal),
            Arc::new(RecordingPlugin::sink("c", journal.clone()).failing_start()),
            sink("d", &journal),
        ]);

        let err = lifecycle.start().await.unwrap_err();
        match err {
            LifecycleError::StartFailed {
                plugin_id,
                rollback_failures,
                ..
            } => {
                assert_eq!(plugin_id, "c");
                assert!(rollback_failures.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(
            journal.events(),
            vec!["start:a", "start:b", "start:c", "stop:b", "stop:a"]
        );
        assert_eq!(lifecycle.state("c"), Some(PluginState::Failed));
        assert_eq!(lifecycle.state("d"), Some(PluginState::Unstarted));
    }

    #[tokio::test]
    async fn test_start_after_failed_start_starts_nothing() {
        let journal = Journal::new();
        let lifecycle = Lifecycle::from_plugins(vec![
            sink("a", &journal),
            sink("b", &journal),
            Arc::new(RecordingPlugin::sink("c", journal.clone()).failing_start()),
            sink("d", &journal),
        ]);

        assert!(matches!(
            lifecycle.start().await,
            Err(LifecycleError::StartFailed { .. })
        ));
        match lifecycle.start().await.unwrap_err() {
            LifecycleError::Cancelled { reason, .. } => {
                assert_eq!(reason, "plugin 'c' failed to start");
            }
            other => panic!("unexpected error: {other}"),
        }
        lifecycle.stop().await.unwrap();

        assert_eq!(
            journal.events(),
            vec!["start:a", "start:b", "start:c", "stop:b", "stop:a"]
        );
        assert_eq!(lifecycle.state("d"), Some(PluginState::Unstarted));
        assert!(lifecycle
            .states()
            .iter()
            .all(|(_, state)| *state != PluginState::Running));
    }

    #[tokio::test]
    async fn test_rollback_failures_are_reported() {
        let journal = Journal::new();
        let lifecycle = Lifecycle::from_plugins(vec![
            Arc::new(RecordingPlugin::sink("a", journal.clone()).failing_stop()),
            Arc::new(RecordingPlugin::sink("b", journal.clone()).failing_start()),
        ]);

        match lifecycle.start().await.unwrap_err() {
            LifecycleError::StartFailed {
                rollback_failures, ..
            } => {
                assert_eq!(rollback_failures.len(), 1);
                assert_eq!(rollback_failures[0].plugin_id, "a");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stop_collects_all_failures() {
        let journal = Journal::new();
        let lifecycle = Lifecycle::from_plugins(vec![
            Arc::new(RecordingPlugin::sink("a", journal.clone()).failing_stop()),
            sink("b", &journal),
            Arc::new(RecordingPlugin::sink("c", journal.clone()).failing_stop()),
        ]);
        lifecycle.start().await.unwrap();

        match lifecycle.stop().await.unwrap_err() {
            LifecycleError::StopFailed { failures } => {
                let ids: Vec<&str> = failures.iter().map(|f| f.plugin_id.as_str()).collect();
                assert_eq!(ids, vec!["c", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(journal.events().contains(&"stop:b".to_string()));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let journal = Journal::new();
        let lifecycle = Lifecycle::from_plugins(vec![sink("a", &journal)]);
        lifecycle.start().await.unwrap();

        lifecycle.stop().await.unwrap();
        lifecycle.stop().await.unwrap();

        assert_eq!(journal.events(), vec!["start:a", "stop:a"]);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let journal = Journal::new();
        let lifecycle = Lifecycle::from_plugins(vec![sink("a", &journal)]);

        lifecycle.stop().await.unwrap();
        let err = lifecycle.start().await.unwrap_err();

        assert!(matches!(err, LifecycleError::Cancelled { .. }));
        assert!(journal.events().is_empty());
    }

    #[tokio::test]
    async fn test_stop_during_start_cancels() {
        let journal = Journal::new();
        let lifecycle = Arc::new(Lifecycle::from_plugins(vec![
            sink("a", &journal),
            Arc::new(
                RecordingPlugin::sink("slow", journal.clone())
                    .with_start_delay(Duration::from_millis(50)),
            ),
            sink("c", &journal),
        ]));

        let starter = {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move { lifecycle.start().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        lifecycle.stop().await.unwrap();

        let err = starter.await.unwrap().unwrap_err();
        assert!(matches!(err, LifecycleError::Cancelled { .. }));

        let events = journal.events();
        assert!(!events.contains(&"start:c".to_string()));
        for id in ["a", "slow"] {
            let stops = events.iter().filter(|e| **e == format!("stop:{id}")).count();
            assert_eq!(stops, 1, "{id} should be stopped exactly once");
        }
    }
}
