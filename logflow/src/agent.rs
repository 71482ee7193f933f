//! The log agent: configuration loading plus a built, startable plugin graph.

use crate::bundle::BundleCatalog;
use crate::config::ConfigRegistry;
use crate::errors::{ConfigError, LogflowError};
use crate::graph::{PluginConfigGraph, PluginGraph};
use crate::lifecycle::Lifecycle;
use crate::observability::LogFormat;
use crate::plugin::{BuildContext, DEFAULT_MAX_BUNDLE_DEPTH};
use crate::store::PersistentStore;
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, info_span, Span};
use uuid::Uuid;

/// Environment variable prefix for agent overrides.
pub const ENV_PREFIX: &str = "LOGFLOW_";

const fn default_max_bundle_depth() -> usize {
    DEFAULT_MAX_BUNDLE_DEPTH
}

/// Agent configuration.
///
/// Scalar settings can be overridden with `LOGFLOW_`-prefixed environment
/// variables, e.g. `LOGFLOW_BUNDLE_PATH`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Raw plugin configurations.
    #[serde(default)]
    pub plugins: Vec<Value>,
    /// Directory holding bundle definitions.
    #[serde(default)]
    pub bundle_path: Option<PathBuf>,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Maximum bundle nesting depth.
    #[serde(default = "default_max_bundle_depth")]
    pub max_bundle_depth: usize,
}

impl AgentConfig {
    /// Loads a YAML configuration file merged with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if the file is missing or invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Ok(Figment::new()
            .merge(Yaml::file_exact(path))
            .merge(env_overrides())
            .extract()?)
    }

    /// Parses YAML configuration text merged with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if the text is invalid.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(Figment::new()
            .merge(Yaml::string(text))
            .merge(env_overrides())
            .extract()?)
    }
}

fn env_overrides() -> Env {
    Env::prefixed(ENV_PREFIX).only(&["bundle_path", "log_format", "max_bundle_depth"])
}

/// A built agent, ready to start.
#[derive(Debug)]
pub struct LogAgent {
    run_id: Uuid,
    graph: PluginGraph,
    lifecycle: Lifecycle,
    span: Span,
}

impl LogAgent {
    /// Discovers bundles, decodes and validates the plugin configurations,
    /// and builds the plugin graph.
    ///
    /// # Errors
    ///
    /// Returns the first decode, validation, build or wiring failure.
    pub fn from_config(
        config: &AgentConfig,
        registry: Arc<ConfigRegistry>,
        store: Arc<dyn PersistentStore>,
    ) -> Result<Self, LogflowError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("agent", run_id = %run_id);

        let bundles = config
            .bundle_path
            .as_deref()
            .map(BundleCatalog::discover)
            .unwrap_or_default();
        let bundle_count = bundles.len();
        let ctx = BuildContext::new(registry, Arc::new(bundles), store)
            .with_span(span.clone())
            .with_max_depth(config.max_bundle_depth);

        let configs = ctx.registry().decode_all(config.plugins.clone())?;
        let graph = PluginConfigGraph::new(configs)?.build(&ctx)?;
        let lifecycle = Lifecycle::new(&graph).with_span(span.clone());

        info!(
            parent: &span,
            plugins = graph.len(),
            bundles = bundle_count,
            "agent built"
        );
        Ok(Self {
            run_id,
            graph,
            lifecycle,
            span,
        })
    }

    /// Returns the id of this agent run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the built plugin graph.
    #[must_use]
    pub fn graph(&self) -> &PluginGraph {
        &self.graph
    }

    /// Returns the lifecycle orchestrator.
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Starts every plugin.
    ///
    /// # Errors
    ///
    /// Returns the lifecycle error; started plugins have been rolled back.
    pub async fn start(&self) -> Result<(), LogflowError> {
        info!(parent: &self.span, "starting agent");
        Ok(self.lifecycle.start().await?)
    }

    /// Stops every plugin.
    ///
    /// # Errors
    ///
    /// Returns every plugin stop failure.
    pub async fn stop(&self) -> Result<(), LogflowError> {
        info!(parent: &self.span, "stopping agent");
        Ok(self.lifecycle.stop().await?)
    }
}
