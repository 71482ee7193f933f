//! Error types for the logflow engine.
//!
//! Structural errors (decode, validation, build, wiring) carry the plugin id,
//! type and offending reference so an operator can find the faulty entry in
//! a configuration document without reading engine internals.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for logflow operations.
#[derive(Debug, Error)]
pub enum LogflowError {
    /// A plugin configuration could not be decoded.
    #[error("{0}")]
    Decode(#[from] DecodeError),

    /// The plugin configuration graph is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A plugin failed to build.
    #[error("{0}")]
    Build(#[from] BuildError),

    /// A plugin could not be wired to its outputs.
    #[error("{0}")]
    Wiring(#[from] WiringError),

    /// Starting or stopping the plugin set failed.
    #[error("{0}")]
    Lifecycle(#[from] LifecycleError),

    /// A bundle could not be loaded, rendered or composed.
    #[error("{0}")]
    Bundle(#[from] BundleError),

    /// Agent configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl From<CycleDetectedError> for LogflowError {
    fn from(err: CycleDetectedError) -> Self {
        Self::Validation(err.into())
    }
}

/// Diagnostic metadata attached to structural errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Errors raised while decoding untyped plugin configurations.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The configuration has no `type` field.
    #[error("plugin config{} is missing a `type` field", describe_id(plugin_id.as_deref()))]
    MissingType {
        /// The id of the config, if one could be read.
        plugin_id: Option<String>,
    },

    /// The `type` field is not a string.
    #[error("plugin config{} has a non-string `type` field ({found})", describe_id(plugin_id.as_deref()))]
    InvalidType {
        /// The id of the config, if one could be read.
        plugin_id: Option<String>,
        /// The JSON kind that was found instead.
        found: &'static str,
    },

    /// No factory is registered for the type.
    #[error("plugin config{} has an unknown plugin type '{plugin_type}'", describe_id(plugin_id.as_deref()))]
    UnknownType {
        /// The id of the config, if one could be read.
        plugin_id: Option<String>,
        /// The unregistered type.
        plugin_type: String,
    },

    /// The fields do not match the type's schema.
    #[error("invalid config for plugin{} of type '{plugin_type}': {message}", describe_id(plugin_id.as_deref()))]
    Invalid {
        /// The id of the config, if one could be read.
        plugin_id: Option<String>,
        /// The plugin type.
        plugin_type: String,
        /// What was wrong.
        message: String,
    },

    /// The configuration is not a map.
    #[error("plugin config must be a map, found {found}")]
    NotAMap {
        /// The JSON kind that was found instead.
        found: &'static str,
    },

    /// A plugin type was registered more than once.
    #[error("plugin type '{plugin_type}' is already registered")]
    DuplicateRegistration {
        /// The type registered twice.
        plugin_type: String,
    },

    /// A config inside a list failed to decode.
    #[error("plugin config at index {index}: {source}")]
    AtIndex {
        /// Position of the failing config in its list.
        index: usize,
        /// The underlying decode failure.
        source: Box<DecodeError>,
    },

    /// The configuration document itself could not be parsed.
    #[error("failed to parse plugin config document: {message}")]
    Document {
        /// Parser message.
        message: String,
    },
}

impl DecodeError {
    /// Returns the innermost error, skipping list position wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::AtIndex { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns diagnostic metadata with a suggested fix.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        let root = self.root();
        let (code, hint) = match root {
            Self::MissingType { .. } => (
                "DECODE-MISSING_TYPE",
                "Ensure that every plugin config has a `type` field.",
            ),
            Self::InvalidType { .. } => (
                "DECODE-INVALID_TYPE",
                "Ensure that every plugin config has a `type` field formatted as a string.",
            ),
            Self::UnknownType { .. } => (
                "DECODE-UNKNOWN_TYPE",
                "Ensure that every plugin config uses a known, registered type.",
            ),
            Self::Invalid { .. } => (
                "DECODE-INVALID_FIELDS",
                "Check the plugin config for misspelled or unsupported fields.",
            ),
            Self::NotAMap { .. } => (
                "DECODE-NOT_A_MAP",
                "Each entry of the `plugins` list must be a map.",
            ),
            Self::DuplicateRegistration { .. } => (
                "DECODE-DUPLICATE_REGISTRATION",
                "Register each plugin type exactly once.",
            ),
            Self::Document { .. } | Self::AtIndex { .. } => (
                "DECODE-DOCUMENT",
                "Ensure the document is valid YAML with a top-level `plugins` list.",
            ),
        };
        ContractErrorInfo::new(code, root.to_string()).with_fix_hint(hint)
    }
}

fn describe_id(id: Option<&str>) -> String {
    id.map(|id| format!(" '{id}'")).unwrap_or_default()
}

/// Error raised when a field path expression is malformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid field '{input}': {reason}")]
pub struct FieldParseError {
    /// The expression that failed to parse.
    pub input: String,
    /// Why parsing failed.
    pub reason: String,
}

impl FieldParseError {
    /// Creates a new field parse error.
    #[must_use]
    pub fn new(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when a value cannot be written at a field path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot set field '{field}': index {index} is more than {max_padding} past the end of an array of length {len}")]
pub struct FieldSetError {
    /// The field being written.
    pub field: String,
    /// The requested index.
    pub index: usize,
    /// The length of the array at that position.
    pub len: usize,
    /// The largest number of `null` slots a write may add.
    pub max_padding: usize,
}

/// Error raised when plugin graph validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The plugin ids involved in the error.
    pub plugins: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            plugins: Vec::new(),
            error_info: None,
        }
    }

    /// Creates the error for two configs sharing an id.
    #[must_use]
    pub fn duplicate_id(plugin_id: &str, plugin_type: &str) -> Self {
        Self::new(format!(
            "duplicate plugin id '{plugin_id}' (type '{plugin_type}')"
        ))
        .with_plugins(vec![plugin_id.to_string()])
        .with_error_info(
            ContractErrorInfo::new("GRAPH-DUPLICATE_ID", format!("Plugin id '{plugin_id}' is defined more than once"))
                .with_fix_hint("Give every plugin in the same pipeline or bundle a unique id.")
                .with_context_entry("plugin_type", plugin_type),
        )
    }

    /// Creates the error for a config with an empty id.
    #[must_use]
    pub fn empty_id(plugin_type: &str) -> Self {
        Self::new(format!("plugin of type '{plugin_type}' has an empty id")).with_error_info(
            ContractErrorInfo::new("GRAPH-EMPTY_ID", "Plugin id must not be empty")
                .with_context_entry("plugin_type", plugin_type),
        )
    }

    /// Creates the error for an `output` naming a plugin that does not exist.
    #[must_use]
    pub fn undefined_output(plugin_id: &str, plugin_type: &str, target: &str) -> Self {
        Self::new(format!(
            "undefined output reference: plugin '{plugin_id}' (type '{plugin_type}') outputs to '{target}', which does not exist"
        ))
        .with_plugins(vec![plugin_id.to_string(), target.to_string()])
        .with_error_info(
            ContractErrorInfo::new("GRAPH-UNDEFINED_OUTPUT", format!("Output '{target}' not found"))
                .with_fix_hint("Check the `output` field for typos; outputs must name plugins in the same pipeline or bundle.")
                .with_context_entry("plugin_type", plugin_type),
        )
    }

    /// Sets the plugins involved.
    #[must_use]
    pub fn with_plugins(mut self, plugins: Vec<String>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected in the plugin graph.
#[derive(Debug, Clone, Error)]
#[error("cycle detected in plugin graph: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of plugin ids forming the cycle, first id repeated at the end.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "GRAPH-CYCLE",
            format!("Plugin outputs form a cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the output references in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            plugins: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

/// Error raised when a plugin config fails to build.
#[derive(Debug, Error)]
#[error("failed to build plugin '{plugin_id}' (type '{plugin_type}'): {source}")]
pub struct BuildError {
    /// The id of the failing config.
    pub plugin_id: String,
    /// The type of the failing config.
    pub plugin_type: String,
    /// The underlying plugin error.
    pub source: PluginError,
}

/// Errors raised while connecting built plugins to their outputs.
#[derive(Debug, Error)]
pub enum WiringError {
    /// An output target does not accept entries.
    #[error("plugin '{plugin_id}' (type '{plugin_type}') outputs to '{target_id}' (type '{target_type}'), but the target cannot receive entries")]
    TargetCannotProcess {
        /// The plugin being wired.
        plugin_id: String,
        /// Its type.
        plugin_type: String,
        /// The offending target.
        target_id: String,
        /// The target's type.
        target_type: String,
    },

    /// A plugin declares outputs but cannot emit entries.
    #[error("plugin '{plugin_id}' (type '{plugin_type}') declares outputs but does not output entries")]
    NotAnOutputter {
        /// The plugin being wired.
        plugin_id: String,
        /// Its type.
        plugin_type: String,
    },

    /// The plugin rejected its outputs.
    #[error("plugin '{plugin_id}' (type '{plugin_type}') rejected its outputs: {source}")]
    Rejected {
        /// The plugin being wired.
        plugin_id: String,
        /// Its type.
        plugin_type: String,
        /// Why the plugin rejected them.
        source: PluginError,
    },
}

/// Errors raised by plugins at build time or runtime.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The plugin does not accept entries.
    #[error("plugin '{plugin_id}' cannot process entries")]
    NotProcessable {
        /// The plugin id.
        plugin_id: String,
    },

    /// The plugin does not output entries.
    #[error("plugin '{plugin_id}' does not output entries")]
    NotAnOutputter {
        /// The plugin id.
        plugin_id: String,
    },

    /// An output target does not accept entries.
    #[error("target cannot receive entries: '{target_id}'")]
    TargetCannotProcess {
        /// The offending target.
        target_id: String,
    },

    /// Outputs were already set once.
    #[error("outputs of plugin '{plugin_id}' are already set")]
    OutputsAlreadySet {
        /// The plugin id.
        plugin_id: String,
    },

    /// The configuration is semantically invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Starting the plugin failed.
    #[error("failed to start: {0}")]
    Start(String),

    /// Stopping the plugin failed.
    #[error("failed to stop: {0}")]
    Stop(String),

    /// Processing an entry failed.
    #[error("failed to process entry: {0}")]
    Process(String),

    /// Building or composing a bundle failed.
    #[error("{0}")]
    Bundle(#[from] Box<BundleError>),

    /// An inner plugin set failed to start or stop.
    #[error("{0}")]
    Lifecycle(#[from] Box<LifecycleError>),

    /// The persistent store failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Writing a field of an entry failed.
    #[error("{0}")]
    Field(#[from] FieldSetError),

    /// Any other failure from a plugin implementation.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<BundleError> for PluginError {
    fn from(err: BundleError) -> Self {
        Self::Bundle(Box::new(err))
    }
}

impl From<LifecycleError> for PluginError {
    fn from(err: LifecycleError) -> Self {
        Self::Lifecycle(Box::new(err))
    }
}

/// A plugin that failed to stop.
#[derive(Debug, Error)]
#[error("plugin '{plugin_id}': {error}")]
pub struct StopFailure {
    /// The plugin id.
    pub plugin_id: String,
    /// The stop error.
    pub error: PluginError,
}

/// Errors raised by the lifecycle orchestrator.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A plugin failed to start; already running plugins were rolled back.
    #[error("failed to start plugin '{plugin_id}': {source}{}", describe_rollback(rollback_failures))]
    StartFailed {
        /// The plugin that failed to start.
        plugin_id: String,
        /// Its start error.
        source: PluginError,
        /// Plugins that also failed to stop during rollback.
        rollback_failures: Vec<StopFailure>,
    },

    /// One or more plugins failed to stop.
    #[error("failed to stop {} plugin(s): {}", failures.len(), join_failures(failures))]
    StopFailed {
        /// Every stop failure, in stop order.
        failures: Vec<StopFailure>,
    },

    /// Start was cancelled by a concurrent stop.
    #[error("start cancelled: {reason}{}", describe_rollback(rollback_failures))]
    Cancelled {
        /// The cancellation reason.
        reason: String,
        /// Plugins that failed to stop during rollback.
        rollback_failures: Vec<StopFailure>,
    },
}

fn join_failures(failures: &[StopFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe_rollback(failures: &[StopFailure]) -> String {
    if failures.is_empty() {
        String::new()
    } else {
        format!(" (rollback failures: {})", join_failures(failures))
    }
}

/// Errors raised while rendering a bundle template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// A `{{` was never closed.
    #[error("unterminated placeholder starting at byte {offset}")]
    Unterminated {
        /// Byte offset of the opening braces.
        offset: usize,
    },

    /// A placeholder is not of the form `{{ .name }}`.
    #[error("malformed placeholder '{placeholder}', expected '{{{{ .name }}}}'")]
    MalformedPlaceholder {
        /// The placeholder text.
        placeholder: String,
    },

    /// A placeholder names a parameter the bundle does not declare.
    #[error("placeholder references undeclared parameter '{name}'")]
    UndeclaredParameter {
        /// The parameter name.
        name: String,
    },

    /// A required parameter has no value and no default.
    #[error("missing required parameter '{name}'")]
    MissingParameter {
        /// The parameter name.
        name: String,
    },

    /// The caller supplied a parameter the bundle does not declare.
    #[error("unknown parameter '{name}'")]
    UnknownParameter {
        /// The parameter name.
        name: String,
    },

    /// A parameter value has the wrong kind.
    #[error("parameter '{name}' must be of type {expected}, found {found}")]
    WrongKind {
        /// The parameter name.
        name: String,
        /// The declared kind.
        expected: String,
        /// The JSON kind that was supplied.
        found: &'static str,
    },
}

/// Errors raised while loading, rendering or composing bundles.
#[derive(Debug, Error)]
pub enum BundleError {
    /// No definition with the requested type was discovered.
    #[error("bundle definition with type '{bundle_type}' not found in bundle path")]
    NotFound {
        /// The requested bundle type.
        bundle_type: String,
    },

    /// A definition file could not be loaded.
    #[error("failed to load bundle definition {}: {message}", path.display())]
    Load {
        /// The definition file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// A definition is internally inconsistent.
    #[error("invalid bundle definition '{bundle_type}': {source}")]
    InvalidDefinition {
        /// The bundle type.
        bundle_type: String,
        /// The template problem.
        source: RenderError,
    },

    /// The template could not be rendered.
    #[error("failed to render bundle '{bundle_type}': {source}")]
    Render {
        /// The bundle type.
        bundle_type: String,
        /// The render failure.
        source: RenderError,
    },

    /// The rendered document could not be decoded.
    #[error("failed to decode bundle '{bundle_type}': {source}")]
    Decode {
        /// The bundle type.
        bundle_type: String,
        /// The decode failure.
        source: DecodeError,
    },

    /// The inner plugin graph could not be validated or built.
    #[error("failed to build bundle '{bundle_type}': {source}")]
    Graph {
        /// The bundle type.
        bundle_type: String,
        /// The inner graph failure.
        source: Box<LogflowError>,
    },

    /// More than one adapter of the same kind exists in a bundle.
    #[error("only one plugin of type {adapter_type} can exist in a bundle, found {count} in '{bundle_type}'")]
    DuplicateAdapter {
        /// The bundle type.
        bundle_type: String,
        /// The adapter type (`bundle_input` or `bundle_output`).
        adapter_type: &'static str,
        /// How many were found.
        count: usize,
    },

    /// An adapter plugin was used outside of a bundle.
    #[error("plugin type '{plugin_type}' can only be used inside a bundle")]
    AdapterOutsideBundle {
        /// The adapter type.
        plugin_type: String,
    },

    /// Bundles were nested too deeply.
    #[error("maximum bundle nesting depth ({max_depth}) exceeded while expanding '{bundle_type}'")]
    MaxDepthExceeded {
        /// The bundle type being expanded.
        bundle_type: String,
        /// The configured maximum.
        max_depth: usize,
    },

    /// The output adapter was used before its bundle existed.
    #[error("bundle output '{plugin_id}' is not attached to a bundle")]
    Detached {
        /// The adapter id.
        plugin_id: String,
    },
}

/// Errors raised by a persistent store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store rejected the operation.
    #[error("store operation on bucket '{bucket}' failed: {message}")]
    Backend {
        /// The bucket being accessed.
        bucket: String,
        /// Backend message.
        message: String,
    },

    /// A stored value could not be decoded.
    #[error("corrupt value for '{key}' in bucket '{bucket}': {message}")]
    Corrupt {
        /// The bucket being accessed.
        bucket: String,
        /// The key being read.
        key: String,
        /// Why the value is invalid.
        message: String,
    },
}

/// Errors raised while loading agent configuration or setting up logging.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration sources could not be merged or extracted.
    #[error("failed to load agent configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Logging could not be initialized.
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}
