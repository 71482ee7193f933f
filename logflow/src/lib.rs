//! # Logflow
//!
//! Plugin graph construction and execution for a log collection agent.
//!
//! Logflow turns a list of plugin configurations into a running graph of
//! plugins that pass log entries to each other:
//!
//! - **Config decoding**: a registry maps each plugin `type` to a typed,
//!   strictly validated configuration
//! - **Graph validation**: unique ids, resolvable outputs and acyclic wiring
//!   are checked before anything is built
//! - **Bundles**: parameterized sub-graphs rendered from templates and
//!   embedded as a single plugin
//! - **Lifecycle**: consumers start before producers, producers stop first,
//!   and a failed start rolls back what already started
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use logflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = AgentConfig::load("agent.yaml".as_ref())?;
//! let agent = LogAgent::from_config(
//!     &config,
//!     Arc::new(ConfigRegistry::with_builtins()?),
//!     Arc::new(InMemoryStore::new()),
//! )?;
//!
//! agent.start().await?;
//! // ...
//! agent.stop().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod agent;
pub mod builtin;
pub mod bundle;
pub mod config;
pub mod entry;
pub mod errors;
pub mod graph;
pub mod lifecycle;
pub mod observability;
pub mod plugin;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agent::{AgentConfig, LogAgent};
    pub use crate::bundle::{BundleCatalog, BundleDefinition, ParamKind, ParameterSpec};
    pub use crate::config::{ConfigRegistry, DecodeHook};
    pub use crate::entry::{Entry, Field};
    pub use crate::errors::{
        BundleError, ContractErrorInfo, CycleDetectedError, DecodeError, LifecycleError,
        LogflowError, PipelineValidationError, PluginError,
    };
    pub use crate::graph::{PluginConfigGraph, PluginGraph};
    pub use crate::lifecycle::{CancellationToken, Lifecycle, PluginState};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::plugin::{
        BuildContext, OutputSlot, Plugin, PluginConfig, PluginIdentity, PluginSpec,
    };
    pub use crate::store::{InMemoryStore, PersistentStore};
}
