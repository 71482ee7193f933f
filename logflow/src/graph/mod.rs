//! Plugin graphs.
//!
//! [`PluginConfigGraph`] validates a list of configs and turns it into a
//! [`PluginGraph`] of live, wired plugins.

mod config_graph;
mod plugin_graph;

pub use config_graph::PluginConfigGraph;
pub use plugin_graph::PluginGraph;
