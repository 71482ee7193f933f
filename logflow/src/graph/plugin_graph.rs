//! The built, wired plugin set.

use crate::plugin::Plugin;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Live plugins produced by [`PluginConfigGraph::build`](super::PluginConfigGraph::build).
#[derive(Debug, Clone)]
pub struct PluginGraph {
    plugins: Vec<Arc<dyn Plugin>>,
    build_order: Vec<String>,
    edges: BTreeMap<String, Vec<String>>,
}

impl PluginGraph {
    pub(crate) fn new(
        plugins: Vec<Arc<dyn Plugin>>,
        build_order: Vec<String>,
        edges: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            plugins,
            build_order,
            edges,
        }
    }

    /// Returns the plugins in declaration order.
    #[must_use]
    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    /// Returns the plugin ids in build order (outputs first).
    #[must_use]
    pub fn build_order(&self) -> &[String] {
        &self.build_order
    }

    /// Returns the plugins in build order.
    #[must_use]
    pub fn plugins_in_build_order(&self) -> Vec<Arc<dyn Plugin>> {
        self.build_order
            .iter()
            .filter_map(|id| self.get(id).cloned())
            .collect()
    }

    /// Returns the plugin with the given id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.iter().find(|plugin| plugin.id() == id)
    }

    /// Returns the output ids of a plugin.
    #[must_use]
    pub fn outputs_of(&self, id: &str) -> &[String] {
        self.edges.get(id).map_or(&[], Vec::as_slice)
    }

    /// Returns the number of plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true if there are no plugins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
