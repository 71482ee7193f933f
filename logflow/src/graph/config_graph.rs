//! Validation, ordering and building of plugin configuration graphs.

use super::PluginGraph;
use crate::errors::{CycleDetectedError, LogflowError, PipelineValidationError, WiringError};
use crate::plugin::{BuildContext, Plugin, PluginConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A validated graph of plugin configurations.
///
/// Nodes are configs keyed by id; edges run from a config to each plugin
/// named in its `output`. Construction guarantees unique ids, resolvable
/// outputs and the absence of cycles.
#[derive(Debug)]
pub struct PluginConfigGraph {
    configs: Vec<PluginConfig>,
    index: BTreeMap<String, usize>,
    build_order: Vec<usize>,
}

impl PluginConfigGraph {
    /// Validates `configs` and computes their build order.
    ///
    /// Outputs are built before the plugins that feed them. Among
    /// independent configs, declaration order decides.
    ///
    /// # Errors
    ///
    /// Returns `PipelineValidationError` for empty or duplicate ids,
    /// undefined output references and cycles (self-references included).
    pub fn new(configs: Vec<PluginConfig>) -> Result<Self, PipelineValidationError> {
        let mut index = BTreeMap::new();
        for (position, config) in configs.iter().enumerate() {
            if config.id().is_empty() {
                return Err(PipelineValidationError::empty_id(config.plugin_type()));
            }
            if index.insert(config.id().to_string(), position).is_some() {
                return Err(PipelineValidationError::duplicate_id(
                    config.id(),
                    config.plugin_type(),
                ));
            }
        }

        for config in &configs {
            if let Some(target) = config.outputs().iter().find(|t| !index.contains_key(*t)) {
                return Err(PipelineValidationError::undefined_output(
                    config.id(),
                    config.plugin_type(),
                    target,
                ));
            }
        }

        let build_order = order(&configs, &index)?;
        Ok(Self {
            configs,
            index,
            build_order,
        })
    }

    /// Returns the number of configs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Returns true if the graph has no configs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Returns the configs in declaration order.
    #[must_use]
    pub fn configs(&self) -> &[PluginConfig] {
        &self.configs
    }

    /// Returns the config with the given id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PluginConfig> {
        self.index.get(id).map(|&position| &self.configs[position])
    }

    /// Returns the ids in build order.
    #[must_use]
    pub fn build_order(&self) -> Vec<&str> {
        self.build_order
            .iter()
            .map(|&position| self.configs[position].id())
            .collect()
    }

    /// Builds every plugin and wires it to its outputs.
    ///
    /// Plugins are built in build order, so each plugin's outputs already
    /// exist when it is wired. Any failure aborts the whole build.
    ///
    /// # Errors
    ///
    /// Returns `Build` errors tagged with the failing plugin, or `Wiring`
    /// errors when an output target cannot receive entries or a plugin with
    /// outputs cannot emit them.
    pub fn build(&self, ctx: &BuildContext) -> Result<PluginGraph, LogflowError> {
        let mut scope = ctx.clone();
        let mut built: BTreeMap<&str, Arc<dyn Plugin>> = BTreeMap::new();

        for &position in &self.build_order {
            let config = &self.configs[position];
            let plugin = config.build(&scope)?;
            debug!(
                parent: scope.span(),
                plugin_id = config.id(),
                plugin_type = config.plugin_type(),
                "built plugin"
            );

            let targets = config
                .outputs()
                .iter()
                .filter_map(|id| built.get(id.as_str()).cloned())
                .collect::<Vec<_>>();
            wire(config, &plugin, targets)?;

            scope.insert_built(Arc::clone(&plugin));
            built.insert(config.id(), plugin);
        }

        let plugins = self
            .configs
            .iter()
            .filter_map(|config| built.remove(config.id()))
            .collect::<Vec<_>>();
        let edges = self
            .configs
            .iter()
            .map(|config| (config.id().to_string(), config.outputs().to_vec()))
            .collect();
        let build_order = self
            .build_order()
            .into_iter()
            .map(str::to_string)
            .collect();

        info!(parent: ctx.span(), plugins = plugins.len(), "built plugin graph");
        Ok(PluginGraph::new(plugins, build_order, edges))
    }
}

fn wire(
    config: &PluginConfig,
    plugin: &Arc<dyn Plugin>,
    targets: Vec<Arc<dyn Plugin>>,
) -> Result<(), WiringError> {
    if targets.is_empty() {
        return Ok(());
    }
    if !plugin.can_output() {
        return Err(WiringError::NotAnOutputter {
            plugin_id: config.id().to_string(),
            plugin_type: config.plugin_type().to_string(),
        });
    }
    if let Some(target) = targets.iter().find(|t| !t.can_process()) {
        return Err(WiringError::TargetCannotProcess {
            plugin_id: config.id().to_string(),
            plugin_type: config.plugin_type().to_string(),
            target_id: target.id().to_string(),
            target_type: target.plugin_type().to_string(),
        });
    }
    plugin
        .set_outputs(targets)
        .map_err(|source| WiringError::Rejected {
            plugin_id: config.id().to_string(),
            plugin_type: config.plugin_type().to_string(),
            source,
        })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first postorder over the output relation, roots in declaration order.
fn order(
    configs: &[PluginConfig],
    index: &BTreeMap<String, usize>,
) -> Result<Vec<usize>, CycleDetectedError> {
    let mut marks = vec![Mark::Unvisited; configs.len()];
    let mut result = Vec::with_capacity(configs.len());

    for root in 0..configs.len() {
        if marks[root] == Mark::Unvisited {
            visit(root, configs, index, &mut marks, &mut result)?;
        }
    }
    Ok(result)
}

/// Iterative DFS from `root`. Each frame holds a node and the position of
/// its next output to follow; the frames on the stack form the current path.
fn visit(
    root: usize,
    configs: &[PluginConfig],
    index: &BTreeMap<String, usize>,
    marks: &mut [Mark],
    result: &mut Vec<usize>,
) -> Result<(), CycleDetectedError> {
    let mut stack = vec![(root, 0_usize)];
    marks[root] = Mark::InProgress;

    while let Some(frame) = stack.last_mut() {
        let (node, cursor) = *frame;
        let Some(target) = configs[node].outputs().get(cursor) else {
            stack.pop();
            marks[node] = Mark::Done;
            result.push(node);
            continue;
        };
        frame.1 += 1;

        let Some(&next) = index.get(target) else {
            continue;
        };
        match marks[next] {
            Mark::Unvisited => {
                marks[next] = Mark::InProgress;
                stack.push((next, 0));
            }
            Mark::InProgress => {
                let start = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..]
                    .iter()
                    .map(|&(n, _)| configs[n].id().to_string())
                    .collect();
                cycle.push(configs[next].id().to_string());
                return Err(CycleDetectedError::new(cycle));
            }
            Mark::Done => {}
        }
    }
    Ok(())
}
