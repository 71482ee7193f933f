//! Per-build context handed to every plugin factory.

use super::Plugin;
use crate::builtin::{BundleInput, BundleOutput};
use crate::bundle::BundleCatalog;
use crate::config::ConfigRegistry;
use crate::errors::BundleError;
use crate::store::{InMemoryStore, PersistentStore};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info_span, Span};

/// Default maximum bundle nesting depth.
pub const DEFAULT_MAX_BUNDLE_DEPTH: usize = 5;

/// Adapter plugins built inside one bundle expansion.
///
/// Adapters register themselves here when they are built so the composing
/// bundle can find them without inspecting concrete plugin types.
#[derive(Debug, Default)]
pub struct AdapterSet {
    inputs: Mutex<Vec<Arc<BundleInput>>>,
    outputs: Mutex<Vec<Arc<BundleOutput>>>,
}

impl AdapterSet {
    /// Records a built input adapter.
    pub fn register_input(&self, adapter: Arc<BundleInput>) {
        self.inputs.lock().push(adapter);
    }

    /// Records a built output adapter.
    pub fn register_output(&self, adapter: Arc<BundleOutput>) {
        self.outputs.lock().push(adapter);
    }

    /// Returns the input adapters in build order.
    #[must_use]
    pub fn inputs(&self) -> Vec<Arc<BundleInput>> {
        self.inputs.lock().clone()
    }

    /// Returns the output adapters in build order.
    #[must_use]
    pub fn outputs(&self) -> Vec<Arc<BundleOutput>> {
        self.outputs.lock().clone()
    }
}

#[derive(Clone)]
struct BundleScope {
    bundle_id: String,
    bundle_type: String,
    depth: usize,
    enclosing: BTreeMap<String, Arc<dyn Plugin>>,
    adapters: Arc<AdapterSet>,
}

/// Everything a plugin factory may need while building.
///
/// The context is cheap to clone. While a graph is built, it also carries the
/// plugins already built in that graph; while a bundle is expanded, it
/// carries the enclosing graph's plugins and the bundle's adapter set.
#[derive(Clone)]
pub struct BuildContext {
    registry: Arc<ConfigRegistry>,
    bundles: Arc<BundleCatalog>,
    store: Arc<dyn PersistentStore>,
    span: Span,
    built: BTreeMap<String, Arc<dyn Plugin>>,
    scope: Option<BundleScope>,
    max_depth: usize,
}

impl BuildContext {
    /// Creates a top-level context.
    #[must_use]
    pub fn new(
        registry: Arc<ConfigRegistry>,
        bundles: Arc<BundleCatalog>,
        store: Arc<dyn PersistentStore>,
    ) -> Self {
        Self {
            registry,
            bundles,
            store,
            span: info_span!("logflow"),
            built: BTreeMap::new(),
            scope: None,
            max_depth: DEFAULT_MAX_BUNDLE_DEPTH,
        }
    }

    /// Creates a context with no bundles and an in-memory store.
    #[must_use]
    pub fn with_registry(registry: Arc<ConfigRegistry>) -> Self {
        Self::new(
            registry,
            Arc::new(BundleCatalog::default()),
            Arc::new(InMemoryStore::new()),
        )
    }

    /// Sets the logging span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Sets the maximum bundle nesting depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Returns the config registry.
    #[must_use]
    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    /// Returns the bundle catalog.
    #[must_use]
    pub fn bundles(&self) -> &BundleCatalog {
        &self.bundles
    }

    /// Returns the persistent store handle.
    #[must_use]
    pub fn store(&self) -> Arc<dyn PersistentStore> {
        Arc::clone(&self.store)
    }

    /// Returns the logging span.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Returns a plugin already built in the current graph.
    #[must_use]
    pub fn built(&self, id: &str) -> Option<&Arc<dyn Plugin>> {
        self.built.get(id)
    }

    pub(crate) fn insert_built(&mut self, plugin: Arc<dyn Plugin>) {
        self.built.insert(plugin.id().to_string(), plugin);
    }

    /// Returns true while a bundle is being expanded.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.scope.is_some()
    }

    /// Returns the current bundle nesting depth (0 at top level).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.scope.as_ref().map_or(0, |scope| scope.depth)
    }

    /// Returns the id and type of the bundle being expanded.
    #[must_use]
    pub fn bundle(&self) -> Option<(&str, &str)> {
        self.scope
            .as_ref()
            .map(|scope| (scope.bundle_id.as_str(), scope.bundle_type.as_str()))
    }

    /// Returns the plugins already built in the graph enclosing the bundle.
    #[must_use]
    pub fn enclosing(&self) -> Option<&BTreeMap<String, Arc<dyn Plugin>>> {
        self.scope.as_ref().map(|scope| &scope.enclosing)
    }

    /// Returns the adapter set of the bundle being expanded.
    #[must_use]
    pub fn adapters(&self) -> Option<&Arc<AdapterSet>> {
        self.scope.as_ref().map(|scope| &scope.adapters)
    }

    /// Derives the context for expanding a bundle.
    ///
    /// The child starts with an empty built set, remembers the current one as
    /// its enclosing plugins, and logs under a nested span.
    ///
    /// # Errors
    ///
    /// Returns `MaxDepthExceeded` if the nesting limit would be passed.
    pub fn enter_bundle(&self, bundle_id: &str, bundle_type: &str) -> Result<Self, BundleError> {
        let depth = self.depth() + 1;
        if depth > self.max_depth {
            return Err(BundleError::MaxDepthExceeded {
                bundle_type: bundle_type.to_string(),
                max_depth: self.max_depth,
            });
        }

        let span = info_span!(parent: &self.span, "bundle", bundle_id, bundle_type, depth);
        Ok(Self {
            registry: Arc::clone(&self.registry),
            bundles: Arc::clone(&self.bundles),
            store: Arc::clone(&self.store),
            span,
            built: BTreeMap::new(),
            scope: Some(BundleScope {
                bundle_id: bundle_id.to_string(),
                bundle_type: bundle_type.to_string(),
                depth,
                enclosing: self.built.clone(),
                adapters: Arc::new(AdapterSet::default()),
            }),
            max_depth: self.max_depth,
        })
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("built", &self.built.keys().collect::<Vec<_>>())
            .field("bundle", &self.bundle())
            .field("depth", &self.depth())
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> BuildContext {
        BuildContext::with_registry(Arc::new(ConfigRegistry::new()))
    }

    #[test]
    fn test_top_level_is_not_nested() {
        let ctx = context();
        assert!(!ctx.is_nested());
        assert_eq!(ctx.depth(), 0);
        assert!(ctx.bundle().is_none());
        assert!(ctx.adapters().is_none());
    }

    #[test]
    fn test_enter_bundle_nests() {
        let ctx = context();
        let child = ctx.enter_bundle("b1", "simple").unwrap();

        assert!(child.is_nested());
        assert_eq!(child.depth(), 1);
        assert_eq!(child.bundle(), Some(("b1", "simple")));
        assert!(child.enclosing().is_some_and(BTreeMap::is_empty));

        let grandchild = child.enter_bundle("b2", "simple").unwrap();
        assert_eq!(grandchild.depth(), 2);
    }

    #[test]
    fn test_enter_bundle_depth_limit() {
        let ctx = context().with_max_depth(1);
        let child = ctx.enter_bundle("b1", "outer").unwrap();

        let err = child.enter_bundle("b2", "inner").unwrap_err();
        assert!(matches!(err, BundleError::MaxDepthExceeded { max_depth: 1, .. }));
    }
}
