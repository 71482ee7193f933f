//! Registry and context fixtures for graph tests.

use std::sync::Arc;

use super::mocks::{Journal, MockConfig};
use crate::bundle::BundleCatalog;
use crate::config::{from_value_strict, ConfigRegistry};
use crate::errors::DecodeError;
use crate::plugin::{BuildContext, PluginSpec};
use crate::store::InMemoryStore;

/// Plugin type of [`MockConfig`].
pub const MOCK_TYPE: &str = "mock";

/// Returns a registry with the built-in types plus `mock`, whose plugins
/// record into `journal`.
///
/// # Errors
///
/// Propagates registration failures.
pub fn mock_registry(journal: &Journal) -> Result<ConfigRegistry, DecodeError> {
    let mut registry = ConfigRegistry::with_builtins()?;
    let journal = journal.clone();
    registry.register_fn(MOCK_TYPE, move |value| {
        let mut config: MockConfig = from_value_strict(value)?;
        config.journal = journal.clone();
        Ok(Box::new(config) as Box<dyn PluginSpec>)
    })?;
    Ok(registry)
}

/// Returns a top-level build context over [`mock_registry`] with no bundles.
///
/// # Errors
///
/// Propagates registration failures.
pub fn build_context(journal: &Journal) -> Result<BuildContext, DecodeError> {
    build_context_with_bundles(journal, BundleCatalog::default())
}

/// Returns a top-level build context over [`mock_registry`] and `bundles`.
///
/// # Errors
///
/// Propagates registration failures.
pub fn build_context_with_bundles(
    journal: &Journal,
    bundles: BundleCatalog,
) -> Result<BuildContext, DecodeError> {
    Ok(BuildContext::new(
        Arc::new(mock_registry(journal)?),
        Arc::new(bundles),
        Arc::new(InMemoryStore::new()),
    ))
}
