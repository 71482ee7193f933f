//! Discovery of bundle definitions from a search path.

use super::BundleDefinition;
use crate::errors::BundleError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The bundle definitions known to an agent, keyed by bundle type.
///
/// Discovered once at startup and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct BundleCatalog {
    definitions: BTreeMap<String, BundleDefinition>,
}

impl BundleCatalog {
    /// Creates a catalog from definitions.
    ///
    /// The first definition of a bundle type wins.
    #[must_use]
    pub fn from_definitions(definitions: impl IntoIterator<Item = BundleDefinition>) -> Self {
        let mut catalog = Self::default();
        for definition in definitions {
            catalog.insert(definition, None);
        }
        catalog
    }

    /// Loads every `*.yaml` and `*.yml` file directly inside `dir`.
    ///
    /// Files are read in name order. Files that cannot be read or are not
    /// valid definitions are logged and skipped. A missing directory yields
    /// an empty catalog.
    #[must_use]
    pub fn discover(dir: &Path) -> Self {
        let mut catalog = Self::default();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "bundle path is not readable, no bundles loaded");
                return catalog;
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_yaml(path))
            .collect();
        files.sort();

        for path in files {
            match BundleDefinition::from_yaml_file(&path) {
                Ok(definition) => catalog.insert(definition, Some(&path)),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping invalid bundle definition");
                }
            }
        }

        info!(path = %dir.display(), bundles = catalog.len(), "discovered bundle definitions");
        catalog
    }

    fn insert(&mut self, definition: BundleDefinition, path: Option<&Path>) {
        let bundle_type = definition.bundle_type().to_string();
        if self.definitions.contains_key(&bundle_type) {
            warn!(
                bundle_type = %bundle_type,
                path = ?path,
                "duplicate bundle type, keeping the first definition"
            );
            return;
        }
        debug!(bundle_type = %bundle_type, path = ?path, "loaded bundle definition");
        self.definitions.insert(bundle_type, definition);
    }

    /// Returns the definition for a bundle type.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no definition has that type.
    pub fn get(&self, bundle_type: &str) -> Result<&BundleDefinition, BundleError> {
        self.definitions
            .get(bundle_type)
            .ok_or_else(|| BundleError::NotFound {
                bundle_type: bundle_type.to_string(),
            })
    }

    /// Returns the known bundle types in sorted order.
    #[must_use]
    pub fn bundle_types(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).collect()
    }

    /// Returns the number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true if there are no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}
