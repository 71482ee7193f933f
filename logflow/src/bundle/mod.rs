//! Bundle definitions: reusable, parameterized plugin sub-graphs.
//!
//! A definition declares typed parameters and a template that renders to a
//! configuration document. Definitions are discovered from a search path
//! into a [`BundleCatalog`]; the `bundle` plugin type renders one and builds
//! it as a single plugin.

mod catalog;
mod definition;
mod template;

pub use catalog::BundleCatalog;
pub use definition::{BundleDefinition, ParamKind, ParameterSpec, RenderedBundle};
pub use template::Template;
