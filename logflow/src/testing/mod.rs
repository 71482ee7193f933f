//! Testing utilities for logflow graphs.
//!
//! This module provides:
//! - A `mock` plugin type that records lifecycle events and entries
//! - Registry and build context fixtures

mod fixtures;
mod mocks;

pub use fixtures::{build_context, build_context_with_bundles, mock_registry, MOCK_TYPE};
pub use mocks::{Journal, MockConfig, RecordingPlugin};
