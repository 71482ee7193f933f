//! Built-in plugin types.

mod adapters;
mod bundle;
mod drop_output;
mod generate;
mod noop;

pub use adapters::{
    BundleInput, BundleInputConfig, BundleOutput, BundleOutputConfig, BUNDLE_INPUT_TYPE,
    BUNDLE_OUTPUT_TYPE,
};
pub use bundle::{Bundle, BundleConfig, BundleShape};
pub use drop_output::{DropOutput, DropOutputConfig};
pub use generate::{GenerateConfig, GenerateInput};
pub use noop::{Noop, NoopConfig};

use crate::config::ConfigRegistry;
use crate::errors::DecodeError;

/// Plugin type of [`NoopConfig`].
pub const NOOP_TYPE: &str = "noop";
/// Plugin type of [`DropOutputConfig`].
pub const DROP_OUTPUT_TYPE: &str = "drop_output";
/// Plugin type of [`GenerateConfig`].
pub const GENERATE_INPUT_TYPE: &str = "generate_input";
/// Plugin type of [`BundleConfig`].
pub const BUNDLE_TYPE: &str = "bundle";

/// Registers every built-in plugin type.
///
/// # Errors
///
/// Returns `DuplicateRegistration` if any built-in type is already registered.
pub fn register_builtins(registry: &mut ConfigRegistry) -> Result<(), DecodeError> {
    registry.register::<NoopConfig>(NOOP_TYPE)?;
    registry.register::<DropOutputConfig>(DROP_OUTPUT_TYPE)?;
    registry.register::<GenerateConfig>(GENERATE_INPUT_TYPE)?;
    registry.register::<BundleConfig>(BUNDLE_TYPE)?;
    registry.register::<BundleInputConfig>(BUNDLE_INPUT_TYPE)?;
    registry.register::<BundleOutputConfig>(BUNDLE_OUTPUT_TYPE)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = ConfigRegistry::with_builtins().unwrap();
        assert_eq!(
            registry.registered_types(),
            vec![
                "bundle",
                "bundle_input",
                "bundle_output",
                "drop_output",
                "generate_input",
                "noop",
            ]
        );
    }

    #[test]
    fn test_register_twice_fails() {
        let mut registry = ConfigRegistry::with_builtins().unwrap();
        assert!(register_builtins(&mut registry).is_err());
    }
}
