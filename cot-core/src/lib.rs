//! COT Core Library
//!
//! Core support code for COT, the Common OVF Tool. It includes:
//!
//! - Helper program discovery, invocation and installation
//! - Package manager drivers used to install missing helpers
//! - Validation and conflict-resolution utilities for user and document data
//! - Logging setup

pub mod helpers;
pub mod logging;
pub mod validation;

// Re-export helpers
pub use helpers::{
    check_call, check_output, helpers, package_managers, AssumeYes, CallOptions, Confirm, Helper,
    HelperCatalog, HelperDefinition, HelperError, PackageManager, StrictVersion,
};

// Re-export validation
pub use validation::{
    check_for_conflict, match_or_die, natural_sort, InvalidInputError, ValueMismatchError,
};

pub use logging::init_logging;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
