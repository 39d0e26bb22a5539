//! Helper program management.
//!
//! COT shells out to a number of third-party programs (`qemu-img`,
//! `mkisofs`, `ovftool`, ...). This module finds them, runs them, reports
//! their versions and, with the user's permission, installs the ones that are
//! missing.
//!
//! # Architecture
//!
//! - `error`: `HelperError`, the one error type for this module
//! - `process`: `check_call` / `check_output` with the single sudo retry
//! - `version`: `StrictVersion` parsing and ordering
//! - `types`: `HelperDefinition` and friends (serde configuration)
//! - `catalog`: Built-in definitions plus an optional JSON override file
//! - `helper`: The `Helper` entity and its `Confirm` / `Installer` seams
//! - `package_manager`: apt-get, yum, port and brew
//! - `registry`: Lazily populated, shared helper and package manager lookup
//! - `fs_ops`: `ensure_directory` and `copy`, retried under sudo
//! - `download`: Scoped download-and-expand of source tarballs
//! - `source_build`: Installing a helper by building it from source
//!
//! # Example
//!
//! ```no_run
//! use cot_core::helpers::{helpers, CallOptions, StrictVersion};
//!
//! let qemu_img = helpers().get("qemu-img");
//! if qemu_img.version()? >= Some(StrictVersion::new(2, 1, 0)) {
//!     let info = qemu_img.call(&["info", "disk.vmdk"], &CallOptions::default())?;
//!     println!("{}", info);
//! }
//! # Ok::<(), cot_core::helpers::HelperError>(())
//! ```

pub mod catalog;
pub mod download;
pub mod error;
pub mod fs_ops;
pub mod helper;
pub mod package_manager;
pub mod process;
pub mod registry;
pub mod source_build;
pub mod types;
pub mod version;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use catalog::{builtin_definitions, HelperCatalog, CATALOG_ENV_VAR};
pub use download::{
    download_and_expand_tgz, download_and_expand_tgz_verified, download_and_expand_tgz_with,
    ExpandedArchive,
};
pub use error::HelperError;
pub use fs_ops::{copy, ensure_directory, DEFAULT_DIR_MODE};
pub use helper::{AssumeYes, Confirm, Helper, Installer};
pub use package_manager::{PackageManager, PackageManagerKind, ProviderInstaller};
pub use process::{check_call, check_output, CallOptions};
pub use registry::{
    helpers, package_managers, HelperRegistry, Named, PackageManagerRegistry, Registry,
};
pub use source_build::SourceBuildInstaller;
pub use types::{HelperDefinition, PackageSet, SourceBuild};
pub use version::{ParseVersionError, PreRelease, StrictVersion};
