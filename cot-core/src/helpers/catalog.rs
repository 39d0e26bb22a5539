//! Known helper programs.
//!
//! The built-in catalog describes the helpers COT relies on. A JSON file
//! named by `COT_HELPER_CATALOG` can add helpers or replace built-in entries:
//!
//! ```json
//! { "schema_version": 1, "helpers": [ { "name": "qemu-img", "providers": { "apt-get": "qemu-utils" } } ] }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use super::types::{HelperDefinition, SourceBuild};

/// Environment variable naming an extra catalog file.
pub const CATALOG_ENV_VAR: &str = "COT_HELPER_CATALOG";

/// Current schema version for catalog files.
const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Built-in Definitions
// ============================================================================

/// Definitions for the helpers COT knows out of the box.
pub fn builtin_definitions() -> Vec<HelperDefinition> {
    vec![
        HelperDefinition::new("qemu-img")
            .with_info_uri("http://www.qemu.org")
            .with_version(&[], "qemu-img version ([0-9.]+)")
            .with_provider("apt-get", "qemu-utils")
            .with_provider("yum", "qemu-img")
            .with_provider("port", "qemu")
            .with_provider("brew", "qemu"),
        HelperDefinition::new("mkisofs")
            .with_info_uri("http://cdrecord.org/")
            .with_version(&["-version"], "mkisofs ([0-9.]+)")
            .with_provider("port", "cdrtools")
            .with_provider("brew", "cdrtools"),
        HelperDefinition::new("genisoimage")
            .with_info_uri("http://cdrkit.org/")
            .with_version(&["-version"], "genisoimage ([0-9.]+)")
            .with_provider("apt-get", "genisoimage")
            .with_provider("yum", "genisoimage"),
        HelperDefinition::new("xorriso")
            .with_info_uri("https://www.gnu.org/software/xorriso/")
            .with_version(&["-version"], "xorriso ([0-9.]+)")
            .with_provider("apt-get", "xorriso")
            .with_provider("yum", "xorriso")
            .with_provider("port", "xorriso")
            .with_provider("brew", "xorriso"),
        HelperDefinition::new("isoinfo")
            .with_info_uri("http://cdrecord.org/")
            .with_version(&["--version"], "isoinfo ([0-9.]+)")
            .with_provider("apt-get", "genisoimage")
            .with_provider("yum", "genisoimage")
            .with_provider("port", "cdrtools")
            .with_provider("brew", "cdrtools"),
        HelperDefinition::new("ovftool")
            .with_info_uri("https://www.vmware.com/support/developer/ovf/")
            .with_version(&["--version"], "ovftool ([0-9.]+)"),
        HelperDefinition::new("vmdktool")
            .with_info_uri("http://www.freshports.org/sysutils/vmdktool/")
            .with_version(&["-V"], "vmdktool version ([0-9.]+)")
            .with_provider("port", "vmdktool")
            .with_source(
                SourceBuild::new(
                    "http://people.freebsd.org/~brian/vmdktool/vmdktool-1.4.tar.gz",
                    "vmdktool",
                )
                .in_dir("vmdktool-1.4")
                .command(&["make", "CFLAGS=-D_GNU_SOURCE -g -O -pipe"])
                .requires(&["make", "cc"]),
            ),
        HelperDefinition::new("fatdisk")
            .with_info_uri("https://github.com/goblinhack/fatdisk")
            .with_version(&["--version"], "version ([0-9.]+)")
            .with_provider("port", "fatdisk")
            .with_source(
                SourceBuild::new(
                    "https://github.com/glennmatthews/fatdisk/archive/master.tar.gz",
                    "fatdisk",
                )
                .in_dir("fatdisk-master")
                .command(&["./RUNME"])
                .requires(&["make", "cc"]),
            ),
    ]
}

// ============================================================================
// Catalog
// ============================================================================

/// On-disk catalog format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    #[serde(default)]
    pub helpers: Vec<HelperDefinition>,
}

impl Default for CatalogFile {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            helpers: Vec::new(),
        }
    }
}

/// Helper definitions by name.
#[derive(Debug, Clone, Default)]
pub struct HelperCatalog {
    definitions: BTreeMap<String, HelperDefinition>,
}

impl HelperCatalog {
    /// A catalog with no definitions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in definitions only.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for definition in builtin_definitions() {
            catalog.insert(definition);
        }
        catalog
    }

    /// Built-in definitions, overridden by the file named by
    /// [`CATALOG_ENV_VAR`] if it is set.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CATALOG_ENV_VAR) {
            Some(path) => Self::load_from(Path::new(&path)),
            None => Ok(Self::builtin()),
        }
    }

    /// Built-in definitions, overridden by the entries in `path`.
    ///
    /// A missing file adds nothing. So does an unparsable one, with a warning.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut catalog = Self::builtin();
        let added = catalog.merge_file(path)?;
        if added > 0 {
            info!("Loaded {} helper definition(s) from {}", added, path.display());
        }
        Ok(catalog)
    }

    /// Adds every entry in the catalog file at `path`, replacing same-named
    /// ones. Returns how many entries were read.
    pub fn merge_file(&mut self, path: &Path) -> Result<usize> {
        if !path.exists() {
            debug!("Helper catalog not found at {}", path.display());
            return Ok(0);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read helper catalog from {}", path.display()))?;

        let file = match serde_json::from_str::<CatalogFile>(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    "Failed to parse helper catalog at {}: {}. Ignoring it.",
                    path.display(),
                    e
                );
                return Ok(0);
            }
        };
        if file.schema_version != SCHEMA_VERSION {
            info!(
                "Helper catalog schema version {} differs from current {}",
                file.schema_version, SCHEMA_VERSION
            );
        }

        let count = file.helpers.len();
        for definition in file.helpers {
            self.insert(definition);
        }
        Ok(count)
    }

    /// Writes every definition to `path` in catalog file format.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create catalog directory: {}", parent.display())
            })?;
        }

        let file = CatalogFile {
            schema_version: SCHEMA_VERSION,
            helpers: self.definitions.values().cloned().collect(),
        };
        let content =
            serde_json::to_string_pretty(&file).context("Failed to serialize helper catalog")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write helper catalog to {}", path.display()))?;

        debug!("Helper catalog saved to {}", path.display());
        Ok(())
    }

    /// Adds `definition`, replacing any entry with the same name.
    pub fn insert(&mut self, definition: HelperDefinition) {
        self.definitions.insert(definition.name.clone(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&HelperDefinition> {
        self.definitions.get(name)
    }

    /// The catalog entry for `name`, or a default definition if there is none.
    pub fn definition(&self, name: &str) -> HelperDefinition {
        self.get(name)
            .cloned()
            .unwrap_or_else(|| HelperDefinition::new(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
