//! Configuration types describing a helper program.
//!
//! A [`HelperDefinition`] is everything a [`Helper`](super::Helper) needs at
//! construction: its name, where to read about it, how to ask it for its
//! version, which packages provide it under each package manager, and
//! optionally how to build it from a source tarball.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default arguments used to ask a helper for its version.
pub const DEFAULT_VERSION_ARGS: &[&str] = &["--version"];

/// Default pattern for pulling a version number out of the version output.
pub const DEFAULT_VERSION_REGEXP: &str = "([0-9.]+)";

// ============================================================================
// Package Sets
// ============================================================================

/// One or more package names that together provide a helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PackageSet {
    One(String),
    Many(Vec<String>),
}

impl PackageSet {
    /// Returns the package names in install order.
    pub fn packages(&self) -> Vec<&str> {
        match self {
            Self::One(name) => vec![name.as_str()],
            Self::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for PackageSet {
    fn from(name: &str) -> Self {
        Self::One(name.to_string())
    }
}

impl From<Vec<&str>> for PackageSet {
    fn from(names: Vec<&str>) -> Self {
        Self::Many(names.into_iter().map(str::to_string).collect())
    }
}

// ============================================================================
// Helper Definition
// ============================================================================

fn default_install_dir() -> String {
    "/usr/local/bin".to_string()
}

/// How to build a helper from a source tarball.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBuild {
    /// Location of the `.tar.gz` source archive.
    pub url: String,
    /// Expected SHA256 of the archive, hex encoded.
    #[serde(default)]
    pub sha256: Option<String>,
    /// Directory inside the archive to build in.
    #[serde(default)]
    pub source_dir: Option<String>,
    /// Commands run in order inside the source directory.
    #[serde(default)]
    pub build_commands: Vec<Vec<String>>,
    /// Built program, relative to the source directory.
    pub binary: String,
    /// Where the built program is copied to.
    #[serde(default = "default_install_dir")]
    pub install_dir: String,
    /// Programs that must be on `$PATH` for the build to work.
    #[serde(default)]
    pub required_tools: Vec<String>,
}

impl SourceBuild {
    pub fn new(url: impl Into<String>, binary: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sha256: None,
            source_dir: None,
            build_commands: Vec::new(),
            binary: binary.into(),
            install_dir: default_install_dir(),
            required_tools: Vec::new(),
        }
    }

    pub fn in_dir(mut self, source_dir: impl Into<String>) -> Self {
        self.source_dir = Some(source_dir.into());
        self
    }

    pub fn command(mut self, args: &[&str]) -> Self {
        self.build_commands
            .push(args.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn requires(mut self, tools: &[&str]) -> Self {
        self.required_tools
            .extend(tools.iter().map(|s| s.to_string()));
        self
    }

    pub fn install_to(mut self, dir: impl Into<String>) -> Self {
        self.install_dir = dir.into();
        self
    }
}

fn default_version_args() -> Vec<String> {
    DEFAULT_VERSION_ARGS.iter().map(|s| s.to_string()).collect()
}

fn default_version_regexp() -> String {
    DEFAULT_VERSION_REGEXP.to_string()
}

/// Static description of a helper program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperDefinition {
    /// Name the program is invoked by.
    pub name: String,
    /// Where a human can read about (and manually install) the program.
    #[serde(default)]
    pub info_uri: Option<String>,
    /// Arguments that make the program print its version.
    #[serde(default = "default_version_args")]
    pub version_args: Vec<String>,
    /// Regex whose first capture group is the version number.
    #[serde(default = "default_version_regexp")]
    pub version_regexp: String,
    /// Package manager name to the package(s) that provide this helper.
    #[serde(default)]
    pub providers: BTreeMap<String, PackageSet>,
    /// Fallback build from source, used when no package manager can help.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceBuild>,
}

impl HelperDefinition {
    /// Creates a definition with default version probing and no providers.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            info_uri: None,
            version_args: default_version_args(),
            version_regexp: default_version_regexp(),
            providers: BTreeMap::new(),
            source: None,
        }
    }

    pub fn with_info_uri(mut self, uri: impl Into<String>) -> Self {
        self.info_uri = Some(uri.into());
        self
    }

    /// Overrides the version query. An empty argument list keeps the default.
    pub fn with_version(mut self, args: &[&str], regexp: &str) -> Self {
        if !args.is_empty() {
            self.version_args = args.iter().map(|s| s.to_string()).collect();
        }
        self.version_regexp = regexp.to_string();
        self
    }

    pub fn with_provider(
        mut self,
        package_manager: impl Into<String>,
        packages: impl Into<PackageSet>,
    ) -> Self {
        self.providers.insert(package_manager.into(), packages.into());
        self
    }

    pub fn with_source(mut self, source: SourceBuild) -> Self {
        self.source = Some(source);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_defaults() {
        let def = HelperDefinition::new("qemu-img");
        assert_eq!(def.name, "qemu-img");
        assert_eq!(def.version_args, vec!["--version"]);
        assert_eq!(def.version_regexp, "([0-9.]+)");
        assert!(def.providers.is_empty());
        assert!(def.info_uri.is_none());
    }

    #[test]
    fn test_with_version_empty_args_keeps_default() {
        let def = HelperDefinition::new("x").with_version(&[], r"v([0-9.]+)");
        assert_eq!(def.version_args, vec!["--version"]);
        assert_eq!(def.version_regexp, r"v([0-9.]+)");

        let def = HelperDefinition::new("x").with_version(&["-version"], "([0-9.]+)");
        assert_eq!(def.version_args, vec!["-version"]);
    }

    #[test]
    fn test_package_set_packages() {
        assert_eq!(PackageSet::from("qemu-utils").packages(), vec!["qemu-utils"]);
        assert_eq!(
            PackageSet::from(vec!["make", "gcc"]).packages(),
            vec!["make", "gcc"]
        );
    }

    #[test]
    fn test_definition_json_defaults() {
        let def: HelperDefinition = serde_json::from_str(
            r#"{"name": "fatdisk", "providers": {"apt-get": ["make", "gcc"], "brew": "make"}}"#,
        )
        .unwrap();
        assert_eq!(def.name, "fatdisk");
        assert_eq!(def.version_args, vec!["--version"]);
        assert_eq!(def.version_regexp, "([0-9.]+)");
        assert_eq!(
            def.providers.get("apt-get"),
            Some(&PackageSet::Many(vec!["make".to_string(), "gcc".to_string()]))
        );
        assert_eq!(
            def.providers.get("brew"),
            Some(&PackageSet::One("make".to_string()))
        );
        assert!(def.source.is_none());
    }

    #[test]
    fn test_source_build_json_defaults() {
        let def: HelperDefinition = serde_json::from_str(
            r#"{
                "name": "vmdktool",
                "source": {
                    "url": "http://example.com/vmdktool-1.4.tar.gz",
                    "source_dir": "vmdktool-1.4",
                    "build_commands": [["make"]],
                    "binary": "vmdktool"
                }
            }"#,
        )
        .unwrap();
        let source = def.source.unwrap();
        assert_eq!(source.install_dir, "/usr/local/bin");
        assert_eq!(source.build_commands, vec![vec!["make".to_string()]]);
        assert!(source.required_tools.is_empty());
        assert!(source.sha256.is_none());
    }
}
