//! Building a helper from its source tarball.

use reqwest::blocking::Client;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::download::download_and_expand_tgz_with;
use super::error::HelperError;
use super::fs_ops::{copy, ensure_directory, DEFAULT_DIR_MODE};
use super::helper::{Helper, Installer};
use super::process::{check_call, CallOptions};
use super::types::SourceBuild;

/// Installs a helper by downloading, building and copying it into place.
///
/// Only offered when every required build tool is on `$PATH`.
#[derive(Debug, Clone)]
pub struct SourceBuildInstaller {
    build: SourceBuild,
    client: Option<Client>,
}

impl SourceBuildInstaller {
    pub fn new(build: SourceBuild) -> Self {
        Self {
            build,
            client: None,
        }
    }

    /// Uses `client` for the download.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(&self) -> &SourceBuild {
        &self.build
    }

    fn missing_tools(&self) -> Vec<&str> {
        self.build
            .required_tools
            .iter()
            .map(String::as_str)
            .filter(|tool| which::which(tool).is_err())
            .collect()
    }

    fn build_in(&self, helper: &Helper, root: &Path) -> Result<(), HelperError> {
        let source_dir = match &self.build.source_dir {
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        };
        debug!("Building {} in {}", helper.name(), source_dir.display());

        for command in &self.build.build_commands {
            check_call(command, &CallOptions::new().current_dir(&source_dir))?;
        }

        let install_dir = PathBuf::from(&self.build.install_dir);
        ensure_directory(&install_dir, DEFAULT_DIR_MODE)?;
        copy(
            &source_dir.join(&self.build.binary),
            &install_dir.join(helper.name()),
        )?;
        info!(
            "Installed {} into {}",
            helper.name(),
            install_dir.display()
        );
        Ok(())
    }
}

impl Installer for SourceBuildInstaller {
    fn is_available(&self, helper: &Helper) -> bool {
        let missing = self.missing_tools();
        if !missing.is_empty() {
            debug!(
                "Can't build {} from source; missing {}",
                helper.name(),
                missing.join(", ")
            );
        }
        missing.is_empty()
    }

    fn install(&self, helper: &Helper) -> Result<(), HelperError> {
        info!("Building {} from {}", helper.name(), self.build.url);
        let client = self.client.clone().unwrap_or_default();
        download_and_expand_tgz_with(
            &client,
            &self.build.url,
            self.build.sha256.as_deref(),
            |root| self.build_in(helper, root),
        )
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::helpers::helper::AssumeYes;
    use crate::helpers::test_support::{serve_once, tarball, test_client};
    use crate::helpers::types::HelperDefinition;
    use crate::helpers::version::StrictVersion;
    use std::sync::Arc;
    use tempfile::TempDir;

    const BUILD_SCRIPT: &str = "#!/bin/sh\nprintf '#!/bin/sh\\necho \"cot-built-tool 2.0.1\"\\n' > cot-built-tool\nchmod +x cot-built-tool\n";

    #[test]
    fn test_unavailable_without_build_tools() {
        let installer = SourceBuildInstaller::new(
            SourceBuild::new("https://example.com/x.tar.gz", "x")
                .requires(&["cot-no-such-compiler-xyz"]),
        );
        let helper = Helper::named("x");
        assert!(!installer.is_available(&helper));

        let installer = SourceBuildInstaller::new(
            SourceBuild::new("https://example.com/x.tar.gz", "x").requires(&["sh"]),
        );
        assert!(installer.is_available(&helper));
    }

    #[test]
    fn test_build_and_install_from_tarball() {
        let bin = TempDir::new().unwrap();
        let install_dir = bin.path().join("bin");
        let url = serve_once(200, tarball(&[("tool-2.0.1/build.sh", BUILD_SCRIPT, 0o755)]));

        let build = SourceBuild::new(url, "cot-built-tool")
            .in_dir("tool-2.0.1")
            .command(&["sh", "build.sh"])
            .requires(&["sh"])
            .install_to(install_dir.to_string_lossy());
        let installer = SourceBuildInstaller::new(build).with_client(test_client());

        let helper = Helper::new(
            HelperDefinition::new("cot-built-tool").with_version(&[], "tool ([0-9.]+)"),
        )
        .with_search_path(&install_dir)
        .with_confirm(Some(Arc::new(AssumeYes)))
        .with_installer(Arc::new(installer));

        assert!(!helper.is_installed());
        assert!(helper.is_installable());

        let out = helper.call(&["--anything"], &CallOptions::default()).unwrap();
        assert_eq!(out, "cot-built-tool 2.0.1\n");
        assert!(install_dir.join("cot-built-tool").is_file());
        assert_eq!(helper.version().unwrap(), Some(StrictVersion::new(2, 0, 1)));
    }

    #[test]
    fn test_failed_build_step() {
        let bin = TempDir::new().unwrap();
        let url = serve_once(200, tarball(&[("README", "nothing to build\n", 0o644)]));

        let build = SourceBuild::new(url, "cot-built-tool")
            .command(&["sh", "-c", "exit 2"])
            .install_to(bin.path().to_string_lossy());
        let installer = SourceBuildInstaller::new(build).with_client(test_client());
        let helper = Helper::named("cot-built-tool").with_search_path(bin.path());

        let err = installer.install(&helper).unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
        assert!(!bin.path().join("cot-built-tool").exists());
    }
}
