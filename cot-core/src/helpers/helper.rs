//! The [`Helper`] entity: one named external program.
//!
//! A helper finds itself on the search path the first time it is asked,
//! remembers where it is for the rest of the process, can report its version,
//! and offers to install itself before its first invocation.

use regex::Regex;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use super::error::HelperError;
use super::package_manager::ProviderInstaller;
use super::process::{check_call, check_output, CallOptions};
use super::registry::PackageManagerRegistry;
use super::source_build::SourceBuildInstaller;
use super::types::HelperDefinition;
use super::version::StrictVersion;

// ============================================================================
// Collaborators
// ============================================================================

/// Asks the user a yes/no question before a helper is installed.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Answers yes to every question, for non-interactive runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, prompt: &str) -> bool {
        debug!("Auto-confirming: {}", prompt);
        true
    }
}

/// A way of getting a helper program onto this host.
pub trait Installer: Send + Sync {
    /// Whether this strategy can work on this host right now.
    fn is_available(&self, helper: &Helper) -> bool;

    /// Performs the installation.
    fn install(&self, helper: &Helper) -> Result<(), HelperError>;
}

// ============================================================================
// Helper
// ============================================================================

/// A provider of an external helper program.
pub struct Helper {
    definition: HelperDefinition,
    search_path: Option<OsString>,
    confirm: Option<Arc<dyn Confirm>>,
    installers: Vec<Arc<dyn Installer>>,
    path: OnceLock<PathBuf>,
    version: OnceLock<StrictVersion>,
}

impl fmt::Debug for Helper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Helper")
            .field("name", &self.definition.name)
            .field("path", &self.path.get())
            .field("version", &self.version.get())
            .field("installers", &self.installers.len())
            .field("can_confirm", &self.confirm.is_some())
            .finish()
    }
}

impl Helper {
    /// Creates a helper from its definition.
    ///
    /// If the definition describes a source build, that becomes one of the
    /// helper's install strategies.
    pub fn new(definition: HelperDefinition) -> Self {
        let installers: Vec<Arc<dyn Installer>> = match &definition.source {
            Some(source) => vec![Arc::new(SourceBuildInstaller::new(source.clone()))],
            None => Vec::new(),
        };
        Self {
            definition,
            search_path: None,
            confirm: None,
            installers,
            path: OnceLock::new(),
            version: OnceLock::new(),
        }
    }

    /// Creates a helper with default version probing and no install strategy.
    pub fn named(name: &str) -> Self {
        Self::new(HelperDefinition::new(name))
    }

    /// Searches `search_path` (same format as `$PATH`) instead of `$PATH`.
    ///
    /// The same value is given to the program as its `PATH` when invoked,
    /// unless the call overrides `PATH` itself.
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    /// Sets who to ask before installing this helper.
    pub fn with_confirm(mut self, confirm: Option<Arc<dyn Confirm>>) -> Self {
        self.confirm = confirm;
        self
    }

    /// Enables installing this helper through the package managers in `registry`.
    ///
    /// This strategy is tried before any others.
    pub fn with_package_managers(mut self, registry: Arc<PackageManagerRegistry>) -> Self {
        self.installers
            .insert(0, Arc::new(ProviderInstaller::new(registry)));
        self
    }

    /// Adds an install strategy, tried after the existing ones.
    pub fn with_installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.installers.push(installer);
        self
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn info_uri(&self) -> Option<&str> {
        self.definition.info_uri.as_deref()
    }

    pub fn definition(&self) -> &HelperDefinition {
        &self.definition
    }

    pub fn search_path(&self) -> Option<&OsStr> {
        self.search_path.as_deref()
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Path to the program, if it can be found.
    ///
    /// A found path is kept for the rest of the process. A miss is not: the
    /// search runs again on the next call, since the program may have been
    /// installed in the meantime.
    pub fn path(&self) -> Option<PathBuf> {
        if let Some(path) = self.path.get() {
            return Some(path.clone());
        }

        debug!("Checking for helper executable {}", self.name());
        let found = match &self.search_path {
            Some(paths) => std::env::current_dir()
                .ok()
                .and_then(|cwd| which::which_in(self.name(), Some(paths), cwd).ok()),
            None => which::which(self.name()).ok(),
        };

        match found {
            Some(path) => {
                debug!("{} is at {}", self.name(), path.display());
                Some(self.path.get_or_init(|| path).clone())
            }
            None => {
                debug!("No path to {} found", self.name());
                None
            }
        }
    }

    /// Whether the program is installed and available to run.
    pub fn is_installed(&self) -> bool {
        self.path().is_some()
    }

    /// Whether some install strategy for this program works on this host.
    pub fn is_installable(&self) -> bool {
        self.installers.iter().any(|i| i.is_available(self))
    }

    /// Release version of the program, or `None` if it isn't installed.
    ///
    /// The program is run once with its version arguments; the result is kept
    /// for the rest of the process.
    ///
    /// # Errors
    ///
    /// A version that can't be found in the output, or doesn't parse, is a
    /// fatal error (see [`HelperError::is_fatal`]): the helper's definition
    /// doesn't match the program.
    pub fn version(&self) -> Result<Option<StrictVersion>, HelperError> {
        if let Some(version) = self.version.get() {
            return Ok(Some(version.clone()));
        }
        if !self.is_installed() {
            return Ok(None);
        }

        // Some programs exit non-zero even when printing their version.
        let output = self.call(
            &self.definition.version_args,
            &CallOptions::new().allow_failure(),
        )?;

        let pattern = Regex::new(&self.definition.version_regexp).map_err(|e| {
            HelperError::InvalidVersion {
                name: self.name().to_string(),
                version: format!("{} ({})", self.definition.version_regexp, e),
            }
        })?;
        let captures = pattern
            .captures(&output)
            .ok_or_else(|| HelperError::VersionNotFound {
                name: self.name().to_string(),
                output: output.clone(),
            })?;
        let raw = captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str())
            .unwrap_or_default();

        let version: StrictVersion = raw.parse().map_err(|_| HelperError::InvalidVersion {
            name: self.name().to_string(),
            version: raw.to_string(),
        })?;
        debug!("{} version is {}", self.name(), version);

        Ok(Some(self.version.get_or_init(|| version).clone()))
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Runs the program with `args` and returns its combined output.
    ///
    /// If the program isn't installed yet, the user is asked whether to
    /// install it first.
    pub fn call<S: AsRef<str>>(&self, args: &[S], opts: &CallOptions) -> Result<String, HelperError> {
        self.ensure_installed()?;
        check_output(&self.command_line(args), &self.call_options(opts))
    }

    /// Like [`call`](Self::call), but the program's output goes straight to
    /// our stdout/stderr.
    pub fn call_without_capture<S: AsRef<str>>(
        &self,
        args: &[S],
        opts: &CallOptions,
    ) -> Result<(), HelperError> {
        self.ensure_installed()?;
        check_call(&self.command_line(args), &self.call_options(opts))
    }

    fn ensure_installed(&self) -> Result<(), HelperError> {
        if self.is_installed() {
            return Ok(());
        }

        let prompt = format!(
            "{} does not appear to be installed.\nTry to install it?",
            self.name()
        );
        let confirmed = self
            .confirm
            .as_ref()
            .map_or(false, |confirm| confirm.confirm(&prompt));
        if !confirmed {
            return Err(HelperError::declined(self.name()));
        }
        self.install()
    }

    fn command_line<S: AsRef<str>>(&self, args: &[S]) -> Vec<String> {
        let mut command = Vec::with_capacity(args.len() + 1);
        command.push(self.name().to_string());
        command.extend(args.iter().map(|a| a.as_ref().to_string()));
        command
    }

    fn call_options(&self, opts: &CallOptions) -> CallOptions {
        let mut opts = opts.clone();
        if let Some(search_path) = &self.search_path {
            if !opts.env.iter().any(|(key, _)| key == "PATH") {
                opts.env.push((OsString::from("PATH"), search_path.clone()));
            }
        }
        opts
    }

    // ========================================================================
    // Installation
    // ========================================================================

    /// Installs the program using the first install strategy that is
    /// available on this host.
    ///
    /// # Errors
    ///
    /// - [`HelperError::NotInstallable`] if no strategy is available.
    /// - Whatever the strategy itself fails with.
    /// - [`HelperError::InstallIncomplete`] (fatal) if the strategy reported
    ///   success but the program still can't be found.
    pub fn install(&self) -> Result<(), HelperError> {
        if self.is_installed() {
            return Ok(());
        }

        let installer = self
            .installers
            .iter()
            .find(|i| i.is_available(self))
            .ok_or_else(|| HelperError::NotInstallable {
                name: self.name().to_string(),
                info_uri: self.definition.info_uri.clone(),
            })?;

        info!("Installing '{}'...", self.name());
        installer.install(self)?;

        if self.path().is_none() {
            return Err(HelperError::InstallIncomplete {
                name: self.name().to_string(),
            });
        }

        info!("Successfully installed '{}'", self.name());
        Ok(())
    }
}
