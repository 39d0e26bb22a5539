//! Package managers: helpers that can install other helpers.

use std::ffi::OsString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::HelperError;
use super::helper::{Helper, Installer};
use super::process::CallOptions;
use super::registry::PackageManagerRegistry;
use super::types::HelperDefinition;

/// The package managers we know how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManagerKind {
    AptGet,
    Yum,
    Port,
    Brew,
    /// Known by name only; can't install anything.
    Other,
}

impl PackageManagerKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "apt-get" => Self::AptGet,
            "yum" => Self::Yum,
            "port" => Self::Port,
            "brew" => Self::Brew,
            _ => Self::Other,
        }
    }

    /// Definition of the package manager program itself.
    pub fn definition(self, name: &str) -> HelperDefinition {
        let def = HelperDefinition::new(name);
        match self {
            Self::AptGet => def
                .with_info_uri("https://wiki.debian.org/Apt")
                .with_version(&[], "apt ([0-9.]+)"),
            Self::Yum => def.with_info_uri("http://yum.baseurl.org"),
            Self::Port => def
                .with_info_uri("https://www.macports.org")
                .with_version(&["version"], "Version: ([0-9.]+)"),
            Self::Brew => def
                .with_info_uri("https://brew.sh")
                .with_version(&[], "Homebrew ([0-9.]+)"),
            Self::Other => def,
        }
    }

    /// Command that refreshes the package index, run once before the first install.
    fn refresh_args(self) -> Option<&'static [&'static str]> {
        match self {
            Self::AptGet => Some(&["-q", "update"]),
            Self::Port => Some(&["selfupdate"]),
            Self::Yum | Self::Brew | Self::Other => None,
        }
    }

    fn install_args(self, package: &str) -> Option<Vec<String>> {
        let args: &[&str] = match self {
            Self::AptGet => &["-q", "install"],
            Self::Yum => &["--quiet", "install"],
            Self::Port | Self::Brew => &["install"],
            Self::Other => return None,
        };
        let mut args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        args.push(package.to_string());
        Some(args)
    }

    /// Homebrew refuses to run as root; everything else needs it.
    fn needs_root(self) -> bool {
        !matches!(self, Self::Brew)
    }
}

/// A helper that installs packages.
#[derive(Debug)]
pub struct PackageManager {
    helper: Helper,
    kind: PackageManagerKind,
    refreshed: AtomicBool,
}

impl PackageManager {
    pub fn new(name: &str) -> Self {
        let kind = PackageManagerKind::from_name(name);
        Self {
            helper: Helper::new(kind.definition(name)),
            kind,
            refreshed: AtomicBool::new(false),
        }
    }

    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.helper = self.helper.with_search_path(search_path);
        self
    }

    pub fn name(&self) -> &str {
        self.helper.name()
    }

    pub fn kind(&self) -> PackageManagerKind {
        self.kind
    }

    pub fn helper(&self) -> &Helper {
        &self.helper
    }

    pub fn is_installed(&self) -> bool {
        self.helper.is_installed()
    }

    /// Installs one package.
    ///
    /// The first install through a given package manager refreshes its
    /// package index; later ones don't.
    ///
    /// # Errors
    ///
    /// [`HelperError::Unsupported`] for package managers we only know by name,
    /// otherwise whatever running the package manager fails with.
    pub fn install_package(&self, package: &str) -> Result<(), HelperError> {
        let args = self
            .kind
            .install_args(package)
            .ok_or_else(|| HelperError::Unsupported {
                name: self.name().to_string(),
                operation: "install_package",
            })?;

        let opts = if self.kind.needs_root() {
            CallOptions::new().retry_with_sudo()
        } else {
            CallOptions::new()
        };

        if let Some(refresh) = self.kind.refresh_args() {
            if !self.refreshed.load(Ordering::SeqCst) {
                debug!("Refreshing {} package index", self.name());
                self.helper.call_without_capture(refresh, &opts)?;
                self.refreshed.store(true, Ordering::SeqCst);
            }
        }

        info!("Installing package '{}' via {}", package, self.name());
        self.helper.call_without_capture(&args, &opts)
    }
}

/// Installs a helper through whichever of its providers' package managers
/// are present on this host.
pub struct ProviderInstaller {
    registry: Arc<PackageManagerRegistry>,
}

impl ProviderInstaller {
    pub fn new(registry: Arc<PackageManagerRegistry>) -> Self {
        Self { registry }
    }

    fn installed_providers<'a>(&self, helper: &'a Helper) -> Vec<(Arc<PackageManager>, Vec<&'a str>)> {
        helper
            .definition()
            .providers
            .iter()
            .map(|(name, packages)| (self.registry.get(name), packages.packages()))
            .filter(|(manager, _)| manager.is_installed())
            .collect()
    }
}

impl Installer for ProviderInstaller {
    fn is_available(&self, helper: &Helper) -> bool {
        !self.installed_providers(helper).is_empty()
    }

    fn install(&self, helper: &Helper) -> Result<(), HelperError> {
        for (manager, packages) in self.installed_providers(helper) {
            for package in packages {
                manager.install_package(package)?;
            }
        }
        Ok(())
    }
}
