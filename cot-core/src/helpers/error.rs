//! Error types for helper discovery, invocation and installation.

use std::path::PathBuf;
use thiserror::Error;

/// errno reported when a helper cannot be found (`ENOENT`).
pub const ENOENT: i32 = 2;

/// errno reported when the user declines to install a missing helper (`EPERM`).
pub const EPERM: i32 = 1;

/// Errors that can occur while locating, running or installing a helper program.
#[derive(Debug, Error)]
pub enum HelperError {
    #[error("No command given to invoke")]
    EmptyCommand,

    /// The program is not on the search path, or the user declined to install it.
    #[error("[Errno {errno}] {message}")]
    NotFound {
        name: String,
        errno: i32,
        message: String,
    },

    /// The program ran but exited non-zero when success was required.
    #[error("Helper program '{name}' exited with error {code}{}", render_output(.command, .output.as_deref()))]
    Failed {
        name: String,
        code: i32,
        command: String,
        output: Option<String>,
    },

    #[error("Unsure how to install {name}.{}", render_info_uri(.info_uri.as_deref()))]
    NotInstallable {
        name: String,
        info_uri: Option<String>,
    },

    #[error("{operation} is not implemented for '{name}'")]
    Unsupported {
        name: String,
        operation: &'static str,
    },

    #[error("Unable to find version number of '{name}' in output:\n{output}")]
    VersionNotFound { name: String, output: String },

    #[error("Invalid version number '{version}' reported by '{name}'")]
    InvalidVersion { name: String, version: String },

    #[error("After installing '{name}', it still could not be found on the search path")]
    InstallIncomplete { name: String },

    #[error("Path {0} exists but is not a directory!")]
    NotADirectory(PathBuf),

    #[error("Failed to {operation} {}: {source}", .path.display())]
    Filesystem {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid download URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download of {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("SHA256 checksum mismatch!\nExpected: {expected}\nActual: {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Failed to extract {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn render_output(command: &str, output: Option<&str>) -> String {
    match output {
        Some(output) => format!(":\n> {}\n{}", command, output),
        None => String::new(),
    }
}

fn render_info_uri(info_uri: Option<&str>) -> String {
    match info_uri {
        Some(uri) => format!("\nRefer to {} for information", uri),
        None => String::new(),
    }
}

impl HelperError {
    /// The program could not be located on the search path.
    pub fn not_found(name: &str, errno: i32) -> Self {
        Self::NotFound {
            name: name.to_string(),
            errno,
            message: format!(
                "Unable to locate helper program '{}'. Please check your $PATH.",
                name
            ),
        }
    }

    /// The program is missing and installing it was declined (or nobody could be asked).
    pub fn declined(name: &str) -> Self {
        Self::NotFound {
            name: name.to_string(),
            errno: EPERM,
            message: format!(
                "Unable to proceed without helper program '{}'. \
                 Please install it and/or check your $PATH.",
                name
            ),
        }
    }

    /// Returns true for programmer-contract failures.
    ///
    /// These point at a misconfigured helper definition or a broken
    /// environment rather than bad input, and are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::VersionNotFound { .. } | Self::InvalidVersion { .. } | Self::InstallIncomplete { .. }
        )
    }

    /// Exit code of a failed invocation, if this error is one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { code, .. } => Some(*code),
            _ => None,
        }
    }
}
