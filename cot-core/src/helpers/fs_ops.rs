//! Filesystem operations that fall back to `sudo` when we lack permission.
//!
//! Installing a helper usually means writing into a system directory such as
//! `/usr/local/bin`. These functions first try as the current user and only
//! then retry under `sudo`. If the retry also fails, the error from the first
//! attempt is the one reported.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::error::HelperError;
use super::process::{check_call, CallOptions};

/// Default permissions for directories we create.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

const SUDO: &[&str] = &["sudo"];

/// Makes sure `path` is a directory, creating it (and its parents) if needed.
///
/// An existing directory is left alone, permissions included.
///
/// # Errors
///
/// - [`HelperError::NotADirectory`] if `path` exists and isn't a directory.
/// - [`HelperError::Filesystem`] if it couldn't be created even with `sudo`.
pub fn ensure_directory(path: &Path, permissions: u32) -> Result<(), HelperError> {
    ensure_directory_with(path, permissions, SUDO)
}

/// Copies `src` to `dest`. If `dest` is a directory, the file keeps its name.
///
/// # Errors
///
/// [`HelperError::Filesystem`] if the copy failed even with `sudo`.
pub fn copy(src: &Path, dest: &Path) -> Result<(), HelperError> {
    copy_with(src, dest, SUDO)
}

fn ensure_directory_with(path: &Path, permissions: u32, sudo: &[&str]) -> Result<(), HelperError> {
    if path.is_dir() {
        return Ok(());
    }
    if path.exists() {
        return Err(HelperError::NotADirectory(path.to_path_buf()));
    }

    debug!("Creating directory {} (mode {:o})", path.display(), permissions);
    let err = match create_dir_all_with_mode(path, permissions) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    warn!(
        "Couldn't create {} ({}); retrying with sudo",
        path.display(),
        err
    );
    let mut args: Vec<String> = sudo.iter().map(|s| s.to_string()).collect();
    args.extend([
        "mkdir".to_string(),
        "-p".to_string(),
        format!("--mode={:o}", permissions),
        path.to_string_lossy().into_owned(),
    ]);
    match check_call(&args, &CallOptions::default()) {
        Ok(()) => {
            info!("Created {} with sudo", path.display());
            Ok(())
        }
        Err(retry_err) => {
            debug!("sudo mkdir failed too: {}", retry_err);
            Err(HelperError::Filesystem {
                operation: "create directory",
                path: path.to_path_buf(),
                source: err,
            })
        }
    }
}

fn copy_with(src: &Path, dest: &Path, sudo: &[&str]) -> Result<(), HelperError> {
    let target = copy_target(src, dest);
    debug!("Copying {} to {}", src.display(), target.display());

    let err = match fs::copy(src, &target) {
        Ok(_) => return Ok(()),
        Err(e) => e,
    };

    warn!(
        "Couldn't copy {} to {} ({}); retrying with sudo",
        src.display(),
        dest.display(),
        err
    );
    let mut args: Vec<String> = sudo.iter().map(|s| s.to_string()).collect();
    args.extend([
        "cp".to_string(),
        src.to_string_lossy().into_owned(),
        dest.to_string_lossy().into_owned(),
    ]);
    match check_call(&args, &CallOptions::default()) {
        Ok(()) => {
            info!("Copied {} to {} with sudo", src.display(), dest.display());
            Ok(())
        }
        Err(retry_err) => {
            debug!("sudo cp failed too: {}", retry_err);
            Err(HelperError::Filesystem {
                operation: "copy",
                path: src.to_path_buf(),
                source: err,
            })
        }
    }
}

fn copy_target(src: &Path, dest: &Path) -> PathBuf {
    match src.file_name() {
        Some(name) if dest.is_dir() => dest.join(name),
        _ => dest.to_path_buf(),
    }
}

#[cfg(unix)]
fn create_dir_all_with_mode(path: &Path, permissions: u32) -> io::Result<()> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    fs::DirBuilder::new()
        .recursive(true)
        .mode(permissions)
        .create(path)?;
    // The builder's mode is filtered by the umask.
    fs::set_permissions(path, fs::Permissions::from_mode(permissions))
}

#[cfg(not(unix))]
fn create_dir_all_with_mode(path: &Path, _permissions: u32) -> io::Result<()> {
    fs::create_dir_all(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // Never prompts for a password.
    const SUDO_NONINTERACTIVE: &[&str] = &["sudo", "-n"];

    #[test]
    fn test_existing_directory_is_untouched() {
        let dir = TempDir::new().unwrap();
        ensure_directory(dir.path(), DEFAULT_DIR_MODE).unwrap();
        assert!(dir.path().is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_directory_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("private");
        fs::create_dir(&sub).unwrap();
        fs::set_permissions(&sub, fs::Permissions::from_mode(0o700)).unwrap();

        ensure_directory(&sub, 0o755).unwrap();
        let mode = fs::metadata(&sub).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[cfg(unix)]
    #[test]
    fn test_creates_nested_directory_with_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_directory(&nested, 0o750).unwrap();
        assert!(nested.is_dir());
        let mode = fs::metadata(&nested).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_file_in_the_way() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, "x").unwrap();

        let err = ensure_directory(&file, DEFAULT_DIR_MODE).unwrap_err();
        assert!(matches!(err, HelperError::NotADirectory(ref p) if p == &file));
        assert!(err.to_string().contains("exists but is not a directory"));
    }

    #[cfg(unix)]
    #[test]
    fn test_create_failure_reports_original_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, "x").unwrap();
        let impossible = file.join("sub");

        let err = ensure_directory_with(&impossible, DEFAULT_DIR_MODE, SUDO_NONINTERACTIVE)
            .unwrap_err();
        match err {
            HelperError::Filesystem {
                operation, path, ..
            } => {
                assert_eq!(operation, "create directory");
                assert_eq!(path, impossible);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_copy_to_file_and_into_directory() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("tool");
        fs::write(&src, "binary").unwrap();

        let dest_file = dir.path().join("renamed");
        copy(&src, &dest_file).unwrap();
        assert_eq!(fs::read_to_string(&dest_file).unwrap(), "binary");

        let dest_dir = dir.path().join("bin");
        fs::create_dir(&dest_dir).unwrap();
        copy(&src, &dest_dir).unwrap();
        assert_eq!(fs::read_to_string(dest_dir.join("tool")).unwrap(), "binary");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_keeps_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let src = crate::helpers::test_support::write_script(dir.path(), "tool", "true");
        let dest_dir = dir.path().join("bin");
        fs::create_dir(&dest_dir).unwrap();

        copy(&src, &dest_dir).unwrap();
        let mode = fs::metadata(dest_dir.join("tool")).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_failure_reports_original_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");

        let err = copy_with(&missing, dir.path(), SUDO_NONINTERACTIVE).unwrap_err();
        match err {
            HelperError::Filesystem {
                operation,
                path,
                source,
            } => {
                assert_eq!(operation, "copy");
                assert_eq!(path, missing);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
