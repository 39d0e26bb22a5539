//! Fetching and unpacking helper source tarballs.
//!
//! A tarball is downloaded into a fresh temporary directory, unpacked in
//! place, and handed to the caller. The directory and everything in it is
//! removed once the caller is done, whether it succeeded, failed or panicked.

use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use url::Url;

use super::error::HelperError;

const TEMP_PREFIX: &str = "cot_helper";
const ARCHIVE_NAME: &str = "helper.tgz";

// ============================================================================
// URL Validation
// ============================================================================

fn validate_url(url_str: &str) -> Result<Url, HelperError> {
    let url = Url::parse(url_str).map_err(|e| HelperError::InvalidUrl {
        url: url_str.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(HelperError::InvalidUrl {
            url: url_str.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(HelperError::InvalidUrl {
            url: url_str.to_string(),
            reason: "URL must have a host".to_string(),
        });
    }
    Ok(url)
}

// ============================================================================
// Expanded Archive
// ============================================================================

/// A downloaded and unpacked tarball. Dropping it deletes the files.
#[derive(Debug)]
pub struct ExpandedArchive {
    dir: TempDir,
}

impl ExpandedArchive {
    /// Downloads `url` with a default HTTP client and unpacks it.
    pub fn fetch(url: &str, expected_sha256: Option<&str>) -> Result<Self, HelperError> {
        Self::fetch_with(&Client::new(), url, expected_sha256)
    }

    /// Downloads `url` with `client` and unpacks it.
    ///
    /// If `expected_sha256` is given (hex, any case) the archive must match
    /// it before anything is unpacked.
    pub fn fetch_with(
        client: &Client,
        url: &str,
        expected_sha256: Option<&str>,
    ) -> Result<Self, HelperError> {
        let url = validate_url(url)?;
        let dir = tempfile::Builder::new().prefix(TEMP_PREFIX).tempdir()?;
        debug!("Temporary directory is {}", dir.path().display());

        let archive = dir.path().join(ARCHIVE_NAME);
        download_to(client, &url, &archive, expected_sha256)?;
        extract_tgz(&archive, dir.path())?;

        Ok(Self { dir })
    }

    /// Directory the archive was unpacked into.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Drop for ExpandedArchive {
    fn drop(&mut self) {
        debug!("Cleaning up temporary directory {}", self.dir.path().display());
    }
}

/// Downloads and unpacks the tarball at `url`, then runs `f` on the directory
/// it was unpacked into.
///
/// The directory is removed after `f` returns, whatever it returned.
///
/// ```no_run
/// use cot_core::helpers::{download_and_expand_tgz, HelperError};
///
/// let files = download_and_expand_tgz("https://example.com/tool.tar.gz", |dir| {
///     Ok::<_, HelperError>(std::fs::read_dir(dir)?.count())
/// })?;
/// # Ok::<(), HelperError>(())
/// ```
pub fn download_and_expand_tgz<T, E, F>(url: &str, f: F) -> Result<T, E>
where
    F: FnOnce(&Path) -> Result<T, E>,
    E: From<HelperError>,
{
    let archive = ExpandedArchive::fetch(url, None)?;
    f(archive.path())
}

/// Like [`download_and_expand_tgz`], but the archive must have the given
/// SHA256 checksum.
pub fn download_and_expand_tgz_verified<T, E, F>(url: &str, sha256: &str, f: F) -> Result<T, E>
where
    F: FnOnce(&Path) -> Result<T, E>,
    E: From<HelperError>,
{
    let archive = ExpandedArchive::fetch(url, Some(sha256))?;
    f(archive.path())
}

/// Like [`download_and_expand_tgz`], using `client` for the download and
/// checking `sha256` if given.
pub fn download_and_expand_tgz_with<T, E, F>(
    client: &Client,
    url: &str,
    sha256: Option<&str>,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(&Path) -> Result<T, E>,
    E: From<HelperError>,
{
    let archive = ExpandedArchive::fetch_with(client, url, sha256)?;
    f(archive.path())
}

// ============================================================================
// Download
// ============================================================================

fn download_to(
    client: &Client,
    url: &Url,
    dest: &Path,
    expected_sha256: Option<&str>,
) -> Result<(), HelperError> {
    info!("Downloading {}", url);
    let download_error = |source| HelperError::Download {
        url: url.to_string(),
        source,
    };

    let mut response = client
        .get(url.clone())
        .send()
        .map_err(download_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(HelperError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let mut file = File::create(dest).map_err(|source| HelperError::Filesystem {
        operation: "create",
        path: dest.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut total: u64 = 0;

    loop {
        let n = match response.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(HelperError::Io(e)),
        };
        hasher.update(&buf[..n]);
        file.write_all(&buf[..n])?;
        total += n as u64;
    }
    file.flush()?;
    debug!("Downloaded {} bytes to {}", total, dest.display());

    if let Some(expected) = expected_sha256 {
        let actual = format_sha256_hex(&hasher.finalize());
        if actual != expected.to_lowercase() {
            return Err(HelperError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        debug!("SHA256 verified: {}", actual);
    }

    Ok(())
}

fn format_sha256_hex(hash: &[u8]) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

// ============================================================================
// Extraction
// ============================================================================

fn extract_tgz(archive_path: &Path, dest_dir: &Path) -> Result<(), HelperError> {
    info!("Extracting {}", archive_path.display());
    let archive_error = |source| HelperError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path).map_err(archive_error)?;
    let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    let count = extract_tar(decoder, dest_dir).map_err(archive_error)?;

    debug!("Extracted {} entries into {}", count, dest_dir.display());
    Ok(())
}

/// Unpacks every member under `dest_dir`, keeping relative paths, links and
/// permission bits.
///
/// Members that would land outside `dest_dir` are skipped.
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> io::Result<usize> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    let mut count = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.unpack_in(dest_dir)? {
            count += 1;
        } else {
            warn!("Skipping unsafe path in tar archive: {:?}", entry.path().ok());
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use crate::helpers::test_support::{serve_once, tar_bytes, tarball, test_client};

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://github.com/glennmatthews/fatdisk/archive/master.tar.gz").is_ok());
        assert!(validate_url("http://people.freebsd.org/~brian/vmdktool/vmdktool-1.4.tar.gz").is_ok());
        assert!(matches!(
            validate_url("ftp://example.com/x.tgz"),
            Err(HelperError::InvalidUrl { .. })
        ));
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(HelperError::InvalidUrl { .. })
        ));
        assert!(matches!(
            validate_url("not a url"),
            Err(HelperError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_format_sha256_hex() {
        let empty_hash = Sha256::digest(b"");
        assert_eq!(
            format_sha256_hex(&empty_hash),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_extract_skips_entries_outside_dest() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("dest");
        fs::create_dir(&dest).unwrap();
        let mut builder = tar::Builder::new(Vec::new());

        // Builder::append_data refuses `..`, so write the name by hand.
        let data = b"gotcha";
        let mut header = tar::Header::new_old();
        let name = b"../escape";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &data[..]).unwrap();

        let data = b"ok";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, "pkg/README", &data[..])
            .unwrap();
        let bytes = builder.into_inner().unwrap();

        let count = extract_tar(&bytes[..], &dest).unwrap();
        assert_eq!(count, 1);
        assert!(!dir.path().join("escape").exists());
        assert_eq!(fs::read_to_string(dest.join("pkg/README")).unwrap(), "ok");
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_keeps_relative_symlinks() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut builder = tar::Builder::new(Vec::new());

        let data = b"read me";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, "pkg/README", &data[..])
            .unwrap();

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder
            .append_link(&mut header, "pkg/README.link", "README")
            .unwrap();
        let bytes = builder.into_inner().unwrap();

        let count = extract_tar(&bytes[..], dir.path()).unwrap();
        assert_eq!(count, 2);
        let link = dir.path().join("pkg/README.link");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("README"));
        assert_eq!(fs::read_to_string(&link).unwrap(), "read me");
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_keeps_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let bytes = tar_bytes(&[("tool/build.sh", "#!/bin/sh\n", 0o755)]);
        extract_tar(&bytes[..], dir.path()).unwrap();
        let mode = fs::metadata(dir.path().join("tool/build.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_ne!(mode & 0o111, 0);
    }

    #[test]
    fn test_fetch_and_cleanup() {
        let body = tarball(&[("src-1.0/hello.txt", "hello\n", 0o644)]);
        let url = serve_once(200, body);

        let archive = ExpandedArchive::fetch_with(&test_client(), &url, None).unwrap();
        let root = archive.path().to_path_buf();
        assert!(root
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("cot_helper"));
        assert!(root.join(ARCHIVE_NAME).is_file());
        assert_eq!(
            fs::read_to_string(root.join("src-1.0/hello.txt")).unwrap(),
            "hello\n"
        );

        drop(archive);
        assert!(!root.exists());
    }

    #[test]
    fn test_fetch_verifies_checksum() {
        let body = tarball(&[("a.txt", "a", 0o644)]);
        let good = format_sha256_hex(&Sha256::digest(&body));

        let url = serve_once(200, body.clone());
        ExpandedArchive::fetch_with(&test_client(), &url, Some(&good.to_uppercase())).unwrap();

        let url = serve_once(200, body);
        let err = ExpandedArchive::fetch_with(&test_client(), &url, Some(&"0".repeat(64))).unwrap_err();
        match err {
            HelperError::ChecksumMismatch { actual, .. } => assert_eq!(actual, good),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_fetch_http_error_status() {
        let url = serve_once(404, b"not here".to_vec());
        let err = ExpandedArchive::fetch_with(&test_client(), &url, None).unwrap_err();
        assert!(matches!(err, HelperError::HttpStatus { status: 404, .. }));
    }

    #[test]
    fn test_fetch_corrupt_archive() {
        let url = serve_once(200, b"this is not gzip".to_vec());
        let err = ExpandedArchive::fetch_with(&test_client(), &url, None).unwrap_err();
        assert!(matches!(err, HelperError::Archive { .. }));
    }

    #[test]
    fn test_fetch_rejects_bad_url_before_io() {
        let err = download_and_expand_tgz("ftp://example.com/x.tgz", |_| Ok::<_, HelperError>(()))
            .unwrap_err();
        assert!(matches!(err, HelperError::InvalidUrl { .. }));
    }

    #[test]
    fn test_download_and_expand_removes_dir_on_error() {
        let body = tarball(&[("a.txt", "a", 0o644)]);
        let url = serve_once(200, body);
        let mut seen = None;

        let result: Result<(), HelperError> =
            download_and_expand_tgz_with(&test_client(), &url, None, |dir| {
            seen = Some(dir.to_path_buf());
            assert!(dir.join("a.txt").is_file());
            Err(HelperError::EmptyCommand)
        });

        assert!(matches!(result, Err(HelperError::EmptyCommand)));
        assert!(!seen.unwrap().exists());
    }

    #[test]
    fn test_download_and_expand_removes_dir_on_panic() {
        let body = tarball(&[("a.txt", "a", 0o644)]);
        let url = serve_once(200, body);
        let seen = std::sync::Mutex::new(None);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), HelperError> =
                download_and_expand_tgz_with(&test_client(), &url, None, |dir| {
                *seen.lock().unwrap() = Some(dir.to_path_buf());
                panic!("build exploded");
            });
        }));

        assert!(outcome.is_err());
        let dir = seen.lock().unwrap().take().unwrap();
        assert!(!dir.exists());
    }
}
