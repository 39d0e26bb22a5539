//! Fixtures shared by the helper tests.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;

/// Writes an executable `/bin/sh` script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

/// Builds an uncompressed tar from `(path, contents, mode)` entries.
pub fn tar_bytes(entries: &[(&str, &str, u32)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(*mode);
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap()
}

/// Builds a `.tar.gz` from `(path, contents, mode)` entries.
pub fn tarball(entries: &[(&str, &str, u32)]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar_bytes(entries)).unwrap();
    encoder.finish().unwrap()
}

/// Serves one HTTP response on a loopback port and returns its URL.
pub fn serve_once(status: u16, body: Vec<u8>) -> String {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();

    thread::spawn(move || {
        let request = match server.recv() {
            Ok(request) => request,
            Err(_) => return,
        };
        let content_type =
            tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/gzip"[..]).unwrap();
        let response = tiny_http::Response::from_data(body)
            .with_status_code(tiny_http::StatusCode(status))
            .with_header(content_type);
        let _ = request.respond(response);
    });

    format!("http://127.0.0.1:{}/helper.tar.gz", port)
}

/// HTTP client that ignores proxy settings from the environment.
pub fn test_client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
}
