//! Blocking transfers for `http`, `https` and `file` sources.
//!
//! Failures are reported with curl exit codes, which the ZTP
//! orchestrator already knows how to interpret.

use super::{DownloadStatus, RemoteFile};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Unsupported protocol.
pub(crate) static CURLE_UNSUPPORTED_PROTOCOL: i32 = 1;
/// Client initialization failure.
pub(crate) static CURLE_FAILED_INIT: i32 = 2;
/// Failed to connect to host.
pub(crate) static CURLE_COULDNT_CONNECT: i32 = 7;
/// HTTP response with an error status.
pub(crate) static CURLE_HTTP_RETURNED_ERROR: i32 = 22;
/// Local write error.
pub(crate) static CURLE_WRITE_ERROR: i32 = 23;
/// Operation timed out.
pub(crate) static CURLE_OPERATION_TIMEDOUT: i32 = 28;
/// Local source file could not be read.
pub(crate) static CURLE_FILE_COULDNT_READ_FILE: i32 = 37;
/// Failure receiving network data.
pub(crate) static CURLE_RECV_ERROR: i32 = 56;

/// Fetch `remote` into `destination`.
pub(crate) fn fetch(remote: &RemoteFile, destination: &Path) -> DownloadStatus {
    trace!("fetching '{}' to {:?}", remote.source, destination);

    let code = match remote.source.scheme() {
        "http" | "https" => fetch_http(remote, destination),
        "file" => fetch_file(remote, destination),
        scheme => {
            error!("unsupported URL scheme '{}'", scheme);
            CURLE_UNSUPPORTED_PROTOCOL
        }
    };

    if code == 0 {
        debug!("downloaded '{}' to {:?}", remote.source, destination);
        DownloadStatus::ok(destination)
    } else {
        DownloadStatus::failed(code)
    }
}

fn fetch_http(remote: &RemoteFile, destination: &Path) -> i32 {
    let client = match reqwest::Client::builder()
        .timeout(remote.timeout)
        .danger_accept_invalid_certs(!remote.secure)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            error!("failed to build HTTP client: {}", e);
            return CURLE_FAILED_INIT;
        }
    };

    trace!("GET to remote source: {:?}", remote.source);
    let resp = match client.get(remote.source.clone()).send() {
        Ok(resp) => resp,
        Err(e) => {
            error!("{}", e);
            return if is_timeout(&e) {
                CURLE_OPERATION_TIMEDOUT
            } else {
                CURLE_COULDNT_CONNECT
            };
        }
    };

    if !resp.status().is_success() {
        error!("'{}' returned HTTP status {}", remote.source, resp.status());
        return CURLE_HTTP_RETURNED_ERROR;
    }

    copy_to_file(resp, destination, CURLE_RECV_ERROR)
}

fn is_timeout(err: &reqwest::Error) -> bool {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<io::Error>())
        .map_or(false, |io_err| io_err.kind() == io::ErrorKind::TimedOut)
}

fn fetch_file(remote: &RemoteFile, destination: &Path) -> i32 {
    let path = match remote.source.to_file_path() {
        Ok(p) => p,
        Err(_) => {
            error!("invalid file URL '{}'", remote.source);
            return CURLE_FILE_COULDNT_READ_FILE;
        }
    };

    match File::open(&path) {
        Ok(src) => copy_to_file(src, destination, CURLE_FILE_COULDNT_READ_FILE),
        Err(e) => {
            error!("failed to open '{}': {}", path.display(), e);
            CURLE_FILE_COULDNT_READ_FILE
        }
    }
}

/// Stream `reader` into a fresh `destination` file.
///
/// No partial file is left behind on failure.
fn copy_to_file<R: Read>(mut reader: R, destination: &Path, read_error: i32) -> i32 {
    let mut file = match File::create(destination) {
        Ok(f) => f,
        Err(e) => {
            error!("failed to create '{}': {}", destination.display(), e);
            return CURLE_WRITE_ERROR;
        }
    };

    let mut buf = [0u8; 8192];
    let code = loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break file.sync_all().map_or(CURLE_WRITE_ERROR, |_| 0),
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("failed to read source data: {}", e);
                break if e.kind() == io::ErrorKind::TimedOut {
                    CURLE_OPERATION_TIMEDOUT
                } else {
                    read_error
                };
            }
        };
        if let Err(e) = file.write_all(&buf[..n]) {
            error!("failed to write '{}': {}", destination.display(), e);
            break CURLE_WRITE_ERROR;
        }
    };

    if code != 0 {
        drop(file);
        let _ = std::fs::remove_file(destination);
    }
    code
}
