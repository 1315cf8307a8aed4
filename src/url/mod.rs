//! URL descriptors and downloads.
//!
//! A section references its payload either through a static `url`
//! descriptor or a templated `dynamic-url` descriptor. Both resolve to a
//! `RemoteFile`, which knows how to fetch itself to a local path.

mod dynamic;
mod fetch;

use crate::command::CommandRunner;
use crate::document::{get_bool, get_string, get_u64};
use failure::{Fallible, ResultExt};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Kind of URL descriptor found in a section.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum UrlKind {
    Static,
    Dynamic,
}

/// Outcome of a download attempt.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DownloadStatus {
    /// Zero on success, a curl-style error code otherwise.
    pub(crate) code: i32,
    /// Local path of the downloaded file, on success.
    pub(crate) path: Option<PathBuf>,
}

impl DownloadStatus {
    pub(crate) fn ok(path: &Path) -> Self {
        Self {
            code: 0,
            path: Some(path.to_path_buf()),
        }
    }

    pub(crate) fn failed(code: i32) -> Self {
        Self { code, path: None }
    }
}

/// A resolved, downloadable source.
pub(crate) trait UrlSource {
    /// Human-readable source address.
    fn source(&self) -> String;
    /// Final destination requested by the descriptor, if any.
    fn destination(&self) -> Option<PathBuf>;
    /// Download to `destination`.
    fn download(&self, destination: &Path) -> DownloadStatus;
}

/// Resolver from raw descriptors to downloadable sources.
pub(crate) trait UrlResolver {
    fn resolve(&self, kind: UrlKind, descriptor: &Value) -> Fallible<Box<dyn UrlSource>>;
}

/// Remote file, as described by a URL descriptor.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct RemoteFile {
    #[serde(with = "url_serde")]
    pub(crate) source: reqwest::Url,
    pub(crate) destination: Option<PathBuf>,
    pub(crate) timeout: Duration,
    /// Whether to verify TLS certificates.
    pub(crate) secure: bool,
}

impl RemoteFile {
    /// Parse a static descriptor: a bare URL string, or an object with `source`.
    pub(crate) fn from_static(descriptor: &Value, default_timeout: Duration) -> Fallible<Self> {
        match descriptor {
            Value::String(source) => Self::with_options(source, &Map::new(), default_timeout),
            Value::Object(obj) => {
                let source = match get_string(obj, "source")? {
                    Some(s) => s,
                    None => bail!("missing 'source' in URL descriptor"),
                };
                Self::with_options(&source, obj, default_timeout)
            }
            v => bail!("invalid URL descriptor: {}", v),
        }
    }

    /// Build from a source address and the common descriptor options.
    fn with_options(
        source: &str,
        obj: &Map<String, Value>,
        default_timeout: Duration,
    ) -> Fallible<Self> {
        let source = reqwest::Url::parse(source.trim())
            .context(format!("invalid URL '{}'", source))?;
        let destination = get_string(obj, "destination")?.map(PathBuf::from);
        let timeout = get_u64(obj, "timeout")?
            .filter(|t| *t > 0)
            .map(Duration::from_secs)
            .unwrap_or(default_timeout);
        let secure = get_bool(obj, "secure", true)?;

        Ok(Self {
            source,
            destination,
            timeout,
            secure,
        })
    }
}

impl UrlSource for RemoteFile {
    fn source(&self) -> String {
        self.source.to_string()
    }

    fn destination(&self) -> Option<PathBuf> {
        self.destination.clone()
    }

    fn download(&self, destination: &Path) -> DownloadStatus {
        fetch::fetch(self, destination)
    }
}

/// Resolver backed by the local host and real network transfers.
pub(crate) struct HostResolver<'a> {
    runner: &'a dyn CommandRunner,
    default_timeout: Duration,
    identifier_script: PathBuf,
}

impl<'a> HostResolver<'a> {
    pub(crate) fn new(
        runner: &'a dyn CommandRunner,
        default_timeout: Duration,
        identifier_script: PathBuf,
    ) -> Self {
        Self {
            runner,
            default_timeout,
            identifier_script,
        }
    }
}

impl<'a> UrlResolver for HostResolver<'a> {
    fn resolve(&self, kind: UrlKind, descriptor: &Value) -> Fallible<Box<dyn UrlSource>> {
        let remote = match kind {
            UrlKind::Static => RemoteFile::from_static(descriptor, self.default_timeout)?,
            UrlKind::Dynamic => {
                let probe =
                    dynamic::IdentifierProbe::new(self.runner, self.identifier_script.clone());
                dynamic::from_dynamic(descriptor, self.default_timeout, &probe)?
            }
        };
        debug!(
            "Resolved URL descriptor:\n{}",
            serde_json::to_string_pretty(&remote)?
        );
        Ok(Box::new(remote))
    }
}
