//! Templated URLs.
//!
//! A dynamic descriptor builds its address as `prefix + identifier + suffix`,
//! where the identifier is a property of the local device computed at
//! resolution time.

use super::{fetch, RemoteFile};
use crate::command::{self, CommandRunner};
use crate::document::get_string;
use failure::{Fallible, ResultExt};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

/// Build information for the running image.
static VERSION_FILE: &str = "/etc/sonic/sonic_version.yml";
static VERSION_KEY: &str = "build_version";

/// Device property substituted into a dynamic URL.
#[derive(Clone, Debug)]
pub(crate) enum Identifier {
    Hostname,
    HostnameFqdn,
    SerialNumber,
    ProductName,
    SonicVersion,
    /// Script whose first output line is the identifier.
    Script(RemoteFile),
}

impl Identifier {
    fn parse(value: &Value, default_timeout: Duration) -> Fallible<Self> {
        let id = match value {
            Value::String(s) => match s.as_str() {
                "hostname" => Identifier::Hostname,
                "hostname-fqdn" => Identifier::HostnameFqdn,
                "serial-number" => Identifier::SerialNumber,
                "product-name" => Identifier::ProductName,
                "sonic-version" => Identifier::SonicVersion,
                x => bail!("unsupported identifier '{}'", x),
            },
            Value::Object(obj) => match obj.get("url") {
                Some(url) => Identifier::Script(RemoteFile::from_static(url, default_timeout)?),
                None => bail!("identifier object requires a 'url' field"),
            },
            v => bail!("invalid identifier: {}", v),
        };
        Ok(id)
    }
}

/// Parse a dynamic descriptor, computing its final source address.
pub(crate) fn from_dynamic(
    descriptor: &Value,
    default_timeout: Duration,
    probe: &IdentifierProbe,
) -> Fallible<RemoteFile> {
    let obj = match descriptor.as_object() {
        Some(obj) => obj,
        None => bail!("dynamic URL descriptor is not a JSON object"),
    };
    let source = match obj.get("source").and_then(Value::as_object) {
        Some(source) => source,
        None => bail!("missing 'source' object in dynamic URL descriptor"),
    };

    let address = expand_source(source, default_timeout, probe)?;
    debug!("dynamic URL expanded to '{}'", address);
    RemoteFile::with_options(&address, obj, default_timeout)
}

fn expand_source(
    source: &Map<String, Value>,
    default_timeout: Duration,
    probe: &IdentifierProbe,
) -> Fallible<String> {
    let prefix = get_string(source, "prefix")?.unwrap_or_default();
    let suffix = get_string(source, "suffix")?.unwrap_or_default();
    let identifier = match source.get("identifier") {
        Some(v) if !v.is_null() => Identifier::parse(v, default_timeout)?,
        _ => bail!("missing 'identifier' in dynamic URL source"),
    };
    let value = probe.value(&identifier)?;
    Ok(format!("{}{}{}", prefix, value, suffix))
}

/// Computes identifier values on the local device.
pub(crate) struct IdentifierProbe<'a> {
    runner: &'a dyn CommandRunner,
    script_path: PathBuf,
    version_file: PathBuf,
}

impl<'a> IdentifierProbe<'a> {
    pub(crate) fn new(runner: &'a dyn CommandRunner, script_path: PathBuf) -> Self {
        Self {
            runner,
            script_path,
            version_file: PathBuf::from(VERSION_FILE),
        }
    }

    pub(crate) fn value(&self, identifier: &Identifier) -> Fallible<String> {
        let value = match identifier {
            Identifier::Hostname => self.command_line(&["hostname"])?,
            Identifier::HostnameFqdn => self.command_line(&["hostname", "-f"])?,
            Identifier::SerialNumber => self.command_line(&["decode-syseeprom", "-s"])?,
            Identifier::ProductName => self.command_line(&["decode-syseeprom", "-p"])?,
            Identifier::SonicVersion => self.sonic_version()?,
            Identifier::Script(remote) => self.script_output(remote)?,
        };
        ensure!(!value.is_empty(), "empty value for identifier {:?}", identifier);
        Ok(value)
    }

    fn command_line(&self, parts: &[&str]) -> Fallible<String> {
        self.run_first_line(&command::argv(parts))
    }

    fn run_first_line(&self, argv: &[String]) -> Fallible<String> {
        let out = self.runner.run(argv);
        if !out.success() {
            bail!(
                "'{}' failed with exit code {}: {}",
                command::display(argv),
                out.status,
                out.stderr.trim()
            );
        }
        Ok(out.first_line().unwrap_or_default().to_string())
    }

    fn sonic_version(&self) -> Fallible<String> {
        let content = std::fs::read_to_string(&self.version_file)
            .context(format!("failed to read '{}'", self.version_file.display()))?;
        let version = content
            .lines()
            .filter_map(|line| {
                let mut kv = line.splitn(2, ':');
                match (kv.next(), kv.next()) {
                    (Some(k), Some(v)) if k.trim() == VERSION_KEY => Some(v),
                    _ => None,
                }
            })
            .next()
            .map(|v| v.trim().trim_matches(|c| c == '\'' || c == '"').to_string());
        match version {
            Some(v) => Ok(v),
            None => bail!(
                "no '{}' entry in '{}'",
                VERSION_KEY,
                self.version_file.display()
            ),
        }
    }

    fn script_output(&self, remote: &RemoteFile) -> Fallible<String> {
        let status = fetch::fetch(remote, &self.script_path);
        if status.code != 0 {
            bail!(
                "failed to download identifier script '{}', status {}",
                remote.source,
                status.code
            );
        }

        let result = self.run_script();
        if let Err(e) = std::fs::remove_file(&self.script_path) {
            warn!(
                "failed to remove '{}': {}",
                self.script_path.display(),
                e
            );
        }
        result
    }

    fn run_script(&self) -> Fallible<String> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            std::fs::set_permissions(&self.script_path, perms).context(format!(
                "failed to make '{}' executable",
                self.script_path.display()
            ))?;
        }
        let argv = vec![self.script_path.to_string_lossy().into_owned()];
        self.run_first_line(&argv)
    }
}
