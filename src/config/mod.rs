//! Configuration parsing and validation.
//!
//! This module contains three logical entities:
//!  * Snippets: single configuration files, holding a subset of configuration entries.
//!  * Inputs: configuration snippets merged, but not yet validated.
//!  * PluginConfig: validated configuration for the plugin.

mod inputs;
mod snippets;

use failure::{Fallible, ResultExt};
use std::path::PathBuf;
use std::time::Duration;

/// Base directories for configuration drop-ins, in increasing priority.
pub(crate) static CONFIG_DIRS: [&str; 3] = ["/usr/lib", "/run", "/etc"];

static DEFAULT_STAGING: &str = "/tmp/config_dl.json";
static DEFAULT_DESTINATION: &str = "/etc/sonic/config_db.json";
static DEFAULT_ACTIVITY_FILE: &str = "/var/run/ztp/activity";
static DEFAULT_IDENTIFIER_SCRIPT: &str = "/tmp/ztp_identifier.sh";
static DEFAULT_STORE_CLI: &str = "redis-cli";
static DEFAULT_CONFIG_CLI: &str = "config";
static DEFAULT_SYSTEMCTL: &str = "systemctl";
static DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Runtime configuration for the plugin.
///
/// It holds validated plugin configuration.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct PluginConfig {
    pub(crate) paths: Paths,
    pub(crate) commands: Commands,
    pub(crate) download_timeout: Duration,
}

/// Filesystem locations used during a run.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct Paths {
    pub(crate) staging: PathBuf,
    pub(crate) default_destination: PathBuf,
    pub(crate) activity_file: PathBuf,
    pub(crate) identifier_script: PathBuf,
}

/// External tools invoked by the plugin.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct Commands {
    pub(crate) store_cli: String,
    pub(crate) config_cli: String,
    pub(crate) systemctl: String,
}

impl PluginConfig {
    pub(crate) fn read_config(dirs: &[PathBuf]) -> Fallible<Self> {
        let cfg = inputs::ConfigInput::read_config(dirs)?;
        Self::try_from_input(cfg)
    }

    /// Validate inputs and return a valid plugin configuration.
    fn try_from_input(cfg: inputs::ConfigInput) -> Fallible<Self> {
        let paths = Paths {
            staging: abs_path("paths.staging", cfg.paths.staging, DEFAULT_STAGING)?,
            default_destination: abs_path(
                "paths.default_destination",
                cfg.paths.default_destination,
                DEFAULT_DESTINATION,
            )?,
            activity_file: abs_path(
                "paths.activity_file",
                cfg.paths.activity_file,
                DEFAULT_ACTIVITY_FILE,
            )?,
            identifier_script: abs_path(
                "paths.identifier_script",
                cfg.paths.identifier_script,
                DEFAULT_IDENTIFIER_SCRIPT,
            )?,
        };
        if paths.staging == paths.default_destination {
            bail!(
                "staging path and default destination must differ, both are '{}'",
                paths.staging.display()
            );
        }

        let commands = Commands {
            store_cli: or_default(cfg.commands.store_cli, DEFAULT_STORE_CLI),
            config_cli: or_default(cfg.commands.config_cli, DEFAULT_CONFIG_CLI),
            systemctl: or_default(cfg.commands.systemctl, DEFAULT_SYSTEMCTL),
        };

        let download_timeout = match cfg.download.timeout_secs {
            Some(0) => bail!("download.timeout_secs must be greater than zero"),
            Some(t) => Duration::from_secs(t),
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let state = PluginConfig {
            paths,
            commands,
            download_timeout,
        };
        debug!(
            "Runtime configuration:\n{}",
            serde_json::to_string_pretty(&state).context("failed to serialize configuration")?
        );

        Ok(state)
    }
}

fn or_default(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        String::from(default)
    } else {
        value
    }
}

fn abs_path(key: &str, value: String, default: &str) -> Fallible<PathBuf> {
    let path = PathBuf::from(or_default(value, default));
    ensure!(
        path.is_absolute(),
        "{} must be an absolute path, got '{}'",
        key,
        path.display()
    );
    Ok(path)
}
