use crate::config::snippets;
use failure::{Fallible, ResultExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Drop-in directory, relative to each configuration base directory.
static CONFIG_DROPIN_DIR: &str = "ztp-configdb/config.d";

/// Runtime configuration holding environmental inputs.
#[derive(Debug, Serialize)]
pub(crate) struct ConfigInput {
    pub(crate) paths: PathsInput,
    pub(crate) commands: CommandsInput,
    pub(crate) download: DownloadInput,
}

impl ConfigInput {
    /// Read config snippets and merge them into a single config.
    pub(crate) fn read_config(dirs: &[PathBuf]) -> Fallible<Self> {
        let mut snips = vec![];
        for path in collect_dropins(dirs)? {
            trace!("reading config snippet from {:?}", path);
            let content = std::fs::read(&path)
                .context(format!("failed to read file '{}'", path.display()))?;
            let snippet: snippets::ConfigSnippet = toml::from_slice(&content)
                .context(format!("failed to parse TOML in '{}'", path.display()))?;
            snips.push(snippet);
        }

        let cfg = Self::merge_snippets(snips);
        debug!("Configuration input:\n{}", toml::to_string_pretty(&cfg)?);

        Ok(cfg)
    }

    /// Merge multiple snippets into a single configuration.
    fn merge_snippets(snippets: Vec<snippets::ConfigSnippet>) -> Self {
        let mut paths = vec![];
        let mut commands = vec![];
        let mut downloads = vec![];

        for snip in snippets {
            if let Some(p) = snip.paths {
                paths.push(p);
            }
            if let Some(c) = snip.commands {
                commands.push(c);
            }
            if let Some(d) = snip.download {
                downloads.push(d);
            }
        }

        Self {
            paths: PathsInput::from_snippets(paths),
            commands: CommandsInput::from_snippets(commands),
            download: DownloadInput::from_snippets(downloads),
        }
    }
}

/// Collect `*.toml` drop-ins across base directories.
///
/// A later directory masks same-named files from earlier ones; the
/// result is sorted by filename.
fn collect_dropins(dirs: &[PathBuf]) -> Fallible<Vec<PathBuf>> {
    let mut dropins = BTreeMap::new();
    for base in dirs {
        let dir = base.join(CONFIG_DROPIN_DIR);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => bail!("failed to list '{}': {}", dir.display(), e),
        };
        for entry in entries {
            let path = entry?.path();
            if !is_toml(&path) {
                continue;
            }
            if let Some(name) = path.file_name() {
                dropins.insert(name.to_os_string(), path.clone());
            }
        }
    }
    Ok(dropins.into_iter().map(|(_, path)| path).collect())
}

fn is_toml(path: &Path) -> bool {
    path.is_file() && path.extension().map_or(false, |ext| ext == "toml")
}

#[derive(Debug, Serialize)]
pub(crate) struct PathsInput {
    pub(crate) staging: String,
    pub(crate) default_destination: String,
    pub(crate) activity_file: String,
    pub(crate) identifier_script: String,
}

impl PathsInput {
    fn from_snippets(snippets: Vec<snippets::PathsSnippet>) -> Self {
        let mut cfg = Self {
            staging: String::new(),
            default_destination: String::new(),
            activity_file: String::new(),
            identifier_script: String::new(),
        };

        for snip in snippets {
            if let Some(s) = snip.staging {
                cfg.staging = s;
            }
            if let Some(d) = snip.default_destination {
                cfg.default_destination = d;
            }
            if let Some(a) = snip.activity_file {
                cfg.activity_file = a;
            }
            if let Some(i) = snip.identifier_script {
                cfg.identifier_script = i;
            }
        }

        cfg
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CommandsInput {
    pub(crate) store_cli: String,
    pub(crate) config_cli: String,
    pub(crate) systemctl: String,
}

impl CommandsInput {
    fn from_snippets(snippets: Vec<snippets::CommandsSnippet>) -> Self {
        let mut cfg = Self {
            store_cli: String::new(),
            config_cli: String::new(),
            systemctl: String::new(),
        };

        for snip in snippets {
            if let Some(s) = snip.store_cli {
                cfg.store_cli = s;
            }
            if let Some(c) = snip.config_cli {
                cfg.config_cli = c;
            }
            if let Some(s) = snip.systemctl {
                cfg.systemctl = s;
            }
        }

        cfg
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct DownloadInput {
    pub(crate) timeout_secs: Option<u64>,
}

impl DownloadInput {
    fn from_snippets(snippets: Vec<snippets::DownloadSnippet>) -> Self {
        let mut cfg = Self { timeout_secs: None };

        for snip in snippets {
            if let Some(t) = snip.timeout_secs {
                cfg.timeout_secs = Some(t);
            }
        }

        cfg
    }
}
