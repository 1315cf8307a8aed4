/// Top-level configuration stanza.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConfigSnippet {
    /// Filesystem locations.
    pub(crate) paths: Option<PathsSnippet>,
    /// External tools.
    pub(crate) commands: Option<CommandsSnippet>,
    /// Download tuning.
    pub(crate) download: Option<DownloadSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PathsSnippet {
    /// Staging path for the downloaded file (default: /tmp/config_dl.json)
    pub(crate) staging: Option<String>,
    /// Destination after a full reload, when none is given (default: /etc/sonic/config_db.json)
    pub(crate) default_destination: Option<String>,
    pub(crate) activity_file: Option<String>,
    /// Scratch path for dynamic-URL identifier scripts.
    pub(crate) identifier_script: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CommandsSnippet {
    /// Key-value store client (default: redis-cli)
    pub(crate) store_cli: Option<String>,
    /// Config-database management tool (default: config)
    pub(crate) config_cli: Option<String>,
    pub(crate) systemctl: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DownloadSnippet {
    /// Transfer timeout, in seconds.
    pub(crate) timeout_secs: Option<u64>,
}
