//! Configuration applier.
//!
//! `ConfigApplier` drives a single plugin run: it downloads the
//! configuration referenced by the provisioning document, validates it,
//! loads it into the running configuration database and optionally
//! persists it as startup configuration. Every step either succeeds or
//! ends the run; nothing is retried.

use crate::activity::ActivityReporter;
use crate::command::{self, CommandRunner};
use crate::config::PluginConfig;
use crate::document::{ProvisioningDocument, SectionSpec};
use crate::errors::PluginError;
use crate::url::{UrlResolver, UrlSource};
use crate::ztp_mode;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Where the staged file ends up after a successful apply.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum FinalDestination {
    /// Destination requested by the URL descriptor.
    Explicit(PathBuf),
    /// Canonical startup path, used after a full reload.
    Default(PathBuf),
    /// Incremental loads without a destination keep nothing.
    Discard,
}

impl FinalDestination {
    pub(crate) fn resolve(explicit: Option<PathBuf>, clear_config: bool, default: &Path) -> Self {
        match (explicit, clear_config) {
            (Some(path), _) => FinalDestination::Explicit(path),
            (None, true) => FinalDestination::Default(default.to_path_buf()),
            (None, false) => FinalDestination::Discard,
        }
    }
}

/// Orchestrator for a single `config_db.json` provisioning run.
pub(crate) struct ConfigApplier<'a> {
    config: &'a PluginConfig,
    resolver: &'a dyn UrlResolver,
    runner: &'a dyn CommandRunner,
    activity: &'a dyn ActivityReporter,
}

impl<'a> ConfigApplier<'a> {
    pub(crate) fn new(
        config: &'a PluginConfig,
        resolver: &'a dyn UrlResolver,
        runner: &'a dyn CommandRunner,
        activity: &'a dyn ActivityReporter,
    ) -> Self {
        Self {
            config,
            resolver,
            runner,
            activity,
        }
    }

    /// Process the provisioning document at `document`.
    pub(crate) fn run(&self, document: &Path) -> Result<(), PluginError> {
        let doc = ProvisioningDocument::read(document)?;
        let (name, body) = doc
            .first_section()
            .ok_or_else(|| PluginError::fatal("Missing valid config data"))?;
        debug!("processing section '{}'", name);

        let spec = SectionSpec::parse(body)?;
        let url = self.resolver.resolve(spec.url_kind, &spec.url)?;
        let source = url.source();

        // Download.
        let staging = &self.config.paths.staging;
        self.activity
            .update(&format!("Downloading config_db.json from '{}'", source));
        let status = url.download(staging);
        let staged = match status.path {
            Some(path) if status.code == 0 => path,
            _ => {
                return Err(PluginError::fatal(format!(
                    "Failed to download '{}', status code {}",
                    source, status.code
                )))
            }
        };
        if !staged.exists() {
            return Err(PluginError::fatal(format!("Download of '{}' failed", source)));
        }

        // Validate.
        if let Err(e) = validate_json(&staged) {
            discard(&staged);
            return Err(PluginError::fatal(format!(
                "Invalid JSON in file downloaded from '{}': {}",
                source, e
            )));
        }

        // Apply.
        let verb = if spec.clear_config {
            ztp_mode::stop_ztp_dhcp(self.runner, self.activity, &self.config.commands);
            "reload"
        } else {
            "load"
        };
        let staged_arg = staged.to_string_lossy();
        let apply = command::argv(&[
            self.config.commands.config_cli.as_str(),
            verb,
            "-y",
            &*staged_arg,
        ]);
        self.activity
            .update(&format!("Applying config_db.json using 'config {}'", verb));
        if let Err(e) = self.run_checked(&apply) {
            discard(&staged);
            return Err(e);
        }

        // Move into place.
        let destination = FinalDestination::resolve(
            url.destination(),
            spec.clear_config,
            &self.config.paths.default_destination,
        );
        match destination {
            FinalDestination::Explicit(path) | FinalDestination::Default(path) => {
                if let Err(e) = move_file(&staged, &path) {
                    discard(&staged);
                    return Err(PluginError::fatal(format!(
                        "Failed to move '{}' to '{}': {}",
                        staged.display(),
                        path.display(),
                        e
                    )));
                }
                info!("configuration file stored at '{}'", path.display());
            }
            FinalDestination::Discard => discard(&staged),
        }

        if !spec.clear_config || spec.save_config {
            ztp_mode::stop_ztp_dhcp(self.runner, self.activity, &self.config.commands);
        }

        // Persist.
        if spec.save_config {
            self.activity
                .update("Saving running configuration as startup configuration");
            let save = command::argv(&[self.config.commands.config_cli.as_str(), "save", "-y"]);
            self.run_checked(&save)?;
        }

        self.activity
            .update(&format!("Configuration from '{}' applied", source));
        Ok(())
    }

    /// Run a command, turning a non-zero exit into a propagated error.
    fn run_checked(&self, argv: &[String]) -> Result<(), PluginError> {
        let out = self.runner.run(argv);
        if out.success() {
            return Ok(());
        }

        let command = command::display(argv);
        error!(
            "'{}' failed with exit code {}: {}",
            command,
            out.status,
            out.stderr.trim()
        );
        Err(PluginError::Command {
            command,
            code: out.status,
        })
    }
}

/// Check that `path` holds a syntactically valid JSON document.
fn validate_json(path: &Path) -> failure::Fallible<()> {
    let file = fs::File::open(path)?;
    serde_json::from_reader::<_, serde::de::IgnoredAny>(BufReader::new(file))?;
    Ok(())
}

/// Best-effort removal of an abandoned staged file.
fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(_) => trace!("removed '{}'", path.display()),
        Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove '{}': {}", path.display(), e),
    }
}

/// Move `src` to `dst`, copying when a plain rename is not possible.
///
/// `dst` is either fully replaced or left untouched.
fn move_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    let parent = match dst.parent() {
        Some(parent) => parent,
        None => return fs::rename(src, dst),
    };
    fs::create_dir_all(parent)?;
    if let Err(e) = fs::rename(src, dst) {
        debug!("rename to '{}' failed ({}), copying instead", dst.display(), e);
        copy_into_place(src, dst, parent)?;
        if let Err(e) = fs::remove_file(src) {
            warn!("failed to remove '{}': {}", src.display(), e);
        }
    }
    Ok(())
}

/// Copy `src` to a scratch file in `dir`, then rename it onto `dst`.
fn copy_into_place(src: &Path, dst: &Path, dir: &Path) -> std::io::Result<()> {
    let mut input = fs::File::open(src)?;
    let mut scratch = tempfile::NamedTempFile::new_in(dir)?;
    std::io::copy(&mut input, scratch.as_file_mut())?;
    scratch.as_file().sync_all()?;
    fs::set_permissions(scratch.path(), input.metadata()?.permissions())?;
    scratch.persist(dst).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::config::{Commands, Paths};
    use crate::url::{DownloadStatus, UrlKind};
    use serde_json::Value;
    use std::cell::{Cell, RefCell};
    use std::time::Duration;
    use tempfile::TempDir;

    static VALID_CONFIG: &str = r#"{"DEVICE_METADATA": {"localhost": {"hostname": "leaf01"}}}"#;

    /// Source writing a canned payload, or failing with a status code.
    struct CannedSource {
        payload: Option<&'static str>,
        destination: Option<PathBuf>,
        /// Claim success without writing anything.
        lie: bool,
    }

    impl UrlSource for CannedSource {
        fn source(&self) -> String {
            "http://10.0.0.1/config_db.json".to_string()
        }

        fn destination(&self) -> Option<PathBuf> {
            self.destination.clone()
        }

        fn download(&self, destination: &Path) -> DownloadStatus {
            if self.lie {
                return DownloadStatus::ok(destination);
            }
            match self.payload {
                Some(p) => {
                    fs::write(destination, p).unwrap();
                    DownloadStatus::ok(destination)
                }
                None => DownloadStatus::failed(7),
            }
        }
    }

    struct CannedResolver {
        payload: Option<&'static str>,
        destination: Option<PathBuf>,
        lie: bool,
        resolved: Cell<usize>,
    }

    impl CannedResolver {
        fn serving(payload: Option<&'static str>) -> Self {
            Self {
                payload,
                destination: None,
                lie: false,
                resolved: Cell::new(0),
            }
        }
    }

    impl UrlResolver for CannedResolver {
        fn resolve(
            &self,
            _kind: UrlKind,
            descriptor: &Value,
        ) -> failure::Fallible<Box<dyn UrlSource>> {
            self.resolved.set(self.resolved.get() + 1);
            ensure!(descriptor.is_string() || descriptor.is_object(), "bad descriptor");
            Ok(Box::new(CannedSource {
                payload: self.payload,
                destination: self.destination.clone(),
                lie: self.lie,
            }))
        }
    }

    /// Runner recording calls, with scripted exit codes for config commands.
    struct ScriptedRunner {
        ztp_active: bool,
        apply_status: i32,
        save_status: i32,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new() -> Self {
            Self {
                ztp_active: true,
                apply_status: 0,
                save_status: 0,
                calls: RefCell::new(vec![]),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn count(&self, needle: &str) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|c| c.contains(needle))
                .count()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, argv: &[String]) -> CommandOutput {
            self.calls.borrow_mut().push(command::display(argv));
            let status = match argv.get(1).map(String::as_str) {
                Some("reload") | Some("load") => self.apply_status,
                Some("save") => self.save_status,
                _ => 0,
            };
            let stdout_lines = if argv.iter().any(|a| a == "HGET") && self.ztp_active {
                vec!["active".to_string()]
            } else {
                vec![]
            };
            CommandOutput {
                status,
                stdout_lines,
                stderr: String::new(),
            }
        }
    }

    #[derive(Default)]
    struct Notes(RefCell<Vec<String>>);

    impl ActivityReporter for Notes {
        fn update(&self, message: &str) {
            self.0.borrow_mut().push(message.to_string());
        }
    }

    struct Fixture {
        tmp: TempDir,
        config: PluginConfig,
        notes: Notes,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let config = PluginConfig {
                paths: Paths {
                    staging: tmp.path().join("config_dl.json"),
                    default_destination: tmp.path().join("etc/sonic/config_db.json"),
                    activity_file: tmp.path().join("activity"),
                    identifier_script: tmp.path().join("identifier.sh"),
                },
                commands: Commands {
                    store_cli: "redis-cli".to_string(),
                    config_cli: "config".to_string(),
                    systemctl: "systemctl".to_string(),
                },
                download_timeout: Duration::from_secs(5),
            };
            Self {
                tmp,
                config,
                notes: Notes::default(),
            }
        }

        fn document(&self, content: &str) -> PathBuf {
            let path = self.tmp.path().join("input.json");
            fs::write(&path, content).unwrap();
            path
        }

        fn run(
            &self,
            content: &str,
            resolver: &CannedResolver,
            runner: &ScriptedRunner,
        ) -> Result<(), PluginError> {
            let doc = self.document(content);
            ConfigApplier::new(&self.config, resolver, runner, &self.notes).run(&doc)
        }

        fn activity(&self) -> Vec<String> {
            self.notes.0.borrow().clone()
        }

        fn staging(&self) -> &Path {
            &self.config.paths.staging
        }

        fn default_destination(&self) -> &Path {
            &self.config.paths.default_destination
        }
    }

    #[test]
    fn destination_table() {
        let default = Path::new("/etc/sonic/config_db.json");
        let explicit = PathBuf::from("/etc/sonic/alt.json");
        assert_eq!(
            FinalDestination::resolve(Some(explicit.clone()), true, default),
            FinalDestination::Explicit(explicit.clone())
        );
        assert_eq!(
            FinalDestination::resolve(Some(explicit.clone()), false, default),
            FinalDestination::Explicit(explicit)
        );
        assert_eq!(
            FinalDestination::resolve(None, true, default),
            FinalDestination::Default(default.to_path_buf())
        );
        assert_eq!(
            FinalDestination::resolve(None, false, default),
            FinalDestination::Discard
        );
    }

    #[test]
    fn empty_document() {
        let fx = Fixture::new();
        let resolver = CannedResolver::serving(Some(VALID_CONFIG));
        let runner = ScriptedRunner::new();

        let err = fx.run("{}", &resolver, &runner).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "Missing valid config data");
        assert!(runner.calls().is_empty());
        assert_eq!(resolver.resolved.get(), 0);
    }

    #[test]
    fn unparsable_document() {
        let fx = Fixture::new();
        let resolver = CannedResolver::serving(Some(VALID_CONFIG));
        let runner = ScriptedRunner::new();

        let err = fx.run("{ nope", &resolver, &runner).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn missing_url() {
        let fx = Fixture::new();
        let resolver = CannedResolver::serving(Some(VALID_CONFIG));
        let runner = ScriptedRunner::new();

        let err = fx
            .run(r#"{"configdb-json": {"save-config": true}}"#, &resolver, &runner)
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(
            err.to_string(),
            "Either a URL or a dynamic URL should be provided"
        );
        assert_eq!(resolver.resolved.get(), 0);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn malformed_options() {
        let fx = Fixture::new();
        let resolver = CannedResolver::serving(Some(VALID_CONFIG));
        let runner = ScriptedRunner::new();

        let doc = r#"{"configdb-json": {"url": 12}}"#;
        assert_eq!(fx.run(doc, &resolver, &runner).unwrap_err().exit_code(), 1);
        let doc = r#"{"configdb-json": {"url": "http://x/y", "clear-config": []}}"#;
        assert_eq!(fx.run(doc, &resolver, &runner).unwrap_err().exit_code(), 1);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn invalid_json_payload() {
        let fx = Fixture::new();
        let resolver = CannedResolver::serving(Some("{\"DEVICE_METADATA\": "));
        let runner = ScriptedRunner::new();

        let err = fx
            .run(r#"{"configdb-json": {"url": "http://x/y"}}"#, &resolver, &runner)
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(!fx.staging().exists());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn download_claimed_but_missing() {
        let fx = Fixture::new();
        let mut resolver = CannedResolver::serving(Some(VALID_CONFIG));
        resolver.lie = true;
        let runner = ScriptedRunner::new();

        let err = fx
            .run(r#"{"configdb-json": {"url": "http://x/y"}}"#, &resolver, &runner)
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().starts_with("Download of"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn full_reload_stores_default_destination() {
        let fx = Fixture::new();
        let resolver = CannedResolver::serving(Some(VALID_CONFIG));
        let runner = ScriptedRunner::new();

        fx.run(r#"{"configdb-json": {"url": "http://x/y"}}"#, &resolver, &runner)
            .unwrap();
        assert!(!fx.staging().exists());
        assert_eq!(
            fs::read_to_string(fx.default_destination()).unwrap(),
            VALID_CONFIG
        );
        let reload = format!("config reload -y {}", fx.staging().display());
        assert_eq!(
            runner.calls(),
            vec![
                "redis-cli -n 4 HGET ZTP|mode profile".to_string(),
                "redis-cli -n 4 DEL ZTP|mode".to_string(),
                "systemctl restart interfaces-config".to_string(),
                reload,
            ]
        );
    }

    #[test]
    fn incremental_load_discards_staged_file() {
        let fx = Fixture::new();
        let resolver = CannedResolver::serving(Some(VALID_CONFIG));
        let runner = ScriptedRunner::new();

        let doc = r#"{"configdb-json": {"url": "http://x/y", "clear-config": false}}"#;
        fx.run(doc, &resolver, &runner).unwrap();
        assert!(!fx.staging().exists());
        assert!(!fx.default_destination().exists());

        let calls = runner.calls();
        assert_eq!(calls[0], format!("config load -y {}", fx.staging().display()));
        // DHCP teardown only happens after the load.
        assert_eq!(runner.count("HGET"), 1);
        assert_eq!(calls[1], "redis-cli -n 4 HGET ZTP|mode profile");
    }

    #[test]
    fn explicit_destination() {
        let fx = Fixture::new();
        let target = fx.tmp.path().join("custom/dir/config_db.json");
        let mut resolver = CannedResolver::serving(Some(VALID_CONFIG));
        resolver.destination = Some(target.clone());
        let runner = ScriptedRunner::new();

        let doc = r#"{"configdb-json": {"url": {"source": "http://x/y"}, "clear-config": false}}"#;
        fx.run(doc, &resolver, &runner).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), VALID_CONFIG);
        assert!(!fx.staging().exists());
        assert!(!fx.default_destination().exists());
    }

    #[test]
    fn save_after_reload_stops_dhcp_twice() {
        let fx = Fixture::new();
        let resolver = CannedResolver::serving(Some(VALID_CONFIG));
        let runner = ScriptedRunner::new();

        let doc = r#"{"configdb-json": {"url": "http://x/y", "save-config": true}}"#;
        fx.run(doc, &resolver, &runner).unwrap();
        assert_eq!(runner.count("HGET"), 2);
        assert_eq!(runner.calls().last().unwrap(), "config save -y");
        assert_eq!(
            fx.activity(),
            vec![
                "Downloading config_db.json from 'http://10.0.0.1/config_db.json'",
                "Stopping ZTP DHCP discovery on interfaces",
                "Applying config_db.json using 'config reload'",
                "Stopping ZTP DHCP discovery on interfaces",
                "Saving running configuration as startup configuration",
                "Configuration from 'http://10.0.0.1/config_db.json' applied",
            ]
        );
    }

    #[test]
    fn blocked_destination_is_fatal() {
        let fx = Fixture::new();
        let blocker = fx.default_destination().join("keep");
        fs::create_dir_all(&blocker).unwrap();
        let resolver = CannedResolver::serving(Some(VALID_CONFIG));
        let runner = ScriptedRunner::new();

        let err = fx
            .run(r#"{"configdb-json": {"url": "http://x/y"}}"#, &resolver, &runner)
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().starts_with("Failed to move"));
        assert!(!fx.staging().exists());
        assert!(blocker.is_dir());
        assert_eq!(runner.count("config save"), 0);

        let parent = fx.default_destination().parent().unwrap();
        let leftovers: Vec<_> = fs::read_dir(parent).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn reload_without_save_stops_dhcp_once() {
        let fx = Fixture::new();
        let resolver = CannedResolver::serving(Some(VALID_CONFIG));
        let runner = ScriptedRunner::new();

        let doc = r#"{"configdb-json": {"url": "http://x/y", "save-config": false}}"#;
        fx.run(doc, &resolver, &runner).unwrap();
        assert_eq!(runner.count("HGET"), 1);
        assert_eq!(runner.count("config save"), 0);
    }

    #[test]
    fn apply_failure_propagates_exit_code() {
        let fx = Fixture::new();
        let resolver = CannedResolver::serving(Some(VALID_CONFIG));
        let mut runner = ScriptedRunner::new();
        runner.apply_status = 42;

        let err = fx
            .run(r#"{"configdb-json": {"url": "http://x/y"}}"#, &resolver, &runner)
            .unwrap_err();
        assert_eq!(err.exit_code(), 42);
        assert!(!fx.staging().exists());
        assert!(!fx.default_destination().exists());
    }

    #[test]
    fn save_failure_propagates_exit_code() {
        let fx = Fixture::new();
        let resolver = CannedResolver::serving(Some(VALID_CONFIG));
        let mut runner = ScriptedRunner::new();
        runner.save_status = 3;

        let doc = r#"{"configdb-json": {"url": "http://x/y", "save-config": true}}"#;
        let err = fx.run(doc, &resolver, &runner).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(fx.default_destination().exists());
    }

    #[test]
    fn unreachable_url_is_repeatable() {
        let fx = Fixture::new();
        let resolver = CannedResolver::serving(None);
        let runner = ScriptedRunner::new();

        for _ in 0..2 {
            let err = fx
                .run(r#"{"configdb-json": {"url": "http://x/y"}}"#, &resolver, &runner)
                .unwrap_err();
            assert_eq!(err.exit_code(), 1);
            assert!(!fx.staging().exists());
        }
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn extra_sections_are_ignored() {
        let fx = Fixture::new();
        let resolver = CannedResolver::serving(Some(VALID_CONFIG));
        let runner = ScriptedRunner::new();

        let doc = r#"{"configdb-json": {"url": "http://x/y"}, "other": {"bogus": true}}"#;
        fx.run(doc, &resolver, &runner).unwrap();
        assert_eq!(resolver.resolved.get(), 1);
    }

    #[test]
    fn inactive_ztp_skips_teardown() {
        let fx = Fixture::new();
        let resolver = CannedResolver::serving(Some(VALID_CONFIG));
        let mut runner = ScriptedRunner::new();
        runner.ztp_active = false;

        fx.run(r#"{"configdb-json": {"url": "http://x/y"}}"#, &resolver, &runner)
            .unwrap();
        assert_eq!(runner.count("DEL"), 0);
        assert_eq!(runner.count("systemctl"), 0);
    }

    #[test]
    fn move_file_creates_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("a.json");
        fs::write(&src, "{}").unwrap();
        let dst = tmp.path().join("x/y/b.json");

        move_file(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "{}");
    }

    #[test]
    fn copy_into_place_replaces_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("dl.json");
        fs::write(&src, VALID_CONFIG).unwrap();
        let dir = tmp.path().join("sonic");
        fs::create_dir_all(&dir).unwrap();
        let dst = dir.join("config_db.json");
        fs::write(&dst, "{}").unwrap();

        copy_into_place(&src, &dst, &dir).unwrap();
        assert_eq!(fs::read_to_string(&dst).unwrap(), VALID_CONFIG);
        assert!(src.exists());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
    }

    #[test]
    fn failed_copy_keeps_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("sonic");
        fs::create_dir_all(&dir).unwrap();
        let dst = dir.join("config_db.json");
        fs::write(&dst, "{}").unwrap();

        copy_into_place(&tmp.path().join("missing.json"), &dst, &dir).unwrap_err();
        assert_eq!(fs::read_to_string(&dst).unwrap(), "{}");
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);

        // Scratch file is discarded when it cannot replace a directory.
        let src = tmp.path().join("dl.json");
        fs::write(&src, VALID_CONFIG).unwrap();
        let blocker = dir.join("blocked");
        fs::create_dir_all(blocker.join("keep")).unwrap();
        copy_into_place(&src, &blocker, &dir).unwrap_err();
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 2);
    }
}
