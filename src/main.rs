//! ztp-configdb: ZTP plugin for `config_db.json` provisioning.
//!
//! This binary is invoked by the ZTP orchestrator with the path to a
//! provisioning document. It downloads the configuration file referenced
//! there, validates it and applies it to the running configuration
//! database, optionally saving it as startup configuration.
//!
//! It is made of a single orchestration step over a few host services:
//!  * `ConfigApplier` - sequences download, validation, apply and save.
//!  * `HostResolver` - turns static and dynamic URL descriptors into downloads.
//!  * `SystemRunner` - runs the external configuration tools.
//!  * `ActivityFile` - reports progress back to the orchestrator.

extern crate env_logger;
#[macro_use]
extern crate failure;
extern crate itertools;
#[macro_use]
extern crate log;
extern crate reqwest;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate structopt;
extern crate tempfile;
extern crate toml;
extern crate url_serde;

mod activity;
mod applier;
mod cli;
mod command;
mod config;
mod document;
mod errors;
mod url;
mod ztp_mode;

use crate::activity::ActivityFile;
use crate::applier::ConfigApplier;
use crate::command::SystemRunner;
use crate::config::PluginConfig;
use crate::errors::PluginError;
use crate::url::HostResolver;
use std::path::PathBuf;

fn main() {
    let opts = match cli::parse_args(std::env::args_os()) {
        Ok(opts) => opts,
        Err(exit) => {
            println!("{}", exit.message);
            std::process::exit(exit.code);
        }
    };

    let env = env_logger::Env::default().default_filter_or("info");
    if let Err(e) = env_logger::Builder::from_env(env).try_init() {
        eprintln!("failed to initialize logging: {}", e);
    }

    let code = match run(&opts) {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run(opts: &cli::CliOptions) -> Result<(), PluginError> {
    info!("starting ztp-configdb");

    let dirs: Vec<PathBuf> = config::CONFIG_DIRS.iter().map(PathBuf::from).collect();
    let cfg = PluginConfig::read_config(&dirs)?;

    let runner = SystemRunner::default();
    let activity = ActivityFile::new(cfg.paths.activity_file.clone());
    let resolver = HostResolver::new(
        &runner,
        cfg.download_timeout,
        cfg.paths.identifier_script.clone(),
    );

    ConfigApplier::new(&cfg, &resolver, &runner, &activity).run(&opts.document)
}
