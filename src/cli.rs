//! Command-line interface.

use std::ffi::OsString;
use std::path::PathBuf;
use structopt::clap::ErrorKind;
use structopt::StructOpt;

/// Command-line options.
#[derive(Debug, StructOpt)]
#[structopt(
    name = "ztp-configdb",
    about = "ZTP plugin applying a downloaded config_db.json to the running configuration"
)]
pub(crate) struct CliOptions {
    /// Provisioning document (JSON) for this plugin
    #[structopt(name = "DOCUMENT", parse(from_os_str))]
    pub(crate) document: PathBuf,
}

/// Early termination requested by argument parsing.
#[derive(Debug)]
pub(crate) struct CliExit {
    /// Text to print on standard output.
    pub(crate) message: String,
    pub(crate) code: i32,
}

/// Parse process arguments, including the program name.
pub(crate) fn parse_args<I, T>(args: I) -> Result<CliOptions, CliExit>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CliOptions::from_iter_safe(args).map_err(|e| {
        let code = match e.kind {
            ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed => 0,
            _ => 1,
        };
        CliExit {
            message: e.message,
            code,
        }
    })
}
