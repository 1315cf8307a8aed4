//! External command execution.

use itertools::Itertools;
use std::process::{Command, ExitStatus};

/// Exit status reported when a program cannot be spawned at all.
pub(crate) static STATUS_NOT_FOUND: i32 = 127;

/// Result of running an external command.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct CommandOutput {
    pub(crate) status: i32,
    pub(crate) stdout_lines: Vec<String>,
    pub(crate) stderr: String,
}

impl CommandOutput {
    pub(crate) fn success(&self) -> bool {
        self.status == 0
    }

    /// First line of standard output, trimmed.
    pub(crate) fn first_line(&self) -> Option<&str> {
        self.stdout_lines.first().map(|l| l.trim())
    }
}

/// Runner for external commands.
pub(crate) trait CommandRunner {
    /// Run `argv` to completion, without a shell.
    fn run(&self, argv: &[String]) -> CommandOutput;
}

/// Render an argv for logs and error messages.
pub(crate) fn display(argv: &[String]) -> String {
    argv.iter().join(" ")
}

/// Build an owned argv from borrowed parts.
pub(crate) fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_string()).collect()
}

/// Runner spawning real processes on the host.
#[derive(Debug, Default)]
pub(crate) struct SystemRunner {}

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> CommandOutput {
        debug!("running '{}'", display(argv));

        let (program, args) = match argv.split_first() {
            Some(split) => split,
            None => {
                return CommandOutput {
                    status: STATUS_NOT_FOUND,
                    stdout_lines: vec![],
                    stderr: "empty command line".to_string(),
                }
            }
        };

        let out = match Command::new(program).args(args).output() {
            Ok(out) => out,
            Err(e) => {
                warn!("failed to spawn '{}': {}", program, e);
                return CommandOutput {
                    status: STATUS_NOT_FOUND,
                    stdout_lines: vec![],
                    stderr: e.to_string(),
                };
            }
        };

        let status = exit_code(out.status);
        trace!("'{}' exited with status {}", program, status);
        CommandOutput {
            status,
            stdout_lines: String::from_utf8_lossy(&out.stdout)
                .lines()
                .map(String::from)
                .collect(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        }
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => 128 + sig,
        (None, None) => 1,
    }
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
