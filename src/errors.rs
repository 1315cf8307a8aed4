//! Plugin errors and process exit codes.

/// Exit code for any generic fatal condition.
pub(crate) static EXIT_FATAL: i32 = 1;

/// Terminal failure of a plugin run.
#[derive(Debug, Fail)]
pub(crate) enum PluginError {
    /// Generic fatal error, mapped to exit code 1.
    #[fail(display = "{}", _0)]
    Fatal(String),
    /// External tool failure, its exit code is propagated verbatim.
    #[fail(display = "command '{}' failed with exit code {}", command, code)]
    Command { command: String, code: i32 },
}

impl PluginError {
    pub(crate) fn fatal<S: Into<String>>(msg: S) -> Self {
        PluginError::Fatal(msg.into())
    }

    /// Process exit code for this error.
    pub(crate) fn exit_code(&self) -> i32 {
        match self {
            PluginError::Fatal(_) => EXIT_FATAL,
            PluginError::Command { code, .. } => *code,
        }
    }
}

impl From<failure::Error> for PluginError {
    fn from(err: failure::Error) -> Self {
        let msg = err
            .iter_chain()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(": ");
        PluginError::Fatal(msg)
    }
}
