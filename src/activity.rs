//! Activity reporting towards the ZTP orchestrator.

use std::fs;
use std::path::PathBuf;

/// Sink for human-readable progress notices.
pub(crate) trait ActivityReporter {
    fn update(&self, message: &str);
}

/// Reporter logging notices and mirroring the latest one into a file.
///
/// The orchestrator polls the activity file as a liveness signal, so
/// write failures are only logged.
#[derive(Debug)]
pub(crate) struct ActivityFile {
    path: PathBuf,
}

impl ActivityFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn write(&self, message: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{}\n", message))
    }
}

impl ActivityReporter for ActivityFile {
    fn update(&self, message: &str) {
        info!("{}", message);
        if let Err(e) = self.write(message) {
            warn!(
                "failed to update activity file '{}': {}",
                self.path.display(),
                e
            );
        }
    }
}
