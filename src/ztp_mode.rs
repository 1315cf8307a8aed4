//! ZTP mode handling in the configuration database.
//!
//! While ZTP is active, interfaces run DHCP discovery on behalf of the
//! provisioning service. That has to stop before a new configuration
//! takes ownership of the interfaces.

use crate::activity::ActivityReporter;
use crate::command::{self, CommandRunner};
use crate::config::Commands;

/// Configuration database index holding ZTP state.
static ZTP_DB: &str = "4";
static ZTP_MODE_KEY: &str = "ZTP|mode";
static ZTP_MODE_FIELD: &str = "profile";
static ZTP_MODE_ACTIVE: &str = "active";
static INTERFACES_SERVICE: &str = "interfaces-config";

/// Stop ZTP-initiated DHCP discovery, if ZTP mode is active.
///
/// A failed or empty mode query counts as "not active". Returns whether
/// the DHCP teardown was performed.
pub(crate) fn stop_ztp_dhcp(
    runner: &dyn CommandRunner,
    activity: &dyn ActivityReporter,
    commands: &Commands,
) -> bool {
    let query = command::argv(&[
        commands.store_cli.as_str(),
        "-n",
        ZTP_DB,
        "HGET",
        ZTP_MODE_KEY,
        ZTP_MODE_FIELD,
    ]);
    let out = runner.run(&query);
    if !out.success() || out.first_line() != Some(ZTP_MODE_ACTIVE) {
        trace!("ZTP mode not active, leaving DHCP untouched");
        return false;
    }

    activity.update("Stopping ZTP DHCP discovery on interfaces");
    let delete = command::argv(&[commands.store_cli.as_str(), "-n", ZTP_DB, "DEL", ZTP_MODE_KEY]);
    let out = runner.run(&delete);
    if !out.success() {
        warn!(
            "'{}' failed with exit code {}",
            command::display(&delete),
            out.status
        );
    }

    let restart = command::argv(&[commands.systemctl.as_str(), "restart", INTERFACES_SERVICE]);
    let out = runner.run(&restart);
    if !out.success() {
        warn!(
            "'{}' failed with exit code {}: {}",
            command::display(&restart),
            out.status,
            out.stderr.trim()
        );
    }

    true
}
