//! GNU vs. musl libc detection for Linux hosts.
//!
//! A `true` result means the host supports GNU libc; it may support musl as
//! well.

use std::io;
use std::process::Command;

use crate::settings;

const LDD_PATH: &str = "/usr/bin/ldd";
const PROBE_SCRIPT: &str = "getconf GNU_LIBC_VERSION 2>&1 || true; ldd --version 2>&1 || true";

/// Runs the probes in order: the force flag, the text of `/usr/bin/ldd`,
/// then a `getconf`/`ldd --version` shell pipeline. Defaults to GNU when no
/// probe can run.
pub fn is_gnu() -> bool {
    resolve(
        settings::flag(settings::FORCE_GNU),
        || std::fs::read_to_string(LDD_PATH),
        probe_command,
    )
}

fn probe_command() -> io::Result<String> {
    let output = Command::new("sh").arg("-c").arg(PROBE_SCRIPT).output()?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub(crate) fn resolve(
    forced: bool,
    read_ldd: impl FnOnce() -> io::Result<String>,
    run_probe: impl FnOnce() -> io::Result<String>,
) -> bool {
    if forced {
        return true;
    }

    let ldd_err = match read_ldd() {
        Ok(text) => return text.contains("GNU C Library"),
        Err(err) => err,
    };

    let probe_err = match run_probe() {
        Ok(text) => return text.contains("glibc"),
        Err(err) => err,
    };

    tracing::warn!(
        ldd_error = %ldd_err,
        probe_error = %probe_err,
        "unable to detect libc flavor, assuming GNU"
    );
    true
}
