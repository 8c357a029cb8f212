// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::ffi::OsString;
use std::path::PathBuf;

use qrscan_core::error::Result;

/// Return the application data directory, creating it if needed.
///
/// `$QRSCAN_DATA_DIR` wins, then `$XDG_DATA_HOME/qrscan`, then
/// `~/.local/share/qrscan`.
pub fn data_dir() -> Result<PathBuf> {
    let dir = resolve(
        std::env::var_os("QRSCAN_DATA_DIR"),
        std::env::var_os("XDG_DATA_HOME"),
        std::env::var_os("HOME"),
    );
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn resolve(explicit: Option<OsString>, xdg: Option<OsString>, home: Option<OsString>) -> PathBuf {
    let non_empty = |value: Option<OsString>| value.filter(|v| !v.is_empty()).map(PathBuf::from);

    if let Some(dir) = non_empty(explicit) {
        return dir;
    }
    if let Some(xdg) = non_empty(xdg) {
        return xdg.join("qrscan");
    }
    if let Some(home) = non_empty(home) {
        return home.join(".local").join("share").join("qrscan");
    }
    // Last resort
    std::env::temp_dir().join("qrscan")
}
