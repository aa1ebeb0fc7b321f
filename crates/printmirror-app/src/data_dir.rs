// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-aware data directory resolution.

use std::path::PathBuf;

const APP_DIR: &str = "printmirror";

/// Return the application data directory. Nothing is created here:
/// `MirrorSettings::save` and `run --create-queues` create what they write.
pub fn data_dir() -> PathBuf {
    base_dir().join(APP_DIR)
}

/// Default location of the settings file.
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Default spool root when none is given on the command line.
pub fn spool_root() -> PathBuf {
    data_dir().join("spool")
}

fn base_dir() -> PathBuf {
    if cfg!(windows) {
        if let Ok(program_data) = std::env::var("PROGRAMDATA") {
            return PathBuf::from(program_data);
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    // Last resort
    std::env::temp_dir()
}
