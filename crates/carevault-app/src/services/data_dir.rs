// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::path::{Path, PathBuf};

use carevault_core::error::Result;

/// Overrides the default location when `--data-dir` is not given.
pub const DATA_DIR_ENV: &str = "CAREVAULT_DATA_DIR";

/// Resolve the data directory and create it if needed.
pub fn data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    let dir = resolve(explicit, |name| std::env::var(name).ok());
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// First match wins: explicit path, `CAREVAULT_DATA_DIR`, the XDG data dir,
/// `~/.local/share`, then the system temp dir.
fn resolve(explicit: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(dir) = env(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    base_dir(&env).join("carevault")
}

fn base_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    // Try XDG data dir, then fallback to home
    if let Some(xdg) = env("XDG_DATA_HOME").filter(|d| !d.is_empty()) {
        return PathBuf::from(xdg);
    }
    if let Some(home) = env("HOME").filter(|d| !d.is_empty()) {
        return PathBuf::from(home).join(".local").join("share");
    }
    // Last resort
    std::env::temp_dir()
}
