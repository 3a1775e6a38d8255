use std::path::PathBuf;

use anyhow::{anyhow, Result};
use todocx_core::env::env_path;

pub const APP_IDENTIFIER: &str = "com.todocx.desktop";
pub const DATA_DIR_ENV: &str = "TODOCX_DATA_DIR";

/// Per-user directory for logs, traces and worker scratch space.
///
/// Same place Tauri's `app_data_dir()` resolves to, but available before the
/// app (and its path resolver) exists, so the panic hook can use it.
pub fn data_dir() -> Result<PathBuf> {
    if let Some(p) = env_path(DATA_DIR_ENV) {
        return Ok(p);
    }
    Ok(platform_data_root()?.join(APP_IDENTIFIER))
}

#[cfg(windows)]
fn platform_data_root() -> Result<PathBuf> {
    env_path("APPDATA").ok_or_else(|| anyhow!("APPDATA is not set"))
}

#[cfg(target_os = "macos")]
fn platform_data_root() -> Result<PathBuf> {
    Ok(home()?.join("Library").join("Application Support"))
}

#[cfg(all(unix, not(target_os = "macos")))]
fn platform_data_root() -> Result<PathBuf> {
    match env_path("XDG_DATA_HOME") {
        Some(p) if p.is_absolute() => Ok(p),
        _ => Ok(home()?.join(".local").join("share")),
    }
}

#[cfg(unix)]
fn home() -> Result<PathBuf> {
    env_path("HOME").ok_or_else(|| anyhow!("HOME is not set"))
}
