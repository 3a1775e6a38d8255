use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ops::{OpenDirectoryOptions, OpenFileOptions, SaveFileOptions, UserDirectory};

/// Failure reported by the native side (dialog plugin, shell, path API).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// OS capabilities the bridge delegates to. Every method may block (native
/// dialogs wait for the user), so callers run dispatch off the UI thread.
///
/// `Ok(None)` from a picker means the user cancelled.
pub trait HostServices: Send + Sync {
    fn pick_files(&self, opts: &OpenFileOptions) -> Result<Option<Vec<PathBuf>>, HostError>;
    fn pick_directory(&self, opts: &OpenDirectoryOptions) -> Result<Option<PathBuf>, HostError>;
    fn pick_save_path(&self, opts: &SaveFileOptions) -> Result<Option<PathBuf>, HostError>;
    fn reveal_in_file_manager(&self, path: &Path) -> Result<(), HostError>;
    fn open_path(&self, path: &Path) -> Result<(), HostError>;
    fn user_directory(&self, dir: UserDirectory) -> Result<PathBuf, HostError>;
}
