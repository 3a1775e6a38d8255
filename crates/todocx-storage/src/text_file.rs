//! Collision-safe text file persistence.
//!
//! A save never replaces an existing file. When the requested name is taken
//! the first free `<stem>(<n>)<ext>` for `n = 1..=1000` is used, and past that
//! `<stem>_<unix_ms><ext>`.
//!
//! Two saves racing for the same requested path can both see it free. The
//! final step refuses to clobber, so the loser reports a `Write` error rather
//! than overwriting the winner.

use std::{
    ffi::OsString,
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;
use thiserror::Error;

pub const MAX_NUMBERED_CANDIDATES: u32 = 1000;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("invalid destination path: {path}")]
    InvalidPath { path: PathBuf },
    #[error("failed to create directory {dir}: {source}")]
    CreateDir { dir: PathBuf, source: io::Error },
    #[error("failed to check whether {path} exists: {source}")]
    Probe { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedFile {
    pub path: PathBuf,
    pub renamed: bool,
}

struct NameParts {
    dir: PathBuf,
    stem: OsString,
    ext: OsString,
}

fn split_name(requested: &Path) -> Result<NameParts, PersistenceError> {
    let invalid = || PersistenceError::InvalidPath {
        path: requested.to_path_buf(),
    };
    let stem = requested.file_stem().ok_or_else(invalid)?.to_os_string();
    let ext = match requested.extension() {
        Some(e) => {
            let mut s = OsString::from(".");
            s.push(e);
            s
        }
        None => OsString::new(),
    };
    Ok(NameParts {
        dir: parent_dir(requested),
        stem,
        ext,
    })
}

fn parent_dir(p: &Path) -> PathBuf {
    match p.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn candidate(parts: &NameParts, infix: &str) -> PathBuf {
    let mut name = parts.stem.clone();
    name.push(infix);
    name.push(&parts.ext);
    parts.dir.join(name)
}

fn exists(p: &Path) -> Result<bool, PersistenceError> {
    p.try_exists().map_err(|source| PersistenceError::Probe {
        path: p.to_path_buf(),
        source,
    })
}

/// Picks the path a save to `requested` would write, given what is on disk now.
///
/// `now_ms` is only consulted when every numbered candidate is taken.
pub fn resolve_unique_path(
    requested: &Path,
    now_ms: impl FnOnce() -> i64,
) -> Result<PathBuf, PersistenceError> {
    let parts = split_name(requested)?;
    if !exists(requested)? {
        return Ok(requested.to_path_buf());
    }
    for n in 1..=MAX_NUMBERED_CANDIDATES {
        let p = candidate(&parts, &format!("({n})"));
        if !exists(&p)? {
            return Ok(p);
        }
    }
    Ok(candidate(&parts, &format!("_{}", now_ms())))
}

/// Writes UTF-8 `content` next to `requested` without touching existing files.
///
/// The content goes to a temp file in the destination directory first and is
/// moved into place only when complete, so a crash never leaves a partial file
/// under the final name.
pub fn save_text_file(requested: &Path, content: &str) -> Result<SavedFile, PersistenceError> {
    if requested.as_os_str().is_empty() {
        return Err(PersistenceError::InvalidPath {
            path: requested.to_path_buf(),
        });
    }
    let dir = parent_dir(requested);
    std::fs::create_dir_all(&dir).map_err(|source| PersistenceError::CreateDir {
        dir: dir.clone(),
        source,
    })?;

    let final_path = resolve_unique_path(requested, todocx_core::now_ms)?;
    let write_err = |source: io::Error| PersistenceError::Write {
        path: final_path.clone(),
        source,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".todocx-save-")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(write_err)?;
    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist_noclobber(&final_path)
        .map_err(|e| write_err(e.error))?;

    Ok(SavedFile {
        renamed: final_path != requested,
        path: final_path,
    })
}
