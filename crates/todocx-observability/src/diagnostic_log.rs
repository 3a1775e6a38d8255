use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{SecondsFormat, Utc};

pub const LOG_FILE_NAME: &str = "app.log";

/// Append-only, line-oriented log the user is pointed at when startup fails.
///
/// Info lines are `[<timestamp>] <message>`; errors are
/// `[<timestamp>] ERROR: <message>` followed by a detail line.
#[derive(Debug)]
pub struct DiagnosticLog {
    path: PathBuf,
    write_lock: Mutex<()>,
    echo_stderr: bool,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn format_info(ts: &str, message: &str) -> String {
    format!("[{ts}] {message}\n")
}

pub fn format_error(ts: &str, message: &str, detail: Option<&str>) -> String {
    format!("[{ts}] ERROR: {message}\n{}\n", detail.unwrap_or(""))
}

impl DiagnosticLog {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::at(data_dir.join(LOG_FILE_NAME))
    }

    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
            echo_stderr: true,
        }
    }

    /// Same file, no stderr mirror. Used by tests and quiet tooling.
    pub fn quiet(path: PathBuf) -> Self {
        Self {
            echo_stderr: false,
            ..Self::at(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        if self.echo_stderr {
            crate::safe_eprintln!("{message}");
        }
        self.append_best_effort(&format_info(&timestamp(), message));
    }

    pub fn error(&self, message: impl AsRef<str>, detail: Option<&str>) {
        let message = message.as_ref();
        if self.echo_stderr {
            match detail {
                Some(d) => crate::safe_eprintln!("{message} {d}"),
                None => crate::safe_eprintln!("{message}"),
            }
        }
        self.append_best_effort(&format_error(&timestamp(), message, detail));
    }

    /// Logs an error with its `source()` chain as the detail block.
    pub fn error_chain(&self, message: impl AsRef<str>, err: &(dyn std::error::Error + 'static)) {
        let mut detail = err.to_string();
        let mut cur = err.source();
        while let Some(e) = cur {
            detail.push_str("\ncaused by: ");
            detail.push_str(&e.to_string());
            cur = e.source();
        }
        self.error(message, Some(&detail));
    }

    fn append_best_effort(&self, text: &str) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let mut f = match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                crate::safe_eprintln!("diagnostic_log: open failed: {}: {e}", self.path.display());
                return;
            }
        };
        if let Err(e) = f.write_all(text.as_bytes()) {
            crate::safe_eprintln!("diagnostic_log: write failed: {e}");
        }
    }
}
