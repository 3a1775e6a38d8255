use std::{fs::OpenOptions, io::Write};

pub const STARTUP_TRACE_FILE_NAME: &str = "startup_trace.log";

// Stage breadcrumbs for crashes that happen before app.log is usable.
// Always on, best-effort, no user data.
pub fn mark_best_effort(stage: &str) {
    let Ok(dir) = crate::data_dir::data_dir() else {
        return;
    };
    let _ = std::fs::create_dir_all(&dir);
    let path = dir.join(STARTUP_TRACE_FILE_NAME);
    let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };
    let _ = writeln!(f, "ts_ms={} stage={stage}", todocx_core::now_ms());
}
