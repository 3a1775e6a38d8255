use std::{fs::OpenOptions, io::Write};

pub const PANIC_LOG_FILE_NAME: &str = "panic.log";

// Panics go to a file, never to stderr.
//
// Release builds use the Windows GUI subsystem, where the default hook's
// stderr write can fail and re-panic inside the hook, aborting with a stack
// overflow and no message. The worker is also left running if the host dies
// that way, so the log is the only trace of what happened.
pub fn install_best_effort() {
    std::panic::set_hook(Box::new(|info| {
        let bt = std::backtrace::Backtrace::force_capture();
        let msg = format_entry(todocx_core::now_ms(), &info.to_string(), &bt.to_string());

        if let Ok(dir) = crate::data_dir::data_dir() {
            let _ = std::fs::create_dir_all(&dir);
            let path = dir.join(PANIC_LOG_FILE_NAME);
            if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&path) {
                let _ = f.write_all(msg.as_bytes());
            }
        }
    }));
}

fn format_entry(ts_ms: i64, panic: &str, backtrace: &str) -> String {
    format!("ts_ms={ts_ms}\npanic={panic}\nbacktrace={backtrace}\n---\n")
}
