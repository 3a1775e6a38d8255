use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
    time::Instant,
};

use serde::Serialize;
use serde_json::Value;
use todocx_core::{
    env::{env_bool_default_true, env_u64, env_usize},
    now_ms,
};

const DEFAULT_TRACE_MAX_BYTES: u64 = 10_000_000; // 10MB
const DEFAULT_TRACE_MAX_FILES: usize = 5;

pub const TRACE_FILE_NAME: &str = "trace.jsonl";

pub fn enabled() -> bool {
    env_bool_default_true("TODOCX_TRACE_ENABLED")
}

fn max_bytes() -> u64 {
    env_u64("TODOCX_TRACE_MAX_BYTES", DEFAULT_TRACE_MAX_BYTES)
}

fn max_files() -> usize {
    env_usize("TODOCX_TRACE_MAX_FILES", DEFAULT_TRACE_MAX_FILES)
}

fn trace_write_lock() -> &'static Mutex<()> {
    static TRACE_WRITE_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    TRACE_WRITE_LOCK.get_or_init(|| Mutex::new(()))
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceError {
    pub kind: String, // process|http|io|validation|host|logic
    pub code: String, // E_*
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub ts_ms: i64,
    pub task_id: Option<String>,
    pub stage: String,
    pub step_id: String,
    pub op: String,     // start|end|event
    pub status: String, // ok|err|aborted
    pub duration_ms: Option<u128>,
    pub error: Option<TraceError>,
    pub ctx: Option<Value>,
}

/// Writes structured events to `trace.jsonl` in one directory.
#[derive(Debug, Clone)]
pub struct Tracer {
    dir: PathBuf,
}

impl Tracer {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TRACE_FILE_NAME)
    }

    pub fn event(&self, stage: &str, step_id: &str, status: &str, ctx: Option<Value>) {
        self.emit_best_effort(&TraceEvent {
            ts_ms: now_ms(),
            task_id: None,
            stage: stage.to_string(),
            step_id: step_id.to_string(),
            op: "event".to_string(),
            status: status.to_string(),
            duration_ms: None,
            error: None,
            ctx,
        });
    }

    pub fn span(
        &self,
        task_id: Option<&str>,
        stage: &str,
        step_id: &str,
        ctx: Option<Value>,
    ) -> Span {
        self.emit_best_effort(&TraceEvent {
            ts_ms: now_ms(),
            task_id: task_id.map(|s| s.to_string()),
            stage: stage.to_string(),
            step_id: step_id.to_string(),
            op: "start".to_string(),
            status: "ok".to_string(),
            duration_ms: None,
            error: None,
            ctx,
        });
        Span {
            tracer: self.clone(),
            task_id: task_id.map(|s| s.to_string()),
            stage: stage.to_string(),
            step_id: step_id.to_string(),
            t0: Instant::now(),
            finished: false,
        }
    }

    fn emit_best_effort(&self, ev: &TraceEvent) {
        if !enabled() {
            return;
        }
        let _guard = trace_write_lock().lock().unwrap_or_else(|e| e.into_inner());
        let _ = std::fs::create_dir_all(&self.dir);
        self.rotate_if_needed_best_effort();

        let p = self.path();
        let mut f = match OpenOptions::new().create(true).append(true).open(&p) {
            Ok(f) => f,
            Err(e) => {
                crate::safe_eprintln!("trace: open failed: {}: {e}", p.display());
                return;
            }
        };
        let mut line = match serde_json::to_string(ev) {
            Ok(s) => s,
            Err(e) => {
                crate::safe_eprintln!("trace: serialize failed: {e}");
                return;
            }
        };
        line.push('\n');
        if let Err(e) = f.write_all(line.as_bytes()) {
            crate::safe_eprintln!("trace: write failed: {e}");
        }
    }

    fn rotate_if_needed_best_effort(&self) {
        let max_f = max_files();
        if max_f == 0 {
            return;
        }
        let p = self.path();
        let len = match std::fs::metadata(&p) {
            Ok(m) => m.len(),
            Err(_) => return,
        };
        if len <= max_bytes() {
            return;
        }

        // Drop the oldest first; Windows refuses to rename onto an existing file.
        let oldest = self.dir.join(format!("{TRACE_FILE_NAME}.{max_f}"));
        let _ = std::fs::remove_file(&oldest);
        for i in (1..max_f).rev() {
            let src = self.dir.join(format!("{TRACE_FILE_NAME}.{i}"));
            if src.exists() {
                let dst = self.dir.join(format!("{TRACE_FILE_NAME}.{}", i + 1));
                let _ = std::fs::rename(&src, &dst);
            }
        }
        let _ = std::fs::rename(&p, self.dir.join(format!("{TRACE_FILE_NAME}.1")));
    }
}

pub struct Span {
    tracer: Tracer,
    task_id: Option<String>,
    stage: String,
    step_id: String,
    t0: Instant,
    finished: bool,
}

impl Span {
    fn end(&mut self, status: &str, error: Option<TraceError>, ctx: Option<Value>) {
        self.finished = true;
        self.tracer.emit_best_effort(&TraceEvent {
            ts_ms: now_ms(),
            task_id: self.task_id.clone(),
            stage: self.stage.clone(),
            step_id: self.step_id.clone(),
            op: "end".to_string(),
            status: status.to_string(),
            duration_ms: Some(self.t0.elapsed().as_millis()),
            error,
            ctx,
        });
    }

    pub fn ok(mut self, ctx: Option<Value>) {
        self.end("ok", None, ctx);
    }

    pub fn err(mut self, kind: &str, code: &str, message: &str, ctx: Option<Value>) {
        let error = TraceError {
            kind: kind.to_string(),
            code: code.to_string(),
            message: message.to_string(),
        };
        self.end("err", Some(error), ctx);
    }

    /// Like `err`, with the error's `source()` chain recorded under `err_chain`.
    pub fn err_chain(
        self,
        kind: &str,
        code: &str,
        err: &(dyn std::error::Error + 'static),
        ctx: Option<Value>,
    ) {
        let mut chain = Vec::new();
        let mut cur = Some(err);
        while let Some(e) = cur {
            chain.push(e.to_string());
            cur = e.source();
        }
        let mut m = serde_json::Map::new();
        m.insert("err_chain".to_string(), serde_json::json!(chain));
        if let Some(Value::Object(extra)) = ctx {
            m.extend(extra);
        }
        self.err(kind, code, &err.to_string(), Some(Value::Object(m)));
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let error = TraceError {
            kind: "logic".to_string(),
            code: "ABORTED".to_string(),
            message: "span dropped without explicit ok/err".to_string(),
        };
        self.end("aborted", Some(error), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn read_events(tracer: &Tracer) -> Vec<Value> {
        let raw = fs::read_to_string(tracer.path()).expect("read trace");
        raw.lines()
            .map(|l| serde_json::from_str(l).expect("valid json line"))
            .collect()
    }

    #[test]
    fn span_writes_start_and_end_lines() {
        let td = tempfile::tempdir().expect("tempdir");
        let tracer = Tracer::new(td.path());
        let span = tracer.span(Some("call-1"), "Bridge", "CMD.save-text-file", None);
        span.ok(Some(serde_json::json!({"renamed": true})));

        let evs = read_events(&tracer);
        assert_eq!(evs.len(), 2);
        assert_eq!(evs[0]["op"], "start");
        assert_eq!(evs[1]["op"], "end");
        assert_eq!(evs[1]["status"], "ok");
        assert_eq!(evs[1]["task_id"], "call-1");
        assert_eq!(evs[1]["ctx"]["renamed"], true);
    }

    #[test]
    fn standalone_event_has_no_duration() {
        let td = tempfile::tempdir().expect("tempdir");
        let tracer = Tracer::new(td.path());
        tracer.event(
            "Host",
            "HOST.shutdown",
            "timeout",
            Some(serde_json::json!({"grace_ms": 3000})),
        );

        let evs = read_events(&tracer);
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0]["op"], "event");
        assert_eq!(evs[0]["status"], "timeout");
        assert_eq!(evs[0]["ctx"]["grace_ms"], 3000);
        assert!(evs[0]["duration_ms"].is_null());
    }

    #[test]
    fn dropped_span_is_recorded_as_aborted() {
        let td = tempfile::tempdir().expect("tempdir");
        let tracer = Tracer::new(td.path());
        {
            let _span = tracer.span(None, "Supervisor", "SUP.start", None);
        }
        let evs = read_events(&tracer);
        assert_eq!(evs.last().expect("end")["status"], "aborted");
    }

    #[test]
    fn err_chain_records_sources_and_code() {
        let td = tempfile::tempdir().expect("tempdir");
        let tracer = Tracer::new(td.path());
        let err = anyhow::anyhow!("disk full").context("write app.log failed");
        let as_std: &(dyn std::error::Error + 'static) = err.as_ref();
        tracer
            .span(None, "Host", "HOST.setup", None)
            .err_chain("io", "E_HOST", as_std, None);

        let evs = read_events(&tracer);
        let end = evs.last().expect("end");
        assert_eq!(end["error"]["code"], "E_HOST");
        assert_eq!(end["ctx"]["err_chain"][1], "disk full");
    }
}
