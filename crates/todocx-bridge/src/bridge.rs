use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;
use serde_json::{json, Value};
use todocx_observability::{DiagnosticLog, Tracer};
use todocx_storage::{save_text_file, SavedFile};
use todocx_supervisor::{ProcessSupervisor, SupervisorState};

use crate::{
    envelope::{BridgeRequest, BridgeResponse},
    error::BridgeError,
    host::HostServices,
    ops::{
        path_value, BridgeCall, BridgeOp, OpenDirectoryOptions, OpenFileOptions, PickedFiles,
        SaveFileOptions, SaveTextFileParams, UserDirectory,
    },
};

/// Read-only view of the worker the bridge is allowed to see.
pub trait WorkerStatus: Send + Sync {
    /// The worker base URL while ready, otherwise the current state.
    fn ready_base_url(&self) -> Result<String, SupervisorState>;
}

impl WorkerStatus for ProcessSupervisor {
    fn ready_base_url(&self) -> Result<String, SupervisorState> {
        ProcessSupervisor::ready_base_url(self)
    }
}

pub struct Bridge {
    worker: Arc<dyn WorkerStatus>,
    host: Arc<dyn HostServices>,
    log: Option<Arc<DiagnosticLog>>,
    tracer: Option<Tracer>,
}

impl Bridge {
    pub fn new(worker: Arc<dyn WorkerStatus>, host: Arc<dyn HostServices>) -> Self {
        Self {
            worker,
            host,
            log: None,
            tracer: None,
        }
    }

    pub fn with_log(mut self, log: Arc<DiagnosticLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Same as `dispatch`, for a request that has not been decoded yet.
    pub fn dispatch_raw(&self, call_id: Option<&str>, raw: Value) -> BridgeResponse {
        match BridgeRequest::deserialize(raw) {
            Ok(req) => self.dispatch(call_id, &req),
            Err(e) => {
                let err = BridgeError::invalid(format!("malformed request: {e}"));
                if let Some(log) = &self.log {
                    log.error_chain("Bridge request rejected", &err);
                }
                BridgeResponse::failure(&err, Value::Null)
            }
        }
    }

    /// Validate, run, and wrap one UI request. Never fails: errors come back
    /// inside the response.
    pub fn dispatch(&self, call_id: Option<&str>, req: &BridgeRequest) -> BridgeResponse {
        let op = BridgeOp::from_name(&req.op);
        let step_id = format!("CMD.{}", op.map(BridgeOp::name).unwrap_or("unknown"));
        let span = self
            .tracer
            .as_ref()
            .map(|t| t.span(call_id, "Bridge", &step_id, None));

        let outcome = BridgeCall::from_request(req).and_then(|call| {
            let ctx = trace_ctx(&call);
            self.execute(call).map(|v| (v, ctx))
        });

        match outcome {
            Ok((result, ctx)) => {
                if let Some(span) = span {
                    span.ok(ctx);
                }
                BridgeResponse::success(result)
            }
            Err(err) => {
                if let Some(span) = span {
                    span.err_chain(err.kind(), err.code(), &err, None);
                }
                if let Some(log) = &self.log {
                    log.error_chain(format!("Bridge {step_id} failed"), &err);
                }
                let result = if op == Some(BridgeOp::SaveTextFile) {
                    json!({ "success": false, "error": err.to_string() })
                } else {
                    Value::Null
                };
                BridgeResponse::failure(&err, result)
            }
        }
    }

    pub fn execute(&self, call: BridgeCall) -> Result<Value, BridgeError> {
        match call {
            BridgeCall::ResolveWorkerEndpoint => {
                Ok(Value::String(self.resolve_worker_endpoint()?))
            }
            BridgeCall::OpenFileDialog(opts) => Ok(self
                .open_file_dialog(&opts)?
                .map(|p| p.to_json())
                .unwrap_or(Value::Null)),
            BridgeCall::OpenDirectoryDialog(opts) => Ok(self
                .open_directory_dialog(&opts)?
                .map(|p| path_value(&p))
                .unwrap_or(Value::Null)),
            BridgeCall::SaveFileDialog(opts) => Ok(self
                .save_file_dialog(&opts)?
                .map(|p| path_value(&p))
                .unwrap_or(Value::Null)),
            BridgeCall::SaveTextFile(params) => {
                let saved = self.save_text_file(&params)?;
                Ok(json!({
                    "success": true,
                    "finalPath": path_value(&saved.path),
                    "renamed": saved.renamed,
                }))
            }
            BridgeCall::RevealInFileManager(path) => {
                if let Some(p) = path {
                    self.host.reveal_in_file_manager(&p)?;
                }
                Ok(Value::Null)
            }
            BridgeCall::OpenPath(path) => {
                if let Some(p) = path {
                    self.host.open_path(&p)?;
                }
                Ok(Value::Null)
            }
            BridgeCall::GetUserDirectory(dir) => Ok(path_value(&self.user_directory(dir)?)),
        }
    }

    pub fn resolve_worker_endpoint(&self) -> Result<String, BridgeError> {
        self.worker
            .ready_base_url()
            .map_err(|state| BridgeError::WorkerNotReady { state })
    }

    pub fn open_file_dialog(
        &self,
        opts: &OpenFileOptions,
    ) -> Result<Option<PickedFiles>, BridgeError> {
        let picked = self.host.pick_files(opts)?;
        Ok(picked.and_then(|paths| PickedFiles::from_selection(paths, opts.multi_select)))
    }

    pub fn open_directory_dialog(
        &self,
        opts: &OpenDirectoryOptions,
    ) -> Result<Option<PathBuf>, BridgeError> {
        Ok(self.host.pick_directory(opts)?)
    }

    pub fn save_file_dialog(&self, opts: &SaveFileOptions) -> Result<Option<PathBuf>, BridgeError> {
        Ok(self.host.pick_save_path(opts)?)
    }

    pub fn save_text_file(&self, params: &SaveTextFileParams) -> Result<SavedFile, BridgeError> {
        let saved = save_text_file(&params.path, &params.content)?;
        if let Some(log) = &self.log {
            if saved.renamed {
                log.info(format!(
                    "Saved file to {} (requested {})",
                    saved.path.display(),
                    params.path.display()
                ));
            } else {
                log.info(format!("Saved file to {}", saved.path.display()));
            }
        }
        Ok(saved)
    }

    pub fn user_directory(&self, dir: UserDirectory) -> Result<PathBuf, BridgeError> {
        Ok(self.host.user_directory(dir)?)
    }
}

// Never includes file content.
fn trace_ctx(call: &BridgeCall) -> Option<Value> {
    match call {
        BridgeCall::OpenFileDialog(o) => Some(json!({ "multi_select": o.multi_select })),
        BridgeCall::SaveTextFile(p) => Some(json!({ "content_chars": p.content.chars().count() })),
        BridgeCall::GetUserDirectory(d) => Some(json!({ "dir": d.key() })),
        _ => None,
    }
}
