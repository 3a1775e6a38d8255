use std::{io, path::PathBuf};

use thiserror::Error;
use todocx_core::codes;

use crate::{launch::ArtifactKind, state::SupervisorState};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("{kind} not found at: {}", .path.display())]
    MissingArtifact { kind: ArtifactKind, path: PathBuf },

    #[error("failed to create scratch directory {}: {source}", .path.display())]
    ScratchDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start worker process {}: {source}", .program.display())]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("worker process exited with code {}", .code.map(|c| c.to_string()).unwrap_or_else(|| "null".to_string()))]
    WorkerExited { code: Option<i32> },

    #[error("worker not ready after {attempts} health check attempts (last error: {last_error})")]
    NotReady { attempts: u32, last_error: String },

    #[error("supervisor cannot start from state {state}")]
    InvalidState { state: SupervisorState },

    #[error("worker startup cancelled by shutdown")]
    Cancelled,
}

impl SupervisorError {
    pub fn code(&self) -> &'static str {
        match self {
            SupervisorError::MissingArtifact { .. } => codes::E_MISSING_ARTIFACT,
            SupervisorError::ScratchDir { .. } => codes::E_SCRATCH_DIR,
            SupervisorError::SpawnFailed { .. } => codes::E_SPAWN_FAILED,
            SupervisorError::WorkerExited { .. } => codes::E_WORKER_EXITED,
            SupervisorError::NotReady { .. } => codes::E_NOT_READY,
            SupervisorError::InvalidState { .. } => codes::E_INVALID_STATE,
            SupervisorError::Cancelled => codes::E_CANCELLED,
        }
    }

    // Cancellation is requested by the host itself; everything else that can
    // come out of start() aborts application startup.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SupervisorError::Cancelled)
    }
}
