use thiserror::Error;
use todocx_core::codes;
use todocx_storage::PersistenceError;
use todocx_supervisor::SupervisorState;

use crate::host::HostError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("worker not ready (state: {state})")]
    WorkerNotReady { state: SupervisorState },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Host(#[from] HostError),
}

impl BridgeError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        BridgeError::InvalidArgument(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidArgument(_) => codes::E_INVALID_ARGUMENT,
            BridgeError::WorkerNotReady { .. } => codes::E_WORKER_NOT_READY,
            BridgeError::Persistence(_) => codes::E_PERSISTENCE,
            BridgeError::Host(_) => codes::E_HOST,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::InvalidArgument(_) => "validation",
            BridgeError::WorkerNotReady { .. } => "process",
            BridgeError::Persistence(_) => "io",
            BridgeError::Host(_) => "host",
        }
    }
}
