//! The only surface the UI process can reach on the host.
//!
//! Requests name one of a fixed set of operations; anything else, and any
//! payload of the wrong shape, is rejected before it gets near the OS.

pub mod bridge;
pub mod envelope;
pub mod error;
pub mod host;
pub mod ops;

pub use bridge::{Bridge, WorkerStatus};
pub use envelope::{BridgeFailure, BridgeRequest, BridgeResponse};
pub use error::BridgeError;
pub use host::{HostError, HostServices};
pub use ops::{
    BridgeCall, BridgeOp, FileFilter, OpenDirectoryOptions, OpenFileOptions, PickedFiles,
    SaveFileOptions, SaveTextFileParams, UserDirectory,
};
