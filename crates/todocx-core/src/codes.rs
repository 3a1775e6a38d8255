// Stable error codes. They end up in trace.jsonl and in bridge responses,
// so the UI can branch on them without parsing messages.

pub const E_MISSING_ARTIFACT: &str = "E_MISSING_ARTIFACT";
pub const E_SCRATCH_DIR: &str = "E_SCRATCH_DIR";
pub const E_SPAWN_FAILED: &str = "E_SPAWN_FAILED";
pub const E_WORKER_EXITED: &str = "E_WORKER_EXITED";
pub const E_NOT_READY: &str = "E_NOT_READY";
pub const E_INVALID_STATE: &str = "E_INVALID_STATE";
pub const E_CANCELLED: &str = "E_CANCELLED";

pub const E_INVALID_ARGUMENT: &str = "E_INVALID_ARGUMENT";
pub const E_WORKER_NOT_READY: &str = "E_WORKER_NOT_READY";
pub const E_PERSISTENCE: &str = "E_PERSISTENCE";
pub const E_HOST: &str = "E_HOST";
