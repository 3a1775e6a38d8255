pub mod error;
pub mod health;
pub mod launch;
pub mod retry;
pub mod state;
pub mod supervisor;
pub mod worker;

pub use error::SupervisorError;
pub use health::{HealthProbe, HttpHealthProbe, ProbeError};
pub use launch::{ArtifactKind, LaunchMode, LaunchPlan, PathsConfig};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use state::SupervisorState;
pub use supervisor::{ProcessSupervisor, ReadyInfo};
pub use worker::{CommandSpawner, ExitSubscription, SpawnedWorker, WorkerExit, WorkerHandle, WorkerSpawner};
