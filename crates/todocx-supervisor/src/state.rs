use std::fmt;

use serde::Serialize;

/// Lifecycle of one supervisor instance. Runs forward only; a restart means a
/// new `ProcessSupervisor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    NotStarted,
    Launching,
    AwaitingReady,
    Ready,
    Stopping,
    Stopped,
    Failed,
}

impl SupervisorState {
    pub fn can_transition_to(self, next: SupervisorState) -> bool {
        use SupervisorState::*;
        match (self, next) {
            (NotStarted, Launching)
            | (Launching, AwaitingReady)
            | (Launching, Failed)
            | (AwaitingReady, Ready)
            | (AwaitingReady, Failed)
            | (Stopping, Stopped) => true,
            (Stopping | Stopped, Stopping) => false,
            (_, Stopping) => true,
            _ => false,
        }
    }

    pub fn is_ready(self) -> bool {
        self == SupervisorState::Ready
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SupervisorState::NotStarted => "NotStarted",
            SupervisorState::Launching => "Launching",
            SupervisorState::AwaitingReady => "AwaitingReady",
            SupervisorState::Ready => "Ready",
            SupervisorState::Stopping => "Stopping",
            SupervisorState::Stopped => "Stopped",
            SupervisorState::Failed => "Failed",
        })
    }
}
