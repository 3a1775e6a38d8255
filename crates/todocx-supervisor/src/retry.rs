use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use todocx_observability::DiagnosticLog;
use tokio_util::sync::CancellationToken;

use crate::{
    error::SupervisorError,
    health::{HealthCheckAttempt, HealthProbe, ProbeError},
    worker::ExitSubscription,
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Slept before every attempt, the first one included.
    pub delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    pub fn worst_case(&self) -> Duration {
        (self.delay + self.attempt_timeout) * self.max_attempts
    }
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, d: Duration) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, d: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(d))
    }
}

#[derive(Debug, Clone)]
pub struct ReadyReport {
    pub attempts: u32,
    pub body: Value,
}

/// Polls the health probe until it answers, the attempts run out, the worker
/// exits, or `cancel` fires. Exit and cancellation win over a pending attempt.
pub async fn wait_until_ready(
    policy: &RetryPolicy,
    probe: &dyn HealthProbe,
    sleeper: &dyn Sleeper,
    exit: &mut ExitSubscription,
    cancel: &CancellationToken,
    log: &DiagnosticLog,
) -> Result<ReadyReport, SupervisorError> {
    let mut last_error: Option<ProbeError> = None;

    for ordinal in 1..=policy.max_attempts {
        let attempt = async {
            sleeper.sleep(policy.delay).await;
            match tokio::time::timeout(policy.attempt_timeout, probe.check(policy.attempt_timeout))
                .await
            {
                Ok(r) => r,
                Err(_) => Err(ProbeError::Timeout),
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log.info("Health check loop cancelled");
                return Err(SupervisorError::Cancelled);
            }
            ex = exit.exited() => {
                log.error("Worker exited while waiting for readiness", None);
                return Err(SupervisorError::WorkerExited { code: ex.code });
            }
            r = attempt => r,
        };

        let record = HealthCheckAttempt::from_result(ordinal, &result);
        log.info(record.log_line(policy.max_attempts));
        match result {
            Ok(report) => {
                log.info(format!("Worker health: {}", report.body));
                return Ok(ReadyReport {
                    attempts: ordinal,
                    body: report.body,
                });
            }
            Err(e) => last_error = Some(e),
        }
    }

    let last_error = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no attempts made".to_string());
    log.error(
        "Worker failed to become ready after maximum retries",
        Some(&last_error),
    );
    Err(SupervisorError::NotReady {
        attempts: policy.max_attempts,
        last_error,
    })
}
