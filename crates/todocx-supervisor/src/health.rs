use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use todocx_core::endpoint::WorkerEndpoint;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeError {
    #[error("timed out")]
    Timeout,
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("{0}")]
    Other(String),
}

impl ProbeError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProbeError::Timeout
        } else if e.is_connect() {
            ProbeError::ConnectionRefused(e.to_string())
        } else if let Some(status) = e.status() {
            ProbeError::Status(status.as_u16())
        } else {
            ProbeError::Other(e.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub status: u16,
    /// Decoded JSON body, or the raw text wrapped in a string when it is not JSON.
    pub body: Value,
}

/// One readiness check. Implementations must not retry internally.
pub trait HealthProbe: Send + Sync {
    fn check(&self, timeout: Duration) -> BoxFuture<'_, Result<HealthReport, ProbeError>>;
}

#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(endpoint: &WorkerEndpoint) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: endpoint.health_url(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl HealthProbe for HttpHealthProbe {
    fn check(&self, timeout: Duration) -> BoxFuture<'_, Result<HealthReport, ProbeError>> {
        Box::pin(async move {
            let resp = self
                .client
                .get(&self.url)
                .timeout(timeout)
                .send()
                .await
                .map_err(ProbeError::from_reqwest)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(ProbeError::Status(status.as_u16()));
            }
            let text = resp.text().await.map_err(ProbeError::from_reqwest)?;
            let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
            Ok(HealthReport {
                status: status.as_u16(),
                body,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Timeout,
    ConnectionRefused,
    Other(String),
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success => f.write_str("ok"),
            AttemptOutcome::Timeout => f.write_str("timeout"),
            AttemptOutcome::ConnectionRefused => f.write_str("connection refused"),
            AttemptOutcome::Other(m) => f.write_str(m),
        }
    }
}

/// Record of a single retry-loop attempt; lives only as long as its log line.
#[derive(Debug, Clone)]
pub struct HealthCheckAttempt {
    pub ordinal: u32,
    pub at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

impl HealthCheckAttempt {
    pub fn from_result(ordinal: u32, result: &Result<HealthReport, ProbeError>) -> Self {
        let outcome = match result {
            Ok(_) => AttemptOutcome::Success,
            Err(ProbeError::Timeout) => AttemptOutcome::Timeout,
            Err(ProbeError::ConnectionRefused(_)) => AttemptOutcome::ConnectionRefused,
            Err(e) => AttemptOutcome::Other(e.to_string()),
        };
        Self {
            ordinal,
            at: Utc::now(),
            outcome,
        }
    }

    pub fn log_line(&self, max_attempts: u32) -> String {
        format!(
            "Health check attempt {}/{max_attempts}: {}",
            self.ordinal, self.outcome
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::{Read, Write},
        net::TcpListener,
        thread,
    };

    // Serves exactly one canned HTTP response and returns the port.
    fn serve_once(status_line: &'static str, body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf);
                let resp = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes());
            }
        });
        port
    }

    #[tokio::test]
    async fn success_response_decodes_json_body() {
        let port = serve_once("200 OK", r#"{"status":"healthy"}"#);
        let probe = HttpHealthProbe::new(&WorkerEndpoint::loopback(port));
        assert!(probe.url().ends_with("/api/system/health"));
        let report = probe.check(Duration::from_secs(2)).await.expect("healthy");
        assert_eq!(report.status, 200);
        assert_eq!(report.body["status"], "healthy");
    }

    #[tokio::test]
    async fn non_json_body_still_counts_as_ready() {
        let port = serve_once("200 OK", "ok");
        let probe = HttpHealthProbe::new(&WorkerEndpoint::loopback(port));
        let report = probe.check(Duration::from_secs(2)).await.expect("healthy");
        assert_eq!(report.body, Value::String("ok".to_string()));
    }

    #[tokio::test]
    async fn error_status_is_a_failed_attempt() {
        let port = serve_once("503 Service Unavailable", "{}");
        let probe = HttpHealthProbe::new(&WorkerEndpoint::loopback(port));
        let err = probe.check(Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(err, ProbeError::Status(503));
    }

    #[tokio::test]
    async fn closed_port_is_connection_refused() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").expect("bind");
            l.local_addr().expect("addr").port()
        };
        let probe = HttpHealthProbe::new(&WorkerEndpoint::loopback(port));
        let err = probe.check(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, ProbeError::ConnectionRefused(_)), "{err}");
        let attempt = HealthCheckAttempt::from_result(1, &Err(err));
        assert_eq!(attempt.outcome, AttemptOutcome::ConnectionRefused);
        assert_eq!(attempt.log_line(10), "Health check attempt 1/10: connection refused");
    }
}
