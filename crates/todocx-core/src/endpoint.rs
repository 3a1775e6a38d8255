use serde::Serialize;

pub const WORKER_HOST: &str = "127.0.0.1";
pub const WORKER_PORT: u16 = 8765;
pub const HEALTH_PATH: &str = "/api/system/health";

/// Loopback address of the conversion worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerEndpoint {
    pub host: String,
    pub port: u16,
}

impl Default for WorkerEndpoint {
    fn default() -> Self {
        Self {
            host: WORKER_HOST.to_string(),
            port: WORKER_PORT,
        }
    }
}

impl WorkerEndpoint {
    pub fn loopback(port: u16) -> Self {
        Self {
            host: WORKER_HOST.to_string(),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn health_url(&self) -> String {
        format!("{}{HEALTH_PATH}", self.base_url())
    }
}
