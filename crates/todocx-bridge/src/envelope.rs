use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

/// What the UI sends: an operation name and its raw payload.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeRequest {
    pub op: String,
    #[serde(default)]
    pub payload: Value,
}

impl BridgeRequest {
    pub fn new(op: &str, payload: Value) -> Self {
        Self {
            op: op.to_string(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeFailure {
    pub code: String,
    pub message: String,
}

/// What the UI gets back. Failures are data, never a rejected invoke.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeResponse {
    pub ok: bool,
    pub result: Value,
    pub error: Option<BridgeFailure>,
}

impl BridgeResponse {
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result,
            error: None,
        }
    }

    pub fn failure(err: &BridgeError, result: Value) -> Self {
        Self {
            ok: false,
            result,
            error: Some(BridgeFailure {
                code: err.code().to_string(),
                message: err.to_string(),
            }),
        }
    }
}
