//! JSON snapshots of taxonomy errors
//!
//! `to_json` is the full internal view for logs. `to_public_json` is the only
//! representation allowed across a trust boundary: no stack, no context, no
//! causal chain.

use super::chain::ChainLink;
use super::types::ResilienceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Redacted error shape safe for external consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicErrorJson {
    pub error_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub code: String,
    pub message: String,
    pub status_code: u16,
    pub retryable: bool,
}

impl ResilienceError {
    /// Redacted snapshot for HTTP responses and other external surfaces
    pub fn to_public_json(&self) -> PublicErrorJson {
        PublicErrorJson {
            error_id: self.id,
            timestamp: self.timestamp,
            code: self.code.clone(),
            message: self.message.clone(),
            status_code: self.status_code,
            retryable: self.retryable,
        }
    }

    /// Full internal snapshot including stack, context and causal chain
    pub fn to_json(&self) -> Value {
        let cause = self.error_chain().get(1).map(|link| match link {
            ChainLink::Error(inner) => inner.to_json(),
            ChainLink::Native(native) => json!({
                "name": "NativeError",
                "message": native.to_string(),
            }),
        });

        let mut snapshot = json!({
            "errorId": self.id,
            "timestamp": self.timestamp,
            "name": self.kind.name(),
            "code": self.code,
            "message": self.message,
            "severity": self.severity,
            "category": self.category,
            "statusCode": self.status_code,
            "retryable": self.retryable,
            "context": self.context,
            "stack": self.stack.as_deref(),
            "cause": cause,
        });

        if !self.errors.is_empty() {
            snapshot["errors"] = Value::Array(self.errors.iter().map(Self::to_json).collect());
        }

        snapshot
    }
}
