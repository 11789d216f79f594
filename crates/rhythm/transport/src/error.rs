use rhythm_types::{ErrorCode, ErrorReport};
use serde_json::json;
use thiserror::Error;

use crate::envelope::MessageType;

/// Transport errors.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("no reply to {message_type} within {timeout_ms}ms")]
    Timeout {
        message_type: MessageType,
        timeout_ms: u64,
    },

    #[error("peer domain did not complete the readiness handshake within {window_ms}ms")]
    HandshakeTimeout { window_ms: u64 },

    #[error("transport link closed")]
    Closed,

    #[error("remote error: {0}")]
    Remote(ErrorReport),
}

impl TransportError {
    /// Boundary form of this error. Remote reports pass through unchanged.
    pub fn into_report(self) -> ErrorReport {
        match self {
            TransportError::Remote(report) => report,
            TransportError::Timeout {
                message_type,
                timeout_ms,
            } => ErrorReport::new(
                ErrorCode::TransportTimeout,
                json!({
                    "message_type": message_type.to_string(),
                    "timeout_ms": timeout_ms,
                }),
            ),
            TransportError::HandshakeTimeout { window_ms } => ErrorReport::new(
                ErrorCode::TransportHandshakeTimeout,
                json!({ "window_ms": window_ms }),
            ),
            TransportError::Closed => {
                ErrorReport::with_message(ErrorCode::TransportClosed, "transport link closed")
            }
        }
    }
}
