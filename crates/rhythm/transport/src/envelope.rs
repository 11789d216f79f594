use rhythm_types::ErrorReport;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Name of a security domain, e.g. `domus.cobalt.example`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Domain(pub String);

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation identifier assigned to every outgoing envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message types understood by either side of the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    DomainReady,
    RunRhythm,
    GetPosts,
    FetchTakes,
    FetchTakesForUser,
    GetMiscData,
    StoreData,
    GetStoredData,
    ReceiveKindredData,
    Error,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// What an envelope carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Body {
    Request {
        data: Value,
        expects_reply: bool,
    },
    Success {
        reply_to: MessageId,
        data: Value,
    },
    Failure {
        reply_to: MessageId,
        error: ErrorReport,
    },
}

/// Unit of delivery across the boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: MessageId,
    pub message_type: MessageType,
    pub body: Body,
    pub source_domain: Domain,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Envelope {
    pub fn request(
        source_domain: Domain,
        message_type: MessageType,
        data: Value,
        timeout_ms: Option<u64>,
    ) -> Self {
        Self {
            message_id: MessageId::generate(),
            message_type,
            body: Body::Request {
                data,
                expects_reply: true,
            },
            source_domain,
            timeout_ms,
        }
    }

    pub fn notification(source_domain: Domain, message_type: MessageType, data: Value) -> Self {
        Self {
            message_id: MessageId::generate(),
            message_type,
            body: Body::Request {
                data,
                expects_reply: false,
            },
            source_domain,
            timeout_ms: None,
        }
    }

    /// Build the reply to request `reply_to` from a handler outcome.
    pub fn reply(
        source_domain: Domain,
        reply_to: MessageId,
        message_type: MessageType,
        outcome: Result<Value, ErrorReport>,
    ) -> Self {
        let body = match outcome {
            Ok(data) => Body::Success { reply_to, data },
            Err(error) => Body::Failure { reply_to, error },
        };
        Self {
            message_id: MessageId::generate(),
            message_type,
            body,
            source_domain,
            timeout_ms: None,
        }
    }
}
