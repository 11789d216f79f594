use std::sync::Arc;

use rhythm_sandbox::{CapabilityHost, CapabilityRequest};
use rhythm_transport::{Endpoint, MessageType};
use rhythm_types::ErrorReport;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tracing::debug;

/// Serves capability calls by round-tripping to the Domus domain.
///
/// Calls block the current thread, which must be a blocking-pool thread
/// (`spawn_blocking`), never a runtime worker.
pub struct TransportCapabilityHost {
    endpoint: Arc<Endpoint>,
    runtime: Handle,
}

impl TransportCapabilityHost {
    pub fn new(endpoint: Arc<Endpoint>, runtime: Handle) -> Self {
        Self { endpoint, runtime }
    }
}

fn to_message(request: CapabilityRequest) -> (MessageType, Value) {
    match request {
        CapabilityRequest::FetchTakes { field_id } => {
            (MessageType::FetchTakes, json!({ "field_id": field_id }))
        }
        CapabilityRequest::FetchTakesForUser { user, field_id } => (
            MessageType::FetchTakesForUser,
            json!({ "user": user, "field_id": field_id }),
        ),
        CapabilityRequest::GetMiscData { url } => (MessageType::GetMiscData, json!({ "url": url })),
        CapabilityRequest::StoreData { data } => (MessageType::StoreData, json!({ "data": data })),
        CapabilityRequest::GetStoredData => (MessageType::GetStoredData, Value::Null),
    }
}

impl CapabilityHost for TransportCapabilityHost {
    fn call(&self, request: CapabilityRequest) -> Result<Value, ErrorReport> {
        let (message_type, payload) = to_message(request);
        debug!(%message_type, "Capability call");
        self.runtime
            .block_on(self.endpoint.request(message_type, payload, None))
            .map_err(|err| err.into_report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_map_to_wire_messages() {
        let (ty, payload) = to_message(CapabilityRequest::FetchTakesForUser {
            user: "cobalt.example/ada".into(),
            field_id: 3,
        });
        assert_eq!(ty, MessageType::FetchTakesForUser);
        assert_eq!(payload, json!({ "user": "cobalt.example/ada", "field_id": 3 }));

        let (ty, payload) = to_message(CapabilityRequest::GetStoredData);
        assert_eq!(ty, MessageType::GetStoredData);
        assert!(payload.is_null());
    }
}
