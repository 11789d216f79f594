use std::sync::Arc;
use std::time::Duration;

use rhythm_transport::{Endpoint, EndpointConfig, LinkEnd, MessageHandler, MessageType};
use rhythm_types::{ErrorCode, ErrorReport, KindredMap, SortRequest, SortResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::host::DomusHost;

/// Sandbox client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Upper bound on a whole sort, measured by the caller
    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,

    /// Transport timeouts
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            run_timeout_ms: default_run_timeout_ms(),
            endpoint: EndpointConfig::default(),
        }
    }
}

fn default_run_timeout_ms() -> u64 {
    60_000
}

/// Trusted-side facade over one sandbox.
pub struct SandboxClient {
    endpoint: Arc<Endpoint>,
    host: Arc<DomusHost>,
    dispatch: JoinHandle<()>,
    config: ClientConfig,
    /// Held for the whole of a scoped `run`, so an overlapping call can never
    /// rescope the host under a sort that is still in flight.
    running: Mutex<()>,
}

impl SandboxClient {
    /// Start serving the sandbox on `link`. Must be called inside a runtime.
    pub fn connect(link: LinkEnd, host: Arc<DomusHost>, config: ClientConfig) -> Self {
        let (endpoint, inbound) = Endpoint::from_link(link, config.endpoint.clone());
        let handler: Arc<dyn MessageHandler> = host.clone();
        let dispatch = endpoint.spawn_dispatch(inbound, handler);
        Self {
            endpoint,
            host,
            dispatch,
            config,
            running: Mutex::new(()),
        }
    }

    pub fn host(&self) -> &Arc<DomusHost> {
        &self.host
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    /// Wait for the sandbox's `DomainReady`. No Rhythm may run before this.
    pub async fn await_ready(&self) -> Result<(), ErrorReport> {
        self.endpoint
            .await_peer_ready()
            .await
            .map_err(|err| err.into_report())?;
        info!(peer = %self.endpoint.peer_domain(), "Sandbox ready");
        Ok(())
    }

    /// Nothing goes to a sandbox that has not completed the handshake.
    async fn ensure_ready(&self) -> Result<(), ErrorReport> {
        if self.endpoint.is_peer_ready() {
            return Ok(());
        }
        self.endpoint
            .await_peer_ready()
            .await
            .map_err(|err| err.into_report())
    }

    /// Push the session's kindred map. Returns whether the sandbox took it.
    pub async fn send_kindred(&self, kindred: &KindredMap) -> Result<bool, ErrorReport> {
        self.ensure_ready().await?;
        let reply = self
            .endpoint
            .request(
                MessageType::ReceiveKindredData,
                json!({ "kindred": kindred }),
                None,
            )
            .await
            .map_err(|err| err.into_report())?;
        let accepted = reply["accepted"].as_bool().unwrap_or(false);
        if !accepted {
            warn!("Sandbox already had kindred data for this session");
        }
        Ok(accepted)
    }

    /// Run a sort on behalf of `request.user`.
    #[instrument(skip_all, fields(rhythm = %request.rhythm.identity()))]
    pub async fn run(&self, request: &SortRequest) -> Result<SortResult, ErrorReport> {
        let Ok(_running) = self.running.try_lock() else {
            warn!("Sort rejected, this client already has one running");
            return Err(ErrorReport::with_message(
                ErrorCode::Busy,
                "a sort is already running",
            ));
        };
        self.ensure_ready().await?;

        self.host
            .begin_session(request.user.clone(), request.rhythm.identity())
            .await;
        let payload = serde_json::to_value(request).map_err(|e| {
            ErrorReport::with_message(ErrorCode::RunRhythmInvalid, e.to_string())
        })?;
        let outcome = self.run_payload(payload).await;
        self.host.end_session().await;
        outcome
    }

    /// Send a raw `RunRhythm` payload without scoping the host.
    pub async fn run_payload(&self, payload: Value) -> Result<SortResult, ErrorReport> {
        self.ensure_ready().await?;
        let timeout = Duration::from_millis(self.config.run_timeout_ms);
        let reply = self
            .endpoint
            .request(MessageType::RunRhythm, payload, Some(timeout))
            .await
            .map_err(|err| err.into_report())?;
        serde_json::from_value(reply).map_err(|e| {
            ErrorReport::with_message(ErrorCode::Internal, format!("malformed SortResult: {e}"))
        })
    }

    pub fn shutdown(self) {
        self.dispatch.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{InMemoryPosts, InMemorySessionStore, InMemoryTakes, StaticMiscData};
    use rhythm_transport::{link, Domain};

    fn host() -> Arc<DomusHost> {
        Arc::new(DomusHost::new(
            Arc::new(InMemoryPosts::new()),
            Arc::new(InMemoryTakes::new(Vec::new())),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(StaticMiscData::new()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_sent_before_the_sandbox_is_ready() {
        let (domus_end, mut filter_end) = link(Domain::new("domus"), Domain::new("filter"), 8);
        let config = ClientConfig {
            endpoint: EndpointConfig {
                handshake_window_ms: 100,
                ..EndpointConfig::default()
            },
            ..ClientConfig::default()
        };
        let client = SandboxClient::connect(domus_end, host(), config);

        let err = client.send_kindred(&KindredMap::new()).await.unwrap_err();
        assert!(err.is(ErrorCode::TransportHandshakeTimeout));
        let err = client.run_payload(json!({})).await.unwrap_err();
        assert!(err.is(ErrorCode::TransportHandshakeTimeout));

        assert!(filter_end.inbound.try_recv().is_err());
    }
}
