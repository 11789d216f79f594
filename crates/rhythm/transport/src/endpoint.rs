use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rhythm_types::ErrorReport;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::envelope::{Body, Domain, Envelope, MessageId, MessageType};
use crate::error::TransportError;
use crate::link::LinkEnd;

/// Handler for requests and notifications arriving from the peer domain.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message_type: MessageType, data: Value) -> Result<Value, ErrorReport>;
}

/// Endpoint timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Timeout applied to requests that do not specify one.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Window for the `DomainReady` handshake.
    #[serde(default = "default_handshake_window_ms")]
    pub handshake_window_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            handshake_window_ms: default_handshake_window_ms(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_handshake_window_ms() -> u64 {
    5_000
}

type PendingReply = oneshot::Sender<Result<Value, ErrorReport>>;

/// One side of the boundary.
///
/// Outgoing requests are parked in a correlation table until a reply with a
/// matching `reply_to` arrives from the expected peer domain, or until their
/// timeout elapses. Each parked request resolves exactly once.
pub struct Endpoint {
    local: Domain,
    peer: Domain,
    outbound: mpsc::Sender<Envelope>,
    pending: DashMap<MessageId, PendingReply>,
    peer_ready: watch::Sender<bool>,
    dropped_foreign: AtomicU64,
    config: EndpointConfig,
}

/// Removes a pending entry if the awaiting future goes away early.
struct PendingGuard<'a> {
    pending: &'a DashMap<MessageId, PendingReply>,
    id: MessageId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

impl Endpoint {
    pub fn new(
        local: Domain,
        peer: Domain,
        outbound: mpsc::Sender<Envelope>,
        config: EndpointConfig,
    ) -> Arc<Self> {
        let (peer_ready, _) = watch::channel(false);
        Arc::new(Self {
            local,
            peer,
            outbound,
            pending: DashMap::new(),
            peer_ready,
            dropped_foreign: AtomicU64::new(0),
            config,
        })
    }

    /// Build an endpoint from a link end, handing back its inbound receiver.
    pub fn from_link(link: LinkEnd, config: EndpointConfig) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        let endpoint = Self::new(link.local, link.peer, link.outbound, config);
        (endpoint, link.inbound)
    }

    pub fn local_domain(&self) -> &Domain {
        &self.local
    }

    pub fn peer_domain(&self) -> &Domain {
        &self.peer
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Number of envelopes discarded because of a foreign source domain.
    pub fn dropped_foreign(&self) -> u64 {
        self.dropped_foreign.load(Ordering::Relaxed)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Send a request and wait for its correlated reply.
    pub async fn request(
        &self,
        message_type: MessageType,
        data: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, TransportError> {
        let timeout =
            timeout.unwrap_or_else(|| Duration::from_millis(self.config.request_timeout_ms));
        let timeout_ms = timeout.as_millis() as u64;

        let envelope = Envelope::request(self.local.clone(), message_type, data, Some(timeout_ms));
        let id = envelope.message_id;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        debug!(message_id = %id, %message_type, timeout_ms, "Sending request");
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| TransportError::Closed)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(report))) => Err(TransportError::Remote(report)),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                warn!(message_id = %id, %message_type, timeout_ms, "Request timed out");
                Err(TransportError::Timeout {
                    message_type,
                    timeout_ms,
                })
            }
        }
    }

    /// Callback form of [`Endpoint::request`].
    ///
    /// Exactly one of `on_success` or `on_error` runs, on a spawned task.
    pub fn send<S, E>(
        self: &Arc<Self>,
        message_type: MessageType,
        data: Value,
        on_success: S,
        on_error: E,
        timeout: Option<Duration>,
    ) -> JoinHandle<()>
    where
        S: FnOnce(Value) + Send + 'static,
        E: FnOnce(ErrorReport) + Send + 'static,
    {
        let endpoint = Arc::clone(self);
        tokio::spawn(async move {
            match endpoint.request(message_type, data, timeout).await {
                Ok(data) => on_success(data),
                Err(err) => on_error(err.into_report()),
            }
        })
    }

    /// Fire-and-forget message; the peer sends no reply.
    pub async fn notify(&self, message_type: MessageType, data: Value) -> Result<(), TransportError> {
        self.outbound
            .send(Envelope::notification(self.local.clone(), message_type, data))
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Announce readiness to the peer and wait for its acknowledgement.
    pub async fn announce_ready(&self) -> Result<(), TransportError> {
        let window_ms = self.config.handshake_window_ms;
        match self
            .request(
                MessageType::DomainReady,
                Value::Null,
                Some(Duration::from_millis(window_ms)),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(TransportError::Timeout { .. }) => {
                Err(TransportError::HandshakeTimeout { window_ms })
            }
            Err(other) => Err(other),
        }
    }

    /// Wait until the peer has announced readiness.
    pub async fn await_peer_ready(&self) -> Result<(), TransportError> {
        let window_ms = self.config.handshake_window_ms;
        let mut ready = self.peer_ready.subscribe();
        let outcome = match tokio::time::timeout(
            Duration::from_millis(window_ms),
            ready.wait_for(|ready| *ready),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::HandshakeTimeout { window_ms }),
        };
        outcome
    }

    pub fn is_peer_ready(&self) -> bool {
        *self.peer_ready.borrow()
    }

    /// Start the inbound loop. It runs until the link closes.
    pub fn spawn_dispatch(
        self: &Arc<Self>,
        mut inbound: mpsc::Receiver<Envelope>,
        handler: Arc<dyn MessageHandler>,
    ) -> JoinHandle<()> {
        let endpoint = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(envelope) = inbound.recv().await {
                endpoint.dispatch(envelope, &handler);
            }
            debug!(local = %endpoint.local, "Inbound link closed");
        })
    }

    fn dispatch(self: &Arc<Self>, envelope: Envelope, handler: &Arc<dyn MessageHandler>) {
        if envelope.source_domain != self.peer {
            self.dropped_foreign.fetch_add(1, Ordering::Relaxed);
            warn!(
                local = %self.local,
                expected = %self.peer,
                actual = %envelope.source_domain,
                message_type = %envelope.message_type,
                "Dropping envelope from unexpected domain"
            );
            return;
        }

        let message_id = envelope.message_id;
        let message_type = envelope.message_type;
        match envelope.body {
            Body::Success { reply_to, data } => self.resolve(reply_to, Ok(data)),
            Body::Failure { reply_to, error } => self.resolve(reply_to, Err(error)),
            Body::Request { .. } if message_type == MessageType::DomainReady => {
                self.peer_ready.send_replace(true);
                let reply =
                    Envelope::reply(self.local.clone(), message_id, message_type, Ok(Value::Null));
                self.send_reply(reply);
            }
            Body::Request {
                data,
                expects_reply,
            } => {
                let endpoint = Arc::clone(self);
                let handler = Arc::clone(handler);
                tokio::spawn(async move {
                    let outcome = handler.handle(message_type, data).await;
                    if expects_reply {
                        let reply =
                            Envelope::reply(endpoint.local.clone(), message_id, message_type, outcome);
                        if endpoint.outbound.send(reply).await.is_err() {
                            debug!(%message_type, "Reply dropped, link closed");
                        }
                    } else if let Err(report) = outcome {
                        warn!(%message_type, code = %report.code, "Notification handler failed");
                    }
                });
            }
        }
    }

    fn resolve(&self, reply_to: MessageId, outcome: Result<Value, ErrorReport>) {
        match self.pending.remove(&reply_to) {
            Some((_, tx)) => {
                let _ = tx.send(outcome);
            }
            None => debug!(message_id = %reply_to, "Reply for unknown or settled request"),
        }
    }

    fn send_reply(&self, reply: Envelope) {
        if let Err(mpsc::error::TrySendError::Full(reply)) = self.outbound.try_send(reply) {
            let outbound = self.outbound.clone();
            tokio::spawn(async move {
                let _ = outbound.send(reply).await;
            });
        }
    }
}
