//! The Rhythm lifecycle controller.
//!
//! One controller serves one sandbox. It accepts a single `RunRhythm` at a
//! time, owns the post cursor and drives the hooks one call at a time on the
//! blocking pool.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rhythm_sandbox::{
    CapabilityHost, Hook, Rhythm, RhythmContext, SandboxError, SandboxLimits, ScriptRhythm,
};
use rhythm_transport::{Endpoint, MessageHandler, MessageType, TransportError};
use rhythm_types::{
    rank_posts, ErrorCode, ErrorReport, KindredMap, Post, PostId, PostQuery, RhythmSource,
    SortRequest, SortResult,
};
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::config::FilterConfig;
use crate::error::RuntimeError;
use crate::gate::KindredGate;
use crate::host::TransportCapabilityHost;
use crate::phase::Phase;
use crate::session::SessionState;

/// Turns Rhythm source into something the controller can drive.
pub trait RhythmLoader: Send + Sync {
    fn load(
        &self,
        source: &RhythmSource,
        context: Arc<RhythmContext>,
        host: Arc<dyn CapabilityHost>,
    ) -> Result<Arc<dyn Rhythm>, SandboxError>;
}

/// Loads Rhai Rhythms into a restricted engine.
#[derive(Debug, Clone)]
pub struct ScriptLoader {
    limits: SandboxLimits,
    hook_budget: Option<Duration>,
}

impl ScriptLoader {
    pub fn new(limits: SandboxLimits, hook_budget: Option<Duration>) -> Self {
        Self {
            limits,
            hook_budget,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.limits.clone(), Some(config.timing.item_timeout()))
    }
}

impl RhythmLoader for ScriptLoader {
    fn load(
        &self,
        source: &RhythmSource,
        context: Arc<RhythmContext>,
        host: Arc<dyn CapabilityHost>,
    ) -> Result<Arc<dyn Rhythm>, SandboxError> {
        let rhythm = ScriptRhythm::load(source, context, host, &self.limits, self.hook_budget)?;
        Ok(Arc::new(rhythm))
    }
}

/// Filter-side handler for `RunRhythm` and `ReceiveKindredData`.
pub struct RhythmController {
    endpoint: Arc<Endpoint>,
    config: FilterConfig,
    loader: Arc<dyn RhythmLoader>,
    gate: KindredGate,
    phase: watch::Sender<Phase>,
    /// Set once Domus has acknowledged our `DomainReady`.
    ready: watch::Sender<bool>,
    running: Mutex<()>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl RhythmController {
    pub fn new(endpoint: Arc<Endpoint>, config: FilterConfig) -> Arc<Self> {
        let loader = Arc::new(ScriptLoader::from_config(&config));
        Self::with_loader(endpoint, config, loader)
    }

    pub fn with_loader(
        endpoint: Arc<Endpoint>,
        config: FilterConfig,
        loader: Arc<dyn RhythmLoader>,
    ) -> Arc<Self> {
        let (phase, _) = watch::channel(Phase::Idle);
        let (ready, _) = watch::channel(false);
        Arc::new(Self {
            endpoint,
            config,
            loader,
            gate: KindredGate::new(),
            phase,
            ready,
            running: Mutex::new(()),
        })
    }

    /// Record a completed readiness handshake. Until then no session data is
    /// accepted and no Rhythm runs.
    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Hold a message that raced the handshake acknowledgement, failing it
    /// if the handshake does not complete within the window.
    async fn wait_ready(&self) -> Result<(), RuntimeError> {
        if self.is_ready() {
            return Ok(());
        }
        let window_ms = self.config.endpoint.handshake_window_ms;
        let mut ready = self.ready.subscribe();
        let outcome = match tokio::time::timeout(
            Duration::from_millis(window_ms),
            ready.wait_for(|ready| *ready),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(RuntimeError::Transport(TransportError::Closed)),
            Err(_) => {
                warn!(window_ms, "Rejecting message, readiness handshake incomplete");
                Err(RuntimeError::Transport(TransportError::HandshakeTimeout {
                    window_ms,
                }))
            }
        };
        outcome
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn gate(&self) -> &KindredGate {
        &self.gate
    }

    fn set_phase(&self, phase: Phase) {
        let previous = self.phase.send_replace(phase);
        debug!(from = %previous, to = %phase, "Phase transition");
    }

    /// Execute one sort request end to end.
    ///
    /// Rejected with [`RuntimeError::Busy`] while another run is in flight.
    #[instrument(skip_all)]
    pub async fn run(&self, payload: Value) -> Result<SortResult, RuntimeError> {
        self.wait_ready().await?;
        let Ok(_running) = self.running.try_lock() else {
            warn!(phase = %self.phase(), "RunRhythm rejected, a sort is already running");
            return Err(RuntimeError::Busy);
        };

        let outcome = self.execute(payload).await;

        self.set_phase(Phase::Reporting);
        match &outcome {
            Ok(result) => info!(posts = result.posts.len(), "Sort complete"),
            Err(err) => warn!(error = %err, "Sort failed"),
        }
        self.set_phase(Phase::Idle);
        outcome
    }

    async fn execute(&self, payload: Value) -> Result<SortResult, RuntimeError> {
        let request = SortRequest::from_value(&payload).map_err(RuntimeError::InvalidRequest)?;

        self.set_phase(Phase::AwaitingKindred);
        let kindred = self.gate.wait(self.config.timing.kindred_timeout()).await?;

        let mut session = SessionState::new(request, kindred);
        info!(
            session_id = %session.id,
            rhythm = %session.request.rhythm.identity(),
            sort_type = ?session.request.sort_type,
            "Session started"
        );

        self.set_phase(Phase::Loading);
        let rhythm = self.load(&session).await?;

        self.set_phase(Phase::Init);
        let init = Arc::clone(&rhythm);
        self.blocking(Hook::Init.name(), None, move || init.init()).await?;

        let settings = session.context().lock_settings();
        let query = session.post_query(&settings, &self.config.limits);
        let posts = self.fetch_posts(&query).await?;
        debug!(session_id = %session.id, count = posts.len(), "Posts fetched");
        session.load_posts(posts);

        self.set_phase(Phase::Iterating);
        while let Some(post) = session.current().cloned() {
            let post_id = post.id;
            let main = Arc::clone(&rhythm);
            let decision = self
                .blocking(Hook::Main.name(), Some(post_id), move || main.main(&post))
                .await?;
            debug!(post_id, ?decision, "Post processed");
            session.record(decision);
        }

        self.set_phase(Phase::Finalizing);
        let posts = session.take_posts();
        let finalize = Arc::clone(&rhythm);
        let posts = self
            .blocking(Hook::Finalize.name(), None, move || finalize.finalize(posts))
            .await?;

        Ok(session.result(rank_posts(posts)))
    }

    async fn load(&self, session: &SessionState) -> Result<Arc<dyn Rhythm>, RuntimeError> {
        let loader = Arc::clone(&self.loader);
        let source = session.request.rhythm.clone();
        let context = Arc::clone(session.context());
        let host: Arc<dyn CapabilityHost> = Arc::new(TransportCapabilityHost::new(
            Arc::clone(&self.endpoint),
            Handle::current(),
        ));
        self.blocking("load", None, move || loader.load(&source, context, host))
            .await
    }

    async fn fetch_posts(&self, query: &PostQuery) -> Result<Vec<Post>, RuntimeError> {
        let payload =
            serde_json::to_value(query).map_err(|e| RuntimeError::Internal(e.to_string()))?;
        let data = self
            .endpoint
            .request(MessageType::GetPosts, payload, None)
            .await
            .map_err(RuntimeError::from_post_fetch)?;
        serde_json::from_value(data).map_err(|e| {
            RuntimeError::PostSource(ErrorReport::with_message(
                ErrorCode::SortRequestPosts,
                format!("malformed posts payload: {e}"),
            ))
        })
    }

    /// Run a sandbox call on the blocking pool.
    ///
    /// A panic is reported to the Domus domain as an `Error` notification and
    /// ends the run.
    async fn blocking<T, F>(
        &self,
        stage: &'static str,
        post_id: Option<PostId>,
        call: F,
    ) -> Result<T, RuntimeError>
    where
        F: FnOnce() -> Result<T, SandboxError> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::task::spawn_blocking(call).await {
            Ok(result) => result.map_err(|err| RuntimeError::sandbox(err, post_id)),
            Err(join) if join.is_panic() => {
                let message = panic_message(join.into_panic());
                error!(stage, post_id, %message, "Rhythm call panicked");
                let fault = ErrorReport::new(
                    ErrorCode::Internal,
                    json!({ "message": message, "stage": stage, "post_id": post_id }),
                );
                let fault = serde_json::to_value(&fault).unwrap_or(Value::Null);
                if let Err(err) = self.endpoint.notify(MessageType::Error, fault).await {
                    warn!(error = %err, "Could not report panic to Domus");
                }
                Err(RuntimeError::Panicked { stage, message })
            }
            Err(join) => Err(RuntimeError::Internal(format!("{stage} call cancelled: {join}"))),
        }
    }

    async fn receive_kindred(&self, payload: &Value) -> Result<Value, RuntimeError> {
        self.wait_ready().await?;
        let kindred = KindredMap::from_payload(payload).map_err(RuntimeError::InvalidKindred)?;
        let accepted = self.gate.resolve(kindred);
        Ok(json!({ "accepted": accepted }))
    }
}

#[async_trait]
impl MessageHandler for RhythmController {
    async fn handle(&self, message_type: MessageType, data: Value) -> Result<Value, ErrorReport> {
        match message_type {
            MessageType::RunRhythm => {
                let result = self.run(data).await.map_err(RuntimeError::into_report)?;
                serde_json::to_value(result)
                    .map_err(|e| RuntimeError::Internal(e.to_string()).into_report())
            }
            MessageType::ReceiveKindredData => self
                .receive_kindred(&data)
                .await
                .map_err(RuntimeError::into_report),
            other => Err(ErrorReport::with_message(
                ErrorCode::Internal,
                format!("filter domain does not handle {other}"),
            )),
        }
    }
}
