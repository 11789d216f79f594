use std::sync::Arc;

use rhythm_transport::{Endpoint, LinkEnd, MessageHandler};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::config::FilterConfig;
use crate::controller::{RhythmController, RhythmLoader, ScriptLoader};
use crate::error::RuntimeError;
use crate::phase::Phase;

/// A running Filter domain: endpoint, dispatch loop and controller.
pub struct FilterDomain {
    endpoint: Arc<Endpoint>,
    controller: Arc<RhythmController>,
    dispatch: JoinHandle<()>,
}

impl FilterDomain {
    /// Start dispatching on `link` and complete the readiness handshake.
    ///
    /// Fails with a handshake timeout if Domus never acknowledges.
    pub async fn start(link: LinkEnd, config: FilterConfig) -> Result<Self, RuntimeError> {
        let loader = Arc::new(ScriptLoader::from_config(&config));
        Self::start_with_loader(link, config, loader).await
    }

    #[instrument(skip_all, fields(local = %link.local, peer = %link.peer))]
    pub async fn start_with_loader(
        link: LinkEnd,
        config: FilterConfig,
        loader: Arc<dyn RhythmLoader>,
    ) -> Result<Self, RuntimeError> {
        let (endpoint, inbound) = Endpoint::from_link(link, config.endpoint.clone());
        let controller = RhythmController::with_loader(Arc::clone(&endpoint), config, loader);
        let handler: Arc<dyn MessageHandler> = controller.clone();
        let dispatch = endpoint.spawn_dispatch(inbound, handler);

        if let Err(err) = endpoint.announce_ready().await {
            dispatch.abort();
            return Err(err.into());
        }
        controller.mark_ready();
        info!("Filter domain ready");

        Ok(Self {
            endpoint,
            controller,
            dispatch,
        })
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    pub fn controller(&self) -> &Arc<RhythmController> {
        &self.controller
    }

    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.controller.subscribe_phase()
    }

    pub fn shutdown(self) {
        self.dispatch.abort();
    }
}
