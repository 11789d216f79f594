use std::sync::Arc;
use std::time::Duration;

use rhythm_types::KindredMap;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::RuntimeError;

/// One-shot gate holding the session's kindred map.
///
/// Runs wait on the gate before fetching posts. The first map delivered
/// resolves it for the lifetime of the sandbox.
#[derive(Debug)]
pub struct KindredGate {
    tx: watch::Sender<Option<Arc<KindredMap>>>,
}

impl Default for KindredGate {
    fn default() -> Self {
        Self::new()
    }
}

impl KindredGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Resolve the gate. Returns `false` if it was already resolved.
    pub fn resolve(&self, kindred: KindredMap) -> bool {
        let entries = kindred.len();
        let accepted = self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(Arc::new(kindred));
            true
        });
        if accepted {
            info!(entries, "Kindred data received");
        } else {
            warn!(entries, "Kindred data already loaded for this session, ignoring");
        }
        accepted
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Wait for the kindred map, at most `timeout`.
    pub async fn wait(&self, timeout: Duration) -> Result<Arc<KindredMap>, RuntimeError> {
        let mut rx = self.tx.subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await;
        match waited {
            Ok(Ok(slot)) => slot
                .clone()
                .ok_or_else(|| RuntimeError::Internal("kindred gate resolved empty".to_string())),
            Ok(Err(_)) => Err(RuntimeError::Internal("kindred gate closed".to_string())),
            Err(_) => Err(RuntimeError::KindredTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}
