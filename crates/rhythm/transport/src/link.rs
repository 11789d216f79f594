use tokio::sync::mpsc;

use crate::envelope::{Domain, Envelope};

/// One side of a bidirectional in-memory link.
pub struct LinkEnd {
    pub local: Domain,
    pub peer: Domain,
    pub outbound: mpsc::Sender<Envelope>,
    pub inbound: mpsc::Receiver<Envelope>,
}

/// Create a connected pair of link ends with bounded buffers.
pub fn link(a: Domain, b: Domain, capacity: usize) -> (LinkEnd, LinkEnd) {
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);

    let a_end = LinkEnd {
        local: a.clone(),
        peer: b.clone(),
        outbound: a_tx,
        inbound: a_rx,
    };
    let b_end = LinkEnd {
        local: b,
        peer: a,
        outbound: b_tx,
        inbound: b_rx,
    };
    (a_end, b_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageType;
    use serde_json::json;

    #[tokio::test]
    async fn ends_are_cross_connected() {
        let (mut domus, mut filter) = link(Domain::new("domus"), Domain::new("filter"), 4);
        assert_eq!(domus.peer, filter.local);

        domus
            .outbound
            .send(Envelope::notification(
                domus.local.clone(),
                MessageType::Error,
                json!({}),
            ))
            .await
            .unwrap();
        let received = filter.inbound.recv().await.unwrap();
        assert_eq!(received.source_domain, Domain::new("domus"));

        filter
            .outbound
            .send(Envelope::notification(
                filter.local.clone(),
                MessageType::Error,
                json!({}),
            ))
            .await
            .unwrap();
        assert!(domus.inbound.recv().await.is_some());
    }
}
