//! Rhythm transport boundary.
//!
//! Delivers envelopes between the trusted Domus domain and the sandboxed
//! Filter domain. The transport owns correlation, per-request timeouts, the
//! readiness handshake and origin checking. It never interprets payloads.
//!
//! Origin checking is the enforcement point of the trust boundary: an envelope
//! whose declared source domain is not the expected peer is dropped without
//! touching any pending request or handler.

#![deny(unsafe_code)]

pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod link;

pub use endpoint::{Endpoint, EndpointConfig, MessageHandler};
pub use envelope::{Body, Domain, Envelope, MessageId, MessageType};
pub use error::TransportError;
pub use link::{link, LinkEnd};
