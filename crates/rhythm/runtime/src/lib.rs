//! Filter domain runtime.
//!
//! Hosts the Rhythm lifecycle controller behind a transport endpoint. A run
//! waits for kindred data, loads the Rhythm, runs `init`, fetches posts once,
//! calls `main` for each post in fetch order, runs `finalize` and replies
//! with the ranked [`SortResult`](rhythm_types::SortResult).

#![deny(unsafe_code)]

pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod gate;
pub mod host;
pub mod phase;
pub mod session;

pub use config::{FilterConfig, TimingConfig};
pub use controller::{RhythmController, RhythmLoader, ScriptLoader};
pub use domain::FilterDomain;
pub use error::RuntimeError;
pub use gate::KindredGate;
pub use host::TransportCapabilityHost;
pub use phase::Phase;
pub use session::SessionState;
