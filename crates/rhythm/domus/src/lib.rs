//! Domus domain: the trusted side of the Rhythm boundary.
//!
//! The sandbox never touches storage or the network. It asks the Domus
//! domain for posts, takes, misc data and its session blob, and Domus
//! answers from pluggable sources scoped to the user the sort runs for.

#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod host;
pub mod kindred;
pub mod sources;

pub use client::{ClientConfig, SandboxClient};
pub use error::{DomusError, PostSourceError};
pub use host::{DomusHost, FaultRecord};
pub use kindred::{derive_kindred, kindred_for};
pub use sources::{
    HttpMiscData, InMemoryPosts, InMemorySessionStore, InMemoryTakes, MiscDataSource, PostSource,
    SessionScope, SessionStore, StaticMiscData, StreamAccess, Take, TakeSource,
};
