//! Sandboxed execution of untrusted Rhythm scripts.
//!
//! A Rhythm is a Rhai script defining `fn main(post)` and, optionally,
//! `fn init()` and `fn finalize(posts)`. Each Rhythm gets its own engine with
//! no module resolver, no `eval`, bounded operations and sizes, and a fixed
//! set of capability functions. Capabilities that need trusted data go
//! through a [`CapabilityHost`], which the caller backs with the transport.
//!
//! Hooks are synchronous; callers run them on a blocking thread.

#![deny(unsafe_code)]

pub mod capability;
pub mod context;
mod engine;
pub mod error;
pub mod limits;
pub mod lint;
pub mod rhythm;

pub use capability::{CapabilityHost, CapabilityRequest};
pub use context::{Decision, FetchSettings, RhythmContext};
pub use error::{Hook, SandboxError};
pub use limits::SandboxLimits;
pub use lint::{outline, FunctionSignature, RhythmOutline};
pub use rhythm::{Rhythm, ScriptRhythm};
