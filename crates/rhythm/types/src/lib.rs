//! Rhythm data model.
//!
//! Types shared by the trusted Domus domain and the sandboxed Filter domain.
//! Everything here crosses the message boundary as JSON, so every type is
//! serde-serializable and carries no behavior beyond validation and ranking.

#![deny(unsafe_code)]

pub mod error;
pub mod kindred;
pub mod post;
pub mod request;
pub mod result;

pub use error::{translate_post_source_code, ErrorCode, ErrorReport};
pub use kindred::{KindredMap, KindredRow};
pub use post::{Author, Post, PostId, StreamRef};
pub use request::{PostQuery, RhythmSource, SortRequest, SortType, UserRef, ValidationError};
pub use result::{rank_posts, SortResult};
