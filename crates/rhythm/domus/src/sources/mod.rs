//! Data sources the Domus host serves the sandbox from.

mod http;
mod memory;

pub use http::HttpMiscData;
pub use memory::{InMemoryPosts, InMemorySessionStore, InMemoryTakes, StaticMiscData, StreamAccess};

use async_trait::async_trait;
use rhythm_types::{Post, PostId, PostQuery, UserRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DomusError, PostSourceError};

/// Result type for source operations
pub type SourceResult<T> = Result<T, DomusError>;

/// A user's rating of a post on one field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Take {
    pub post_id: PostId,
    /// Full username of the taker.
    pub user: String,
    pub field_id: i64,
    pub value: i64,
}

/// Key a session blob is stored under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionScope {
    pub user: String,
    pub rhythm: String,
}

/// Posts visible to a sort.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Resolve a query on behalf of `requester`.
    async fn get_posts(
        &self,
        query: &PostQuery,
        requester: &UserRef,
    ) -> Result<Vec<Post>, PostSourceError>;
}

/// Historical takes.
#[async_trait]
pub trait TakeSource: Send + Sync {
    /// Takes by `user`, optionally on one field only.
    async fn takes_by_user(&self, user: &str, field_id: Option<i64>) -> SourceResult<Vec<Take>>;

    /// Takes on any of `post_ids`, optionally on one field only.
    async fn takes_on_posts(
        &self,
        post_ids: &[PostId],
        field_id: Option<i64>,
    ) -> SourceResult<Vec<Take>>;
}

/// One string blob per (user, Rhythm).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, scope: &SessionScope) -> SourceResult<Option<String>>;

    async fn save(&self, scope: &SessionScope, data: String) -> SourceResult<()>;
}

/// Opaque external data addressed by URL.
#[async_trait]
pub trait MiscDataSource: Send + Sync {
    async fn fetch(&self, url: &str) -> SourceResult<Value>;
}
