//! In-memory source implementations

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use rhythm_types::{Post, PostId, PostQuery, SortType, StreamRef, UserRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    MiscDataSource, PostSource, SessionScope, SessionStore, SourceResult, Take, TakeSource,
};
use crate::error::{DomusError, PostSourceError};

/// Who may read a stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamAccess {
    #[default]
    Public,
    /// Readable by the stream owner only.
    Private,
    Moderated,
}

/// Post store for development and testing
#[derive(Debug, Default)]
pub struct InMemoryPosts {
    streams: RwLock<Vec<(StreamRef, StreamAccess)>>,
    posts: RwLock<Vec<Post>>,
    private_posts: RwLock<HashSet<PostId>>,
    moderated_users: RwLock<HashSet<String>>,
}

fn same_stream_name(a: &StreamRef, b: &StreamRef) -> bool {
    a.domain == b.domain && a.username == b.username && a.name == b.name
}

fn matches_search(post: &Post, query: &PostQuery) -> bool {
    let Some(phrase) = query.search_phrase.as_deref() else {
        return true;
    };
    let phrase = phrase.to_lowercase();
    let contains = |field: Option<&str>| {
        field.map_or(false, |text| text.to_lowercase().contains(&phrase))
    };

    let (title, other) = if query.search_title || query.search_other_fields {
        (query.search_title, query.search_other_fields)
    } else {
        (true, true)
    };
    (title && contains(post.title.as_deref()))
        || (other
            && (contains(post.content.as_deref()) || contains(Some(&post.author.username))))
}

impl InMemoryPosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(mut self, stream: StreamRef, access: StreamAccess) -> Self {
        self.streams.get_mut().push((stream, access));
        self
    }

    pub fn with_posts(mut self, posts: impl IntoIterator<Item = Post>) -> Self {
        self.posts.get_mut().extend(posts);
        self
    }

    pub fn with_private_post(mut self, id: PostId) -> Self {
        self.private_posts.get_mut().insert(id);
        self
    }

    pub fn with_moderated_user(mut self, full_username: impl Into<String>) -> Self {
        self.moderated_users.get_mut().insert(full_username.into());
        self
    }

    pub async fn insert(&self, post: Post) {
        self.posts.write().await.push(post);
    }

    async fn check_streams(
        &self,
        query: &PostQuery,
        requester: &UserRef,
    ) -> Result<(), PostSourceError> {
        let streams = self.streams.read().await;
        for wanted in &query.streams {
            let named: Vec<_> = streams
                .iter()
                .filter(|(stream, _)| same_stream_name(stream, wanted))
                .collect();
            let Some((_, access)) = named.iter().find(|(stream, _)| stream.version == wanted.version)
            else {
                return Err(if named.is_empty() {
                    PostSourceError::StreamNotFound(wanted.clone())
                } else {
                    PostSourceError::StreamVersionNotFound(wanted.clone())
                });
            };
            match access {
                StreamAccess::Private
                    if requester.domain != wanted.domain
                        || requester.username != wanted.username =>
                {
                    return Err(PostSourceError::StreamPrivate(wanted.clone()));
                }
                StreamAccess::Moderated => {
                    return Err(PostSourceError::StreamModeration(wanted.clone()));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PostSource for InMemoryPosts {
    async fn get_posts(
        &self,
        query: &PostQuery,
        requester: &UserRef,
    ) -> Result<Vec<Post>, PostSourceError> {
        let requester_name = requester.full_username();
        if self.moderated_users.read().await.contains(&requester_name) {
            return Err(PostSourceError::UserModeration(requester_name));
        }
        self.check_streams(query, requester).await?;

        let posts = self.posts.read().await;
        let private = self.private_posts.read().await;

        if query.sort_type == SortType::Tree {
            let parent = query
                .top_parent_post_id
                .ok_or(PostSourceError::PostNotFound(0))?;
            if !posts.iter().any(|p| p.id == parent) {
                return Err(PostSourceError::PostNotFound(parent));
            }
            if private.contains(&parent) {
                return Err(PostSourceError::PostPrivate(parent));
            }
        }

        let mut selected: Vec<Post> = posts
            .iter()
            .filter(|p| query.streams.contains(&p.stream_ref))
            .filter(|p| match query.sort_type {
                SortType::Stream => p.top_parent_id.is_none(),
                SortType::Tree => p.top_parent_id == query.top_parent_post_id,
            })
            .filter(|p| query.from_ts.map_or(true, |from| p.timestamp >= from))
            .filter(|p| query.to_ts.map_or(true, |to| p.timestamp <= to))
            .filter(|p| !private.contains(&p.id))
            .filter(|p| matches_search(p, query))
            .cloned()
            .collect();

        selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        selected.truncate(query.qty);
        if !query.with_content {
            for post in &mut selected {
                post.content = None;
            }
        }
        Ok(selected)
    }
}

/// Take store for development and testing
#[derive(Debug, Default)]
pub struct InMemoryTakes {
    takes: RwLock<Vec<Take>>,
}

impl InMemoryTakes {
    pub fn new(takes: Vec<Take>) -> Self {
        Self {
            takes: RwLock::new(takes),
        }
    }

    pub async fn record(&self, take: Take) {
        self.takes.write().await.push(take);
    }
}

#[async_trait]
impl TakeSource for InMemoryTakes {
    async fn takes_by_user(&self, user: &str, field_id: Option<i64>) -> SourceResult<Vec<Take>> {
        let takes = self.takes.read().await;
        Ok(takes
            .iter()
            .filter(|t| t.user == user && field_id.map_or(true, |f| t.field_id == f))
            .cloned()
            .collect())
    }

    async fn takes_on_posts(
        &self,
        post_ids: &[PostId],
        field_id: Option<i64>,
    ) -> SourceResult<Vec<Take>> {
        let takes = self.takes.read().await;
        Ok(takes
            .iter()
            .filter(|t| post_ids.contains(&t.post_id) && field_id.map_or(true, |f| t.field_id == f))
            .cloned()
            .collect())
    }
}

/// Session blob store for development and testing
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    blobs: RwLock<HashMap<SessionScope, String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, scope: &SessionScope) -> SourceResult<Option<String>> {
        Ok(self.blobs.read().await.get(scope).cloned())
    }

    async fn save(&self, scope: &SessionScope, data: String) -> SourceResult<()> {
        self.blobs.write().await.insert(scope.clone(), data);
        Ok(())
    }
}

/// Fixed URL → payload table
#[derive(Debug, Default, Clone)]
pub struct StaticMiscData {
    entries: HashMap<String, Value>,
}

impl StaticMiscData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, url: impl Into<String>, payload: Value) -> Self {
        self.entries.insert(url.into(), payload);
        self
    }
}

#[async_trait]
impl MiscDataSource for StaticMiscData {
    async fn fetch(&self, url: &str) -> SourceResult<Value> {
        self.entries
            .get(url)
            .cloned()
            .ok_or_else(|| DomusError::MiscDataNotFound(url.to_string()))
    }
}
