//! Fixture files: the data an in-process Domus serves a local run from.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rhythm_domus::{
    kindred_for, DomusHost, HttpMiscData, InMemoryPosts, InMemorySessionStore, InMemoryTakes,
    MiscDataSource, StaticMiscData, StreamAccess, Take,
};
use rhythm_types::{
    KindredMap, KindredRow, Post, PostId, RhythmSource, SortRequest, SortType, StreamRef, UserRef,
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::MiscConfig;

#[derive(Debug, Deserialize)]
pub struct StreamFixture {
    #[serde(flatten)]
    pub stream: StreamRef,
    #[serde(default)]
    pub access: StreamAccess,
}

/// Request fields; the Rhythm itself comes from the command line.
#[derive(Debug, Deserialize)]
pub struct RequestFixture {
    #[serde(default = "default_sort_type")]
    pub sort_type: SortType,
    pub target_streams: Vec<StreamRef>,
    #[serde(default)]
    pub posts_from_ts: Option<i64>,
    #[serde(default)]
    pub posts_to_ts: Option<i64>,
    #[serde(default)]
    pub top_parent_post_id: Option<PostId>,
    #[serde(default)]
    pub client_params: Map<String, Value>,
    pub user: UserRef,
}

fn default_sort_type() -> SortType {
    SortType::Stream
}

#[derive(Debug, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub streams: Vec<StreamFixture>,
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub private_posts: Vec<PostId>,
    #[serde(default)]
    pub moderated_users: Vec<String>,
    #[serde(default)]
    pub takes: Vec<Take>,
    /// Stored kindred rows. Derived from `takes` when absent.
    #[serde(default)]
    pub kindred: Option<Vec<KindredRow>>,
    /// Inline misc data by URL.
    #[serde(default)]
    pub misc: Map<String, Value>,
    pub request: RequestFixture,
}

impl Fixture {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing fixture {}", path.display()))
    }

    /// The full `RunRhythm` payload for `rhythm`.
    pub fn sort_request(&self, rhythm: RhythmSource) -> SortRequest {
        let request = &self.request;
        SortRequest {
            sort_type: request.sort_type,
            requesting_domain: request.user.domain.clone(),
            rhythm,
            target_streams: request.target_streams.clone(),
            posts_from_ts: request.posts_from_ts,
            posts_to_ts: request.posts_to_ts,
            top_parent_post_id: request.top_parent_post_id,
            client_params: request.client_params.clone(),
            user: request.user.clone(),
        }
    }

    /// Build the Domus host. Inline misc entries win over the HTTP source.
    pub fn host(&self, misc: &MiscConfig) -> Result<Arc<DomusHost>> {
        let mut posts = InMemoryPosts::new().with_posts(self.posts.iter().cloned());
        for entry in &self.streams {
            posts = posts.with_stream(entry.stream.clone(), entry.access);
        }
        for id in &self.private_posts {
            posts = posts.with_private_post(*id);
        }
        for user in &self.moderated_users {
            posts = posts.with_moderated_user(user.clone());
        }

        let misc: Arc<dyn MiscDataSource> = if self.misc.is_empty() {
            Arc::new(HttpMiscData::new(
                misc.allowed_prefixes.clone(),
                Duration::from_millis(misc.timeout_ms),
            )?)
        } else {
            Arc::new(
                self.misc
                    .iter()
                    .fold(StaticMiscData::new(), |source, (url, value)| {
                        source.with_entry(url.clone(), value.clone())
                    }),
            )
        };

        Ok(Arc::new(DomusHost::new(
            Arc::new(posts),
            Arc::new(InMemoryTakes::new(self.takes.clone())),
            Arc::new(InMemorySessionStore::new()),
            misc,
        )))
    }

    pub async fn kindred(&self, host: &DomusHost) -> Result<KindredMap> {
        match &self.kindred {
            Some(rows) => KindredMap::from_rows(rows).context("invalid kindred rows"),
            None => Ok(kindred_for(host.takes().as_ref(), &self.request.user.full_username())
                .await?),
        }
    }
}
