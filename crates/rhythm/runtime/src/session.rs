use std::sync::Arc;

use chrono::{DateTime, Utc};
use rhythm_sandbox::{Decision, FetchSettings, RhythmContext, SandboxLimits};
use rhythm_types::{KindredMap, Post, PostQuery, SortRequest, SortResult};
use uuid::Uuid;

/// Everything one `RunRhythm` owns. Built fresh for each request and dropped
/// when the run reports.
#[derive(Debug)]
pub struct SessionState {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub request: SortRequest,
    context: Arc<RhythmContext>,
    posts: Vec<Post>,
    cursor: usize,
}

impl SessionState {
    pub fn new(request: SortRequest, kindred: Arc<KindredMap>) -> Self {
        let context = RhythmContext::new(kindred, request.client_params.clone());
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            request,
            context,
            posts: Vec::new(),
            cursor: 0,
        }
    }

    pub fn context(&self) -> &Arc<RhythmContext> {
        &self.context
    }

    /// Combine the request with the Rhythm's declared settings.
    ///
    /// A window declared by the Rhythm replaces the request's window whole;
    /// its bounds are never mixed with the request's.
    pub fn post_query(&self, settings: &FetchSettings, limits: &SandboxLimits) -> PostQuery {
        let qty = settings
            .qty
            .unwrap_or(limits.default_post_quantity)
            .min(limits.max_posts);
        let (from_ts, to_ts) = if settings.window_declared {
            (settings.from_ts, settings.to_ts)
        } else {
            (self.request.posts_from_ts, self.request.posts_to_ts)
        };
        PostQuery {
            qty,
            from_ts,
            to_ts,
            with_content: settings.with_content,
            search_phrase: settings.search_phrase.clone(),
            search_title: settings.search_title,
            search_other_fields: settings.search_other_fields,
            sort_type: self.request.sort_type,
            streams: self.request.target_streams.clone(),
            top_parent_post_id: self.request.top_parent_post_id,
        }
    }

    /// Install the fetched posts. Any `sort` the source sent is discarded.
    pub fn load_posts(&mut self, mut posts: Vec<Post>) {
        for post in &mut posts {
            post.sort = None;
        }
        self.posts = posts;
        self.cursor = 0;
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    /// The post `main` should see next.
    pub fn current(&self) -> Option<&Post> {
        self.posts.get(self.cursor)
    }

    /// Apply the decision for the current post and advance the cursor.
    pub fn record(&mut self, decision: Decision) {
        if let Some(post) = self.posts.get_mut(self.cursor) {
            post.sort = decision.score();
            self.cursor += 1;
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.posts.len()
    }

    pub fn take_posts(&mut self) -> Vec<Post> {
        std::mem::take(&mut self.posts)
    }

    pub fn result(&self, posts: Vec<Post>) -> SortResult {
        SortResult {
            posts,
            sort_type: self.request.sort_type,
            top_parent_post_id: self.request.top_parent_post_id,
        }
    }
}
