use serde::{Deserialize, Serialize};

/// Post identifier as issued by the Domus post store.
pub type PostId = u64;

/// Author of a post, addressed by home domain and username.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    pub domain: String,
    pub username: String,
}

impl Author {
    pub fn new(domain: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            username: username.into(),
        }
    }

    /// Full username in `domain/username` form, the key used by kindred maps.
    pub fn full_username(&self) -> String {
        format!("{}/{}", self.domain, self.username)
    }
}

/// Reference to a named, versioned stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamRef {
    pub domain: String,
    pub username: String,
    pub name: String,
    pub version: String,
}

impl StreamRef {
    pub fn new(
        domain: impl Into<String>,
        username: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            username: username.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for StreamRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}@{}",
            self.domain, self.username, self.name, self.version
        )
    }
}

/// A content item handed to a Rhythm.
///
/// `sort` stays `None` until the Rhythm scores the post; only scored posts
/// reach the final result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub timestamp: i64,
    pub author: Author,
    pub stream_ref: StreamRef,
    pub post_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_parent_id: Option<PostId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<f64>,
}

impl Post {
    pub fn new(id: PostId, timestamp: i64, author: Author, stream_ref: StreamRef) -> Self {
        Self {
            id,
            timestamp,
            author,
            stream_ref,
            post_mode: "post".to_string(),
            top_parent_id: None,
            title: None,
            content: None,
            sort: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_parent(mut self, top_parent_id: PostId) -> Self {
        self.top_parent_id = Some(top_parent_id);
        self
    }

    pub fn is_scored(&self) -> bool {
        self.sort.is_some()
    }
}
