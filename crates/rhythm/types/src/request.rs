use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::post::{PostId, StreamRef};

/// Shape of the sort being requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    /// Top-level posts across the target streams.
    Stream,
    /// Replies beneath a single top parent post.
    Tree,
}

/// Source text of a Rhythm together with its identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RhythmSource {
    pub domain: String,
    pub username: String,
    pub name: String,
    pub version: String,
    pub source: String,
}

impl RhythmSource {
    /// `domain/username/name@version`, used in logs and session-store scoping.
    pub fn identity(&self) -> String {
        format!(
            "{}/{}/{}@{}",
            self.domain, self.username, self.name, self.version
        )
    }
}

/// The user the sort runs on behalf of.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRef {
    pub domain: String,
    pub username: String,
}

impl UserRef {
    pub fn new(domain: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            username: username.into(),
        }
    }

    pub fn full_username(&self) -> String {
        format!("{}/{}", self.domain, self.username)
    }
}

/// Payload of a `RunRhythm` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SortRequest {
    pub sort_type: SortType,
    pub rhythm: RhythmSource,
    pub target_streams: Vec<StreamRef>,
    #[serde(default)]
    pub posts_from_ts: Option<i64>,
    #[serde(default)]
    pub posts_to_ts: Option<i64>,
    #[serde(default)]
    pub top_parent_post_id: Option<PostId>,
    #[serde(default)]
    pub client_params: Map<String, Value>,
    pub requesting_domain: String,
    pub user: UserRef,
}

/// Structural problems found in an incoming `RunRhythm` payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("payload must be an object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' must be {expected}")]
    WrongShape {
        field: &'static str,
        expected: &'static str,
    },

    #[error("tree sort requires top_parent_post_id")]
    MissingTopParent,

    #[error("posts_from_ts {from} is after posts_to_ts {to}")]
    InvertedWindow { from: i64, to: i64 },

    #[error("malformed payload: {0}")]
    Malformed(String),
}

const REQUIRED_FIELDS: [&str; 5] = [
    "sort_type",
    "rhythm",
    "target_streams",
    "requesting_domain",
    "user",
];

impl SortRequest {
    /// Validate the raw message payload before any state transition.
    ///
    /// Shape is checked field by field first so callers get a precise reason
    /// instead of a generic deserializer message.
    pub fn from_value(payload: &Value) -> Result<Self, ValidationError> {
        let object = payload.as_object().ok_or(ValidationError::NotAnObject)?;

        for field in REQUIRED_FIELDS {
            if object.get(field).map_or(true, Value::is_null) {
                return Err(ValidationError::MissingField(field));
            }
        }

        expect_shape(object, "target_streams", Value::is_array, "an array")?;
        expect_shape(object, "rhythm", Value::is_object, "an object")?;
        expect_shape(object, "user", Value::is_object, "an object")?;
        expect_shape(object, "requesting_domain", Value::is_string, "a string")?;
        if let Some(params) = object.get("client_params") {
            if !params.is_null() && !params.is_object() {
                return Err(ValidationError::WrongShape {
                    field: "client_params",
                    expected: "an object",
                });
            }
        }
        let source = object
            .get("rhythm")
            .and_then(|rhythm| rhythm.get("source"))
            .ok_or(ValidationError::MissingField("rhythm.source"))?;
        if !source.is_string() {
            return Err(ValidationError::WrongShape {
                field: "rhythm.source",
                expected: "a string",
            });
        }

        let mut normalized = object.clone();
        if normalized.get("client_params").map_or(false, Value::is_null) {
            normalized.remove("client_params");
        }

        let request: SortRequest = serde_json::from_value(Value::Object(normalized))
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;

        if request.sort_type == SortType::Tree && request.top_parent_post_id.is_none() {
            return Err(ValidationError::MissingTopParent);
        }
        if let (Some(from), Some(to)) = (request.posts_from_ts, request.posts_to_ts) {
            if from > to {
                return Err(ValidationError::InvertedWindow { from, to });
            }
        }

        Ok(request)
    }
}

fn expect_shape(
    object: &Map<String, Value>,
    field: &'static str,
    check: fn(&Value) -> bool,
    expected: &'static str,
) -> Result<(), ValidationError> {
    match object.get(field) {
        Some(value) if check(value) => Ok(()),
        Some(_) => Err(ValidationError::WrongShape { field, expected }),
        None => Err(ValidationError::MissingField(field)),
    }
}

/// Payload of a `GetPosts` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostQuery {
    pub qty: usize,
    #[serde(default)]
    pub from_ts: Option<i64>,
    #[serde(default)]
    pub to_ts: Option<i64>,
    #[serde(default)]
    pub with_content: bool,
    #[serde(default)]
    pub search_phrase: Option<String>,
    #[serde(default)]
    pub search_title: bool,
    #[serde(default)]
    pub search_other_fields: bool,
    pub sort_type: SortType,
    pub streams: Vec<StreamRef>,
    #[serde(default)]
    pub top_parent_post_id: Option<PostId>,
}
