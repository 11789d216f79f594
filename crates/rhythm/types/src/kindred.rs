use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::ValidationError;

/// Affinity of the running user toward other users, keyed by full username.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KindredMap(BTreeMap<String, i64>);

/// A stored kindred row as kept by the Domus side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindredRow {
    pub username: String,
    pub score: i64,
}

impl KindredMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, full_username: impl Into<String>, score: i64) {
        self.0.insert(full_username.into(), score);
    }

    /// Add `delta` to the score for `full_username`, starting from zero.
    pub fn adjust(&mut self, full_username: &str, delta: i64) {
        *self.0.entry(full_username.to_string()).or_insert(0) += delta;
    }

    /// Score for a user; users without history score zero.
    pub fn score(&self, full_username: &str) -> i64 {
        self.0.get(full_username).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &i64)> {
        self.0.iter()
    }

    /// Build from stored rows, rejecting blank usernames and duplicates.
    pub fn from_rows(rows: &[KindredRow]) -> Result<Self, ValidationError> {
        let mut map = BTreeMap::new();
        for row in rows {
            if row.username.trim().is_empty() {
                return Err(ValidationError::Malformed(
                    "kindred row has an empty username".to_string(),
                ));
            }
            if map.insert(row.username.clone(), row.score).is_some() {
                return Err(ValidationError::Malformed(format!(
                    "duplicate kindred row for '{}'",
                    row.username
                )));
            }
        }
        Ok(Self(map))
    }

    /// Parse the `kindred` field of a `ReceiveKindredData` payload.
    ///
    /// Every value must be an integer; floats and strings are rejected rather
    /// than coerced.
    pub fn from_payload(payload: &Value) -> Result<Self, ValidationError> {
        let kindred = payload
            .get("kindred")
            .ok_or(ValidationError::MissingField("kindred"))?
            .as_object()
            .ok_or(ValidationError::WrongShape {
                field: "kindred",
                expected: "an object",
            })?;

        let mut map = BTreeMap::new();
        for (username, score) in kindred {
            let score = score.as_i64().ok_or_else(|| {
                ValidationError::Malformed(format!(
                    "kindred score for '{username}' is not an integer"
                ))
            })?;
            map.insert(username.clone(), score);
        }
        Ok(Self(map))
    }
}

impl FromIterator<(String, i64)> for KindredMap {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
