//! The trusted side of the boundary.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rhythm_transport::{MessageHandler, MessageType};
use rhythm_types::{ErrorReport, PostId, PostQuery, UserRef};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::error::DomusError;
use crate::sources::{MiscDataSource, PostSource, SessionScope, SessionStore, TakeSource};

/// A fault the sandbox reported through an `Error` notification.
#[derive(Clone, Debug, Serialize)]
pub struct FaultRecord {
    pub received_at: DateTime<Utc>,
    pub report: ErrorReport,
}

#[derive(Debug)]
struct ActiveSession {
    user: UserRef,
    scope: SessionScope,
    /// Posts handed out by the last `GetPosts`; `FetchTakes` is limited to them.
    fetched: Vec<PostId>,
}

#[derive(Deserialize)]
struct FetchTakesPayload {
    field_id: i64,
}

#[derive(Deserialize)]
struct FetchUserTakesPayload {
    user: String,
    field_id: i64,
}

#[derive(Deserialize)]
struct MiscDataPayload {
    url: String,
}

#[derive(Deserialize)]
struct StoreDataPayload {
    data: String,
}

fn parse<T: DeserializeOwned>(message_type: &'static str, data: Value) -> Result<T, DomusError> {
    serde_json::from_value(data).map_err(|e| DomusError::BadPayload {
        message_type,
        reason: e.to_string(),
    })
}

/// Serves `GetPosts`, takes, misc data and the session store to the sandbox.
pub struct DomusHost {
    posts: Arc<dyn PostSource>,
    takes: Arc<dyn TakeSource>,
    store: Arc<dyn SessionStore>,
    misc: Arc<dyn MiscDataSource>,
    session: RwLock<Option<ActiveSession>>,
    faults: RwLock<Vec<FaultRecord>>,
}

impl DomusHost {
    pub fn new(
        posts: Arc<dyn PostSource>,
        takes: Arc<dyn TakeSource>,
        store: Arc<dyn SessionStore>,
        misc: Arc<dyn MiscDataSource>,
    ) -> Self {
        Self {
            posts,
            takes,
            store,
            misc,
            session: RwLock::new(None),
            faults: RwLock::new(Vec::new()),
        }
    }

    pub fn takes(&self) -> &Arc<dyn TakeSource> {
        &self.takes
    }

    /// Scope subsequent requests to `user` running `rhythm`.
    pub async fn begin_session(&self, user: UserRef, rhythm: impl Into<String>) {
        let scope = SessionScope {
            user: user.full_username(),
            rhythm: rhythm.into(),
        };
        debug!(user = %scope.user, rhythm = %scope.rhythm, "Domus session scoped");
        *self.session.write().await = Some(ActiveSession {
            user,
            scope,
            fetched: Vec::new(),
        });
    }

    pub async fn end_session(&self) {
        self.session.write().await.take();
    }

    pub async fn faults(&self) -> Vec<FaultRecord> {
        self.faults.read().await.clone()
    }

    async fn scope(&self) -> Result<SessionScope, DomusError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.scope.clone())
            .ok_or(DomusError::NoActiveSession)
    }

    async fn get_posts(&self, data: Value) -> Result<Value, DomusError> {
        let query: PostQuery = parse("GetPosts", data)?;
        let user = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.user.clone())
            .ok_or(DomusError::NoActiveSession)?;

        let posts = self.posts.get_posts(&query, &user).await?;
        if let Some(session) = self.session.write().await.as_mut() {
            session.fetched = posts.iter().map(|p| p.id).collect();
        }
        info!(count = posts.len(), qty = query.qty, "Posts served");
        serde_json::to_value(posts).map_err(|e| DomusError::BadPayload {
            message_type: "GetPosts",
            reason: e.to_string(),
        })
    }

    async fn fetch_takes(&self, data: Value) -> Result<Value, DomusError> {
        let payload: FetchTakesPayload = parse("FetchTakes", data)?;
        let fetched = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.fetched.clone())
            .ok_or(DomusError::NoActiveSession)?;

        let takes = self
            .takes
            .takes_on_posts(&fetched, Some(payload.field_id))
            .await?;
        let mut by_post: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
        for take in takes {
            by_post
                .entry(take.post_id.to_string())
                .or_default()
                .insert(take.user, json!(take.value));
        }
        Ok(json!(by_post))
    }

    async fn fetch_user_takes(&self, data: Value) -> Result<Value, DomusError> {
        let payload: FetchUserTakesPayload = parse("FetchTakesForUser", data)?;
        let takes = self
            .takes
            .takes_by_user(&payload.user, Some(payload.field_id))
            .await?;
        let by_post: BTreeMap<String, i64> = takes
            .into_iter()
            .map(|t| (t.post_id.to_string(), t.value))
            .collect();
        Ok(json!(by_post))
    }

    async fn record_fault(&self, data: Value) {
        let report = serde_json::from_value::<ErrorReport>(data.clone())
            .unwrap_or_else(|_| ErrorReport::raw("sandbox_fault", data));
        error!(code = %report.code, data = %report.data, "Sandbox reported a fault");
        self.faults.write().await.push(FaultRecord {
            received_at: Utc::now(),
            report,
        });
    }

    async fn dispatch(&self, message_type: MessageType, data: Value) -> Result<Value, DomusError> {
        match message_type {
            MessageType::GetPosts => self.get_posts(data).await,
            MessageType::FetchTakes => self.fetch_takes(data).await,
            MessageType::FetchTakesForUser => self.fetch_user_takes(data).await,
            MessageType::GetMiscData => {
                let payload: MiscDataPayload = parse("GetMiscData", data)?;
                self.misc.fetch(&payload.url).await
            }
            MessageType::StoreData => {
                let payload: StoreDataPayload = parse("StoreData", data)?;
                let scope = self.scope().await?;
                self.store.save(&scope, payload.data).await?;
                Ok(json!({ "stored": true }))
            }
            MessageType::GetStoredData => {
                let scope = self.scope().await?;
                Ok(self
                    .store
                    .load(&scope)
                    .await?
                    .map_or(Value::Null, Value::String))
            }
            MessageType::Error => {
                self.record_fault(data).await;
                Ok(Value::Null)
            }
            other => Err(DomusError::Unsupported(other.to_string())),
        }
    }
}

#[async_trait]
impl MessageHandler for DomusHost {
    async fn handle(&self, message_type: MessageType, data: Value) -> Result<Value, ErrorReport> {
        self.dispatch(message_type, data)
            .await
            .map_err(DomusError::into_report)
    }
}
