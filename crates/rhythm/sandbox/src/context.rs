//! Per-session state shared between the controller and capability functions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rhythm_types::{ErrorReport, KindredMap, PostId};
use serde_json::{Map, Value};
use tracing::warn;

/// Outcome of one `main(post)` call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Decision {
    /// The Rhythm neither scored nor skipped the post.
    Pending,
    Scored(f64),
    Skipped,
}

impl Decision {
    pub fn score(&self) -> Option<f64> {
        match self {
            Decision::Scored(score) => Some(*score),
            _ => None,
        }
    }
}

/// Fetch parameters a Rhythm may declare before the posts are fetched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchSettings {
    pub qty: Option<usize>,
    /// Set once `set_time_window` has been called. The declared bounds then
    /// replace the request's window as a pair, with `None` meaning open.
    pub window_declared: bool,
    pub from_ts: Option<i64>,
    pub to_ts: Option<i64>,
    pub search_phrase: Option<String>,
    pub search_title: bool,
    pub search_other_fields: bool,
    pub with_content: bool,
    locked: bool,
}

impl FetchSettings {
    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

#[derive(Debug)]
struct ItemState {
    post_id: Option<PostId>,
    decision: Decision,
}

/// State one Rhythm run shares with its capability functions.
///
/// Constructed fresh for every sort request.
#[derive(Debug)]
pub struct RhythmContext {
    kindred: Arc<KindredMap>,
    client_params: Map<String, Value>,
    settings: Mutex<FetchSettings>,
    item: Mutex<ItemState>,
    fault: Mutex<Option<ErrorReport>>,
    deadline: Mutex<Option<Instant>>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RhythmContext {
    pub fn new(kindred: Arc<KindredMap>, client_params: Map<String, Value>) -> Arc<Self> {
        Arc::new(Self {
            kindred,
            client_params,
            settings: Mutex::new(FetchSettings::default()),
            item: Mutex::new(ItemState {
                post_id: None,
                decision: Decision::Pending,
            }),
            fault: Mutex::new(None),
            deadline: Mutex::new(None),
        })
    }

    pub fn kindred(&self) -> &KindredMap {
        &self.kindred
    }

    pub fn client_param(&self, name: &str) -> Option<&Value> {
        self.client_params.get(name)
    }

    /// Snapshot the declared settings and freeze them.
    ///
    /// Called once, right before the post fetch fires.
    pub fn lock_settings(&self) -> FetchSettings {
        let mut settings = lock(&self.settings);
        settings.locked = true;
        settings.clone()
    }

    /// Apply `update` unless the fetch has already fired.
    pub(crate) fn update_settings(&self, setter: &str, update: impl FnOnce(&mut FetchSettings)) {
        let mut settings = lock(&self.settings);
        if settings.locked {
            warn!(setter, "Fetch settings changed after posts were fetched, ignoring");
            return;
        }
        update(&mut settings);
    }

    pub fn settings(&self) -> FetchSettings {
        lock(&self.settings).clone()
    }

    /// Open the decision slot for `post_id`.
    pub fn begin_item(&self, post_id: PostId) {
        let mut item = lock(&self.item);
        item.post_id = Some(post_id);
        item.decision = Decision::Pending;
    }

    /// Close the decision slot and return what the Rhythm decided.
    pub fn end_item(&self) -> Decision {
        let mut item = lock(&self.item);
        item.post_id = None;
        std::mem::replace(&mut item.decision, Decision::Pending)
    }

    pub fn current_post(&self) -> Option<PostId> {
        lock(&self.item).post_id
    }

    /// Record a decision for the open post. First decision wins.
    ///
    /// Returns `false` when no post is open.
    pub(crate) fn decide(&self, decision: Decision) -> bool {
        let mut item = lock(&self.item);
        let Some(post_id) = item.post_id else {
            return false;
        };
        if item.decision != Decision::Pending {
            warn!(post_id, previous = ?item.decision, ignored = ?decision, "Repeated decision for post, keeping the first");
            return true;
        }
        item.decision = decision;
        true
    }

    pub(crate) fn record_fault(&self, report: ErrorReport) {
        *lock(&self.fault) = Some(report);
    }

    pub(crate) fn take_fault(&self) -> Option<ErrorReport> {
        lock(&self.fault).take()
    }

    /// Arm the per-call time budget.
    pub fn arm_deadline(&self, budget: Duration) {
        *lock(&self.deadline) = Some(Instant::now() + budget);
    }

    pub fn disarm_deadline(&self) {
        *lock(&self.deadline) = None;
    }

    pub(crate) fn deadline_passed(&self) -> bool {
        lock(&self.deadline).map_or(false, |deadline| Instant::now() >= deadline)
    }
}
