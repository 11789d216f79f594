//! Error taxonomy shared across the boundary.
//!
//! Errors never cross between domains as native Rust errors. They travel as an
//! [`ErrorReport`]: a stable string code plus a JSON data object.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Every code the engine itself can report.
///
/// Data-source codes coming from the Domus side are translated into the
/// `SortRequest*` variants by [`translate_post_source_code`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Transport
    TransportTimeout,
    TransportHandshakeTimeout,
    TransportClosed,

    // Validation
    RunRhythmInvalid,
    KindredInvalid,

    // Sandbox execution
    RhythmEvalException,
    MainMissing,
    RhythmInit,
    RhythmMain,
    RhythmFinal,
    RhythmTimeout,
    KindredTimeout,
    Busy,
    Internal,

    // Data source
    SortRequestStream,
    SortRequestPrivate,
    SortRequestModeration,
    SortRequestPosts,

    // Capability misuse and failures
    SetSortValueInvalid,
    SetSortOutOfPhase,
    SetPostQuantityValueInvalid,
    SetTimeWindowValueInvalid,
    SetSearchValueInvalid,
    SetWithContentValueInvalid,
    FetchTakesValueInvalid,
    FetchTakesFailed,
    FetchUserTakesValueInvalid,
    FetchUserTakesFailed,
    GetMiscDataValueInvalid,
    GetMiscDataFailed,
    StoreDataValueInvalid,
    StoreDataFailed,
    GetStoredDataFailed,
}

impl ErrorCode {
    /// Stable wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TransportTimeout => "transport_timeout",
            ErrorCode::TransportHandshakeTimeout => "transport_handshake_timeout",
            ErrorCode::TransportClosed => "transport_closed",
            ErrorCode::RunRhythmInvalid => "filter_run_rhythm_invalid",
            ErrorCode::KindredInvalid => "filter_kindred_invalid",
            ErrorCode::RhythmEvalException => "filter_rhythm_eval_exception",
            ErrorCode::MainMissing => "filter_main_missing",
            ErrorCode::RhythmInit => "filter_rhythm_init",
            ErrorCode::RhythmMain => "filter_rhythm_main",
            ErrorCode::RhythmFinal => "filter_rhythm_final",
            ErrorCode::RhythmTimeout => "filter_rhythm_timeout",
            ErrorCode::KindredTimeout => "filter_kindred_timeout",
            ErrorCode::Busy => "filter_busy",
            ErrorCode::Internal => "filter_internal",
            ErrorCode::SortRequestStream => "SortRequest_stream",
            ErrorCode::SortRequestPrivate => "SortRequest_private",
            ErrorCode::SortRequestModeration => "SortRequest_moderation",
            ErrorCode::SortRequestPosts => "SortRequest_posts",
            ErrorCode::SetSortValueInvalid => "filter_set_sort_value_invalid",
            ErrorCode::SetSortOutOfPhase => "filter_set_sort_out_of_phase",
            ErrorCode::SetPostQuantityValueInvalid => "filter_set_post_quantity_value_invalid",
            ErrorCode::SetTimeWindowValueInvalid => "filter_set_time_window_value_invalid",
            ErrorCode::SetSearchValueInvalid => "filter_set_search_value_invalid",
            ErrorCode::SetWithContentValueInvalid => "filter_set_with_content_value_invalid",
            ErrorCode::FetchTakesValueInvalid => "filter_fetch_takes_value_invalid",
            ErrorCode::FetchTakesFailed => "filter_fetch_takes_failed",
            ErrorCode::FetchUserTakesValueInvalid => "filter_fetch_user_takes_value_invalid",
            ErrorCode::FetchUserTakesFailed => "filter_fetch_user_takes_failed",
            ErrorCode::GetMiscDataValueInvalid => "filter_get_misc_data_value_invalid",
            ErrorCode::GetMiscDataFailed => "filter_get_misc_data_failed",
            ErrorCode::StoreDataValueInvalid => "filter_store_data_value_invalid",
            ErrorCode::StoreDataFailed => "filter_store_data_failed",
            ErrorCode::GetStoredDataFailed => "filter_get_stored_data_failed",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error as it travels between domains.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: String,
    #[serde(default)]
    pub data: Value,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, data: Value) -> Self {
        Self {
            code: code.as_str().to_string(),
            data,
        }
    }

    /// Report carrying only a human-readable message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, json!({ "message": message.into() }))
    }

    /// Report with a code that is not one of ours, e.g. a Domus data-source code.
    pub fn raw(code: impl Into<String>, data: Value) -> Self {
        Self {
            code: code.into(),
            data,
        }
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code.as_str()
    }

    pub fn message(&self) -> Option<&str> {
        self.data.get("message").and_then(Value::as_str)
    }
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for ErrorReport {}

/// Collapse a fine-grained post-source code into the request-facing set.
pub fn translate_post_source_code(code: &str) -> ErrorCode {
    match code {
        "stream_not_found"
        | "stream_version_not_found"
        | "stream_invalid"
        | "stream_owner_not_found" => ErrorCode::SortRequestStream,
        "stream_private" | "post_private" | "user_private" => ErrorCode::SortRequestPrivate,
        "ring_moderation" | "user_moderation" | "stream_moderation" => {
            ErrorCode::SortRequestModeration
        }
        _ => ErrorCode::SortRequestPosts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_use_the_filter_namespace() {
        assert_eq!(ErrorCode::RhythmMain.as_str(), "filter_rhythm_main");
        assert_eq!(
            ErrorCode::RhythmEvalException.to_string(),
            "filter_rhythm_eval_exception"
        );
    }

    #[test]
    fn translation_collapses_source_codes() {
        assert_eq!(
            translate_post_source_code("stream_version_not_found"),
            ErrorCode::SortRequestStream
        );
        assert_eq!(
            translate_post_source_code("post_private"),
            ErrorCode::SortRequestPrivate
        );
        assert_eq!(
            translate_post_source_code("ring_moderation"),
            ErrorCode::SortRequestModeration
        );
        assert_eq!(
            translate_post_source_code("disk_on_fire"),
            ErrorCode::SortRequestPosts
        );
    }

    #[test]
    fn report_display_includes_message() {
        let report = ErrorReport::with_message(ErrorCode::RhythmInit, "boom");
        assert_eq!(report.to_string(), "filter_rhythm_init: boom");
        assert!(report.is(ErrorCode::RhythmInit));
    }
}
