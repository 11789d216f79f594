use rhythm_sandbox::SandboxError;
use rhythm_transport::TransportError;
use rhythm_types::{
    translate_post_source_code, ErrorCode, ErrorReport, PostId, ValidationError,
};
use serde_json::json;
use thiserror::Error;

/// Errors that end a Rhythm run.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid RunRhythm payload: {0}")]
    InvalidRequest(ValidationError),

    #[error("invalid kindred payload: {0}")]
    InvalidKindred(ValidationError),

    #[error("kindred data did not arrive within {timeout_ms}ms")]
    KindredTimeout { timeout_ms: u64 },

    #[error("a sort is already running")]
    Busy,

    #[error("sandbox error: {source}")]
    Sandbox {
        source: SandboxError,
        post_id: Option<PostId>,
    },

    #[error("post fetch failed: {0}")]
    PostSource(ErrorReport),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{stage} panicked: {message}")]
    Panicked { stage: &'static str, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    pub fn sandbox(source: SandboxError, post_id: Option<PostId>) -> Self {
        RuntimeError::Sandbox { source, post_id }
    }

    /// Classify a failed `GetPosts` round-trip.
    ///
    /// Source-specific codes from the data source are folded into the
    /// request-facing `SortRequest_*` codes, keeping the original report.
    pub fn from_post_fetch(err: TransportError) -> Self {
        match err {
            TransportError::Remote(report) => {
                let code = translate_post_source_code(&report.code);
                RuntimeError::PostSource(ErrorReport::new(
                    code,
                    json!({ "message": report.to_string(), "source": report }),
                ))
            }
            other => RuntimeError::Transport(other),
        }
    }

    /// Boundary form of this error.
    pub fn into_report(self) -> ErrorReport {
        match self {
            RuntimeError::InvalidRequest(err) => {
                ErrorReport::with_message(ErrorCode::RunRhythmInvalid, err.to_string())
            }
            RuntimeError::InvalidKindred(err) => {
                ErrorReport::with_message(ErrorCode::KindredInvalid, err.to_string())
            }
            RuntimeError::KindredTimeout { timeout_ms } => ErrorReport::new(
                ErrorCode::KindredTimeout,
                json!({ "timeout_ms": timeout_ms }),
            ),
            RuntimeError::Busy => {
                ErrorReport::with_message(ErrorCode::Busy, "a sort is already running")
            }
            RuntimeError::Sandbox { source, post_id } => source.into_report(post_id),
            RuntimeError::PostSource(report) => report,
            RuntimeError::Transport(err) => err.into_report(),
            RuntimeError::Panicked { stage, message } => ErrorReport::new(
                ErrorCode::Internal,
                json!({ "message": message, "stage": stage }),
            ),
            RuntimeError::Internal(message) => {
                ErrorReport::with_message(ErrorCode::Internal, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_source_codes_are_translated() {
        let remote = ErrorReport::raw("stream_private", json!({ "message": "hidden" }));
        let report = RuntimeError::from_post_fetch(TransportError::Remote(remote)).into_report();
        assert_eq!(report.code, "SortRequest_private");
        assert_eq!(report.data["source"]["code"], "stream_private");

        let report = RuntimeError::from_post_fetch(TransportError::Remote(ErrorReport::raw(
            "disk_on_fire",
            json!({}),
        )))
        .into_report();
        assert_eq!(report.code, "SortRequest_posts");
    }

    #[test]
    fn transport_failures_keep_transport_codes() {
        let report = RuntimeError::from_post_fetch(TransportError::Closed).into_report();
        assert!(report.is(ErrorCode::TransportClosed));
    }

    #[test]
    fn validation_errors_report_before_anything_runs() {
        let report =
            RuntimeError::InvalidRequest(ValidationError::MissingField("rhythm")).into_report();
        assert!(report.is(ErrorCode::RunRhythmInvalid));
        assert!(report.message().unwrap().contains("rhythm"));
    }
}
