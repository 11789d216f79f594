use rhythm_types::{ErrorCode, ErrorReport, PostId};
use serde_json::json;
use thiserror::Error;

/// Rhythm hook being executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hook {
    Init,
    Main,
    Finalize,
}

impl Hook {
    pub fn name(&self) -> &'static str {
        match self {
            Hook::Init => "init",
            Hook::Main => "main",
            Hook::Finalize => "finalize",
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            Hook::Init => ErrorCode::RhythmInit,
            Hook::Main => ErrorCode::RhythmMain,
            Hook::Finalize => ErrorCode::RhythmFinal,
        }
    }
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised while loading or running a Rhythm.
#[derive(Debug, Clone, Error)]
pub enum SandboxError {
    #[error("rhythm source failed to evaluate: {0}")]
    Eval(String),

    #[error("rhythm does not define main(post)")]
    MainMissing,

    #[error("{hook} raised: {message}")]
    Hook { hook: Hook, message: String },

    #[error("{hook} exceeded its time budget")]
    Timeout { hook: Hook },

    #[error("{hook} returned an unusable value: {message}")]
    InvalidReturn { hook: Hook, message: String },

    #[error("capability error: {0}")]
    Capability(ErrorReport),
}

impl SandboxError {
    /// Boundary form. `post_id` is attached for failures inside `main`.
    pub fn into_report(self, post_id: Option<PostId>) -> ErrorReport {
        match self {
            SandboxError::Eval(message) => {
                ErrorReport::with_message(ErrorCode::RhythmEvalException, message)
            }
            SandboxError::MainMissing => ErrorReport::with_message(
                ErrorCode::MainMissing,
                "rhythm does not define main(post)",
            ),
            SandboxError::Hook { hook, message } | SandboxError::InvalidReturn { hook, message } => {
                ErrorReport::new(
                    hook.code(),
                    json!({ "message": message, "hook": hook.name(), "post_id": post_id }),
                )
            }
            SandboxError::Timeout { hook } => ErrorReport::new(
                ErrorCode::RhythmTimeout,
                json!({ "hook": hook.name(), "post_id": post_id }),
            ),
            SandboxError::Capability(report) => report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_failures_map_to_phase_codes() {
        let report = SandboxError::Hook {
            hook: Hook::Main,
            message: "boom".into(),
        }
        .into_report(Some(2));
        assert!(report.is(ErrorCode::RhythmMain));
        assert_eq!(report.data["post_id"], 2);
        assert_eq!(report.message(), Some("boom"));

        let report = SandboxError::InvalidReturn {
            hook: Hook::Finalize,
            message: "not an array".into(),
        }
        .into_report(None);
        assert!(report.is(ErrorCode::RhythmFinal));
    }

    #[test]
    fn capability_reports_pass_through() {
        let inner = ErrorReport::with_message(ErrorCode::SetSortValueInvalid, "NaN");
        let report = SandboxError::Capability(inner.clone()).into_report(Some(1));
        assert_eq!(report, inner);
    }
}
