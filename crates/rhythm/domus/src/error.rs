use rhythm_types::{ErrorCode, ErrorReport, PostId, StreamRef, ValidationError};
use serde_json::json;
use thiserror::Error;

/// Fine-grained failures of a post source.
///
/// The codes are Domus-internal; the Filter folds them into `SortRequest_*`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PostSourceError {
    #[error("stream {0} not found")]
    StreamNotFound(StreamRef),

    #[error("stream {0} exists but not at that version")]
    StreamVersionNotFound(StreamRef),

    #[error("stream {0} is private")]
    StreamPrivate(StreamRef),

    #[error("stream {0} is under moderation")]
    StreamModeration(StreamRef),

    #[error("user {0} is under moderation")]
    UserModeration(String),

    #[error("post {0} is private")]
    PostPrivate(PostId),

    #[error("post {0} not found")]
    PostNotFound(PostId),

    #[error("post source unavailable: {0}")]
    Unavailable(String),
}

impl PostSourceError {
    pub fn code(&self) -> &'static str {
        match self {
            PostSourceError::StreamNotFound(_) => "stream_not_found",
            PostSourceError::StreamVersionNotFound(_) => "stream_version_not_found",
            PostSourceError::StreamPrivate(_) => "stream_private",
            PostSourceError::StreamModeration(_) => "stream_moderation",
            PostSourceError::UserModeration(_) => "user_moderation",
            PostSourceError::PostPrivate(_) => "post_private",
            PostSourceError::PostNotFound(_) => "post_not_found",
            PostSourceError::Unavailable(_) => "post_source_unavailable",
        }
    }
}

/// Errors raised on the trusted side while serving the sandbox.
#[derive(Debug, Error)]
pub enum DomusError {
    #[error(transparent)]
    PostSource(#[from] PostSourceError),

    #[error("no sort session is active")]
    NoActiveSession,

    #[error("malformed {message_type} payload: {reason}")]
    BadPayload {
        message_type: &'static str,
        reason: String,
    },

    #[error("url {0} is not in the allowed list")]
    UrlNotAllowed(String),

    #[error("no data for {0}")]
    MiscDataNotFound(String),

    #[error("fetching {url} failed: {reason}")]
    MiscDataFetch { url: String, reason: String },

    #[error("session store failure: {0}")]
    Store(String),

    #[error("take source failure: {0}")]
    Takes(String),

    #[error("invalid kindred rows: {0}")]
    Kindred(#[from] ValidationError),

    #[error("{0} is not served by the Domus domain")]
    Unsupported(String),
}

impl From<reqwest::Error> for DomusError {
    fn from(err: reqwest::Error) -> Self {
        DomusError::MiscDataFetch {
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            reason: err.to_string(),
        }
    }
}

impl DomusError {
    /// Boundary form of this error.
    pub fn into_report(self) -> ErrorReport {
        let message = self.to_string();
        match self {
            DomusError::PostSource(err) => {
                ErrorReport::raw(err.code(), json!({ "message": message }))
            }
            DomusError::Kindred(_) => ErrorReport::with_message(ErrorCode::KindredInvalid, message),
            DomusError::NoActiveSession => ErrorReport::raw("domus_no_session", json!({ "message": message })),
            DomusError::BadPayload { .. } => {
                ErrorReport::raw("domus_bad_payload", json!({ "message": message }))
            }
            DomusError::UrlNotAllowed(url) => {
                ErrorReport::raw("domus_url_not_allowed", json!({ "message": message, "url": url }))
            }
            DomusError::MiscDataNotFound(url) | DomusError::MiscDataFetch { url, .. } => {
                ErrorReport::raw("domus_misc_data", json!({ "message": message, "url": url }))
            }
            DomusError::Store(_) => ErrorReport::raw("domus_store", json!({ "message": message })),
            DomusError::Takes(_) => ErrorReport::raw("domus_takes", json!({ "message": message })),
            DomusError::Unsupported(_) => {
                ErrorReport::raw("domus_unsupported", json!({ "message": message }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhythm_types::translate_post_source_code;

    #[test]
    fn post_source_codes_translate_on_the_filter_side() {
        let stream = StreamRef::new("cobalt.example", "ada", "general", "2");
        let cases = [
            (PostSourceError::StreamNotFound(stream.clone()), ErrorCode::SortRequestStream),
            (PostSourceError::StreamVersionNotFound(stream.clone()), ErrorCode::SortRequestStream),
            (PostSourceError::StreamPrivate(stream.clone()), ErrorCode::SortRequestPrivate),
            (PostSourceError::PostPrivate(4), ErrorCode::SortRequestPrivate),
            (PostSourceError::StreamModeration(stream), ErrorCode::SortRequestModeration),
            (PostSourceError::UserModeration("x/y".into()), ErrorCode::SortRequestModeration),
            (PostSourceError::PostNotFound(9), ErrorCode::SortRequestPosts),
        ];
        for (err, expected) in cases {
            let report = DomusError::from(err).into_report();
            assert_eq!(translate_post_source_code(&report.code), expected, "{}", report.code);
        }
    }

    #[test]
    fn kindred_errors_use_the_filter_code() {
        let report = DomusError::from(ValidationError::Malformed("dup".into())).into_report();
        assert!(report.is(ErrorCode::KindredInvalid));
    }
}
