use std::fmt;

use thiserror::Error;

/// Longest upstream body excerpt carried inside an error. Azure DevOps
/// failure bodies can be multi-kilobyte HTML pages; the excerpt keeps
/// diagnostics readable without dragging the whole body around.
pub const MAX_BODY_EXCERPT_CHARS: usize = 600;

/// Failure taxonomy for every client and aggregator operation.
///
/// `InvalidArgument` is raised before any network call; the other three
/// classify what came back. `Decode` is deliberately distinct from
/// `Upstream`: a non-JSON body on a 200 response indicates a contract
/// mismatch, not a request-level failure.
#[derive(Debug, Error)]
pub enum WikiError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("failed to decode upstream response: {0}")]
    Decode(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl WikiError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn upstream(status: u16, body: &str) -> Self {
        Self::Upstream {
            status,
            body: excerpt(body, MAX_BODY_EXCERPT_CHARS),
        }
    }

    pub fn transport(error: impl fmt::Display) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Bounded prefix of `text`, truncating on a character boundary.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut output: String = text.chars().take(max_chars).collect();
    output.push_str("...");
    output
}

#[cfg(test)]
mod tests {
    use super::{MAX_BODY_EXCERPT_CHARS, WikiError, excerpt};

    #[test]
    fn excerpt_passes_short_text_through() {
        assert_eq!(excerpt("not found", 600), "not found");
    }

    #[test]
    fn excerpt_truncates_on_character_boundaries() {
        let body = "é".repeat(700);
        let bounded = excerpt(&body, MAX_BODY_EXCERPT_CHARS);
        assert_eq!(bounded.chars().count(), MAX_BODY_EXCERPT_CHARS + 3);
        assert!(bounded.ends_with("..."));
    }

    #[test]
    fn upstream_error_carries_status_and_bounded_body() {
        let error = WikiError::upstream(404, &"x".repeat(5_000));
        match &error {
            WikiError::Upstream { status, body } => {
                assert_eq!(*status, 404);
                assert_eq!(body.chars().count(), MAX_BODY_EXCERPT_CHARS + 3);
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
        assert!(error.to_string().contains("HTTP 404"));
    }

    #[test]
    fn invalid_argument_display_names_the_problem() {
        let error = WikiError::invalid_argument("missing wiki identifier");
        assert_eq!(
            error.to_string(),
            "invalid argument: missing wiki identifier"
        );
    }
}
