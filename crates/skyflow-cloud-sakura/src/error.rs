//! Sakura Cloud provider error types

use skyflow_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SakuraError {
    #[error("usacloud not found. Please install: brew install usacloud")]
    UsacloudNotFound,

    #[error("usacloud rate limited: {0}")]
    RateLimited(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("usacloud authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Conflicting operation: {0}")]
    Conflict(String),

    #[error("usacloud command failed: {0}")]
    CommandFailed(String),

    #[error("Unexpected usacloud output: {0}")]
    UnexpectedOutput(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SakuraError>;

impl From<SakuraError> for CloudError {
    fn from(err: SakuraError) -> Self {
        match err {
            SakuraError::RateLimited(msg) => CloudError::RateLimited(msg),
            SakuraError::NotFound(msg) => CloudError::NotFound(msg),
            SakuraError::AuthenticationFailed(msg) => CloudError::Unauthorized(msg),
            SakuraError::Conflict(msg) => CloudError::Conflict(msg),
            SakuraError::CommandFailed(msg) => CloudError::Network(msg),
            SakuraError::IoError(e) => CloudError::Io(e),
            other => CloudError::Api(other.to_string()),
        }
    }
}

/// Classify a failed usacloud invocation by its stderr
pub fn classify_failure(stderr: &str) -> SakuraError {
    let message = stderr.trim().to_string();
    let lower = message.to_lowercase();

    if has_code(&lower, "429") || lower.contains("too many requests") {
        SakuraError::RateLimited(message)
    } else if has_code(&lower, "404") || lower.contains("not found") {
        SakuraError::NotFound(message)
    } else if has_code(&lower, "401")
        || has_code(&lower, "403")
        || lower.contains("unauthorized")
        || lower.contains("forbidden")
    {
        SakuraError::AuthenticationFailed(message)
    } else if has_code(&lower, "409") || lower.contains("conflict") {
        SakuraError::Conflict(message)
    } else {
        SakuraError::CommandFailed(message)
    }
}

/// Status codes must stand alone; resource IDs often contain the same digits
fn has_code(text: &str, code: &str) -> bool {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        let err = classify_failure("Error: API error: 429 Too Many Requests\n");
        assert!(matches!(err, SakuraError::RateLimited(_)));
        assert!(CloudError::from(err).is_rate_limited());

        let err = classify_failure("too many requests, retry later");
        assert!(matches!(err, SakuraError::RateLimited(_)));
    }

    #[test]
    fn test_classify_not_found() {
        let err = classify_failure("Error: resource 113000000001 not found");
        assert!(CloudError::from(err).is_not_found());

        let err = classify_failure("status code: 404");
        assert!(matches!(err, SakuraError::NotFound(_)));
    }

    #[test]
    fn test_classify_auth_and_conflict() {
        assert!(matches!(
            classify_failure("Error: 401 Unauthorized"),
            SakuraError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            classify_failure("Error: 403"),
            SakuraError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            classify_failure("Error: 409 server is locked by another operation"),
            SakuraError::Conflict(_)
        ));
    }

    #[test]
    fn test_code_inside_id_is_not_a_status() {
        let err = classify_failure("Error: power-on 113404000429 failed: connection reset");
        assert!(matches!(err, SakuraError::CommandFailed(_)));
        assert!(matches!(CloudError::from(err), CloudError::Network(_)));
    }

    #[test]
    fn test_output_errors_are_api_errors() {
        let err = SakuraError::UnexpectedOutput("empty".into());
        assert!(matches!(CloudError::from(err), CloudError::Api(_)));
    }
}
