use ledger_core::{LedgerError, TransactionStream};
use retry_utils::{DescribeError, ErrorShape};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Upstream unavailable (HTTP {status}): {body}")]
    UpstreamUnavailable { status: u16, body: String },

    #[error("API error: {message}")]
    ApiError { message: String },

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication failed")]
    AuthError,
}

impl ExplorerError {
    /// Collapse into the workspace error, tagging the stream that failed.
    /// Rejected credentials become non-retryable.
    pub fn into_ledger_error(self, stream: TransactionStream) -> LedgerError {
        let message = retry_utils::describe_error(&self);
        match self {
            ExplorerError::AuthError => LedgerError::UpstreamRejected { stream, message },
            _ => LedgerError::UpstreamUnavailable { stream, message },
        }
    }
}

impl DescribeError for ExplorerError {
    fn detail(&self, shape: ErrorShape) -> Option<String> {
        match (self, shape) {
            (ExplorerError::ApiError { message }, ErrorShape::ResponseMessage) => Some(message.clone()),
            (ExplorerError::UpstreamUnavailable { body, .. }, ErrorShape::ResponseBody) => Some(body.clone()),
            (ExplorerError::UpstreamUnavailable { status, .. }, ErrorShape::StatusText) => {
                Some(format!("HTTP {}", status))
            }
            (ExplorerError::HttpError(e), ErrorShape::Cause) => Some(e.to_string()),
            (_, ErrorShape::Message) => Some(self.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_is_not_retryable() {
        let err = ExplorerError::AuthError.into_ledger_error(TransactionStream::TokenTransfer);
        assert!(matches!(err, LedgerError::UpstreamRejected { stream: TransactionStream::TokenTransfer, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rate_limit_and_server_errors_stay_retryable() {
        for err in [
            ExplorerError::RateLimit,
            ExplorerError::UpstreamUnavailable { status: 502, body: "bad gateway".to_string() },
        ] {
            assert!(err.into_ledger_error(TransactionStream::Normal).is_retryable());
        }
    }
}
