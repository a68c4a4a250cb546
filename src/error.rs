use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid resource link: {0}")]
    InvalidResourceLink(String),

    #[error("resource link does not match the operation: {0}")]
    AddressMismatch(String),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("resource token for '{scope}' has expired")]
    ExpiredResourceToken { scope: String },

    #[error("no resource token covers '{0}'")]
    ScopeMismatch(String),

    #[error("missing required header: {0}")]
    MissingHeader(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("request throttled after {attempts} attempts")]
    Throttled { attempts: u32 },

    #[error("no endpoint available after {attempts} attempts")]
    EndpointUnavailable { attempts: u32 },

    #[error("session not available on the selected replica after {attempts} attempts")]
    SessionStale { attempts: u32 },

    #[error(
        "retry budget exceeded after {attempts} attempts ({cumulative_backoff:?} spent in backoff)"
    )]
    RetryBudgetExceeded {
        attempts: u32,
        cumulative_backoff: Duration,
    },

    #[error("service rejected the request with status {status} (sub-status {sub_status:?})")]
    Service { status: u16, sub_status: Option<u32> },

    #[error("operation was cancelled")]
    Cancelled,
}

impl RequestError {
    /// Whether this error is one the retry policy may act on.
    ///
    /// Resolution and signing errors are never retriable, the request itself
    /// is malformed or unauthorized.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            RequestError::Throttled { .. }
                | RequestError::EndpointUnavailable { .. }
                | RequestError::SessionStale { .. }
        )
    }

    /// Whether this error was raised while resolving or signing a request.
    pub fn is_authorization_error(&self) -> bool {
        matches!(
            self,
            RequestError::InvalidCredential(_)
                | RequestError::ExpiredResourceToken { .. }
                | RequestError::ScopeMismatch(_)
                | RequestError::MissingHeader(_)
        )
    }
}

impl From<url::ParseError> for RequestError {
    fn from(err: url::ParseError) -> Self {
        RequestError::InvalidEndpoint(err.to_string())
    }
}

impl From<base64::DecodeError> for RequestError {
    fn from(err: base64::DecodeError) -> Self {
        RequestError::InvalidCredential(format!("key is not valid base64: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        throttled = { RequestError::Throttled { attempts: 3 }, true },
        endpoint = { RequestError::EndpointUnavailable { attempts: 2 }, true },
        session = { RequestError::SessionStale { attempts: 1 }, true },
        link = { RequestError::InvalidResourceLink("dbs//x".to_string()), false },
        mismatch = { RequestError::AddressMismatch("feed".to_string()), false },
        credential = { RequestError::InvalidCredential("read-only".to_string()), false },
        budget = { RequestError::RetryBudgetExceeded { attempts: 4, cumulative_backoff: Duration::from_secs(1) }, false },
        cancelled = { RequestError::Cancelled, false },
    )]
    fn test_is_retriable(err: RequestError, expected: bool) {
        assert_eq!(err.is_retriable(), expected);
    }

    #[test]
    fn test_budget_error_message_carries_diagnostics() {
        let err = RequestError::RetryBudgetExceeded {
            attempts: 7,
            cumulative_backoff: Duration::from_millis(1500),
        };
        let msg = err.to_string();
        assert!(msg.contains("7 attempts"));
        assert!(msg.contains("1.5s"));
    }

    #[test]
    fn test_authorization_errors() {
        assert!(RequestError::ScopeMismatch("dbs/a".to_string()).is_authorization_error());
        assert!(
            RequestError::ExpiredResourceToken {
                scope: "dbs/a".to_string()
            }
            .is_authorization_error()
        );
        assert!(!RequestError::Cancelled.is_authorization_error());
    }

    #[test]
    fn test_url_parse_error_maps_to_invalid_endpoint() {
        let err: RequestError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, RequestError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_error_serialization() {
        let err = RequestError::Service {
            status: 404,
            sub_status: Some(0),
        };
        let value = serde_json::to_value(&err).unwrap();
        let back: RequestError = serde_json::from_value(value).unwrap();
        assert_eq!(err, back);
    }
}
