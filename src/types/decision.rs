//! Retry decisions handed back to the request-execution loop.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::endpoint::Endpoint;

/// What the execution loop should do after a failed attempt.
///
/// `target_endpoint` is only set when the next attempt must go to a
/// different endpoint than the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub backoff: Duration,
    pub target_endpoint: Option<Endpoint>,
}

impl RetryDecision {
    /// Stop retrying; the last failure is surfaced to the caller.
    pub fn stop() -> Self {
        RetryDecision {
            should_retry: false,
            backoff: Duration::ZERO,
            target_endpoint: None,
        }
    }

    /// Retry against the same endpoint after `backoff`.
    pub fn retry_after(backoff: Duration) -> Self {
        RetryDecision {
            should_retry: true,
            backoff,
            target_endpoint: None,
        }
    }

    /// Retry against another endpoint after `backoff`.
    pub fn fail_over(endpoint: Endpoint, backoff: Duration) -> Self {
        RetryDecision {
            should_retry: true,
            backoff,
            target_endpoint: Some(endpoint),
        }
    }
}

impl Display for RetryDecision {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match (&self.should_retry, &self.target_endpoint) {
            (false, _) => write!(f, "Stop"),
            (true, None) => write!(f, "Retry(after={:?})", self.backoff),
            (true, Some(endpoint)) => {
                write!(f, "Retry(after={:?}, endpoint={endpoint})", self.backoff)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn test_stop_display() {
        assert_snapshot!(RetryDecision::stop().to_string(), @"Stop");
    }

    #[test]
    fn test_retry_display() {
        let decision = RetryDecision::retry_after(Duration::from_millis(200));
        assert_snapshot!(decision.to_string(), @"Retry(after=200ms)");
    }

    #[test]
    fn test_fail_over_display() {
        let endpoint = Endpoint::parse("https://east.example.net/").unwrap();
        let decision = RetryDecision::fail_over(endpoint, Duration::ZERO);
        assert_snapshot!(
            decision.to_string(),
            @"Retry(after=0ns, endpoint=https://east.example.net/)"
        );
    }

    #[test]
    fn test_decision_serialization() {
        let endpoint = Endpoint::parse("https://east.example.net/").unwrap();
        let decision = RetryDecision::fail_over(endpoint, Duration::from_millis(5));
        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["should_retry"], true);
        assert_eq!(value["target_endpoint"], "https://east.example.net/");
        let back: RetryDecision = serde_json::from_value(value).unwrap();
        assert_eq!(back, decision);
    }
}
