//! Vendor-agnostic metrics collection via a pluggable sink.
//!
//! The signer and the retry policy report every signing attempt and every
//! retry decision to a process-wide [`MetricsSink`], so consumers can feed
//! Prometheus, OpenTelemetry or anything else without this crate depending on
//! a specific backend.
//!
//! No event carries key material or a derived token.
//!
//! ## Usage
//!
//! ```
//! use docdb_request_core::metrics::{MetricsSink, RetryStats, SigningStats};
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! struct Counter {
//!     retries: AtomicU64,
//! }
//!
//! impl MetricsSink for Counter {
//!     fn on_signing(&self, _stats: &SigningStats) {}
//!
//!     fn on_retry_decision(&self, stats: &RetryStats) {
//!         if stats.should_retry {
//!             self.retries.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//! }
//!
//! docdb_request_core::metrics::set_sink(Arc::new(Counter { retries: AtomicU64::new(0) }));
//! ```

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::retry::{FailureKind, RetryState};
use crate::types::{AuthorizationTokenType, HttpVerb};

/// One token derivation, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct SigningStats {
    pub token_type: AuthorizationTokenType,
    pub verb: HttpVerb,
    pub succeeded: bool,
    /// Time spent deriving (or failing to derive) the token
    pub duration: Duration,
}

/// One evaluation of a failed attempt by a retry policy.
#[derive(Debug, Clone, Serialize)]
pub struct RetryStats {
    pub failure: FailureKind,
    pub http_status: Option<u16>,
    pub should_retry: bool,
    pub backoff: Duration,
    /// True when the decision moved the operation to another endpoint
    pub failed_over: bool,
    /// Failed attempts seen by the policy so far, this one included
    pub attempt_count: u32,
    pub cumulative_backoff: Duration,
    /// State the policy settled in after the decision
    pub state: RetryState,
}

/// Trait for consuming signing and retry metrics.
///
/// Implementations must be thread-safe and should not block; they are called
/// synchronously on the request path.
pub trait MetricsSink: Send + Sync {
    fn on_signing(&self, stats: &SigningStats);

    fn on_retry_decision(&self, stats: &RetryStats);

    /// Called when an operation stops retrying because its backoff budget is
    /// spent. Default: no-op.
    fn on_budget_exceeded(&self, _attempts: u32, _cumulative_backoff: Duration) {}
}

static SINK: OnceLock<Arc<dyn MetricsSink>> = OnceLock::new();

/// The installed sink, if any. Events recorded before `set_sink` are dropped.
fn sink() -> Option<&'static Arc<dyn MetricsSink>> {
    SINK.get()
}

/// Set the global metrics sink.
///
/// Call once at startup. Events recorded before the sink is set are dropped;
/// later calls are ignored with a warning.
pub fn set_sink(sink: Arc<dyn MetricsSink>) {
    if SINK.set(sink).is_err() {
        warn!(
            "Metrics sink was already initialized. Ignoring subsequent set_sink call. Set the sink before the first request."
        );
    }
}

pub(crate) fn record_signing(
    token_type: AuthorizationTokenType,
    verb: HttpVerb,
    succeeded: bool,
    duration: Duration,
) {
    if let Some(sink) = sink() {
        sink.on_signing(&SigningStats {
            token_type,
            verb,
            succeeded,
            duration,
        });
    }
}

pub(crate) fn record_retry_decision(stats: RetryStats) {
    if let Some(sink) = sink() {
        sink.on_retry_decision(&stats);
    }
}

pub(crate) fn record_budget_exceeded(attempts: u32, cumulative_backoff: Duration) {
    if let Some(sink) = sink() {
        sink.on_budget_exceeded(attempts, cumulative_backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry_stats() -> RetryStats {
        RetryStats {
            failure: FailureKind::Throttled,
            http_status: Some(429),
            should_retry: true,
            backoff: Duration::from_millis(200),
            failed_over: false,
            attempt_count: 1,
            cumulative_backoff: Duration::from_millis(200),
            state: RetryState::Retrying,
        }
    }

    #[test]
    fn test_signing_stats_serialization() {
        let stats = SigningStats {
            token_type: AuthorizationTokenType::PrimaryMasterKey,
            verb: HttpVerb::Get,
            succeeded: true,
            duration: Duration::from_micros(42),
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["token_type"], "PrimaryMasterKey");
        assert_eq!(json["succeeded"], true);
    }

    #[test]
    fn test_retry_stats_serialization() {
        let json = serde_json::to_value(retry_stats()).unwrap();
        assert_eq!(json["failure"], "Throttled");
        assert_eq!(json["state"], "Retrying");
        assert_eq!(json["http_status"], 429);
    }
}
