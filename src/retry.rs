//! Retry policy state machine.
//!
//! # States
//! ```text
//! Idle --on_failure--> Evaluating --> Retrying --begin_attempt--> Idle
//!                                 \-> Exhausted   (limits reached, final)
//!                                 \-> Terminal    (non-retriable, final)
//! any non-final state --cancel--> Cancelled       (final)
//! ```
//!
//! # Precedence
//! A failure is matched against the rules in a fixed order, first match wins:
//! non-retriable, session consistency, endpoint failover, throttling. A status
//! listed in `RetryOptions::non_retriable_statuses` is treated as
//! non-retriable whatever its failure kind.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::{debug, info, warn};

use crate::error::RequestError;
use crate::metrics::{self, RetryStats};
use crate::types::{Endpoint, RetryDecision};

#[cfg(test)]
mod tests;

/// Sub-status sent with a 404 when the replica has not caught up with the
/// caller's session token.
pub const SUB_STATUS_READ_SESSION_NOT_AVAILABLE: u32 = 1002;
/// Sub-status sent with a 403 when the region no longer accepts writes.
pub const SUB_STATUS_WRITE_FORBIDDEN: u32 = 3;
/// Sub-status sent with a 403 when the regional account is gone.
pub const SUB_STATUS_DATABASE_ACCOUNT_NOT_FOUND: u32 = 1008;

/// Closed set of failure signals the policy acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum FailureKind {
    /// Rate-limited by the service.
    Throttled,
    /// The endpoint could not serve the request (network, region outage).
    EndpointUnavailable,
    /// Stale read against the selected replica.
    SessionStale,
    /// Authorization rejected, malformed request, not found, conflict...
    NonRetriable,
}

impl FailureKind {
    /// Map a service response to a failure kind.
    pub fn classify(status: u16, sub_status: Option<u32>) -> Self {
        match (status, sub_status) {
            (429, _) => FailureKind::Throttled,
            (404, Some(SUB_STATUS_READ_SESSION_NOT_AVAILABLE)) => FailureKind::SessionStale,
            (403, Some(SUB_STATUS_WRITE_FORBIDDEN | SUB_STATUS_DATABASE_ACCOUNT_NOT_FOUND)) => {
                FailureKind::EndpointUnavailable
            }
            (410 | 503, _) => FailureKind::EndpointUnavailable,
            _ => FailureKind::NonRetriable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum RetryState {
    Idle,
    Evaluating,
    Retrying,
    Exhausted,
    Terminal,
    Cancelled,
}

impl RetryState {
    pub fn is_final(self) -> bool {
        matches!(self, Self::Exhausted | Self::Terminal | Self::Cancelled)
    }
}

/// Per-operation retry limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Throttled attempts that may be retried.
    pub max_retry_attempts: u32,
    /// First computed throttling backoff, doubled on each further attempt.
    pub initial_backoff: Duration,
    /// Ceiling for a computed throttling backoff. Server hints are not capped.
    pub max_retry_backoff: Duration,
    /// Ceiling for the sum of all backoffs handed out to one operation.
    pub retry_budget: Duration,
    /// Immediate retries allowed for stale session reads.
    pub max_session_retries: u32,
    /// Wait before trying the next endpoint after an endpoint failure.
    pub endpoint_failover_backoff: Duration,
    /// Statuses never retried, whatever their failure kind.
    pub non_retriable_statuses: Vec<u16>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        RetryOptions {
            max_retry_attempts: 9,
            initial_backoff: Duration::from_millis(100),
            max_retry_backoff: Duration::from_secs(5),
            retry_budget: Duration::from_secs(30),
            max_session_retries: 2,
            endpoint_failover_backoff: Duration::ZERO,
            non_retriable_statuses: Vec::new(),
        }
    }
}

impl RetryOptions {
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_max_retry_backoff(mut self, backoff: Duration) -> Self {
        self.max_retry_backoff = backoff;
        self
    }

    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn with_max_session_retries(mut self, retries: u32) -> Self {
        self.max_session_retries = retries;
        self
    }

    pub fn with_endpoint_failover_backoff(mut self, backoff: Duration) -> Self {
        self.endpoint_failover_backoff = backoff;
        self
    }

    pub fn with_non_retriable_status(mut self, status: u16) -> Self {
        self.non_retriable_statuses.push(status);
        self
    }
}

enum Outcome {
    Retry(RetryDecision),
    Exhausted,
    Terminal,
    BudgetExceeded,
}

/// Retry state for exactly one logical operation.
///
/// Obtained from [`RetryPolicyFactory::get_request_policy`] when the
/// operation starts and dropped when it ends. Not `Clone`: state must never
/// be shared between operations.
#[derive(Debug)]
pub struct RetryPolicy {
    options: Arc<RetryOptions>,
    endpoints: Arc<[Endpoint]>,
    state: RetryState,
    attempt_count: u32,
    throttle_attempts: u32,
    session_attempts: u32,
    cumulative_backoff: Duration,
    last_failure: Option<FailureKind>,
    endpoint_cursor: usize,
}

impl RetryPolicy {
    fn new(options: Arc<RetryOptions>, endpoints: Arc<[Endpoint]>) -> Self {
        RetryPolicy {
            options,
            endpoints,
            state: RetryState::Idle,
            attempt_count: 0,
            throttle_attempts: 0,
            session_attempts: 0,
            cumulative_backoff: Duration::ZERO,
            last_failure: None,
            endpoint_cursor: 0,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Failed attempts evaluated so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn cumulative_backoff(&self) -> Duration {
        self.cumulative_backoff
    }

    pub fn last_failure(&self) -> Option<FailureKind> {
        self.last_failure
    }

    /// Endpoint the next attempt should target, `None` without an endpoint list.
    pub fn current_endpoint(&self) -> Option<&Endpoint> {
        self.endpoints.get(self.endpoint_cursor)
    }

    /// Move from `Retrying` back to `Idle` before the next attempt.
    ///
    /// Returns false once the policy is final; no further attempt may start.
    pub fn begin_attempt(&mut self) -> bool {
        match self.state {
            RetryState::Idle => true,
            RetryState::Retrying | RetryState::Evaluating => {
                self.state = RetryState::Idle;
                true
            }
            RetryState::Exhausted | RetryState::Terminal | RetryState::Cancelled => false,
        }
    }

    /// Abandon the operation. No counter or budget changes.
    pub fn cancel(&mut self) {
        if !self.state.is_final() {
            debug!(
                event = "Retry",
                phase = "Cancelled",
                attempts = self.attempt_count
            );
            self.state = RetryState::Cancelled;
        }
    }

    /// Evaluate a failed attempt.
    ///
    /// Returns the decision for the next attempt. Once the policy is final,
    /// every call returns a stop decision. Fails with `RetryBudgetExceeded`
    /// when the next backoff would push the cumulative backoff past the
    /// configured budget.
    pub fn on_failure(
        &mut self,
        failure: FailureKind,
        http_status: Option<u16>,
        retry_after_hint: Option<Duration>,
    ) -> Result<RetryDecision, RequestError> {
        if self.state.is_final() {
            debug!(
                event = "Retry",
                phase = "Ignored",
                state = %self.state,
                failure = %failure
            );
            return Ok(RetryDecision::stop());
        }

        self.state = RetryState::Evaluating;
        self.attempt_count += 1;
        self.last_failure = Some(failure);

        let outcome = self.evaluate(failure, http_status, retry_after_hint);
        let result = match outcome {
            Outcome::Retry(decision) => {
                self.state = RetryState::Retrying;
                Ok(decision)
            }
            Outcome::Exhausted => {
                self.state = RetryState::Exhausted;
                warn!(
                    event = "Retry",
                    phase = "Exhausted",
                    failure = %failure,
                    attempts = self.attempt_count
                );
                Ok(RetryDecision::stop())
            }
            Outcome::Terminal => {
                self.state = RetryState::Terminal;
                debug!(
                    event = "Retry",
                    phase = "Terminal",
                    failure = %failure,
                    status = ?http_status
                );
                Ok(RetryDecision::stop())
            }
            Outcome::BudgetExceeded => {
                self.state = RetryState::Exhausted;
                warn!(
                    event = "Retry",
                    phase = "BudgetExceeded",
                    attempts = self.attempt_count,
                    cumulative_backoff_ms = self.cumulative_backoff.as_millis() as u64
                );
                metrics::record_budget_exceeded(self.attempt_count, self.cumulative_backoff);
                Err(RequestError::RetryBudgetExceeded {
                    attempts: self.attempt_count,
                    cumulative_backoff: self.cumulative_backoff,
                })
            }
        };

        let decision = result.as_ref().ok();
        metrics::record_retry_decision(RetryStats {
            failure,
            http_status,
            should_retry: decision.is_some_and(|d| d.should_retry),
            backoff: decision.map(|d| d.backoff).unwrap_or_default(),
            failed_over: decision.is_some_and(|d| d.target_endpoint.is_some()),
            attempt_count: self.attempt_count,
            cumulative_backoff: self.cumulative_backoff,
            state: self.state,
        });

        result
    }

    fn evaluate(
        &mut self,
        failure: FailureKind,
        http_status: Option<u16>,
        retry_after_hint: Option<Duration>,
    ) -> Outcome {
        let configured_terminal = http_status
            .is_some_and(|status| self.options.non_retriable_statuses.contains(&status));
        if configured_terminal {
            return Outcome::Terminal;
        }

        match failure {
            FailureKind::NonRetriable => Outcome::Terminal,
            FailureKind::SessionStale => {
                if self.session_attempts >= self.options.max_session_retries {
                    return Outcome::Exhausted;
                }
                self.session_attempts += 1;
                self.schedule(RetryDecision::retry_after(Duration::ZERO))
            }
            FailureKind::EndpointUnavailable => {
                let next = self.endpoint_cursor + 1;
                let Some(endpoint) = self.endpoints.get(next).cloned() else {
                    return Outcome::Exhausted;
                };
                self.endpoint_cursor = next;
                info!(
                    event = "Retry",
                    phase = "Failover",
                    endpoint = %endpoint,
                    attempts = self.attempt_count
                );
                self.schedule(RetryDecision::fail_over(
                    endpoint,
                    self.options.endpoint_failover_backoff,
                ))
            }
            FailureKind::Throttled => {
                if self.throttle_attempts >= self.options.max_retry_attempts {
                    return Outcome::Exhausted;
                }
                self.throttle_attempts += 1;
                let backoff = retry_after_hint
                    .unwrap_or_else(|| self.computed_backoff(self.throttle_attempts));
                self.schedule(RetryDecision::retry_after(backoff))
            }
        }
    }

    /// Charge the decision's backoff against the budget.
    fn schedule(&mut self, decision: RetryDecision) -> Outcome {
        let total = self.cumulative_backoff.saturating_add(decision.backoff);
        if total > self.options.retry_budget {
            return Outcome::BudgetExceeded;
        }
        self.cumulative_backoff = total;
        debug!(
            event = "Retry",
            phase = "Scheduled",
            decision = %decision,
            cumulative_backoff_ms = total.as_millis() as u64
        );
        Outcome::Retry(decision)
    }

    /// `initial_backoff * 2^(attempt - 1)`, capped at `max_retry_backoff`.
    fn computed_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.options
            .initial_backoff
            .saturating_mul(factor)
            .min(self.options.max_retry_backoff)
    }
}

/// Hands out a fresh [`RetryPolicy`] per logical operation.
///
/// Cheap to clone; clones share the immutable options and endpoint list but
/// never policy state.
#[derive(Debug, Clone)]
pub struct RetryPolicyFactory {
    options: Arc<RetryOptions>,
    endpoints: Arc<[Endpoint]>,
}

impl RetryPolicyFactory {
    /// `endpoints` is ranked; the first entry is where operations start.
    pub fn new(options: RetryOptions, endpoints: Vec<Endpoint>) -> Self {
        RetryPolicyFactory {
            options: Arc::new(options),
            endpoints: endpoints.into(),
        }
    }

    /// A new policy in `Idle`. Call once per operation, not once per attempt.
    pub fn get_request_policy(&self) -> RetryPolicy {
        RetryPolicy::new(Arc::clone(&self.options), Arc::clone(&self.endpoints))
    }

    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}
