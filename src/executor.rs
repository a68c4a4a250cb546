//! Reference driver tying resolution, signing and retry together.
//!
//! The executor owns no I/O: every attempt is handed to a [`Transport`], every
//! backoff to a [`Sleeper`], and every request date comes from a [`Clock`].
//! One [`RetryPolicy`](crate::RetryPolicy) is obtained per call to
//! [`RequestExecutor::execute`] and dropped when it returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::auth::{
    AUTHORIZATION_HEADER, AuthorizationTokenProvider, TokenProperties, X_MS_DATE_HEADER,
    format_request_date,
};
use crate::error::RequestError;
use crate::resolver::ResourceAddressResolver;
use crate::retry::{FailureKind, RetryPolicy, RetryPolicyFactory, RetryState};
use crate::traits::{Clock, Sleeper, SystemClock, ThreadSleeper, Transport};
use crate::types::{AuthorizationTokenType, Endpoint, HttpVerb, PathInfo, ResourceType};

/// A logical operation as the caller describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub link: String,
    pub resource_type: ResourceType,
    pub is_feed: bool,
    pub verb: HttpVerb,
    pub headers: HashMap<String, String>,
    pub token_type: AuthorizationTokenType,
}

impl OperationRequest {
    /// An operation on a single item, e.g. `GET dbs/db1/colls/c1/docs/d1`.
    pub fn item(link: impl Into<String>, resource_type: ResourceType, verb: HttpVerb) -> Self {
        Self::new(link, resource_type, false, verb)
    }

    /// An operation on a collection, e.g. `POST dbs/db1/colls/c1/docs`.
    pub fn feed(link: impl Into<String>, resource_type: ResourceType, verb: HttpVerb) -> Self {
        Self::new(link, resource_type, true, verb)
    }

    fn new(
        link: impl Into<String>,
        resource_type: ResourceType,
        is_feed: bool,
        verb: HttpVerb,
    ) -> Self {
        OperationRequest {
            link: link.into(),
            resource_type,
            is_feed,
            verb,
            headers: HashMap::new(),
            token_type: AuthorizationTokenType::PrimaryMasterKey,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_token_type(mut self, token_type: AuthorizationTokenType) -> Self {
        self.token_type = token_type;
        self
    }
}

/// One signed attempt, ready to be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub endpoint: Endpoint,
    pub url: Url,
    pub verb: HttpVerb,
    pub path_info: PathInfo,
    /// Caller headers plus a fresh `x-ms-date` and `authorization`
    pub headers: HashMap<String, String>,
    /// 1-based attempt number within the operation
    pub attempt: u32,
}

impl OutboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// What the service answered. Any status is a response, including errors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub sub_status: Option<u32>,
    /// Server-provided wait before the next attempt
    pub retry_after: Option<Duration>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        TransportResponse {
            status,
            ..Default::default()
        }
    }

    pub fn with_sub_status(mut self, sub_status: u32) -> Self {
        self.sub_status = Some(sub_status);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// 2xx, or 304 for a conditional read.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) || self.status == 304
    }
}

/// The attempt never produced a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportFailure {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request timed out")]
    Timeout,
}

/// Shared flag a caller flips to abandon an operation between attempts.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Runs logical operations against a ranked list of endpoints.
pub struct RequestExecutor<T: Transport> {
    transport: T,
    resolver: ResourceAddressResolver,
    provider: AuthorizationTokenProvider,
    policies: RetryPolicyFactory,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

impl<T: Transport> RequestExecutor<T> {
    pub fn new(
        transport: T,
        provider: AuthorizationTokenProvider,
        policies: RetryPolicyFactory,
    ) -> Self {
        RequestExecutor {
            transport,
            resolver: ResourceAddressResolver::new(),
            provider,
            policies,
            sleeper: Arc::new(ThreadSleeper),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Execute one logical operation until it succeeds or the policy stops.
    ///
    /// Resolution and signing errors are returned as-is and never retried.
    /// The request is re-signed with a fresh date on every attempt.
    pub fn execute(
        &self,
        request: &OperationRequest,
        cancel: &CancellationFlag,
    ) -> Result<TransportResponse, RequestError> {
        let path_info =
            self.resolver
                .resolve(&request.link, request.resource_type, request.is_feed)?;
        let mut policy = self.policies.get_request_policy();
        let mut endpoint = policy
            .current_endpoint()
            .cloned()
            .ok_or_else(|| RequestError::InvalidEndpoint("no endpoints configured".to_string()))?;
        let mut attempt = 0u32;

        loop {
            // A policy that refuses to start another attempt was abandoned.
            if cancel.is_cancelled() || !policy.begin_attempt() {
                return Err(cancelled(&mut policy));
            }
            attempt += 1;

            let outbound = self.sign_attempt(request, &path_info, &endpoint, attempt)?;
            debug!(
                event = "Execute",
                phase = "Attempt",
                attempt,
                verb = %request.verb,
                url = %outbound.url
            );

            let (failure, status, sub_status, retry_after) = match self.transport.send(&outbound) {
                Ok(response) if response.is_success() => {
                    debug!(
                        event = "Execute",
                        phase = "Succeeded",
                        attempt,
                        status = response.status
                    );
                    return Ok(response);
                }
                Ok(response) => (
                    FailureKind::classify(response.status, response.sub_status),
                    Some(response.status),
                    response.sub_status,
                    response.retry_after,
                ),
                Err(err) => {
                    info!(
                        event = "Execute",
                        phase = "TransportFailure",
                        attempt,
                        endpoint = %endpoint,
                        error = %err
                    );
                    (FailureKind::EndpointUnavailable, None, None, None)
                }
            };

            let decision = policy.on_failure(failure, status, retry_after)?;
            if !decision.should_retry {
                return Err(surfaced_error(&policy, failure, status, sub_status));
            }

            // Cancelled while the attempt was in flight: no backoff may run.
            if cancel.is_cancelled() {
                return Err(cancelled(&mut policy));
            }
            if !decision.backoff.is_zero() {
                self.sleeper.sleep(decision.backoff);
            }
            if cancel.is_cancelled() {
                return Err(cancelled(&mut policy));
            }
            if let Some(next) = decision.target_endpoint {
                endpoint = next;
            }
        }
    }

    fn sign_attempt(
        &self,
        request: &OperationRequest,
        path_info: &PathInfo,
        endpoint: &Endpoint,
        attempt: u32,
    ) -> Result<OutboundRequest, RequestError> {
        let now = self.clock.now();
        let mut headers: HashMap<String, String> = request
            .headers
            .iter()
            .filter(|(name, _)| {
                !name.eq_ignore_ascii_case(X_MS_DATE_HEADER)
                    && !name.eq_ignore_ascii_case(AUTHORIZATION_HEADER)
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        headers.insert(X_MS_DATE_HEADER.to_string(), format_request_date(now));

        let token = self.provider.authorize(
            path_info,
            request.verb,
            &headers,
            request.token_type,
            &TokenProperties::at(now),
        )?;
        headers.insert(AUTHORIZATION_HEADER.to_string(), token);

        Ok(OutboundRequest {
            endpoint: endpoint.clone(),
            url: endpoint.resource_url(path_info.resource_path())?,
            verb: request.verb,
            path_info: path_info.clone(),
            headers,
            attempt,
        })
    }
}

fn cancelled(policy: &mut RetryPolicy) -> RequestError {
    policy.cancel();
    debug!(
        event = "Execute",
        phase = "Cancelled",
        attempts = policy.attempt_count()
    );
    RequestError::Cancelled
}

/// The error reported once the policy stops retrying.
fn surfaced_error(
    policy: &RetryPolicy,
    failure: FailureKind,
    status: Option<u16>,
    sub_status: Option<u32>,
) -> RequestError {
    let attempts = policy.attempt_count();
    match (policy.state(), status, failure) {
        (RetryState::Terminal, Some(status), _) => RequestError::Service { status, sub_status },
        (_, _, FailureKind::Throttled) => RequestError::Throttled { attempts },
        (_, _, FailureKind::SessionStale) => RequestError::SessionStale { attempts },
        (_, _, FailureKind::EndpointUnavailable) => RequestError::EndpointUnavailable { attempts },
        (_, status, FailureKind::NonRetriable) => RequestError::Service {
            status: status.unwrap_or_default(),
            sub_status,
        },
    }
}
