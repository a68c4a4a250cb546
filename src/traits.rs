use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::credentials::ResourceToken;
use crate::executor::{OutboundRequest, TransportFailure, TransportResponse};

/// Source of pre-issued resource tokens, e.g. a permission feed cache.
pub trait ResourceTokenStore: Send + Sync {
    /// The token whose scope covers `resource_address`, if any.
    ///
    /// Implementations may return a token whose scope does not cover the
    /// address; the signer checks coverage itself and rejects it.
    fn find(&self, resource_address: &str) -> Option<Arc<ResourceToken>>;
}

/// Executes one request attempt. Any HTTP status is a successful send; only
/// connection-level problems are a `TransportFailure`.
pub trait Transport: Send + Sync {
    fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, TransportFailure>;
}

/// Waits out a retry backoff.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Wall clock used to stamp request dates and check token expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
