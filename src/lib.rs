// src/lib.rs
pub use auth::{AuthorizationTokenProvider, TokenProperties, format_request_date};
pub use credentials::{
    Credentials, CredentialsBuilder, PermissionMode, ResourceToken, StaticResourceTokenStore,
};
pub use error::RequestError;
pub use executor::{
    CancellationFlag, OperationRequest, OutboundRequest, RequestExecutor, TransportFailure,
    TransportResponse,
};
pub use resolver::{ResourceAddressResolver, is_resource_id};
pub use retry::{FailureKind, RetryOptions, RetryPolicy, RetryPolicyFactory, RetryState};
pub use traits::{Clock, ResourceTokenStore, Sleeper, SystemClock, ThreadSleeper, Transport};
pub use types::*;

pub mod auth;
mod credentials;
mod error;
mod executor;
pub mod metrics;
mod resolver;
mod retry;
mod traits;
pub mod types;
