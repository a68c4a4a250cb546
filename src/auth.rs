//! Request signing.
//!
//! Master-key and system-key tokens are an HMAC-SHA256 over a fixed
//! canonical string:
//!
//! ```text
//! lower(verb) \n lower(resource type) \n resource id \n lower(x-ms-date) \n lower(date) \n
//! ```
//!
//! The resource id keeps its case when it is a name path and is lower-cased
//! when it is an opaque id. The ordering and casing are a compatibility
//! contract with the service; a token built any other way is rejected by the
//! service even though it is computed without error here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::credentials::{Credentials, PermissionMode};
use crate::error::RequestError;
use crate::metrics;
use crate::types::{AuthorizationTokenType, HttpVerb, PathInfo, ResourceType};

type HmacSha256 = Hmac<Sha256>;

pub const X_MS_DATE_HEADER: &str = "x-ms-date";
pub const DATE_HEADER: &str = "date";
pub const AUTHORIZATION_HEADER: &str = "authorization";

const TOKEN_VERSION: &str = "1.0";

/// Render `time` as the RFC 1123 date carried in `x-ms-date`.
pub fn format_request_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

/// Per-call signing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenProperties {
    /// Instant against which resource-token expiry is checked.
    pub now: SystemTime,
}

impl TokenProperties {
    pub fn at(now: SystemTime) -> Self {
        TokenProperties { now }
    }
}

impl Default for TokenProperties {
    fn default() -> Self {
        TokenProperties::at(SystemTime::now())
    }
}

/// Produces the value of the `authorization` header for a request.
///
/// Cloneable and thread-safe; signing never takes a lock.
#[derive(Debug, Clone)]
pub struct AuthorizationTokenProvider {
    credentials: Arc<Credentials>,
}

impl AuthorizationTokenProvider {
    pub fn new(credentials: Credentials) -> Self {
        AuthorizationTokenProvider {
            credentials: Arc::new(credentials),
        }
    }

    pub fn from_shared(credentials: Arc<Credentials>) -> Self {
        AuthorizationTokenProvider { credentials }
    }

    /// Sign a request for the resource described by `path_info`.
    ///
    /// Key-signed tokens cover `resource_id_or_full_name`, cased by the
    /// resolver's name/id verdict. Resource tokens are looked up by the full
    /// resource path, so id-based links match scopes built from ids.
    pub fn authorize(
        &self,
        path_info: &PathInfo,
        verb: HttpVerb,
        headers: &HashMap<String, String>,
        token_type: AuthorizationTokenType,
        properties: &TokenProperties,
    ) -> Result<String, RequestError> {
        let target = SigningTarget {
            resource_address: path_info.resource_id_or_full_name(),
            is_name_based: path_info.is_name_based(),
            scope_address: path_info.resource_path(),
            resource_type: path_info.resource_type(),
        };
        self.sign(&target, verb, headers, token_type, properties)
    }

    /// Derive the authorization token for one request attempt.
    ///
    /// The token is bound to the address, resource type, verb, request date
    /// and credential class; it must be recomputed for every attempt.
    pub fn get_user_authorization_token(
        &self,
        resource_address: &str,
        resource_type: ResourceType,
        verb: HttpVerb,
        headers: &HashMap<String, String>,
        token_type: AuthorizationTokenType,
        properties: &TokenProperties,
    ) -> Result<String, RequestError> {
        let target = SigningTarget {
            resource_address,
            is_name_based: is_name_based_address(resource_address),
            scope_address: resource_address,
            resource_type,
        };
        self.sign(&target, verb, headers, token_type, properties)
    }

    fn sign(
        &self,
        target: &SigningTarget<'_>,
        verb: HttpVerb,
        headers: &HashMap<String, String>,
        token_type: AuthorizationTokenType,
        properties: &TokenProperties,
    ) -> Result<String, RequestError> {
        let SigningTarget {
            resource_address,
            resource_type,
            ..
        } = *target;
        let started = Instant::now();
        let result = self.derive_token(target, verb, headers, token_type, properties);

        match &result {
            Ok(_) => debug!(
                event = "Sign",
                phase = "Signed",
                token_type = %token_type,
                verb = %verb,
                resource_type = resource_type.segment(),
                address = resource_address
            ),
            Err(err) => warn!(
                event = "Sign",
                phase = "Rejected",
                token_type = %token_type,
                verb = %verb,
                resource_type = resource_type.segment(),
                address = resource_address,
                error = %err
            ),
        }
        metrics::record_signing(token_type, verb, result.is_ok(), started.elapsed());

        result
    }

    fn derive_token(
        &self,
        target: &SigningTarget<'_>,
        verb: HttpVerb,
        headers: &HashMap<String, String>,
        token_type: AuthorizationTokenType,
        properties: &TokenProperties,
    ) -> Result<String, RequestError> {
        if token_type == AuthorizationTokenType::Invalid {
            return Err(RequestError::InvalidCredential(
                "credential class is Invalid".to_string(),
            ));
        }
        if token_type.is_read_only() && verb.is_mutating() {
            return Err(RequestError::InvalidCredential(format!(
                "{token_type} cannot authorize {verb}"
            )));
        }

        if token_type == AuthorizationTokenType::ResourceToken {
            return self.resource_token(target.scope_address, verb, properties);
        }

        let key = self.credentials.key(token_type).ok_or_else(|| {
            RequestError::InvalidCredential(format!("no key configured for {token_type}"))
        })?;
        let tag = token_type.token_tag().ok_or_else(|| {
            RequestError::InvalidCredential(format!("{token_type} has no token tag"))
        })?;

        let payload = string_to_sign(
            verb,
            target.resource_type,
            target.resource_address,
            target.is_name_based,
            headers,
        )?;
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|err| RequestError::InvalidCredential(err.to_string()))?;
        mac.update(payload.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        let token = format!("type={tag}&ver={TOKEN_VERSION}&sig={signature}");
        Ok(urlencoding::encode(&token).into_owned())
    }

    fn resource_token(
        &self,
        resource_address: &str,
        verb: HttpVerb,
        properties: &TokenProperties,
    ) -> Result<String, RequestError> {
        let store = self.credentials.resource_tokens().ok_or_else(|| {
            RequestError::InvalidCredential("no resource token store configured".to_string())
        })?;
        let token = store
            .find(resource_address)
            .filter(|token| token.covers(resource_address))
            .ok_or_else(|| RequestError::ScopeMismatch(resource_address.to_string()))?;

        if token.is_expired_at(properties.now) {
            return Err(RequestError::ExpiredResourceToken {
                scope: token.scope().to_string(),
            });
        }
        if token.permission() == PermissionMode::Read && verb.is_mutating() {
            return Err(RequestError::InvalidCredential(format!(
                "read-only resource token for '{}' cannot authorize {verb}",
                token.scope()
            )));
        }

        Ok(token.expose().to_string())
    }
}

/// What a token is bound to.
#[derive(Debug, Clone, Copy)]
struct SigningTarget<'a> {
    /// Signed id or name path
    resource_address: &'a str,
    /// Whether `resource_address` keeps its case in the canonical string
    is_name_based: bool,
    /// Address a resource token's scope must cover
    scope_address: &'a str,
    resource_type: ResourceType,
}

/// Name paths always contain a `/`; opaque ids never do.
fn is_name_based_address(resource_address: &str) -> bool {
    resource_address.contains('/')
}

fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
        .filter(|value| !value.is_empty())
}

pub(crate) fn string_to_sign(
    verb: HttpVerb,
    resource_type: ResourceType,
    resource_address: &str,
    is_name_based: bool,
    headers: &HashMap<String, String>,
) -> Result<String, RequestError> {
    let x_ms_date = header_value(headers, X_MS_DATE_HEADER);
    let date = header_value(headers, DATE_HEADER);
    if x_ms_date.is_none() && date.is_none() {
        return Err(RequestError::MissingHeader(X_MS_DATE_HEADER.to_string()));
    }

    let resource_id = if is_name_based {
        resource_address.to_string()
    } else {
        resource_address.to_lowercase()
    };

    Ok(format!(
        "{}\n{}\n{}\n{}\n{}\n",
        verb.as_ref().to_lowercase(),
        resource_type.segment().to_lowercase(),
        resource_id,
        x_ms_date.unwrap_or_default().to_lowercase(),
        date.unwrap_or_default().to_lowercase(),
    ))
}
