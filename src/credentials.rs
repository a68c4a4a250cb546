//! Injected credential material for request signing.
//!
//! [`Credentials`] is built once, then shared read-only (behind an `Arc`) by
//! every signing request. Key material lives in `secrecy` containers so it is
//! zeroized on drop and redacted from `Debug` output.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::SystemTime;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::traits::ResourceTokenStore;
use crate::types::AuthorizationTokenType;

/// Access level a resource token was issued with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionMode {
    Read,
    All,
}

/// A pre-issued, time-bounded token scoped to one resource address and
/// everything below it.
pub struct ResourceToken {
    token: SecretString,
    scope: String,
    expires_at: SystemTime,
    permission: PermissionMode,
}

impl ResourceToken {
    pub fn new(
        token: impl Into<String>,
        scope: impl AsRef<str>,
        expires_at: SystemTime,
        permission: PermissionMode,
    ) -> Self {
        ResourceToken {
            token: SecretString::from(token.into()),
            scope: scope.as_ref().trim_matches('/').to_string(),
            expires_at,
            permission,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    pub fn permission(&self) -> PermissionMode {
        self.permission
    }

    /// True when `address` is the token's scope or a path below it.
    pub fn covers(&self, address: &str) -> bool {
        let address = address.trim_matches('/');
        match address.strip_prefix(self.scope.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    pub(crate) fn expose(&self) -> &str {
        self.token.expose_secret()
    }
}

impl Debug for ResourceToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ResourceToken")
            .field("token", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .field("permission", &self.permission)
            .finish()
    }
}

/// An in-memory token store; picks the token with the most specific scope
/// covering the requested address.
#[derive(Debug, Default)]
pub struct StaticResourceTokenStore {
    tokens: Vec<Arc<ResourceToken>>,
}

impl StaticResourceTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: ResourceToken) -> Self {
        self.tokens.push(Arc::new(token));
        self
    }
}

impl ResourceTokenStore for StaticResourceTokenStore {
    fn find(&self, resource_address: &str) -> Option<Arc<ResourceToken>> {
        self.tokens
            .iter()
            .filter(|token| token.covers(resource_address))
            .max_by_key(|token| token.scope.len())
            .cloned()
    }
}

/// Keys and token stores available to the signer.
pub struct Credentials {
    keys: HashMap<AuthorizationTokenType, SecretSlice<u8>>,
    resource_tokens: Option<Arc<dyn ResourceTokenStore>>,
}

impl Credentials {
    pub fn builder() -> CredentialsBuilder {
        CredentialsBuilder::default()
    }

    /// Credentials holding a single read-write primary master key.
    pub fn from_master_key(key: impl Into<String>) -> Result<Self, RequestError> {
        Credentials::builder()
            .with_key(AuthorizationTokenType::PrimaryMasterKey, key)
            .build()
    }

    pub(crate) fn key(&self, token_type: AuthorizationTokenType) -> Option<&[u8]> {
        self.keys.get(&token_type).map(|key| key.expose_secret())
    }

    pub(crate) fn resource_tokens(&self) -> Option<&dyn ResourceTokenStore> {
        self.resource_tokens.as_deref()
    }

    pub fn has_key(&self, token_type: AuthorizationTokenType) -> bool {
        self.keys.contains_key(&token_type)
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut classes: Vec<String> = self.keys.keys().map(|t| t.to_string()).collect();
        classes.sort();
        f.debug_struct("Credentials")
            .field("keys", &classes)
            .field("resource_tokens", &self.resource_tokens.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct CredentialsBuilder {
    keys: Vec<(AuthorizationTokenType, SecretString)>,
    resource_tokens: Option<Arc<dyn ResourceTokenStore>>,
}

impl CredentialsBuilder {
    /// Register a base64-encoded key for a master-key or system-key class.
    pub fn with_key(mut self, token_type: AuthorizationTokenType, key: impl Into<String>) -> Self {
        self.keys
            .push((token_type, SecretString::from(key.into())));
        self
    }

    pub fn with_resource_tokens(mut self, store: Arc<dyn ResourceTokenStore>) -> Self {
        self.resource_tokens = Some(store);
        self
    }

    /// Decode every registered key.
    ///
    /// Fails with `InvalidCredential` when a key is not base64, is empty, or
    /// is registered for a class that is not signed with a key.
    pub fn build(self) -> Result<Credentials, RequestError> {
        let mut keys = HashMap::with_capacity(self.keys.len());
        for (token_type, encoded) in self.keys {
            if !(token_type.is_master_key() || token_type.is_system_key()) {
                return Err(RequestError::InvalidCredential(format!(
                    "{token_type} is not signed with a key"
                )));
            }
            let decoded = STANDARD.decode(encoded.expose_secret().trim())?;
            if decoded.is_empty() {
                return Err(RequestError::InvalidCredential(format!(
                    "empty key for {token_type}"
                )));
            }
            keys.insert(token_type, SecretSlice::from(decoded));
        }
        Ok(Credentials {
            keys,
            resource_tokens: self.resource_tokens,
        })
    }
}
