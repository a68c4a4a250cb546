//! Credential classes accepted by the token provider.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// The class of credential used to authorize a request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum AuthorizationTokenType {
    Invalid,
    PrimaryMasterKey,
    PrimaryReadonlyMasterKey,
    SecondaryMasterKey,
    SecondaryReadonlyMasterKey,
    SystemReadOnly,
    SystemReadWrite,
    SystemAll,
    ResourceToken,
}

impl AuthorizationTokenType {
    /// Read-only classes must never sign a mutating verb.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Self::PrimaryReadonlyMasterKey | Self::SecondaryReadonlyMasterKey | Self::SystemReadOnly
        )
    }

    /// Account master keys, primary or secondary, read-only or not.
    pub fn is_master_key(self) -> bool {
        matches!(
            self,
            Self::PrimaryMasterKey
                | Self::PrimaryReadonlyMasterKey
                | Self::SecondaryMasterKey
                | Self::SecondaryReadonlyMasterKey
        )
    }

    pub fn is_system_key(self) -> bool {
        matches!(
            self,
            Self::SystemReadOnly | Self::SystemReadWrite | Self::SystemAll
        )
    }

    /// The `type=` tag carried in a signed token, `None` for `Invalid`.
    pub(crate) fn token_tag(self) -> Option<&'static str> {
        if self.is_master_key() {
            Some("master")
        } else if self.is_system_key() {
            Some("system")
        } else if self == Self::ResourceToken {
            Some("resource")
        } else {
            None
        }
    }
}
