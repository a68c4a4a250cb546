//! Addressable resource kinds and their link segment tokens.
//!
//! This module centralizes the segment names (`dbs`, `colls`, `docs`, ...)
//! so the resolver and the signer agree on a single source of truth.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// A resource kind, rendered as the segment token used in resource links.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
pub enum ResourceType {
    #[strum(serialize = "dbs")]
    Database,
    #[strum(serialize = "colls")]
    Container,
    #[strum(serialize = "docs")]
    Document,
    #[strum(serialize = "sprocs")]
    StoredProcedure,
    #[strum(serialize = "triggers")]
    Trigger,
    #[strum(serialize = "udfs")]
    UserDefinedFunction,
    #[strum(serialize = "users")]
    User,
    #[strum(serialize = "permissions")]
    Permission,
    #[strum(serialize = "attachments")]
    Attachment,
    #[strum(serialize = "conflicts")]
    Conflict,
    #[strum(serialize = "pkranges")]
    PartitionKeyRange,
    #[strum(serialize = "offers")]
    Offer,
}

impl ResourceType {
    /// The link segment token, e.g. `colls` for a container.
    pub fn segment(&self) -> &str {
        self.as_ref()
    }

    /// The only kind this one may be nested under, `None` for root kinds.
    pub fn parent(self) -> Option<ResourceType> {
        match self {
            Self::Database | Self::Offer => None,
            Self::Container | Self::User => Some(Self::Database),
            Self::Document
            | Self::StoredProcedure
            | Self::Trigger
            | Self::UserDefinedFunction
            | Self::Conflict
            | Self::PartitionKeyRange => Some(Self::Container),
            Self::Permission => Some(Self::User),
            Self::Attachment => Some(Self::Document),
        }
    }

    /// Offers are only ever addressed by their opaque id.
    pub(crate) fn is_id_only(self) -> bool {
        self == Self::Offer
    }
}
