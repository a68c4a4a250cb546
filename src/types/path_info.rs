//! Resolved resource address.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

use super::resource_type::ResourceType;

/// The canonical address of a resource, as produced by the resolver.
///
/// Immutable once built. `is_name_based` is true exactly when
/// `resource_id_or_full_name` is a slash-delimited name path rather than an
/// opaque server-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathInfo {
    is_feed: bool,
    resource_path: String,
    resource_id_or_full_name: String,
    is_name_based: bool,
    resource_type: ResourceType,
}

impl PathInfo {
    pub(crate) fn new(
        is_feed: bool,
        resource_path: impl Into<String>,
        resource_id_or_full_name: impl Into<String>,
        is_name_based: bool,
        resource_type: ResourceType,
    ) -> Self {
        PathInfo {
            is_feed,
            resource_path: resource_path.into(),
            resource_id_or_full_name: resource_id_or_full_name.into(),
            is_name_based,
            resource_type,
        }
    }

    /// True for collection-level (multi-item) addresses.
    pub fn is_feed(&self) -> bool {
        self.is_feed
    }

    /// Canonical segment path, e.g. `dbs/db1/colls/c1/docs/d1`.
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    pub fn resource_id_or_full_name(&self) -> &str {
        &self.resource_id_or_full_name
    }

    pub fn is_name_based(&self) -> bool {
        self.is_name_based
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }
}

impl Display for PathInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let kind = if self.is_feed { "feed" } else { "item" };
        write!(f, "{kind}:/{}", self.resource_path)
    }
}
