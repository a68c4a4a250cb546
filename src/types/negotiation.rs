//! Request-shaping directives negotiated with the service.
//!
//! These carry no behavior of their own; they select a code path in the
//! request-building and response-parsing layers. Each one knows the header
//! it travels in and parses back from its header value.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Encoding the service should use for response bodies.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
#[strum(ascii_case_insensitive)]
pub enum ContentSerializationFormat {
    #[default]
    JsonText,
    #[strum(serialize = "CosmosBinary")]
    Binary,
}

impl ContentSerializationFormat {
    pub const HEADER: &'static str = "x-ms-documentdb-content-serialization-format";

    pub fn header_value(&self) -> &str {
        self.as_ref()
    }
}

/// Query dialect the service should accept for a query request body.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
#[strum(ascii_case_insensitive)]
pub enum QueryCompatibilityMode {
    #[default]
    Default,
    Query,
    SqlQuery,
}

impl QueryCompatibilityMode {
    pub const HEADER: &'static str = "x-ms-documentdb-query-compatibility-mode";

    pub fn header_value(&self) -> &str {
        self.as_ref()
    }
}

/// Scan direction of a feed read.
///
/// A continuation token is only valid for the direction it was issued in, so
/// a retried page must keep the direction of the original attempt.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
#[strum(ascii_case_insensitive)]
pub enum EnumerationDirection {
    #[default]
    Forward,
    Reverse,
}

impl EnumerationDirection {
    pub const HEADER: &'static str = "x-ms-enumeration-direction";

    pub fn header_value(&self) -> &str {
        self.as_ref()
    }

    pub fn is_reverse(self) -> bool {
        self == Self::Reverse
    }
}

/// Directive attached to a container migration request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum MigrateCollectionDirective {
    Thaw,
    Freeze,
}

impl MigrateCollectionDirective {
    pub const HEADER: &'static str = "x-ms-migratecollection-directive";

    pub fn header_value(&self) -> &str {
        self.as_ref()
    }
}
