//! Value types shared by the resolver, the token provider and the retry policy.
//!
//! Canonical string forms:
//! - ResourceType: the link segment token, e.g. `dbs`, `colls`, `docs`
//! - HttpVerb: upper-case method name, parsed case-insensitively
//! - AuthorizationTokenType: the variant name, e.g. `PrimaryMasterKey`
//! - Negotiation directives: the header value, parsed case-insensitively

mod decision;
mod endpoint;
mod http_verb;
mod negotiation;
mod path_info;
mod resource_type;
mod token_type;

pub use decision::RetryDecision;
pub use endpoint::Endpoint;
pub use http_verb::HttpVerb;
pub use negotiation::{
    ContentSerializationFormat, EnumerationDirection, MigrateCollectionDirective,
    QueryCompatibilityMode,
};
pub use path_info::PathInfo;
pub use resource_type::ResourceType;
pub use token_type::AuthorizationTokenType;
