//! Resource link resolution.
//!
//! A link alternates type tokens and id/name segments:
//! `dbs/{db}/colls/{coll}/docs/{doc}`. An even segment count addresses a
//! single item, an odd count addresses a feed (the trailing type token names
//! the collection being listed).

use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::RequestError;
use crate::types::{PathInfo, ResourceType};

/// Base64 alphabet with `-` standing in for `/`, optionally padded.
static RESOURCE_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9+\-]+={0,2}$").expect("resource id pattern is valid")
});

static ILLEGAL_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\\?#\x00-\x1F\x7F]").expect("name pattern is valid"));

/// Decoded lengths of server-assigned ids: database, container/user,
/// item-level resources, and attachments.
const RESOURCE_ID_LENGTHS: [usize; 4] = [4, 8, 16, 20];

/// Returns true when `segment` has the shape of an opaque server-assigned id.
pub fn is_resource_id(segment: &str) -> bool {
    if segment.len() % 4 != 0 || !RESOURCE_ID_PATTERN.is_match(segment) {
        return false;
    }
    STANDARD
        .decode(segment.replace('-', "/"))
        .is_ok_and(|bytes| RESOURCE_ID_LENGTHS.contains(&bytes.len()))
}

/// Turns resource links into [`PathInfo`] values.
///
/// Resolution is pure: no network or cache access, and the same input always
/// yields the same output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceAddressResolver;

impl ResourceAddressResolver {
    pub fn new() -> Self {
        ResourceAddressResolver
    }

    /// Resolve `resource_link` for an operation on `resource_type`.
    ///
    /// Fails with `InvalidResourceLink` when the link does not follow the
    /// segment grammar, and with `AddressMismatch` when the link is
    /// well-formed but addresses a feed where an item was expected (or vice
    /// versa), or a different resource type than declared.
    pub fn resolve(
        &self,
        resource_link: &str,
        resource_type: ResourceType,
        is_feed_operation: bool,
    ) -> Result<PathInfo, RequestError> {
        let trimmed = resource_link.strip_prefix('/').unwrap_or(resource_link);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(RequestError::InvalidResourceLink(
                "resource link is empty".to_string(),
            ));
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(RequestError::InvalidResourceLink(format!(
                "empty segment in '{resource_link}'"
            )));
        }

        let is_feed = segments.len() % 2 == 1;
        if is_feed != is_feed_operation {
            let (found, expected) = if is_feed {
                ("feed", "item")
            } else {
                ("item", "feed")
            };
            return Err(RequestError::AddressMismatch(format!(
                "'{resource_link}' addresses a {found} but the operation expects an {expected}"
            )));
        }

        let mut kinds: Vec<ResourceType> = Vec::with_capacity(segments.len().div_ceil(2));
        let mut ids: Vec<&str> = Vec::with_capacity(segments.len() / 2);

        let mut pairs = segments.iter().copied().tuples::<(&str, &str)>();
        for (type_token, id) in pairs.by_ref() {
            kinds.push(parse_kind(type_token, kinds.last().copied(), resource_link)?);
            ids.push(id);
        }
        for type_token in pairs.into_buffer() {
            kinds.push(parse_kind(type_token, kinds.last().copied(), resource_link)?);
        }

        let addressed = kinds.last().copied().ok_or_else(|| {
            RequestError::InvalidResourceLink(format!("no type token in '{resource_link}'"))
        })?;
        if addressed != resource_type {
            return Err(RequestError::AddressMismatch(format!(
                "'{resource_link}' addresses '{addressed}' but the operation targets '{resource_type}'"
            )));
        }

        let is_id_based = match ids.first() {
            None => true,
            Some(first) => kinds[0].is_id_only() || is_resource_id(first),
        };

        if is_id_based {
            if let Some(name) = ids.iter().find(|id| !is_resource_id(id)) {
                return Err(RequestError::InvalidResourceLink(format!(
                    "'{resource_link}' mixes resource ids with the name '{name}'"
                )));
            }
        } else if let Some(name) = ids.iter().find(|id| !is_valid_name(id)) {
            return Err(RequestError::InvalidResourceLink(format!(
                "illegal characters in '{name}' of '{resource_link}'"
            )));
        }

        let resource_id_or_full_name = match (is_id_based, is_feed) {
            (true, _) => ids.last().copied().unwrap_or_default().to_string(),
            (false, false) => trimmed.to_string(),
            (false, true) => segments[..segments.len() - 1].iter().join("/"),
        };

        debug!(
            event = "Resolve",
            phase = "Parsed",
            link = resource_link,
            resource_type = resource_type.segment(),
            is_feed,
            is_name_based = !is_id_based
        );

        Ok(PathInfo::new(
            is_feed,
            trimmed,
            resource_id_or_full_name,
            !is_id_based,
            resource_type,
        ))
    }
}

fn parse_kind(
    type_token: &str,
    parent: Option<ResourceType>,
    resource_link: &str,
) -> Result<ResourceType, RequestError> {
    let kind = ResourceType::from_str(type_token).map_err(|_| {
        RequestError::InvalidResourceLink(format!(
            "unknown resource type '{type_token}' in '{resource_link}'"
        ))
    })?;
    if kind.parent() != parent {
        return Err(RequestError::InvalidResourceLink(format!(
            "'{type_token}' cannot appear at this position in '{resource_link}'"
        )));
    }
    Ok(kind)
}

fn is_valid_name(name: &str) -> bool {
    !ILLEGAL_NAME_CHARS.is_match(name) && !name.ends_with(' ')
}
