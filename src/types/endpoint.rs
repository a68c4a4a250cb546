//! Regional service endpoints used for failover.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RequestError;

/// An absolute `http`/`https` URL naming one service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Url", into = "Url")]
pub struct Endpoint(Url);

impl Endpoint {
    pub fn parse(input: &str) -> Result<Self, RequestError> {
        Url::parse(input)?.try_into()
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    /// The full request URL for a resource path on this endpoint.
    pub fn resource_url(&self, resource_path: &str) -> Result<Url, RequestError> {
        Ok(self.0.join(resource_path.trim_start_matches('/'))?)
    }
}

impl TryFrom<Url> for Endpoint {
    type Error = RequestError;

    fn try_from(url: Url) -> Result<Self, Self::Error> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RequestError::InvalidEndpoint(format!(
                "unsupported scheme '{}' in '{url}'",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(RequestError::InvalidEndpoint(format!(
                "missing host in '{url}'"
            )));
        }
        Ok(Endpoint(url))
    }
}

impl From<Endpoint> for Url {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0
    }
}

impl FromStr for Endpoint {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}
