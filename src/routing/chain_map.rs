//! Chain ID → upstream table.
//!
//! # Responsibilities
//! - Parse and validate upstream base URLs once, at startup
//! - Remember whether each base URL was configured with a trailing slash
//! - Look up the upstream for a chain ID
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - An invalid URL is a construction error, never a per-request one

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use url::Url;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChainId(pub i64);

impl From<i64> for ChainId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for i64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised while parsing an upstream URL.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("invalid upstream URL '{url}': {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("upstream URL '{url}' has unsupported scheme '{scheme}'")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("upstream URL '{url}' has no host")]
    MissingHost { url: String },
}

/// A validated upstream base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    url: Url,
    trailing_slash: bool,
}

impl Upstream {
    /// Parse an absolute http(s) URL.
    pub fn parse(raw: &str) -> Result<Self, UpstreamError> {
        let raw = raw.trim();
        let url = Url::parse(raw).map_err(|source| UpstreamError::Parse {
            url: raw.to_string(),
            source,
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UpstreamError::UnsupportedScheme {
                url: raw.to_string(),
                scheme: url.scheme().to_string(),
            });
        }
        if url.host_str().is_none() {
            return Err(UpstreamError::MissingHost {
                url: raw.to_string(),
            });
        }

        // The url crate normalizes an empty path to "/", so look at what was written.
        let base = raw.split(['?', '#']).next().unwrap_or_default();
        let authority_end = base.find("://").map(|i| i + 3).unwrap_or(0);
        let trailing_slash = base[authority_end..].contains('/') && base.ends_with('/');

        Ok(Self {
            url,
            trailing_slash,
        })
    }

    /// The parsed base URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the configured base path ends in `/`.
    pub fn keeps_trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    /// `host[:port]` as it should appear in `Host`-like headers.
    pub fn authority(&self) -> String {
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        }
    }

    /// Build the outbound URL for an inbound path and query.
    ///
    /// The path is the base path joined with the inbound path by a single slash;
    /// when the base path has no trailing slash any trailing slash is trimmed
    /// from the result. Query strings are concatenated with `&`.
    pub fn resolve(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.url.clone();

        let mut joined = single_joining_slash(self.url.path(), path);
        if !self.trailing_slash {
            let trimmed = joined.trim_end_matches('/').len();
            joined.truncate(trimmed);
        }
        url.set_path(&joined);

        let base_query = self.url.query().filter(|q| !q.is_empty());
        let inbound_query = query.filter(|q| !q.is_empty());
        let merged = match (base_query, inbound_query) {
            (Some(a), Some(b)) => Some(format!("{}&{}", a, b)),
            (Some(a), None) => Some(a.to_string()),
            (None, Some(b)) => Some(b.to_string()),
            (None, None) => None,
        };
        url.set_query(merged.as_deref());
        url
    }
}

fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{}{}", a, &b[1..]),
        (false, false) => format!("{}/{}", a, b),
        _ => format!("{}{}", a, b),
    }
}

/// Read-only mapping from chain ID to upstream, fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct ChainMap {
    upstreams: HashMap<ChainId, Upstream>,
}

impl ChainMap {
    /// Build the map, failing on the first invalid URL.
    pub fn from_urls<I, S>(entries: I) -> Result<Self, UpstreamError>
    where
        I: IntoIterator<Item = (i64, S)>,
        S: AsRef<str>,
    {
        let mut upstreams = HashMap::new();
        for (chain_id, url) in entries {
            upstreams.insert(ChainId(chain_id), Upstream::parse(url.as_ref())?);
        }
        Ok(Self { upstreams })
    }

    /// Upstream registered for a chain.
    pub fn get(&self, chain_id: ChainId) -> Option<&Upstream> {
        self.upstreams.get(&chain_id)
    }

    /// Registered chain IDs, in ascending order.
    pub fn chain_ids(&self) -> Vec<ChainId> {
        let mut ids: Vec<_> = self.upstreams.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }
}
