//! Configuration URLs and key/value parameter lookup.
//!
//! A [`Url`] describes an endpoint (`scheme://host:port/path?key=value`) plus
//! an arbitrary set of parameters. The extension layer only ever reads the
//! parameters it needs for selection through the [`Parameters`] trait; every
//! other part of the url is passed through to the transport untouched.
//!
//! # Examples
//!
//! ```
//! use switchyard_core::{Parameters, Url};
//!
//! let url: Url = "exchange://127.0.0.1:20880/echo?exchanger=standard&timeout=500"
//!     .parse()
//!     .unwrap();
//!
//! assert_eq!(url.scheme(), "exchange");
//! assert_eq!(url.address().as_deref(), Some("127.0.0.1:20880"));
//! assert_eq!(url.parameter("exchanger"), Some("standard"));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Read-only string lookup by key.
///
/// Implemented by everything that can carry per-call configuration for
/// adaptive dispatch.
pub trait Parameters {
    /// Value associated with `key`, if any.
    fn parameter(&self, key: &str) -> Option<&str>;
}

impl Parameters for HashMap<String, String> {
    fn parameter(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl Parameters for BTreeMap<String, String> {
    fn parameter(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

/// Endpoint descriptor with parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Url {
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    parameters: BTreeMap<String, String>,
}

impl Url {
    /// Create a url with the given scheme, host and port and no parameters.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: Some(host.into()),
            port: Some(port),
            path: String::new(),
            parameters: BTreeMap::new(),
        }
    }

    /// Parse a url from its string form.
    ///
    /// # Errors
    ///
    /// Returns error if the scheme is missing, the port is not a valid `u16`,
    /// or a parameter has an empty key.
    pub fn parse(s: &str) -> Result<Self, UrlParseError> {
        let (scheme, rest) = s.split_once("://").ok_or(UrlParseError::MissingScheme)?;
        if scheme.is_empty() {
            return Err(UrlParseError::MissingScheme);
        }

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };
        let (authority, path) = match location.split_once('/') {
            Some((authority, path)) => (authority, path),
            None => (location, ""),
        };
        let (host, port) = parse_authority(authority)?;

        let mut parameters = BTreeMap::new();
        for pair in query.unwrap_or_default().split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key.is_empty() {
                return Err(UrlParseError::InvalidParameter {
                    pair: pair.to_string(),
                });
            }
            parameters.insert(key.to_string(), value.to_string());
        }

        Ok(Self {
            scheme: scheme.to_string(),
            host,
            port,
            path: path.to_string(),
            parameters,
        })
    }

    /// The url scheme (e.g. `exchange`, `memory`).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The host part, if present.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The port, if present.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The path without its leading slash.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host:port` (or just `host`) used by transports to address endpoints.
    pub fn address(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        Some(match self.port {
            Some(port) => format!("{host}:{port}"),
            None => host,
        })
    }

    /// All parameters, sorted by key.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// Parameter value, or `default` when absent.
    pub fn parameter_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.parameter(key).unwrap_or(default)
    }

    /// Return a copy of this url with `key` set to `value`.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Return a copy of this url without `key`.
    pub fn without_parameter(mut self, key: &str) -> Self {
        self.parameters.remove(key);
        self
    }

    /// Return a copy of this url with the given path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = path.trim_start_matches('/').to_string();
        self
    }
}

fn parse_authority(authority: &str) -> Result<(Option<String>, Option<u16>), UrlParseError> {
    if authority.is_empty() {
        return Ok((None, None));
    }

    // IPv6 bracket notation [::1]:port
    if let Some(stripped) = authority.strip_prefix('[') {
        let (host, tail) = stripped
            .split_once(']')
            .ok_or(UrlParseError::InvalidHost)?;
        let port = match tail.strip_prefix(':') {
            Some(port) => Some(parse_port(port)?),
            None if tail.is_empty() => None,
            None => return Err(UrlParseError::InvalidHost),
        };
        return Ok((Some(host.to_string()), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Ok((Some(host.to_string()), Some(parse_port(port)?))),
        None => Ok((Some(authority.to_string()), None)),
    }
}

fn parse_port(port: &str) -> Result<u16, UrlParseError> {
    port.parse().map_err(|_| UrlParseError::InvalidPort {
        port: port.to_string(),
    })
}

impl Parameters for Url {
    fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

impl FromStr for Url {
    type Err = UrlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(address) = self.address() {
            write!(f, "{address}")?;
        }
        if !self.path.is_empty() {
            write!(f, "/{}", self.path)?;
        }
        for (index, (key, value)) in self.parameters.iter().enumerate() {
            let separator = if index == 0 { '?' } else { '&' };
            write!(f, "{separator}{key}={value}")?;
        }
        Ok(())
    }
}

/// Error parsing a [`Url`] from string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlParseError {
    /// No `scheme://` prefix found in the input.
    #[error("missing scheme separator")]
    MissingScheme,
    /// The host part is malformed (e.g. unterminated IPv6 bracket).
    #[error("invalid host")]
    InvalidHost,
    /// The port could not be parsed as a `u16`.
    #[error("invalid port number: {port}")]
    InvalidPort {
        /// The offending port text.
        port: String,
    },
    /// A `key=value` pair has an empty key.
    #[error("invalid parameter: {pair}")]
    InvalidParameter {
        /// The offending pair.
        pair: String,
    },
}
