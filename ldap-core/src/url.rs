//! LDAP URL parsing
//!
//! Only the connection-relevant portion of an LDAP URL is modelled:
//! scheme, host, and port. DN/filter components belong to the
//! operation catalog, not the connection engine.

use crate::error::{LdapError, LdapResult};
use std::fmt;

/// URL scheme selecting plaintext or implicit-TLS connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Ldap,
    Ldaps,
}

impl Scheme {
    /// Default port for the scheme (389 plaintext, 636 implicit TLS)
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Ldap => 389,
            Scheme::Ldaps => 636,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Ldap => "ldap",
            Scheme::Ldaps => "ldaps",
        }
    }
}

/// One directory server endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LdapUrl {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl LdapUrl {
    /// Create a URL from parts
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Parse a URL of the form `ldap://host[:port]` or `ldaps://host[:port]`
    ///
    /// A bare `host[:port]` is accepted and treated as `ldap://`.
    ///
    /// # Errors
    /// Returns `LdapError::InvalidUrl` on unknown schemes, empty hosts,
    /// or unparseable ports.
    pub fn parse(url: &str) -> LdapResult<Self> {
        let (scheme, rest) = if let Some(rest) = url.strip_prefix("ldaps://") {
            (Scheme::Ldaps, rest)
        } else if let Some(rest) = url.strip_prefix("ldap://") {
            (Scheme::Ldap, rest)
        } else if url.contains("://") {
            return Err(LdapError::InvalidUrl(format!("Unknown scheme: {}", url)));
        } else {
            (Scheme::Ldap, url)
        };

        // Ignore any trailing DN/attribute components
        let authority = rest.split('/').next().unwrap_or("");
        if authority.is_empty() {
            return Err(LdapError::InvalidUrl(format!("Missing host: {}", url)));
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => {
                let port: u16 = p
                    .parse()
                    .map_err(|_| LdapError::InvalidUrl(format!("Invalid port: {}", p)))?;
                (h, port)
            }
            None => (authority, scheme.default_port()),
        };
        if host.is_empty() {
            return Err(LdapError::InvalidUrl(format!("Missing host: {}", url)));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` form used for socket address resolution
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for LdapUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

impl std::str::FromStr for LdapUrl {
    type Err = LdapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
