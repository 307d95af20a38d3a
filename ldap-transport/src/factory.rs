//! Transport selection by URL scheme

use crate::stream::Transport;
use crate::tcp::{TcpSettings, TcpTransport};
use crate::tls::TlsConfig;
use ldap_core::{LdapError, LdapResult, LdapUrl, Scheme};
use std::time::Duration;

/// Options applied to every transport the factory produces
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    pub connect_timeout: Option<Duration>,
    /// Required for `ldaps` URLs; also used by later STARTTLS upgrades
    pub tls: Option<TlsConfig>,
}

impl TransportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_tls(mut self, config: TlsConfig) -> Self {
        self.tls = Some(config);
        self
    }
}

/// Builds the transport matching an LDAP URL
pub struct TransportFactory;

impl TransportFactory {
    /// Create an unopened transport for `url`
    ///
    /// `ldap` URLs get a plain TCP transport; `ldaps` URLs get a TCP
    /// transport whose `open` performs the TLS handshake before any
    /// protocol byte is exchanged.
    ///
    /// # Errors
    /// `InvalidConfig` for an `ldaps` URL without a TLS configuration.
    pub fn transport(url: &LdapUrl, options: &TransportOptions) -> LdapResult<Box<dyn Transport>> {
        let settings = TcpSettings::new(url.host(), url.port())
            .with_connect_timeout(options.connect_timeout);
        let settings = match url.scheme() {
            Scheme::Ldap => settings,
            Scheme::Ldaps => {
                let tls = options.tls.clone().ok_or_else(|| {
                    LdapError::InvalidConfig(format!(
                        "ldaps URL {} requires a TLS configuration",
                        url
                    ))
                })?;
                settings.with_tls_on_open(tls)
            }
        };
        Ok(Box::new(TcpTransport::new(settings)))
    }
}
