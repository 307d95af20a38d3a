//! TLS configuration for STARTTLS and ldaps connections
//!
//! The client treats the rustls `ClientConfig` as opaque: callers
//! build trust roots, client certificates, and protocol versions
//! themselves and hand the finished config over.

use ldap_core::{LdapError, LdapResult};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;

/// TLS settings applied when a transport upgrades its stream
#[derive(Debug, Clone)]
pub struct TlsConfig {
    client_config: Arc<rustls::ClientConfig>,
    server_name_override: Option<String>,
}

impl TlsConfig {
    pub fn new(client_config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            client_config,
            server_name_override: None,
        }
    }

    /// Verify the handshake against `name` instead of the connected host
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name_override = Some(name.into());
        self
    }

    pub fn client_config(&self) -> Arc<rustls::ClientConfig> {
        Arc::clone(&self.client_config)
    }

    /// Resolve the name the handshake will verify for a connection to `host`
    pub fn server_name(&self, host: &str) -> LdapResult<ServerName<'static>> {
        let name = self.server_name_override.as_deref().unwrap_or(host);
        ServerName::try_from(name.to_string())
            .map_err(|e| LdapError::TlsHandshake(format!("Invalid server name {}: {}", name, e)))
    }

    /// Build a config that accepts any server certificate
    ///
    /// For test environments and directory servers with self-signed
    /// certificates only. The channel is still encrypted but the peer
    /// is not authenticated.
    pub fn insecure() -> LdapResult<Self> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let config = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| LdapError::TlsHandshake(format!("TLS config error: {}", e)))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert { provider }))
            .with_no_client_auth();
        Ok(Self::new(Arc::new(config)))
    }
}

/// Certificate verifier that accepts any peer certificate
///
/// Signatures are still verified so a broken handshake fails loudly.
#[derive(Debug)]
struct AcceptAnyCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_name_override() {
        let config = TlsConfig::insecure().unwrap();
        let name = config.server_name("ldap.example.com").unwrap();
        assert!(matches!(name, ServerName::DnsName(_)));

        let config = config.with_server_name("directory.example.com");
        let name = config.server_name("10.0.0.1").unwrap();
        match name {
            ServerName::DnsName(dns) => assert_eq!(dns.as_ref(), "directory.example.com"),
            other => panic!("unexpected server name: {:?}", other),
        }
    }

    #[test]
    fn test_ip_server_name() {
        let config = TlsConfig::insecure().unwrap();
        assert!(matches!(
            config.server_name("192.168.1.10").unwrap(),
            ServerName::IpAddress(_)
        ));
    }
}
