//! Connection configuration
//!
//! Two-phase: a mutable [`ConnectionConfigBuilder`] produces an
//! immutable [`ConnectionConfig`]. Once built, nothing about the
//! configuration changes for the lifetime of the connection.

use crate::retry::{OneReconnectAttempt, RetryPolicy};
use crate::strategy::{ActivePassive, ConnectionStrategy};
use crate::validator::ConnectionValidator;
use ldap_core::{LdapError, LdapResult, LdapUrl, Scheme};
use ldap_transport::TlsConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_STARTTLS_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_secs(120);

/// Immutable connection configuration
#[derive(Clone)]
pub struct ConnectionConfig {
    ldap_urls: Vec<LdapUrl>,
    connect_timeout: Duration,
    starttls_timeout: Duration,
    response_timeout: Duration,
    reconnect_timeout: Duration,
    auto_reconnect: bool,
    auto_reconnect_condition: Arc<dyn RetryPolicy>,
    auto_replay: bool,
    use_start_tls: bool,
    tls: Option<TlsConfig>,
    connection_strategy: Arc<dyn ConnectionStrategy>,
    connection_validator: Option<Arc<dyn ConnectionValidator>>,
    transport_options: HashMap<String, String>,
}

impl ConnectionConfig {
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new()
    }

    pub fn ldap_urls(&self) -> &[LdapUrl] {
        &self.ldap_urls
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn starttls_timeout(&self) -> Duration {
        self.starttls_timeout
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    pub fn reconnect_timeout(&self) -> Duration {
        self.reconnect_timeout
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    pub fn auto_reconnect_condition(&self) -> Arc<dyn RetryPolicy> {
        Arc::clone(&self.auto_reconnect_condition)
    }

    pub fn auto_replay(&self) -> bool {
        self.auto_replay
    }

    pub fn use_start_tls(&self) -> bool {
        self.use_start_tls
    }

    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    pub fn connection_strategy(&self) -> &dyn ConnectionStrategy {
        self.connection_strategy.as_ref()
    }

    pub fn connection_validator(&self) -> Option<Arc<dyn ConnectionValidator>> {
        self.connection_validator.clone()
    }

    pub fn transport_options(&self) -> &HashMap<String, String> {
        &self.transport_options
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("ldap_urls", &self.ldap_urls)
            .field("connect_timeout", &self.connect_timeout)
            .field("starttls_timeout", &self.starttls_timeout)
            .field("response_timeout", &self.response_timeout)
            .field("reconnect_timeout", &self.reconnect_timeout)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("auto_replay", &self.auto_replay)
            .field("use_start_tls", &self.use_start_tls)
            .field("tls", &self.tls.is_some())
            .field("transport_options", &self.transport_options)
            .finish()
    }
}

/// Mutable builder for [`ConnectionConfig`]
pub struct ConnectionConfigBuilder {
    ldap_urls: Vec<LdapUrl>,
    connect_timeout: Duration,
    starttls_timeout: Duration,
    response_timeout: Duration,
    reconnect_timeout: Duration,
    auto_reconnect: bool,
    auto_reconnect_condition: Arc<dyn RetryPolicy>,
    auto_replay: bool,
    use_start_tls: bool,
    tls: Option<TlsConfig>,
    connection_strategy: Arc<dyn ConnectionStrategy>,
    connection_validator: Option<Arc<dyn ConnectionValidator>>,
    transport_options: HashMap<String, String>,
}

impl ConnectionConfigBuilder {
    pub fn new() -> Self {
        Self {
            ldap_urls: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            starttls_timeout: DEFAULT_STARTTLS_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            reconnect_timeout: DEFAULT_RECONNECT_TIMEOUT,
            auto_reconnect: true,
            auto_reconnect_condition: Arc::new(OneReconnectAttempt),
            auto_replay: true,
            use_start_tls: false,
            tls: None,
            connection_strategy: Arc::new(ActivePassive),
            connection_validator: None,
            transport_options: HashMap::new(),
        }
    }

    /// Add one endpoint; may be called repeatedly for failover lists
    pub fn url(mut self, url: impl AsRef<str>) -> LdapResult<Self> {
        self.ldap_urls.push(url.as_ref().parse()?);
        Ok(self)
    }

    pub fn urls(mut self, urls: Vec<LdapUrl>) -> Self {
        self.ldap_urls = urls;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn starttls_timeout(mut self, timeout: Duration) -> Self {
        self.starttls_timeout = timeout;
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = timeout;
        self
    }

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn auto_reconnect_condition(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.auto_reconnect_condition = Arc::new(policy);
        self
    }

    pub fn auto_replay(mut self, enabled: bool) -> Self {
        self.auto_replay = enabled;
        self
    }

    pub fn use_start_tls(mut self, enabled: bool) -> Self {
        self.use_start_tls = enabled;
        self
    }

    pub fn tls(mut self, config: TlsConfig) -> Self {
        self.tls = Some(config);
        self
    }

    pub fn connection_strategy(mut self, strategy: impl ConnectionStrategy + 'static) -> Self {
        self.connection_strategy = Arc::new(strategy);
        self
    }

    pub fn connection_validator(
        mut self,
        validator: impl ConnectionValidator + 'static,
    ) -> Self {
        self.connection_validator = Some(Arc::new(validator));
        self
    }

    pub fn transport_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.transport_options.insert(key.into(), value.into());
        self
    }

    /// Produce the immutable configuration
    ///
    /// # Errors
    /// `InvalidConfig` when no endpoint is configured, when TLS is
    /// required (ldaps or StartTLS) without a TLS configuration, or
    /// when StartTLS is combined with an ldaps endpoint.
    pub fn build(self) -> LdapResult<ConnectionConfig> {
        if self.ldap_urls.is_empty() {
            return Err(LdapError::InvalidConfig(
                "At least one LDAP URL is required".to_string(),
            ));
        }
        let has_ldaps = self
            .ldap_urls
            .iter()
            .any(|url| url.scheme() == Scheme::Ldaps);
        if self.use_start_tls && has_ldaps {
            return Err(LdapError::InvalidConfig(
                "StartTLS cannot be combined with ldaps endpoints".to_string(),
            ));
        }
        if (self.use_start_tls || has_ldaps) && self.tls.is_none() {
            return Err(LdapError::InvalidConfig(
                "TLS configuration is required for ldaps or StartTLS".to_string(),
            ));
        }

        Ok(ConnectionConfig {
            ldap_urls: self.ldap_urls,
            connect_timeout: self.connect_timeout,
            starttls_timeout: self.starttls_timeout,
            response_timeout: self.response_timeout,
            reconnect_timeout: self.reconnect_timeout,
            auto_reconnect: self.auto_reconnect,
            auto_reconnect_condition: self.auto_reconnect_condition,
            auto_replay: self.auto_replay,
            use_start_tls: self.use_start_tls,
            tls: self.tls,
            connection_strategy: self.connection_strategy,
            connection_validator: self.connection_validator,
            transport_options: self.transport_options,
        })
    }
}

impl Default for ConnectionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::builder()
            .url("ldap://ds1.example.com")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.connect_timeout(), Duration::from_secs(60));
        assert_eq!(config.starttls_timeout(), Duration::from_secs(60));
        assert_eq!(config.response_timeout(), Duration::from_secs(60));
        assert_eq!(config.reconnect_timeout(), Duration::from_secs(120));
        assert!(config.auto_reconnect());
        assert!(config.auto_replay());
        assert!(!config.use_start_tls());
        assert!(config.connection_validator().is_none());
    }

    #[test]
    fn test_requires_url() {
        assert!(matches!(
            ConnectionConfig::builder().build(),
            Err(LdapError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_starttls_requires_tls_config() {
        let result = ConnectionConfig::builder()
            .url("ldap://ds1.example.com")
            .unwrap()
            .use_start_tls(true)
            .build();
        assert!(matches!(result, Err(LdapError::InvalidConfig(_))));
    }

    #[test]
    fn test_starttls_conflicts_with_ldaps() {
        let result = ConnectionConfig::builder()
            .url("ldaps://ds1.example.com")
            .unwrap()
            .use_start_tls(true)
            .tls(TlsConfig::insecure().unwrap())
            .build();
        assert!(matches!(result, Err(LdapError::InvalidConfig(_))));
    }

    #[test]
    fn test_failover_list_order() {
        let config = ConnectionConfig::builder()
            .url("ldap://ds1.example.com")
            .unwrap()
            .url("ldap://ds2.example.com")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.ldap_urls().len(), 2);
        assert_eq!(config.ldap_urls()[0].host(), "ds1.example.com");
    }
}
