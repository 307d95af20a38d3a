//! TCP transport implementation

use crate::stream::{StreamAccessor, Transport};
use crate::tls::TlsConfig;
use async_trait::async_trait;
use ldap_core::{LdapError, LdapResult};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

/// TCP transport settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Option<Duration>,
    /// When set, the handshake runs immediately after connect (ldaps)
    pub tls_on_open: Option<TlsConfig>,
}

impl TcpSettings {
    /// Create new TCP settings
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Some(Duration::from_secs(60)),
            tls_on_open: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_tls_on_open(mut self, config: TlsConfig) -> Self {
        self.tls_on_open = Some(config);
        self
    }
}

/// Plain or TLS-wrapped stream behind one transport
enum TcpStreamKind {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl fmt::Debug for TcpStreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TcpStreamKind::Plain(_) => f.debug_struct("TcpStream").finish(),
            TcpStreamKind::Tls(_) => f.debug_struct("TlsStream").finish(),
        }
    }
}

/// TCP transport implementation
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStreamKind>,
    settings: TcpSettings,
    closed: bool,
}

impl TcpTransport {
    /// Create a new TCP transport
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    /// Whether the active stream is TLS-wrapped
    pub fn is_tls(&self) -> bool {
        matches!(self.stream, Some(TcpStreamKind::Tls(_)))
    }

    fn stream_mut(&mut self) -> LdapResult<&mut TcpStreamKind> {
        self.stream.as_mut().ok_or_else(|| {
            LdapError::Connect(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "TCP stream not connected",
            ))
        })
    }

    async fn handshake(&mut self, config: &TlsConfig) -> LdapResult<()> {
        let stream = match self.stream.take() {
            Some(TcpStreamKind::Plain(stream)) => stream,
            Some(tls @ TcpStreamKind::Tls(_)) => {
                self.stream = Some(tls);
                return Err(LdapError::TlsHandshake(
                    "Stream is already TLS".to_string(),
                ));
            }
            None => {
                return Err(LdapError::Connect(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "TCP stream not connected",
                )));
            }
        };

        let server_name = config.server_name(&self.settings.host)?;
        let connector = TlsConnector::from(config.client_config());
        match connector.connect(server_name, stream).await {
            Ok(tls_stream) => {
                self.stream = Some(TcpStreamKind::Tls(Box::new(tls_stream)));
                Ok(())
            }
            Err(e) => {
                // The plain stream is consumed by the failed handshake
                self.closed = true;
                Err(LdapError::TlsHandshake(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self) -> LdapResult<()> {
        if !self.closed {
            return Err(LdapError::Connect(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let address = format!("{}:{}", self.settings.host, self.settings.port);
        let stream = if let Some(timeout) = self.settings.connect_timeout {
            tokio::time::timeout(timeout, TcpStream::connect(&address))
                .await
                .map_err(|_| LdapError::ConnectTimeout)?
                .map_err(LdapError::Connect)?
        } else {
            TcpStream::connect(&address).await.map_err(LdapError::Connect)?
        };

        self.stream = Some(TcpStreamKind::Plain(stream));
        self.closed = false;

        if let Some(config) = self.settings.tls_on_open.clone() {
            if let Some(timeout) = self.settings.connect_timeout {
                tokio::time::timeout(timeout, self.handshake(&config))
                    .await
                    .map_err(|_| LdapError::ConnectTimeout)??;
            } else {
                self.handshake(&config).await?;
            }
        }
        Ok(())
    }

    async fn start_tls(&mut self, config: &TlsConfig) -> LdapResult<()> {
        self.handshake(config).await
    }
}

#[async_trait]
impl StreamAccessor for TcpTransport {
    async fn read(&mut self, buf: &mut [u8]) -> LdapResult<usize> {
        let result = match self.stream_mut()? {
            TcpStreamKind::Plain(stream) => stream.read(buf).await,
            TcpStreamKind::Tls(stream) => stream.read(buf).await,
        };
        match result {
            Ok(0) => {
                self.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.closed = true;
                Err(LdapError::Connect(e))
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> LdapResult<usize> {
        let result = match self.stream_mut()? {
            TcpStreamKind::Plain(stream) => stream.write(buf).await,
            TcpStreamKind::Tls(stream) => stream.write(buf).await,
        };
        result.map_err(|e| {
            self.closed = true;
            LdapError::Write(e)
        })
    }

    async fn flush(&mut self) -> LdapResult<()> {
        let result = match self.stream_mut()? {
            TcpStreamKind::Plain(stream) => stream.flush().await,
            TcpStreamKind::Tls(stream) => stream.flush().await,
        };
        result.map_err(LdapError::Write)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> LdapResult<()> {
        match self.stream.take() {
            Some(TcpStreamKind::Plain(mut stream)) => {
                let _ = stream.shutdown().await;
            }
            Some(TcpStreamKind::Tls(mut stream)) => {
                let _ = stream.shutdown().await;
            }
            None => {}
        }
        self.closed = true;
        Ok(())
    }
}
