//! Stream accessor trait for transport layer

use crate::tls::TlsConfig;
use async_trait::async_trait;
use ldap_core::{LdapError, LdapResult};

/// Stream accessor interface to access a byte stream to a directory server
#[async_trait]
pub trait StreamAccessor: Send + Sync {
    /// Read data from the stream
    ///
    /// # Arguments
    ///
    /// * `buf` - Buffer to read into
    ///
    /// # Returns
    ///
    /// Number of bytes read, or 0 if EOF
    async fn read(&mut self, buf: &mut [u8]) -> LdapResult<usize>;

    /// Write data to the stream
    ///
    /// # Arguments
    ///
    /// * `buf` - Data to write
    ///
    /// # Returns
    ///
    /// Number of bytes written
    async fn write(&mut self, buf: &[u8]) -> LdapResult<usize>;

    /// Write all data to the stream
    async fn write_all(&mut self, buf: &[u8]) -> LdapResult<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..]).await?;
            if n == 0 {
                return Err(LdapError::Write(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "Failed to write all data",
                )));
            }
            written += n;
        }
        Ok(())
    }

    /// Flush any buffered data
    async fn flush(&mut self) -> LdapResult<()>;

    /// Check if the stream is closed
    fn is_closed(&self) -> bool;

    /// Close the stream
    ///
    /// Idempotent and callable from any state.
    async fn close(&mut self) -> LdapResult<()>;
}

/// Transport trait that extends StreamAccessor
#[async_trait]
pub trait Transport: StreamAccessor + std::fmt::Debug {
    /// Open the connection to the remote endpoint
    ///
    /// Bounded by the transport's configured connect timeout.
    async fn open(&mut self) -> LdapResult<()>;

    /// Upgrade the open stream to TLS in place
    ///
    /// Bytes already read off the stream are not affected; any buffer
    /// held above the transport survives the upgrade.
    async fn start_tls(&mut self, _config: &TlsConfig) -> LdapResult<()> {
        Err(LdapError::Unsupported(
            "Transport does not support TLS upgrade".to_string(),
        ))
    }
}
