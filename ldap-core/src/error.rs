use thiserror::Error;

/// Main error type for LDAP client operations
///
/// Every operation submitted through the client resolves with either a
/// success value or exactly one of these variants. Transport and decode
/// failures on an active connection are converted into reconnect
/// triggers by the connection driver; they surface here only once the
/// connection gives up.
#[derive(Error, Debug)]
pub enum LdapError {
    /// Malformed BER tag, length, or value. Never silently coerced.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    /// Connection establishment failed (refused, unreachable, ...)
    #[error("Connect error: {0}")]
    Connect(#[from] std::io::Error),

    /// Connection establishment exceeded the configured connect timeout
    #[error("Connect timed out")]
    ConnectTimeout,

    /// TLS negotiation failed during STARTTLS or ldaps connect
    #[error("TLS handshake error: {0}")]
    TlsHandshake(String),

    /// Write to the transport failed (broken pipe, half-closed stream)
    #[error("Write error: {0}")]
    Write(std::io::Error),

    /// No terminal message arrived within the configured response timeout
    #[error("Response timed out")]
    ResponseTimeout,

    /// The connection dropped and auto-replay is disabled
    #[error("Reconnect in progress")]
    ReconnectInProgress,

    /// The retry policy declined further reconnect attempts
    #[error("Reconnect attempts exhausted")]
    ReconnectExhausted,

    /// Operation attempted on, or outstanding when, a closed connection
    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Invalid LDAP URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Capability not provided by the selected transport
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl LdapError {
    /// Build a `Closed` error with the standard message used when the
    /// connection is torn down underneath outstanding operations.
    pub fn closed() -> Self {
        LdapError::Closed("connection closed".to_string())
    }
}

/// Result type alias for LDAP client operations
pub type LdapResult<T> = Result<T, LdapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = LdapError::Decode("bad length".to_string());
        assert_eq!(e.to_string(), "Decode error: bad length");

        let e = LdapError::closed();
        assert_eq!(e.to_string(), "Connection closed: connection closed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let e: LdapError = io.into();
        assert!(matches!(e, LdapError::Connect(_)));
    }
}
