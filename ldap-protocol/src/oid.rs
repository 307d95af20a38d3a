//! Well-known OIDs the client itself recognizes

/// StartTLS extended operation (RFC 4511 §4.14)
pub const START_TLS: &str = "1.3.6.1.4.1.1466.20037";

/// Notice of disconnection unsolicited notification (RFC 4511 §4.4.1)
pub const NOTICE_OF_DISCONNECTION: &str = "1.3.6.1.4.1.1466.20036";
