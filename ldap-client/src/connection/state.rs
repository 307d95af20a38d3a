//! Connection state machine

use ldap_core::{LdapError, LdapResult};

/// Connection state
///
/// # State Transitions
/// ```text
/// Closed -> Connecting (on open())
/// Connecting -> Open (transport established, StartTLS done)
/// Connecting -> Closed (all endpoints failed)
/// Open -> Reconnecting (unexpected closure, auto-reconnect on)
/// Open -> Closed (on close() or unrecoverable failure)
/// Reconnecting -> Open (reconnect attempt succeeded)
/// Reconnecting -> Closed (retry policy declined, or close())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport; the initial state and every terminal state
    #[default]
    Closed,
    /// Endpoints are being attempted for the first open
    Connecting,
    /// Transport established; operations can be submitted
    Open,
    /// Transport lost; the driver is attempting to re-establish it
    Reconnecting,
}

impl ConnectionState {
    /// Check if operations can be submitted right now
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Check if an operation may still complete after waiting
    ///
    /// During `Reconnecting`, callers block for a transition back to
    /// `Open` up to the reconnect timeout.
    pub fn can_operate(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Reconnecting)
    }

    /// Validate state transition
    ///
    /// # Returns
    /// `Ok(())` if the transition is valid, `Err` otherwise
    pub fn validate_transition(&self, new_state: ConnectionState) -> LdapResult<()> {
        let valid = match (*self, new_state) {
            (ConnectionState::Closed, ConnectionState::Connecting) => true,
            (ConnectionState::Connecting, ConnectionState::Open) => true,
            (ConnectionState::Connecting, ConnectionState::Closed) => true,
            (ConnectionState::Open, ConnectionState::Reconnecting) => true,
            (ConnectionState::Open, ConnectionState::Closed) => true,
            (ConnectionState::Reconnecting, ConnectionState::Open) => true,
            (ConnectionState::Reconnecting, ConnectionState::Closed) => true,
            // Idempotent close
            (ConnectionState::Closed, ConnectionState::Closed) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(LdapError::InvalidConfig(format!(
                "Invalid state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Closed => "Closed",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Open => "Open",
            ConnectionState::Reconnecting => "Reconnecting",
        }
    }
}
