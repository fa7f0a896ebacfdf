//! Disconnect classification and the reason-dependent retry table.

use std::fmt;
use std::time::Duration;

/// Why a session closed, derived from the gateway's disconnect status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Logged out from another device. Terminal: credentials are dead.
    LoggedOut,
    /// Corrupt session state; persisted credentials must be cleared.
    BadSession,
    /// Transport dropped mid-session.
    ConnectionLost,
    /// The gateway stopped answering.
    TimedOut,
    /// The gateway closed the connection in an orderly way.
    ConnectionClosed,
    /// Another session took over this identity.
    ConnectionReplaced,
    /// A health probe went unacknowledged.
    ProbeFailed,
    Unknown,
}

impl CloseReason {
    /// Classify a gateway disconnect status code.
    ///
    /// The gateway reuses 408 for both lost and timed-out connections, so
    /// 408 classifies as `ConnectionLost`; both sit in the fast retry tiers.
    pub fn classify(status_code: Option<u16>) -> Self {
        match status_code {
            Some(401) => Self::LoggedOut,
            Some(500) => Self::BadSession,
            Some(408) => Self::ConnectionLost,
            Some(428) => Self::ConnectionClosed,
            Some(440) => Self::ConnectionReplaced,
            _ => Self::Unknown,
        }
    }

    /// Reconnect delay for this reason, or `None` when terminal.
    ///
    /// `ConnectionReplaced` gets the slow tier: a possibly-still-active
    /// duplicate holds the identity, and racing it helps nobody.
    pub fn retry_delay(self) -> Option<Duration> {
        match self {
            Self::LoggedOut => None,
            Self::BadSession | Self::ConnectionLost | Self::ProbeFailed => {
                Some(Duration::from_secs(2))
            }
            Self::TimedOut | Self::ConnectionClosed => Some(Duration::from_secs(3)),
            Self::Unknown => Some(Duration::from_secs(5)),
            Self::ConnectionReplaced => Some(Duration::from_secs(10)),
        }
    }

    /// Whether persisted credentials must be cleared before reconnecting.
    pub fn clears_credentials(self) -> bool {
        matches!(self, Self::BadSession)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoggedOut => "logged-out",
            Self::BadSession => "bad-session",
            Self::ConnectionLost => "connection-lost",
            Self::TimedOut => "timed-out",
            Self::ConnectionClosed => "connection-closed",
            Self::ConnectionReplaced => "connection-replaced",
            Self::ProbeFailed => "probe-failed",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
