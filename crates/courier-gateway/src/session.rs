//! Gateway session traits and event types.
//!
//! The daemon consumes the gateway through these interfaces only. Events are
//! a closed enum rather than open-ended callback registration, which keeps
//! the lifecycle state machine's transition table exhaustive and testable
//! against a stubbed session.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use courier_types::{ContactCandidate, CorrespondentId};

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The current session does not support this operation.
    #[error("operation not supported by this session: {0}")]
    Unsupported(&'static str),

    /// The gateway rejected or failed the request.
    #[error("gateway request failed: {0}")]
    Request(String),

    /// The session is no longer usable.
    #[error("session closed")]
    Closed,
}

/// How the session authenticates at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Display a QR artifact for the operator to scan.
    QrCode,
    /// Request a pairing code for the given phone number.
    PairingCode { phone: String },
}

/// Presence states accepted by [`SessionHandle::update_presence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Available,
    Composing,
    Paused,
}

/// A text message delivered by the gateway.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender: CorrespondentId,
    pub text: String,
    /// The sender's self-reported push name, when the gateway attaches one.
    pub push_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle and data events emitted by a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session is negotiating with the gateway.
    Connecting,
    /// The session is established.
    Open,
    /// The session closed; `status_code` is the gateway's disconnect code,
    /// classified by [`CloseReason::classify`](crate::CloseReason::classify).
    Closed { status_code: Option<u16> },
    /// A QR pairing artifact (data-URL string) to surface to the operator.
    QrCode(String),
    /// Session credentials changed and should be persisted.
    CredentialsChanged,
    /// The gateway's contact data changed.
    ContactsChanged,
    /// The gateway's chat list changed.
    ChatsChanged,
    /// An inbound text message.
    Message(InboundMessage),
}

/// One established connection to the messaging gateway.
///
/// The discovery calls back the reconciler's strategy chain; a backend that
/// lacks a source returns [`SessionError::Unsupported`], which the
/// reconciler treats as "skip to the next strategy", not as a failure.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// Next lifecycle/data event, or `None` once the session is torn down.
    ///
    /// Must be cancellation-safe: an event not yet yielded stays queued for
    /// the next call. The service loop polls this inside a `select!`.
    async fn next_event(&mut self) -> Option<SessionEvent>;

    /// Send a text payload to a correspondent.
    async fn send_text(
        &self,
        recipient: &CorrespondentId,
        text: &str,
    ) -> Result<(), SessionError>;

    /// Update presence, globally (`None`) or toward one correspondent.
    async fn update_presence(
        &self,
        recipient: Option<&CorrespondentId>,
        state: PresenceState,
    ) -> Result<(), SessionError>;

    /// Request a pairing code for phone-number authentication.
    async fn request_pairing_code(&self, phone: &str) -> Result<String, SessionError>;

    /// Persist the session's opaque credentials.
    async fn save_credentials(&self) -> Result<(), SessionError>;

    /// Contacts from the gateway's query API.
    async fn query_contacts(&self) -> Result<Vec<ContactCandidate>, SessionError> {
        Err(SessionError::Unsupported("query_contacts"))
    }

    /// Contacts from the gateway's internal store.
    async fn store_contacts(&self) -> Result<Vec<ContactCandidate>, SessionError> {
        Err(SessionError::Unsupported("store_contacts"))
    }

    /// Contacts from the gateway's directly-exposed contact map.
    async fn direct_contacts(&self) -> Result<Vec<ContactCandidate>, SessionError> {
        Err(SessionError::Unsupported("direct_contacts"))
    }

    /// Flattened participant lists of all joined groups.
    async fn group_participants(&self) -> Result<Vec<ContactCandidate>, SessionError> {
        Err(SessionError::Unsupported("group_participants"))
    }
}

/// Factory for gateway sessions.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Open a session using credentials persisted under `auth_dir`.
    async fn connect(
        &self,
        auth_dir: &Path,
        auth: AuthMode,
    ) -> Result<Box<dyn SessionHandle>, SessionError>;
}
