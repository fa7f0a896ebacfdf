//! File-based signal channel between the bot and the admin process.
//!
//! The two processes never share memory; everything crosses through small
//! files under the auth directory. Publications (status token, QR artifact,
//! pairing code) are overwritten wholesale so a polling reader always sees a
//! complete document. Intake is a single-slot outbound-request file the bot
//! polls and deletes; a second write before the first is consumed overwrites
//! it, and that lost update is accepted behavior.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use courier_types::{CorrespondentId, CourierError};

pub const STATUS_FILE: &str = "status.txt";
pub const QR_FILE: &str = "qrcode.txt";
pub const PAIRING_FILE: &str = "pairingcode.txt";
pub const OUTBOUND_FILE: &str = "send_message.json";

/// Human-readable connection status published for the admin process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusToken {
    Connecting,
    Connected,
    Disconnected,
    Error,
    Restarting,
}

impl StatusToken {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Restarting => "restarting",
        }
    }
}

impl fmt::Display for StatusToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusToken {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "disconnected" => Ok(Self::Disconnected),
            "error" => Ok(Self::Error),
            "restarting" => Ok(Self::Restarting),
            _ => Err(()),
        }
    }
}

/// A queued outbound send written by the admin process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    pub recipient_id: CorrespondentId,
    pub payload_text: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Pairing-code artifact published for the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingArtifact {
    pub code: String,
    pub phone: String,
}

/// The bot-side handle on the file protocol.
pub struct SignalChannel {
    auth_dir: PathBuf,
    stale_after: Duration,
}

impl SignalChannel {
    pub fn new(auth_dir: &Path, stale_after: Duration) -> Self {
        Self {
            auth_dir: auth_dir.to_path_buf(),
            stale_after,
        }
    }

    fn write(&self, file: &str, content: &str) {
        let path = self.auth_dir.join(file);
        if let Err(e) = std::fs::write(&path, content) {
            warn!(path = %path.display(), error = %e, "failed to publish signal file");
        }
    }

    /// Publish the current status token.
    pub fn publish_status(&self, token: StatusToken) {
        self.write(STATUS_FILE, token.as_str());
        info!(status = %token, "status published");
    }

    /// Publish a QR artifact (data-URL string).
    pub fn publish_qr(&self, data_url: &str) {
        self.write(QR_FILE, data_url);
        info!("qr artifact published");
    }

    /// Publish a pairing code with the phone it was requested for.
    pub fn publish_pairing_code(&self, code: &str, phone: &str) {
        let artifact = PairingArtifact {
            code: code.to_string(),
            phone: phone.to_string(),
        };
        match serde_json::to_string(&artifact) {
            Ok(json) => {
                self.write(PAIRING_FILE, &json);
                info!(code, "pairing code published");
            }
            Err(e) => warn!(error = %e, "failed to serialize pairing artifact"),
        }
    }

    /// Read back the published status (the admin side of the protocol).
    pub fn read_status(&self) -> Option<StatusToken> {
        let content = std::fs::read_to_string(self.auth_dir.join(STATUS_FILE)).ok()?;
        content.parse().ok()
    }

    /// Write the outbound-request slot (the admin side of the protocol).
    /// Overwrites any unconsumed request.
    pub fn enqueue_outbound(&self, request: &OutboundRequest) -> Result<(), CourierError> {
        let json = serde_json::to_string(request)
            .map_err(|e| CourierError::SendFailure(e.to_string()))?;
        std::fs::write(self.auth_dir.join(OUTBOUND_FILE), json)?;
        Ok(())
    }

    /// Consume the outbound-request slot, if present.
    ///
    /// The file is always removed. Requests older than the staleness window
    /// are discarded unsent; unreadable slot contents are logged and
    /// dropped.
    pub fn poll_outbound(&self) -> Option<OutboundRequest> {
        let path = self.auth_dir.join(OUTBOUND_FILE);
        let content = std::fs::read_to_string(&path).ok()?;

        if let Err(e) = std::fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "failed to remove outbound slot");
        }

        let request: OutboundRequest = match serde_json::from_str(&content) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "discarding unreadable outbound request");
                return None;
            }
        };

        let age = Utc::now().signed_duration_since(request.enqueued_at);
        if age.to_std().map_or(false, |age| age > self.stale_after) {
            debug!(
                recipient = %request.recipient_id,
                age_secs = age.num_seconds(),
                "discarding stale outbound request"
            );
            return None;
        }

        Some(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (tempfile::TempDir, SignalChannel) {
        let tmp = tempfile::tempdir().unwrap();
        let channel = SignalChannel::new(tmp.path(), Duration::from_secs(300));
        (tmp, channel)
    }

    fn request(raw_id: &str, text: &str, enqueued_at: DateTime<Utc>) -> OutboundRequest {
        OutboundRequest {
            recipient_id: CorrespondentId::normalize(raw_id),
            payload_text: text.to_string(),
            enqueued_at,
        }
    }

    #[test]
    fn status_roundtrip() {
        let (tmp, channel) = channel();
        channel.publish_status(StatusToken::Connected);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join(STATUS_FILE)).unwrap(),
            "connected"
        );
        assert_eq!(channel.read_status(), Some(StatusToken::Connected));

        channel.publish_status(StatusToken::Restarting);
        assert_eq!(channel.read_status(), Some(StatusToken::Restarting));
    }

    #[test]
    fn publish_into_missing_dir_degrades_quietly() {
        let channel = SignalChannel::new(Path::new("/nonexistent/courier"), Duration::from_secs(300));
        channel.publish_status(StatusToken::Error);
        assert_eq!(channel.read_status(), None);
    }

    #[test]
    fn pairing_artifact_is_json() {
        let (tmp, channel) = channel();
        channel.publish_pairing_code("HXGQ-2Z4K", "255712345678");
        let content = std::fs::read_to_string(tmp.path().join(PAIRING_FILE)).unwrap();
        let artifact: PairingArtifact = serde_json::from_str(&content).unwrap();
        assert_eq!(artifact.code, "HXGQ-2Z4K");
        assert_eq!(artifact.phone, "255712345678");
    }

    #[test]
    fn fresh_outbound_request_is_consumed_once() {
        let (tmp, channel) = channel();
        let req = request("255712345678", "hello", Utc::now());
        channel.enqueue_outbound(&req).unwrap();

        let polled = channel.poll_outbound().unwrap();
        assert_eq!(polled, req);
        assert!(!tmp.path().join(OUTBOUND_FILE).exists());
        assert!(channel.poll_outbound().is_none());
    }

    #[test]
    fn stale_outbound_request_is_discarded_and_removed() {
        let (tmp, channel) = channel();
        let stale = request(
            "255712345678",
            "too late",
            Utc::now() - chrono::Duration::seconds(301),
        );
        channel.enqueue_outbound(&stale).unwrap();

        assert!(channel.poll_outbound().is_none());
        assert!(!tmp.path().join(OUTBOUND_FILE).exists());
    }

    #[test]
    fn second_write_overwrites_unconsumed_request() {
        let (_tmp, channel) = channel();
        channel
            .enqueue_outbound(&request("255712345678", "first", Utc::now()))
            .unwrap();
        channel
            .enqueue_outbound(&request("255787654321", "second", Utc::now()))
            .unwrap();

        let polled = channel.poll_outbound().unwrap();
        assert_eq!(polled.payload_text, "second");
        assert!(channel.poll_outbound().is_none());
    }

    #[test]
    fn unreadable_slot_is_dropped() {
        let (tmp, channel) = channel();
        std::fs::write(tmp.path().join(OUTBOUND_FILE), "{broken").unwrap();
        assert!(channel.poll_outbound().is_none());
        assert!(!tmp.path().join(OUTBOUND_FILE).exists());
    }

    #[test]
    fn outbound_request_serde_uses_camel_case() {
        let req = request("255712345678", "hello", Utc::now());
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"recipientId\""));
        assert!(json.contains("\"payloadText\""));
        assert!(json.contains("\"enqueuedAt\""));
    }
}
