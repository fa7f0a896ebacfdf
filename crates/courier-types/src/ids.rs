//! Correspondent identifiers.
//!
//! Every conversation partner is addressed by a stable string of the form
//! `<localpart>@<domain>`. The domain distinguishes individual correspondents
//! from group conversations; the gateway's status-broadcast pseudo-address is
//! recognized so callers can skip it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Domain suffix for individual correspondents.
pub const USER_DOMAIN: &str = "s.whatsapp.net";

/// Domain suffix for group conversations.
pub const GROUP_DOMAIN: &str = "g.us";

/// The gateway's broadcast pseudo-correspondent. Never a real contact.
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Bare local parts longer than this are group identifiers.
const GROUP_LOCALPART_LEN: usize = 15;

/// Canonical identifier for an individual or group correspondent.
///
/// Serialized as the plain `<localpart>@<domain>` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrespondentId(String);

impl CorrespondentId {
    /// Wrap an already-qualified identifier. A bare local part (no `@`) gets
    /// a domain appended: long numeric identifiers are groups, everything
    /// else is an individual.
    pub fn normalize(raw: &str) -> Self {
        if raw.contains('@') {
            Self(raw.to_string())
        } else if raw.len() > GROUP_LOCALPART_LEN {
            Self(format!("{raw}@{GROUP_DOMAIN}"))
        } else {
            Self(format!("{raw}@{USER_DOMAIN}"))
        }
    }

    /// The part before the `@`.
    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }

    /// The part after the `@`, if any.
    pub fn domain(&self) -> Option<&str> {
        self.0.split_once('@').map(|(_, d)| d)
    }

    /// Whether this identifies a group conversation.
    pub fn is_group(&self) -> bool {
        self.domain() == Some(GROUP_DOMAIN)
    }

    /// Whether this is the broadcast pseudo-correspondent.
    pub fn is_status_broadcast(&self) -> bool {
        self.0 == STATUS_BROADCAST
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrespondentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrespondentId {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}
