//! Contact records and the partial candidates that enrich them.
//!
//! A [`ContactRecord`] is the canonical directory entry for one
//! correspondent. Discovery sources produce [`ContactCandidate`]s, partial
//! and possibly conflicting views that are folded into records under the
//! merge rules implemented by the contact directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::CorrespondentId;

/// Canonical directory entry for one correspondent.
///
/// `display_name` is never empty once populated: when no discovery source
/// supplies a name it is synthesized from the identifier's local part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub id: CorrespondentId,
    pub display_name: String,
    /// When the correspondent last messaged us, if ever.
    #[serde(default)]
    pub last_message_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
    /// True once any discovery source has confirmed the identity.
    pub is_known_contact: bool,
}

impl ContactRecord {
    /// A fresh record with a synthesized display name.
    pub fn new(id: CorrespondentId) -> Self {
        let display_name = synthesize_display_name(id.local_part());
        Self {
            id,
            display_name,
            last_message_time: None,
            unread_count: 0,
            is_known_contact: true,
        }
    }
}

/// Which discovery source produced a candidate.
///
/// Sources are not equally trusted: only [`QueryApi`](Self::QueryApi) and
/// [`PushName`](Self::PushName) candidates may overwrite a display name that
/// is already populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    /// The gateway's contact query API.
    QueryApi,
    /// The gateway's internal contact store.
    GatewayStore,
    /// The gateway's directly-exposed contact map.
    DirectMap,
    /// Flattened group participant enumeration.
    GroupRoster,
    /// Extracted from locally persisted session artifacts.
    SessionArtifact,
    /// The push name attached to an inbound message.
    PushName,
}

impl CandidateOrigin {
    /// Whether a candidate from this origin may replace an already-populated
    /// display name.
    pub fn may_overwrite(self) -> bool {
        matches!(self, Self::QueryApi | Self::PushName)
    }
}

/// A partial contact view offered by one discovery source.
///
/// The four name fields mirror what gateways expose;
/// [`best_name`](Self::best_name) applies the fixed precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactCandidate {
    pub id: CorrespondentId,
    /// Explicit profile name.
    pub full_name: Option<String>,
    /// Notify/push name.
    pub notify_name: Option<String>,
    /// Verified business name.
    pub verified_name: Option<String>,
    /// Short name.
    pub short_name: Option<String>,
    pub origin: CandidateOrigin,
}

impl ContactCandidate {
    /// A candidate with no name fields set.
    pub fn bare(id: CorrespondentId, origin: CandidateOrigin) -> Self {
        Self {
            id,
            full_name: None,
            notify_name: None,
            verified_name: None,
            short_name: None,
            origin,
        }
    }

    /// A candidate carrying a single explicit name.
    pub fn named(id: CorrespondentId, name: impl Into<String>, origin: CandidateOrigin) -> Self {
        Self {
            full_name: Some(name.into()),
            ..Self::bare(id, origin)
        }
    }

    /// First non-empty name in precedence order: explicit profile name,
    /// notify/push name, verified business name, short name.
    pub fn best_name(&self) -> Option<&str> {
        [
            &self.full_name,
            &self.notify_name,
            &self.verified_name,
            &self.short_name,
        ]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
    }
}

/// Synthesize a display name from an identifier's local part.
///
/// Digits-only local parts are rendered as an international phone number:
/// the trailing 10 digits grouped `XXX XXX XXXX`, with any remainder as the
/// country code. Shorter numbers just get a `+` prefix; non-numeric local
/// parts are used as-is.
pub fn synthesize_display_name(local_part: &str) -> String {
    if local_part.is_empty() {
        return local_part.to_string();
    }
    if !local_part.bytes().all(|b| b.is_ascii_digit()) {
        return local_part.to_string();
    }
    if local_part.len() <= 10 {
        return format!("+{local_part}");
    }
    let split = local_part.len() - 10;
    let (country, subscriber) = local_part.split_at(split);
    format!(
        "+{country} {} {} {}",
        &subscriber[..3],
        &subscriber[3..6],
        &subscriber[6..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> CorrespondentId {
        CorrespondentId::normalize(raw)
    }

    #[test]
    fn best_name_prefers_full_name() {
        let c = ContactCandidate {
            full_name: Some("Alice Example".into()),
            notify_name: Some("alice".into()),
            verified_name: Some("Example Corp".into()),
            short_name: Some("Ali".into()),
            ..ContactCandidate::bare(id("255712345678"), CandidateOrigin::QueryApi)
        };
        assert_eq!(c.best_name(), Some("Alice Example"));
    }

    #[test]
    fn best_name_falls_through_empty_fields() {
        let c = ContactCandidate {
            full_name: Some("   ".into()),
            notify_name: None,
            verified_name: Some("Example Corp".into()),
            short_name: Some("Ali".into()),
            ..ContactCandidate::bare(id("255712345678"), CandidateOrigin::GatewayStore)
        };
        assert_eq!(c.best_name(), Some("Example Corp"));
    }

    #[test]
    fn best_name_none_when_all_blank() {
        let c = ContactCandidate::bare(id("255712345678"), CandidateOrigin::DirectMap);
        assert_eq!(c.best_name(), None);
    }

    #[test]
    fn only_query_api_and_push_name_may_overwrite() {
        assert!(CandidateOrigin::QueryApi.may_overwrite());
        assert!(CandidateOrigin::PushName.may_overwrite());
        assert!(!CandidateOrigin::GatewayStore.may_overwrite());
        assert!(!CandidateOrigin::DirectMap.may_overwrite());
        assert!(!CandidateOrigin::GroupRoster.may_overwrite());
        assert!(!CandidateOrigin::SessionArtifact.may_overwrite());
    }

    #[test]
    fn synthesize_long_number_groups_trailing_ten_digits() {
        assert_eq!(synthesize_display_name("255712345678"), "+25 571 234 5678");
        assert_eq!(synthesize_display_name("14155552671"), "+1 415 555 2671");
    }

    #[test]
    fn synthesize_short_number_keeps_plus_prefix() {
        assert_eq!(synthesize_display_name("712345678"), "+712345678");
        assert_eq!(synthesize_display_name("1234567890"), "+1234567890");
    }

    #[test]
    fn synthesize_non_numeric_passes_through() {
        assert_eq!(synthesize_display_name("alice.example"), "alice.example");
    }

    #[test]
    fn new_record_synthesizes_name() {
        let r = ContactRecord::new(id("255712345678@s.whatsapp.net"));
        assert_eq!(r.display_name, "+25 571 234 5678");
        assert!(r.is_known_contact);
        assert_eq!(r.unread_count, 0);
        assert!(r.last_message_time.is_none());
    }

    #[test]
    fn record_serde_uses_camel_case() {
        let r = ContactRecord::new(id("255712345678@s.whatsapp.net"));
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"displayName\""));
        assert!(json.contains("\"isKnownContact\""));
        assert!(json.contains("\"unreadCount\""));
        let back: ContactRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
