//! The persisted contact directory.
//!
//! One [`ContactRecord`] per correspondent, held in memory and rewritten to
//! `contacts.json` as a whole snapshot (write tmp, then rename). Loading
//! tolerates a missing or corrupt file by starting empty; reconciliation
//! only ever enriches records, never deletes them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use courier_types::contact::synthesize_display_name;
use courier_types::{ContactCandidate, ContactRecord, CorrespondentId};

/// Snapshot file name under the auth directory.
pub const CONTACTS_FILE: &str = "contacts.json";

/// Result of one [`ContactDirectory::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertOutcome {
    pub is_new: bool,
    /// Whether the display name actually changed.
    pub changed: bool,
}

/// In-memory contact directory backed by a JSON snapshot.
pub struct ContactDirectory {
    path: PathBuf,
    records: BTreeMap<CorrespondentId, ContactRecord>,
}

impl ContactDirectory {
    pub fn new(auth_dir: &Path) -> Self {
        Self {
            path: auth_dir.join(CONTACTS_FILE),
            records: BTreeMap::new(),
        }
    }

    /// Load the snapshot. A missing or unreadable file yields an empty
    /// directory; this never fails.
    pub fn load(&mut self) {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "no contact snapshot, starting empty");
                return;
            }
        };
        match serde_json::from_str::<Vec<ContactRecord>>(&content) {
            Ok(records) => {
                self.records = records.into_iter().map(|r| (r.id.clone(), r)).collect();
                debug!(count = self.records.len(), "contact snapshot loaded");
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt contact snapshot, starting empty");
            }
        }
    }

    /// Rewrite the snapshot. Logs and degrades on failure; never fails.
    pub fn save(&self) {
        let records: Vec<&ContactRecord> = self.records.values().collect();
        let json = match serde_json::to_string(&records) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize contact snapshot");
                return;
            }
        };
        let tmp = self.path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp, &json) {
            warn!(path = %tmp.display(), error = %e, "failed to write contact snapshot");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to rename contact snapshot");
        }
    }

    /// Merge a candidate into the directory.
    ///
    /// Creation marks the identity known and falls back to a synthesized
    /// name. An existing record's populated name is only replaced when the
    /// candidate's origin is trusted to overwrite (query API / push name);
    /// a slot still holding the synthesized fallback counts as empty and
    /// accepts any non-empty candidate name. Candidates for the broadcast
    /// pseudo-correspondent are ignored.
    pub fn upsert(&mut self, candidate: &ContactCandidate) -> UpsertOutcome {
        if candidate.id.is_status_broadcast() {
            return UpsertOutcome::default();
        }

        let candidate_name = candidate.best_name().map(str::to_string);

        if let Some(record) = self.records.get_mut(&candidate.id) {
            record.is_known_contact = true;
            let Some(name) = candidate_name else {
                return UpsertOutcome::default();
            };
            let slot_empty = record.display_name.trim().is_empty()
                || record.display_name == synthesize_display_name(record.id.local_part());
            if (slot_empty || candidate.origin.may_overwrite()) && record.display_name != name {
                record.display_name = name;
                return UpsertOutcome {
                    is_new: false,
                    changed: true,
                };
            }
            return UpsertOutcome::default();
        }

        let mut record = ContactRecord::new(candidate.id.clone());
        if let Some(name) = candidate_name {
            record.display_name = name;
        }
        self.records.insert(candidate.id.clone(), record);
        UpsertOutcome {
            is_new: true,
            changed: false,
        }
    }

    /// Record an inbound message: bumps the last-message time (monotonic)
    /// and the unread count. Creates the record if absent.
    pub fn record_message(&mut self, id: &CorrespondentId, at: DateTime<Utc>) {
        let record = self
            .records
            .entry(id.clone())
            .or_insert_with(|| ContactRecord::new(id.clone()));
        if record.last_message_time.map_or(true, |prev| at > prev) {
            record.last_message_time = Some(at);
        }
        record.unread_count = record.unread_count.saturating_add(1);
    }

    /// Explicit unread reset, the one sanctioned decrease.
    pub fn reset_unread(&mut self, id: &CorrespondentId) {
        if let Some(record) = self.records.get_mut(id) {
            record.unread_count = 0;
        }
    }

    pub fn get(&self, id: &CorrespondentId) -> Option<&ContactRecord> {
        self.records.get(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &ContactRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
