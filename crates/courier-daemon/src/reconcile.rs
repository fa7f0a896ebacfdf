//! Contact reconciliation.
//!
//! A reconciliation pass walks an ordered chain of discovery strategies and
//! merges the first non-empty result into the directory. One strategy wins
//! per pass; cross-pass enrichment happens through the directory's upsert
//! rules. A module-wide cooldown keeps callers (the periodic timer, inbound
//! refresh requests, gateway change events) from hammering the gateway.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use courier_gateway::{SessionError, SessionHandle};
use courier_types::{CandidateOrigin, ContactCandidate, CorrespondentId};

use crate::directory::ContactDirectory;

/// Identifies a strategy in reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    QueryApi,
    GatewayStore,
    DirectMap,
    GroupRoster,
    SessionArtifacts,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::QueryApi => "query-api",
            Self::GatewayStore => "gateway-store",
            Self::DirectMap => "direct-map",
            Self::GroupRoster => "group-roster",
            Self::SessionArtifacts => "session-artifacts",
        };
        f.write_str(name)
    }
}

/// One contact discovery source.
#[async_trait]
pub trait ContactStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Collect candidates from this source. `Unsupported` means the current
    /// session lacks the source; any error just moves the chain along.
    async fn collect(
        &self,
        session: &dyn SessionHandle,
    ) -> Result<Vec<ContactCandidate>, SessionError>;
}

/// Counts from a completed merge pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    /// Records whose display name actually changed.
    pub updated: usize,
    /// The winning strategy, or `None` when every source came up dry.
    pub source: Option<StrategyKind>,
}

/// Result of calling [`ContactReconciler::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Merged(ReconcileReport),
    /// Inside the cooldown window; nothing was attempted.
    Skipped,
}

/// Runs the strategy chain against a session and folds results into the
/// directory.
pub struct ContactReconciler {
    strategies: Vec<Box<dyn ContactStrategy>>,
    cooldown: Duration,
    last_pass: Option<Instant>,
}

impl ContactReconciler {
    /// The default chain in fixed priority order.
    pub fn new(auth_dir: &Path, cooldown: Duration) -> Self {
        Self::with_strategies(
            vec![
                Box::new(QueryApiStrategy),
                Box::new(GatewayStoreStrategy),
                Box::new(DirectMapStrategy),
                Box::new(GroupRosterStrategy),
                Box::new(SessionArtifactStrategy::new(auth_dir)),
            ],
            cooldown,
        )
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ContactStrategy>>, cooldown: Duration) -> Self {
        Self {
            strategies,
            cooldown,
            last_pass: None,
        }
    }

    /// Run one reconciliation pass, respecting the cooldown.
    pub async fn reconcile(
        &mut self,
        session: &dyn SessionHandle,
        directory: &mut ContactDirectory,
    ) -> ReconcileOutcome {
        if let Some(last) = self.last_pass {
            let elapsed = last.elapsed();
            if elapsed < self.cooldown {
                debug!(
                    remaining_secs = (self.cooldown - elapsed).as_secs(),
                    "reconciliation on cooldown"
                );
                return ReconcileOutcome::Skipped;
            }
        }
        self.last_pass = Some(Instant::now());

        for strategy in &self.strategies {
            let candidates = match strategy.collect(session).await {
                Ok(candidates) => candidates,
                Err(SessionError::Unsupported(op)) => {
                    debug!(strategy = %strategy.kind(), op, "source unavailable, trying next");
                    continue;
                }
                Err(e) => {
                    warn!(strategy = %strategy.kind(), error = %e, "source failed, trying next");
                    continue;
                }
            };
            if candidates.is_empty() {
                continue;
            }

            let mut added = 0;
            let mut updated = 0;
            for candidate in &candidates {
                if candidate.id.is_status_broadcast() {
                    continue;
                }
                let outcome = directory.upsert(candidate);
                if outcome.is_new {
                    added += 1;
                }
                if outcome.changed {
                    updated += 1;
                }
            }
            directory.save();

            info!(
                strategy = %strategy.kind(),
                found = candidates.len(),
                added,
                updated,
                "reconciliation pass merged"
            );
            return ReconcileOutcome::Merged(ReconcileReport {
                added,
                updated,
                source: Some(strategy.kind()),
            });
        }

        debug!("all discovery sources came up dry");
        ReconcileOutcome::Merged(ReconcileReport {
            added: 0,
            updated: 0,
            source: None,
        })
    }
}

/// Gateway query API.
pub struct QueryApiStrategy;

#[async_trait]
impl ContactStrategy for QueryApiStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::QueryApi
    }

    async fn collect(
        &self,
        session: &dyn SessionHandle,
    ) -> Result<Vec<ContactCandidate>, SessionError> {
        session.query_contacts().await
    }
}

/// Gateway's internal contact store.
pub struct GatewayStoreStrategy;

#[async_trait]
impl ContactStrategy for GatewayStoreStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GatewayStore
    }

    async fn collect(
        &self,
        session: &dyn SessionHandle,
    ) -> Result<Vec<ContactCandidate>, SessionError> {
        session.store_contacts().await
    }
}

/// Gateway's directly-exposed contact map.
pub struct DirectMapStrategy;

#[async_trait]
impl ContactStrategy for DirectMapStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectMap
    }

    async fn collect(
        &self,
        session: &dyn SessionHandle,
    ) -> Result<Vec<ContactCandidate>, SessionError> {
        session.direct_contacts().await
    }
}

/// Flattened participant lists of all joined groups.
pub struct GroupRosterStrategy;

#[async_trait]
impl ContactStrategy for GroupRosterStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GroupRoster
    }

    async fn collect(
        &self,
        session: &dyn SessionHandle,
    ) -> Result<Vec<ContactCandidate>, SessionError> {
        session.group_participants().await
    }
}

/// Last resort: identifiers mined from persisted session artifacts.
///
/// The gateway library keeps one `session-<id>.<counter>.json` file per
/// peer under the auth directory. The identifier comes from the filename;
/// a name or notify field embedded in the artifact is used when present.
pub struct SessionArtifactStrategy {
    auth_dir: PathBuf,
}

#[derive(Deserialize)]
struct ArtifactFields {
    name: Option<String>,
    notify: Option<String>,
}

impl SessionArtifactStrategy {
    pub fn new(auth_dir: &Path) -> Self {
        Self {
            auth_dir: auth_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl ContactStrategy for SessionArtifactStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SessionArtifacts
    }

    async fn collect(
        &self,
        _session: &dyn SessionHandle,
    ) -> Result<Vec<ContactCandidate>, SessionError> {
        let entries = std::fs::read_dir(&self.auth_dir)
            .map_err(|e| SessionError::Request(format!("auth dir unreadable: {e}")))?;

        let mut candidates = Vec::new();
        let mut seen = HashSet::new();

        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(rest) = name.strip_prefix("session-") else {
                continue;
            };
            if !rest.ends_with(".json") {
                continue;
            }
            let raw_id = rest.split('.').next().unwrap_or(rest);
            if raw_id.is_empty() || raw_id == courier_types::ids::STATUS_BROADCAST {
                continue;
            }

            let id = CorrespondentId::normalize(raw_id);
            if id.is_group() || id.is_status_broadcast() || !seen.insert(id.clone()) {
                continue;
            }

            let mut candidate = ContactCandidate::bare(id, CandidateOrigin::SessionArtifact);
            if let Ok(content) = std::fs::read_to_string(entry.path()) {
                if let Ok(fields) = serde_json::from_str::<ArtifactFields>(&content) {
                    candidate.full_name = fields.name;
                    candidate.notify_name = fields.notify;
                }
            }
            candidates.push(candidate);
        }

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_gateway::loopback::{DiscoveryCall, LoopbackGateway};
    use courier_gateway::{AuthMode, Gateway};

    fn id(raw: &str) -> CorrespondentId {
        CorrespondentId::normalize(raw)
    }

    fn named(raw: &str, name: &str, origin: CandidateOrigin) -> ContactCandidate {
        ContactCandidate::named(id(raw), name, origin)
    }

    async fn connect(gateway: &LoopbackGateway) -> Box<dyn SessionHandle> {
        gateway
            .connect(Path::new("/tmp"), AuthMode::QrCode)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_non_empty_strategy_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let (gateway, controller) = LoopbackGateway::new();
        // Query API unavailable, store has data, direct map would too but
        // must never be consulted.
        controller.script_discovery(
            DiscoveryCall::Store,
            vec![named("255712345678", "Alice", CandidateOrigin::GatewayStore)],
        );
        controller.script_discovery(
            DiscoveryCall::Direct,
            vec![named("255787654321", "Bob", CandidateOrigin::DirectMap)],
        );

        let session = connect(&gateway).await;
        let mut directory = ContactDirectory::new(tmp.path());
        let mut reconciler =
            ContactReconciler::new(tmp.path(), Duration::from_secs(900));

        let outcome = reconciler.reconcile(&*session, &mut directory).await;
        match outcome {
            ReconcileOutcome::Merged(report) => {
                assert_eq!(report.source, Some(StrategyKind::GatewayStore));
                assert_eq!(report.added, 1);
                assert_eq!(report.updated, 0);
            }
            other => panic!("expected Merged, got {other:?}"),
        }
        assert_eq!(directory.len(), 1);
        assert!(directory.get(&id("255787654321")).is_none());
    }

    #[tokio::test]
    async fn failing_strategy_falls_through_to_next() {
        let tmp = tempfile::tempdir().unwrap();
        let (gateway, controller) = LoopbackGateway::new();
        controller.script_discovery_error(DiscoveryCall::Query, "rate limited");
        controller.script_discovery(
            DiscoveryCall::Groups,
            vec![named("255712345678", "Alice", CandidateOrigin::GroupRoster)],
        );

        let session = connect(&gateway).await;
        let mut directory = ContactDirectory::new(tmp.path());
        let mut reconciler =
            ContactReconciler::new(tmp.path(), Duration::from_secs(900));

        let ReconcileOutcome::Merged(report) =
            reconciler.reconcile(&*session, &mut directory).await
        else {
            panic!("expected Merged");
        };
        assert_eq!(report.source, Some(StrategyKind::GroupRoster));
        assert_eq!(directory.len(), 1);
    }

    #[tokio::test]
    async fn second_call_inside_cooldown_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let (gateway, controller) = LoopbackGateway::new();
        controller.script_discovery(
            DiscoveryCall::Query,
            vec![named("255712345678", "Alice", CandidateOrigin::QueryApi)],
        );

        let session = connect(&gateway).await;
        let mut directory = ContactDirectory::new(tmp.path());
        let mut reconciler =
            ContactReconciler::new(tmp.path(), Duration::from_secs(900));

        assert!(matches!(
            reconciler.reconcile(&*session, &mut directory).await,
            ReconcileOutcome::Merged(_)
        ));
        assert_eq!(
            reconciler.reconcile(&*session, &mut directory).await,
            ReconcileOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn all_sources_dry_reports_no_source() {
        let tmp = tempfile::tempdir().unwrap();
        let (gateway, _controller) = LoopbackGateway::new();

        let session = connect(&gateway).await;
        let mut directory = ContactDirectory::new(tmp.path());
        // Point the artifact strategy at an empty directory too.
        let mut reconciler =
            ContactReconciler::new(tmp.path(), Duration::from_secs(900));

        let ReconcileOutcome::Merged(report) =
            reconciler.reconcile(&*session, &mut directory).await
        else {
            panic!("expected Merged");
        };
        assert_eq!(report.source, None);
        assert_eq!(report.added, 0);
        assert!(directory.is_empty());
    }

    #[tokio::test]
    async fn session_artifacts_yield_filename_ids_and_embedded_names() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("session-255712345678.0.json"),
            r#"{"name":"Alice","keys":{}}"#,
        )
        .unwrap();
        // Second artifact for the same peer must not duplicate.
        std::fs::write(
            tmp.path().join("session-255712345678.1.json"),
            r#"{"name":"Alice","keys":{}}"#,
        )
        .unwrap();
        std::fs::write(tmp.path().join("session-255787654321.0.json"), "{}").unwrap();
        // Groups, broadcast, and unrelated files are skipped.
        std::fs::write(
            tmp.path().join("session-120363041234567890.0.json"),
            "{}",
        )
        .unwrap();
        std::fs::write(tmp.path().join("creds.json"), "{}").unwrap();

        let strategy = SessionArtifactStrategy::new(tmp.path());
        let (gateway, _controller) = LoopbackGateway::new();
        let session = connect(&gateway).await;

        let mut candidates = strategy.collect(&*session).await.unwrap();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, id("255712345678"));
        assert_eq!(candidates[1].id, id("255787654321"));
        assert!(candidates
            .iter()
            .any(|c| c.best_name() == Some("Alice")));
        assert!(candidates
            .iter()
            .all(|c| c.origin == CandidateOrigin::SessionArtifact));
    }

    #[tokio::test]
    async fn merge_pass_counts_updates() {
        let tmp = tempfile::tempdir().unwrap();
        let (gateway, controller) = LoopbackGateway::new();
        controller.script_discovery(
            DiscoveryCall::Query,
            vec![
                named("255712345678", "Alice Example", CandidateOrigin::QueryApi),
                named("255787654321", "Bob", CandidateOrigin::QueryApi),
            ],
        );

        let session = connect(&gateway).await;
        let mut directory = ContactDirectory::new(tmp.path());
        // Pre-existing record with a lower-trust name.
        directory.upsert(&named("255712345678", "alice", CandidateOrigin::GatewayStore));

        let mut reconciler =
            ContactReconciler::new(tmp.path(), Duration::from_secs(900));
        let ReconcileOutcome::Merged(report) =
            reconciler.reconcile(&*session, &mut directory).await
        else {
            panic!("expected Merged");
        };

        assert_eq!(report.added, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(
            directory.get(&id("255712345678")).unwrap().display_name,
            "Alice Example"
        );
    }
}
