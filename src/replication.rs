//! Best-effort fan-out of a single logical mutation to every regional store.
//!
//! Each handle is attempted independently and in the fixed cluster order; a
//! failure on one backend is recorded and never aborts the sibling attempts,
//! and a failure on backend B does not undo a prior success on backend A.
//! There is no atomic multi-store commit here by design.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Region, Signalement, SignalementDraft};
use crate::store::{RegionCluster, SignalementStore, StoreError, StoreResult};

/// One logical mutation, already validated by the request layer.
#[derive(Debug, Clone)]
pub enum Mutation {
    Insert {
        global_id: Uuid,
        draft: SignalementDraft,
    },
    Update {
        global_id: Uuid,
        draft: SignalementDraft,
    },
    Delete {
        global_id: Uuid,
    },
}

impl Mutation {
    /// A creation fan-out. The shared global id is assigned here, once, so
    /// every backend stores the same logical identifier; each new request
    /// builds its own `Mutation` and therefore its own id.
    pub fn insert(draft: SignalementDraft) -> Self {
        Self::Insert {
            global_id: Uuid::new_v4(),
            draft,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Mutation::Insert { .. } => "insert",
            Mutation::Update { .. } => "update",
            Mutation::Delete { .. } => "delete",
        }
    }
}

/// What a single handle did with the mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The mutation took effect on this backend.
    Applied,
    /// No row matched (idempotent update/delete no-op).
    NoMatch,
    /// The attempt failed; `detail` carries the cause.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendOutcome {
    pub backend: Region,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregate result of one fan-out: the per-backend outcomes in replication
/// order plus the first successfully-produced record value.
#[derive(Debug)]
pub struct ReplicationReport {
    pub outcomes: Vec<BackendOutcome>,
    pub record: Option<Signalement>,
}

impl ReplicationReport {
    pub fn all_failed(&self) -> bool {
        self.outcomes
            .iter()
            .all(|outcome| outcome.outcome == OutcomeKind::Failed)
    }

    pub fn any_applied(&self) -> bool {
        self.outcomes
            .iter()
            .any(|outcome| outcome.outcome == OutcomeKind::Applied)
    }

    /// Short human summary of the failed backends, for error bodies and logs.
    pub fn failure_summary(&self) -> String {
        let failures: Vec<String> = self
            .outcomes
            .iter()
            .filter(|outcome| outcome.outcome == OutcomeKind::Failed)
            .map(|outcome| {
                format!(
                    "{}: {}",
                    outcome.backend,
                    outcome.detail.as_deref().unwrap_or("unknown failure")
                )
            })
            .collect();
        failures.join("; ")
    }
}

enum ApplyOutcome {
    Applied(Option<Signalement>),
    NoMatch,
}

/// Applies one mutation to every configured store and aggregates outcomes.
pub struct ReplicationCoordinator {
    cluster: RegionCluster,
    /// Per-handle operation deadline. `None` matches the original behavior
    /// of waiting indefinitely.
    timeout: Option<Duration>,
}

impl ReplicationCoordinator {
    pub fn new(cluster: RegionCluster, timeout: Option<Duration>) -> Self {
        Self { cluster, timeout }
    }

    /// Fan the mutation out to all four stores, sequentially, in the fixed
    /// replication order. Never short-circuits: every handle gets its
    /// attempt regardless of earlier outcomes.
    pub async fn apply(&self, mutation: &Mutation) -> ReplicationReport {
        let mut outcomes = Vec::with_capacity(4);
        let mut record: Option<Signalement> = None;

        for (region, store) in self.cluster.handles() {
            match self.apply_one(store.as_ref(), mutation).await {
                Ok(ApplyOutcome::Applied(produced)) => {
                    info!(backend = %region, mutation = mutation.kind(), "replicated");
                    if record.is_none() {
                        record = produced;
                    }
                    outcomes.push(BackendOutcome {
                        backend: region,
                        outcome: OutcomeKind::Applied,
                        detail: None,
                    });
                }
                Ok(ApplyOutcome::NoMatch) => {
                    info!(backend = %region, mutation = mutation.kind(), "no matching row");
                    outcomes.push(BackendOutcome {
                        backend: region,
                        outcome: OutcomeKind::NoMatch,
                        detail: Some("no matching row".to_string()),
                    });
                }
                Err(err) => {
                    warn!(
                        backend = %region,
                        mutation = mutation.kind(),
                        error = %err,
                        "replication attempt failed"
                    );
                    outcomes.push(BackendOutcome {
                        backend: region,
                        outcome: OutcomeKind::Failed,
                        detail: Some(err.to_string()),
                    });
                }
            }
        }

        ReplicationReport { outcomes, record }
    }

    async fn apply_one(
        &self,
        store: &dyn SignalementStore,
        mutation: &Mutation,
    ) -> StoreResult<ApplyOutcome> {
        let attempt = async {
            match mutation {
                Mutation::Insert { global_id, draft } => {
                    let row = store.insert(*global_id, draft).await?;
                    Ok(ApplyOutcome::Applied(Some(row)))
                }
                Mutation::Update { global_id, draft } => {
                    match store.update(*global_id, draft).await? {
                        Some(row) => Ok(ApplyOutcome::Applied(Some(row))),
                        None => Ok(ApplyOutcome::NoMatch),
                    }
                }
                Mutation::Delete { global_id } => match store.delete(*global_id).await? {
                    true => Ok(ApplyOutcome::Applied(None)),
                    false => Ok(ApplyOutcome::NoMatch),
                },
            }
        };

        match self.timeout {
            Some(deadline) => tokio::time::timeout(deadline, attempt)
                .await
                .map_err(|_| StoreError::Timeout(deadline))?,
            None => attempt.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::store::{InMemorySignalementStore, SignalementStore};

    struct Fixture {
        stores: [Arc<InMemorySignalementStore>; 4],
        coordinator: ReplicationCoordinator,
    }

    fn fixture_with_timeout(timeout: Option<Duration>) -> Fixture {
        let stores = [
            Arc::new(InMemorySignalementStore::new()),
            Arc::new(InMemorySignalementStore::new()),
            Arc::new(InMemorySignalementStore::new()),
            Arc::new(InMemorySignalementStore::new()),
        ];
        let cluster = RegionCluster::new(
            stores[0].clone(),
            stores[1].clone(),
            stores[2].clone(),
            stores[3].clone(),
        );
        Fixture {
            stores,
            coordinator: ReplicationCoordinator::new(cluster, timeout),
        }
    }

    fn fixture() -> Fixture {
        fixture_with_timeout(None)
    }

    fn draft() -> SignalementDraft {
        SignalementDraft {
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            localization: Region::Est,
            kind: "pothole".to_string(),
            additionnal_infos: Some("near the bridge".to_string()),
            status: false,
        }
    }

    #[tokio::test]
    async fn insert_replicates_identical_fields_to_all_backends() {
        let fx = fixture();

        let report = fx.coordinator.apply(&Mutation::insert(draft())).await;

        assert!(report.outcomes.iter().all(|o| o.outcome == OutcomeKind::Applied));
        let created = report.record.expect("insert should produce a record");

        for store in &fx.stores {
            let rows = store.fetch_all().await.unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].global_id, created.global_id);
            assert_eq!(rows[0].date, created.date);
            assert_eq!(rows[0].localization, created.localization);
            assert_eq!(rows[0].kind, created.kind);
            assert_eq!(rows[0].additionnal_infos, created.additionnal_infos);
            assert_eq!(rows[0].status, created.status);
        }
    }

    #[tokio::test]
    async fn each_insert_mutation_carries_its_own_global_id() {
        let fx = fixture();

        let first = fx
            .coordinator
            .apply(&Mutation::insert(draft()))
            .await
            .record
            .unwrap();
        let second = fx
            .coordinator
            .apply(&Mutation::insert(draft()))
            .await
            .record
            .unwrap();

        // Re-invocation creates a new logical record, never a collision.
        assert_ne!(first.global_id, second.global_id);
        for store in &fx.stores {
            assert_eq!(store.fetch_all().await.unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn one_unreachable_backend_does_not_roll_back_the_others() {
        let fx = fixture();
        fx.stores[1].set_offline(true).await;

        let report = fx.coordinator.apply(&Mutation::insert(draft())).await;

        let applied = report
            .outcomes
            .iter()
            .filter(|o| o.outcome == OutcomeKind::Applied)
            .count();
        assert_eq!(applied, 3);
        assert_eq!(report.outcomes[1].outcome, OutcomeKind::Failed);
        assert!(!report.all_failed());
        assert!(report.record.is_some());

        // Successes on the reachable backends stay committed.
        assert_eq!(fx.stores[0].fetch_all().await.unwrap().len(), 1);
        assert_eq!(fx.stores[2].fetch_all().await.unwrap().len(), 1);
        assert_eq!(fx.stores[3].fetch_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn a_failure_never_aborts_the_remaining_attempts() {
        let fx = fixture();
        // First backend in replication order fails; the other three must
        // still get their attempt.
        fx.stores[0].set_offline(true).await;

        let report = fx.coordinator.apply(&Mutation::insert(draft())).await;

        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.outcomes[0].outcome, OutcomeKind::Failed);
        assert!(report.outcomes[1..].iter().all(|o| o.outcome == OutcomeKind::Applied));
    }

    #[tokio::test]
    async fn all_backends_unreachable_is_an_aggregate_failure() {
        let fx = fixture();
        for store in &fx.stores {
            store.set_offline(true).await;
        }

        let report = fx.coordinator.apply(&Mutation::insert(draft())).await;

        assert!(report.all_failed());
        assert!(report.record.is_none());
        assert!(report.failure_summary().contains("west"));
        assert!(report.failure_summary().contains("centre"));
    }

    #[tokio::test]
    async fn update_and_delete_are_idempotent() {
        let fx = fixture();

        let created = fx
            .coordinator
            .apply(&Mutation::insert(draft()))
            .await
            .record
            .unwrap();

        let mut updated_draft = draft();
        updated_draft.status = true;
        let update = Mutation::Update {
            global_id: created.global_id,
            draft: updated_draft,
        };

        let first = fx.coordinator.apply(&update).await;
        assert!(first.any_applied());
        let after_first = fx.stores[0].fetch_all().await.unwrap();

        let second = fx.coordinator.apply(&update).await;
        assert!(second.any_applied());
        assert_eq!(fx.stores[0].fetch_all().await.unwrap(), after_first);

        let delete = Mutation::Delete {
            global_id: created.global_id,
        };

        let first = fx.coordinator.apply(&delete).await;
        assert!(first.outcomes.iter().all(|o| o.outcome == OutcomeKind::Applied));

        let second = fx.coordinator.apply(&delete).await;
        assert!(second.outcomes.iter().all(|o| o.outcome == OutcomeKind::NoMatch));
        assert!(!second.all_failed());
    }

    #[tokio::test]
    async fn update_reports_no_match_per_backend_on_divergent_state() {
        let fx = fixture();

        let created = fx
            .coordinator
            .apply(&Mutation::insert(draft()))
            .await
            .record
            .unwrap();

        // One backend lost its copy; the update must still apply elsewhere.
        fx.stores[2].delete(created.global_id).await.unwrap();

        let report = fx
            .coordinator
            .apply(&Mutation::Update {
                global_id: created.global_id,
                draft: draft(),
            })
            .await;

        assert_eq!(report.outcomes[2].outcome, OutcomeKind::NoMatch);
        assert!(report.any_applied());
        assert!(report.record.is_some());
    }

    #[tokio::test]
    async fn slow_backend_times_out_without_disturbing_siblings() {
        let fx = fixture_with_timeout(Some(Duration::from_millis(50)));
        fx.stores[3].set_latency(Some(Duration::from_secs(5))).await;

        let report = fx.coordinator.apply(&Mutation::insert(draft())).await;

        assert_eq!(report.outcomes[3].outcome, OutcomeKind::Failed);
        assert!(
            report.outcomes[3]
                .detail
                .as_deref()
                .unwrap_or_default()
                .contains("timed out")
        );
        assert!(report.outcomes[..3].iter().all(|o| o.outcome == OutcomeKind::Applied));
    }
}

