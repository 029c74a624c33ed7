//! Read path: serve a region's rows, substituting another region's store
//! when the requested one is unreachable.
//!
//! Substitution is tagged in the result (`served_by`) rather than silently
//! masked, so callers can tell primary service from fallback service.

use thiserror::Error;
use tracing::warn;

use crate::models::{Region, Signalement};
use crate::store::{RegionCluster, StoreError};

/// Rows served for a read request, tagged with the region that answered.
#[derive(Debug)]
pub struct RegionalReadout {
    pub rows: Vec<Signalement>,
    pub served_by: Region,
}

/// Every store in the fallback chain failed the read.
#[derive(Debug, Error)]
#[error("all regional stores failed: {}", summary(.failures))]
pub struct ReadFallthroughError {
    pub failures: Vec<(Region, StoreError)>,
}

fn summary(failures: &[(Region, StoreError)]) -> String {
    failures
        .iter()
        .map(|(region, err)| format!("{region}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Serves read-all requests with the fixed per-region fallback priority.
pub struct FallbackReader {
    cluster: RegionCluster,
}

impl FallbackReader {
    pub fn new(cluster: RegionCluster) -> Self {
        Self { cluster }
    }

    /// Try the requested region first, then the remaining regions in its
    /// fixed rotation; return the first successful row set.
    pub async fn read_all(&self, requested: Region) -> Result<RegionalReadout, ReadFallthroughError> {
        let mut failures = Vec::new();

        for candidate in requested.fallback_order() {
            match self.cluster.store(candidate).fetch_all().await {
                Ok(rows) => {
                    if candidate != requested {
                        warn!(
                            requested = %requested,
                            served_by = %candidate,
                            "requested store unreachable, serving fallback region"
                        );
                    }
                    return Ok(RegionalReadout {
                        rows,
                        served_by: candidate,
                    });
                }
                Err(err) => {
                    warn!(backend = %candidate, error = %err, "read attempt failed");
                    failures.push((candidate, err));
                }
            }
        }

        Err(ReadFallthroughError { failures })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::*;
    use crate::models::SignalementDraft;
    use crate::store::{InMemorySignalementStore, SignalementStore};

    struct Fixture {
        stores: [Arc<InMemorySignalementStore>; 4],
        reader: FallbackReader,
    }

    fn fixture() -> Fixture {
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
            reader: FallbackReader::new(cluster),
        }
    }

    fn draft(kind: &str) -> SignalementDraft {
        SignalementDraft {
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            localization: Region::Est,
            kind: kind.to_string(),
            additionnal_infos: None,
            status: false,
        }
    }

    #[tokio::test]
    async fn healthy_primary_serves_its_own_rows() {
        let fx = fixture();
        fx.stores[2]
            .insert(Uuid::new_v4(), &draft("pothole"))
            .await
            .unwrap();

        let readout = fx.reader.read_all(Region::Est).await.unwrap();

        assert_eq!(readout.served_by, Region::Est);
        assert_eq!(readout.rows.len(), 1);
        assert_eq!(readout.rows[0].kind, "pothole");
    }

    #[tokio::test]
    async fn est_down_falls_back_to_sud_and_tags_it() {
        let fx = fixture();
        fx.stores[1]
            .insert(Uuid::new_v4(), &draft("flooding"))
            .await
            .unwrap();
        fx.stores[2].set_offline(true).await;

        let readout = fx.reader.read_all(Region::Est).await.unwrap();

        assert_eq!(readout.served_by, Region::Sud);
        assert_eq!(readout.rows.len(), 1);
        assert_eq!(readout.rows[0].kind, "flooding");
    }

    #[tokio::test]
    async fn fallback_walks_the_full_rotation() {
        let fx = fixture();
        // est, sud and west down: centre is the last candidate for est.
        fx.stores[0].set_offline(true).await;
        fx.stores[1].set_offline(true).await;
        fx.stores[2].set_offline(true).await;

        let readout = fx.reader.read_all(Region::Est).await.unwrap();
        assert_eq!(readout.served_by, Region::Centre);
    }

    #[tokio::test]
    async fn all_stores_down_is_a_fallthrough_error() {
        let fx = fixture();
        for store in &fx.stores {
            store.set_offline(true).await;
        }

        let err = fx.reader.read_all(Region::West).await.unwrap_err();

        assert_eq!(err.failures.len(), 4);
        let regions: Vec<Region> = err.failures.iter().map(|(region, _)| *region).collect();
        assert_eq!(
            regions,
            vec![Region::West, Region::Sud, Region::Est, Region::Centre]
        );
        assert!(err.to_string().contains("west"));
    }
}
