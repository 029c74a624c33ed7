use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::{Region, Signalement, SignalementDraft};

/// Failure of a single backend operation. Each variant keeps enough detail
/// for the replication report without leaking connection strings.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("connection failure: {0}")]
    Connection(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("storage failure: {0}")]
    Other(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref().is_some_and(|c| c.starts_with("23")) {
                    StoreError::Constraint(db_err.message().to_string())
                } else {
                    StoreError::Other(db_err.message().to_string())
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => StoreError::Connection(err.to_string()),
            _ => StoreError::Other(err.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Handle on one regional database instance.
///
/// Every mutating operation commits independently on its own connection;
/// there is no shared transaction across handles. Zero rows affected on
/// update/delete is a structured no-op, never an error.
#[async_trait]
pub trait SignalementStore: Send + Sync {
    /// Create or verify the report table on this instance.
    async fn init(&self) -> StoreResult<()>;

    /// Insert a new row; the backend assigns its own local serial id.
    async fn insert(&self, global_id: Uuid, draft: &SignalementDraft) -> StoreResult<Signalement>;

    /// Overwrite all fields of the row carrying `global_id`. `None` when no
    /// row matches.
    async fn update(
        &self,
        global_id: Uuid,
        draft: &SignalementDraft,
    ) -> StoreResult<Option<Signalement>>;

    /// Delete the row carrying `global_id`. `false` when no row matched.
    async fn delete(&self, global_id: Uuid) -> StoreResult<bool>;

    /// Every row currently held by this instance, in local-id order.
    async fn fetch_all(&self) -> StoreResult<Vec<Signalement>>;
}

/// The four regional handles in the fixed replication order
/// (west, sud, est, centre). Shared by the coordinator and the fallback
/// reader.
#[derive(Clone)]
pub struct RegionCluster {
    handles: Vec<(Region, Arc<dyn SignalementStore>)>,
}

impl RegionCluster {
    pub fn new(
        west: Arc<dyn SignalementStore>,
        sud: Arc<dyn SignalementStore>,
        est: Arc<dyn SignalementStore>,
        centre: Arc<dyn SignalementStore>,
    ) -> Self {
        Self {
            handles: vec![
                (Region::West, west),
                (Region::Sud, sud),
                (Region::Est, est),
                (Region::Centre, centre),
            ],
        }
    }

    pub fn handles(&self) -> impl Iterator<Item = (Region, &Arc<dyn SignalementStore>)> {
        self.handles.iter().map(|(region, store)| (*region, store))
    }

    pub fn store(&self, region: Region) -> &Arc<dyn SignalementStore> {
        // The constructor fixes the handle order to Region::ALL.
        match region {
            Region::West => &self.handles[0].1,
            Region::Sud => &self.handles[1].1,
            Region::Est => &self.handles[2].1,
            Region::Centre => &self.handles[3].1,
        }
    }
}

const SELECT_COLUMNS: &str =
    "id, global_id, date, localization, type, additionnal_infos, status";

/// PostgreSQL-backed store, one pool per regional instance.
#[derive(Clone)]
pub struct PgSignalementStore {
    pool: PgPool,
}

impl PgSignalementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Builds a store with lazy connections so an unreachable region cannot
    /// block process boot; the first operation against it fails instead.
    pub fn connect_lazy(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(url)
            .map_err(|err| StoreError::Connection(err.to_string()))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SignalementStore for PgSignalementStore {
    async fn init(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| StoreError::Other(err.to_string()))?;
        Ok(())
    }

    async fn insert(&self, global_id: Uuid, draft: &SignalementDraft) -> StoreResult<Signalement> {
        let row = sqlx::query_as::<_, Signalement>(&format!(
            r#"
            INSERT INTO signalements (global_id, date, localization, type, additionnal_infos, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {SELECT_COLUMNS}
            "#,
        ))
        .bind(global_id)
        .bind(draft.date)
        .bind(draft.localization)
        .bind(draft.kind.trim())
        .bind(&draft.additionnal_infos)
        .bind(draft.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update(
        &self,
        global_id: Uuid,
        draft: &SignalementDraft,
    ) -> StoreResult<Option<Signalement>> {
        let row = sqlx::query_as::<_, Signalement>(&format!(
            r#"
            UPDATE signalements
            SET date = $1, localization = $2, type = $3, additionnal_infos = $4, status = $5
            WHERE global_id = $6
            RETURNING {SELECT_COLUMNS}
            "#,
        ))
        .bind(draft.date)
        .bind(draft.localization)
        .bind(draft.kind.trim())
        .bind(&draft.additionnal_infos)
        .bind(draft.status)
        .bind(global_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn delete(&self, global_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM signalements WHERE global_id = $1")
            .bind(global_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fetch_all(&self) -> StoreResult<Vec<Signalement>> {
        let rows = sqlx::query_as::<_, Signalement>(&format!(
            "SELECT {SELECT_COLUMNS} FROM signalements ORDER BY id",
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// In-memory store keyed by global id, with its own serial counter so local
/// ids diverge across instances the same way real backends do.
///
/// Doubles as the demo backend and the test double: `set_offline` simulates
/// an unreachable instance and `set_latency` an arbitrarily slow one.
#[derive(Debug, Default)]
pub struct InMemorySignalementStore {
    rows: RwLock<BTreeMap<Uuid, Signalement>>,
    next_id: Mutex<i32>,
    offline: RwLock<bool>,
    latency: RwLock<Option<Duration>>,
}

impl InMemorySignalementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline, every operation fails with a connection error.
    pub async fn set_offline(&self, offline: bool) {
        *self.offline.write().await = offline;
    }

    /// Injected delay before every operation completes.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().await = latency;
    }

    async fn check_reachable(&self) -> StoreResult<()> {
        if let Some(latency) = *self.latency.read().await {
            tokio::time::sleep(latency).await;
        }
        if *self.offline.read().await {
            return Err(StoreError::Connection("backend is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SignalementStore for InMemorySignalementStore {
    async fn init(&self) -> StoreResult<()> {
        self.check_reachable().await
    }

    async fn insert(&self, global_id: Uuid, draft: &SignalementDraft) -> StoreResult<Signalement> {
        self.check_reachable().await?;

        let mut next_id = self.next_id.lock().await;
        *next_id += 1;

        let row = Signalement {
            id: *next_id,
            global_id,
            date: draft.date,
            localization: draft.localization,
            kind: draft.kind.trim().to_string(),
            additionnal_infos: draft.additionnal_infos.clone(),
            status: draft.status,
        };

        let mut rows = self.rows.write().await;
        if rows.contains_key(&global_id) {
            return Err(StoreError::Constraint(format!(
                "duplicate global id {global_id}"
            )));
        }
        rows.insert(global_id, row.clone());

        Ok(row)
    }

    async fn update(
        &self,
        global_id: Uuid,
        draft: &SignalementDraft,
    ) -> StoreResult<Option<Signalement>> {
        self.check_reachable().await?;

        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(&global_id) else {
            return Ok(None);
        };

        row.date = draft.date;
        row.localization = draft.localization;
        row.kind = draft.kind.trim().to_string();
        row.additionnal_infos = draft.additionnal_infos.clone();
        row.status = draft.status;

        Ok(Some(row.clone()))
    }

    async fn delete(&self, global_id: Uuid) -> StoreResult<bool> {
        self.check_reachable().await?;
        Ok(self.rows.write().await.remove(&global_id).is_some())
    }

    async fn fetch_all(&self) -> StoreResult<Vec<Signalement>> {
        self.check_reachable().await?;

        let mut rows: Vec<Signalement> = self.rows.read().await.values().cloned().collect();
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }
}
