use async_trait::async_trait;
use chrono::Utc;
use common::QuoteId;
use domain::{NewRamp, RampDirection, RampPhase, RampRecord};
use serde::de::DeserializeOwned;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    RampId, RampStoreError, RampUpdate, Result, StaleRampQuery,
    store::RampStore,
};

const RAMP_COLUMNS: &str = "id, type, current_phase, unsigned_txs, presigned_txs, from_network, \
     to_network, state, payment_method, quote_id, phase_history, error_logs, processing_lock, \
     post_complete_state, version, created_at, updated_at";

/// PostgreSQL-backed ramp store implementation.
///
/// Each ramp is one row in `ramp_states`; nested structures are stored as JSONB.
#[derive(Clone)]
pub struct PostgresRampStore {
    pool: PgPool,
}

impl PostgresRampStore {
    /// Creates a new PostgreSQL ramp store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("Ramp store migrations applied");
        Ok(())
    }

    fn json_column<T: DeserializeOwned>(row: &PgRow, column: &str) -> Result<T> {
        let value: serde_json::Value = row.try_get(column)?;
        Ok(serde_json::from_value(value)?)
    }

    fn row_to_ramp(row: PgRow) -> Result<RampRecord> {
        let direction: String = row.try_get("type")?;
        let current_phase: String = row.try_get("current_phase")?;
        let presigned_txs: Option<serde_json::Value> = row.try_get("presigned_txs")?;

        Ok(RampRecord {
            id: RampId::from_uuid(row.try_get::<Uuid, _>("id")?),
            direction: direction.parse::<RampDirection>()?,
            current_phase: current_phase.parse::<RampPhase>()?,
            unsigned_txs: Self::json_column(&row, "unsigned_txs")?,
            presigned_txs: presigned_txs.map(serde_json::from_value).transpose()?,
            from: row.try_get("from_network")?,
            to: row.try_get("to_network")?,
            state: Self::json_column(&row, "state")?,
            payment_method: row.try_get("payment_method")?,
            quote_id: QuoteId::from_uuid(row.try_get::<Uuid, _>("quote_id")?),
            phase_history: Self::json_column(&row, "phase_history")?,
            error_logs: Self::json_column(&row, "error_logs")?,
            processing_lock: Self::json_column(&row, "processing_lock")?,
            post_complete_state: Self::json_column(&row, "post_complete_state")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl RampStore for PostgresRampStore {
    async fn create(&self, new_ramp: NewRamp) -> Result<RampRecord> {
        let ramp = RampRecord::create(new_ramp, Utc::now())?;
        let presigned_txs = ramp
            .presigned_txs
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO ramp_states (
                id, type, current_phase, unsigned_txs, presigned_txs, from_network, to_network,
                state, payment_method, quote_id, phase_history, error_logs, processing_lock,
                post_complete_state, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(ramp.id.as_uuid())
        .bind(ramp.direction.as_str())
        .bind(ramp.current_phase.as_str())
        .bind(serde_json::to_value(&ramp.unsigned_txs)?)
        .bind(presigned_txs)
        .bind(&ramp.from)
        .bind(&ramp.to)
        .bind(serde_json::to_value(&ramp.state)?)
        .bind(&ramp.payment_method)
        .bind(ramp.quote_id.as_uuid())
        .bind(serde_json::to_value(&ramp.phase_history)?)
        .bind(serde_json::to_value(&ramp.error_logs)?)
        .bind(serde_json::to_value(ramp.processing_lock)?)
        .bind(serde_json::to_value(&ramp.post_complete_state)?)
        .bind(ramp.version)
        .bind(ramp.created_at)
        .bind(ramp.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("ramp_states_pkey")
            {
                return RampStoreError::AlreadyExists(ramp.id);
            }
            RampStoreError::Database(e)
        })?;

        Ok(ramp)
    }

    async fn find_by_id(&self, id: RampId) -> Result<Option<RampRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RAMP_COLUMNS} FROM ramp_states WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_ramp).transpose()
    }

    #[tracing::instrument(skip(self, update))]
    async fn update(&self, id: RampId, update: RampUpdate) -> Result<RampRecord> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent updates of the same ramp
        let row = sqlx::query(&format!(
            "SELECT {RAMP_COLUMNS} FROM ramp_states WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RampStoreError::NotFound(id))?;

        let mut ramp = Self::row_to_ramp(row)?;
        update.apply(&mut ramp, Utc::now())?;

        let presigned_txs = ramp
            .presigned_txs
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            r#"
            UPDATE ramp_states
            SET current_phase = $2, presigned_txs = $3, state = $4, phase_history = $5,
                error_logs = $6, processing_lock = $7, post_complete_state = $8,
                version = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(ramp.current_phase.as_str())
        .bind(presigned_txs)
        .bind(serde_json::to_value(&ramp.state)?)
        .bind(serde_json::to_value(&ramp.phase_history)?)
        .bind(serde_json::to_value(&ramp.error_logs)?)
        .bind(serde_json::to_value(ramp.processing_lock)?)
        .bind(serde_json::to_value(&ramp.post_complete_state)?)
        .bind(ramp.version)
        .bind(ramp.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ramp)
    }

    #[tracing::instrument(skip_all)]
    async fn find_stale(&self, query: StaleRampQuery) -> Result<Vec<RampRecord>> {
        let mut sql = format!(
            "SELECT {RAMP_COLUMNS} FROM ramp_states \
             WHERE current_phase NOT IN ('complete', 'failed') AND updated_at < $1"
        );
        if query.require_transaction_material {
            sql.push_str(" AND presigned_txs IS NOT NULL");
        }
        sql.push_str(" ORDER BY updated_at ASC");
        if query.limit.is_some() {
            sql.push_str(" LIMIT $2");
        }

        let mut q = sqlx::query(&sql).bind(query.updated_before);
        if let Some(limit) = query.limit {
            q = q.bind(limit as i64);
        }

        let rows = q.fetch_all(&self.pool).await?;
        tracing::debug!(count = rows.len(), before = %query.updated_before, "Found stale ramps");
        rows.into_iter().map(Self::row_to_ramp).collect()
    }
}
