//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p ramp-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::QuoteId;
use domain::{
    NewRamp, PhaseHistoryEntry, ProcessingLock, RampDirection, RampErrorLog, RampPhase,
    StateMetadata, UnsignedTx,
};
use ramp_store::{
    PostgresRampStore, RampId, RampStore, RampStoreError, RampStoreExt, RampUpdate,
    StaleRampQuery,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_ramp_states_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and a cleared table
async fn get_test_store() -> PostgresRampStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE ramp_states")
        .execute(&pool)
        .await
        .unwrap();

    PostgresRampStore::new(pool)
}

async fn backdate(store: &PostgresRampStore, id: RampId, minutes: i64) {
    sqlx::query("UPDATE ramp_states SET updated_at = $2 WHERE id = $1")
        .bind(id.as_uuid())
        .bind(Utc::now() - Duration::minutes(minutes))
        .execute(store.pool())
        .await
        .unwrap();
}

fn started_ramp() -> NewRamp {
    NewRamp::new(RampDirection::Sell, QuoteId::new())
        .route("polygon", "pix")
        .payment_method("pix")
        .presigned_txs(vec![
            UnsignedTx::new(RampPhase::NablaApprove, "pendulum", "5Ephemeral", 0, serde_json::json!("0x01")),
            UnsignedTx::new(RampPhase::NablaSwap, "pendulum", "5Ephemeral", 1, serde_json::json!("0x02")),
        ])
}

#[tokio::test]
async fn create_and_find_ramp() {
    let store = get_test_store().await;

    let created = store.create(started_ramp()).await.unwrap();
    let found = store.find_by_id(created.id).await.unwrap().unwrap();

    assert_eq!(found.id, created.id);
    assert_eq!(found.direction, RampDirection::Sell);
    assert_eq!(found.current_phase, RampPhase::Initial);
    assert_eq!(found.phase_history.len(), 1);
    assert_eq!(found.presigned_txs.as_ref().unwrap().len(), 2);
    assert_eq!(found.presigned_tx(RampPhase::NablaSwap).unwrap().nonce, 1);
    assert_eq!(found.from, "polygon");
    assert_eq!(found.quote_id, created.quote_id);
    assert_eq!(found.version, 1);
    assert!(!found.processing_lock.locked);
}

#[tokio::test]
async fn create_duplicate_is_rejected() {
    let store = get_test_store().await;
    let id = RampId::new();

    store.create(started_ramp().with_id(id)).await.unwrap();
    let result = store.create(started_ramp().with_id(id)).await;

    assert!(matches!(result, Err(RampStoreError::AlreadyExists(dup)) if dup == id));
}

#[tokio::test]
async fn find_missing_ramp() {
    let store = get_test_store().await;
    assert!(store.find_by_id(RampId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn update_returns_post_write_record() {
    let store = get_test_store().await;
    let ramp = store.create(started_ramp()).await.unwrap();

    let mut patch = StateMetadata::new();
    patch.insert("fundEphemeralHash", "0xabc").unwrap();

    let updated = store
        .update(
            ramp.id,
            RampUpdate::new()
                .transition(PhaseHistoryEntry::new(RampPhase::FundEphemeral, None))
                .merge_state(patch),
        )
        .await
        .unwrap();

    assert_eq!(updated.current_phase, RampPhase::FundEphemeral);
    assert_eq!(updated.version, 2);

    let reloaded = store.reload(ramp.id).await.unwrap();
    assert_eq!(reloaded.current_phase, RampPhase::FundEphemeral);
    assert_eq!(reloaded.phase_history.len(), 2);
    assert_eq!(reloaded.state.get_str("fundEphemeralHash"), Some("0xabc"));
    assert_eq!(reloaded.version, 2);
}

#[tokio::test]
async fn lock_acquisition_is_versioned() {
    let store = get_test_store().await;
    let ramp = store.create(started_ramp()).await.unwrap();

    let first = store
        .update(
            ramp.id,
            RampUpdate::new()
                .processing_lock(ProcessingLock::acquired_at(Utc::now()))
                .expect_version(ramp.version),
        )
        .await;
    assert!(first.is_ok());

    // A second acquirer that read the same version loses
    let second = store
        .update(
            ramp.id,
            RampUpdate::new()
                .processing_lock(ProcessingLock::acquired_at(Utc::now()))
                .expect_version(ramp.version),
        )
        .await;
    assert!(matches!(
        second,
        Err(RampStoreError::ConcurrencyConflict { expected: 1, actual: 2, .. })
    ));

    let reloaded = store.reload(ramp.id).await.unwrap();
    assert!(reloaded.processing_lock.locked);
    assert!(reloaded.processing_lock.locked_at.is_some());
}

#[tokio::test]
async fn terminal_ramp_rejects_transition() {
    let store = get_test_store().await;
    let ramp = store.create(started_ramp()).await.unwrap();

    store
        .update(
            ramp.id,
            RampUpdate::new().transition(PhaseHistoryEntry::new(RampPhase::Complete, None)),
        )
        .await
        .unwrap();

    let result = store
        .update(
            ramp.id,
            RampUpdate::new().transition(PhaseHistoryEntry::new(RampPhase::NablaSwap, None)),
        )
        .await;
    assert!(matches!(result, Err(RampStoreError::Domain(_))));

    let reloaded = store.reload(ramp.id).await.unwrap();
    assert_eq!(reloaded.current_phase, RampPhase::Complete);
    assert_eq!(reloaded.phase_history.len(), 2);
}

#[tokio::test]
async fn error_logs_are_appended() {
    let store = get_test_store().await;
    let ramp = store.create(started_ramp()).await.unwrap();

    store
        .append_error_log(
            ramp.id,
            RampErrorLog::new(RampPhase::NablaSwap, "rpc timeout").recoverable(true),
        )
        .await
        .unwrap();

    let reloaded = store.reload(ramp.id).await.unwrap();
    let last = reloaded.error_logs.last().unwrap();
    assert_eq!(last.error, "rpc timeout");
    assert_eq!(last.phase, RampPhase::NablaSwap);
    assert!(last.recoverable);
}

#[tokio::test]
async fn find_stale_ramps() {
    let store = get_test_store().await;

    let stale = store.create(started_ramp()).await.unwrap();
    backdate(&store, stale.id, 30).await;

    let _fresh = store.create(started_ramp()).await.unwrap();

    let unstarted = store
        .create(NewRamp::new(RampDirection::Buy, QuoteId::new()).route("pix", "polygon"))
        .await
        .unwrap();
    backdate(&store, unstarted.id, 30).await;

    let failed = store.create(started_ramp()).await.unwrap();
    store
        .update(
            failed.id,
            RampUpdate::new().transition(PhaseHistoryEntry::new(RampPhase::Failed, None)),
        )
        .await
        .unwrap();
    backdate(&store, failed.id, 30).await;

    let found = store
        .find_stale(StaleRampQuery::older_than(Duration::minutes(10)))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, stale.id);

    let found = store
        .find_stale(StaleRampQuery::older_than(Duration::minutes(10)).include_unstarted())
        .await
        .unwrap();
    assert_eq!(found.len(), 2);

    let found = store
        .find_stale(
            StaleRampQuery::older_than(Duration::minutes(10))
                .include_unstarted()
                .limit(1),
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}
