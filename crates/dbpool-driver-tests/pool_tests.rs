//! Connection pooling tests
//!
//! Pool behavior against real SQLite sessions: session reset on release,
//! statement options, driver registration on first use, and concurrent
//! acquire/release.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dbpool_connection::{ConnectionPool, PoolConfig};
use dbpool_core::{Connection, DatabaseDriver, DbPoolError, DriverManager, IsolationLevel, Value};
use dbpool_drivers::DriverRegistry;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::fixtures::{
    FlakyDriver, TEST_BUSY_TIMEOUT_MS, TestDatabase, catalog_only, count_items, loaded_registry,
    quiet_monitor,
};

/// Uncommitted work never leaks into the next user of a handle
#[tokio::test]
async fn test_release_rolls_back_uncommitted_work() -> Result<()> {
    let db = TestDatabase::new().await?;
    let monitor = quiet_monitor();
    let pool = ConnectionPool::new(db.target("main"), loaded_registry()?, &monitor);

    let conn = pool.acquire().await?;
    conn.execute("INSERT INTO items (label) VALUES ('draft')", &[])
        .await?;
    assert_eq!(count_items(&conn).await?, 1);
    conn.close().await?;

    let reused = pool.acquire().await?;
    assert_eq!(reused.id(), conn.id());
    assert_eq!(count_items(&reused).await?, 0);
    assert!(!reused.auto_commit().await?);
    Ok(())
}

/// Committed work is visible through every later handle
#[tokio::test]
async fn test_committed_work_persists() -> Result<()> {
    let db = TestDatabase::new().await?;
    let monitor = quiet_monitor();
    let pool = ConnectionPool::new(db.target("main"), loaded_registry()?, &monitor);

    let writer = pool.acquire().await?;
    let inserted = writer
        .execute(
            "INSERT INTO items (label) VALUES (?1)",
            &[Value::String("kept".into())],
        )
        .await?;
    assert_eq!(inserted.affected_rows, 1);
    writer.commit().await?;
    writer.close().await?;

    let other = pool.acquire_with_credentials("reader", "").await?;
    let rows = other
        .query("SELECT label FROM items", &[])
        .await
        .context("failed to read items")?;
    assert_eq!(rows.row_count(), 1);
    assert_eq!(rows.rows[0].get(0).and_then(|v| v.as_str()), Some("kept"));
    other.close().await?;
    Ok(())
}

/// A read-only target rejects writes on every handle
#[tokio::test]
async fn test_read_only_target() -> Result<()> {
    let db = TestDatabase::new().await?;
    let monitor = quiet_monitor();
    let pool = ConnectionPool::new(
        db.target("replica").with_read_only(true),
        loaded_registry()?,
        &monitor,
    );

    let conn = pool.acquire().await?;
    assert_eq!(count_items(&conn).await?, 0);
    let err = conn
        .execute("INSERT INTO items (label) VALUES ('nope')", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DbPoolError::Database(_)));
    Ok(())
}

/// Prepared statements carry the target's timeout and fetch size
#[tokio::test]
async fn test_statement_options_from_target() -> Result<()> {
    let db = TestDatabase::new().await?;
    let monitor = quiet_monitor();
    let pool = ConnectionPool::new(
        db.target("main").with_fetch_size(250),
        loaded_registry()?,
        &monitor,
    );

    let conn = pool.acquire().await?;
    let stmt = conn.prepare("SELECT id, label FROM items").await?;
    assert_eq!(
        stmt.query_timeout(),
        Some(Duration::from_millis(TEST_BUSY_TIMEOUT_MS as u64))
    );
    assert_eq!(stmt.fetch_size(), Some(250));
    assert_eq!(stmt.query(&[]).await?.row_count(), 0);
    stmt.close().await?;

    assert!(conn.prepare("SELEC nothing").await.is_err());
    Ok(())
}

#[rstest]
#[case::read_uncommitted(IsolationLevel::ReadUncommitted)]
#[case::read_committed(IsolationLevel::ReadCommitted)]
#[case::serializable(IsolationLevel::Serializable)]
#[tokio::test]
async fn test_isolation_levels_apply(#[case] level: IsolationLevel) -> Result<()> {
    let db = TestDatabase::new().await?;
    let monitor = quiet_monitor();
    let pool = ConnectionPool::new(
        db.target("main").with_isolation(level),
        loaded_registry()?,
        &monitor,
    );

    let conn = pool.acquire().await?;
    assert_eq!(count_items(&conn).await?, 0);
    Ok(())
}

/// A baseline the driver cannot honor fails the acquisition cleanly
#[tokio::test]
async fn test_unsupported_isolation_fails_acquire() -> Result<()> {
    let db = TestDatabase::new().await?;
    let monitor = quiet_monitor();
    let pool = ConnectionPool::new(
        db.target("main").with_isolation(IsolationLevel::None),
        loaded_registry()?,
        &monitor,
    );

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, DbPoolError::NotSupported(_)));
    assert_eq!(pool.stats().created(), 0);
    Ok(())
}

/// Driver properties become session pragmas
#[tokio::test]
async fn test_driver_params_are_applied() -> Result<()> {
    let db = TestDatabase::new().await?;
    let monitor = quiet_monitor();
    let pool = ConnectionPool::new(
        db.target("main").with_param("cache_size", "-4000"),
        loaded_registry()?,
        &monitor,
    );
    let conn = pool.acquire().await?;
    let rows = conn.query("PRAGMA cache_size", &[]).await?;
    assert_eq!(rows.rows[0].get(0).and_then(|v| v.as_i64()), Some(-4000));

    let broken = ConnectionPool::new(
        db.target("broken").with_param("cache size", "1"),
        loaded_registry()?,
        &monitor,
    );
    assert!(matches!(
        broken.acquire().await,
        Err(DbPoolError::Configuration(_))
    ));
    Ok(())
}

/// The first acquisition registers a cataloged driver and retries
#[tokio::test]
async fn test_first_acquire_registers_driver() -> Result<()> {
    let db = TestDatabase::new().await?;
    let monitor = quiet_monitor();
    let driver = FlakyDriver::new();
    let registry = catalog_only(driver.clone());
    assert!(!registry.has("sqlite"));

    let drivers: Arc<dyn DriverManager> = registry.clone();
    let pool = ConnectionPool::new(db.target("main"), drivers, &monitor);
    let conn = pool.acquire().await?;

    assert!(registry.has("sqlite"));
    assert_eq!(driver.connects(), 1);
    assert_eq!(count_items(&conn).await?, 0);
    Ok(())
}

/// A driver that is neither loaded nor cataloged is reported as unavailable
#[tokio::test]
async fn test_missing_driver_is_unavailable() -> Result<()> {
    let db = TestDatabase::new().await?;
    let monitor = quiet_monitor();
    let drivers: Arc<dyn DriverManager> = Arc::new(DriverRegistry::new());
    let pool = ConnectionPool::new(db.target("main"), drivers, &monitor);

    let err = pool.acquire().await.unwrap_err();
    assert!(err.is_driver_missing());
    assert_eq!(pool.size(), 0);
    Ok(())
}

#[rstest]
#[case::one_failure(1, true)]
#[case::two_failures(2, false)]
#[tokio::test]
async fn test_connect_failures_are_retried_once(
    #[case] failures: usize,
    #[case] succeeds: bool,
) -> Result<()> {
    let db = TestDatabase::new().await?;
    let monitor = quiet_monitor();
    let driver = FlakyDriver::new();
    let registry = DriverRegistry::new();
    registry.register(driver.clone());
    driver.fail_next(failures);

    let pool = ConnectionPool::new(db.target("main"), Arc::new(registry), &monitor);
    let result = pool.acquire().await;

    assert_eq!(result.is_ok(), succeeds);
    if let Err(err) = result {
        assert!(matches!(err, DbPoolError::Database(_)));
    }
    assert_eq!(driver.connects(), 2);
    Ok(())
}

/// Many tasks sharing one pool never exceed the idle bound
///
/// The tasks only read: deferred SQLite transactions upgrading to write
/// locks concurrently fail fast instead of waiting.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers() -> Result<()> {
    let db = TestDatabase::new().await?;
    let monitor = quiet_monitor();
    let config = PoolConfig::new().with_max_idle_size(4).with_parallelism(1);
    let pool = ConnectionPool::with_config(db.target("main"), config, loaded_registry()?, &monitor);

    let seed = pool.acquire().await?;
    for label in ["a", "b", "c"] {
        seed.execute(
            "INSERT INTO items (label) VALUES (?1)",
            &[Value::String(label.to_string())],
        )
        .await?;
    }
    seed.commit().await?;
    seed.close().await?;
    drop(seed);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                let conn = pool.acquire().await?;
                let count = count_items(&conn).await?;
                conn.close().await?;
                anyhow::ensure!(count == 3, "unexpected row count {}", count);
                anyhow::ensure!(pool.size() <= 4, "idle bound exceeded");
            }
            Ok::<_, anyhow::Error>(())
        }));
    }
    for result in futures::future::join_all(tasks).await {
        result.context("reader task panicked")??;
    }

    assert!(pool.size() <= 4);
    let stats = pool.stats();
    assert_eq!(stats.active(), 0);
    assert!(stats.reused() > 0);
    assert_eq!(
        stats.created(),
        stats.destroyed() + pool.size() as u64
    );
    Ok(())
}

/// Destroying a pool closes every idle session and rejects new work
#[tokio::test]
async fn test_destroy_closes_idle_sessions() -> Result<()> {
    let db = TestDatabase::new().await?;
    let monitor = quiet_monitor();
    let pool = ConnectionPool::new(db.target("main"), loaded_registry()?, &monitor);

    let idle = pool.acquire().await?;
    let held = pool.acquire().await?;
    idle.close().await?;

    pool.destroy().await;
    assert!(idle.is_destroyed());
    assert!(!held.is_destroyed());
    assert!(matches!(
        pool.acquire().await,
        Err(DbPoolError::PoolUnavailable(_))
    ));

    // A handle checked out before destroy is closed for good on release
    held.close().await?;
    assert!(held.is_destroyed());
    assert_eq!(pool.size(), 0);
    Ok(())
}

#[test]
fn test_flaky_driver_identifies_as_sqlite() {
    assert_eq!(FlakyDriver::new().id(), "sqlite");
}
