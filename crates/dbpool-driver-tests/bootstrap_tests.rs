//! Bootstrap Tests
//!
//! A host process's view: configuration loaded from a TOML file, pools
//! started through `DatabasePools`, background idle eviction, teardown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dbpool_connection::{DatabasePools, MonitorState};
use dbpool_core::{Connection, DbPoolError, PoolsConfig};
use dbpool_drivers::DriverRegistry;
use pretty_assertions::assert_eq;

use crate::fixtures::{TestDatabase, count_items};

fn write_config(db: &TestDatabase, dir: &tempfile::TempDir) -> Result<std::path::PathBuf> {
    let path = dir.path().join("pools.toml");
    let raw = format!(
        r#"
[monitor]
entry_pause_ms = 0
pool_pause_ms = 5
idle_pause_ms = 10

[targets.main]
driver = "sqlite"
url = "{url}"
busy_timeout = 2000
pool_timeout = 100

[targets.archive]
driver = "sqlite"
url = "{url}"
read_only = true
pooling_size = 2
"#,
        url = db.url()
    );
    std::fs::write(&path, raw).context("failed to write config")?;
    Ok(path)
}

async fn started(db: &TestDatabase, dir: &tempfile::TempDir) -> Result<DatabasePools> {
    let config = PoolsConfig::from_path(write_config(db, dir)?)?;
    let pools = DatabasePools::new(Arc::new(DriverRegistry::with_defaults()));
    pools.startup(&config)?;
    Ok(pools)
}

#[tokio::test]
async fn test_startup_from_config_file() -> Result<()> {
    let db = TestDatabase::new().await?;
    let dir = tempfile::tempdir()?;
    let pools = started(&db, &dir).await?;

    assert_eq!(pools.names()?, vec!["archive", "main"]);
    let main = pools.target("main")?;
    assert_eq!(main.busy_timeout_ms, Some(2000));
    assert_eq!(main.idle_timeout_ms, Some(100));
    assert_eq!(pools.target("archive")?.max_idle_size, Some(2));
    assert_eq!(pools.monitor()?.state(), MonitorState::Running);

    let json = pools.registry()?.to_json()?;
    assert_eq!(json[1]["name"], "main");
    assert_eq!(json[1]["driver"], "sqlite");

    pools.destroy().await;
    Ok(())
}

#[tokio::test]
async fn test_connections_through_bootstrap() -> Result<()> {
    let db = TestDatabase::new().await?;
    let dir = tempfile::tempdir()?;
    let pools = started(&db, &dir).await?;

    // The registry only catalogs sqlite; the first acquisition loads it
    let writer = pools.connection("main").await?;
    writer
        .execute("INSERT INTO items (label) VALUES ('boot')", &[])
        .await?;
    writer.commit().await?;
    writer.close().await?;

    let reader = pools.connection("archive").await?;
    assert_eq!(count_items(&reader).await?, 1);
    assert!(
        reader
            .execute("DELETE FROM items", &[])
            .await
            .is_err()
    );
    reader.close().await?;

    let adhoc = pools
        .connect_unpooled("sqlite", &db.url(), None, None)
        .await?;
    assert_eq!(count_items(&adhoc).await?, 1);
    adhoc.close().await?;
    assert!(adhoc.is_destroyed());

    pools.destroy().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_eviction() -> Result<()> {
    let db = TestDatabase::new().await?;
    let dir = tempfile::tempdir()?;
    let pools = started(&db, &dir).await?;
    let pool = pools.registry()?.get("main")?;

    let conn = pools.connection("main").await?;
    conn.close().await?;
    assert_eq!(pool.size(), 1);

    let mut evicted = false;
    for _ in 0..200 {
        if pool.size() == 0 {
            evicted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(evicted, "idle handle was never evicted");
    assert!(conn.is_destroyed());

    pools.destroy().await;
    Ok(())
}

#[tokio::test]
async fn test_teardown() -> Result<()> {
    let db = TestDatabase::new().await?;
    let dir = tempfile::tempdir()?;
    let pools = started(&db, &dir).await?;
    let monitor = pools.monitor()?;

    let conn = pools.connection("main").await?;
    conn.close().await?;

    pools.destroy().await;
    assert!(monitor.is_stop());
    assert!(conn.is_destroyed());
    assert!(matches!(
        pools.connection("main").await,
        Err(DbPoolError::RegistryDestroyed)
    ));
    assert!(!pools.contains("main"));
    Ok(())
}
