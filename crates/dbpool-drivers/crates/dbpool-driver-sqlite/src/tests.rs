use super::*;
use dbpool_core::{
    Connection, Credentials, DatabaseDriver, DatabaseTarget, DbPoolError, IsolationLevel, Value,
};
use pretty_assertions::assert_eq;
use std::time::Duration;

async fn count_rows(conn: &dyn Connection) -> i64 {
    let result = conn.query("SELECT COUNT(*) FROM items", &[]).await.unwrap();
    result.rows[0].get(0).and_then(Value::as_i64).unwrap()
}

async fn with_items(conn: &dyn Connection) {
    conn.execute(
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        &[],
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_query_round_trips_values() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    with_items(&conn).await;

    let inserted = conn
        .execute(
            "INSERT INTO items (name) VALUES (?)",
            &[Value::String("alpha".into())],
        )
        .await
        .unwrap();
    assert_eq!(inserted.affected_rows, 1);
    assert_eq!(inserted.last_insert_id, Some(1));

    let result = conn
        .query("SELECT id, name FROM items WHERE id = ?", &[Value::Int64(1)])
        .await
        .unwrap();
    assert_eq!(result.column_count(), 2);
    assert_eq!(result.columns[1].data_type, "TEXT");
    assert_eq!(result.rows[0].get_by_name("name"), Some(&Value::String("alpha".into())));
}

#[tokio::test]
async fn test_manual_commit_rollback_discards_work() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    with_items(&conn).await;

    conn.set_auto_commit(false).await.unwrap();
    assert!(!conn.auto_commit().await.unwrap());

    conn.execute("INSERT INTO items (name) VALUES ('a')", &[])
        .await
        .unwrap();
    assert!(conn.in_transaction());
    conn.rollback().await.unwrap();
    assert!(!conn.in_transaction());
    assert_eq!(count_rows(&conn).await, 0);

    conn.execute("INSERT INTO items (name) VALUES ('b')", &[])
        .await
        .unwrap();
    conn.commit().await.unwrap();
    conn.rollback().await.unwrap();
    assert_eq!(count_rows(&conn).await, 1);
}

#[tokio::test]
async fn test_enabling_auto_commit_commits_pending_work() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    with_items(&conn).await;

    conn.set_auto_commit(false).await.unwrap();
    conn.execute("INSERT INTO items (name) VALUES ('a')", &[])
        .await
        .unwrap();
    conn.set_auto_commit(true).await.unwrap();

    assert!(!conn.in_transaction());
    conn.rollback().await.unwrap();
    assert_eq!(count_rows(&conn).await, 1);
}

#[tokio::test]
async fn test_prepared_statement_keeps_options() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    with_items(&conn).await;

    let mut stmt = conn
        .prepare("INSERT INTO items (name) VALUES (?)")
        .await
        .unwrap();
    stmt.set_query_timeout(Duration::from_millis(250)).unwrap();
    stmt.set_fetch_size(32).unwrap();
    assert_eq!(stmt.query_timeout(), Some(Duration::from_millis(250)));
    assert_eq!(stmt.fetch_size(), Some(32));

    for name in ["x", "y", "z"] {
        stmt.execute(&[Value::String(name.into())]).await.unwrap();
    }
    stmt.close().await.unwrap();
    assert_eq!(count_rows(&conn).await, 3);
}

#[tokio::test]
async fn test_prepare_reports_syntax_errors() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    let err = conn.prepare("SELEC nothing").await.err().unwrap();
    assert!(matches!(err, DbPoolError::Database(_)));
}

#[tokio::test]
async fn test_closed_connection_rejects_work() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    assert!(!conn.is_closed());

    conn.close().await.unwrap();
    conn.close().await.unwrap();
    assert!(conn.is_closed());

    let err = conn.query("SELECT 1", &[]).await.unwrap_err();
    assert!(matches!(err, DbPoolError::ConnectionClosed));
    assert!(conn.auto_commit().await.is_err());
}

#[tokio::test]
async fn test_read_only_blocks_writes() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    with_items(&conn).await;

    conn.set_read_only(true).await.unwrap();
    assert!(
        conn.execute("INSERT INTO items (name) VALUES ('a')", &[])
            .await
            .is_err()
    );
    conn.set_read_only(false).await.unwrap();
    conn.execute("INSERT INTO items (name) VALUES ('a')", &[])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_isolation_levels() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    conn.set_transaction_isolation(IsolationLevel::ReadUncommitted)
        .await
        .unwrap();
    conn.set_transaction_isolation(IsolationLevel::Serializable)
        .await
        .unwrap();
    let err = conn
        .set_transaction_isolation(IsolationLevel::None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbPoolError::NotSupported(_)));
}

#[test]
fn test_rejects_odd_pragma_names() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    assert!(conn.set_pragma("cache_size; DROP", "1").is_err());
    assert!(conn.set_pragma("cache_size", "-2000").is_ok());
}

#[tokio::test]
async fn test_driver_applies_target_params() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("driver.db");
    let url = format!("sqlite://{}", path.display());
    let target = DatabaseTarget::new("main", "sqlite", &url)
        .with_busy_timeout_ms(500)
        .with_param("user_version", "7");

    let driver = SqliteDriver::new();
    assert_eq!(driver.id(), "sqlite");
    let conn = driver
        .connect(&target.connection_url(), &Credentials::default(), &target)
        .await
        .unwrap();

    let result = conn.query("PRAGMA user_version", &[]).await.unwrap();
    assert_eq!(result.rows[0].get(0), Some(&Value::Int64(7)));
    assert!(path.exists());
}

#[tokio::test]
async fn test_driver_fails_for_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let url = dir.path().join("missing").join("x.db");
    let target = DatabaseTarget::new("main", "sqlite", &url.display().to_string());

    let result = SqliteDriver::new()
        .connect(&target.connection_url(), &Credentials::default(), &target)
        .await;
    assert!(matches!(result, Err(DbPoolError::Database(_))));
}

#[test]
fn test_cancel_handle_is_available() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    assert!(conn.cancel_handle().is_some());
}
