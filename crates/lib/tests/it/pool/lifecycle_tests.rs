use std::sync::Arc;

use switchboard::{
    ErrorKind,
    config::{ConnectionSettings, ConnectionTarget},
    pool::{ConnectionError, ConnectionProvider},
    schema,
};

use crate::helpers::*;

#[tokio::test]
async fn test_acquire_times_out_when_pool_is_exhausted() {
    let mut connection = memory_connection();
    connection.max_connections = 1;
    connection.acquire_timeout_secs = 1;
    let provider = memory_provider(connection, &["db_alpha"]);

    let held = provider.acquire(&db("db_alpha")).await.unwrap();
    assert_eq!(held.database(), &db("db_alpha"));

    let err = provider.acquire(&db("db_alpha")).await.unwrap_err();
    assert!(err.is_timeout_error());
    assert_eq!(err.kind(), ErrorKind::Unavailable);

    drop(held);
    assert!(provider.acquire(&db("db_alpha")).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_first_use_keeps_one_pool() {
    let provider = memory_provider(memory_connection(), &["db_alpha"]);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let provider = Arc::clone(&provider);
        tasks.push(tokio::spawn(async move {
            let _conn = provider.acquire(&db("db_alpha")).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let status = provider.status().await;
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].database, db("db_alpha"));
    assert!(status[0].size <= 5);
    assert!(wait_until_idle(&provider).await);
}

#[tokio::test]
async fn test_closed_provider_refuses_acquisition() {
    let provider = memory_provider(memory_connection(), &["db_alpha"]);
    provider.acquire(&db("db_alpha")).await.unwrap();

    provider.close().await;

    let err = provider.acquire(&db("db_alpha")).await.unwrap_err();
    assert!(err.is_database_error());
    assert!(provider.status().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_racing_first_use_leaves_no_pools() {
    let names: Vec<String> = (0..24).map(|i| format!("db_race{i}")).collect();
    let tenants: Vec<&str> = names.iter().map(String::as_str).collect();
    let provider = memory_provider(memory_connection(), &tenants);

    let tasks: Vec<_> = names
        .iter()
        .map(|name| {
            let provider = Arc::clone(&provider);
            let database = db(name);
            tokio::spawn(async move { provider.acquire(&database).await.map(drop) })
        })
        .collect();
    tokio::task::yield_now().await;
    provider.close().await;

    for task in tasks {
        if let Err(err) = task.await.unwrap() {
            assert!(matches!(
                err,
                switchboard::Error::Connection(ConnectionError::Closed)
            ));
        }
    }

    // A pool that finished opening after close() must not stay cached
    assert!(provider.status().await.is_empty());
    assert!(provider.acquire(&db("db_race0")).await.is_err());
}

#[tokio::test]
async fn test_sqlite_directory_target_creates_files() {
    let dir = tempfile::tempdir().unwrap();
    let settings = ConnectionSettings::new(ConnectionTarget::SqliteDir {
        dir: dir.path().to_path_buf(),
    });
    let provider = ConnectionProvider::new(settings, db("ondem_master_rb")).unwrap();
    provider.admit(&db("db_alpha"));

    schema::initialize_master(&provider).await.unwrap();
    schema::initialize_tenant(&provider, &db("db_alpha"))
        .await
        .unwrap();

    assert!(dir.path().join("ondem_master_rb.db").exists());
    assert!(dir.path().join("db_alpha.db").exists());

    let mut conn = provider.acquire(&db("db_alpha")).await.unwrap();
    let tables = schema::table_names(&mut conn, true).await.unwrap();
    assert_eq!(tables, vec!["contacts", "schema_version", "tickets"]);
    drop(conn);
    provider.close().await;
}

#[tokio::test]
async fn test_schema_initialization_is_idempotent() {
    let provider = memory_provider(memory_connection(), &["db_alpha"]);
    schema::initialize_tenant(&provider, &db("db_alpha"))
        .await
        .unwrap();
    schema::initialize_tenant(&provider, &db("db_alpha"))
        .await
        .unwrap();

    let mut conn = provider.acquire(&db("db_alpha")).await.unwrap();
    let (version,): (i64,) = sqlx::query_as("SELECT version FROM schema_version")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(version, schema::SCHEMA_VERSION);
}
