use std::sync::Arc;
use std::time::Duration;

use switchboard::{
    Error, ErrorKind, Result, pool::ConnectionProvider, pool::SqlxResultExt, schema,
    validation::ValidationError,
};

use crate::helpers::*;

async fn provider_with_tenant() -> Arc<ConnectionProvider> {
    let provider = memory_provider(memory_connection(), &["db_alpha"]);
    schema::initialize_tenant(&provider, &db("db_alpha"))
        .await
        .expect("Failed to create tenant schema");
    provider
}

async fn contact_count(provider: &ConnectionProvider) -> i64 {
    let mut conn = provider.acquire(&db("db_alpha")).await.unwrap();
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contacts")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    count
}

async fn insert_contact(conn: &mut sqlx::AnyConnection, id: i64) -> Result<()> {
    sqlx::query("INSERT INTO contacts (id, first_name, last_name, status) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind("Test")
        .bind("Contact")
        .bind(2_i64)
        .execute(&mut *conn)
        .await
        .sql_context("insert contact")?;
    Ok(())
}

#[tokio::test]
async fn test_commit_on_success() {
    let provider = provider_with_tenant().await;

    let inserted = provider
        .with_transaction(&db("db_alpha"), |conn| {
            Box::pin(async move {
                insert_contact(conn, 1).await?;
                insert_contact(conn, 2).await?;
                Ok(2_usize)
            })
        })
        .await
        .unwrap();

    assert_eq!(inserted, 2);
    assert_eq!(contact_count(&provider).await, 2);
}

#[tokio::test]
async fn test_rollback_when_closure_fails() {
    let provider = provider_with_tenant().await;

    let result: Result<()> = provider
        .with_transaction(&db("db_alpha"), |conn| {
            Box::pin(async move {
                insert_contact(conn, 1).await?;
                Err(ValidationError::InvalidFilter {
                    field: "status",
                    reason: "rejected after write".to_string(),
                }
                .into())
            })
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(contact_count(&provider).await, 0);
}

#[tokio::test]
async fn test_rollback_when_statement_fails() {
    let provider = provider_with_tenant().await;

    let result = provider
        .with_transaction(&db("db_alpha"), |conn| {
            Box::pin(async move {
                insert_contact(conn, 7).await?;
                // Duplicate primary key
                insert_contact(conn, 7).await?;
                Ok(())
            })
        })
        .await;

    let err = result.unwrap_err();
    assert!(err.is_database_error());
    assert!(matches!(&err, Error::Connection(e) if e.is_unique_violation()));
    assert_eq!(contact_count(&provider).await, 0);
}

#[tokio::test]
async fn test_failed_transactions_release_connections() {
    let mut connection = memory_connection();
    connection.max_connections = 1;
    connection.acquire_timeout_secs = 1;
    let provider = memory_provider(connection, &["db_alpha"]);
    schema::initialize_tenant(&provider, &db("db_alpha"))
        .await
        .unwrap();

    for _ in 0..5 {
        let result = provider
            .with_transaction(&db("db_alpha"), |conn| {
                Box::pin(async move {
                    insert_contact(conn, 1).await?;
                    insert_contact(conn, 1).await
                })
            })
            .await;
        assert!(result.is_err());
    }

    // With a single connection, any leak would make this time out
    assert_eq!(contact_count(&provider).await, 0);
    assert!(wait_until_idle(&provider).await);
}

/// A provider whose tenant pool holds a single connection.
async fn single_connection_provider() -> Arc<ConnectionProvider> {
    let mut connection = memory_connection();
    connection.max_connections = 1;
    connection.acquire_timeout_secs = 1;
    let provider = memory_provider(connection, &["db_alpha"]);
    schema::initialize_tenant(&provider, &db("db_alpha"))
        .await
        .unwrap();
    provider
}

#[tokio::test]
async fn test_panic_inside_transaction_rolls_back() {
    let provider = single_connection_provider().await;

    let task = {
        let provider = Arc::clone(&provider);
        tokio::spawn(async move {
            provider
                .with_transaction(&db("db_alpha"), |conn| {
                    Box::pin(async move {
                        insert_contact(conn, 1).await?;
                        panic!("worker crashed mid-transaction");
                    })
                })
                .await
        })
    };
    let joined: std::result::Result<Result<()>, _> = task.await;
    assert!(joined.unwrap_err().is_panic());

    assert!(wait_until_idle(&provider).await);
    assert_eq!(contact_count(&provider).await, 0);
    provider.acquire(&db("db_alpha")).await.unwrap();
}

#[tokio::test]
async fn test_cancelled_transaction_rolls_back() {
    let provider = single_connection_provider().await;

    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        provider.with_transaction(&db("db_alpha"), |conn| {
            Box::pin(async move {
                insert_contact(conn, 1).await?;
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
        }),
    )
    .await;
    assert!(outcome.is_err(), "transaction should have been cancelled");

    assert!(wait_until_idle(&provider).await);
    assert_eq!(contact_count(&provider).await, 0);
    provider.acquire(&db("db_alpha")).await.unwrap();

    // The writer slot was released with the dropped transaction
    provider
        .with_transaction(&db("db_alpha"), |conn| {
            Box::pin(async move { insert_contact(conn, 2).await })
        })
        .await
        .unwrap();
    assert_eq!(contact_count(&provider).await, 1);
}
