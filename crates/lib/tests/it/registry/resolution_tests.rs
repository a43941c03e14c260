use switchboard::{
    ErrorKind,
    registry::{RegistryError, TenantResolver},
};

use crate::helpers::*;

#[tokio::test]
async fn test_resolve_returns_tenant_and_client_id() {
    let env = TestEnv::seeded().await;

    let record = env.registry.resolve_by_username("alice").await.unwrap();
    assert_eq!(record.username, "alice");
    assert_eq!(record.tenant, db("db_alpha"));
    assert_eq!(record.client_id, 1);
    assert!(record.secret_hash.starts_with("$argon2id$"));

    let bob = env.registry.resolve_by_username("bob").await.unwrap();
    assert_eq!(bob.tenant, db("db_beta"));
    assert_eq!(bob.client_id, 2);
}

#[tokio::test]
async fn test_resolve_is_case_sensitive() {
    let env = TestEnv::seeded().await;
    let err = env.registry.resolve_by_username("Alice").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let env = TestEnv::seeded().await;

    let err = env.registry.resolve_by_username("mallory").await.unwrap_err();
    assert!(matches!(
        err,
        switchboard::Error::Registry(RegistryError::UserNotFound { .. })
    ));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_invalid_username_is_rejected_before_lookup() {
    let env = TestEnv::seeded().await;
    let err = env.registry.resolve_by_username("").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_list_tenants_is_ordered_by_client_id() {
    let env = TestEnv::seeded().await;

    let tenants = env.registry.list_tenants().await.unwrap();
    let names: Vec<_> = tenants.iter().map(|t| t.database.as_str()).collect();
    assert_eq!(names, vec!["db_alpha", "db_beta"]);
    assert_eq!(tenants[0].name, "Alpha Corp");
}

#[tokio::test]
async fn test_unsafe_stored_database_name_is_never_admitted() {
    let env = TestEnv::seeded().await;
    {
        let mut conn = env
            .provider()
            .acquire(env.provider().master())
            .await
            .unwrap();
        sqlx::query("INSERT INTO tenants (client_id, name, database_name) VALUES ($1, $2, $3)")
            .bind(99_i64)
            .bind("Broken")
            .bind("db-bad;--")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO users (username, password_hash, client_id) VALUES ($1, $2, $3)")
            .bind("mallory")
            .bind("x")
            .bind(99_i64)
            .execute(&mut *conn)
            .await
            .unwrap();
    }

    let err = env.registry.resolve_by_username("mallory").await.unwrap_err();
    assert!(matches!(
        err,
        switchboard::Error::Registry(RegistryError::CorruptRecord { .. })
    ));

    let tenants = env.registry.list_tenants().await.unwrap();
    assert_eq!(tenants.len(), 2);
    assert!(
        env.provider()
            .admitted()
            .iter()
            .all(|name| !name.as_str().contains("bad"))
    );
}

#[tokio::test]
async fn test_user_record_debug_hides_hash() {
    let env = TestEnv::seeded().await;
    let record = env.registry.resolve_by_username("alice").await.unwrap();
    let debug = format!("{record:?}");
    assert!(!debug.contains(&record.secret_hash));
    assert!(debug.contains("db_alpha"));
}
