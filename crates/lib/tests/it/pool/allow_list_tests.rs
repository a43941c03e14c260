use switchboard::{DatabaseName, ErrorKind, validation::ValidationError};

use crate::helpers::*;

#[tokio::test]
async fn test_master_is_admitted_at_construction() {
    let provider = memory_provider(memory_connection(), &[]);
    assert!(provider.is_admitted(&db("ondem_master_rb")));
    assert_eq!(provider.admitted(), vec![db("ondem_master_rb")]);
}

#[tokio::test]
async fn test_unadmitted_name_is_rejected_without_opening_a_pool() {
    let provider = memory_provider(memory_connection(), &["db_alpha"]);

    let err = provider.acquire(&db("db_gamma")).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(provider.status().await.is_empty());
}

#[tokio::test]
async fn test_unsafe_identifiers_never_reach_the_provider() {
    let provider = memory_provider(memory_connection(), &[]);

    for name in [
        "db_alpha; DROP TABLE users",
        "../etc/passwd",
        "db_alpha?mode=memory",
        "db alpha",
        "",
    ] {
        let err = DatabaseName::parse(name).unwrap_err();
        assert!(
            matches!(err, ValidationError::UnsafeIdentifier { .. }),
            "{name:?} parsed"
        );
        let err: switchboard::Error = err.into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    assert!(provider.status().await.is_empty());
}

#[tokio::test]
async fn test_registered_tenants_are_admitted_after_restart() {
    let settings = memory_settings();
    let first = TestEnv::with_settings(settings.clone()).await;
    first.add_tenant("Alpha Corp", "db_alpha").await;
    assert!(first.provider().is_admitted(&db("db_alpha")));

    // The first provider keeps the shared in-memory databases alive
    let second = TestEnv::with_settings(settings).await;
    assert!(second.provider().is_admitted(&db("db_alpha")));
    assert!(!second.provider().is_admitted(&db("db_beta")));
}
