use std::sync::Arc;

use switchboard::{
    ErrorKind,
    registry::{RegistryError, TenantResolver},
    secret::SecretVerifier,
};

use crate::helpers::*;

#[tokio::test]
async fn test_client_ids_are_assigned_in_order() {
    let env = TestEnv::new().await;

    let alpha = env
        .registry
        .register_tenant("Alpha Corp", &db("db_alpha"))
        .await
        .unwrap();
    let beta = env
        .registry
        .register_tenant("Beta Ltd", &db("db_beta"))
        .await
        .unwrap();

    assert_eq!(alpha.client_id, 1);
    assert_eq!(beta.client_id, 2);
    assert_eq!(beta.name, "Beta Ltd");
    assert!(env.provider().is_admitted(&db("db_beta")));
}

#[tokio::test]
async fn test_duplicate_tenant_is_a_conflict() {
    let env = TestEnv::new().await;
    env.add_tenant("Alpha Corp", "db_alpha").await;

    let err = env
        .registry
        .register_tenant("Alpha Again", &db("db_alpha"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(env.registry.list_tenants().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_master_cannot_be_registered_as_tenant() {
    let env = TestEnv::new().await;
    let err = env
        .registry
        .register_tenant("Sneaky", &db("ondem_master_rb"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_user_secret_is_stored_hashed() {
    let env = TestEnv::new().await;
    env.add_tenant("Alpha Corp", "db_alpha").await;

    let profile = env
        .registry
        .register_user("alice", "correct", &db("db_alpha"), env.verifier.as_ref())
        .await
        .unwrap();
    assert_eq!(profile.client_id, 1);
    assert_eq!(profile.tenant, db("db_alpha"));

    let record = env.registry.resolve_by_username("alice").await.unwrap();
    assert_ne!(record.secret_hash, "correct");
    assert!(env.verifier.verify("correct", &record.secret_hash));
}

#[tokio::test]
async fn test_duplicate_user_is_a_conflict() {
    let env = TestEnv::seeded().await;

    let err = env
        .registry
        .register_user("alice", "other", &db("db_beta"), env.verifier.as_ref())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        switchboard::Error::Registry(RegistryError::DuplicateUser { .. })
    ));

    // The original mapping is untouched
    let record = env.registry.resolve_by_username("alice").await.unwrap();
    assert_eq!(record.tenant, db("db_alpha"));
}

#[tokio::test]
async fn test_user_for_unknown_tenant_is_rejected() {
    let env = TestEnv::new().await;
    let err = env
        .registry
        .register_user("carol", "pw", &db("db_gamma"), env.verifier.as_ref())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        switchboard::Error::Registry(RegistryError::TenantNotFound { .. })
    ));
    assert!(
        env.registry
            .resolve_by_username("carol")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_user_registration_alongside_logins() {
    let env = TestEnv::seeded().await;

    let mut registrations = Vec::new();
    let mut logins = Vec::new();
    for i in 0..10 {
        let registry = env.registry.clone();
        let verifier = Arc::clone(&env.verifier);
        registrations.push(tokio::spawn(async move {
            let tenant = if i % 2 == 0 { "db_alpha" } else { "db_beta" };
            registry
                .register_user(&format!("new{i}"), "pw", &db(tenant), verifier.as_ref())
                .await
        }));
        let service = Arc::clone(&env.service);
        logins.push(tokio::spawn(
            async move { service.login("alice", "correct").await },
        ));
    }

    for task in registrations {
        task.await.unwrap().expect("registration failed");
    }
    for task in logins {
        assert_eq!(task.await.unwrap().unwrap().tenant, db("db_alpha"));
    }

    for i in 0..10 {
        let record = env
            .registry
            .resolve_by_username(&format!("new{i}"))
            .await
            .unwrap();
        let expected = if i % 2 == 0 { 1 } else { 2 };
        assert_eq!(record.client_id, expected);
    }
    assert!(wait_until_idle(env.provider()).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tenant_registration_assigns_distinct_ids() {
    let env = TestEnv::new().await;

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let registry = env.registry.clone();
            tokio::spawn(async move {
                registry
                    .register_tenant(&format!("Tenant {i}"), &db(&format!("db_t{i}")))
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().expect("tenant registration failed").client_id);
    }
    ids.sort_unstable();
    assert_eq!(ids, (1..=8).collect::<Vec<i64>>());
    assert_eq!(env.registry.list_tenants().await.unwrap().len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_registrations_of_one_username() {
    let env = TestEnv::seeded().await;

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let registry = env.registry.clone();
            let verifier = Arc::clone(&env.verifier);
            tokio::spawn(async move {
                registry
                    .register_user("carol", "pw", &db("db_beta"), verifier.as_ref())
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(profile) => {
                assert_eq!(profile.tenant, db("db_beta"));
                created += 1;
            }
            Err(err) => assert!(matches!(
                err,
                switchboard::Error::Registry(RegistryError::DuplicateUser { .. })
            )),
        }
    }
    assert_eq!(created, 1);
}
