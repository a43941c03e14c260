use switchboard::{Clock, ErrorKind, session::SessionError};

use crate::helpers::*;

#[tokio::test]
async fn test_login_returns_credential_and_contacts() {
    let env = TestEnv::seeded().await;
    let now = env.clock.now_secs();

    let outcome = env.service.login("alice", "correct").await.unwrap();

    assert_eq!(outcome.username, "alice");
    assert_eq!(outcome.tenant, db("db_alpha"));
    assert_eq!(outcome.client_id, 1);
    assert_eq!(outcome.contact_count(), 3);
    assert_eq!(outcome.contacts.len(), 3);
    assert_eq!(outcome.contacts[0].first_name, "Ann");
    assert_eq!(outcome.credential.tenant(), &db("db_alpha"));
    assert_eq!(outcome.credential.subject(), "alice");
    assert_eq!(outcome.expires_at(), now + 15 * 60);
}

#[tokio::test]
async fn test_wrong_secret_and_unknown_user_are_indistinguishable() {
    let env = TestEnv::seeded().await;

    let wrong_secret = env.service.login("alice", "incorrect").await.unwrap_err();
    let unknown_user = env.service.login("nobody", "correct").await.unwrap_err();

    for err in [&wrong_secret, &unknown_user] {
        assert!(matches!(
            err,
            switchboard::Error::Session(SessionError::InvalidCredentials)
        ));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
    assert_eq!(wrong_secret.to_string(), unknown_user.to_string());
}

#[tokio::test]
async fn test_empty_secret_does_not_log_in_unknown_user() {
    let env = TestEnv::seeded().await;
    let err = env.service.login("nobody", "").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_username_must_match_exactly() {
    let env = TestEnv::seeded().await;
    assert!(env.service.login("Alice", "correct").await.is_err());
    assert!(env.service.login("alice ", "correct").await.is_err());
}

#[tokio::test]
async fn test_malformed_username_is_a_validation_error() {
    let env = TestEnv::seeded().await;
    let err = env.service.login("al\u{0}ice", "correct").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_each_user_is_bound_to_their_own_tenant() {
    let env = TestEnv::seeded().await;

    let bob = env.service.login("bob", "hunter2").await.unwrap();
    assert_eq!(bob.tenant, db("db_beta"));
    assert_eq!(bob.client_id, 2);
    assert_eq!(bob.contact_count(), 2);
    assert!(bob.contacts.iter().all(|c| c.first_name != "Ann"));
}
