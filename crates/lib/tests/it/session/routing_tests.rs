use switchboard::{
    ErrorKind,
    tenant::{ContactFilter, TenantQuery, TicketFilter},
};

use crate::helpers::*;

#[tokio::test]
async fn test_fetch_reads_the_credential_tenant() {
    let env = TestEnv::seeded().await;
    let token = env
        .service
        .login("alice", "correct")
        .await
        .unwrap()
        .credential
        .into_token();
    let principal = env.service.authorize(&token).unwrap();
    assert_eq!(principal.tenant(), &db("db_alpha"));

    let active = env
        .service
        .fetch_tenant_data(&principal, &TenantQuery::active_contacts())
        .await
        .unwrap()
        .into_contacts()
        .unwrap();
    let names: Vec<_> = active.iter().map(|c| c.first_name.as_str()).collect();
    assert_eq!(names, vec!["Ann", "Cara"]);
}

#[tokio::test]
async fn test_routing_follows_credential_after_reassignment() {
    let env = TestEnv::seeded().await;
    let token = env
        .service
        .login("alice", "correct")
        .await
        .unwrap()
        .credential
        .into_token();

    env.reassign_user("alice", "db_beta").await;

    // The existing credential still routes to the tenant it was issued for
    let principal = env.service.authorize(&token).unwrap();
    let contacts = env
        .service
        .fetch_tenant_data(&principal, &TenantQuery::all_contacts())
        .await
        .unwrap();
    assert_eq!(contacts.len(), 3);

    // A fresh login picks up the new mapping
    let relogin = env.service.login("alice", "correct").await.unwrap();
    assert_eq!(relogin.tenant, db("db_beta"));
    assert_eq!(relogin.contact_count(), 2);
}

#[tokio::test]
async fn test_ticket_fetch_never_crosses_tenants() {
    let env = TestEnv::seeded().await;
    let alice = env.service.login("alice", "correct").await.unwrap();
    let bob = env.service.login("bob", "hunter2").await.unwrap();

    let alice = env.service.authorize(alice.credential.token()).unwrap();
    let bob = env.service.authorize(bob.credential.token()).unwrap();

    let alpha_tickets = env
        .service
        .fetch_tenant_data(&alice, &TenantQuery::tickets())
        .await
        .unwrap()
        .into_tickets()
        .unwrap();
    assert_eq!(alpha_tickets.len(), 2);
    assert!(alpha_tickets.iter().all(|t| t.subject != "Beta outage"));

    let beta_tickets = env
        .service
        .fetch_tenant_data(
            &bob,
            &TenantQuery::Tickets(TicketFilter {
                status: Some(1),
                ..TicketFilter::default()
            }),
        )
        .await
        .unwrap()
        .into_tickets()
        .unwrap();
    assert_eq!(beta_tickets.len(), 1);
    assert_eq!(beta_tickets[0].subject, "Beta outage");
}

#[tokio::test]
async fn test_invalid_query_is_rejected_before_io() {
    let env = TestEnv::seeded().await;
    let outcome = env.service.login("alice", "correct").await.unwrap();
    let principal = env.service.authorize(outcome.credential.token()).unwrap();

    let query = TenantQuery::Contacts(ContactFilter {
        name: Some("x".repeat(500)),
        ..ContactFilter::default()
    });
    let err = env
        .service
        .fetch_tenant_data(&principal, &query)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
