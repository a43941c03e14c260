use std::sync::Arc;

use crate::helpers::*;

const USERS: usize = 50;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_logins_share_small_pools() {
    let mut settings = memory_settings();
    settings.connection.max_connections = 2;
    settings.connection.acquire_timeout_secs = 30;
    let env = TestEnv::with_settings(settings).await;

    env.add_tenant("Alpha Corp", "db_alpha").await;
    env.add_tenant("Beta Ltd", "db_beta").await;
    env.add_contacts(
        "db_alpha",
        vec![
            contact(1, None, "Ann", "Lee", 2, "email"),
            contact(2, None, "Ben", "Stone", 1, "phone"),
            contact(3, None, "Cara", "Annis", 2, "email"),
        ],
    )
    .await;
    env.add_contacts("db_beta", vec![contact(1, None, "Zed", "Zulu", 2, "chat")])
        .await;

    for i in 0..USERS {
        let tenant = if i % 2 == 0 { "db_alpha" } else { "db_beta" };
        env.add_user(&format!("user{i:02}"), &format!("secret{i}"), tenant)
            .await;
    }

    let mut tasks = Vec::with_capacity(USERS);
    for i in 0..USERS {
        let service = Arc::clone(&env.service);
        tasks.push(tokio::spawn(async move {
            let outcome = service
                .login(&format!("user{i:02}"), &format!("secret{i}"))
                .await
                .expect("login failed");
            (i, outcome)
        }));
    }

    for task in tasks {
        let (i, outcome) = task.await.unwrap();
        if i % 2 == 0 {
            assert_eq!(outcome.tenant, db("db_alpha"));
            assert_eq!(outcome.contact_count(), 3);
            assert!(outcome.contacts.iter().all(|c| c.first_name != "Zed"));
        } else {
            assert_eq!(outcome.tenant, db("db_beta"));
            assert_eq!(outcome.contact_count(), 1);
            assert_eq!(outcome.contacts[0].first_name, "Zed");
        }
    }

    assert!(wait_until_idle(env.provider()).await, "connections leaked");
    for status in env.provider().status().await {
        assert!(status.size <= 2, "{} grew past its limit", status.database);
    }
}
