// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for the credential store invariants.

use std::sync::Arc;

use proptest::prelude::*;

use aeris_store::{Elevation, NewUser, RegistryStore, RequestStatus, Role, StoreError};

fn arb_name() -> impl Strategy<Value = String> {
    "[A-Za-z ]{3,24}"
}

fn arb_email() -> impl Strategy<Value = String> {
    "[a-z0-9]{3,12}@[a-z]{2,8}\\.com"
}

fn arb_reason() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[A-Za-z0-9 ]{0,60}")
}

fn user_input(name: &str, email: &str) -> NewUser {
    NewUser {
        name: name.to_string(),
        email: email.to_string(),
        password_hash: "$2b$10$fakehashfakehashfakehash".to_string(),
    }
}

proptest! {
    /// However many times the same email is registered, exactly one user
    /// record exists for it afterwards.
    #[test]
    fn email_registration_is_unique(
        name in arb_name(),
        email in arb_email(),
        attempts in 2usize..6,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let store = RegistryStore::open(dir.path().join("registry.redb")).unwrap();

            let mut created = 0usize;
            for _ in 0..attempts {
                match store.create_user(user_input(&name, &email), Elevation::None).await {
                    Ok(_) => created += 1,
                    Err(StoreError::EmailExists) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }

            prop_assert_eq!(created, 1);
            prop_assert_eq!(store.list_users(None).await.unwrap().len(), 1);
            Ok(())
        })?;
    }

    /// No interleaving of submissions and resolutions ever yields two
    /// pending requests for one user, and resolved requests stay terminal.
    #[test]
    fn at_most_one_pending_request(
        reasons in proptest::collection::vec(arb_reason(), 1..8),
        approvals in proptest::collection::vec(any::<bool>(), 1..8),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let store = RegistryStore::open(dir.path().join("registry.redb")).unwrap();
            let user = store
                .create_user(user_input("Prop User", "prop@x.com"), Elevation::None)
                .await
                .unwrap();

            let mut approvals = approvals.into_iter();
            for reason in reasons {
                // First submission wins, the second in a row must conflict.
                let request = store.submit_request(user.id, reason.clone()).await.unwrap();
                match store.submit_request(user.id, reason).await {
                    Err(StoreError::DuplicateRequest) => {}
                    other => panic!("expected DuplicateRequest, got {other:?}"),
                }

                let pending = store
                    .list_requests()
                    .await
                    .unwrap()
                    .into_iter()
                    .filter(|r| r.status == RequestStatus::Pending)
                    .count();
                prop_assert_eq!(pending, 1);

                let approve = approvals.next().unwrap_or(false);
                store.resolve_request(request.id, approve).await.unwrap();

                // Terminal: any further transition must be refused.
                match store.resolve_request(request.id, approve).await {
                    Err(StoreError::RequestNotPending(_)) => {}
                    other => panic!("expected RequestNotPending, got {other:?}"),
                }
            }

            let pending = store
                .list_requests()
                .await
                .unwrap()
                .into_iter()
                .filter(|r| r.status == RequestStatus::Pending)
                .count();
            prop_assert_eq!(pending, 0);
            Ok(())
        })?;
    }
}

/// Of N simultaneous first-admin registration attempts, exactly one wins
/// the bootstrap; the rest fall through to the keyed path and are refused.
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_bootstrap_elects_one_regulator() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RegistryStore::open(dir.path().join("registry.redb")).unwrap());

    let mut handles = Vec::new();
    for n in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .create_user(
                    user_input("Racer", &format!("racer{n}@x.com")),
                    Elevation::Requested {
                        bootstrap_enabled: true,
                        key_valid: false,
                    },
                )
                .await
        }));
    }

    let mut winners = 0usize;
    let mut denied = 0usize;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(user) => {
                assert_eq!(user.role, Role::Regulator);
                winners += 1;
            }
            Err(StoreError::ElevationDenied) => denied += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(denied, 7);
    assert!(store.has_admin().await.unwrap());
    assert_eq!(store.list_users(None).await.unwrap().len(), 1);
}

/// N simultaneous submissions by the same user admit exactly one pending
/// request; the rest conflict.
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_submissions_admit_one_pending() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RegistryStore::open(dir.path().join("registry.redb")).unwrap());
    let user = store
        .create_user(user_input("Racer", "racer@x.com"), Elevation::None)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.submit_request(user.id, None).await
        }));
    }

    let mut accepted = 0usize;
    let mut conflicts = 0usize;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(request) => {
                assert_eq!(request.status, RequestStatus::Pending);
                accepted += 1;
            }
            Err(StoreError::DuplicateRequest) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(conflicts, 7);
    let pending = store
        .list_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.status == RequestStatus::Pending)
        .count();
    assert_eq!(pending, 1);
}
