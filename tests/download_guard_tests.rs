//! Download guard tests against an on-disk database
//!
//! Each test opens its own SQLite file so concurrent `begin` calls go through
//! the same locking path as the server.

use std::time::Duration;

use tempfile::TempDir;

use dataweaver::config::DatabaseConfig;
use dataweaver::guard::{CompletionQueue, DownloadGuard, TRANSFER_ABORTED};
use dataweaver::types::{Role, UserStatus};
use dataweaver::{AppError, DownloadStatus, Store};

struct Fixture {
    store: Store,
    guard: DownloadGuard,
    user_id: i64,
    resource_id: i64,
    _dir: TempDir,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&DatabaseConfig::new(dir.path().join("guard.db")))
        .await
        .unwrap();
    let user_id = store
        .create_user("downloader", "not-a-real-hash", Role::NormalUser, UserStatus::Active)
        .await
        .unwrap();
    let resource = store
        .register_resource("Quarterly device bundle", "bundle.zip", 1024, user_id)
        .await
        .unwrap();

    Fixture {
        guard: DownloadGuard::new(store.clone(), None),
        store,
        user_id,
        resource_id: resource.id,
        _dir: dir,
    }
}

async fn downloading_rows(store: &Store, user_id: i64) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM download_sessions WHERE user_id = ? AND status = 'downloading'",
    )
    .bind(user_id)
    .fetch_one(store.pool())
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_begin_admits_exactly_one() {
    let fx = fixture().await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let guard = fx.guard.clone();
        let (user_id, resource_id) = (fx.user_id, fx.resource_id);
        handles.push(tokio::spawn(async move { guard.begin(user_id, resource_id).await }));
    }

    let mut admitted = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(AppError::Conflict { .. }) => refused += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(refused, 9);
    assert_eq!(downloading_rows(&fx.store, fx.user_id).await, 1);

    let resource = fx.store.find_resource(fx.resource_id).await.unwrap().unwrap();
    assert_eq!(resource.download_count, 1);
}

#[tokio::test]
async fn test_begin_conflict_reset_begin() {
    let fx = fixture().await;

    let manual = fx
        .store
        .register_resource("Installation manual", "manual.pdf", 512, fx.user_id)
        .await
        .unwrap();

    let first = fx.guard.begin(fx.user_id, fx.resource_id).await.unwrap();

    // A different resource is still refused while the first is in flight
    match fx.guard.begin(fx.user_id, manual.id).await {
        Err(AppError::Conflict { active_session, .. }) => assert_eq!(active_session, Some(first)),
        other => panic!("expected conflict, got {:?}", other),
    }
    let untouched = fx.store.find_resource(manual.id).await.unwrap().unwrap();
    assert_eq!(untouched.download_count, 0);

    assert_eq!(fx.guard.reset_all().await.unwrap(), 1);
    assert_eq!(fx.guard.reset_all().await.unwrap(), 0);

    let second = fx.guard.begin(fx.user_id, manual.id).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(downloading_rows(&fx.store, fx.user_id).await, 1);

    let bundle = fx.store.find_resource(fx.resource_id).await.unwrap().unwrap();
    assert_eq!(bundle.download_count, 1);
    let manual = fx.store.find_resource(manual.id).await.unwrap().unwrap();
    assert_eq!(manual.download_count, 1);
}

#[tokio::test]
async fn test_other_users_are_independent() {
    let fx = fixture().await;
    let other = fx
        .store
        .create_user("second", "not-a-real-hash", Role::Operator, UserStatus::Active)
        .await
        .unwrap();

    fx.guard.begin(fx.user_id, fx.resource_id).await.unwrap();
    fx.guard.begin(other, fx.resource_id).await.unwrap();

    assert_eq!(downloading_rows(&fx.store, fx.user_id).await, 1);
    assert_eq!(downloading_rows(&fx.store, other).await, 1);
}

#[tokio::test]
async fn test_dropped_ticket_fails_session() {
    let fx = fixture().await;
    let (queue, worker) = CompletionQueue::spawn(fx.guard.clone());

    let session_id = fx.guard.begin(fx.user_id, fx.resource_id).await.unwrap();
    drop(queue.ticket(session_id));
    drop(queue);
    tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .unwrap()
        .unwrap();

    match fx.guard.status_for_user(fx.user_id).await.unwrap() {
        DownloadStatus::Failed { error_message, can_retry, .. } => {
            assert_eq!(error_message.as_deref(), Some(TRANSFER_ABORTED));
            assert!(can_retry);
        }
        other => panic!("expected failed status, got {:?}", other),
    }

    fx.guard.begin(fx.user_id, fx.resource_id).await.unwrap();
}
