//! Behaviour every engine must share, run once per engine.

use jiff::{SignedDuration, Timestamp};
use shurl_core::{Context, Created, Kind, LinkStore, Severity};
use shurl_storage::{open_store, MemoryConfig, PersistentConfig, StoreConfig};
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    store: Box<dyn LinkStore>,
    _dir: TempDir,
}

impl Fixture {
    async fn persistent() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let config = PersistentConfig::builder()
            .path(dir.path().join("links.redb"))
            .build();
        let store = open_store(&Context::new(), StoreConfig::Persistent(config))
            .await
            .expect("open persistent store");
        Self { store, _dir: dir }
    }

    async fn memory() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let config = MemoryConfig::builder()
            .snapshot_path(dir.path().join("links.json"))
            .build();
        let store = open_store(&Context::new(), StoreConfig::Memory(config))
            .await
            .expect("open memory store");
        Self { store, _dir: dir }
    }
}

async fn create_is_idempotent(store: &dyn LinkStore) {
    let ctx = Context::new();

    let first = store.create(&ctx, "https://example.com", None).await.unwrap();
    assert_eq!(first, Created { id: 1, created: true });

    let tomorrow = Timestamp::now() + SignedDuration::from_hours(24);
    let second = store
        .create(&ctx, "https://example.com", Some(tomorrow))
        .await
        .unwrap();
    assert_eq!(second, Created { id: 1, created: false });

    let link = store.get(&ctx, 1).await.unwrap();
    assert_eq!(link.expired_at, Some(tomorrow));
    assert_eq!(link.hits, 0);
}

async fn hits_are_counted(store: &dyn LinkStore) {
    let ctx = Context::new();
    let Created { id, .. } = store.create(&ctx, "https://example.com/a", None).await.unwrap();
    assert_eq!(store.get(&ctx, id).await.unwrap().hits, 0);

    for n in 1..=5 {
        let link = store.hit(&ctx, id).await.unwrap();
        assert_eq!(link.hits, n);
    }
    assert_eq!(store.get(&ctx, id).await.unwrap().hits, 5);
}

async fn delete_frees_the_url(store: &dyn LinkStore) {
    let ctx = Context::new();
    let first = store.create(&ctx, "https://example.com/b", None).await.unwrap();
    store.delete(&ctx, first.id).await.unwrap();

    let err = store.get(&ctx, first.id).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.severity(), Severity::Warning);

    let again = store.create(&ctx, "https://example.com/b", None).await.unwrap();
    assert!(again.created);
    assert_ne!(again.id, first.id);
}

async fn soft_delete_keeps_the_row(store: &dyn LinkStore) {
    let ctx = Context::new();
    let Created { id, .. } = store.create(&ctx, "https://example.com/c", None).await.unwrap();

    store.set_deleted(&ctx, id).await.unwrap();
    let deleted_at = store.get(&ctx, id).await.unwrap().deleted_at;
    assert!(deleted_at.is_some());

    store.set_deleted(&ctx, id).await.unwrap();
    assert_eq!(store.get(&ctx, id).await.unwrap().deleted_at, deleted_at);

    let again = store.create(&ctx, "https://example.com/c", None).await.unwrap();
    assert_eq!(again, Created { id, created: false });
    assert_eq!(store.get(&ctx, id).await.unwrap().deleted_at, deleted_at);
}

async fn store_ignores_expiration(store: &dyn LinkStore) {
    let ctx = Context::new();
    let yesterday = Timestamp::now() - SignedDuration::from_hours(24);
    let Created { id, .. } = store
        .create(&ctx, "https://example.com/d", Some(yesterday))
        .await
        .unwrap();

    assert_eq!(store.get(&ctx, id).await.unwrap().expired_at, Some(yesterday));
    assert_eq!(store.hit(&ctx, id).await.unwrap().hits, 1);
}

async fn missing_ids_are_not_found(store: &dyn LinkStore) {
    let ctx = Context::new().with_operation("test");

    assert_eq!(store.get(&ctx, 99).await.unwrap_err().kind(), Kind::NotFound);
    assert_eq!(store.hit(&ctx, 99).await.unwrap_err().kind(), Kind::NotFound);
    assert_eq!(store.set_deleted(&ctx, 99).await.unwrap_err().kind(), Kind::NotFound);
    assert_eq!(store.delete(&ctx, 99).await.unwrap_err().kind(), Kind::NotFound);
}

async fn concurrent_hits_are_not_lost(store: Arc<dyn LinkStore>) {
    const CALLERS: u64 = 200;
    let ctx = Context::new();
    let Created { id, .. } = store.create(&ctx, "https://example.com/hot", None).await.unwrap();

    let tasks: Vec<_> = (0..CALLERS)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.hit(&Context::new(), id).await })
        })
        .collect();

    let mut seen = Vec::with_capacity(tasks.len());
    for task in tasks {
        seen.push(task.await.unwrap().unwrap().hits);
    }
    seen.sort_unstable();

    // Every increment lands exactly once and each caller sees its own count.
    assert_eq!(seen, (1..=CALLERS).collect::<Vec<_>>());
    assert_eq!(store.get(&ctx, id).await.unwrap().hits, CALLERS);
}

async fn closed_store_rejects_everything(store: &dyn LinkStore) {
    let ctx = Context::new();
    store.create(&ctx, "https://example.com/e", None).await.unwrap();
    store.close(&ctx).await.unwrap();

    let err = store.get(&ctx, 1).await.unwrap_err();
    assert_eq!(err.kind(), Kind::Closed);
    assert_eq!(err.severity(), Severity::Error);

    let err = store.create(&ctx, "https://example.com/f", None).await.unwrap_err();
    assert_eq!(err.kind(), Kind::Closed);
    assert_eq!(store.close(&ctx).await.unwrap_err().kind(), Kind::Closed);
}

macro_rules! behaviour_suite {
    ($engine:ident, $open:expr) => {
        mod $engine {
            use super::*;

            #[tokio::test]
            async fn create_is_idempotent() {
                let fixture = $open.await;
                super::create_is_idempotent(&*fixture.store).await;
            }

            #[tokio::test]
            async fn hits_are_counted() {
                let fixture = $open.await;
                super::hits_are_counted(&*fixture.store).await;
            }

            #[tokio::test]
            async fn delete_frees_the_url() {
                let fixture = $open.await;
                super::delete_frees_the_url(&*fixture.store).await;
            }

            #[tokio::test]
            async fn soft_delete_keeps_the_row() {
                let fixture = $open.await;
                super::soft_delete_keeps_the_row(&*fixture.store).await;
            }

            #[tokio::test]
            async fn store_ignores_expiration() {
                let fixture = $open.await;
                super::store_ignores_expiration(&*fixture.store).await;
            }

            #[tokio::test]
            async fn missing_ids_are_not_found() {
                let fixture = $open.await;
                super::missing_ids_are_not_found(&*fixture.store).await;
            }

            #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn concurrent_hits_are_not_lost() {
                let Fixture { store, _dir } = $open.await;
                super::concurrent_hits_are_not_lost(Arc::from(store)).await;
            }

            #[tokio::test]
            async fn closed_store_rejects_everything() {
                let fixture = $open.await;
                super::closed_store_rejects_everything(&*fixture.store).await;
            }
        }
    };
}

behaviour_suite!(persistent, Fixture::persistent());
behaviour_suite!(memory, Fixture::memory());
