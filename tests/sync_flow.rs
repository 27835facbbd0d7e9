//! End-to-end flows through the sync coordinator into an on-disk snapshot store.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use showcase::application::repos::SnapshotsRepo;
use showcase::application::revalidate::{PageRevalidator, RevalidateError};
use showcase::cache::{CacheConfig, MemoryStore, ReadThroughCache};
use showcase::domain::content::ContentUpdate;
use showcase::domain::snapshots::SnapshotDocument;
use showcase::domain::types::ContentType;
use showcase::infra::snapshots::{SnapshotStore, SnapshotStoreConfig};
use showcase::sync::{FlushStatus, SyncConfig, SyncCoordinator};
use tempfile::TempDir;

/// Forwards to a real store while recording every write attempt.
struct RecordingSnapshots {
    inner: Arc<SnapshotStore>,
    writes: Mutex<Vec<(ContentType, Value)>>,
}

impl RecordingSnapshots {
    fn new(inner: Arc<SnapshotStore>) -> Self {
        Self {
            inner,
            writes: Mutex::new(Vec::new()),
        }
    }

    fn writes(&self) -> Vec<(ContentType, Value)> {
        self.writes.lock().expect("writes lock").clone()
    }
}

#[async_trait]
impl SnapshotsRepo for RecordingSnapshots {
    async fn read(&self, content_type: ContentType) -> Option<SnapshotDocument> {
        self.inner.read(content_type).await
    }

    async fn update(&self, content_type: ContentType, payload: Value) -> bool {
        self.writes
            .lock()
            .expect("writes lock")
            .push((content_type, payload.clone()));
        self.inner.update(content_type, payload).await
    }
}

#[derive(Default)]
struct RecordingRevalidator {
    calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl PageRevalidator for RecordingRevalidator {
    async fn revalidate(&self, paths: &[String]) -> Result<(), RevalidateError> {
        self.calls.lock().expect("calls lock").push(paths.to_vec());
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    store: Arc<SnapshotStore>,
    snapshots: Arc<RecordingSnapshots>,
    cache: Arc<ReadThroughCache>,
    revalidator: Arc<RecordingRevalidator>,
    coordinator: SyncCoordinator,
}

async fn harness(debounce: Duration) -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(
        SnapshotStore::open(SnapshotStoreConfig::new(dir.path()))
            .await
            .expect("open store"),
    );
    let snapshots = Arc::new(RecordingSnapshots::new(store.clone()));
    let cache = Arc::new(ReadThroughCache::new(
        &CacheConfig::default(),
        Arc::new(MemoryStore::new(NonZeroUsize::new(64).expect("non-zero"))),
    ));
    let revalidator = Arc::new(RecordingRevalidator::default());
    let coordinator = SyncCoordinator::spawn(
        SyncConfig { debounce },
        snapshots.clone(),
        cache.clone(),
        revalidator.clone(),
    );

    Harness {
        _dir: dir,
        store,
        snapshots,
        cache,
        revalidator,
        coordinator,
    }
}

fn hero(title: &str) -> ContentUpdate {
    serde_json::from_value(json!({
        "type": "hero",
        "data": { "slides": [{ "title": title }] }
    }))
    .expect("hero update")
}

fn categories(slug: &str) -> ContentUpdate {
    serde_json::from_value(json!({
        "type": "categories",
        "data": { "categories": [{ "slug": slug, "name": slug }] }
    }))
    .expect("categories update")
}

async fn wait_for_newer(
    store: &SnapshotStore,
    content_type: ContentType,
    previous: Option<u64>,
) -> SnapshotDocument {
    for _ in 0..200 {
        if let Some(document) = store.load(content_type).await {
            if Some(document.version) > previous {
                return document;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{content_type} snapshot never advanced past {previous:?}");
}

#[tokio::test]
async fn debounced_hero_update_lands_in_snapshot() {
    let h = harness(Duration::from_millis(50)).await;
    let initial = h
        .store
        .try_update(ContentType::Hero, json!({ "slides": [{ "title": "Winter" }] }))
        .await
        .expect("seed hero");

    h.coordinator.queue_update(hero("Spring Sale")).expect("queue");

    let document = wait_for_newer(&h.store, ContentType::Hero, Some(initial.version)).await;
    assert_eq!(document.payload["slides"][0]["title"], "Spring Sale");
    assert!(document.version > initial.version);

    let calls = h.revalidator.calls.lock().expect("calls lock").clone();
    assert_eq!(calls, vec![vec!["/".to_string()]]);
}

#[tokio::test]
async fn later_update_replaces_earlier_within_window() {
    let h = harness(Duration::from_secs(60)).await;

    h.coordinator.queue_update(hero("A")).expect("queue A");
    h.coordinator.queue_update(hero("B")).expect("queue B");
    let report = h.coordinator.sync_now().await.expect("flush");

    assert_eq!(report.outcomes.len(), 1);
    let writes = h.snapshots.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, ContentType::Hero);
    assert_eq!(writes[0].1["slides"][0]["title"], "B");

    let document = h.store.load(ContentType::Hero).await.expect("hero");
    assert_eq!(document.payload["slides"][0]["title"], "B");
}

#[tokio::test]
async fn types_queued_together_flush_after_one_timer() {
    let h = harness(Duration::from_millis(50)).await;

    h.coordinator.queue_update(hero("Spring Sale")).expect("queue hero");
    h.coordinator
        .queue_update(categories("shoes"))
        .expect("queue categories");

    wait_for_newer(&h.store, ContentType::Hero, None).await;
    wait_for_newer(&h.store, ContentType::Categories, None).await;

    let mut written: Vec<ContentType> = h
        .snapshots
        .writes()
        .into_iter()
        .map(|(content_type, _)| content_type)
        .collect();
    written.sort();
    assert_eq!(written, vec![ContentType::Hero, ContentType::Categories]);

    let calls = h.revalidator.calls.lock().expect("calls lock").clone();
    assert_eq!(calls.len(), 1, "one batch, one revalidation request");
    assert!(calls[0].contains(&"/categories/[slug]".to_string()));
}

#[tokio::test]
async fn failed_write_keeps_document_and_cache() {
    let h = harness(Duration::from_secs(60)).await;
    h.store
        .try_update(ContentType::Hero, json!({ "slides": [{ "title": "Winter" }] }))
        .await
        .expect("seed hero");
    let before = tokio::fs::read(h.store.live_path(ContentType::Hero))
        .await
        .expect("read live hero");

    h.cache.set("hero:slides", &"cached", Duration::from_secs(60)).await;
    h.cache
        .set("category-stats:all", &"cached", Duration::from_secs(60))
        .await;

    tokio::fs::create_dir_all(h.store.temp_path(ContentType::Hero))
        .await
        .expect("block temp path");

    h.coordinator.queue_update(hero("Spring Sale")).expect("queue hero");
    h.coordinator
        .queue_update(categories("shoes"))
        .expect("queue categories");
    let report = h.coordinator.sync_now().await.expect("flush");

    assert_eq!(report.outcome(ContentType::Hero), Some(&FlushStatus::WriteFailed));
    assert!(matches!(
        report.outcome(ContentType::Categories),
        Some(FlushStatus::Written { .. })
    ));

    let after = tokio::fs::read(h.store.live_path(ContentType::Hero))
        .await
        .expect("read live hero");
    assert_eq!(before, after);

    assert_eq!(
        h.cache.get::<String>("hero:slides").await.as_deref(),
        Some("cached")
    );
    assert!(h.cache.get::<String>("category-stats:all").await.is_none());
}

#[tokio::test]
async fn shutdown_flushes_pending_updates() {
    let h = harness(Duration::from_secs(60)).await;

    h.coordinator.queue_update(hero("Closing")).expect("queue");
    let report = h.coordinator.shutdown().await.expect("shutdown");

    assert_eq!(report.written(), 1);
    let document = h.store.load(ContentType::Hero).await.expect("hero");
    assert_eq!(document.payload["slides"][0]["title"], "Closing");
    assert!(h.coordinator.queue_update(hero("Late")).is_err());
}
