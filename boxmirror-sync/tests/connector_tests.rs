use async_trait::async_trait;
use boxmirror_blobstore::{BlobStore, BlobStoreError, BlobStoreResult, MemoryBlobStore};
use boxmirror_storage::{MirrorStore, SqliteMirrorStore};
use boxmirror_sync::config::SyncConfig;
use boxmirror_sync::{
    Connector, CrawlReport, DrainReport, MemoryQueue, MessageQueue, StaticHierarchy, SyncError,
};
use boxmirror_types::{
    Access, Collaboration, CollaborationStatus, Grantee, ItemId, ItemKind, ItemSnapshot,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct SwitchableStore {
    inner: MemoryBlobStore,
    broken: AtomicBool,
}

#[async_trait]
impl BlobStore for SwitchableStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> BlobStoreResult<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Storage("bucket unavailable".into()));
        }
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> BlobStoreResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> BlobStoreResult<()> {
        self.inner.delete(key).await
    }

    async fn copy(&self, from: &str, to: &str) -> BlobStoreResult<()> {
        self.inner.copy(from, to).await
    }

    async fn list(&self, prefix: &str) -> BlobStoreResult<Vec<String>> {
        self.inner.list(prefix).await
    }
}

struct Harness {
    store: Arc<SqliteMirrorStore>,
    blobs: Arc<SwitchableStore>,
    source: Arc<StaticHierarchy>,
    queue: Arc<MemoryQueue>,
    connector: Connector,
}

fn config() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.layout.bucket = "bucket".into();
    config.root_folder_ids = vec!["0".into()];
    config.batch_size = 10;
    config
}

fn harness_with(config: SyncConfig) -> Harness {
    let store = Arc::new(SqliteMirrorStore::open_in_memory().unwrap());
    let blobs = Arc::new(SwitchableStore::default());
    let source = Arc::new(StaticHierarchy::new());
    let queue = Arc::new(MemoryQueue::new());
    let connector = Connector::new(
        store.clone(),
        blobs.clone(),
        source.clone(),
        queue.clone(),
        config,
    )
    .unwrap();
    Harness {
        store,
        blobs,
        source,
        queue,
        connector,
    }
}

fn harness() -> Harness {
    harness_with(config())
}

fn uploaded(id: &str, name: &str) -> String {
    json!({
        "trigger": "FILE.UPLOADED",
        "source": {
            "id": id,
            "type": "file",
            "name": name,
            "parent": {"type": "folder", "id": "1"},
            "path_collection": {"entries": [
                {"type": "folder", "id": "0"},
                {"type": "folder", "id": "1"}
            ]},
            "owned_by": {"type": "user", "login": "test-user1@example.com"}
        }
    })
    .to_string()
}

fn lifecycle(trigger: &str, id: &str) -> String {
    json!({"trigger": trigger, "source": {"id": id}}).to_string()
}

fn snapshot(id: &str, kind: ItemKind, name: &str, parent: Option<&str>) -> ItemSnapshot {
    ItemSnapshot {
        id: id.into(),
        kind,
        name: name.into(),
        parent_id: parent.map(ItemId::from),
        path: None,
        owner: Grantee::user("owner@example.com"),
        created_at: None,
        modified_at: None,
    }
}

// ── Memory queue ────────────────────────────────────────────────

#[tokio::test]
async fn queue_redelivers_unacknowledged_messages_in_order() {
    let queue = MemoryQueue::new();
    for body in ["a", "b", "c"] {
        queue.push(body).await;
    }

    let batch = queue.receive(2).await.unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(queue.in_flight_len().await, 2);
    queue.ack(&batch[1].receipt).await.unwrap();

    assert_eq!(queue.redeliver().await, 1);
    let bodies: Vec<String> = queue
        .receive(10)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.body)
        .collect();
    assert_eq!(bodies, vec!["a", "c"]);
    assert_eq!(queue.pending_len().await, 0);
}

// ── Construction ────────────────────────────────────────────────

#[tokio::test]
async fn invalid_config_is_rejected() {
    let store = Arc::new(SqliteMirrorStore::open_in_memory().unwrap());
    let result = Connector::new(
        store,
        Arc::new(MemoryBlobStore::new()),
        Arc::new(StaticHierarchy::new()),
        Arc::new(MemoryQueue::new()),
        SyncConfig::default(),
    );
    assert!(matches!(result, Err(SyncError::Config(_))));
}

// ── Batches ─────────────────────────────────────────────────────

#[tokio::test]
async fn processed_messages_are_acknowledged() {
    let h = harness();
    h.source.set_content("10", b"hello".to_vec());
    h.queue.push(uploaded("10", "test.txt")).await;
    h.queue.push(lifecycle("FILE.PREVIEWED", "10")).await;

    let report = h.connector.run_until_empty().await.unwrap();
    assert_eq!(report.received, 2);
    assert_eq!(report.applied, 1);
    assert_eq!(report.ignored, 1);
    assert_eq!(report.acked, 2);
    assert_eq!(h.queue.in_flight_len().await, 0);
    assert_eq!(
        h.blobs.inner.get("docs/0/1/10").await.unwrap(),
        Some(b"hello".to_vec())
    );
}

#[tokio::test]
async fn empty_queue_is_a_noop() {
    let h = harness();
    let report = h.connector.run_until_empty().await.unwrap();
    assert_eq!(report.received, 0);
}

#[tokio::test]
async fn malformed_messages_stay_unacknowledged() {
    let h = harness();
    h.queue.push("{not json").await;
    h.queue.push(json!({"trigger": "FILE.UPLOADED"}).to_string()).await;
    h.queue.push(uploaded("10", "test.txt")).await;

    let report = h.connector.run_until_empty().await.unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(report.acked, 1);
    assert_eq!(h.queue.in_flight_len().await, 2);
}

#[tokio::test]
async fn unknown_items_are_acknowledged() {
    let h = harness();
    h.queue.push(lifecycle("FILE.TRASHED", "404")).await;
    h.queue
        .push(json!({"trigger": "COLLABORATION.REMOVED", "source": {"id": "9"}}).to_string())
        .await;

    let report = h.connector.run_until_empty().await.unwrap();
    assert_eq!(report.soft_failures, 2);
    assert_eq!(report.acked, 2);
    assert_eq!(h.queue.in_flight_len().await, 0);
}

#[tokio::test]
async fn failed_drain_leaves_batch_for_redelivery() {
    let h = harness();
    h.queue.push(uploaded("10", "test.txt")).await;
    h.blobs.broken.store(true, Ordering::SeqCst);

    let report = h.connector.run_until_empty().await.unwrap();
    assert_eq!(report.acked, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(h.queue.in_flight_len().await, 1);

    h.blobs.broken.store(false, Ordering::SeqCst);
    assert_eq!(h.queue.redeliver().await, 1);
    let report = h.connector.run_until_empty().await.unwrap();
    assert_eq!(report.acked, 1);
    assert!(h.store.dirty_items().unwrap().is_empty());
}

#[tokio::test]
async fn events_for_one_item_apply_in_order() {
    let h = harness();
    h.queue.push(uploaded("10", "test.txt")).await;
    h.queue.push(lifecycle("FILE.TRASHED", "10")).await;
    h.queue.push(uploaded("11", "other.txt")).await;

    let report = h.connector.run_until_empty().await.unwrap();
    assert_eq!(report.applied, 3);
    let item = h.store.get_item(&"10".into()).unwrap().unwrap();
    assert_eq!(item.location, "trashed/0/1/10");
    assert!(h
        .blobs
        .inner
        .get("trashed/0/1/10.metadata.json")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn redelivered_batch_is_idempotent() {
    let h = harness();
    h.source.set_content("10", b"hello".to_vec());
    let body = uploaded("10", "test.txt");
    h.queue.push(body.clone()).await;
    h.connector.run_until_empty().await.unwrap();
    let keys = h.blobs.inner.keys().await;
    let item = h.store.get_item(&"10".into()).unwrap().unwrap();

    h.queue.push(body).await;
    h.connector.run_until_empty().await.unwrap();
    assert_eq!(h.blobs.inner.keys().await, keys);
    assert_eq!(h.store.get_item(&"10".into()).unwrap().unwrap(), item);
}

// ── Crawl ───────────────────────────────────────────────────────

fn populate(source: &StaticHierarchy) {
    source.add_item(snapshot("0", ItemKind::Folder, "All Files", None));
    source.add_item(snapshot("1", ItemKind::Folder, "test-folder", Some("0")));
    source.add_item(snapshot("10", ItemKind::File, "test.txt", Some("1")));
    source.add_item(snapshot("11", ItemKind::File, "movie.mp4", Some("1")));
    source.add_item(snapshot("12", ItemKind::File, "notes.md", Some("0")));
    source.set_content("10", b"hello".to_vec());
    for (id, status) in [
        ("500", CollaborationStatus::Accepted),
        ("501", CollaborationStatus::Pending),
    ] {
        source.add_collaboration(Collaboration {
            id: id.into(),
            item_id: "1".into(),
            item_kind: ItemKind::Folder,
            grantee: Grantee::group(format!("group-{id}")),
            status,
            access: Access::Allow,
        });
    }
}

#[tokio::test]
async fn crawl_mirrors_the_hierarchy() {
    let h = harness();
    populate(&h.source);

    let (crawled, drained) = h.connector.crawl(1).await.unwrap();
    assert_eq!(
        crawled,
        CrawlReport {
            folders: 2,
            files: 2,
            collaborations: 1,
            skipped: 0,
            unsupported: 1,
        }
    );
    assert_eq!(drained.content_written, 2);

    assert_eq!(
        h.store.get_item(&"10".into()).unwrap().unwrap().location,
        "docs/0/1/10"
    );
    assert!(h.store.get_item(&"11".into()).unwrap().is_none());

    let feed = h.connector.feed().snapshot().await.unwrap();
    let folder = feed.get("s3://bucket/docs/0/1/").unwrap();
    assert!(folder.acl_entries.iter().any(|e| e.name == "group-500"));
    assert!(!folder.acl_entries.iter().any(|e| e.name == "group-501"));
}

#[tokio::test]
async fn recrawl_with_skip_existing_leaves_items_alone() {
    let mut config = config();
    config.skip_existing_items = true;
    let h = harness_with(config);
    populate(&h.source);

    h.connector.crawl(10).await.unwrap();
    let (crawled, drained) = h.connector.crawl(10).await.unwrap();
    assert_eq!(crawled.skipped, 4);
    assert_eq!(crawled.files + crawled.folders, 0);
    assert_eq!(drained, DrainReport::default());
}

// ── Restart ─────────────────────────────────────────────────────

#[tokio::test]
async fn on_disk_mirror_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("mirror.db");
    let root = dir.path().join("objects");
    let source = Arc::new(StaticHierarchy::new());
    source.set_content("10", b"hello".to_vec());

    {
        let store = Arc::new(SqliteMirrorStore::open(&db).unwrap());
        let blobs = Arc::new(boxmirror_blobstore::FsBlobStore::open(&root).await.unwrap());
        let queue = Arc::new(MemoryQueue::new());
        queue.push(uploaded("10", "test.txt")).await;
        let connector = Connector::new(store, blobs, source.clone(), queue, config()).unwrap();
        let report = connector.run_until_empty().await.unwrap();
        assert_eq!(report.acked, 1);
    }

    assert_eq!(
        std::fs::read(root.join("docs/0/1/10")).unwrap(),
        b"hello".to_vec()
    );

    let store = Arc::new(SqliteMirrorStore::open(&db).unwrap());
    assert!(store.dirty_items().unwrap().is_empty());
    let blobs = Arc::new(boxmirror_blobstore::FsBlobStore::open(&root).await.unwrap());
    let connector = Connector::new(
        store.clone(),
        blobs,
        source,
        Arc::new(MemoryQueue::new()),
        config(),
    )
    .unwrap();
    assert_eq!(connector.drain().await.unwrap(), DrainReport::default());
    let feed = connector.feed().snapshot().await.unwrap();
    assert!(feed.get("s3://bucket/docs/0/1/10").is_some());
    assert_eq!(
        store.get_item(&"10".into()).unwrap().unwrap().stored_location,
        Some("docs/0/1/10".to_string())
    );
}
