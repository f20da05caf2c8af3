use boxmirror_blobstore::{BlobStore, BlobStoreError, FsBlobStore, MemoryBlobStore};
use pretty_assertions::assert_eq;

async fn exercise_basic(store: &dyn BlobStore) {
    store.put("docs/0/1/10", b"hello".to_vec()).await.unwrap();
    assert_eq!(store.get("docs/0/1/10").await.unwrap(), Some(b"hello".to_vec()));
    assert!(store.exists("docs/0/1/10").await.unwrap());

    store.put("docs/0/1/10", b"world".to_vec()).await.unwrap();
    assert_eq!(store.get("docs/0/1/10").await.unwrap(), Some(b"world".to_vec()));

    store.delete("docs/0/1/10").await.unwrap();
    assert_eq!(store.get("docs/0/1/10").await.unwrap(), None);
    assert!(!store.exists("docs/0/1/10").await.unwrap());

    // idempotent
    store.delete("docs/0/1/10").await.unwrap();
}

async fn exercise_copy_and_rename(store: &dyn BlobStore) {
    store.put("docs/0/10", b"x".to_vec()).await.unwrap();
    store.copy("docs/0/10", "trashed/0/10").await.unwrap();
    assert_eq!(store.get("docs/0/10").await.unwrap(), Some(b"x".to_vec()));
    assert_eq!(store.get("trashed/0/10").await.unwrap(), Some(b"x".to_vec()));

    let err = store.copy("docs/missing", "docs/other").await.unwrap_err();
    assert!(matches!(err, BlobStoreError::NotFound(k) if k == "docs/missing"));

    store.rename("trashed/0/10", "docs/0/2/10").await.unwrap();
    assert!(!store.exists("trashed/0/10").await.unwrap());
    assert!(store.exists("docs/0/2/10").await.unwrap());

    // A rename whose source is already gone converges.
    store.rename("trashed/0/10", "docs/0/2/10").await.unwrap();
    assert!(store.exists("docs/0/2/10").await.unwrap());
}

async fn exercise_list(store: &dyn BlobStore) {
    for key in ["docs/0/1/10", "docs/0/1/10.metadata.json", "docs/0/11/12", "trashed/0/5", "acl.json"] {
        store.put(key, Vec::new()).await.unwrap();
    }
    assert_eq!(
        store.list("docs/0/1/").await.unwrap(),
        vec!["docs/0/1/10", "docs/0/1/10.metadata.json"]
    );
    assert_eq!(
        store.list("docs/0/1").await.unwrap(),
        vec!["docs/0/1/10", "docs/0/1/10.metadata.json", "docs/0/11/12"]
    );
    assert_eq!(store.list("").await.unwrap().len(), 5);
    assert!(store.list("nothing/").await.unwrap().is_empty());
}

// ── Memory ──────────────────────────────────────────────────────

#[tokio::test]
async fn memory_basic() {
    exercise_basic(&MemoryBlobStore::new()).await;
}

#[tokio::test]
async fn memory_copy_and_rename() {
    exercise_copy_and_rename(&MemoryBlobStore::new()).await;
}

#[tokio::test]
async fn memory_list() {
    exercise_list(&MemoryBlobStore::new()).await;
}

#[tokio::test]
async fn memory_clones_share_contents() {
    let store = MemoryBlobStore::new();
    let clone = store.clone();
    clone.put("acl.json", b"[]".to_vec()).await.unwrap();
    assert_eq!(store.keys().await, vec!["acl.json"]);
    assert_eq!(store.len().await, 1);
    assert!(!store.is_empty().await);
}

// ── Filesystem ──────────────────────────────────────────────────

#[tokio::test]
async fn fs_basic() {
    let dir = tempfile::tempdir().unwrap();
    exercise_basic(&FsBlobStore::open(dir.path()).await.unwrap()).await;
}

#[tokio::test]
async fn fs_copy_and_rename() {
    let dir = tempfile::tempdir().unwrap();
    exercise_copy_and_rename(&FsBlobStore::open(dir.path()).await.unwrap()).await;
}

#[tokio::test]
async fn fs_list() {
    let dir = tempfile::tempdir().unwrap();
    exercise_list(&FsBlobStore::open(dir.path()).await.unwrap()).await;
}

#[tokio::test]
async fn fs_rejects_escaping_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlobStore::open(dir.path()).await.unwrap();
    for key in ["", "/abs", "docs/../../etc", "docs//x", "docs/0/1/"] {
        let err = store.put(key, Vec::new()).await.unwrap_err();
        assert!(matches!(err, BlobStoreError::InvalidKey(_)), "key {key:?}");
    }
}

#[tokio::test]
async fn fs_delete_prunes_empty_directories() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlobStore::open(dir.path()).await.unwrap();
    store.put("docs/0/1/10", b"x".to_vec()).await.unwrap();
    store.put("docs/0/2", b"y".to_vec()).await.unwrap();
    store.delete("docs/0/1/10").await.unwrap();

    assert!(!dir.path().join("docs/0/1").exists());
    assert!(dir.path().join("docs/0").exists());
    assert_eq!(store.root(), dir.path());
}
