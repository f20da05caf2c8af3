use boxmirror_storage::{MirrorStore, SqliteMirrorStore, StorageError};
use boxmirror_types::{
    Access, AclEntry, Collaboration, CollaborationId, CollaborationStatus, Grantee, Item, ItemId,
    ItemKind, ItemSnapshot,
};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

fn item(id: &str, kind: ItemKind, parent: Option<&str>, location: &str) -> Item {
    Item::from_snapshot(
        ItemSnapshot {
            id: ItemId::from(id),
            kind,
            name: format!("{id}.txt"),
            parent_id: parent.map(ItemId::from),
            path: None,
            owner: Grantee::user("Jane Doe"),
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            modified_at: None,
        },
        location.to_string(),
    )
}

fn collab(id: &str, item_id: &str, login: &str) -> Collaboration {
    Collaboration {
        id: CollaborationId::from(id),
        item_id: ItemId::from(item_id),
        item_kind: ItemKind::Folder,
        grantee: Grantee::user(login),
        status: CollaborationStatus::Accepted,
        access: Access::Allow,
    }
}

// ── Items ───────────────────────────────────────────────────────

#[test]
fn item_roundtrip() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    let mut file = item("10", ItemKind::File, Some("1"), "docs/0/1/10");
    file.stored_location = Some("docs/0/1/10".into());
    file.trashed = true;
    store.upsert_item(&file).unwrap();

    let loaded = store.get_item(&ItemId::from("10")).unwrap().unwrap();
    assert_eq!(loaded, file);
    assert_eq!(loaded.owner.name, "Jane+Doe");
}

#[test]
fn get_missing_item_is_none() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    assert!(store.get_item(&ItemId::from("404")).unwrap().is_none());
}

#[test]
fn upsert_is_idempotent() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    let folder = item("1", ItemKind::Folder, Some("0"), "docs/0/1/");
    store.upsert_item(&folder).unwrap();
    store.upsert_item(&folder).unwrap();
    assert_eq!(store.children(&ItemId::from("0")).unwrap(), vec![folder]);
}

#[test]
fn upsert_replaces_existing_row() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    let mut file = item("10", ItemKind::File, Some("1"), "docs/0/1/10");
    store.upsert_item(&file).unwrap();
    file.name = "renamed.pdf".into();
    file.content_dirty = false;
    store.upsert_item(&file).unwrap();

    let loaded = store.get_item(&file.id).unwrap().unwrap();
    assert_eq!(loaded.name, "renamed.pdf");
    assert!(!loaded.content_dirty);
}

#[test]
fn delete_item_reports_existence() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    store
        .upsert_item(&item("10", ItemKind::File, Some("1"), "docs/0/1/10"))
        .unwrap();
    assert!(store.delete_item(&ItemId::from("10")).unwrap());
    assert!(!store.delete_item(&ItemId::from("10")).unwrap());
}

#[test]
fn children_lists_direct_children_only() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    store
        .upsert_items(&[
            item("1", ItemKind::Folder, Some("0"), "docs/0/1/"),
            item("2", ItemKind::Folder, Some("1"), "docs/0/1/2/"),
            item("3", ItemKind::File, Some("1"), "docs/0/1/3"),
            item("4", ItemKind::File, Some("2"), "docs/0/1/2/4"),
        ])
        .unwrap();

    let ids: Vec<_> = store
        .children(&ItemId::from("1"))
        .unwrap()
        .into_iter()
        .map(|i| i.id.to_string())
        .collect();
    assert_eq!(ids, vec!["2", "3"]);
}

#[test]
fn location_prefix_query() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    store
        .upsert_items(&[
            item("1", ItemKind::Folder, Some("0"), "docs/0/1/"),
            item("2", ItemKind::Folder, Some("1"), "docs/0/1/2/"),
            item("4", ItemKind::File, Some("2"), "docs/0/1/2/4"),
            item("11", ItemKind::Folder, Some("0"), "docs/0/11/"),
        ])
        .unwrap();

    let ids: Vec<_> = store
        .items_with_location_prefix("docs/0/1/")
        .unwrap()
        .into_iter()
        .map(|i| i.id.to_string())
        .collect();
    assert_eq!(ids, vec!["1", "2", "4"]);
}

#[test]
fn location_prefix_treats_wildcards_literally() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    store
        .upsert_items(&[
            item("a", ItemKind::File, Some("0"), "docs/0/a_b"),
            item("b", ItemKind::File, Some("0"), "docs/0/axb"),
        ])
        .unwrap();
    let found = store.items_with_location_prefix("docs/0/a_").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, ItemId::from("a"));
}

#[test]
fn dirty_items_deepest_first() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    let mut clean = item("9", ItemKind::File, Some("0"), "docs/0/9");
    clean.content_dirty = false;
    clean.metadata_dirty = false;
    clean.stored_location = Some("docs/0/9".into());
    store
        .upsert_items(&[
            item("1", ItemKind::Folder, Some("0"), "docs/0/1/"),
            item("4", ItemKind::File, Some("2"), "docs/0/1/2/4"),
            item("2", ItemKind::Folder, Some("1"), "docs/0/1/2/"),
            clean,
        ])
        .unwrap();

    let ids: Vec<_> = store
        .dirty_items()
        .unwrap()
        .into_iter()
        .map(|i| i.id.to_string())
        .collect();
    assert_eq!(ids, vec!["4", "2", "1"]);
}

#[test]
fn dirty_items_includes_pending_relocation() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    let mut moved = item("9", ItemKind::File, Some("0"), "trashed/0/9");
    moved.content_dirty = false;
    moved.metadata_dirty = false;
    moved.stored_location = Some("docs/0/9".into());
    store.upsert_item(&moved).unwrap();

    let dirty = store.dirty_items().unwrap();
    assert_eq!(dirty.len(), 1);
    assert!(dirty[0].relocation_pending());
}

#[test]
fn file_backed_store_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.db");
    {
        let store = SqliteMirrorStore::open(&path).unwrap();
        store
            .upsert_item(&item("10", ItemKind::File, Some("1"), "docs/0/1/10"))
            .unwrap();
    }
    let store = SqliteMirrorStore::open(&path).unwrap();
    assert!(store.get_item(&ItemId::from("10")).unwrap().is_some());
}

#[test]
fn published_acl_persists() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    let mut folder = item("1", ItemKind::Folder, Some("0"), "docs/0/1/");
    folder.published_acl = vec![
        Grantee::user("Jane Doe").allow(),
        AclEntry::new(Grantee::group("Finance"), Access::Deny),
    ];
    store.upsert_item(&folder).unwrap();
    assert_eq!(store.get_item(&"1".into()).unwrap().unwrap(), folder);
}

#[test]
fn older_database_gains_published_acl_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.db");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE items (
                id TEXT PRIMARY KEY, kind TEXT NOT NULL, name TEXT NOT NULL,
                parent_id TEXT, owner_name TEXT NOT NULL, owner_type TEXT NOT NULL,
                location TEXT NOT NULL, stored_location TEXT, created_at TEXT,
                modified_at TEXT, trashed INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0, content_dirty INTEGER NOT NULL DEFAULT 0,
                metadata_dirty INTEGER NOT NULL DEFAULT 0
            );
            INSERT INTO items (id, kind, name, owner_name, owner_type, location)
                VALUES ('1', 'folder', 'test-folder', 'a@example.com', 'USER', 'docs/0/1/');",
        )
        .unwrap();
    }

    let store = SqliteMirrorStore::open(&path).unwrap();
    let folder = store.get_item(&"1".into()).unwrap().unwrap();
    assert!(folder.published_acl.is_empty());
    assert_eq!(folder.location, "docs/0/1/");
}

// ── Collaborations ──────────────────────────────────────────────

#[test]
fn collaboration_roundtrip() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    let c = collab("c1", "1", "alice@example.com");
    store.upsert_collaboration(&c).unwrap();
    assert_eq!(
        store.get_collaboration(&CollaborationId::from("c1")).unwrap(),
        Some(c)
    );
}

#[test]
fn collaborations_for_item_in_id_order() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    store.upsert_collaboration(&collab("c2", "1", "bob")).unwrap();
    store.upsert_collaboration(&collab("c1", "1", "alice")).unwrap();
    store.upsert_collaboration(&collab("c3", "2", "carol")).unwrap();

    let ids: Vec<_> = store
        .collaborations_for_item(&ItemId::from("1"))
        .unwrap()
        .into_iter()
        .map(|c| c.id.to_string())
        .collect();
    assert_eq!(ids, vec!["c1", "c2"]);
}

#[test]
fn delete_collaboration_reports_existence() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    store.upsert_collaboration(&collab("c1", "1", "alice")).unwrap();
    assert!(store.delete_collaboration(&CollaborationId::from("c1")).unwrap());
    assert!(!store.delete_collaboration(&CollaborationId::from("c1")).unwrap());
    assert!(store.collaborations_for_item(&ItemId::from("1")).unwrap().is_empty());
}

#[test]
fn collaboration_access_persists() {
    let store = SqliteMirrorStore::open_in_memory().unwrap();
    let mut c = collab("c1", "1", "mallory");
    c.access = Access::Deny;
    store.upsert_collaboration(&c).unwrap();
    let loaded = store.get_collaboration(&c.id).unwrap().unwrap();
    assert_eq!(loaded.access, Access::Deny);
}

// ── Errors ──────────────────────────────────────────────────────

#[test]
fn error_display() {
    assert_eq!(
        StorageError::InvalidData("item 7: unknown item kind: disk".into()).to_string(),
        "invalid data: item 7: unknown item kind: disk"
    );
    assert_eq!(StorageError::LockPoisoned.to_string(), "connection lock poisoned");
}
