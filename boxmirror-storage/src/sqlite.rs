//! SQLite-backed mirror store.

use crate::{MirrorStore, StorageError, StorageResult};
use boxmirror_types::{
    Access, Collaboration, CollaborationId, CollaborationStatus, Grantee, GranteeType, Item,
    ItemId, ItemKind,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const ITEM_COLUMNS: &str = "id, kind, name, parent_id, owner_name, owner_type, location, \
     stored_location, created_at, modified_at, trashed, deleted, content_dirty, metadata_dirty, \
     published_acl";

const COLLABORATION_COLUMNS: &str =
    "id, item_id, item_kind, grantee_name, grantee_type, status, access";

/// Mirror store backed by a single SQLite connection.
#[derive(Clone)]
pub struct SqliteMirrorStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMirrorStore {
    /// Opens (or creates) a mirror database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        debug!("Opened mirror store at {}", path.as_ref().display());
        Ok(store)
    }

    /// Opens an in-memory mirror store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                parent_id TEXT,
                owner_name TEXT NOT NULL,
                owner_type TEXT NOT NULL,
                location TEXT NOT NULL,
                stored_location TEXT,
                created_at TEXT,
                modified_at TEXT,
                trashed INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                content_dirty INTEGER NOT NULL DEFAULT 0,
                metadata_dirty INTEGER NOT NULL DEFAULT 0,
                published_acl TEXT NOT NULL DEFAULT '[]'
            );

            CREATE INDEX IF NOT EXISTS items_parent ON items (parent_id);
            CREATE INDEX IF NOT EXISTS items_location ON items (location);

            CREATE TABLE IF NOT EXISTS collaborations (
                id TEXT PRIMARY KEY,
                item_id TEXT NOT NULL,
                item_kind TEXT NOT NULL,
                grantee_name TEXT NOT NULL,
                grantee_type TEXT NOT NULL,
                status TEXT NOT NULL,
                access TEXT NOT NULL DEFAULT 'ALLOW'
            );

            CREATE INDEX IF NOT EXISTS collaborations_item ON collaborations (item_id);
            ",
        )?;
        if !has_column(&conn, "items", "published_acl")? {
            conn.execute_batch(
                "ALTER TABLE items ADD COLUMN published_acl TEXT NOT NULL DEFAULT '[]'",
            )?;
            debug!("Added published_acl column to items");
        }
        Ok(())
    }

    fn query_items(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Vec<Item>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, read_item_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }
}

fn has_column(conn: &Connection, table: &str, column: &str) -> StorageResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn write_item(conn: &Connection, item: &Item) -> StorageResult<()> {
    let published_acl = serde_json::to_string(&item.published_acl)
        .map_err(|e| StorageError::InvalidData(format!("item {}: {e}", item.id)))?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO items ({ITEM_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            item.id.as_str(),
            item.kind.as_str(),
            item.name,
            item.parent_id.as_ref().map(ItemId::as_str),
            item.owner.name,
            item.owner.kind.as_str(),
            item.location,
            item.stored_location,
            item.created_at.map(|t| t.to_rfc3339()),
            item.modified_at.map(|t| t.to_rfc3339()),
            item.trashed,
            item.deleted,
            item.content_dirty,
            item.metadata_dirty,
            published_acl,
        ],
    )?;
    Ok(())
}

/// Raw column values, decoded outside the rusqlite callback so decode
/// failures surface as [`StorageError::InvalidData`].
struct ItemRow {
    id: String,
    kind: String,
    name: String,
    parent_id: Option<String>,
    owner_name: String,
    owner_type: String,
    location: String,
    stored_location: Option<String>,
    created_at: Option<String>,
    modified_at: Option<String>,
    trashed: bool,
    deleted: bool,
    content_dirty: bool,
    metadata_dirty: bool,
    published_acl: String,
}

fn read_item_row(row: &Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        name: row.get(2)?,
        parent_id: row.get(3)?,
        owner_name: row.get(4)?,
        owner_type: row.get(5)?,
        location: row.get(6)?,
        stored_location: row.get(7)?,
        created_at: row.get(8)?,
        modified_at: row.get(9)?,
        trashed: row.get(10)?,
        deleted: row.get(11)?,
        content_dirty: row.get(12)?,
        metadata_dirty: row.get(13)?,
        published_acl: row.get(14)?,
    })
}

impl TryFrom<ItemRow> for Item {
    type Error = StorageError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let kind: ItemKind = row
            .kind
            .parse()
            .map_err(|e| StorageError::InvalidData(format!("item {}: {e}", row.id)))?;
        Ok(Item {
            kind,
            name: row.name,
            parent_id: row.parent_id.map(ItemId::from),
            owner: Grantee::new(row.owner_name, GranteeType::parse(&row.owner_type)),
            location: row.location,
            stored_location: row.stored_location,
            created_at: parse_time(row.created_at.as_deref())?,
            modified_at: parse_time(row.modified_at.as_deref())?,
            trashed: row.trashed,
            deleted: row.deleted,
            content_dirty: row.content_dirty,
            metadata_dirty: row.metadata_dirty,
            published_acl: serde_json::from_str(&row.published_acl)
                .map_err(|e| StorageError::InvalidData(format!("item {}: {e}", row.id)))?,
            id: ItemId::from(row.id),
        })
    }
}

fn parse_time(value: Option<&str>) -> StorageResult<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| StorageError::InvalidData(format!("timestamp {s}: {e}")))
        })
        .transpose()
}

struct CollaborationRow {
    id: String,
    item_id: String,
    item_kind: String,
    grantee_name: String,
    grantee_type: String,
    status: String,
    access: String,
}

fn read_collaboration(row: &Row<'_>) -> rusqlite::Result<CollaborationRow> {
    Ok(CollaborationRow {
        id: row.get(0)?,
        item_id: row.get(1)?,
        item_kind: row.get(2)?,
        grantee_name: row.get(3)?,
        grantee_type: row.get(4)?,
        status: row.get(5)?,
        access: row.get(6)?,
    })
}

fn decode_collaboration(row: CollaborationRow) -> StorageResult<Collaboration> {
    let CollaborationRow {
        id,
        item_id,
        item_kind,
        grantee_name,
        grantee_type,
        status,
        access,
    } = row;
    let item_kind: ItemKind = item_kind
        .parse()
        .map_err(|e| StorageError::InvalidData(format!("collaboration {id}: {e}")))?;
    let status: CollaborationStatus = status
        .parse()
        .map_err(|e| StorageError::InvalidData(format!("collaboration {id}: {e}")))?;
    let access = Access::parse(&access).ok_or_else(|| {
        StorageError::InvalidData(format!("collaboration {id}: unknown access {access}"))
    })?;
    Ok(Collaboration {
        id: CollaborationId::from(id),
        item_id: ItemId::from(item_id),
        item_kind,
        grantee: Grantee::new(grantee_name, GranteeType::parse(&grantee_type)),
        status,
        access,
    })
}

impl MirrorStore for SqliteMirrorStore {
    fn get_item(&self, id: &ItemId) -> StorageResult<Option<Item>> {
        let row = {
            let conn = self.conn()?;
            conn.query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                params![id.as_str()],
                read_item_row,
            )
            .optional()?
        };
        row.map(Item::try_from).transpose()
    }

    fn upsert_item(&self, item: &Item) -> StorageResult<()> {
        let conn = self.conn()?;
        write_item(&conn, item)
    }

    fn upsert_items(&self, items: &[Item]) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for item in items {
            write_item(&tx, item)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_item(&self, id: &ItemId) -> StorageResult<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM items WHERE id = ?1", params![id.as_str()])?;
        Ok(n > 0)
    }

    fn children(&self, parent_id: &ItemId) -> StorageResult<Vec<Item>> {
        self.query_items(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE parent_id = ?1 ORDER BY id"),
            params![parent_id.as_str()],
        )
    }

    fn items_with_location_prefix(&self, prefix: &str) -> StorageResult<Vec<Item>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM items \
                 WHERE substr(location, 1, length(?1)) = ?1 ORDER BY location"
            ),
            params![prefix],
        )
    }

    fn dirty_items(&self) -> StorageResult<Vec<Item>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM items \
                 WHERE deleted OR content_dirty OR metadata_dirty \
                    OR (stored_location IS NOT NULL AND stored_location != location) \
                 ORDER BY length(location) DESC, id"
            ),
            [],
        )
    }

    fn upsert_collaboration(&self, collaboration: &Collaboration) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO collaborations ({COLLABORATION_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                collaboration.id.as_str(),
                collaboration.item_id.as_str(),
                collaboration.item_kind.as_str(),
                collaboration.grantee.name,
                collaboration.grantee.kind.as_str(),
                collaboration.status.as_str(),
                collaboration.access.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_collaboration(&self, id: &CollaborationId) -> StorageResult<Option<Collaboration>> {
        let row = {
            let conn = self.conn()?;
            conn.query_row(
                &format!("SELECT {COLLABORATION_COLUMNS} FROM collaborations WHERE id = ?1"),
                params![id.as_str()],
                read_collaboration,
            )
            .optional()?
        };
        row.map(decode_collaboration).transpose()
    }

    fn delete_collaboration(&self, id: &CollaborationId) -> StorageResult<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM collaborations WHERE id = ?1",
            params![id.as_str()],
        )?;
        Ok(n > 0)
    }

    fn collaborations_for_item(&self, item_id: &ItemId) -> StorageResult<Vec<Collaboration>> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLLABORATION_COLUMNS} FROM collaborations WHERE item_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![item_id.as_str()], read_collaboration)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        rows.into_iter().map(decode_collaboration).collect()
    }
}
