//! Persistent index store.
//!
//! The store is the system of record for the index: the in-memory mirror is
//! rebuilt from it at startup, and the query engine asks it first. It is a
//! single SQLite table keyed by file path.
//!
//! ## Schema
//!
//! ```text
//! image_index
//! ├── path          BLOB PRIMARY KEY  (raw OS bytes of the path)
//! ├── file_name     TEXT NOT NULL
//! ├── width         INTEGER           (NULL when unknown)
//! ├── height        INTEGER           (NULL when unknown)
//! ├── aspect_ratio  REAL NOT NULL
//! ├── category      TEXT NOT NULL     (indexed)
//! ├── format        TEXT
//! ├── file_size     INTEGER NOT NULL
//! ├── modified_ms   INTEGER NOT NULL
//! ├── source        TEXT NOT NULL
//! └── updated_at    INTEGER NOT NULL  (epoch ms of the last write)
//! ```
//!
//! ## Concurrency
//!
//! The connection sits behind a mutex and every operation is a single
//! statement, so each row write is atomic with respect to readers. Only the
//! indexing worker writes; any number of query callers read.

use crate::types::{
    ClassificationSource, Dimensions, ImageRecord, RatioCategory, UnknownCategory, system_time_ms,
};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt row for {path}: {reason}")]
    CorruptRow { path: String, reason: String },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable record storage keyed by file path.
///
/// Implementations must tolerate reads concurrent with a write.
pub trait IndexStore: Send + Sync {
    /// Insert or replace the record for `record.path`.
    fn upsert(&self, record: &ImageRecord) -> Result<(), StoreError>;

    /// Remove the record for `path`. Returns whether a record existed.
    fn delete(&self, path: &Path) -> Result<bool, StoreError>;

    /// Fetch a single record.
    fn get(&self, path: &Path) -> Result<Option<ImageRecord>, StoreError>;

    /// All records filed under `category`, ordered by aspect ratio.
    fn scan_by_category(&self, category: RatioCategory) -> Result<Vec<ImageRecord>, StoreError>;

    /// Every record, ordered by path.
    fn scan_all(&self) -> Result<Vec<ImageRecord>, StoreError>;

    /// Remove every record.
    fn clear(&self) -> Result<(), StoreError>;

    /// Record count per category. Categories with no records are absent.
    fn category_counts(&self) -> Result<BTreeMap<RatioCategory, usize>, StoreError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS image_index (
    path          BLOB PRIMARY KEY,
    file_name     TEXT NOT NULL,
    width         INTEGER,
    height        INTEGER,
    aspect_ratio  REAL NOT NULL,
    category      TEXT NOT NULL,
    format        TEXT,
    file_size     INTEGER NOT NULL,
    modified_ms   INTEGER NOT NULL,
    source        TEXT NOT NULL,
    updated_at    INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_image_index_category ON image_index(category);
";

const SELECT_COLUMNS: &str = "path, file_name, width, height, aspect_ratio, category, format, \
                              file_size, modified_ms, source";

/// SQLite-backed [`IndexStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        // WAL lets readers proceed while the worker holds a write.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        let store = Self::with_connection(conn, Some(db_path.to_path_buf()))?;
        info!(path = %db_path.display(), "index database opened");
        Ok(store)
    }

    /// Private in-memory database, used by tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<ImageRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, RawRow::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

/// Column values as stored, before enum parsing.
struct RawRow {
    path: Vec<u8>,
    file_name: String,
    width: Option<u32>,
    height: Option<u32>,
    aspect_ratio: f64,
    category: String,
    format: Option<String>,
    file_size: i64,
    modified_ms: i64,
    source: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            file_name: row.get(1)?,
            width: row.get(2)?,
            height: row.get(3)?,
            aspect_ratio: row.get(4)?,
            category: row.get(5)?,
            format: row.get(6)?,
            file_size: row.get(7)?,
            modified_ms: row.get(8)?,
            source: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<ImageRecord, StoreError> {
        let path = path_from_key(self.path);
        let corrupt = |reason: String| StoreError::CorruptRow {
            path: path.display().to_string(),
            reason,
        };
        let category: RatioCategory = self
            .category
            .parse()
            .map_err(|e: UnknownCategory| corrupt(e.to_string()))?;
        let source = ClassificationSource::parse(&self.source)
            .ok_or_else(|| corrupt(format!("unknown source '{}'", self.source)))?;
        let dimensions = match (self.width, self.height) {
            (Some(width), Some(height)) => Some(Dimensions { width, height }),
            _ => None,
        };
        Ok(ImageRecord {
            path,
            file_name: self.file_name,
            dimensions,
            aspect_ratio: self.aspect_ratio,
            category,
            format: self.format,
            file_size: self.file_size.max(0) as u64,
            modified_ms: self.modified_ms,
            source,
        })
    }
}

/// Paths are keyed by their raw bytes so names that are not valid UTF-8
/// read back unchanged.
#[cfg(unix)]
fn path_key(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(unix)]
fn path_from_key(key: Vec<u8>) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(&key))
}

// Other platforms have no portable byte form for OS strings.
#[cfg(not(unix))]
fn path_key(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(not(unix))]
fn path_from_key(key: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&key).into_owned())
}

impl IndexStore for SqliteStore {
    fn upsert(&self, record: &ImageRecord) -> Result<(), StoreError> {
        let (width, height) = match record.dimensions {
            Some(d) => (Some(d.width), Some(d.height)),
            None => (None, None),
        };
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO image_index
             (path, file_name, width, height, aspect_ratio, category, format,
              file_size, modified_ms, source, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                path_key(&record.path),
                record.file_name,
                width,
                height,
                record.aspect_ratio,
                record.category.as_str(),
                record.format,
                record.file_size as i64,
                record.modified_ms,
                record.source.as_str(),
                system_time_ms(SystemTime::now()),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<bool, StoreError> {
        let changed = self.conn.lock().execute(
            "DELETE FROM image_index WHERE path = ?1",
            params![path_key(path)],
        )?;
        Ok(changed > 0)
    }

    fn get(&self, path: &Path) -> Result<Option<ImageRecord>, StoreError> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM image_index WHERE path = ?1"),
                params![path_key(path)],
                RawRow::from_row,
            )
            .optional()?;
        drop(conn);
        raw.map(RawRow::into_record).transpose()
    }

    fn scan_by_category(&self, category: RatioCategory) -> Result<Vec<ImageRecord>, StoreError> {
        self.query_records(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM image_index WHERE category = ?1 \
                 ORDER BY aspect_ratio, path"
            ),
            params![category.as_str()],
        )
    }

    fn scan_all(&self) -> Result<Vec<ImageRecord>, StoreError> {
        self.query_records(
            &format!("SELECT {SELECT_COLUMNS} FROM image_index ORDER BY path"),
            [],
        )
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.conn.lock().execute("DELETE FROM image_index", [])?;
        Ok(())
    }

    fn category_counts(&self) -> Result<BTreeMap<RatioCategory, usize>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT category, COUNT(*) FROM image_index GROUP BY category")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (category, count) = row?;
            let category: RatioCategory =
                category.parse().map_err(|e: UnknownCategory| {
                    StoreError::CorruptRow {
                        path: String::from("<aggregate>"),
                        reason: e.to_string(),
                    }
                })?;
            counts.insert(category, count.max(0) as usize);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::record;
    use tempfile::TempDir;

    // =========================================================================
    // Basic operations
    // =========================================================================

    #[test]
    fn upsert_then_scan_by_category_includes_path() {
        let store = SqliteStore::open_in_memory().unwrap();
        let r = record("/w/a_3440x1440.jpg", 2.39, RatioCategory::Ultrawide);
        store.upsert(&r).unwrap();

        let found = store.scan_by_category(RatioCategory::Ultrawide).unwrap();
        assert_eq!(found, vec![r]);
        assert!(store.scan_by_category(RatioCategory::Portrait).unwrap().is_empty());
    }

    #[test]
    fn upsert_replaces_existing_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&record("/w/x.jpg", 1.78, RatioCategory::Widescreen))
            .unwrap();
        let moved = record("/w/x.jpg", 0.56, RatioCategory::Portrait);
        store.upsert(&moved).unwrap();

        assert_eq!(store.scan_all().unwrap(), vec![moved]);
        assert!(store.scan_by_category(RatioCategory::Widescreen).unwrap().is_empty());
    }

    #[test]
    fn delete_reports_presence() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&record("/w/x.jpg", 1.78, RatioCategory::Widescreen))
            .unwrap();

        assert!(store.delete(Path::new("/w/x.jpg")).unwrap());
        assert!(!store.delete(Path::new("/w/x.jpg")).unwrap());
        assert!(store.get(Path::new("/w/x.jpg")).unwrap().is_none());
    }

    #[test]
    fn get_round_trips_all_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut r = record("/w/b.jpg", 1.78, RatioCategory::Widescreen);
        r.dimensions = Some(Dimensions { width: 1920, height: 1080 });
        r.format = Some("jpeg".into());
        r.source = ClassificationSource::PixelMetadata;
        r.file_size = 123_456;
        r.modified_ms = 1_700_000_000_123;
        store.upsert(&r).unwrap();

        assert_eq!(store.get(Path::new("/w/b.jpg")).unwrap(), Some(r));
    }

    #[test]
    fn scan_by_category_orders_by_ratio() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&record("/w/b.jpg", 2.1, RatioCategory::Widescreen))
            .unwrap();
        store
            .upsert(&record("/w/a.jpg", 1.78, RatioCategory::Widescreen))
            .unwrap();

        let paths: Vec<PathBuf> = store
            .scan_by_category(RatioCategory::Widescreen)
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(paths, vec![PathBuf::from("/w/a.jpg"), PathBuf::from("/w/b.jpg")]);
    }

    #[test]
    fn clear_removes_everything() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&record("/w/a.jpg", 1.78, RatioCategory::Widescreen))
            .unwrap();
        store
            .upsert(&record("/w/b.jpg", 2.39, RatioCategory::Ultrawide))
            .unwrap();
        store.clear().unwrap();
        assert!(store.scan_all().unwrap().is_empty());
    }

    #[test]
    fn category_counts_groups_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&record("/w/a.jpg", 2.39, RatioCategory::Ultrawide))
            .unwrap();
        store
            .upsert(&record("/w/b.jpg", 1.78, RatioCategory::Widescreen))
            .unwrap();
        store
            .upsert(&record("/w/c.jpg", 1.78, RatioCategory::Widescreen))
            .unwrap();

        let counts = store.category_counts().unwrap();
        assert_eq!(counts.get(&RatioCategory::Ultrawide), Some(&1));
        assert_eq!(counts.get(&RatioCategory::Widescreen), Some(&2));
        assert_eq!(counts.get(&RatioCategory::Square), None);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_path_reads_back_unchanged() {
        use std::os::unix::ffi::OsStrExt;
        let path = PathBuf::from(std::ffi::OsStr::from_bytes(b"/w/bad\xff_1920x1080.jpg"));
        let store = SqliteStore::open_in_memory().unwrap();
        let r = record(path.clone(), 1.78, RatioCategory::Widescreen);
        store.upsert(&r).unwrap();

        assert_eq!(store.get(&path).unwrap(), Some(r.clone()));
        assert_eq!(store.scan_by_category(RatioCategory::Widescreen).unwrap(), vec![r]);
        assert!(store.delete(&path).unwrap());
        assert!(store.scan_all().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn lossy_lookalike_is_a_different_key() {
        use std::os::unix::ffi::OsStrExt;
        let raw = PathBuf::from(std::ffi::OsStr::from_bytes(b"/w/bad\xff.jpg"));
        let lossy = PathBuf::from(raw.to_string_lossy().into_owned());
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&record(raw.clone(), 1.78, RatioCategory::Widescreen))
            .unwrap();
        store
            .upsert(&record(lossy.clone(), 0.56, RatioCategory::Portrait))
            .unwrap();

        assert_eq!(store.scan_all().unwrap().len(), 2);
        assert_eq!(store.get(&raw).unwrap().unwrap().category, RatioCategory::Widescreen);
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    #[test]
    fn records_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("nested/dir/index.db");
        let r = record("/w/a.jpg", 1.33, RatioCategory::Standard);
        {
            let store = SqliteStore::open(&db).unwrap();
            store.upsert(&r).unwrap();
        }
        let reopened = SqliteStore::open(&db).unwrap();
        assert_eq!(reopened.scan_all().unwrap(), vec![r]);
    }

    #[test]
    fn corrupt_category_is_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&record("/w/a.jpg", 1.33, RatioCategory::Standard))
            .unwrap();
        store
            .conn
            .lock()
            .execute("UPDATE image_index SET category = 'panorama'", [])
            .unwrap();

        assert!(matches!(
            store.scan_all(),
            Err(StoreError::CorruptRow { .. })
        ));
    }
}
