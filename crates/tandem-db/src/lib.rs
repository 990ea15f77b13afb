pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

const READER_POOL_SIZE: usize = 4;

/// SQLite store with a reader/writer split.
///
/// All writes (and every read-check-then-write sequence) go through the
/// single writer connection, so each write transaction is serialized.
/// Plain reads are spread over a small pool of read-only connections.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        writer.busy_timeout(std::time::Duration::from_secs(5))?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    /// Private in-memory database. Reads share the writer connection since
    /// no other connection can see it.
    pub fn open_in_memory() -> Result<Self> {
        let writer = Connection::open_in_memory()?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&writer)?;

        Ok(Self {
            writer: Mutex::new(writer),
            readers: Vec::new(),
            reader_idx: AtomicUsize::new(0),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        if self.readers.is_empty() {
            let conn = self
                .writer
                .lock()
                .map_err(|e| anyhow::anyhow!("Writer lock poisoned: {}", e))?;
            return f(&conn);
        }

        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| anyhow::anyhow!("Reader lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("Writer lock poisoned: {}", e))?;
        f(&mut conn)
    }
}

/// Timestamp format used for every stored instant. Fixed-width with
/// microsecond precision so lexical order matches chronological order.
pub fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The smallest stored instant strictly after `stamp`.
pub fn next_tick(stamp: &str) -> Result<String> {
    let at = chrono::DateTime::parse_from_rfc3339(stamp)
        .map_err(|e| anyhow::anyhow!("bad stored timestamp {:?}: {}", stamp, e))?
        .with_timezone(&Utc);
    Ok(timestamp(at + chrono::Duration::microseconds(1)))
}

/// Sorted form of an unordered pair, the key for pair-unique tables.
pub fn sorted_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_pair_is_direction_independent() {
        assert_eq!(sorted_pair("b", "a"), ("a", "b"));
        assert_eq!(sorted_pair("a", "b"), ("a", "b"));
    }

    #[test]
    fn timestamps_sort_lexically() {
        let earlier = chrono::DateTime::parse_from_rfc3339("2026-01-02T03:04:05.006Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = earlier + chrono::Duration::microseconds(995);
        let (a, b) = (timestamp(earlier), timestamp(later));
        assert_eq!(a, "2026-01-02T03:04:05.006000Z");
        assert_eq!(b, "2026-01-02T03:04:05.006995Z");
        assert!(a < b);
    }

    #[test]
    fn next_tick_is_one_microsecond_later() {
        assert_eq!(next_tick("2026-01-02T03:04:05.999999Z").unwrap(), "2026-01-02T03:04:06.000000Z");
        assert!(next_tick("yesterday").is_err());
    }

    #[test]
    fn open_on_disk_runs_migrations() {
        let dir = std::env::temp_dir().join(format!("tandem-db-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let db = Database::open(&dir.join("tandem.db")).unwrap();
        let version: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(version, migrations::LATEST_VERSION);
        drop(db);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
