//! SQLite-backed store: the whole document lives in one WAL-mode row, every
//! batch runs in a single IMMEDIATE transaction, and subscriptions poll a
//! revision counter plus a journal of written paths.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OpenFlags, TransactionBehavior, params};
use serde_json::Value;

use super::path::StorePath;
use super::{DeviceStore, WriteBatch, tree};
use crate::core::errors::{KibError, Result};

/// Journal rows older than this many revisions are pruned; pollers further
/// behind than that treat every path as touched.
const JOURNAL_KEEP_REVISIONS: i64 = 1_000;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
    pollers: Arc<AtomicUsize>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path, poll_interval: Duration) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| KibError::io(parent, source))?;
        }
        let conn = open_connection(path)?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            poll_interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            pollers: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Polling threads still running.
    pub fn subscriber_count(&self) -> usize {
        self.pollers.load(Ordering::Acquire)
    }

    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .lock()
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }

    /// Timestamp of the last committed write, empty before the first one.
    pub fn updated_at(&self) -> Result<String> {
        let updated: String = self.conn.lock().query_row(
            "SELECT updated_at FROM document WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(updated)
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl DeviceStore for SqliteStore {
    fn read(&self, path: &StorePath) -> Result<Value> {
        let conn = self.conn.lock();
        let (doc, _) = load_document(&conn)?;
        Ok(tree::get_at(&doc, path))
    }

    fn update(&self, batch: &WriteBatch) -> Result<u64> {
        batch.validate()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (mut doc, revision) = load_document(&tx)?;
        batch.apply_to(&mut doc);
        let next = revision + 1;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        tx.prepare_cached("UPDATE document SET tree = ?1, revision = ?2, updated_at = ?3 WHERE id = 1")?
            .execute(params![serde_json::to_string(&doc)?, next, now])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO write_journal (revision, path, written_at) VALUES (?1, ?2, ?3)",
            )?;
            for path in batch.paths() {
                stmt.execute(params![next, path.to_string(), now])?;
            }
        }
        tx.prepare_cached("DELETE FROM write_journal WHERE revision <= ?1")?
            .execute(params![next - JOURNAL_KEEP_REVISIONS])?;
        tx.commit()?;

        Ok(u64::try_from(next).unwrap_or_default())
    }

    fn subscribe(&self, path: &StorePath) -> Result<Receiver<Value>> {
        let conn = open_connection(&self.path)?;
        let (doc, revision) = load_document(&conn)?;
        let (tx, rx) = unbounded();
        tx.send(tree::get_at(&doc, path))
            .map_err(|_| KibError::ChannelClosed {
                component: "sqlite store subscriber",
            })?;

        self.pollers.fetch_add(1, Ordering::AcqRel);
        let poller = Poller {
            conn,
            path: path.clone(),
            last_revision: revision,
            interval: self.poll_interval,
            tx,
            shutdown: Arc::clone(&self.shutdown),
            live: Arc::clone(&self.pollers),
        };
        thread::Builder::new()
            .name("kib-sqlite-poll".to_string())
            .spawn(move || poller.run())
            .map_err(|err| KibError::Runtime {
                details: format!("failed to spawn subscription poller: {err}"),
            })?;
        Ok(rx)
    }

    fn revision(&self) -> Result<u64> {
        let revision = current_revision(&self.conn.lock())?;
        Ok(u64::try_from(revision).unwrap_or_default())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

/// Background watcher for one subscription. Ends when the store is dropped
/// or the first delivery after the receiver goes away fails. A sender cannot
/// see a dropped receiver until it sends, so an abandoned poller lingers
/// until the next write touching its path.
struct Poller {
    conn: Connection,
    path: StorePath,
    last_revision: i64,
    interval: Duration,
    tx: Sender<Value>,
    shutdown: Arc<AtomicBool>,
    live: Arc<AtomicUsize>,
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Poller {
    fn run(mut self) {
        loop {
            thread::sleep(self.interval);
            if self.shutdown.load(Ordering::Relaxed) {
                return;
            }
            match self.poll_once() {
                Ok(None) => {}
                Ok(Some(snapshot)) => {
                    if self.tx.send(snapshot).is_err() {
                        return;
                    }
                }
                Err(err) => eprintln!("[KIB-SQLITE] subscription poll failed: {err}"),
            }
        }
    }

    fn poll_once(&mut self) -> Result<Option<Value>> {
        let revision = current_revision(&self.conn)?;
        if revision <= self.last_revision {
            return Ok(None);
        }
        let touched = revision - self.last_revision > JOURNAL_KEEP_REVISIONS
            || self
                .conn
                .prepare_cached(
                    "SELECT EXISTS(SELECT 1 FROM write_journal
                     WHERE revision > ?1 AND path_overlaps(path, ?2))",
                )?
                .query_row(params![self.last_revision, self.path.to_string()], |row| {
                    row.get::<_, bool>(0)
                })?;
        if !touched {
            self.last_revision = revision;
            return Ok(None);
        }
        let (doc, revision) = load_document(&self.conn)?;
        self.last_revision = revision;
        Ok(Some(tree::get_at(&doc, &self.path)))
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    conn.create_scalar_function(
        "path_overlaps",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a: String = ctx.get(0)?;
            let b: String = ctx.get(1)?;
            Ok(match (StorePath::parse(&a), StorePath::parse(&b)) {
                (Ok(a), Ok(b)) => a.overlaps(&b),
                _ => false,
            })
        },
    )?;

    apply_pragmas(&conn)?;
    Ok(conn)
}

fn load_document(conn: &Connection) -> Result<(Value, i64)> {
    let (raw, revision): (String, i64) = conn
        .prepare_cached("SELECT tree, revision FROM document WHERE id = 1")?
        .query_row([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok((serde_json::from_str(&raw)?, revision))
}

fn current_revision(conn: &Connection) -> Result<i64> {
    let revision = conn
        .prepare_cached("SELECT revision FROM document WHERE id = 1")?
        .query_row([], |row| row.get(0))?;
    Ok(revision)
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        eprintln!("[KIB-SQLITE] WARNING: requested WAL mode but got '{mode}'");
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS document (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            tree TEXT NOT NULL,
            revision INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );
        INSERT OR IGNORE INTO document (id, tree, revision, updated_at)
            VALUES (1, '{}', 0, '');

        CREATE TABLE IF NOT EXISTS write_journal (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            revision INTEGER NOT NULL,
            path TEXT NOT NULL,
            written_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_write_journal_revision
            ON write_journal(revision);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteStore::open(&dir.path().join("store.sqlite3"), Duration::from_millis(10))
            .expect("open store");
        (dir, store)
    }

    fn p(raw: &str) -> StorePath {
        StorePath::parse(raw).expect("path")
    }

    #[test]
    fn opens_in_wal_mode_with_empty_document() {
        let (_dir, store) = temp_store();
        assert!(store.is_wal_mode());
        assert_eq!(store.read(&StorePath::root()).expect("read"), json!({}));
        assert_eq!(store.revision().expect("rev"), 0);
        assert_eq!(store.updated_at().expect("updated"), "");
        assert_eq!(store.backend_name(), "sqlite");
    }

    #[test]
    fn batch_writes_persist_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = dir.path().join("nested").join("store.sqlite3");
        {
            let store = SqliteStore::open(&db, Duration::from_millis(10)).expect("open");
            let mut batch = WriteBatch::new();
            batch
                .set(p("devices/x/pet_registry/abc123"), json!("Rex"))
                .set(p("devices/x/portion_level"), json!(60));
            assert_eq!(store.update(&batch).expect("update"), 1);
        }
        let store = SqliteStore::open(&db, Duration::from_millis(10)).expect("reopen");
        assert_eq!(
            store.read(&p("devices/x")).expect("read"),
            json!({"pet_registry": {"abc123": "Rex"}, "portion_level": 60})
        );
        assert_eq!(store.revision().expect("rev"), 1);
        assert!(!store.updated_at().expect("updated").is_empty());
    }

    #[test]
    fn invalid_batch_does_not_bump_revision() {
        let (_dir, store) = temp_store();
        let mut batch = WriteBatch::new();
        batch.set(p("a"), json!(1)).set(p("a/b"), json!(2));
        assert!(store.update(&batch).is_err());
        assert_eq!(store.revision().expect("rev"), 0);
    }

    #[test]
    fn subscription_delivers_overlapping_writes_only() {
        let (_dir, store) = temp_store();
        let rx = store.subscribe(&p("devices/x")).expect("subscribe");
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).expect("initial"),
            Value::Null
        );

        store.set(&p("devices/y/a"), json!(1)).expect("unrelated");
        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());

        store.set(&p("devices/x/a"), json!(2)).expect("related");
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).expect("update"),
            json!({"a": 2})
        );
    }

    fn wait_for_pollers(live: &AtomicUsize, expected: usize) -> usize {
        let deadline = Instant::now() + Duration::from_secs(2);
        while live.load(Ordering::Acquire) != expected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        live.load(Ordering::Acquire)
    }

    #[test]
    fn abandoned_subscription_ends_on_next_touching_write() {
        let (_dir, store) = temp_store();
        let rx = store.subscribe(&p("devices/x")).expect("subscribe");
        rx.recv_timeout(Duration::from_secs(2)).expect("initial");
        assert_eq!(store.subscriber_count(), 1);
        drop(rx);

        store.set(&p("devices/y/a"), json!(1)).expect("unrelated");
        thread::sleep(Duration::from_millis(100));
        assert_eq!(store.subscriber_count(), 1);

        store.set(&p("devices/x/a"), json!(2)).expect("related");
        assert_eq!(wait_for_pollers(&store.pollers, 0), 0);
    }

    #[test]
    fn dropping_the_store_stops_pollers() {
        let (_dir, store) = temp_store();
        let _rx = store.subscribe(&p("devices/x")).expect("subscribe");
        let live = Arc::clone(&store.pollers);
        assert_eq!(live.load(Ordering::Acquire), 1);
        drop(store);
        assert_eq!(wait_for_pollers(&live, 0), 0);
    }

    #[test]
    fn path_overlaps_function_is_registered() {
        let (_dir, store) = temp_store();
        let conn = store.conn.lock();
        let hit: bool = conn
            .query_row("SELECT path_overlaps('/devices', '/devices/x/a')", [], |row| row.get(0))
            .expect("query");
        let miss: bool = conn
            .query_row("SELECT path_overlaps('/devices/y', '/devices/x')", [], |row| row.get(0))
            .expect("query");
        assert!(hit);
        assert!(!miss);
    }
}
