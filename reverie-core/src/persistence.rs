//! SQLite persistence for characters' memory.
//!
//! A character's [`MemoryStore`] and [`ReflectionCounter`] are saved
//! together, one row per character name:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS characters (
//!     name       TEXT PRIMARY KEY,
//!     store      BLOB NOT NULL,
//!     counter    BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! - Both payloads are JSON, so the schema does not change when node
//!   fields are added.
//! - The store snapshot is re-validated on load; evidence ids stay valid.
//! - An optional CRC-32 over both payloads detects save corruption. A
//!   mismatch is logged, not fatal.
//! - Backups go through SQLite's online-backup API.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{Result, ReverieError};
use crate::memory::MemoryStore;
use crate::reflection::ReflectionCounter;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS characters (
    name       TEXT PRIMARY KEY,
    store      BLOB NOT NULL,
    counter    BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 (ISO 3309) over every part, as a lowercase hex string.
fn crc32_hex(parts: &[&[u8]]) -> String {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in parts.iter().flat_map(|p| p.iter()) {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    format!("{:08x}", !crc)
}

// ---------------------------------------------------------------------------
// Saved state
// ---------------------------------------------------------------------------

/// Everything persisted for one character.
#[derive(Debug, Clone)]
pub struct SavedCharacter {
    /// The character's memory.
    pub store: MemoryStore,
    /// The character's reflection trigger state.
    pub counter: ReflectionCounter,
}

// ---------------------------------------------------------------------------
// PersistenceEngine
// ---------------------------------------------------------------------------

/// Handle to an open SQLite database of saved characters.
///
/// # Usage
///
/// ```no_run
/// # use reverie_core::persistence::PersistenceEngine;
/// # use reverie_core::config::PersistenceConfig;
/// # use reverie_core::{MemoryStore, ReflectionCounter};
/// let engine = PersistenceEngine::open("town.db", &PersistenceConfig::default())?;
/// let store = MemoryStore::new(384);
/// let counter = ReflectionCounter::new(150);
/// engine.save_character("Isabella Rodriguez", &store, &counter)?;
/// let saved = engine.load_character("Isabella Rodriguez")?;
/// # Ok::<(), reverie_core::ReverieError>(())
/// ```
pub struct PersistenceEngine {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for PersistenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceEngine")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PersistenceEngine {
    /// Open (or create) the database at `path`, creating the schema if
    /// needed. WAL mode is enabled when `config.wal_mode` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Reverie persistence engine opened"
        );

        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    // ------------------------------------------------------------------
    // Characters
    // ------------------------------------------------------------------

    /// Save (upsert) a character's store and reflection counter.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Serialization`] if JSON encoding fails, or
    /// [`ReverieError::Database`] on SQLite failures.
    pub fn save_character(
        &self,
        name: &str,
        store: &MemoryStore,
        counter: &ReflectionCounter,
    ) -> Result<()> {
        let start = Instant::now();

        let store_json =
            serde_json::to_vec(store).map_err(|e| ReverieError::Serialization(e.to_string()))?;
        let counter_json =
            serde_json::to_vec(counter).map_err(|e| ReverieError::Serialization(e.to_string()))?;
        let checksum = self
            .config
            .checksum_enabled
            .then(|| crc32_hex(&[store_json.as_slice(), counter_json.as_slice()]));

        self.conn.execute(
            "INSERT INTO characters (name, store, counter, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET
                store = excluded.store,
                counter = excluded.counter,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![name, store_json, counter_json, Utc::now().to_rfc3339(), checksum],
        )?;

        debug!(
            character = name,
            nodes = store.len(),
            bytes = store_json.len() + counter_json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved character"
        );
        Ok(())
    }

    /// Load a character's store and counter, or `None` if never saved.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Serialization`] if a payload does not decode
    /// or the store snapshot fails validation, or [`ReverieError::Database`]
    /// on SQLite failures.
    pub fn load_character(&self, name: &str) -> Result<Option<SavedCharacter>> {
        let start = Instant::now();

        let mut stmt = self
            .conn
            .prepare_cached("SELECT store, counter, checksum FROM characters WHERE name = ?1")?;
        let row: Option<(Vec<u8>, Vec<u8>, Option<String>)> = stmt
            .query_row(params![name], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .optional()?;

        let Some((store_json, counter_json, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&[store_json.as_slice(), counter_json.as_slice()]);
                if expected != actual {
                    warn!(
                        character = name,
                        expected = %expected,
                        actual = %actual,
                        "Checksum mismatch, possible save corruption"
                    );
                }
            }
        }

        let store: MemoryStore = serde_json::from_slice(&store_json)
            .map_err(|e| ReverieError::Serialization(e.to_string()))?;
        let counter: ReflectionCounter = serde_json::from_slice(&counter_json)
            .map_err(|e| ReverieError::Serialization(e.to_string()))?;

        debug!(
            character = name,
            nodes = store.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded character"
        );
        Ok(Some(SavedCharacter { store, counter }))
    }

    /// Delete a character. Returns `true` if a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures.
    pub fn delete_character(&self, name: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM characters WHERE name = ?1", params![name])?;
        Ok(deleted > 0)
    }

    /// Names of all saved characters, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures.
    pub fn list_characters(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT name FROM characters ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    // ------------------------------------------------------------------
    // Backup
    // ------------------------------------------------------------------

    /// Copy the database to `dest_path` with SQLite's online-backup API.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;

        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Database backup completed"
        );
        Ok(())
    }

    /// Write `<db>.bak.1`, shifting older backups up and keeping at most
    /// `config.backup_count`. No-op for in-memory databases.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] or [`ReverieError::Io`] on failure.
    pub fn create_rotating_backup(&self) -> Result<()> {
        let max = self.config.backup_count;
        if self.db_path.as_os_str() == ":memory:" || max == 0 {
            return Ok(());
        }

        let oldest = self.backup_path(max);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        self.backup(self.backup_path(1))?;

        info!(max_backups = max, "Rotating backup created");
        Ok(())
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.db_path.clone().into_os_string();
        name.push(format!(".bak.{n}"));
        PathBuf::from(name)
    }

    // ------------------------------------------------------------------
    // Utility
    // ------------------------------------------------------------------

    /// Path to the database file (`:memory:` for in-memory databases).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `PRAGMA integrity_check`; `Ok(false)` means corruption.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::NewNode;
    use crate::types::{Embedding, NodeId, Triple, Utterance};
    use chrono::{NaiveDate, TimeDelta};

    fn config() -> PersistenceConfig {
        PersistenceConfig {
            checksum_enabled: true,
            ..PersistenceConfig::default()
        }
    }

    fn sample() -> (MemoryStore, ReflectionCounter) {
        let t0 = NaiveDate::from_ymd_opt(2023, 2, 13)
            .and_then(|d| d.and_hms_opt(7, 0, 0))
            .expect("valid time");
        let mut store = MemoryStore::new(2);
        let event = store
            .add(NewNode::event(
                t0,
                Triple::new("Isabella Rodriguez", "is", "opening Hobbs Cafe"),
                "Isabella Rodriguez is opening Hobbs Cafe",
                5,
                Embedding(vec![0.6, 0.8]),
            ))
            .expect("event");
        let chat = store
            .add(NewNode::chat(
                t0 + TimeDelta::minutes(5),
                Triple::new("Isabella Rodriguez", "chat with", "Klaus Mueller"),
                "conversing about the party",
                4,
                Embedding(vec![1.0, 0.0]),
                vec![Utterance::new("Klaus Mueller", "Good morning!")],
            ))
            .expect("chat");
        store
            .add(NewNode::thought(
                t0 + TimeDelta::minutes(6),
                t0 + TimeDelta::days(30),
                Triple::new("Isabella Rodriguez", "plans", "a party"),
                "Isabella Rodriguez plans a party",
                7,
                Embedding(vec![0.0, 1.0]),
                vec![chat, event],
            ))
            .expect("thought");
        let mut counter = ReflectionCounter::new(150);
        counter.record(5);
        counter.record(4);
        (store, counter)
    }

    #[test]
    fn round_trip_save_load() {
        let engine = PersistenceEngine::open_in_memory(&config()).expect("open");
        let (store, counter) = sample();
        engine
            .save_character("Isabella Rodriguez", &store, &counter)
            .expect("save");

        let saved = engine
            .load_character("Isabella Rodriguez")
            .expect("load")
            .expect("saved");
        let before: Vec<_> = store.nodes().cloned().collect();
        let after: Vec<_> = saved.store.nodes().cloned().collect();
        assert_eq!(before, after);
        assert_eq!(saved.counter, counter);
        assert_eq!(
            saved.store.get(NodeId(3)).expect("thought").evidence,
            vec![NodeId(2), NodeId(1)]
        );
    }

    #[test]
    fn load_unknown_returns_none() {
        let engine = PersistenceEngine::open_in_memory(&config()).expect("open");
        assert!(engine.load_character("Nobody").expect("load").is_none());
    }

    #[test]
    fn upsert_overwrites_and_lists() {
        let engine = PersistenceEngine::open_in_memory(&config()).expect("open");
        let (store, mut counter) = sample();
        engine.save_character("Klaus Mueller", &store, &counter).expect("save");
        engine.save_character("Abigail Chen", &store, &counter).expect("save");
        counter.reset();
        engine.save_character("Klaus Mueller", &store, &counter).expect("save again");

        assert_eq!(
            engine.list_characters().expect("list"),
            vec!["Abigail Chen".to_string(), "Klaus Mueller".to_string()]
        );
        let saved = engine.load_character("Klaus Mueller").expect("load").expect("saved");
        assert_eq!(saved.counter.accumulated_importance, 150);

        assert!(engine.delete_character("Abigail Chen").expect("delete"));
        assert!(!engine.delete_character("Abigail Chen").expect("delete again"));
    }

    #[test]
    fn checksum_mismatch_still_loads() {
        let engine = PersistenceEngine::open_in_memory(&config()).expect("open");
        let (store, counter) = sample();
        engine.save_character("Isabella Rodriguez", &store, &counter).expect("save");
        engine
            .conn
            .execute(
                "UPDATE characters SET checksum = 'deadbeef' WHERE name = ?1",
                params!["Isabella Rodriguez"],
            )
            .expect("corrupt checksum");

        let saved = engine.load_character("Isabella Rodriguez").expect("load").expect("saved");
        assert_eq!(saved.store.len(), 3);
    }

    #[test]
    fn corrupt_payload_is_a_serialization_error() {
        let engine = PersistenceEngine::open_in_memory(&config()).expect("open");
        let (store, counter) = sample();
        engine.save_character("Isabella Rodriguez", &store, &counter).expect("save");
        engine
            .conn
            .execute(
                "UPDATE characters SET store = ?1 WHERE name = ?2",
                params![b"{\"dimensions\":2".to_vec(), "Isabella Rodriguez"],
            )
            .expect("corrupt store");

        assert!(matches!(
            engine.load_character("Isabella Rodriguez"),
            Err(ReverieError::Serialization(_))
        ));
    }

    #[test]
    fn integrity_check_passes() {
        let engine = PersistenceEngine::open_in_memory(&config()).expect("open");
        assert!(engine.integrity_check().expect("check"));
    }

    #[test]
    fn file_backup_and_rotation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("town.db");
        let mut config = config();
        config.backup_count = 2;

        let engine = PersistenceEngine::open(&db_path, &config).expect("open");
        let (store, counter) = sample();
        engine.save_character("Isabella Rodriguez", &store, &counter).expect("save");

        engine.create_rotating_backup().expect("backup 1");
        engine.create_rotating_backup().expect("backup 2");
        engine.create_rotating_backup().expect("backup 3");
        assert!(dir.path().join("town.db.bak.1").exists());
        assert!(dir.path().join("town.db.bak.2").exists());
        assert!(!dir.path().join("town.db.bak.3").exists());

        let restored = PersistenceEngine::open(dir.path().join("town.db.bak.2"), &config)
            .expect("open backup");
        assert!(
            restored
                .load_character("Isabella Rodriguez")
                .expect("load")
                .is_some()
        );
    }

    #[test]
    fn crc32_known_vector() {
        assert_eq!(crc32_hex(&[b"1234".as_slice(), b"56789".as_slice()]), "cbf43926");
    }
}
