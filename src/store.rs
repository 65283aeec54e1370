//! Durable local store — the single shared resource of the sync core.
//!
//! Four logical partitions live in one redb database (game data, sync queue,
//! achievements, currency ledgers), plus a file partition for project
//! thumbnails keyed by project id. Records are stored as JSON bytes so the
//! opaque payloads inside them never need a schema here.
//!
//! Opening the store touches only the filesystem; it is safe to call at app
//! startup before any network state is known.

use std::fs;
use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::model::{AchievementRecord, CurrencyLedger, GameDataRecord, SyncQueueEntry};

const GAME_DATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("game_data");
const SYNC_QUEUE_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("sync_queue");
const ACHIEVEMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("achievements");
const CURRENCY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("currency");

const DB_FILE_NAME: &str = "vault.redb";
const THUMBNAIL_DIR_NAME: &str = "thumbnails";

// Component keys are plain identifiers; the unit separator cannot appear in
// them, so composite keys stay collision-free.
const KEY_SEP: &str = "\u{1f}";

fn composite_key(parts: &[&str]) -> String {
    parts.join(KEY_SEP)
}

pub struct LocalStore {
    db: Database,
    thumb_dir: PathBuf,
}

impl LocalStore {
    /// Open (creating if needed) the store under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let thumb_dir = data_dir.join(THUMBNAIL_DIR_NAME);
        fs::create_dir_all(&thumb_dir)?;

        let db = Database::create(data_dir.join(DB_FILE_NAME))?;
        // Ensure all tables exist so reads never race table creation.
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(GAME_DATA_TABLE)?;
            let _ = txn.open_table(SYNC_QUEUE_TABLE)?;
            let _ = txn.open_table(ACHIEVEMENTS_TABLE)?;
            let _ = txn.open_table(CURRENCY_TABLE)?;
        }
        txn.commit()?;

        Ok(Self { db, thumb_dir })
    }

    /// Open the store in the platform data directory.
    pub fn open_default() -> Result<Self> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no platform data directory")
            })?
            .join("playvault");
        Self::open(&data_dir)
    }

    // ── Generic JSON row helpers ─────────────────────────────────────

    fn put_json<T: Serialize>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
        value: &T,
    ) -> Result<()> {
        let encoded = serde_json::to_vec(value)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(table)?;
            table.insert(key, encoded.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> Result<Option<T>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table)?;
        let bytes = table.get(key)?.map(|guard| guard.value().to_vec());
        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Remove a row. Returns false (not an error) when the key was absent.
    fn delete_key(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(table)?;
            let prior = table.remove(key)?.is_some();
            prior
        };
        txn.commit()?;
        Ok(removed)
    }

    fn scan_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
    ) -> Result<Vec<T>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table)?;
        let mut records = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    // ── Game data ────────────────────────────────────────────────────

    pub fn put_game_data(&self, record: &GameDataRecord) -> Result<()> {
        let key = composite_key(&[&record.child_id, &record.game_key, &record.data_key]);
        self.put_json(GAME_DATA_TABLE, &key, record)
    }

    pub fn game_data(
        &self,
        child_id: &str,
        game_key: &str,
        data_key: &str,
    ) -> Result<Option<GameDataRecord>> {
        self.get_json(GAME_DATA_TABLE, &composite_key(&[child_id, game_key, data_key]))
    }

    pub fn delete_game_data(&self, child_id: &str, game_key: &str, data_key: &str) -> Result<bool> {
        self.delete_key(GAME_DATA_TABLE, &composite_key(&[child_id, game_key, data_key]))
    }

    pub fn scan_game_data(
        &self,
        predicate: impl Fn(&GameDataRecord) -> bool,
    ) -> Result<Vec<GameDataRecord>> {
        let mut records: Vec<GameDataRecord> = self.scan_json(GAME_DATA_TABLE)?;
        records.retain(|r| predicate(r));
        Ok(records)
    }

    // ── Achievements ─────────────────────────────────────────────────

    pub fn put_achievement(&self, record: &AchievementRecord) -> Result<()> {
        let key = composite_key(&[&record.child_id, &record.game_id, &record.achievement_id]);
        self.put_json(ACHIEVEMENTS_TABLE, &key, record)
    }

    pub fn achievement(
        &self,
        child_id: &str,
        game_id: &str,
        achievement_id: &str,
    ) -> Result<Option<AchievementRecord>> {
        self.get_json(
            ACHIEVEMENTS_TABLE,
            &composite_key(&[child_id, game_id, achievement_id]),
        )
    }

    pub fn scan_achievements(
        &self,
        predicate: impl Fn(&AchievementRecord) -> bool,
    ) -> Result<Vec<AchievementRecord>> {
        let mut records: Vec<AchievementRecord> = self.scan_json(ACHIEVEMENTS_TABLE)?;
        records.retain(|r| predicate(r));
        Ok(records)
    }

    // ── Currency ─────────────────────────────────────────────────────

    pub fn put_ledger(&self, ledger: &CurrencyLedger) -> Result<()> {
        self.put_json(CURRENCY_TABLE, &ledger.child_id, ledger)
    }

    pub fn ledger(&self, child_id: &str) -> Result<Option<CurrencyLedger>> {
        self.get_json(CURRENCY_TABLE, child_id)
    }

    // ── Sync queue rows ──────────────────────────────────────────────
    //
    // Keys are a monotonically increasing u64, so btree order is insertion
    // order. The higher-level queue API lives in `queue::SyncQueue`.

    pub fn append_queue(&self, entry: &SyncQueueEntry) -> Result<u64> {
        let encoded = serde_json::to_vec(entry)?;
        let txn = self.db.begin_write()?;
        let key = {
            let mut table = txn.open_table(SYNC_QUEUE_TABLE)?;
            let key = table.last()?.map(|(k, _)| k.value() + 1).unwrap_or(0);
            table.insert(key, encoded.as_slice())?;
            key
        };
        txn.commit()?;
        Ok(key)
    }

    pub fn scan_queue(&self) -> Result<Vec<(u64, SyncQueueEntry)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SYNC_QUEUE_TABLE)?;
        let mut entries = Vec::new();
        for item in table.iter()? {
            let (key, value) = item?;
            let entry: SyncQueueEntry = serde_json::from_slice(value.value())?;
            entries.push((key.value(), entry));
        }
        Ok(entries)
    }

    /// Flip an entry's synced flag. Returns false if the key does not exist.
    pub fn mark_queue_synced(&self, key: u64) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let found = {
            let mut table = txn.open_table(SYNC_QUEUE_TABLE)?;
            let existing = table.get(key)?.map(|guard| guard.value().to_vec());
            match existing {
                Some(bytes) => {
                    let mut entry: SyncQueueEntry = serde_json::from_slice(&bytes)?;
                    entry.synced = true;
                    let encoded = serde_json::to_vec(&entry)?;
                    table.insert(key, encoded.as_slice())?;
                    true
                }
                None => false,
            }
        };
        txn.commit()?;
        Ok(found)
    }

    // ── Thumbnails ───────────────────────────────────────────────────

    pub fn thumbnail_path(&self, project_id: &str) -> PathBuf {
        self.thumb_dir.join(format!("{project_id}.png"))
    }

    pub fn write_thumbnail(&self, project_id: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.thumbnail_path(project_id);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Idempotent — removing an absent thumbnail is a no-op.
    pub fn remove_thumbnail(&self, project_id: &str) -> Result<()> {
        let path = self.thumbnail_path(project_id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}
