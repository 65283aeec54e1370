//! In-memory `RemoteApi` implementation for tests: records everything it is
//! sent, and can be forced offline or made to fail selected calls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::api::RemoteApi;
use crate::error::{Error, Result};
use crate::model::{AchievementRecord, CurrencyLedger, GameDataRecord};

fn data_key_of(child_id: &str, game_key: &str, data_key: &str) -> String {
    format!("{child_id}/{game_key}/{data_key}")
}

#[derive(Default)]
pub struct MemoryRemote {
    online: AtomicBool,
    fail_requests: AtomicBool,
    fail_fetches: AtomicBool,
    probe_delay_ms: AtomicU64,
    put_delay_ms: AtomicU64,
    failing_data_keys: Mutex<HashSet<String>>,

    pub game_data: Mutex<HashMap<String, GameDataRecord>>,
    pub achievements: Mutex<HashMap<String, AchievementRecord>>,
    pub ledgers: Mutex<HashMap<String, CurrencyLedger>>,
    pub events: Mutex<Vec<Value>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.online.store(true, Ordering::SeqCst);
        remote
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Fail every mutating and fetching call with an HTTP 500.
    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Fail only the fetch calls (pull phase).
    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// Fail `put_game_data` for records with this data key.
    pub fn fail_data_key(&self, data_key: &str) {
        self.failing_data_keys
            .lock()
            .unwrap()
            .insert(data_key.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_requests.store(false, Ordering::SeqCst);
        self.fail_fetches.store(false, Ordering::SeqCst);
        self.failing_data_keys.lock().unwrap().clear();
    }

    pub fn set_probe_delay_ms(&self, ms: u64) {
        self.probe_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Hold `put_game_data` suspended for this long after its gates pass.
    pub fn set_put_delay_ms(&self, ms: u64) {
        self.put_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Place a record on the "server" as if another device had pushed it.
    pub fn seed_game_data(&self, child_id: &str, game_key: &str, data_key: &str, value: Value) {
        let mut record = GameDataRecord::new(child_id, game_key, data_key, value);
        record.synced = true;
        self.game_data
            .lock()
            .unwrap()
            .insert(data_key_of(child_id, game_key, data_key), record);
    }

    fn request_gate(&self) -> Result<()> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(Error::Http { status: 500 });
        }
        Ok(())
    }

    fn fetch_gate(&self) -> Result<()> {
        self.request_gate()?;
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(Error::Http { status: 500 });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for MemoryRemote {
    async fn probe(&self) -> bool {
        let delay = self.probe_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.online.load(Ordering::SeqCst)
    }

    async fn put_game_data(&self, record: &GameDataRecord) -> Result<()> {
        self.request_gate()?;
        if self
            .failing_data_keys
            .lock()
            .unwrap()
            .contains(&record.data_key)
        {
            return Err(Error::Http { status: 500 });
        }
        let delay = self.put_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let mut stored = record.clone();
        stored.synced = true;
        self.game_data.lock().unwrap().insert(
            data_key_of(&record.child_id, &record.game_key, &record.data_key),
            stored,
        );
        Ok(())
    }

    async fn fetch_game_data(
        &self,
        child_id: &str,
        game_key: Option<&str>,
        data_key: Option<&str>,
    ) -> Result<Vec<GameDataRecord>> {
        self.fetch_gate()?;
        Ok(self
            .game_data
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                r.child_id == child_id
                    && game_key.map_or(true, |g| r.game_key == g)
                    && data_key.map_or(true, |k| r.data_key == k)
            })
            .cloned()
            .collect())
    }

    async fn delete_game_data(&self, child_id: &str, game_key: &str, data_key: &str) -> Result<()> {
        self.request_gate()?;
        // Absent is success, like the HTTP client's 404 handling.
        self.game_data
            .lock()
            .unwrap()
            .remove(&data_key_of(child_id, game_key, data_key));
        Ok(())
    }

    async fn post_event(&self, event: &Value) -> Result<()> {
        self.request_gate()?;
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn unlock_achievement(&self, record: &AchievementRecord) -> Result<()> {
        self.request_gate()?;
        let key = format!(
            "{}/{}/{}",
            record.child_id, record.game_id, record.achievement_id
        );
        let mut stored = record.clone();
        stored.synced = true;
        // Idempotent: first unlock wins.
        self.achievements
            .lock()
            .unwrap()
            .entry(key)
            .or_insert(stored);
        Ok(())
    }

    async fn fetch_achievements(&self, child_id: &str) -> Result<Vec<AchievementRecord>> {
        self.fetch_gate()?;
        Ok(self
            .achievements
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.child_id == child_id)
            .cloned()
            .collect())
    }

    async fn push_currency(&self, ledger: &CurrencyLedger) -> Result<()> {
        self.request_gate()?;
        let mut stored = ledger.clone();
        stored.synced = true;
        self.ledgers
            .lock()
            .unwrap()
            .insert(ledger.child_id.clone(), stored);
        Ok(())
    }

    async fn fetch_currency(&self, child_id: &str) -> Result<Option<CurrencyLedger>> {
        self.fetch_gate()?;
        Ok(self.ledgers.lock().unwrap().get(child_id).cloned())
    }
}
