//! Game-data service — the write path every game mutation goes through.
//!
//! Each operation persists locally first and then appends a queue entry for
//! the remote counterpart, so the local store is always the source of truth
//! and nothing here ever waits on the network.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{
    AchievementRecord, CurrencyLedger, CurrencyTransaction, EntryKind, GameDataOp, GameDataRecord,
};
use crate::queue::SyncQueue;
use crate::store::LocalStore;

/// Result of a local save: the persisted record plus the queue entry that
/// will replay it remotely (callers that manage an immediate best-effort push
/// flip that entry once the push lands).
#[derive(Debug)]
pub struct SaveOutcome {
    pub record: GameDataRecord,
    pub queue_key: u64,
}

#[derive(Clone)]
pub struct GameDataService {
    store: Arc<LocalStore>,
    queue: SyncQueue,
}

impl GameDataService {
    pub fn new(store: Arc<LocalStore>) -> Self {
        let queue = SyncQueue::new(store.clone());
        Self { store, queue }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Upsert one game data record. First save creates version 1; subsequent
    /// saves replace the value and increment the version.
    pub fn save_game_data(
        &self,
        child_id: &str,
        game_key: &str,
        data_key: &str,
        data_value: Value,
    ) -> Result<SaveOutcome> {
        let record = match self.store.game_data(child_id, game_key, data_key)? {
            Some(mut existing) => {
                existing.data_value = data_value;
                existing.data_version += 1;
                existing.updated_at = Utc::now();
                existing.synced = false;
                existing
            }
            None => GameDataRecord::new(child_id, game_key, data_key, data_value),
        };

        self.store.put_game_data(&record)?;
        let op = GameDataOp::Upsert {
            record: record.clone(),
        };
        let queue_key = self
            .queue
            .enqueue(EntryKind::GameData, serde_json::to_value(&op)?)?;

        Ok(SaveOutcome { record, queue_key })
    }

    pub fn game_data_item(
        &self,
        child_id: &str,
        game_key: &str,
        data_key: &str,
    ) -> Result<Option<GameDataRecord>> {
        self.store.game_data(child_id, game_key, data_key)
    }

    /// All records for a child, optionally narrowed to one game.
    pub fn load_game_data(
        &self,
        child_id: &str,
        game_key: Option<&str>,
    ) -> Result<Vec<GameDataRecord>> {
        self.store.scan_game_data(|record| {
            record.child_id == child_id && game_key.map_or(true, |g| record.game_key == g)
        })
    }

    /// Remove a record locally and queue the remote delete. Returns the queue
    /// key, or None when the record did not exist (a successful no-op).
    pub fn delete_game_data(
        &self,
        child_id: &str,
        game_key: &str,
        data_key: &str,
    ) -> Result<Option<u64>> {
        if !self.store.delete_game_data(child_id, game_key, data_key)? {
            return Ok(None);
        }
        let op = GameDataOp::Delete {
            child_id: child_id.to_string(),
            game_key: game_key.to_string(),
            data_key: data_key.to_string(),
        };
        let queue_key = self
            .queue
            .enqueue(EntryKind::GameData, serde_json::to_value(&op)?)?;
        Ok(Some(queue_key))
    }

    /// Remove every record a child has for one game. Returns how many were
    /// deleted; each deletion queues its own remote delete.
    pub fn delete_game_data_for_game(&self, child_id: &str, game_key: &str) -> Result<usize> {
        let records = self.load_game_data(child_id, Some(game_key))?;
        let mut deleted = 0;
        for record in &records {
            if self
                .delete_game_data(child_id, game_key, &record.data_key)?
                .is_some()
            {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Queue a fire-and-forget analytics event. Nothing is stored outside the
    /// queue and the call never blocks a local save.
    pub fn record_event(&self, child_id: &str, game_key: &str, event: Value) -> Result<()> {
        let payload = serde_json::json!({
            "childId": child_id,
            "gameKey": game_key,
            "event": event,
            "recordedAt": Utc::now(),
        });
        self.queue.enqueue(EntryKind::GameEvent, payload)?;
        Ok(())
    }

    /// Idempotent unlock: a second unlock of the same achievement returns the
    /// existing record and queues nothing.
    pub fn unlock_achievement(
        &self,
        child_id: &str,
        game_id: &str,
        achievement_id: &str,
        payload: Value,
    ) -> Result<AchievementRecord> {
        if let Some(existing) = self.store.achievement(child_id, game_id, achievement_id)? {
            return Ok(existing);
        }

        let record = AchievementRecord {
            child_id: child_id.to_string(),
            game_id: game_id.to_string(),
            achievement_id: achievement_id.to_string(),
            payload,
            unlocked_at: Utc::now(),
            synced: false,
        };
        self.store.put_achievement(&record)?;
        self.queue
            .enqueue(EntryKind::Achievement, serde_json::to_value(&record)?)?;
        Ok(record)
    }

    pub fn achievements(&self, child_id: &str) -> Result<Vec<AchievementRecord>> {
        self.store.scan_achievements(|r| r.child_id == child_id)
    }

    /// Apply a currency delta. The new balance is the running sum of all
    /// transactions and may never go negative from a local update.
    pub fn update_currency(
        &self,
        child_id: &str,
        amount: i64,
        reason: &str,
    ) -> Result<CurrencyLedger> {
        let mut ledger = self
            .store
            .ledger(child_id)?
            .unwrap_or_else(|| CurrencyLedger::new(child_id));

        let balance_after = ledger
            .balance
            .checked_add(amount)
            .ok_or(Error::BalanceOverflow)?;
        if balance_after < 0 {
            return Err(Error::NegativeBalance);
        }

        let now = Utc::now();
        ledger.transactions.push(CurrencyTransaction {
            amount,
            reason: reason.to_string(),
            timestamp: now,
            balance_after,
        });
        ledger.balance = balance_after;
        ledger.updated_at = now;
        ledger.synced = false;

        self.store.put_ledger(&ledger)?;
        self.queue
            .enqueue(EntryKind::VirtualCurrency, serde_json::to_value(&ledger)?)?;
        Ok(ledger)
    }

    pub fn ledger(&self, child_id: &str) -> Result<Option<CurrencyLedger>> {
        self.store.ledger(child_id)
    }
}
