//! Sync orchestrator — drives the full cycle: connectivity probe, queue
//! drain, remote pull and merge.
//!
//! At most one cycle runs at a time (single-flight); a trigger while one is
//! in flight is a no-op. A cycle never aborts on a per-entry failure: every
//! pending entry gets one attempt and failures simply stay pending for the
//! next cycle. No sync failure is ever surfaced to a user — the only
//! observable signal is the pending count staying above zero.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::RemoteApi;
use crate::error::Result;
use crate::model::{AchievementRecord, CurrencyLedger, EntryKind, GameDataOp, SyncQueueEntry};
use crate::queue::{QueueCounts, SyncQueue};
use crate::reconcile;
use crate::store::LocalStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Full cycle ran (individual entries may still have failed).
    Completed,
    /// Connectivity probe failed; cycle skipped silently.
    Offline,
    /// Another cycle was already in flight.
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Queue entries confirmed by the remote this cycle.
    pub pushed: usize,
    /// Queue entries attempted and left pending.
    pub failed: usize,
    /// Records written back by the reconciliation pass.
    pub reconciled: usize,
}

impl SyncReport {
    fn skipped(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            pushed: 0,
            failed: 0,
            reconciled: 0,
        }
    }
}

/// Clears the in-flight flag when a cycle ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SyncEngine {
    store: Arc<LocalStore>,
    queue: SyncQueue,
    remote: Arc<dyn RemoteApi>,
    in_flight: AtomicBool,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

impl SyncEngine {
    pub fn new(store: Arc<LocalStore>, remote: Arc<dyn RemoteApi>) -> Self {
        let queue = SyncQueue::new(store.clone());
        Self {
            store,
            queue,
            remote,
            in_flight: AtomicBool::new(false),
            last_sync: Mutex::new(None),
        }
    }

    /// Run one full sync cycle for the active child.
    ///
    /// Network trouble is absorbed into retry state; only storage failures
    /// propagate.
    pub async fn sync_child(&self, child_id: &str) -> Result<SyncReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(SyncReport::skipped(SyncOutcome::AlreadyRunning));
        }
        let _guard = FlightGuard(&self.in_flight);

        if !self.remote.probe().await {
            tracing::debug!("Remote unreachable, skipping sync cycle");
            return Ok(SyncReport::skipped(SyncOutcome::Offline));
        }

        let (pushed, failed) = self.drain_queue().await?;
        let reconciled = self.pull_and_merge(child_id).await?;

        if let Ok(mut last) = self.last_sync.lock() {
            *last = Some(Utc::now());
        }

        Ok(SyncReport {
            outcome: SyncOutcome::Completed,
            pushed,
            failed,
            reconciled,
        })
    }

    /// Pending queue counts, for status display.
    pub fn pending_counts(&self) -> Result<QueueCounts> {
        self.queue.counts()
    }

    /// When the last full cycle completed, if ever.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync.lock().ok().and_then(|guard| *guard)
    }

    /// Attempt every pending entry once, kind by kind in a fixed order.
    /// Failures are logged and left pending; the drain keeps going.
    async fn drain_queue(&self) -> Result<(usize, usize)> {
        let mut pushed = 0;
        let mut failed = 0;

        for kind in EntryKind::ALL {
            for (key, entry) in self.queue.pending(Some(kind))? {
                match self.dispatch(&entry).await {
                    Ok(()) => {
                        self.queue.mark_synced(key)?;
                        pushed += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Queue entry {key} ({kind}) not confirmed, retrying later: {e}");
                        failed += 1;
                    }
                }
            }
        }

        Ok((pushed, failed))
    }

    async fn dispatch(&self, entry: &SyncQueueEntry) -> Result<()> {
        match entry.kind {
            EntryKind::GameData => {
                let op: GameDataOp = serde_json::from_value(entry.payload.clone())?;
                match op {
                    GameDataOp::Upsert { record } => {
                        self.remote.put_game_data(&record).await?;
                        self.confirm_game_data(&record)?;
                    }
                    GameDataOp::Delete {
                        child_id,
                        game_key,
                        data_key,
                    } => {
                        self.remote
                            .delete_game_data(&child_id, &game_key, &data_key)
                            .await?;
                    }
                }
            }
            EntryKind::GameEvent => {
                self.remote.post_event(&entry.payload).await?;
            }
            EntryKind::Achievement => {
                let record: AchievementRecord = serde_json::from_value(entry.payload.clone())?;
                self.remote.unlock_achievement(&record).await?;
                self.confirm_achievement(&record)?;
            }
            EntryKind::VirtualCurrency => {
                let ledger: CurrencyLedger = serde_json::from_value(entry.payload.clone())?;
                self.remote.push_currency(&ledger).await?;
                self.confirm_ledger(&ledger)?;
            }
        }
        Ok(())
    }

    // The confirm helpers flip the stored record to synced, but only while it
    // is still at (or before) the pushed state — a save that landed mid-push
    // keeps its unsynced flag.

    fn confirm_game_data(&self, pushed: &crate::model::GameDataRecord) -> Result<()> {
        if let Some(mut current) =
            self.store
                .game_data(&pushed.child_id, &pushed.game_key, &pushed.data_key)?
        {
            if current.updated_at <= pushed.updated_at && !current.synced {
                current.synced = true;
                self.store.put_game_data(&current)?;
            }
        }
        Ok(())
    }

    fn confirm_achievement(&self, pushed: &AchievementRecord) -> Result<()> {
        if let Some(mut current) =
            self.store
                .achievement(&pushed.child_id, &pushed.game_id, &pushed.achievement_id)?
        {
            if !current.synced {
                current.synced = true;
                self.store.put_achievement(&current)?;
            }
        }
        Ok(())
    }

    fn confirm_ledger(&self, pushed: &CurrencyLedger) -> Result<()> {
        if let Some(mut current) = self.store.ledger(&pushed.child_id)? {
            if current.updated_at <= pushed.updated_at && !current.synced {
                current.synced = true;
                self.store.put_ledger(&current)?;
            }
        }
        Ok(())
    }

    /// Fetch remote state for the child and reconcile collection by
    /// collection. A failed fetch leaves that collection local-only; the
    /// others still merge.
    async fn pull_and_merge(&self, child_id: &str) -> Result<usize> {
        let mut reconciled = 0;

        match self.remote.fetch_game_data(child_id, None, None).await {
            Ok(remote_records) => {
                let local = self.store.scan_game_data(|r| r.child_id == child_id)?;
                let merged = reconcile::merge(&local, &remote_records);
                for record in &merged {
                    self.store.put_game_data(record)?;
                }
                reconciled += merged.len();
            }
            Err(e) => tracing::warn!("Game data pull failed, keeping local state: {e}"),
        }

        match self.remote.fetch_achievements(child_id).await {
            Ok(remote_records) => {
                let local = self.store.scan_achievements(|r| r.child_id == child_id)?;
                let merged = reconcile::merge(&local, &remote_records);
                for record in &merged {
                    self.store.put_achievement(record)?;
                }
                reconciled += merged.len();
            }
            Err(e) => tracing::warn!("Achievement pull failed, keeping local state: {e}"),
        }

        match self.remote.fetch_currency(child_id).await {
            Ok(remote_ledger) => {
                let local: Vec<CurrencyLedger> =
                    self.store.ledger(child_id)?.into_iter().collect();
                let remote: Vec<CurrencyLedger> = remote_ledger.into_iter().collect();
                for ledger in reconcile::merge(&local, &remote) {
                    self.store.put_ledger(&ledger)?;
                    reconciled += 1;
                }
            }
            Err(e) => tracing::warn!("Currency pull failed, keeping local state: {e}"),
        }

        Ok(reconciled)
    }
}

/// Spawn the periodic sync ticker. The first cycle runs immediately (the
/// app-start sync), then one per interval; a tick that lands while a cycle is
/// still running is absorbed by the single-flight check.
pub fn spawn_periodic(
    engine: Arc<SyncEngine>,
    child_id: String,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = engine.sync_child(&child_id).await {
                tracing::warn!("Periodic sync cycle failed: {e}");
            }
        }
    })
}
