//! Reconciliation engine — merges a local and a remote record set into the
//! new local truth.
//!
//! Policy is whole-record last-writer-wins on the record's modification
//! timestamp. There is no field-level merge: partial merges of nested
//! creative content (overlapping sticker placements and the like) have no
//! well-defined semantics and risk silent corruption. Ties favor the local
//! record, since the local device is the one currently active.
//!
//! `merge` is a pure function of the two input sets; callers persist the
//! result. Malformed remote records never reach this module — the API layer
//! drops them during decode.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::{AchievementRecord, CurrencyLedger, GameDataRecord};

/// A record type the engine knows how to merge.
pub trait Reconcilable {
    /// Logical identity within its collection.
    fn merge_key(&self) -> String;

    /// The timestamp last-writer-wins compares.
    fn modified_at(&self) -> DateTime<Utc>;

    fn set_synced(&mut self, synced: bool);
}

impl Reconcilable for GameDataRecord {
    fn merge_key(&self) -> String {
        format!("{}/{}/{}", self.child_id, self.game_key, self.data_key)
    }

    fn modified_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn set_synced(&mut self, synced: bool) {
        self.synced = synced;
    }
}

impl Reconcilable for AchievementRecord {
    fn merge_key(&self) -> String {
        format!("{}/{}/{}", self.child_id, self.game_id, self.achievement_id)
    }

    fn modified_at(&self) -> DateTime<Utc> {
        self.unlocked_at
    }

    fn set_synced(&mut self, synced: bool) {
        self.synced = synced;
    }
}

impl Reconcilable for CurrencyLedger {
    fn merge_key(&self) -> String {
        self.child_id.clone()
    }

    fn modified_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn set_synced(&mut self, synced: bool) {
        self.synced = synced;
    }
}

/// Merge two record sets per logical key.
///
/// - key only local: kept as-is (its sync flag already says whether it still
///   needs a push);
/// - key only remote: adopted verbatim and flagged synced;
/// - key in both: the strictly later `modified_at` wins in full; equal
///   timestamps keep the local record.
///
/// Output order is by merge key, so results are deterministic.
pub fn merge<T: Reconcilable + Clone>(local: &[T], remote: &[T]) -> Vec<T> {
    let mut merged: BTreeMap<String, T> = local
        .iter()
        .map(|record| (record.merge_key(), record.clone()))
        .collect();

    for remote_record in remote {
        let key = remote_record.merge_key();
        match merged.get(&key) {
            Some(local_record) if remote_record.modified_at() <= local_record.modified_at() => {
                // Local wins, including the tie.
            }
            _ => {
                let mut adopted = remote_record.clone();
                adopted.set_synced(true);
                merged.insert(key, adopted);
            }
        }
    }

    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record_at(data_key: &str, value: i64, secs: i64, synced: bool) -> GameDataRecord {
        let at = Utc.timestamp_opt(secs, 0).unwrap();
        GameDataRecord {
            child_id: "c1".into(),
            game_key: "sticker_book".into(),
            data_key: data_key.into(),
            data_value: json!(value),
            data_version: 1,
            created_at: at,
            updated_at: at,
            synced,
        }
    }

    #[test]
    fn test_remote_later_wins_whole_record() {
        let local = vec![record_at("k", 1, 100, false)];
        let remote = vec![record_at("k", 2, 200, false)];

        let merged = merge(&local, &remote);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].data_value, json!(2));
        assert!(merged[0].synced);
    }

    #[test]
    fn test_local_later_wins() {
        let local = vec![record_at("k", 1, 300, false)];
        let remote = vec![record_at("k", 2, 200, true)];

        let merged = merge(&local, &remote);
        assert_eq!(merged[0].data_value, json!(1));
        assert!(!merged[0].synced);
    }

    #[test]
    fn test_tie_favors_local() {
        let local = vec![record_at("k", 1, 100, false)];
        let remote = vec![record_at("k", 2, 100, true)];

        let merged = merge(&local, &remote);
        assert_eq!(merged[0].data_value, json!(1));
        assert!(!merged[0].synced);
    }

    #[test]
    fn test_local_only_kept_with_flag() {
        let local = vec![record_at("a", 1, 100, false), record_at("b", 2, 100, true)];
        let merged = merge(&local, &[]);

        assert_eq!(merged.len(), 2);
        assert!(!merged[0].synced);
        assert!(merged[1].synced);
    }

    #[test]
    fn test_remote_only_adopted_synced() {
        let remote = vec![record_at("a", 1, 100, false)];
        let merged = merge(&[], &remote);

        assert_eq!(merged.len(), 1);
        assert!(merged[0].synced);
    }

    #[test]
    fn test_disjoint_sets_union() {
        let local = vec![record_at("a", 1, 100, false)];
        let remote = vec![record_at("b", 2, 100, false)];

        let merged = merge(&local, &remote);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].data_key, "a");
        assert_eq!(merged[1].data_key, "b");
    }

    #[test]
    fn test_merge_is_pure() {
        let local = vec![record_at("k", 1, 100, false)];
        let remote = vec![record_at("k", 2, 200, false)];

        let first = merge(&local, &remote);
        let second = merge(&local, &remote);
        assert_eq!(first, second);
        // Inputs untouched.
        assert_eq!(local[0].data_value, json!(1));
        assert!(!remote[0].synced);
    }

    #[test]
    fn test_ledger_whole_record_lww() {
        let early = Utc.timestamp_opt(100, 0).unwrap();
        let late = Utc.timestamp_opt(200, 0).unwrap();

        let local = CurrencyLedger {
            child_id: "c1".into(),
            balance: 10,
            transactions: Vec::new(),
            updated_at: late,
            synced: false,
        };
        let remote = CurrencyLedger {
            child_id: "c1".into(),
            balance: 99,
            transactions: Vec::new(),
            updated_at: early,
            synced: true,
        };

        let merged = merge(&[local], &[remote]);
        assert_eq!(merged[0].balance, 10);
    }
}
