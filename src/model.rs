use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One saved blob of game state for a child.
///
/// The payload in `data_value` is opaque at this layer — every game stores a
/// different shape there. Only the envelope (keys, version, timestamps, sync
/// flag) is typed. At most one record exists per
/// `(child_id, game_key, data_key)` triple; saves replace, never append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDataRecord {
    pub child_id: String,
    pub game_key: String,
    pub data_key: String,
    pub data_value: Value,
    pub data_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub synced: bool,
}

impl GameDataRecord {
    pub fn new(child_id: &str, game_key: &str, data_key: &str, data_value: Value) -> Self {
        let now = Utc::now();
        Self {
            child_id: child_id.to_string(),
            game_key: game_key.to_string(),
            data_key: data_key.to_string(),
            data_value,
            data_version: 1,
            created_at: now,
            updated_at: now,
            synced: false,
        }
    }
}

/// Which remote call a queue entry replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    GameData,
    GameEvent,
    Achievement,
    VirtualCurrency,
}

impl EntryKind {
    pub const ALL: [EntryKind; 4] = [
        EntryKind::GameData,
        EntryKind::GameEvent,
        EntryKind::Achievement,
        EntryKind::VirtualCurrency,
    ];
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::GameData => write!(f, "game_data"),
            EntryKind::GameEvent => write!(f, "game_event"),
            EntryKind::Achievement => write!(f, "achievement"),
            EntryKind::VirtualCurrency => write!(f, "virtual_currency"),
        }
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "game_data" => Ok(EntryKind::GameData),
            "game_event" => Ok(EntryKind::GameEvent),
            "achievement" => Ok(EntryKind::Achievement),
            "virtual_currency" => Ok(EntryKind::VirtualCurrency),
            other => Err(format!("unknown queue entry kind: {other}")),
        }
    }
}

/// A pending mutation awaiting confirmation from the remote API.
///
/// Entries are immutable once queued except for the `synced` flag. Confirmed
/// entries are flagged, never deleted — the table doubles as a forensic trail,
/// and flag-only mutation avoids read/delete races with concurrent saves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueEntry {
    pub kind: EntryKind,
    pub payload: Value,
    pub queued_at: DateTime<Utc>,
    pub synced: bool,
}

impl SyncQueueEntry {
    pub fn new(kind: EntryKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            queued_at: Utc::now(),
            synced: false,
        }
    }
}

/// Payload of a `game_data` queue entry. Carries the full record so a replay
/// is idempotent regardless of how stale the entry is by the time it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GameDataOp {
    Upsert {
        record: GameDataRecord,
    },
    Delete {
        child_id: String,
        game_key: String,
        data_key: String,
    },
}

/// An unlocked achievement. Unlocking is idempotent: re-unlocking the same
/// `(child_id, game_id, achievement_id)` never creates a second record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementRecord {
    pub child_id: String,
    pub game_id: String,
    pub achievement_id: String,
    pub payload: Value,
    pub unlocked_at: DateTime<Utc>,
    pub synced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyTransaction {
    pub amount: i64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub balance_after: i64,
}

/// Per-child virtual currency ledger. `balance` is always the running sum of
/// all transaction amounts; the client owns that arithmetic and never lets a
/// local-only update take it negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyLedger {
    pub child_id: String,
    pub balance: i64,
    pub transactions: Vec<CurrencyTransaction>,
    pub updated_at: DateTime<Utc>,
    pub synced: bool,
}

impl CurrencyLedger {
    pub fn new(child_id: &str) -> Self {
        Self {
            child_id: child_id.to_string(),
            balance: 0,
            transactions: Vec::new(),
            updated_at: Utc::now(),
            synced: false,
        }
    }
}

/// Age bracket a project was authored in; selects the auto-name pool and is
/// carried so the editor can reopen the project with the right toolset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgeMode {
    LittleKid,
    BigKid,
}

impl std::fmt::Display for AgeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgeMode::LittleKid => write!(f, "littleKid"),
            AgeMode::BigKid => write!(f, "bigKid"),
        }
    }
}

/// A saved creative project (sticker book scene graph).
///
/// `content` is the serialized scene graph and stays opaque here.
/// `last_modified` is the conflict-resolution timestamp and is monotonically
/// non-decreasing across saves of the same id. Thumbnail bytes live in a side
/// file keyed by project id; only the path rides in the record so sync
/// payloads stay small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedProject {
    pub id: String,
    pub name: String,
    pub content: Value,
    pub saved_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub age_mode: AgeMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_kind_display_roundtrip() {
        for kind in EntryKind::ALL {
            let parsed: EntryKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_entry_kind_unknown_rejected() {
        assert!("downloads".parse::<EntryKind>().is_err());
    }

    #[test]
    fn test_game_data_record_envelope_fields() {
        let rec = GameDataRecord::new("child-1", "sticker_book", "progress", json!({"page": 3}));
        assert_eq!(rec.data_version, 1);
        assert!(!rec.synced);
        assert_eq!(rec.created_at, rec.updated_at);
        assert_eq!(rec.data_value["page"], 3);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let rec = GameDataRecord::new("child-1", "math_blaster", "level", json!(7));
        let value = serde_json::to_value(&rec).unwrap();
        assert!(value.get("childId").is_some());
        assert!(value.get("gameKey").is_some());
        assert!(value.get("dataValue").is_some());
        assert!(value.get("child_id").is_none());
    }

    #[test]
    fn test_game_data_op_tagged_serialization() {
        let op = GameDataOp::Delete {
            child_id: "c".into(),
            game_key: "g".into(),
            data_key: "k".into(),
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["op"], "delete");

        let back: GameDataOp = serde_json::from_value(value).unwrap();
        assert!(matches!(back, GameDataOp::Delete { .. }));
    }

    #[test]
    fn test_age_mode_serializes_camel_case() {
        assert_eq!(
            serde_json::to_value(AgeMode::LittleKid).unwrap(),
            json!("littleKid")
        );
        assert_eq!(AgeMode::LittleKid.to_string(), "littleKid");
    }

    #[test]
    fn test_saved_project_optional_fields_omitted() {
        let project = SavedProject {
            id: "1700000000000_ab12".into(),
            name: "My Sticker Book".into(),
            content: json!({"stickers": []}),
            saved_at: Utc::now(),
            last_modified: Utc::now(),
            age_mode: AgeMode::BigKid,
            thumbnail_path: None,
            description: None,
        };
        let value = serde_json::to_value(&project).unwrap();
        assert!(value.get("thumbnailPath").is_none());
        assert!(value.get("description").is_none());
    }
}
