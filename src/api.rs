//! Remote API collaborator.
//!
//! The backend is a conventional JSON/HTTP service; [`RemoteApi`] is the seam
//! the orchestrator and facades talk through, and [`HttpRemote`] is the
//! reqwest implementation. Tests swap in an in-memory implementation.
//!
//! Malformed records in a fetch response are dropped here, one at a time,
//! with a warning — a single bad element never aborts the rest of the batch,
//! and the reconciliation engine only ever sees well-formed records.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{AchievementRecord, CurrencyLedger, CurrencyTransaction, GameDataRecord};

#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Lightweight connectivity probe. Failure means "offline", not an error.
    async fn probe(&self) -> bool;

    async fn put_game_data(&self, record: &GameDataRecord) -> Result<()>;

    async fn fetch_game_data(
        &self,
        child_id: &str,
        game_key: Option<&str>,
        data_key: Option<&str>,
    ) -> Result<Vec<GameDataRecord>>;

    /// Idempotent — deleting an already-absent record succeeds.
    async fn delete_game_data(&self, child_id: &str, game_key: &str, data_key: &str) -> Result<()>;

    /// Fire-and-forget analytics event.
    async fn post_event(&self, event: &Value) -> Result<()>;

    async fn unlock_achievement(&self, record: &AchievementRecord) -> Result<()>;

    async fn fetch_achievements(&self, child_id: &str) -> Result<Vec<AchievementRecord>>;

    /// Pushes the full running balance and transaction list; the client owns
    /// the arithmetic, the server reconciles.
    async fn push_currency(&self, ledger: &CurrencyLedger) -> Result<()>;

    async fn fetch_currency(&self, child_id: &str) -> Result<Option<CurrencyLedger>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveGameDataBody<'a> {
    game_key: &'a str,
    data_key: &'a str,
    data_value: &'a Value,
    data_version: i64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireGameData {
    #[serde(default)]
    child_id: String,
    game_key: String,
    data_key: String,
    data_value: Value,
    #[serde(default = "default_version")]
    data_version: i64,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn default_version() -> i64 {
    1
}

impl WireGameData {
    fn into_record(self, child_id: &str) -> GameDataRecord {
        GameDataRecord {
            child_id: if self.child_id.is_empty() {
                child_id.to_string()
            } else {
                self.child_id
            },
            game_key: self.game_key,
            data_key: self.data_key,
            data_value: self.data_value,
            data_version: self.data_version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            synced: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAchievement {
    #[serde(default)]
    child_id: String,
    game_id: String,
    achievement_id: String,
    #[serde(default)]
    payload: Value,
    unlocked_at: DateTime<Utc>,
}

impl WireAchievement {
    fn into_record(self, child_id: &str) -> AchievementRecord {
        AchievementRecord {
            child_id: if self.child_id.is_empty() {
                child_id.to_string()
            } else {
                self.child_id
            },
            game_id: self.game_id,
            achievement_id: self.achievement_id,
            payload: self.payload,
            unlocked_at: self.unlocked_at,
            synced: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLedger {
    balance: i64,
    #[serde(default)]
    transactions: Vec<CurrencyTransaction>,
    updated_at: DateTime<Utc>,
}

impl WireLedger {
    fn into_ledger(self, child_id: &str) -> CurrencyLedger {
        CurrencyLedger {
            child_id: child_id.to_string(),
            balance: self.balance,
            transactions: self.transactions,
            updated_at: self.updated_at,
            synced: true,
        }
    }
}

/// Pull the record array out of a list response. The backend wraps lists in a
/// `data` envelope; accept a bare array too.
fn list_items(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn decode_game_data(items: Vec<Value>, child_id: &str) -> Vec<GameDataRecord> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<WireGameData>(item) {
            Ok(wire) => Some(wire.into_record(child_id)),
            Err(e) => {
                tracing::warn!("Skipping malformed remote game data record: {e}");
                None
            }
        })
        .collect()
}

fn decode_achievements(items: Vec<Value>, child_id: &str) -> Vec<AchievementRecord> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<WireAchievement>(item) {
            Ok(wire) => Some(wire.into_record(child_id)),
            Err(e) => {
                tracing::warn!("Skipping malformed remote achievement record: {e}");
                None
            }
        })
        .collect()
}

pub struct HttpRemote {
    base_url: String,
    client: HttpClient,
}

impl HttpRemote {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn check(resp: &reqwest::Response) -> Result<()> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Http {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn probe(&self) -> bool {
        match self.client.get(self.url("/health")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn put_game_data(&self, record: &GameDataRecord) -> Result<()> {
        let body = SaveGameDataBody {
            game_key: &record.game_key,
            data_key: &record.data_key,
            data_value: &record.data_value,
            data_version: record.data_version,
            updated_at: record.updated_at,
        };
        let resp = self
            .client
            .put(self.url(&format!("/children/{}/data", record.child_id)))
            .json(&body)
            .send()
            .await?;
        Self::check(&resp)
    }

    async fn fetch_game_data(
        &self,
        child_id: &str,
        game_key: Option<&str>,
        data_key: Option<&str>,
    ) -> Result<Vec<GameDataRecord>> {
        let mut request = self
            .client
            .get(self.url(&format!("/children/{child_id}/data")));
        if let Some(game_key) = game_key {
            request = request.query(&[("gameKey", game_key)]);
        }
        if let Some(data_key) = data_key {
            request = request.query(&[("dataKey", data_key)]);
        }

        let resp = request.send().await?;
        Self::check(&resp)?;
        let body: Value = resp.json().await?;
        Ok(decode_game_data(list_items(body), child_id))
    }

    async fn delete_game_data(&self, child_id: &str, game_key: &str, data_key: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.url(&format!("/children/{child_id}/data/{game_key}/{data_key}")))
            .send()
            .await?;
        // Already gone remotely — the delete still succeeded.
        if resp.status().as_u16() == 404 {
            return Ok(());
        }
        Self::check(&resp)
    }

    async fn post_event(&self, event: &Value) -> Result<()> {
        let resp = self
            .client
            .post(self.url("/games/events"))
            .json(event)
            .send()
            .await?;
        Self::check(&resp)
    }

    async fn unlock_achievement(&self, record: &AchievementRecord) -> Result<()> {
        let resp = self
            .client
            .post(self.url("/games/achievements/unlock"))
            .json(record)
            .send()
            .await?;
        Self::check(&resp)
    }

    async fn fetch_achievements(&self, child_id: &str) -> Result<Vec<AchievementRecord>> {
        let resp = self
            .client
            .get(self.url(&format!("/children/{child_id}/achievements")))
            .send()
            .await?;
        Self::check(&resp)?;
        let body: Value = resp.json().await?;
        Ok(decode_achievements(list_items(body), child_id))
    }

    async fn push_currency(&self, ledger: &CurrencyLedger) -> Result<()> {
        let resp = self
            .client
            .post(self.url("/games/currency/update"))
            .json(ledger)
            .send()
            .await?;
        Self::check(&resp)
    }

    async fn fetch_currency(&self, child_id: &str) -> Result<Option<CurrencyLedger>> {
        let resp = self
            .client
            .get(self.url(&format!("/children/{child_id}/currency")))
            .send()
            .await?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        Self::check(&resp)?;
        let wire: WireLedger = resp.json().await?;
        Ok(Some(wire.into_ledger(child_id)))
    }
}
