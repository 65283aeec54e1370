//! Project save/load facade — sticker-book projects on top of the game-data
//! partition.
//!
//! A project rides in the `data_value` of one game data record
//! (`sticker_book` / `project_<id>`), so it inherits the queue, the
//! reconciliation policy, and the offline guarantees of that path for free.
//! Thumbnails are side files keyed by project id; only the path is recorded.
//!
//! A local save never fails because the network is unavailable: persistence
//! and queueing come first, the remote push is best-effort.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rand::seq::SliceRandom;
use serde_json::Value;

use crate::api::RemoteApi;
use crate::error::Result;
use crate::games::GameDataService;
use crate::model::{AgeMode, GameDataRecord, SavedProject};
use crate::reconcile;
use crate::store::LocalStore;

pub const STICKER_BOOK_GAME: &str = "sticker_book";

const PROJECT_KEY_PREFIX: &str = "project_";

pub(crate) const LITTLE_KID_NAMES: &[&str] = &[
    "Rainbow Adventure",
    "Happy Stickers",
    "Sunny Day",
    "Animal Friends",
    "Silly Faces",
    "Magic Garden",
    "Dino Party",
    "Ocean Fun",
];

pub(crate) const BIG_KID_NAMES: &[&str] = &[
    "My Sticker Scene",
    "Untitled Creation",
    "New Design",
    "Sticker Story",
    "Art Project",
    "Comic Page",
];

fn project_data_key(id: &str) -> String {
    format!("{PROJECT_KEY_PREFIX}{id}")
}

/// Mint a new project id: millisecond timestamp plus a random suffix. Ids are
/// never reused, even for a "new project" right after a delete.
fn mint_id() -> String {
    format!("{}_{:04x}", Utc::now().timestamp_millis(), rand::random::<u16>())
}

pub struct ProjectStore {
    games: GameDataService,
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteApi>,
    child_id: String,
}

impl ProjectStore {
    pub fn new(store: Arc<LocalStore>, remote: Arc<dyn RemoteApi>, child_id: &str) -> Self {
        Self {
            games: GameDataService::new(store.clone()),
            store,
            remote,
            child_id: child_id.to_string(),
        }
    }

    /// Save a project. With `editing_id` the existing project is updated in
    /// place (same id, original `saved_at`); otherwise a new id is minted.
    pub async fn save(
        &self,
        content: Value,
        age_mode: AgeMode,
        custom_name: Option<&str>,
        thumbnail: Option<&[u8]>,
        editing_id: Option<&str>,
    ) -> Result<SavedProject> {
        let now = Utc::now();
        let existing = match editing_id {
            Some(id) => self.load(id)?,
            None => None,
        };
        let id = editing_id
            .map(str::to_string)
            .unwrap_or_else(mint_id);

        let name = match (custom_name, &existing) {
            (Some(name), _) => name.to_string(),
            (None, Some(prev)) => prev.name.clone(),
            (None, None) => self.auto_name(age_mode)?,
        };

        let thumbnail_path = match thumbnail {
            Some(bytes) => Some(
                self.store
                    .write_thumbnail(&id, bytes)?
                    .to_string_lossy()
                    .into_owned(),
            ),
            None => existing.as_ref().and_then(|p| p.thumbnail_path.clone()),
        };

        let project = SavedProject {
            id: id.clone(),
            name,
            content,
            saved_at: existing.as_ref().map(|p| p.saved_at).unwrap_or(now),
            // Conflict-resolution timestamp: never allowed to move backwards.
            last_modified: existing
                .as_ref()
                .map(|p| now.max(p.last_modified))
                .unwrap_or(now),
            age_mode,
            thumbnail_path,
            description: existing.as_ref().and_then(|p| p.description.clone()),
        };

        let outcome = self.games.save_game_data(
            &self.child_id,
            STICKER_BOOK_GAME,
            &project_data_key(&id),
            serde_json::to_value(&project)?,
        )?;

        // Best-effort immediate push; on failure the queue entry carries it.
        match self.remote.put_game_data(&outcome.record).await {
            Ok(()) => {
                self.games.queue().mark_synced(outcome.queue_key)?;
                // A save that landed while the push was suspended is newer
                // than what went out; it keeps its unsynced flag and its own
                // queue entry covers it.
                if let Some(mut current) = self.store.game_data(
                    &outcome.record.child_id,
                    &outcome.record.game_key,
                    &outcome.record.data_key,
                )? {
                    if current.updated_at <= outcome.record.updated_at && !current.synced {
                        current.synced = true;
                        self.store.put_game_data(&current)?;
                    }
                }
            }
            Err(e) => {
                tracing::debug!("Project push deferred to sync queue: {e}");
            }
        }

        Ok(project)
    }

    pub fn load(&self, id: &str) -> Result<Option<SavedProject>> {
        let record =
            self.games
                .game_data_item(&self.child_id, STICKER_BOOK_GAME, &project_data_key(id))?;
        Ok(record.and_then(|r| decode_project(&r)))
    }

    /// All projects for the child, newest first. Merges with remote state
    /// when the fetch succeeds; falls back to local-only silently otherwise.
    pub async fn list(&self) -> Result<Vec<SavedProject>> {
        let local = self.project_records()?;

        let records = match self
            .remote
            .fetch_game_data(&self.child_id, Some(STICKER_BOOK_GAME), None)
            .await
        {
            Ok(remote_records) => {
                let merged = reconcile::merge(&local, &remote_records);
                for record in &merged {
                    self.store.put_game_data(record)?;
                }
                merged
            }
            Err(e) => {
                tracing::debug!("Project list using local state only: {e}");
                local
            }
        };

        let mut projects: Vec<SavedProject> =
            records.iter().filter_map(decode_project).collect();
        projects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(projects)
    }

    /// Remove a project, its thumbnail, and queue the remote delete. Returns
    /// false only when no local record existed; never an error for repeats.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let queued = self.games.delete_game_data(
            &self.child_id,
            STICKER_BOOK_GAME,
            &project_data_key(id),
        )?;
        let Some(queue_key) = queued else {
            return Ok(false);
        };

        self.store.remove_thumbnail(id)?;

        let remote_result = self
            .remote
            .delete_game_data(&self.child_id, STICKER_BOOK_GAME, &project_data_key(id))
            .await;
        match remote_result {
            Ok(()) => {
                self.games.queue().mark_synced(queue_key)?;
            }
            Err(e) => {
                tracing::debug!("Project delete deferred to sync queue: {e}");
            }
        }

        Ok(true)
    }

    /// Rename a project. Returns false if it does not exist.
    pub async fn rename(&self, id: &str, new_name: &str) -> Result<bool> {
        let Some(project) = self.load(id)? else {
            return Ok(false);
        };
        self.save(
            project.content.clone(),
            project.age_mode,
            Some(new_name),
            None,
            Some(id),
        )
        .await?;
        Ok(true)
    }

    fn project_records(&self) -> Result<Vec<GameDataRecord>> {
        self.games.store().scan_game_data(|r| {
            r.child_id == self.child_id
                && r.game_key == STICKER_BOOK_GAME
                && r.data_key.starts_with(PROJECT_KEY_PREFIX)
        })
    }

    /// Pick an unused name from the age-appropriate pool, falling back to a
    /// numeric suffix once the pool is exhausted.
    fn auto_name(&self, age_mode: AgeMode) -> Result<String> {
        let pool = match age_mode {
            AgeMode::LittleKid => LITTLE_KID_NAMES,
            AgeMode::BigKid => BIG_KID_NAMES,
        };
        let taken: HashSet<String> = self
            .project_records()?
            .iter()
            .filter_map(decode_project)
            .map(|p| p.name)
            .collect();

        let mut rng = rand::thread_rng();
        let unused: Vec<&str> = pool
            .iter()
            .copied()
            .filter(|name| !taken.contains(*name))
            .collect();
        if let Some(name) = unused.choose(&mut rng) {
            return Ok(name.to_string());
        }

        let base = pool.choose(&mut rng).copied().unwrap_or(pool[0]);
        let mut n = 2;
        loop {
            let candidate = format!("{base} {n}");
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

fn decode_project(record: &GameDataRecord) -> Option<SavedProject> {
    match serde_json::from_value(record.data_value.clone()) {
        Ok(project) => Some(project),
        Err(e) => {
            tracing::warn!("Skipping undecodable project record {}: {e}", record.data_key);
            None
        }
    }
}
