//! playvault — offline-first game-data persistence and sync.
//!
//! A client-resident durable store for children's game state (save blobs,
//! achievement unlocks, virtual currency, creative projects) that keeps
//! working with no connectivity, queues every mutation, and reconciles with
//! the backend when it can reach it.
//!
//! - [`store::LocalStore`]: redb-backed partitions plus thumbnail files
//! - [`queue::SyncQueue`]: durable, replayable record of unconfirmed mutations
//! - [`reconcile`]: pure last-writer-wins merge of local and remote sets
//! - [`sync::SyncEngine`]: single-flight cycle — probe, drain, pull, merge
//! - [`games::GameDataService`]: the local-first write path for game state
//! - [`projects::ProjectStore`]: sticker-book save/load facade on top
//!
//! Writes flow UI → store → queue → engine → remote; reads reconcile
//! remote → merge → store → UI. The backend is an ordinary JSON/HTTP
//! collaborator behind the [`api::RemoteApi`] trait.

pub mod api;
pub mod config;
pub mod error;
pub mod games;
pub mod model;
pub mod projects;
pub mod queue;
pub mod reconcile;
pub mod store;
pub mod sync;

#[cfg(test)]
pub mod testutil;

pub use error::{Error, Result};
