use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use playvault::api::HttpRemote;
use playvault::config::Config;
use playvault::projects::ProjectStore;
use playvault::store::LocalStore;
use playvault::sync::SyncEngine;

fn usage() -> ! {
    eprintln!("Usage: playvault <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status               Pending sync counts and last sync time");
    eprintln!("  sync <child-id>      Run one full sync cycle now");
    eprintln!("  projects <child-id>  List saved projects for a child");
    std::process::exit(2);
}

fn open_store(config: &Config) -> Result<Arc<LocalStore>> {
    let store = match &config.storage.data_dir {
        Some(dir) => LocalStore::open(&PathBuf::from(dir)),
        None => LocalStore::open_default(),
    }
    .context("Failed to open local store")?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else { usage() };

    let config = Config::load().context("Failed to load configuration")?;
    let store = open_store(&config)?;
    let remote = Arc::new(
        HttpRemote::new(&config.api.base_url, config.request_timeout())
            .context("Failed to build API client")?,
    );
    let engine = SyncEngine::new(store.clone(), remote.clone());

    match command.as_str() {
        "status" => {
            let counts = engine.pending_counts()?;
            println!("Pending sync entries: {}", counts.total());
            println!("  game data:        {}", counts.game_data);
            println!("  game events:      {}", counts.game_event);
            println!("  achievements:     {}", counts.achievement);
            println!("  virtual currency: {}", counts.virtual_currency);
            match engine.last_sync() {
                Some(at) => println!("Last successful sync: {at}"),
                None => println!("Last successful sync: never (this session)"),
            }
        }
        "sync" => {
            let child_id = args.get(1).map(String::as_str).unwrap_or_else(|| usage());
            let report = engine.sync_child(child_id).await?;
            println!(
                "Sync {:?}: {} pushed, {} still pending, {} records reconciled",
                report.outcome, report.pushed, report.failed, report.reconciled
            );
        }
        "projects" => {
            let child_id = args.get(1).map(String::as_str).unwrap_or_else(|| usage());
            let projects = ProjectStore::new(store, remote, child_id);
            let listed = projects.list().await?;
            if listed.is_empty() {
                println!("No saved projects.");
            }
            for project in listed {
                println!(
                    "{}  {}  (last modified {})",
                    project.id, project.name, project.last_modified
                );
            }
        }
        other => bail!("Unknown command: {other}"),
    }

    Ok(())
}
