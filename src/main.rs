use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use livehistory::config::AppConfig;
use livehistory::pipeline::{run_once, Collaborators, RunBranch, RunSettings};
use livehistory::playlist::{LocalPlaylistDir, M3uLineParser};
use livehistory::publish::LinkOutcome;
use livehistory::store::SqliteStore;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "livehistory", version, about = "Publish a rolling recently-played history from playlist exports")]
struct Cli {
    /// Config file (defaults to ~/.config/livehistory/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the SQLite database
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Folder of date-stamped .m3u exports
    #[arg(long)]
    playlist_dir: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    let tz = config.resolve_timezone().context("Invalid timezone in config")?;

    // Resolve paths: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.store.db_path.clone())
        .unwrap_or_else(livehistory::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let playlist_dir = match cli.playlist_dir.or(config.source.playlist_dir.clone()) {
        Some(dir) => dir,
        None => anyhow::bail!(
            "No playlist directory. Pass --playlist-dir or set source.playlist_dir in config."
        ),
    };
    log::info!("Playlists: {}", playlist_dir.display());

    let mut store = SqliteStore::open(&db_path, &config.store.record_id)
        .context("Failed to open database")?
        .accept_formulas(config.store.accept_formulas);
    if config.store.create_record {
        store.create_record().context("Failed to create record")?;
    }

    let folder = LocalPlaylistDir::new(playlist_dir, config.source.recursive);
    let parser = M3uLineParser::new();
    let sources = Collaborators {
        enumerator: &folder,
        fetcher: &folder,
        parser: &parser,
    };

    let now = Utc::now().with_timezone(&tz);
    let settings = RunSettings {
        publish: config.publish_settings(),
        policy: config.reconcile_policy(&now),
    };

    let report = run_once(&mut store, &sources, &settings, &now).context("Update failed")?;

    match report.branch {
        RunBranch::NoSourceFiles => println!("No playlist files found, wrote placeholder row"),
        RunBranch::Reconciled => println!(
            "Update complete: {} files, {} existing, {} new, {} written, {} failed files",
            report.files_found,
            report.existing_entries,
            report.new_entries,
            report.rows_written,
            report.batches_failed
        ),
    }
    if let LinkOutcome::Rejected(reason) = &report.links {
        println!("Search links not written: {reason}");
    }

    Ok(())
}
