//! Routines server binary.
//!
//! Creates the concrete store and git implementations and hands them to the
//! API layer, which stays agnostic of both.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use miette::Diagnostic;
use routines::api::{self, ApiError, AppState, Config};
use routines::db::{Database, DbError, SqliteDatabase};
use routines::media::MediaStore;
use routines::sync::{RealGit, RepositorySync, SyncConfig, get_data_dir, get_db_path};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Diagnostic, Debug)]
enum BinaryError {
    #[error("Database error: {0}")]
    #[diagnostic(code(routines::binary::database))]
    Database(#[from] DbError),

    #[error("Failed to create data directory: {0}")]
    #[diagnostic(code(routines::binary::io))]
    Io(#[from] std::io::Error),

    #[error("API server error: {0}")]
    #[diagnostic(code(routines::binary::api))]
    Api(#[from] ApiError),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(routines::binary::json))]
    Json(#[from] serde_json::Error),
}

#[derive(Parser)]
#[command(name = "routines")]
#[command(author, version, about = "Workout routines server with a git-mirrored store", long_about = None)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Data directory, also the git working copy (default: $XDG_DATA_HOME/routines)
    #[arg(long, global = true, env = "ROUTINES_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Database file path (default: <data dir>/data.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Git remote to push snapshots to
    #[arg(long, global = true)]
    remote_url: Option<String>,

    /// Branch to push to
    #[arg(long, global = true)]
    branch: Option<String>,

    /// Enable or disable the git mirror
    #[arg(long, global = true, value_name = "BOOL")]
    sync: Option<bool>,

    /// Stage uploaded media in mirror commits
    #[arg(long, global = true, value_name = "BOOL")]
    commit_media: Option<bool>,

    /// Stage a copy of the database file in mirror commits
    #[arg(long, global = true, value_name = "BOOL")]
    commit_store: Option<bool>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Host address to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,

        /// Port to listen on
        #[arg(short, long, default_value = "5000")]
        port: u16,

        /// ffmpeg binary used for thumbnails
        #[arg(long, default_value = "ffmpeg")]
        ffmpeg: PathBuf,
    },
    /// Bring the database to the current schema and exit
    Migrate,
    /// Export, commit and push a snapshot now
    Publish {
        /// Commit message
        #[arg(short, long)]
        message: Option<String>,

        /// Also stage the media directory (needs --commit-media)
        #[arg(long)]
        include_assets: bool,
    },
    /// Show the state of the git working copy
    Status,
}

impl StoreArgs {
    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(get_data_dir)
    }

    /// Environment first, then command-line overrides.
    fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::from_env().with_work_dir(self.data_dir());
        if let Some(url) = &self.remote_url {
            config = config.with_remote_url(url);
        }
        if let Some(branch) = &self.branch {
            config = config.with_branch(branch);
        }
        if let Some(enabled) = self.sync {
            config = config.with_enabled(enabled);
        }
        if let Some(commit_media) = self.commit_media {
            config = config.with_commit_media(commit_media);
        }
        if let Some(commit_store) = self.commit_store {
            config = config.with_commit_store(commit_store);
        }
        config
    }

    async fn open_db(&self) -> Result<SqliteDatabase, BinaryError> {
        let db_path = self
            .db
            .clone()
            .unwrap_or_else(|| get_db_path(&self.data_dir()));
        info!(path = %db_path.display(), "Opening database");

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(SqliteDatabase::open(&db_path).await?)
    }

    /// Open and bring to the current schema. Schema problems are logged, not fatal.
    async fn open_migrated(&self) -> Result<SqliteDatabase, BinaryError> {
        let db = self.open_db().await?;
        let report = db.migrate().await;
        if report.failures > 0 {
            warn!(failures = report.failures, "Schema pass finished with failures");
        }
        Ok(db)
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    api::init_tracing();
    run(Cli::parse()).await?;
    Ok(())
}

async fn run(cli: Cli) -> Result<(), BinaryError> {
    let config = cli.store.sync_config();

    match cli.command {
        Commands::Serve { host, port, ffmpeg } => {
            let db = cli.store.open_migrated().await?;
            let media = MediaStore::new(&config.work_dir).with_ffmpeg(ffmpeg);
            std::fs::create_dir_all(media.videos_dir())?;

            let git = RealGit::new().with_timeout(config.timeout);
            let (state, _worker) = AppState::start(db, git, config, media);
            api::run(Config { host, port }, state).await?;
        }
        Commands::Migrate => {
            let db = cli.store.open_db().await?;
            let report = db.migrate().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Publish {
            message,
            include_assets,
        } => {
            let db = cli.store.open_migrated().await?;
            let sync = RepositorySync::new(RealGit::new().with_timeout(config.timeout), config);
            let report = sync
                .publish_report(&db, None, message.as_deref(), include_assets)
                .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Status => {
            let sync = RepositorySync::new(RealGit::new().with_timeout(config.timeout), config);
            println!("{}", serde_json::to_string_pretty(&sync.status().await)?);
        }
    }

    Ok(())
}
