use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use covhub::cli;
use covhub::provider::CoverageProvider;
use covhub::store::SqliteCoverageStore;

/// covhub — per-revision code coverage aggregation.
#[derive(Parser)]
#[command(name = "covhub", version, about)]
struct Cli {
    /// Path to the SQLite database (default: ./.covhub.db)
    #[arg(long, global = true, default_value = ".covhub.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a raw coverage file and add it to the local store.
    Ingest {
        /// Path to the coverage file (LCOV or Go coverprofile).
        file: PathBuf,

        /// Override format detection (lcov, gocover).
        #[arg(long)]
        format: Option<String>,

        /// Strip this prefix from file paths to make them repo-relative.
        #[arg(long)]
        strip_prefix: Option<String>,

        /// Repository id the snapshot belongs to.
        #[arg(long)]
        repo_id: i64,

        /// Revision (e.g. commit hash) the coverage was measured at.
        #[arg(long)]
        revision: String,

        /// Entry name, e.g. a language or test-suite name.
        #[arg(long)]
        entry: String,

        /// Upload time as RFC3339 (default: now).
        #[arg(long)]
        time: Option<String>,
    },

    /// Apply an upload-request JSON document to the local store.
    Apply {
        /// Path to the request JSON.
        file: PathBuf,

        /// Repository id the request's repo URL resolves to.
        #[arg(long)]
        repo_id: i64,
    },

    /// Print the coverage-list response for a repository.
    List {
        #[arg(long)]
        repo_id: i64,

        /// Repository URL, used to build revision links.
        #[arg(long)]
        repo_url: Option<String>,
    },

    /// Print the file-list response for one entry of a coverage.
    Files {
        /// Coverage id (from `list`).
        #[arg(long)]
        coverage_id: i64,

        /// Entry name.
        #[arg(long)]
        entry: String,

        /// Repository URL, used to build revision links.
        #[arg(long)]
        repo_url: Option<String>,
    },

    /// Build an upload request from coverage files and POST it to a server.
    Upload {
        /// Coverage files, all uploaded under one entry name.
        files: Vec<PathBuf>,

        /// covhub server URL.
        #[arg(long)]
        server: String,

        /// Repository URL registered with the server.
        #[arg(long)]
        repo: String,

        /// Revision the coverage was measured at.
        #[arg(long)]
        revision: String,

        /// Entry name.
        #[arg(long)]
        entry: String,

        /// Override format detection (lcov, gocover).
        #[arg(long)]
        format: Option<String>,

        /// Strip this prefix from file paths to make them repo-relative.
        #[arg(long)]
        strip_prefix: Option<String>,

        /// Upload time as RFC3339 (default: now).
        #[arg(long)]
        time: Option<String>,

        /// Print the request instead of sending it.
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_time(time: Option<&str>) -> Result<DateTime<Utc>> {
    match time {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .context("Invalid --time, expected RFC3339")?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

fn open_provider(db: &std::path::Path) -> Result<CoverageProvider<SqliteCoverageStore>> {
    let store = SqliteCoverageStore::open(db).context("Failed to open database")?;
    CoverageProvider::new(store).context("Failed to load coverages from database")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let out = match cli.command {
        Commands::Ingest {
            file,
            format,
            strip_prefix,
            repo_id,
            revision,
            entry,
            time,
        } => {
            let provider = open_provider(&cli.db)?;
            cli::cmd_ingest(
                &provider,
                &file,
                format.as_deref(),
                strip_prefix.as_deref(),
                repo_id,
                &revision,
                &entry,
                parse_time(time.as_deref())?,
            )?
        }
        Commands::Apply { file, repo_id } => {
            let provider = open_provider(&cli.db)?;
            cli::cmd_apply(&provider, &file, repo_id)?
        }
        Commands::List { repo_id, repo_url } => {
            let provider = open_provider(&cli.db)?;
            cli::cmd_list(&provider, repo_id, repo_url.as_deref())?
        }
        Commands::Files {
            coverage_id,
            entry,
            repo_url,
        } => {
            let provider = open_provider(&cli.db)?;
            cli::cmd_files(&provider, coverage_id, &entry, repo_url.as_deref())?
        }
        Commands::Upload {
            files,
            server,
            repo,
            revision,
            entry,
            format,
            strip_prefix,
            time,
            dry_run,
        } => {
            let request = cli::build_upload_request(
                &files,
                format.as_deref(),
                strip_prefix.as_deref(),
                &repo,
                &revision,
                &entry,
                parse_time(time.as_deref())?,
            )?;
            cli::cmd_upload(&server, &request, dry_run)?
        }
    };

    print!("{}", out);
    Ok(())
}
