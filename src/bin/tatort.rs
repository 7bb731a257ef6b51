#![forbid(unsafe_code)]

//! Maintains the Tatort episode list and downloads episodes named after it.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mediathek_tools::config::{SettingsOverrides, resolve_settings};
use mediathek_tools::http::HttpClient;
use mediathek_tools::prompt::InquirePrompt;
use mediathek_tools::tatort::{
    BulkOptions, EPISODE_LIST_URL, EpisodeIndex, TatortDownloader, load_episodes, update_csv,
};
use mediathek_tools::tools::{ExternalTools, ensure_program_available};
use std::fs;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(about = "Tatort episode list and downloader", version)]
struct Cli {
    /// Path of the .env file to read.
    #[arg(long, global = true, value_name = "path")]
    env_file: Option<PathBuf>,

    /// Directory holding the episode files and episodes.csv.
    #[arg(long, global = true, value_name = "dir")]
    tatort_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Re-scrape the episode list from Wikipedia.
    UpdateCsv,
    /// Download Mediathek pages; without URLs, ask for them one by one.
    Download {
        #[arg(value_name = "url")]
        urls: Vec<String>,
    },
    /// Download every feature-length Tatort the archive knows about.
    Bulk {
        /// Skip ambiguous titles instead of asking.
        #[arg(long)]
        noinput: bool,

        /// Archive result offset to start from.
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Consecutive failed pages tolerated before giving up.
        #[arg(long, default_value_t = 5)]
        max_failures: usize,
    },
}

fn main() {
    let layer = fmt::layer().compact();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(layer).with(filter).init();

    if let Err(err) = run(Cli::parse()) {
        error!("{err:?}");
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = resolve_settings(SettingsOverrides {
        maus_root: None,
        tatort_root: cli.tatort_root,
        env_path: cli.env_file,
    })?;
    fs::create_dir_all(&settings.tatort_root)
        .with_context(|| format!("creating {}", settings.tatort_root.display()))?;
    let fetcher = HttpClient::new(settings.http_timeout);
    let csv_path = settings.tatort_csv();

    if let Command::UpdateCsv = cli.command {
        println!("Fetching data from Wikipedia");
        let count = update_csv(&fetcher, EPISODE_LIST_URL, &csv_path)?;
        println!("{count} Episoden gefunden!");
        return Ok(());
    }

    ensure_program_available(&settings.yt_dlp)?;
    let tools = ExternalTools::from_settings(&settings);
    let index = EpisodeIndex::new(load_episodes(&fetcher, EPISODE_LIST_URL, &csv_path)?);
    if index.is_empty() {
        bail!("{} has no episodes, run update-csv first", csv_path.display());
    }
    info!(episodes = index.len(), "episode list loaded");
    let downloader = TatortDownloader::new(
        &settings.tatort_root,
        &fetcher,
        &tools,
        &settings.mediathek_api,
        index,
    );
    let prompt = InquirePrompt;

    match cli.command {
        Command::UpdateCsv => Ok(()),
        Command::Download { urls } => {
            println!("Welcome to the Tatort downloader.");
            if urls.is_empty() {
                while let Some(url) = prompt.ask_url().context("reading URL")? {
                    if let Err(err) = downloader.download_url(&url, &prompt) {
                        error!("{err:#}");
                    }
                }
            } else {
                let failed = downloader.download_urls(&urls, &prompt);
                if failed > 0 {
                    bail!("{failed} of {} downloads failed", urls.len());
                }
            }
            Ok(())
        }
        Command::Bulk {
            noinput,
            offset,
            max_failures,
        } => {
            println!("Welcome to the Tatort bulk downloader.");
            let summary = downloader.bulk(
                BulkOptions {
                    noinput,
                    offset,
                    max_page_failures: max_failures,
                },
                &prompt,
            )?;
            println!(
                "{} pages, {} downloaded, {} failed",
                summary.pages, summary.downloaded, summary.failed
            );
            Ok(())
        }
    }
}
