#![forbid(unsafe_code)]

//! Downloads Sachgeschichten from wdrmaus.de into a local library and keeps
//! `index.md` in sync with it.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mediathek_tools::config::{Settings, SettingsOverrides, resolve_settings};
use mediathek_tools::fallback::FallbackChain;
use mediathek_tools::http::HttpClient;
use mediathek_tools::prompt::InquirePrompt;
use mediathek_tools::sachgeschichten::{BulkOptions, BulkStatus, Library, TOPIC};
use mediathek_tools::tools::{ExternalTools, ensure_program_available};
use std::path::PathBuf;
use std::process::exit;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(about = "Sachgeschichten downloader for wdrmaus.de", version)]
struct Cli {
    /// Path of the .env file to read.
    #[arg(long, global = true, value_name = "path")]
    env_file: Option<PathBuf>,

    /// Directory holding the JSON stores and index.md.
    #[arg(long, global = true, value_name = "dir")]
    maus_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download single episodes; without URLs, ask for them one by one.
    Download {
        #[arg(value_name = "url")]
        urls: Vec<String>,
    },
    /// Read one A–Z letter page, fill the missing list, download what is new.
    Bulk {
        #[arg(value_name = "url")]
        url: String,
        #[command(flatten)]
        opts: BulkArgs,
    },
    /// Walk every letter of the A–Z overview.
    All {
        #[command(flatten)]
        opts: BulkArgs,
    },
}

#[derive(Debug, Clone, Copy, Args)]
struct BulkArgs {
    /// Only fill the missing list.
    #[arg(long)]
    no_download: bool,

    /// Do not ask for presenters.
    #[arg(long)]
    no_interactive: bool,
}

impl From<BulkArgs> for BulkOptions {
    fn from(args: BulkArgs) -> Self {
        BulkOptions {
            no_download: args.no_download,
            no_interactive: args.no_interactive,
        }
    }
}

fn main() {
    let layer = fmt::layer().compact();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(layer).with(filter).init();

    match run(Cli::parse()) {
        Ok(true) => exit(0),
        Ok(false) => exit(1),
        Err(err) => {
            error!("{err:?}");
            exit(1);
        }
    }
}

fn banner(title: &str) {
    println!();
    println!("  ======================================");
    println!("  {title}");
    println!("  ======================================");
    println!();
}

fn run(cli: Cli) -> Result<bool> {
    let settings = resolve_settings(SettingsOverrides {
        maus_root: cli.maus_root,
        tatort_root: None,
        env_path: cli.env_file,
    })?;
    ensure_program_available(&settings.yt_dlp)?;

    let paths = settings.maus_paths();
    paths.prepare()?;
    let fetcher = HttpClient::new(settings.http_timeout);
    let tools = ExternalTools::from_settings(&settings);
    let library = Library::new(paths, &fetcher, &tools, fallback_chain(&settings));
    let prompt = InquirePrompt;

    match cli.command {
        Command::Download { urls } if urls.is_empty() => {
            banner("Sachgeschichten Downloader ('q' zum Beenden)");
            while let Some(url) = prompt.ask_url().context("reading URL")? {
                library.process_url(&url, &prompt);
                println!();
            }
            println!("  Tschüss!");
            Ok(true)
        }
        Command::Download { urls } => {
            banner("Sachgeschichten Downloader");
            let mut all_ok = true;
            for url in &urls {
                all_ok &= library.process_url(url, &prompt);
            }
            Ok(all_ok)
        }
        Command::Bulk { url, opts } => {
            banner("Sachgeschichten Bulk Import");
            let status = library.run_bulk(&url, opts.into(), &prompt)?;
            println!("  Fertig!");
            Ok(status == BulkStatus::Completed)
        }
        Command::All { opts } => {
            banner("Sachgeschichten Komplett");
            let status = library.run_all(opts.into(), &prompt)?;
            println!("  Fertig!");
            Ok(status == BulkStatus::Completed)
        }
    }
}

fn fallback_chain(settings: &Settings) -> FallbackChain {
    FallbackChain::new(TOPIC)
        .with_api(&settings.mediathek_api)
        .with_platform_search(settings.platform_search)
}
