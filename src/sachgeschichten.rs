#![forbid(unsafe_code)]

//! Download orchestration for the Sachgeschichten library: single episodes,
//! one A–Z letter page at a time, or every letter in one run.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::azlist::{AZ_BASE_URL, AzEntry, filter_label, parse_bulk_page, parse_filter_letters};
use crate::config::MausPaths;
use crate::episode::Episode;
use crate::error::{FailureKind, classify};
use crate::fallback::FallbackChain;
use crate::http::Fetcher;
use crate::thumbnail::download_image;
use crate::index::update_index;
use crate::jsonld::fetch_metadata;
use crate::prompt::{PresenterAnswer, PresenterPrompt};
use crate::repository::EpisodeRepository;
use crate::tools::{MediaTools, duration_label};

pub const TOPIC: &str = "Die Maus";

/// Where the presenter of a new download comes from.
pub enum PresenterSource<'p> {
    /// Use this value. An empty value falls back to the repository.
    Explicit(String),
    /// Ask interactively.
    Prompt(&'p dyn PresenterPrompt),
    /// Whatever the stores already know for the slug.
    Repository,
}

impl PresenterSource<'_> {
    fn collected(presenter: Option<&String>) -> Self {
        match presenter {
            Some(name) if !name.is_empty() => PresenterSource::Explicit(name.clone()),
            _ => PresenterSource::Repository,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EpisodeOutcome {
    Downloaded(Episode),
    /// The video and its store entry already existed.
    AlreadyPresent(Episode),
    /// The video existed on disk but had no store entry yet.
    Adopted(Episode),
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BulkOptions {
    /// Only fill the missing list.
    pub no_download: bool,
    /// Never ask for presenters.
    pub no_interactive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkStatus {
    Completed,
    Cancelled,
}

pub struct Library<'a> {
    paths: MausPaths,
    fetcher: &'a dyn Fetcher,
    tools: &'a dyn MediaTools,
    chain: FallbackChain,
}

impl<'a> Library<'a> {
    pub fn new(
        paths: MausPaths,
        fetcher: &'a dyn Fetcher,
        tools: &'a dyn MediaTools,
        chain: FallbackChain,
    ) -> Self {
        Self {
            paths,
            fetcher,
            tools,
            chain,
        }
    }

    pub fn paths(&self) -> &MausPaths {
        &self.paths
    }

    pub fn open_repository(&self) -> Result<EpisodeRepository> {
        EpisodeRepository::open(&self.paths.json_path, &self.paths.missing_path)
    }

    fn fetch_episode(&self, url: &str, original_year: &str) -> Result<Episode> {
        let metadata = fetch_metadata(self.fetcher, url)?;
        let mut episode = Episode::from_metadata(&metadata);
        if episode.url.is_empty() {
            episode.url = url.to_string();
        }
        // The A–Z pages know the first broadcast; the page metadata often
        // only knows when it went online.
        if !original_year.is_empty() && original_year != episode.year {
            debug!(title = %episode.title, from = %episode.year, to = original_year, "using original year");
            episode.year = original_year.to_string();
        }
        Ok(episode)
    }

    /// Probes the video and stores its duration if ffprobe could tell.
    fn fill_duration(&self, episode: &mut Episode) -> bool {
        let label = duration_label(self.tools, &episode.video_path(&self.paths.video_dir));
        if label.is_empty() {
            return false;
        }
        episode.duration = label;
        true
    }

    pub fn download_episode(
        &self,
        url: &str,
        repo: &mut EpisodeRepository,
        presenter: PresenterSource<'_>,
        original_year: &str,
    ) -> Result<EpisodeOutcome> {
        let episode = self.fetch_episode(url, original_year)?;
        self.store_episode(url, episode, repo, presenter)
    }

    fn store_episode(
        &self,
        url: &str,
        mut episode: Episode,
        repo: &mut EpisodeRepository,
        presenter: PresenterSource<'_>,
    ) -> Result<EpisodeOutcome> {
        let slug = episode.slug();

        if episode.is_downloaded(&self.paths.video_dir) {
            if let Some(existing) = repo.get_downloaded_mut(&slug) {
                let filled = !existing.has_valid_duration() && self.fill_duration(existing);
                let present = existing.clone();
                if filled {
                    repo.save()?;
                }
                return Ok(EpisodeOutcome::AlreadyPresent(present));
            }

            self.fill_duration(&mut episode);
            if let PresenterSource::Explicit(name) = &presenter
                && !name.is_empty()
            {
                episode.presenter = name.clone();
            }
            info!(slug = %slug, "adopting video that is already on disk");
            repo.upsert_downloaded(episode.clone());
            repo.remove_from_missing(&slug);
            repo.save()?;
            return Ok(EpisodeOutcome::Adopted(episode));
        }

        episode.presenter = match presenter {
            PresenterSource::Explicit(name) if !name.is_empty() => name,
            PresenterSource::Prompt(prompt) => {
                match prompt.ask(&episode.title, &episode.year)?.stored_value() {
                    Some(name) => name,
                    None => return Ok(EpisodeOutcome::Cancelled),
                }
            }
            _ => repo.get_presenter(&slug),
        };

        let output = episode.video_path(&self.paths.video_dir);
        let fetched = match self
            .chain
            .fetch_video(self.fetcher, self.tools, url, &episode.title, &output)
        {
            Ok(fetched) => fetched,
            Err(err) => {
                if !episode.presenter.is_empty() {
                    repo.add_to_missing(Episode::new(
                        &episode.title,
                        &episode.year,
                        &episode.presenter,
                    ));
                    repo.save()?;
                    info!(slug = %slug, "kept presenter on the missing list");
                }
                return Err(err.context(format!("downloading '{}'", episode.title)));
            }
        };
        episode.duration = fetched.duration;

        if !episode.image_url.is_empty() {
            let image_path = episode.image_path(&self.paths.video_dir);
            if let Err(err) = download_image(self.fetcher, &episode.image_url, &image_path) {
                warn!(url = %episode.image_url, error = %err, "thumbnail download failed");
            }
        }

        repo.upsert_downloaded(episode.clone());
        repo.remove_from_missing(&slug);
        repo.save()?;
        info!(slug = %slug, source = %fetched.source, "episode stored");
        Ok(EpisodeOutcome::Downloaded(episode))
    }

    /// Interactive single-URL flow. Reports every failure itself and only
    /// returns whether the episode ended up in the library.
    pub fn process_url(&self, url: &str, prompt: &dyn PresenterPrompt) -> bool {
        let mut repo = match self.open_repository() {
            Ok(repo) => repo,
            Err(err) => {
                println!("  ✗ Bibliothek konnte nicht geladen werden: {err:#}");
                return false;
            }
        };

        println!("  Lade Metadaten von {url}");
        let episode = match self.fetch_episode(url, "") {
            Ok(episode) => episode,
            Err(err) => {
                report_failure(&err);
                return false;
            }
        };

        println!();
        println!("  {} ({})", episode.title, episode.year);
        if !episode.description.is_empty() {
            let teaser: String = episode.description.chars().take(100).collect();
            println!("  {teaser}...");
        }
        println!();

        if episode.is_downloaded(&self.paths.video_dir) {
            println!("  Bereits vorhanden, überspringe Download");
            let slug = episode.slug();
            if let Some(existing) = repo.get_downloaded_mut(&slug)
                && !existing.has_valid_duration()
            {
                let mut updated = existing.clone();
                if self.fill_duration(&mut updated) {
                    *existing = updated.clone();
                    let saved = repo.save().and_then(|_| update_index(&self.paths.index_path, &repo));
                    match saved {
                        Ok(()) => println!("  Dauer ergänzt: {}", updated.duration),
                        Err(err) => println!("  ✗ Speichern fehlgeschlagen: {err:#}"),
                    }
                }
            }
            return true;
        }

        println!("  Lade Video herunter: {}.mp4", episode.slug());
        match self.store_episode(url, episode, &mut repo, PresenterSource::Prompt(prompt)) {
            Ok(EpisodeOutcome::Cancelled) => {
                println!("  Abgebrochen");
                false
            }
            Ok(
                EpisodeOutcome::Downloaded(stored)
                | EpisodeOutcome::Adopted(stored)
                | EpisodeOutcome::AlreadyPresent(stored),
            ) => {
                println!("  ✓ Video heruntergeladen ({})", stored.duration);
                if let Err(err) = update_index(&self.paths.index_path, &repo) {
                    println!("  ✗ index.md konnte nicht aktualisiert werden: {err:#}");
                    return false;
                }
                println!("  ✓ index.md aktualisiert");
                println!();
                println!("  ======================================");
                println!("  Erfolgreich hinzugefügt: {}", stored.title);
                println!("  ======================================");
                println!();
                true
            }
            Err(err) => {
                report_failure(&err);
                if let Err(err) = update_index(&self.paths.index_path, &repo) {
                    warn!(error = %err, "index update after failure failed");
                }
                false
            }
        }
    }

    /// Reads one letter page, extends the missing list and downloads what is
    /// new. A page that cannot be read is reported and skipped.
    pub fn process_bulk_page(
        &self,
        url: &str,
        opts: BulkOptions,
        repo: &mut EpisodeRepository,
        prompt: &dyn PresenterPrompt,
    ) -> Result<BulkStatus> {
        println!("  Lese {url}");
        let parsed = self
            .fetcher
            .get_text(url)
            .and_then(|html| parse_bulk_page(&html, url));
        let (available, missing) = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                println!("  ✗ Fehler beim Einlesen: {err:#}");
                return Ok(BulkStatus::Completed);
            }
        };
        println!(
            "  ✓ Gefunden: {} verfügbar, {} nicht verfügbar",
            available.len(),
            missing.len()
        );

        if !missing.is_empty() {
            let added = missing
                .iter()
                .filter(|entry| repo.add_to_missing(Episode::new(&entry.title, &entry.year, "")))
                .count();
            if added > 0 {
                println!("  ✓ {added} neue Folgen zur Fehlt-Liste hinzugefügt");
            } else {
                println!("  Keine neuen fehlenden Folgen");
            }
        }

        if opts.no_download || available.is_empty() {
            return Ok(BulkStatus::Completed);
        }

        let to_download: Vec<&AzEntry> = available
            .iter()
            .filter(|entry| {
                entry
                    .url
                    .as_deref()
                    .is_some_and(|url| !repo.is_url_downloaded(url))
            })
            .collect();

        let mut updated = 0;
        for episode in repo.downloaded_mut() {
            if !episode.has_valid_duration()
                && episode.is_downloaded(&self.paths.video_dir)
                && self.fill_duration(episode)
            {
                updated += 1;
            }
        }
        if updated > 0 {
            repo.save()?;
            println!("  ✓ Dauer für {updated} Folgen ergänzt");
        }

        let mut presenters: HashMap<String, String> = HashMap::new();
        if !opts.no_interactive {
            match self.collect_presenters(&available, repo, prompt, &mut presenters)? {
                BulkStatus::Completed => {}
                BulkStatus::Cancelled => {
                    println!("  Abgebrochen");
                    return Ok(BulkStatus::Cancelled);
                }
            }
        }

        if to_download.is_empty() {
            println!("  Alle verfügbaren Folgen bereits heruntergeladen");
            return Ok(BulkStatus::Completed);
        }

        let titles: Vec<&str> = to_download.iter().map(|entry| entry.title.as_str()).collect();
        println!(
            "  Lade {} neue Folgen herunter: {}",
            to_download.len(),
            titles.join(", ")
        );

        let bar = ProgressBar::new(to_download.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("  {msg:<40} [{wide_bar:.yellow/blue}] {pos}/{len}")?
                .progress_chars("=> "),
        );

        let mut downloaded = 0;
        let mut failed: Vec<&AzEntry> = Vec::new();
        for &entry in &to_download {
            bar.set_message(entry.title.clone());
            let Some(url) = entry.url.as_deref() else {
                continue;
            };
            let presenter = presenters.get(&entry.title.to_lowercase());
            let source = PresenterSource::collected(presenter);
            match self.download_episode(url, repo, source, &entry.year) {
                Ok(EpisodeOutcome::Cancelled) => failed.push(entry),
                Ok(_) => downloaded += 1,
                Err(err) => {
                    bar.suspend(|| warn!(title = %entry.title, error = %err, "bulk download failed"));
                    failed.push(entry);
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        println!("  ✓ {downloaded}/{} Folgen heruntergeladen", to_download.len());
        if !failed.is_empty() {
            for entry in &failed {
                let presenter = presenters
                    .get(&entry.title.to_lowercase())
                    .cloned()
                    .unwrap_or_default();
                repo.add_to_missing(Episode::new(&entry.title, &entry.year, &presenter));
            }
            repo.save()?;
            let names: Vec<&str> = failed.iter().map(|entry| entry.title.as_str()).collect();
            println!(
                "  ! Fehlgeschlagen (zur Fehlt-Liste hinzugefügt): {}",
                names.join(", ")
            );
        }

        Ok(BulkStatus::Completed)
    }

    /// Asks for presenters of available episodes neither store knows one
    /// for. Answers for videos already on disk are applied at once.
    fn collect_presenters(
        &self,
        available: &[AzEntry],
        repo: &mut EpisodeRepository,
        prompt: &dyn PresenterPrompt,
        presenters: &mut HashMap<String, String>,
    ) -> Result<BulkStatus> {
        let need: Vec<&AzEntry> = available
            .iter()
            .filter(|entry| {
                let url = entry.url.as_deref().unwrap_or_default();
                let known_downloaded = repo
                    .get_by_url(url)
                    .is_some_and(|episode| !episode.presenter.is_empty());
                let slug = Episode::new(&entry.title, &entry.year, "").slug();
                let known_missing = repo
                    .get_missing(&slug)
                    .is_some_and(|episode| !episode.presenter.is_empty());
                !known_downloaded && !known_missing
            })
            .collect();
        if need.is_empty() {
            return Ok(BulkStatus::Completed);
        }

        println!();
        println!("  Moderator für {} Folgen angeben", need.len());
        println!("  'Überspringen' um ohne Moderator fortzufahren");

        for entry in need {
            let answer = prompt.ask(&entry.title, &entry.year)?;
            if answer == PresenterAnswer::Cancelled {
                return Ok(BulkStatus::Cancelled);
            }
            let Some(name) = answer.stored_value().filter(|name| !name.is_empty()) else {
                continue;
            };
            presenters.insert(entry.title.to_lowercase(), name.clone());

            let url = entry.url.as_deref().unwrap_or_default();
            let video_dir = &self.paths.video_dir;
            if let Some(existing) = repo.get_by_url_mut(url)
                && existing.is_downloaded(video_dir)
            {
                existing.presenter = name;
                repo.save()?;
            }
        }
        Ok(BulkStatus::Completed)
    }

    /// One letter page as a standalone run, finishing with the index.
    pub fn run_bulk(
        &self,
        url: &str,
        opts: BulkOptions,
        prompt: &dyn PresenterPrompt,
    ) -> Result<BulkStatus> {
        let mut repo = self.open_repository()?;
        let status = self.process_bulk_page(url, opts, &mut repo, prompt)?;
        if status == BulkStatus::Completed {
            self.finish(&repo)?;
        }
        Ok(status)
    }

    /// Walks every letter of the A–Z overview.
    pub fn run_all(&self, opts: BulkOptions, prompt: &dyn PresenterPrompt) -> Result<BulkStatus> {
        let mut repo = self.open_repository()?;

        println!("  Lese Filter-Buchstaben von {AZ_BASE_URL}");
        let html = self.fetcher.get_text(AZ_BASE_URL)?;
        let letters = parse_filter_letters(&html, AZ_BASE_URL)
            .with_context(|| format!("reading filter letters from {AZ_BASE_URL}"))?;
        println!("  ✓ Gefunden: {} Filter (Buchstaben/Zahlen)", letters.len());
        println!();

        let mut status = BulkStatus::Completed;
        for (i, letter_url) in letters.iter().enumerate() {
            println!(
                "  [{}/{}] Buchstabe: {}",
                i + 1,
                letters.len(),
                filter_label(letter_url)
            );
            status = self.process_bulk_page(letter_url, opts, &mut repo, prompt)?;
            if status == BulkStatus::Cancelled {
                println!("  Abgebrochen");
                break;
            }
            println!();
        }

        self.finish(&repo)?;
        Ok(status)
    }

    fn finish(&self, repo: &EpisodeRepository) -> Result<()> {
        repo.save()?;
        update_index(&self.paths.index_path, repo)?;
        println!("  ✓ index.md aktualisiert");
        Ok(())
    }
}

fn report_failure(err: &anyhow::Error) {
    match classify(err) {
        FailureKind::Http => println!("  ✗ URL konnte nicht geladen werden: {err:#}"),
        FailureKind::Metadata => println!("  ✗ Metadaten konnten nicht gelesen werden: {err:#}"),
        FailureKind::Download => println!("  ✗ Video-Download fehlgeschlagen: {err:#}"),
        FailureKind::Other => println!("  ✗ Unerwarteter Fehler: {err:#}"),
    }
}
