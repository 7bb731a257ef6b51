#![forbid(unsafe_code)]

//! Tatort episode list and downloader.
//!
//! Episodes are numbered by the Wikipedia list of all Tatort films; files on
//! disk are named `NNNN-slug.mp4` after that number. Archive and page titles
//! are matched against the list by slug prefix.

use anyhow::{Context, Result, bail};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::http::Fetcher;
use crate::mediathekview::{MediathekClient, SearchQuery, download_result};
use crate::prompt::EpisodeChooser;
use crate::repository::write_atomic;
use crate::slug::{normalize_tatort_title, slugify, swap_spelling};
use crate::tools::MediaTools;

pub const EPISODE_LIST_URL: &str = "https://de.wikipedia.org/wiki/Liste_der_Tatort-Folgen";

/// Slugs that prefix-match the wrong film.
const KNOWN_BAD: &[&str] = &[
    // not a Tatort
    "die-professorin-tatort-ölfeld",
    // title exists twice
    "taxi-nach-leipzig",
    "aus-der-traum",
    // matches both "Gold" and "Goldbach"
    "goldbach",
];

const ARCHIVE_TOPIC: &str = "tatort";
const MIN_DURATION_SECS: u64 = 4800;
const PAGE_SIZE: usize = 10;
const BLOCKLIST: &[&str] = &["klare Sprache", "Audiodeskription"];

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static OG_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());

/// One row of `episodes.csv`. Field order is the column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TatortEpisode {
    pub episode: String,
    pub titel: String,
    pub datum: String,
    pub ermittler: String,
    pub ermittler_episode: String,
    pub wiki_link: String,
    pub ermittler_link: String,
    pub sender: String,
    pub kommentar: String,
    #[serde(skip)]
    pub slug: String,
}

impl TatortEpisode {
    pub fn number(&self) -> Option<u32> {
        self.episode.trim().parse().ok()
    }

    fn label(&self) -> String {
        format!("{} – {}", self.episode, self.titel)
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn cell_link(cell: ElementRef<'_>) -> String {
    cell.select(&LINK)
        .next()
        .and_then(|link| link.value().attr("href"))
        .unwrap_or_default()
        .to_string()
}

/// Reads the first table of the Wikipedia episode list.
pub fn scrape_episode_list(html: &str) -> Vec<TatortEpisode> {
    let document = Html::parse_document(html);
    let Some(table) = document.select(&TABLE).next() else {
        return Vec::new();
    };

    table
        .select(&ROW)
        .filter_map(|row| {
            let cells: Vec<ElementRef<'_>> = row.select(&CELL).collect();
            if cells.len() < 9 {
                return None;
            }
            Some(TatortEpisode {
                episode: cell_text(cells[0]),
                titel: cell_text(cells[1]),
                wiki_link: cell_link(cells[1]),
                sender: cell_text(cells[2]),
                datum: cell_text(cells[3]),
                ermittler: cell_text(cells[4]),
                ermittler_link: cell_link(cells[4]),
                ermittler_episode: cell_text(cells[5]),
                kommentar: cell_text(cells[8]),
                slug: String::new(),
            })
        })
        .collect()
}

/// Scrapes the episode list and rewrites the CSV. Returns the row count.
pub fn update_csv(fetcher: &dyn Fetcher, url: &str, path: &Path) -> Result<usize> {
    let html = fetcher.get_text(url)?;
    let episodes = scrape_episode_list(&html);
    if episodes.is_empty() {
        bail!("no episodes found at {url}");
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    for episode in &episodes {
        writer.serialize(episode).context("encoding episode row")?;
    }
    let bytes = writer.into_inner().context("finishing episode CSV")?;
    write_atomic(path, &bytes)?;
    info!(path = %path.display(), episodes = episodes.len(), "episode list updated");
    Ok(episodes.len())
}

/// Loads the CSV, scraping it first when it does not exist yet.
pub fn load_episodes(fetcher: &dyn Fetcher, url: &str, path: &Path) -> Result<Vec<TatortEpisode>> {
    if !path.exists() {
        update_csv(fetcher, url, path)?;
    }
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let mut episodes = Vec::new();
    for row in reader.deserialize() {
        let mut episode: TatortEpisode =
            row.with_context(|| format!("reading {}", path.display()))?;
        episode.slug = slugify(&episode.titel);
        episodes.push(episode);
    }
    Ok(episodes)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    /// Leave out episodes that already have a file on disk.
    pub skip_existing: bool,
    /// Never ask; ambiguous titles are skipped.
    pub noinput: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// `slug` is the file stem the download should use.
    Matched { episode: TatortEpisode, slug: String },
    NotFound,
    KnownBad,
    AlreadyOnDisk,
    Ambiguous,
    Aborted,
}

#[derive(Debug, Clone, Default)]
pub struct EpisodeIndex {
    episodes: Vec<TatortEpisode>,
}

impl EpisodeIndex {
    pub fn new(episodes: Vec<TatortEpisode>) -> Self {
        Self { episodes }
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    fn candidates(&self, slug: &str) -> Vec<&TatortEpisode> {
        self.episodes
            .iter()
            .filter(|e| e.slug.starts_with(slug) || slug.starts_with(e.slug.as_str()))
            .collect()
    }

    pub fn match_title(
        &self,
        title: &str,
        opts: MatchOptions,
        on_disk: impl Fn(&TatortEpisode) -> bool,
        chooser: &dyn EpisodeChooser,
    ) -> Result<MatchOutcome> {
        let title = normalize_tatort_title(title);
        let mut slug = slugify(&title);
        if KNOWN_BAD.contains(&slug.as_str()) {
            return Ok(MatchOutcome::KnownBad);
        }

        let mut matches = self.candidates(&slug);
        if matches.is_empty() {
            if let Some(alternate) = swap_spelling(&slug) {
                slug = alternate;
                matches = self.candidates(&slug);
            }
            if matches.is_empty() {
                debug!(title = %title, "no episode matches");
                return Ok(MatchOutcome::NotFound);
            }
        }

        let exact: Vec<&TatortEpisode> = matches
            .iter()
            .copied()
            .filter(|e| normalize_tatort_title(&e.titel) == title)
            .collect();

        if opts.skip_existing {
            if !exact.is_empty() && exact.iter().all(|e| on_disk(e)) {
                return Ok(MatchOutcome::AlreadyOnDisk);
            }
            if exact.len() == 1 && !on_disk(exact[0]) {
                matches = exact;
            } else {
                matches.retain(|e| !on_disk(e));
                if matches.is_empty() {
                    return Ok(MatchOutcome::AlreadyOnDisk);
                }
            }
        }

        let chosen = if matches.len() == 1 {
            matches[0]
        } else if opts.noinput {
            return Ok(MatchOutcome::Ambiguous);
        } else {
            let same_slug: Vec<&TatortEpisode> =
                matches.iter().copied().filter(|e| e.slug == slug).collect();
            if same_slug.len() == 1 {
                same_slug[0]
            } else {
                let labels: Vec<String> = matches.iter().map(|e| e.label()).collect();
                match chooser.choose(&title, &labels)? {
                    Some(index) if index < matches.len() => matches[index],
                    _ => return Ok(MatchOutcome::Aborted),
                }
            }
        };

        Ok(MatchOutcome::Matched {
            episode: chosen.clone(),
            slug,
        })
    }
}

pub fn episode_filename(number: u32, slug: &str) -> String {
    format!("{number:04}-{slug}.mp4")
}

/// Files in `dir` whose name starts with the zero padded episode number.
pub fn find_on_disk(dir: &Path, number: u32) -> Vec<PathBuf> {
    let prefix = format!("{number:04}-");
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .map(|entry| entry.into_path())
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct BulkOptions {
    pub noinput: bool,
    pub offset: usize,
    /// Consecutive failed pages tolerated before giving up.
    pub max_page_failures: usize,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            noinput: false,
            offset: 0,
            max_page_failures: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub pages: usize,
    pub downloaded: usize,
    pub failed: usize,
}

pub struct TatortDownloader<'a> {
    root: PathBuf,
    fetcher: &'a dyn Fetcher,
    tools: &'a dyn MediaTools,
    api_url: String,
    index: EpisodeIndex,
}

impl<'a> TatortDownloader<'a> {
    pub fn new(
        root: &Path,
        fetcher: &'a dyn Fetcher,
        tools: &'a dyn MediaTools,
        api_url: &str,
        index: EpisodeIndex,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            fetcher,
            tools,
            api_url: api_url.to_string(),
            index,
        }
    }

    fn on_disk(&self, episode: &TatortEpisode) -> bool {
        episode
            .number()
            .is_some_and(|number| !find_on_disk(&self.root, number).is_empty())
    }

    fn target_path(&self, episode: &TatortEpisode, slug: &str) -> Result<PathBuf> {
        let number = episode
            .number()
            .with_context(|| format!("episode number '{}' is not numeric", episode.episode))?;
        Ok(self.root.join(episode_filename(number, slug)))
    }

    fn resolve(
        &self,
        title: &str,
        opts: MatchOptions,
        chooser: &dyn EpisodeChooser,
    ) -> Result<Option<(TatortEpisode, PathBuf)>> {
        let outcome = self
            .index
            .match_title(title, opts, |e| self.on_disk(e), chooser)?;
        match outcome {
            MatchOutcome::Matched { episode, slug } => {
                let path = self.target_path(&episode, &slug)?;
                Ok(Some((episode, path)))
            }
            MatchOutcome::NotFound => {
                println!("Episode '{}' not found!", normalize_tatort_title(title));
                Ok(None)
            }
            other => {
                debug!(title, outcome = ?other, "skipping title");
                Ok(None)
            }
        }
    }

    /// Downloads the episode behind an ARD Mediathek page, named after its
    /// `og:title`. Returns false when there was nothing to download.
    pub fn download_url(&self, url: &str, chooser: &dyn EpisodeChooser) -> Result<bool> {
        let html = self.fetcher.get_text(url)?;
        let title = page_title(&html).with_context(|| format!("no og:title at {url}"))?;

        let opts = MatchOptions {
            skip_existing: true,
            noinput: false,
        };
        let Some((episode, path)) = self.resolve(&title, opts, chooser)? else {
            println!("Episode not found or exists already on disk.");
            return Ok(false);
        };

        println!(
            "Downloading episode {}: {} to {}",
            episode.episode,
            episode.titel,
            path.display()
        );
        self.tools.download(url, &path)?;
        self.tools
            .notify(&format!("Finished downloading {}", episode.titel));
        Ok(true)
    }

    /// Downloads each URL in turn; a failure is logged and the next URL is
    /// still tried. Returns the number of failed URLs.
    pub fn download_urls(&self, urls: &[String], chooser: &dyn EpisodeChooser) -> usize {
        let mut failed = 0;
        for url in urls {
            if let Err(err) = self.download_url(url, chooser) {
                error!(url = %url, "{err:#}");
                failed += 1;
            }
        }
        failed
    }

    /// Pages through every feature-length Tatort in the archive.
    pub fn bulk(&self, opts: BulkOptions, chooser: &dyn EpisodeChooser) -> Result<BulkSummary> {
        let mut summary = BulkSummary::default();
        let mut seen = HashSet::new();
        let mut offset = opts.offset;
        let mut consecutive_failures = 0;

        loop {
            match self.bulk_page(offset, opts, &mut seen, chooser, &mut summary) {
                Ok(0) => break,
                Ok(_) => {
                    consecutive_failures = 0;
                    summary.pages += 1;
                    offset += PAGE_SIZE;
                }
                Err(err) => {
                    consecutive_failures += 1;
                    if consecutive_failures > opts.max_page_failures {
                        return Err(err.context(format!(
                            "giving up after {consecutive_failures} failed pages at offset {offset}"
                        )));
                    }
                    println!("Failure, increasing offset to {}", offset + 1);
                    warn!(offset, error = %err, "bulk page failed");
                    offset += 1;
                }
            }
        }
        Ok(summary)
    }

    fn bulk_page(
        &self,
        offset: usize,
        opts: BulkOptions,
        seen: &mut HashSet<String>,
        chooser: &dyn EpisodeChooser,
        summary: &mut BulkSummary,
    ) -> Result<usize> {
        let client = MediathekClient::new(self.fetcher, &self.api_url);
        let query = SearchQuery {
            min_duration: Some(MIN_DURATION_SECS),
            max_results: PAGE_SIZE,
            offset,
            ..SearchQuery::topic(ARCHIVE_TOPIC).with_blocklist(BLOCKLIST)
        };
        let results = client.search(&query)?;
        println!("Got {} results at offset {offset}", results.len());

        let match_opts = MatchOptions {
            skip_existing: true,
            noinput: opts.noinput,
        };
        for result in &results {
            if !seen.insert(result.title.clone()) {
                continue;
            }
            let Some((episode, path)) = self.resolve(&result.title, match_opts, chooser)? else {
                continue;
            };
            if path.exists() {
                continue;
            }

            let aired = result
                .aired()
                .map(|at| at.format("%d.%m.%Y").to_string())
                .unwrap_or_default();
            info!(
                episode = %episode.episode,
                channel = %result.channel,
                aired = %aired,
                "archive hit matched"
            );
            println!(
                "Downloading {} – {} to {}",
                episode.episode,
                episode.titel,
                path.display()
            );
            match download_result(self.tools, result, &path, false) {
                Ok(_) => {
                    summary.downloaded += 1;
                    self.tools
                        .notify(&format!("Finished downloading {}", episode.titel));
                }
                Err(err) => {
                    summary.failed += 1;
                    println!(
                        "Download failed for {} – {}: {err:#}",
                        episode.episode, episode.titel
                    );
                }
            }
        }
        Ok(results.len())
    }
}

fn page_title(html: &str) -> Option<String> {
    Html::parse_document(html)
        .select(&OG_TITLE)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(str::to_string)
}
