//! Slug-indexed view over the "downloaded" and "missing" JSON stores.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::episode::Episode;

#[derive(Debug)]
pub struct EpisodeRepository {
    json_path: PathBuf,
    missing_path: PathBuf,
    downloaded: HashMap<String, Episode>,
    missing: HashMap<String, Episode>,
    downloaded_urls: HashSet<String>,
}

impl EpisodeRepository {
    /// Loads both stores. Absent files count as empty stores.
    pub fn open(json_path: &Path, missing_path: &Path) -> Result<Self> {
        let mut repo = Self {
            json_path: json_path.to_path_buf(),
            missing_path: missing_path.to_path_buf(),
            downloaded: HashMap::new(),
            missing: HashMap::new(),
            downloaded_urls: HashSet::new(),
        };
        repo.reload()?;
        Ok(repo)
    }

    pub fn reload(&mut self) -> Result<()> {
        self.downloaded.clear();
        self.missing.clear();
        self.downloaded_urls.clear();

        for entry in read_entries(&self.json_path)? {
            self.insert_downloaded(Episode::from_metadata(&entry));
        }
        for entry in read_entries(&self.missing_path)? {
            let episode = Episode::from_missing(&entry);
            self.missing.insert(episode.slug(), episode);
        }
        debug!(
            downloaded = self.downloaded.len(),
            missing = self.missing.len(),
            "loaded episode stores"
        );
        Ok(())
    }

    /// Canonical form used when comparing page URLs: WDR links sometimes
    /// carry a doubled slash before `filme` or a trailing slash.
    pub fn normalize_url(url: &str) -> String {
        if url.is_empty() {
            return String::new();
        }
        url.replace("//filme", "/filme")
            .trim_end_matches('/')
            .to_lowercase()
    }

    fn insert_downloaded(&mut self, episode: Episode) {
        for url in [&episode.url, &episode.alt_url] {
            if !url.is_empty() {
                self.downloaded_urls.insert(Self::normalize_url(url));
            }
        }
        self.downloaded.insert(episode.slug(), episode);
    }

    pub fn is_url_downloaded(&self, url: &str) -> bool {
        self.downloaded_urls.contains(&Self::normalize_url(url))
    }

    fn slug_for_url(&self, url: &str) -> Option<String> {
        let normalized = Self::normalize_url(url);
        if normalized.is_empty() {
            return None;
        }
        self.downloaded
            .iter()
            .find(|(_, episode)| {
                Self::normalize_url(&episode.url) == normalized
                    || Self::normalize_url(&episode.alt_url) == normalized
            })
            .map(|(slug, _)| slug.clone())
    }

    pub fn get_by_url(&self, url: &str) -> Option<&Episode> {
        let slug = self.slug_for_url(url)?;
        self.downloaded.get(&slug)
    }

    pub fn get_by_url_mut(&mut self, url: &str) -> Option<&mut Episode> {
        let slug = self.slug_for_url(url)?;
        self.downloaded.get_mut(&slug)
    }

    /// Downloaded entries shadow missing ones with the same slug.
    pub fn get_by_slug(&self, slug: &str) -> Option<&Episode> {
        self.downloaded.get(slug).or_else(|| self.missing.get(slug))
    }

    pub fn get_downloaded_mut(&mut self, slug: &str) -> Option<&mut Episode> {
        self.downloaded.get_mut(slug)
    }

    pub fn get_missing(&self, slug: &str) -> Option<&Episode> {
        self.missing.get(slug)
    }

    pub fn get_presenter(&self, slug: &str) -> String {
        self.get_by_slug(slug)
            .map(|episode| episode.presenter.clone())
            .unwrap_or_default()
    }

    pub fn upsert_downloaded(&mut self, mut episode: Episode) {
        let slug = episode.slug();
        if let Some(existing) = self.downloaded.get(&slug) {
            episode.merge_from(existing);
        }
        if let Some(missing) = self.missing.get(&slug) {
            episode.merge_from(missing);
        }
        self.insert_downloaded(episode);
    }

    pub fn remove_from_missing(&mut self, slug: &str) {
        self.missing.remove(slug);
    }

    /// Records an episode as missing. Returns true only when the slug was
    /// neither downloaded nor already listed.
    pub fn add_to_missing(&mut self, episode: Episode) -> bool {
        let slug = episode.slug();
        if self.downloaded.contains_key(&slug) {
            return false;
        }
        if let Some(existing) = self.missing.get_mut(&slug) {
            existing.merge_from(&episode);
            return false;
        }
        self.missing.insert(slug, episode);
        true
    }

    pub fn all_downloaded(&self) -> Vec<&Episode> {
        sorted_by_title(self.downloaded.values())
    }

    pub fn all_missing(&self) -> Vec<&Episode> {
        sorted_by_title(self.missing.values())
    }

    pub fn downloaded_mut(&mut self) -> impl Iterator<Item = &mut Episode> {
        self.downloaded.values_mut()
    }

    pub fn save(&self) -> Result<()> {
        let downloaded: Vec<_> = self
            .all_downloaded()
            .into_iter()
            .map(Episode::to_metadata)
            .collect();
        write_json(&self.json_path, &downloaded)?;

        let missing: Vec<_> = self
            .all_missing()
            .into_iter()
            .map(Episode::to_missing)
            .collect();
        write_json(&self.missing_path, &missing)?;
        Ok(())
    }
}

fn sorted_by_title<'a>(episodes: impl Iterator<Item = &'a Episode>) -> Vec<&'a Episode> {
    let mut list: Vec<_> = episodes.collect();
    list.sort_by_cached_key(|episode| (episode.title.to_lowercase(), episode.slug()));
    list
}

fn read_entries(path: &Path) -> Result<Vec<Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;
    write_atomic(path, payload.as_bytes())
}

/// Replaces `path` in one step so readers never observe a half-written file.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("creating temporary file next to {}", path.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("writing {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
