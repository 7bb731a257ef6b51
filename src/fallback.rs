//! Origin site, then the archive API, then a video platform search: the first
//! source that produces a file wins.

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

use crate::config::DEFAULT_MEDIATHEK_API;
use crate::error::DownloadError;
use crate::http::Fetcher;
use crate::mediathekview::{MediathekClient, SearchQuery, remove_partial};
use crate::tools::{MediaTools, duration_label};

pub const DEFAULT_BLOCKLIST: &[&str] = &["audiodeskription"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSource {
    Origin,
    Archive,
    Platform,
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VideoSource::Origin => "origin",
            VideoSource::Archive => "archive",
            VideoSource::Platform => "platform",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedVideo {
    pub source: VideoSource,
    /// `M:SS`, or empty when ffprobe could not tell.
    pub duration: String,
}

#[derive(Debug, Clone)]
pub struct FallbackChain {
    pub topic: String,
    pub blocklist: Vec<String>,
    pub platform_search: bool,
    pub api_url: String,
}

impl FallbackChain {
    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            blocklist: DEFAULT_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
            platform_search: true,
            api_url: DEFAULT_MEDIATHEK_API.to_string(),
        }
    }

    pub fn with_api(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    pub fn with_platform_search(mut self, enabled: bool) -> Self {
        self.platform_search = enabled;
        self
    }

    /// yt-dlp search expression for the platform source.
    pub fn platform_query(&self, title: &str) -> String {
        format!("ytsearch1:{} {}", self.topic, title)
    }

    pub fn fetch_video(
        &self,
        fetcher: &dyn Fetcher,
        tools: &dyn MediaTools,
        origin_url: &str,
        title: &str,
        output: &Path,
    ) -> Result<FetchedVideo> {
        let origin_err = match tools.download(origin_url, output) {
            Ok(()) => return Ok(self.fetched(tools, VideoSource::Origin, output)),
            Err(err) => err,
        };
        remove_partial(output);

        if title.trim().is_empty() {
            return Err(origin_err);
        }
        warn!(url = origin_url, error = %origin_err, "origin download failed, trying archive");
        let mut attempts = vec![format!("origin: {origin_err}")];

        match self.try_archive(fetcher, tools, title, output) {
            Ok(()) => return Ok(self.fetched(tools, VideoSource::Archive, output)),
            Err(err) => {
                warn!(title, error = %err, "archive search failed");
                attempts.push(format!("archive: {err}"));
                remove_partial(output);
            }
        }

        if self.platform_search {
            let query = self.platform_query(title);
            info!(query = %query, "searching video platform");
            match tools.download(&query, output) {
                Ok(()) => return Ok(self.fetched(tools, VideoSource::Platform, output)),
                Err(err) => {
                    attempts.push(format!("platform: {err}"));
                    remove_partial(output);
                }
            }
        }

        Err(DownloadError::Exhausted {
            title: title.to_string(),
            attempts,
        }
        .into())
    }

    fn try_archive(
        &self,
        fetcher: &dyn Fetcher,
        tools: &dyn MediaTools,
        title: &str,
        output: &Path,
    ) -> Result<()> {
        let client = MediathekClient::new(fetcher, &self.api_url);
        let mut query = SearchQuery::topic(&self.topic).with_title(title);
        query.blocklist = self.blocklist.clone();
        let results = client
            .search(&query)
            .with_context(|| format!("searching archive for '{title}'"))?;
        if results.is_empty() {
            return Err(DownloadError::NoUrls.into());
        }

        let mut tried = 0;
        for result in &results {
            for url in result.candidate_urls() {
                tried += 1;
                info!(url, title = %result.title, "trying archive URL");
                match tools.download(url, output) {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        warn!(url, error = %err, "archive URL failed");
                        remove_partial(output);
                    }
                }
            }
        }
        if tried == 0 {
            return Err(DownloadError::NoUrls.into());
        }
        Err(DownloadError::AllUrlsFailed {
            count: tried,
            output: output.to_path_buf(),
        }
        .into())
    }

    fn fetched(&self, tools: &dyn MediaTools, source: VideoSource, output: &Path) -> FetchedVideo {
        info!(%source, output = %output.display(), "video downloaded");
        FetchedVideo {
            source,
            duration: duration_label(tools, output),
        }
    }
}
