//! Client for the MediathekViewWeb archive search API.
//!
//! The API indexes the public broadcaster media libraries and answers with
//! direct video URLs in up to three qualities.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::DownloadError;
use crate::http::Fetcher;
use crate::tools::MediaTools;

#[derive(Debug, Clone, Serialize)]
struct FieldQuery {
    fields: Vec<&'static str>,
    query: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody {
    queries: Vec<FieldQuery>,
    sort_by: &'static str,
    sort_order: &'static str,
    /// The API expects the literal string, not a boolean.
    future: &'static str,
    offset: usize,
    size: usize,
    #[serde(rename = "duration_min", skip_serializing_if = "Option::is_none")]
    duration_min: Option<u64>,
}

/// Parameters of one archive search.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub topic: String,
    pub title: Option<String>,
    /// Minimum duration in seconds, e.g. 4800 for feature-length films.
    pub min_duration: Option<u64>,
    pub max_results: usize,
    pub offset: usize,
    /// Results whose title contains any of these (case-insensitive) are
    /// dropped.
    pub blocklist: Vec<String>,
}

impl SearchQuery {
    pub fn topic(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            title: None,
            min_duration: None,
            max_results: 10,
            offset: 0,
            blocklist: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_blocklist(mut self, blocklist: &[&str]) -> Self {
        self.blocklist = blocklist.iter().map(|entry| entry.to_string()).collect();
        self
    }

    fn body(&self) -> QueryBody {
        let mut queries = vec![FieldQuery {
            fields: vec!["topic"],
            query: self.topic.clone(),
        }];
        if let Some(title) = self.title.as_deref().filter(|title| !title.is_empty()) {
            queries.push(FieldQuery {
                fields: vec!["title"],
                query: title.to_string(),
            });
        }
        QueryBody {
            queries,
            sort_by: "timestamp",
            sort_order: "desc",
            future: "false",
            offset: self.offset,
            size: self.max_results,
            duration_min: self.min_duration.filter(|min| *min > 0),
        }
    }
}

/// A single archive hit.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct MediathekResult {
    pub title: String,
    pub topic: String,
    pub channel: String,
    pub description: String,
    /// Length in seconds.
    pub duration: u64,
    /// Broadcast time as a unix timestamp.
    pub timestamp: i64,
    pub url_video: String,
    pub url_video_hd: String,
    pub url_video_low: String,
}

impl MediathekResult {
    /// Non-empty URLs, best quality first.
    pub fn candidate_urls(&self) -> Vec<&str> {
        [&self.url_video_hd, &self.url_video, &self.url_video_low]
            .into_iter()
            .map(String::as_str)
            .filter(|url| !url.is_empty())
            .collect()
    }

    pub fn best_url(&self) -> Option<&str> {
        self.candidate_urls().into_iter().next()
    }

    pub fn aired(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0).filter(|_| self.timestamp > 0)
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ResponseBody {
    err: Option<Value>,
    result: Option<ResultBody>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ResultBody {
    results: Vec<MediathekResult>,
    #[serde(rename = "queryInfo")]
    query_info: Option<QueryInfo>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct QueryInfo {
    total_results: Option<u64>,
}

pub struct MediathekClient<'a> {
    fetcher: &'a dyn Fetcher,
    api_url: String,
}

impl<'a> MediathekClient<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, api_url: &str) -> Self {
        Self {
            fetcher,
            api_url: api_url.to_string(),
        }
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<MediathekResult>> {
        let body = serde_json::to_value(query.body()).context("encoding search query")?;
        let reply = self.fetcher.post_json(&self.api_url, &body)?;
        let parsed: ResponseBody =
            serde_json::from_value(reply).context("decoding search response")?;
        if let Some(err) = parsed.err.filter(|err| !err.is_null()) {
            bail!("API error: {err}");
        }
        let result = parsed.result.unwrap_or_default();
        debug!(
            topic = %query.topic,
            offset = query.offset,
            returned = result.results.len(),
            total = ?result.query_info.and_then(|info| info.total_results),
            "archive search"
        );

        let blocklist: Vec<String> = query
            .blocklist
            .iter()
            .map(|entry| entry.to_lowercase())
            .collect();
        Ok(result
            .results
            .into_iter()
            .filter(|hit| {
                let title = hit.title.to_lowercase();
                !blocklist.iter().any(|blocked| title.contains(blocked))
            })
            .collect())
    }
}

/// A finished download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub duration_seconds: Option<f64>,
}

/// Tries HD, normal and low quality of `result` in turn. Partial files left
/// by a failed attempt are removed before the next one.
pub fn download_result(
    tools: &dyn MediaTools,
    result: &MediathekResult,
    output: &Path,
    probe: bool,
) -> Result<DownloadOutcome> {
    let urls = result.candidate_urls();
    if urls.is_empty() {
        return Err(DownloadError::NoUrls.into());
    }

    for url in &urls {
        info!(url, title = %result.title, "trying archive URL");
        match tools.download(url, output) {
            Ok(()) => {
                let duration_seconds = if probe && output.exists() {
                    tools.probe_duration(output)
                } else {
                    None
                };
                return Ok(DownloadOutcome {
                    path: output.to_path_buf(),
                    duration_seconds,
                });
            }
            Err(err) => {
                warn!(url, error = %err, "archive URL failed");
                remove_partial(output);
            }
        }
    }

    Err(DownloadError::AllUrlsFailed {
        count: urls.len(),
        output: output.to_path_buf(),
    }
    .into())
}

pub(crate) fn remove_partial(output: &Path) {
    if output.exists()
        && let Err(err) = fs::remove_file(output)
    {
        warn!(path = %output.display(), error = %err, "could not remove partial download");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::FakeFetcher;
    use crate::tools::fake::FakeTools;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    const API: &str = "https://mediathekviewweb.de/api/query";

    fn hit(title: &str, hd: &str, normal: &str, low: &str) -> Value {
        json!({
            "title": title,
            "topic": "Die Maus",
            "channel": "ARD",
            "duration": 540,
            "timestamp": 1700000000,
            "url_video": normal,
            "url_video_hd": hd,
            "url_video_low": low
        })
    }

    #[test]
    fn search_sends_expected_body_and_filters_blocklist() {
        let fetcher = FakeFetcher::default().with_post_reply(json!({
            "err": null,
            "result": {
                "results": [
                    hit("Brot", "https://hd/brot.mp4", "", ""),
                    hit("Brot (Audiodeskription)", "https://hd/brot-ad.mp4", "", ""),
                ],
                "queryInfo": {"totalResults": 2}
            }
        }));
        let client = MediathekClient::new(&fetcher, API);
        let query = SearchQuery {
            min_duration: Some(4800),
            offset: 20,
            ..SearchQuery::topic("Die Maus")
                .with_title("Brot")
                .with_blocklist(&["audiodeskription"])
        };
        let results = client.search(&query).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Brot");
        assert_eq!(
            fetcher.post_bodies.borrow()[0],
            json!({
                "queries": [
                    {"fields": ["topic"], "query": "Die Maus"},
                    {"fields": ["title"], "query": "Brot"}
                ],
                "sortBy": "timestamp",
                "sortOrder": "desc",
                "future": "false",
                "offset": 20,
                "size": 10,
                "duration_min": 4800
            })
        );
    }

    #[test]
    fn search_surfaces_api_errors() {
        let fetcher = FakeFetcher::default().with_post_reply(json!({"err": ["bad query"]}));
        let client = MediathekClient::new(&fetcher, API);
        let err = client.search(&SearchQuery::topic("tatort")).unwrap_err();
        assert!(err.to_string().contains("API error"));
    }

    #[test]
    fn search_tolerates_missing_fields() {
        let fetcher = FakeFetcher::default().with_post_reply(json!({
            "result": {"results": [{"title": "Nur Titel"}]}
        }));
        let client = MediathekClient::new(&fetcher, API);
        let results = client.search(&SearchQuery::topic("tatort")).unwrap();
        assert_eq!(results[0].title, "Nur Titel");
        assert!(results[0].candidate_urls().is_empty());
        assert!(results[0].aired().is_none());
    }

    #[test]
    fn candidate_urls_prefer_hd() {
        let result: MediathekResult =
            serde_json::from_value(hit("X", "https://hd", "https://sd", "https://low")).unwrap();
        assert_eq!(
            result.candidate_urls(),
            vec!["https://hd", "https://sd", "https://low"]
        );
        assert_eq!(result.best_url(), Some("https://hd"));
        let sd_only: MediathekResult =
            serde_json::from_value(hit("X", "", "https://sd", "")).unwrap();
        assert_eq!(sd_only.best_url(), Some("https://sd"));
        assert_eq!(
            result.aired().map(|date| date.format("%Y-%m-%d").to_string()),
            Some("2023-11-14".to_string())
        );
    }

    #[test]
    fn download_result_falls_through_qualities_and_cleans_up() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("brot.mp4");
        let tools = FakeTools {
            leave_partial: true,
            ..FakeTools::working(&["https://low"])
        };
        let result: MediathekResult =
            serde_json::from_value(hit("Brot", "https://hd", "https://sd", "https://low")).unwrap();

        let outcome = download_result(&tools, &result, &output, true).unwrap();
        assert_eq!(outcome.path, output);
        assert_eq!(outcome.duration_seconds, Some(312.0));
        assert_eq!(
            *tools.downloads.borrow(),
            vec!["https://hd", "https://sd", "https://low"]
        );
        assert_eq!(std::fs::read(&output).unwrap(), b"video");
    }

    #[test]
    fn download_result_reports_exhaustion() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("brot.mp4");
        let tools = FakeTools {
            leave_partial: true,
            ..FakeTools::default()
        };
        let result: MediathekResult =
            serde_json::from_value(hit("Brot", "https://hd", "", "https://low")).unwrap();
        let err = download_result(&tools, &result, &output, false).unwrap_err();
        assert!(err.to_string().contains("all 2 URLs failed"));
        assert!(!output.exists());

        let empty = MediathekResult::default();
        let err = download_result(&tools, &empty, &output, false).unwrap_err();
        assert!(err.to_string().contains("no video URLs"));
    }
}
