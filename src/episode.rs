//! The Sachgeschichte episode model and its two on-disk shapes.
//!
//! Downloaded episodes are stored in the JSON-LD shape the WDR pages publish
//! (`name`, `datePublished`, `@id`, ...). Missing episodes only carry title,
//! year and presenter.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::slug::get_slug;

/// Duration placeholder yt-dlp based tooling leaves behind when it cannot
/// tell the length of a file.
const UNKNOWN_DURATION: &str = "NA";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Episode {
    pub title: String,
    /// Original broadcast year, used in the slug and therefore the filename.
    pub year: String,
    pub presenter: String,
    pub duration: String,
    pub description: String,
    pub url: String,
    /// The JSON-LD `@id`, often a second spelling of the page URL.
    pub alt_url: String,
    pub image_url: String,
    pub date_published: String,
}

/// Serialized form of a downloaded episode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataRecord {
    pub name: String,
    #[serde(
        rename = "datePublished",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub date_published: String,
    #[serde(
        rename = "originalYear",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub original_year: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub presenter: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub duration: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(rename = "@id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
}

/// Serialized form of a missing episode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MissingRecord {
    pub title: String,
    #[serde(default)]
    pub year: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub presenter: String,
}

impl Episode {
    pub fn new(title: &str, year: &str, presenter: &str) -> Self {
        Self {
            title: title.to_string(),
            year: year.to_string(),
            presenter: presenter.to_string(),
            ..Self::default()
        }
    }

    pub fn slug(&self) -> String {
        get_slug(&self.title, &self.year)
    }

    pub fn video_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.mp4", self.slug()))
    }

    pub fn image_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.webp", self.slug()))
    }

    pub fn is_downloaded(&self, dir: &Path) -> bool {
        self.video_path(dir).exists()
    }

    pub fn has_valid_duration(&self) -> bool {
        !self.duration.is_empty() && self.duration != UNKNOWN_DURATION
    }

    /// Year derived from `datePublished`, which is when the page went up and
    /// not necessarily when the episode first aired.
    fn published_year(&self) -> String {
        year_prefix(&self.date_published)
    }

    /// Builds an episode from a JSON-LD object. Absent or oddly typed keys
    /// become empty strings.
    pub fn from_metadata(metadata: &Value) -> Self {
        let date_published = string_field(metadata, "datePublished");
        let image_url = metadata
            .get("image")
            .and_then(|image| match image {
                Value::Object(_) => image.get("url").and_then(value_to_string),
                other => value_to_string(other),
            })
            .filter(|url| !url.is_empty())
            .or_else(|| {
                metadata.get("thumbnailURL").and_then(|thumbs| match thumbs {
                    Value::Array(list) => list.first().and_then(value_to_string),
                    other => value_to_string(other),
                })
            })
            .unwrap_or_default();
        let year = Some(string_field(metadata, "originalYear"))
            .filter(|year| !year.is_empty())
            .unwrap_or_else(|| year_prefix(&date_published));

        Self {
            title: string_field(metadata, "name"),
            year,
            presenter: string_field(metadata, "presenter"),
            duration: string_field(metadata, "duration"),
            description: string_field(metadata, "description"),
            url: string_field(metadata, "url"),
            alt_url: string_field(metadata, "@id"),
            image_url,
            date_published,
        }
    }

    pub fn from_missing(entry: &Value) -> Self {
        Self::new(
            &string_field(entry, "title"),
            &string_field(entry, "year"),
            &string_field(entry, "presenter"),
        )
    }

    pub fn to_metadata(&self) -> MetadataRecord {
        let original_year = if !self.year.is_empty()
            && (self.date_published.is_empty() || self.year != self.published_year())
        {
            self.year.clone()
        } else {
            String::new()
        };
        MetadataRecord {
            name: self.title.clone(),
            date_published: self.date_published.clone(),
            original_year,
            description: self.description.clone(),
            presenter: self.presenter.clone(),
            duration: self.duration.clone(),
            url: self.url.clone(),
            id: self.alt_url.clone(),
            image: (!self.image_url.is_empty()).then(|| ImageRef {
                url: self.image_url.clone(),
            }),
        }
    }

    pub fn to_missing(&self) -> MissingRecord {
        MissingRecord {
            title: self.title.clone(),
            year: self.year.clone(),
            presenter: self.presenter.clone(),
        }
    }

    /// Fills gaps from another record of the same episode. Our own values
    /// win, except a year that only echoes `datePublished`.
    pub fn merge_from(&mut self, other: &Episode) {
        if self.presenter.is_empty() && !other.presenter.is_empty() {
            self.presenter = other.presenter.clone();
        }
        if !self.has_valid_duration() && other.has_valid_duration() {
            self.duration = other.duration.clone();
        }
        if !other.year.is_empty()
            && !self.date_published.is_empty()
            && self.year == self.published_year()
            && other.year != self.year
        {
            self.year = other.year.clone();
        }
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value.get(key).and_then(value_to_string).unwrap_or_default()
}

/// Up to the first four chars of a date; short dates stay as they are.
fn year_prefix(date: &str) -> String {
    date.chars().take(4).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_metadata() -> Value {
        json!({
            "name": "Wie kommt der Strom in die Steckdose?",
            "datePublished": "2021-03-14T09:30:00+01:00",
            "originalYear": "1998",
            "description": "Armin erklärt.",
            "duration": "9:12",
            "url": "https://www.wdrmaus.de/filme/sachgeschichten/strom.php5",
            "@id": "https://www.wdrmaus.de//filme/sachgeschichten/strom.php5/",
            "image": {"url": "https://www.wdrmaus.de/strom.jpg"}
        })
    }

    #[test]
    fn from_metadata_prefers_original_year() {
        let episode = Episode::from_metadata(&sample_metadata());
        assert_eq!(episode.year, "1998");
        assert_eq!(episode.slug(), "wie-kommt-der-strom-in-die-steckdose-1998");
        assert_eq!(episode.image_url, "https://www.wdrmaus.de/strom.jpg");
        assert_eq!(
            episode.alt_url,
            "https://www.wdrmaus.de//filme/sachgeschichten/strom.php5/"
        );
    }

    #[test]
    fn from_metadata_falls_back_to_published_year_and_thumbnail() {
        let episode = Episode::from_metadata(&json!({
            "name": "Brot",
            "datePublished": "2020-01-01",
            "thumbnailURL": ["https://img/1.jpg", "https://img/2.jpg"]
        }));
        assert_eq!(episode.year, "2020");
        assert_eq!(episode.image_url, "https://img/1.jpg");
        assert_eq!(episode.presenter, "");
    }

    #[test]
    fn short_publish_dates_keep_their_prefix() {
        let episode = Episode::from_metadata(&json!({"name": "Brot", "datePublished": "98"}));
        assert_eq!(episode.year, "98");
        assert_eq!(year_prefix("2020-01-01"), "2020");
        assert_eq!(year_prefix(""), "");
    }

    #[test]
    fn from_metadata_accepts_numeric_year() {
        let episode = Episode::from_metadata(&json!({"name": "Käse", "originalYear": 1987}));
        assert_eq!(episode.year, "1987");
        assert_eq!(episode.slug(), "kaese-1987");
    }

    #[test]
    fn to_metadata_writes_original_year_only_when_needed() {
        let episode = Episode::from_metadata(&sample_metadata());
        let record = episode.to_metadata();
        assert_eq!(record.original_year, "1998");

        let mut same_year = episode.clone();
        same_year.year = "2021".into();
        assert_eq!(same_year.to_metadata().original_year, "");

        let mut no_date = episode;
        no_date.date_published.clear();
        assert_eq!(no_date.to_metadata().original_year, "1998");
    }

    #[test]
    fn metadata_json_round_trips_through_from_metadata() {
        let episode = Episode::from_metadata(&sample_metadata());
        let value = serde_json::to_value(episode.to_metadata()).unwrap();
        assert_eq!(Episode::from_metadata(&value), episode);
        assert!(value.get("publisher").is_none());
        assert_eq!(value["@id"], sample_metadata()["@id"]);
    }

    #[test]
    fn missing_shape_omits_empty_presenter() {
        let value = serde_json::to_value(Episode::new("Brot", "1990", "").to_missing()).unwrap();
        assert_eq!(value, json!({"title": "Brot", "year": "1990"}));
        let back = Episode::from_missing(&json!({"title": "Brot", "year": "1990", "presenter": "Armin"}));
        assert_eq!(back.presenter, "Armin");
    }

    #[test]
    fn duration_validity() {
        let mut episode = Episode::new("Brot", "", "");
        assert!(!episode.has_valid_duration());
        episode.duration = "NA".into();
        assert!(!episode.has_valid_duration());
        episode.duration = "4:30".into();
        assert!(episode.has_valid_duration());
    }

    #[test]
    fn merge_fills_gaps_without_overwriting() {
        let mut ours = Episode::new("Brot", "2020", "Armin");
        ours.duration = "NA".into();
        let mut theirs = Episode::new("Brot", "2020", "Ralph");
        theirs.duration = "5:01".into();
        ours.merge_from(&theirs);
        assert_eq!(ours.presenter, "Armin");
        assert_eq!(ours.duration, "5:01");
    }

    #[test]
    fn merge_replaces_year_that_only_echoes_publication() {
        let mut ours = Episode::new("Brot", "2021", "");
        ours.date_published = "2021-05-01".into();
        ours.merge_from(&Episode::new("Brot", "1995", "Christoph"));
        assert_eq!(ours.year, "1995");
        assert_eq!(ours.presenter, "Christoph");

        let mut explicit = Episode::new("Brot", "1993", "");
        explicit.date_published = "2021-05-01".into();
        explicit.merge_from(&Episode::new("Brot", "1995", ""));
        assert_eq!(explicit.year, "1993");
    }

    #[test]
    fn paths_use_slug() {
        let episode = Episode::new("Die Ölpumpe", "1999", "");
        let dir = Path::new("/lib");
        assert_eq!(episode.video_path(dir), PathBuf::from("/lib/die-oelpumpe-1999.mp4"));
        assert_eq!(episode.image_path(dir), PathBuf::from("/lib/die-oelpumpe-1999.webp"));
        assert!(!episode.is_downloaded(dir));
    }
}
