#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_MEDIATHEK_API: &str = "https://mediathekviewweb.de/api/query";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_YT_DLP: &str = "yt-dlp";
pub const DEFAULT_FFPROBE: &str = "ffprobe";

const VIDEO_SUBDIR: &str = "sachgeschichten";
const JSON_FILE: &str = "sachgeschichten.json";
const MISSING_FILE: &str = "sachgeschichten-missing.json";
const INDEX_FILE: &str = "index.md";
const EPISODES_CSV: &str = "episodes.csv";

/// Every setting both binaries read, after `.env`, environment and CLI
/// overrides have been layered.
#[derive(Debug, Clone)]
pub struct Settings {
    pub maus_root: PathBuf,
    pub maus_video_dir: PathBuf,
    pub tatort_root: PathBuf,
    pub mediathek_api: String,
    pub yt_dlp: PathBuf,
    pub ffprobe: PathBuf,
    pub http_timeout: Duration,
    pub platform_search: bool,
}

impl Settings {
    pub fn maus_paths(&self) -> MausPaths {
        MausPaths {
            video_dir: self.maus_video_dir.clone(),
            json_path: self.maus_root.join(JSON_FILE),
            missing_path: self.maus_root.join(MISSING_FILE),
            index_path: self.maus_root.join(INDEX_FILE),
        }
    }

    pub fn tatort_csv(&self) -> PathBuf {
        self.tatort_root.join(EPISODES_CSV)
    }
}

/// Filesystem locations of the Sachgeschichten library.
#[derive(Debug, Clone)]
pub struct MausPaths {
    pub video_dir: PathBuf,
    pub json_path: PathBuf,
    pub missing_path: PathBuf,
    pub index_path: PathBuf,
}

impl MausPaths {
    /// Lays the library out below a single directory. Mostly useful in tests.
    pub fn under(root: &Path) -> Self {
        Self {
            video_dir: root.join(VIDEO_SUBDIR),
            json_path: root.join(JSON_FILE),
            missing_path: root.join(MISSING_FILE),
            index_path: root.join(INDEX_FILE),
        }
    }

    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.video_dir)
            .with_context(|| format!("creating {}", self.video_dir.display()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub maus_root: Option<PathBuf>,
    pub tatort_root: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_settings_with_overrides(
        &file_vars,
        env_var_string,
        overrides,
    ))
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Settings {
    build_settings_with_overrides(file_vars, env_lookup, SettingsOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Settings {
    let maus_root = overrides
        .maus_root
        .or_else(|| lookup_value("MAUS_ROOT", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let maus_video_dir = lookup_value("MAUS_VIDEO_DIR", file_vars, &env_lookup)
        .map(PathBuf::from)
        .unwrap_or_else(|| maus_root.join(VIDEO_SUBDIR));
    let tatort_root = overrides
        .tatort_root
        .or_else(|| lookup_value("TATORT_ROOT", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let mediathek_api = lookup_value("MEDIATHEK_API", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_MEDIATHEK_API.to_string());
    let yt_dlp = lookup_value("YT_DLP_BIN", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_YT_DLP.to_string());
    let ffprobe = lookup_value("FFPROBE_BIN", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_FFPROBE.to_string());
    let http_timeout = lookup_value("HTTP_TIMEOUT_SECS", file_vars, &env_lookup)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
    let platform_search = lookup_value("PLATFORM_SEARCH", file_vars, &env_lookup)
        .map(|value| parse_flag(&value))
        .unwrap_or(true);

    Settings {
        maus_root,
        maus_video_dir,
        tatort_root,
        mediathek_api,
        yt_dlp: PathBuf::from(yt_dlp),
        ffprobe: PathBuf::from(ffprobe),
        http_timeout: Duration::from_secs(http_timeout),
        platform_search,
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn settings_from(contents: &str) -> Settings {
        let cfg = make_config(contents);
        let vars = read_env_file(cfg.path()).unwrap();
        build_settings(&vars, |_| None)
    }

    #[test]
    fn defaults_apply_without_any_source() {
        let settings = build_settings(&HashMap::new(), |_| None);
        assert_eq!(settings.maus_root, PathBuf::from("."));
        assert_eq!(settings.maus_video_dir, PathBuf::from("./sachgeschichten"));
        assert_eq!(settings.tatort_root, PathBuf::from("."));
        assert_eq!(settings.mediathek_api, DEFAULT_MEDIATHEK_API);
        assert_eq!(settings.yt_dlp, PathBuf::from(DEFAULT_YT_DLP));
        assert_eq!(settings.ffprobe, PathBuf::from(DEFAULT_FFPROBE));
        assert_eq!(
            settings.http_timeout,
            Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS)
        );
        assert!(settings.platform_search);
    }

    #[test]
    fn video_dir_follows_maus_root() {
        let settings = settings_from("MAUS_ROOT=\"/srv/maus\"\n");
        assert_eq!(
            settings.maus_video_dir,
            PathBuf::from("/srv/maus/sachgeschichten")
        );
        let paths = settings.maus_paths();
        assert_eq!(
            paths.json_path,
            PathBuf::from("/srv/maus/sachgeschichten.json")
        );
        assert_eq!(
            paths.missing_path,
            PathBuf::from("/srv/maus/sachgeschichten-missing.json")
        );
        assert_eq!(paths.index_path, PathBuf::from("/srv/maus/index.md"));
    }

    #[test]
    fn explicit_video_dir_wins() {
        let settings = settings_from("MAUS_ROOT=/m\nMAUS_VIDEO_DIR=/videos\n");
        assert_eq!(settings.maus_video_dir, PathBuf::from("/videos"));
    }

    #[test]
    fn invalid_timeout_defaults() {
        let settings = settings_from("HTTP_TIMEOUT_SECS=\"soon\"\n");
        assert_eq!(
            settings.http_timeout,
            Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS)
        );
        let settings = settings_from("HTTP_TIMEOUT_SECS=0\n");
        assert_eq!(
            settings.http_timeout,
            Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS)
        );
    }

    #[test]
    fn platform_search_can_be_disabled() {
        assert!(!settings_from("PLATFORM_SEARCH=off\n").platform_search);
        assert!(!settings_from("PLATFORM_SEARCH=\"0\"\n").platform_search);
        assert!(settings_from("PLATFORM_SEARCH=yes\n").platform_search);
    }

    #[test]
    fn env_beats_file() {
        let vars = read_env_file(make_config("TATORT_ROOT=\"/file\"\n").path()).unwrap();
        let settings = build_settings(&vars, |key| {
            if key == "TATORT_ROOT" {
                Some("/env".to_string())
            } else {
                None
            }
        });
        assert_eq!(settings.tatort_root, PathBuf::from("/env"));
    }

    #[test]
    fn overrides_beat_env_and_file() {
        let mut vars = HashMap::new();
        vars.insert("MAUS_ROOT".to_string(), "/file-maus".to_string());
        vars.insert("TATORT_ROOT".to_string(), "/file-tatort".to_string());

        let settings = build_settings_with_overrides(
            &vars,
            |key| {
                if key == "TATORT_ROOT" {
                    Some("/env-tatort".to_string())
                } else {
                    None
                }
            },
            SettingsOverrides {
                maus_root: Some(PathBuf::from("/override-maus")),
                tatort_root: None,
                env_path: None,
            },
        );

        assert_eq!(settings.maus_root, PathBuf::from("/override-maus"));
        assert_eq!(settings.tatort_root, PathBuf::from("/env-tatort"));
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let cfg = make_config(
            r#"
            export MAUS_ROOT="/maus"
            TATORT_ROOT='/tatort'
            YT_DLP_BIN =  "/opt/yt-dlp"
            HTTP_TIMEOUT_SECS=5
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get("MAUS_ROOT").unwrap(), "/maus");
        assert_eq!(vars.get("TATORT_ROOT").unwrap(), "/tatort");
        assert_eq!(vars.get("YT_DLP_BIN").unwrap(), "/opt/yt-dlp");
        assert_eq!(vars.get("HTTP_TIMEOUT_SECS").unwrap(), "5");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn blank_values_fall_through() {
        let settings = settings_from("MEDIATHEK_API=\"  \"\n");
        assert_eq!(settings.mediathek_api, DEFAULT_MEDIATHEK_API);
    }

    #[test]
    fn maus_paths_prepare_creates_video_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MausPaths::under(dir.path());
        paths.prepare().unwrap();
        assert!(paths.video_dir.is_dir());
    }
}
