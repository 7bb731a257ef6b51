#![forbid(unsafe_code)]

//! Wrappers around the external programs the downloaders shell out to:
//! yt-dlp for fetching, ffprobe for durations and notify-send for desktop
//! notifications.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::config::Settings;

/// Seam between orchestration and subprocesses.
pub trait MediaTools {
    /// Downloads `url` (or a yt-dlp search expression) to `output`.
    fn download(&self, url: &str, output: &Path) -> Result<()>;
    /// Length of a media file in seconds, if ffprobe can tell.
    fn probe_duration(&self, path: &Path) -> Option<f64>;
    /// Best-effort desktop notification.
    fn notify(&self, message: &str);
}

#[derive(Debug, Clone)]
pub struct ExternalTools {
    yt_dlp: PathBuf,
    ffprobe: PathBuf,
}

impl ExternalTools {
    pub fn new(yt_dlp: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            yt_dlp: yt_dlp.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.yt_dlp.clone(), settings.ffprobe.clone())
    }
}

impl MediaTools for ExternalTools {
    fn download(&self, url: &str, output: &Path) -> Result<()> {
        debug!(url, output = %output.display(), "running yt-dlp");
        let status = Command::new(&self.yt_dlp)
            .arg("-o")
            .arg(output)
            .arg(url)
            .status()
            .with_context(|| format!("starting {}", self.yt_dlp.display()))?;
        if !status.success() {
            bail!("yt-dlp failed for {url} (status {status})");
        }
        Ok(())
    }

    fn probe_duration(&self, path: &Path) -> Option<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stderr(Stdio::null())
            .output()
            .map_err(|err| debug!(error = %err, "ffprobe could not be started"))
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
    }

    fn notify(&self, message: &str) {
        match Command::new("notify-send")
            .arg(message)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => debug!(%status, "notify-send exited unsuccessfully"),
            Err(err) => debug!(error = %err, "notify-send unavailable"),
        }
    }
}

/// Runs `<program> --version` to fail loudly when a dependency such as
/// yt-dlp is missing.
pub fn ensure_program_available(program: &Path) -> Result<()> {
    let status = Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => bail!(
            "{} is installed but returned a failure status",
            program.display()
        ),
        Err(err) => bail!(
            "{} is not installed or not in PATH: {}",
            program.display(),
            err
        ),
    }
}

/// Renders seconds as `M:SS`; long films show e.g. `88:05`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Probes `path` and formats the result, or returns an empty string.
pub fn duration_label(tools: &dyn MediaTools, path: &Path) -> String {
    match tools.probe_duration(path) {
        Some(seconds) => format_duration(seconds),
        None => {
            warn!(path = %path.display(), "could not determine duration");
            String::new()
        }
    }
}
