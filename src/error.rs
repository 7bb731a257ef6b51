use std::path::PathBuf;

/// Failures the command-line front ends branch on. Everything else travels as
/// plain `anyhow` context.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The page or API could not be fetched at all.
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    /// The page was fetched but carried no usable metadata.
    #[error("no usable metadata at {url}: {reason}")]
    Metadata { url: String, reason: String },

    /// An archive result listed no video URLs.
    #[error("no video URLs available")]
    NoUrls,

    /// Every URL of a single archive result failed.
    #[error("all {count} URLs failed for {}", output.display())]
    AllUrlsFailed { count: usize, output: PathBuf },

    /// Every source of the fallback chain failed.
    #[error("no source delivered '{title}' (tried {})", attempts.join(", "))]
    Exhausted { title: String, attempts: Vec<String> },
}

impl DownloadError {
    pub fn http(url: &str, message: impl ToString) -> Self {
        Self::Http {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    pub fn metadata(url: &str, reason: impl ToString) -> Self {
        Self::Metadata {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Coarse classification of an `anyhow` chain, used for user-facing
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Http,
    Metadata,
    Download,
    Other,
}

pub fn classify(err: &anyhow::Error) -> FailureKind {
    for cause in err.chain() {
        if let Some(download) = cause.downcast_ref::<DownloadError>() {
            return match download {
                DownloadError::Http { .. } => FailureKind::Http,
                DownloadError::Metadata { .. } => FailureKind::Metadata,
                DownloadError::NoUrls
                | DownloadError::AllUrlsFailed { .. }
                | DownloadError::Exhausted { .. } => FailureKind::Download,
            };
        }
    }
    FailureKind::Other
}
