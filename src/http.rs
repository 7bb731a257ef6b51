//! HTTP access behind a small trait so the orchestration code can be driven
//! by canned pages in tests.

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

use crate::error::DownloadError;

const USER_AGENT: &str = concat!("mediathek-tools/", env!("CARGO_PKG_VERSION"));
/// Thumbnails are small; anything larger is not an image we want.
const MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;

pub trait Fetcher {
    fn get_text(&self, url: &str) -> Result<String>;
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>>;
    /// POSTs `body` as a `text/plain` JSON document and decodes the JSON reply.
    fn post_json(&self, url: &str, body: &Value) -> Result<Value>;
}

/// `ureq` backed fetcher shared by both binaries.
pub struct HttpClient {
    agent: ureq::Agent,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5).min(timeout))
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(USER_AGENT)
            .build();
        Self { agent }
    }

    fn call(&self, request: ureq::Request, url: &str) -> Result<ureq::Response> {
        debug!(url, method = request.method(), "http request");
        request
            .call()
            .map_err(|err| DownloadError::http(url, describe(err)).into())
    }
}

fn describe(err: ureq::Error) -> String {
    match err {
        ureq::Error::Status(code, response) => {
            format!("HTTP {code} {}", response.status_text())
        }
        ureq::Error::Transport(transport) => transport.to_string(),
    }
}

impl Fetcher for HttpClient {
    fn get_text(&self, url: &str) -> Result<String> {
        let response = self.call(self.agent.get(url), url)?;
        response
            .into_string()
            .map_err(|err| DownloadError::http(url, err).into())
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.call(self.agent.get(url), url)?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut bytes)
            .with_context(|| format!("reading body of {url}"))?;
        Ok(bytes)
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let payload = serde_json::to_string(body).context("serializing request body")?;
        debug!(url, "http post");
        let response = self
            .agent
            .post(url)
            .set("Content-Type", "text/plain")
            .send_string(&payload)
            .map_err(|err| DownloadError::http(url, describe(err)))?;
        response
            .into_json::<Value>()
            .map_err(|err| DownloadError::http(url, err).into())
    }
}
