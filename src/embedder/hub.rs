//! Blocking download client for pretrained model artifacts.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use tracing::{info, warn};
use url::Url;

use crate::config::HubConfig;

/// Fetches repository files from a model hub, keeping a local copy per revision.
#[derive(Clone)]
pub struct HubClient {
    client: Client,
    base: Url,
    revision: String,
    cache_dir: PathBuf,
    max_retries: usize,
}

impl HubClient {
    /// Builds a new hub client.
    pub fn new(config: &HubConfig) -> Result<Self> {
        anyhow::ensure!(
            !config.revision.trim().is_empty(),
            "missing hub revision"
        );
        let mut base = Url::parse(config.base_url.trim())
            .with_context(|| format!("invalid hub url {:?}", config.base_url))?;
        anyhow::ensure!(
            matches!(base.scheme(), "http" | "https"),
            "hub url must be an http(s) URL"
        );
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &config.token {
            let auth = format!("Bearer {}", token.trim());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth).context("invalid hub token")?,
            );
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .context("failed to build hub HTTP client")?;
        Ok(Self {
            client,
            base,
            revision: config.revision.trim().to_string(),
            cache_dir: config.cache_dir.clone(),
            max_retries: config.max_retries.max(1),
        })
    }

    /// Local path `file` of `repo` is (or will be) stored at.
    pub fn local_path(&self, repo: &str, file: &str) -> PathBuf {
        self.cache_dir
            .join(repo.replace('/', "--"))
            .join(&self.revision)
            .join(file)
    }

    /// Remote URL for `file` of `repo`.
    pub fn file_url(&self, repo: &str, file: &str) -> Result<Url> {
        self.base
            .join(&format!("{repo}/resolve/{}/{file}", self.revision))
            .with_context(|| format!("cannot build hub url for {repo}/{file}"))
    }

    /// Returns the local copy of `file`, downloading it first when missing.
    pub fn fetch(&self, repo: &str, file: &str) -> Result<PathBuf> {
        let target = self.local_path(repo, file);
        if target.is_file() {
            return Ok(target);
        }
        let url = self.file_url(repo, file)?;
        info!(%url, path = %target.display(), "downloading model artifact");
        self.download(&url, &target)?;
        Ok(target)
    }

    fn download(&self, url: &Url, target: &Path) -> Result<()> {
        let dir = target
            .parent()
            .context("artifact path has no parent directory")?;
        fs::create_dir_all(dir).with_context(|| format!("failed to create {:?}", dir))?;

        let mut attempt = 0usize;
        loop {
            match self.client.get(url.clone()).send() {
                Ok(mut resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut tmp = tempfile::NamedTempFile::new_in(dir)
                            .with_context(|| format!("failed to stage download in {:?}", dir))?;
                        match resp.copy_to(tmp.as_file_mut()) {
                            Ok(bytes) => {
                                tmp.persist(target)
                                    .with_context(|| format!("failed to move download to {:?}", target))?;
                                info!(%url, bytes, "download complete");
                                return Ok(());
                            }
                            Err(err) => {
                                if self.is_retryable_error(&err) && attempt + 1 < self.max_retries {
                                    attempt += 1;
                                    warn!(%url, attempt, error = %err, "download interrupted; retrying");
                                    thread::sleep(self.retry_backoff(attempt));
                                    continue;
                                }
                                return Err(err).with_context(|| format!("failed to read {url}"));
                            }
                        }
                    }

                    if self.should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(%url, %status, attempt, "hub request failed; retrying");
                        thread::sleep(self.retry_backoff(attempt));
                        continue;
                    }
                    let body = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    anyhow::bail!("hub request for {} failed ({}): {}", url, status, body.trim());
                }
                Err(err) => {
                    if self.is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(%url, attempt, error = %err, "hub request errored; retrying");
                        thread::sleep(self.retry_backoff(attempt));
                        continue;
                    }
                    return Err(err).with_context(|| format!("failed to fetch {url}"));
                }
            }
        }
    }

    fn should_retry(&self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn is_retryable_error(&self, err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
    }

    fn retry_backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        Duration::from_millis(500 * (1 << capped))
    }
}
