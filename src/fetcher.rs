//! Outbound retrieval of a remote resource into local storage.
//!
//! The fetcher knows nothing about job state. It reports through a
//! [`ProgressSink`] and returns an [`Error`] that the job worker turns into a
//! terminal state.

use crate::config::FetchConfig;
use crate::error::{Error, FetchError, Result, StorageError};
use crate::target_policy::{BlockedAddress, PublicResolver, TargetPolicy};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Maximum redirects followed for one request
const MAX_REDIRECTS: usize = 10;

/// Receives progress while a body is being written
#[async_trait]
pub trait ProgressSink: Send {
    /// Called once the response headers arrived and before the first chunk
    async fn on_started(&mut self, total_bytes: Option<u64>) -> Result<()>;

    /// Called after every chunk is written, in arrival order
    ///
    /// `percent` is `None` when the total size is unknown.
    async fn on_chunk(&mut self, downloaded_bytes: u64, percent: Option<u8>) -> Result<()>;
}

/// Outcome of a successful download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSummary {
    /// Bytes written to storage
    pub bytes_written: u64,
    /// Size announced by the remote, if any
    pub total_bytes: Option<u64>,
}

/// HTTP fetcher shared by job workers and the live proxy
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: reqwest::Client,
    policy: TargetPolicy,
    user_agent: String,
}

impl Fetcher {
    /// Build a fetcher from configuration
    ///
    /// Under [`TargetPolicy::DenyPrivate`] the client resolves every host
    /// through a [`PublicResolver`].
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let resolver =
            (config.target_policy == TargetPolicy::DenyPrivate).then(PublicResolver::new);
        Self::with_resolver(config, resolver)
    }

    /// Build a fetcher whose client resolves through `resolver`, if given
    pub(crate) fn with_resolver(
        config: &FetchConfig,
        resolver: Option<PublicResolver>,
    ) -> Result<Self> {
        let policy = config.target_policy.clone();
        let redirect_policy = {
            let policy = policy.clone();
            reqwest::redirect::Policy::custom(move |attempt| {
                if attempt.previous().len() >= MAX_REDIRECTS {
                    return attempt.error(format!("more than {} redirects", MAX_REDIRECTS));
                }
                match policy.check_link(attempt.url().as_str()) {
                    Ok(_) => attempt.follow(),
                    Err(e) => attempt.error(e.to_string()),
                }
            })
        };

        let mut builder = reqwest::Client::builder().redirect(redirect_policy);
        if let Some(resolver) = resolver {
            builder = builder.dns_resolver(Arc::new(resolver));
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().map_err(|e| Error::Config {
            message: format!("failed to create HTTP client: {}", e),
            key: Some("fetch".to_string()),
        })?;

        Ok(Self {
            client,
            policy,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Policy applied to every request
    pub fn policy(&self) -> &TargetPolicy {
        &self.policy
    }

    /// Issue a GET and return the response whatever its status
    pub async fn send_raw(
        &self,
        link: &str,
        headers: &HashMap<String, String>,
    ) -> Result<reqwest::Response> {
        let url = match self.policy.check_link(link)? {
            Some(url) => url,
            None => Url::parse(link).map_err(|e| FetchError::InvalidUrl {
                url: link.to_string(),
                reason: e.to_string(),
            })?,
        };

        let mut header_map = build_headers(headers)?;
        if !header_map.contains_key(USER_AGENT)
            && let Ok(value) = HeaderValue::from_str(&self.user_agent)
        {
            header_map.insert(USER_AGENT, value);
        }

        self.client
            .get(url.clone())
            .headers(header_map)
            .send()
            .await
            .map_err(|e| request_error(&url, &e))
    }

    /// Issue a GET and reject non-success statuses
    pub async fn send(
        &self,
        link: &str,
        headers: &HashMap<String, String>,
    ) -> Result<reqwest::Response> {
        let response = self.send_raw(link, headers).await?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                url: link.to_string(),
                status: response.status().as_u16(),
            }
            .into());
        }
        Ok(response)
    }

    /// Stream `link` into `temp_path`, then move it to `file_path`
    ///
    /// The partial file is removed on failure. `file_path` only ever holds a
    /// complete body.
    pub async fn download(
        &self,
        link: &str,
        headers: &HashMap<String, String>,
        temp_path: &Path,
        file_path: &Path,
        sink: &mut dyn ProgressSink,
    ) -> Result<FetchSummary> {
        let result = self
            .download_inner(link, headers, temp_path, file_path, sink)
            .await;

        if result.is_err()
            && let Err(e) = tokio::fs::remove_file(temp_path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %temp_path.display(), error = %e, "Failed to remove partial file");
        }
        result
    }

    async fn download_inner(
        &self,
        link: &str,
        headers: &HashMap<String, String>,
        temp_path: &Path,
        file_path: &Path,
        sink: &mut dyn ProgressSink,
    ) -> Result<FetchSummary> {
        let response = self.send(link, headers).await?;
        let total_bytes = response.content_length().filter(|len| *len > 0);

        ensure_parent(temp_path).await?;
        let file = tokio::fs::File::create(temp_path)
            .await
            .map_err(|e| StorageError::Create {
                path: temp_path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let mut writer = tokio::io::BufWriter::new(file);

        sink.on_started(total_bytes).await?;

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::Stream {
                url: link.to_string(),
                reason: e.to_string(),
            })?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| write_error(temp_path, e))?;
            downloaded += chunk.len() as u64;

            let percent = total_bytes.map(|total| percent_of(downloaded, total));
            sink.on_chunk(downloaded, percent).await?;
        }

        writer.flush().await.map_err(|e| write_error(temp_path, e))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| write_error(temp_path, e))?;

        ensure_parent(file_path).await?;
        tokio::fs::rename(temp_path, file_path)
            .await
            .map_err(|e| StorageError::Finalize {
                source_path: temp_path.to_path_buf(),
                dest_path: file_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(FetchSummary {
            bytes_written: downloaded,
            total_bytes,
        })
    }
}

/// Rounded percentage of `total`, capped at 100
pub fn percent_of(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = ((downloaded as f64 / total as f64) * 100.0).round();
    percent.min(100.0) as u8
}

/// Map a failed request, surfacing a blocked resolution as a policy refusal
fn request_error(url: &Url, e: &reqwest::Error) -> Error {
    let mut causes = Vec::new();
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        if let Some(blocked) = cause.downcast_ref::<BlockedAddress>() {
            return Error::TargetForbidden {
                target: url.to_string(),
                reason: blocked.to_string(),
            };
        }
        causes.push(cause.to_string());
        source = std::error::Error::source(cause);
    }

    let mut reason = e.to_string();
    for cause in causes {
        reason.push_str(": ");
        reason.push_str(&cause);
    }
    if e.is_connect() {
        reason = format!("connection failed: {}", reason);
    } else if e.is_redirect() {
        reason = format!("redirect rejected: {}", reason);
    }
    FetchError::Transport {
        url: url.to_string(),
        reason,
    }
    .into()
}

fn build_headers(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| FetchError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| FetchError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::Create {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

fn write_error(path: &Path, e: std::io::Error) -> Error {
    StorageError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
    .into()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
