//! Live streaming pass-through proxy and its shared counters.

use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::types::ProxyCounters;
use axum::body::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Request headers copied from the client to the upstream request
pub const FORWARDED_REQUEST_HEADERS: [&str; 3] = ["user-agent", "accept", "accept-language"];

/// Response headers that describe the hop, not the payload
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
];

/// Aggregate counters read by the stats endpoint
#[derive(Debug, Default)]
pub struct ProxyStats {
    total_requests: AtomicU64,
    total_bytes: AtomicU64,
}

impl ProxyStats {
    /// Count one proxied request
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count relayed body bytes
    pub fn record_bytes(&self, n: u64) {
        self.total_bytes.fetch_add(n, Ordering::Relaxed);
    }

    /// Current values
    pub fn snapshot(&self) -> ProxyCounters {
        ProxyCounters {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_data_transferred: self.total_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Upstream response ready to be relayed
pub struct ProxiedResponse {
    /// Upstream status code
    pub status: u16,
    /// Upstream headers minus hop-by-hop ones
    pub headers: Vec<(String, Vec<u8>)>,
    /// Body chunks; bytes are counted as they pass through
    pub body: BoxStream<'static, std::io::Result<Bytes>>,
}

/// Pass-through proxy sharing the fetcher's client and target policy
#[derive(Clone, Debug)]
pub struct LiveProxy {
    fetcher: Fetcher,
    stats: Arc<ProxyStats>,
}

impl LiveProxy {
    /// Create a proxy over an existing fetcher
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            stats: Arc::new(ProxyStats::default()),
        }
    }

    /// Shared counters
    pub fn stats(&self) -> &Arc<ProxyStats> {
        &self.stats
    }

    /// Open `target` and return its response for streaming
    ///
    /// Non-success upstream statuses are relayed as-is; only transport failures
    /// and policy rejections are errors.
    pub async fn open(
        &self,
        target: &str,
        forwarded: &HashMap<String, String>,
    ) -> Result<ProxiedResponse> {
        tracing::info!(target_url = %target, "Proxying request");

        let response = self.fetcher.send_raw(target, forwarded).await.inspect_err(|e| {
            tracing::warn!(target_url = %target, error = %e, "Proxy request failed");
        })?;
        self.stats.record_request();

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !HOP_BY_HOP_HEADERS.contains(&name.as_str()))
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();

        let stats = self.stats.clone();
        let body = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => {
                    stats.record_bytes(bytes.len() as u64);
                    Ok(bytes)
                }
                Err(e) => Err(std::io::Error::other(e)),
            })
            .boxed();

        Ok(ProxiedResponse {
            status,
            headers,
            body,
        })
    }
}
