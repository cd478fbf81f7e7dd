//! Cache-first fetch interceptor.
//!
//! Two handlers share one cache bucket:
//! - [`CacheInterceptor::on_install`] populates the bucket from the seed list
//! - [`CacheInterceptor::on_fetch`] answers a request from the bucket, or
//!   from the network on a miss
//!
//! Requests whose URL contains a bypass pattern are left alone: the
//! interceptor reports [`FetchDecision::Bypass`] and the caller sends the
//! request on as ordinary traffic.

use std::sync::Arc;

use reqwest::Url;
use tracing::{debug, info, warn};

use crate::cache::{CacheHandle, InstallError};
use crate::config::WorkerConfig;
use crate::http::{strip_origin, CacheKey, Request, Response};
use crate::net::{FetchError, Network};

/// Outcome of intercepting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchDecision {
    /// Not intercepted; the request goes to the network untouched
    Bypass,
    /// Served from the bucket without network access
    Cached(Response),
    /// Cache miss, fetched from the network and not stored
    Network(Response),
}

impl FetchDecision {
    /// The response, unless the request was bypassed
    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchDecision::Bypass => None,
            FetchDecision::Cached(response) | FetchDecision::Network(response) => Some(response),
        }
    }

    /// Short label for logs and CLI output
    pub fn source(&self) -> &'static str {
        match self {
            FetchDecision::Bypass => "bypass",
            FetchDecision::Cached(_) => "cache",
            FetchDecision::Network(_) => "network",
        }
    }
}

/// Cache interceptor with injected bucket and network.
/// Clone is cheap: both capabilities are behind `Arc`.
#[derive(Clone)]
pub struct CacheInterceptor {
    cache: Arc<dyn CacheHandle>,
    network: Arc<dyn Network>,
    config: WorkerConfig,
    origin: Option<Url>,
}

impl CacheInterceptor {
    /// `cache` should be the bucket opened under `config.cache_name`.
    pub fn new(cache: Arc<dyn CacheHandle>, network: Arc<dyn Network>, config: WorkerConfig) -> Self {
        if cache.name() != config.cache_name {
            warn!(
                cache = cache.name(),
                configured = %config.cache_name,
                "Cache bucket name differs from configured generation"
            );
        }
        Self {
            cache,
            network,
            config,
            origin: None,
        }
    }

    /// Treat absolute URLs on `origin` as the origin-relative paths they
    /// name, so `https://host:5000/` and `/` share one cache entry.
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn origin(&self) -> Option<&Url> {
        self.origin.as_ref()
    }

    /// Form of a URL used for cache keys: origin-relative when it points
    /// at our origin, untouched otherwise.
    fn scoped_url(&self, url: &str) -> String {
        self.origin
            .as_ref()
            .and_then(|origin| strip_origin(url, origin))
            .unwrap_or_else(|| url.to_string())
    }

    fn cache_key(&self, request: &Request) -> CacheKey {
        CacheKey::new(request.method.as_str(), &self.scoped_url(&request.url))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn CacheHandle> {
        &self.cache
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    /// True if a URL contains any bypass pattern (literal substring match)
    pub fn bypasses(&self, url: &str) -> bool {
        self.config
            .bypass_patterns
            .iter()
            .any(|pattern| url.contains(pattern.as_str()))
    }

    fn seed_requests(&self) -> Vec<Request> {
        self.config
            .seed_urls
            .iter()
            .map(|url| Request::get(self.scoped_url(url)))
            .collect()
    }

    /// Populate the bucket with every seed URL.
    ///
    /// Fails as a whole if any seed cannot be fetched; no retry, and no
    /// entry from the failed attempt is stored.
    pub async fn on_install(&self) -> Result<(), InstallError> {
        let seeds = self.seed_requests();
        info!(cache = self.cache.name(), seeds = seeds.len(), "Installing cache");

        self.cache.add_all(self.network.as_ref(), &seeds).await?;

        info!(cache = self.cache.name(), "Cache installed");
        Ok(())
    }

    /// Answer one request cache-first.
    ///
    /// A miss goes to the network exactly once and its response is
    /// returned as-is, without being written back. Network failures
    /// propagate.
    pub async fn on_fetch(&self, request: &Request) -> Result<FetchDecision, FetchError> {
        if self.bypasses(&request.url) {
            debug!(url = %request.url, "Bypassing cache");
            return Ok(FetchDecision::Bypass);
        }

        let key = self.cache_key(request);
        match self.cache.get(&key).await {
            Ok(Some(response)) => {
                debug!(key = %key, "Cache hit");
                return Ok(FetchDecision::Cached(response));
            }
            Ok(None) => debug!(key = %key, "Cache miss"),
            Err(e) => warn!(key = %key, error = %e, "Cache lookup failed, treating as miss"),
        }

        let response = self.network.fetch(request).await?;
        Ok(FetchDecision::Network(response))
    }
}
