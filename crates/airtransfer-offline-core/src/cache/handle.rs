use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tracing::debug;

use crate::http::{CacheKey, Request, Response};
use crate::net::{FetchError, Network};

use super::entry::age_display_since;
use super::{CacheError, InstallError};

/// Summary of one stored entry, for listings.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub key: CacheKey,
    pub status: u16,
    pub size: usize,
    pub cached_at: DateTime<Utc>,
}

impl EntryInfo {
    pub fn age_display(&self) -> String {
        age_display_since(self.cached_at)
    }
}

/// Capability handle on one named cache bucket.
///
/// Implementations must be safe for concurrent reads and writes; the
/// interceptor shares one handle across every in-flight request.
#[async_trait]
pub trait CacheHandle: Send + Sync {
    /// Bucket name, i.e. the cache generation
    fn name(&self) -> &str;

    /// Stored response for this key, if any
    async fn get(&self, key: &CacheKey) -> Result<Option<Response>, CacheError>;

    /// Store a response, replacing any previous entry for the key
    async fn put(&self, key: CacheKey, response: Response) -> Result<(), CacheError>;

    /// Store several responses as one write
    async fn put_all(&self, entries: Vec<(CacheKey, Response)>) -> Result<(), CacheError> {
        for (key, response) in entries {
            self.put(key, response).await?;
        }
        Ok(())
    }

    /// Remove an entry, returning whether it existed
    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError>;

    /// All entries, sorted by key
    async fn entries(&self) -> Result<Vec<EntryInfo>, CacheError>;

    async fn keys(&self) -> Result<Vec<CacheKey>, CacheError> {
        Ok(self.entries().await?.into_iter().map(|e| e.key).collect())
    }

    /// Fetch every request and store the responses.
    ///
    /// All fetches must succeed with a 2xx status before anything is
    /// written; the first failure aborts the whole call. Keys already
    /// present are overwritten. Two requests with the same key are
    /// rejected before anything is fetched.
    async fn add_all(&self, network: &dyn Network, requests: &[Request]) -> Result<(), InstallError> {
        let mut seen = HashSet::with_capacity(requests.len());
        for request in requests {
            let key = request.key();
            ensure_cacheable(&key)?;
            if !seen.insert(key.clone()) {
                return Err(CacheError::DuplicateRequest(key.to_string()).into());
            }
        }

        let fetched = try_join_all(requests.iter().map(|request| async move {
            let response = network
                .fetch(request)
                .await
                .map_err(|source| InstallError::Fetch {
                    url: request.url.clone(),
                    source,
                })?;
            if !response.is_success() {
                return Err(InstallError::Fetch {
                    url: request.url.clone(),
                    source: FetchError::bad_status(&request.url, &response),
                });
            }
            debug!(url = %request.url, bytes = response.body.len(), "Fetched seed resource");
            Ok::<_, InstallError>((request.key(), response))
        }))
        .await?;

        self.put_all(fetched).await?;
        Ok(())
    }
}

/// The platform cache only stores GET requests.
pub(crate) fn ensure_cacheable(key: &CacheKey) -> Result<(), CacheError> {
    if key.is_get() {
        Ok(())
    } else {
        Err(CacheError::UnsupportedMethod(key.method.clone()))
    }
}
