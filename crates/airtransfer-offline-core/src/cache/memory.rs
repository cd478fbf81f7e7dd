use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::http::{CacheKey, Response};

use super::handle::{ensure_cacheable, EntryInfo};
use super::{CacheError, CacheHandle, CachedData};

/// Bucket held entirely in memory. Lost when the process exits.
#[derive(Debug)]
pub struct MemoryCache {
    name: String,
    entries: RwLock<HashMap<CacheKey, CachedData<Response>>>,
}

impl MemoryCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

pub(crate) fn entry_infos(entries: &HashMap<CacheKey, CachedData<Response>>) -> Vec<EntryInfo> {
    let mut infos: Vec<EntryInfo> = entries
        .iter()
        .map(|(key, cached)| EntryInfo {
            key: key.clone(),
            status: cached.data.status,
            size: cached.data.body.len(),
            cached_at: cached.cached_at,
        })
        .collect();
    infos.sort_by(|a, b| a.key.cmp(&b.key));
    infos
}

#[async_trait]
impl CacheHandle for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Response>, CacheError> {
        Ok(self.entries.read().await.get(key).map(|c| c.data.clone()))
    }

    async fn put(&self, key: CacheKey, response: Response) -> Result<(), CacheError> {
        ensure_cacheable(&key)?;
        self.entries
            .write()
            .await
            .insert(key, CachedData::new(response));
        Ok(())
    }

    async fn put_all(&self, entries: Vec<(CacheKey, Response)>) -> Result<(), CacheError> {
        for (key, _) in &entries {
            ensure_cacheable(key)?;
        }
        let mut map = self.entries.write().await;
        for (key, response) in entries {
            map.insert(key, CachedData::new(response));
        }
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn entries(&self) -> Result<Vec<EntryInfo>, CacheError> {
        Ok(entry_infos(&*self.entries.read().await))
    }
}
