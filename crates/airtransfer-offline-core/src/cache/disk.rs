use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::http::{CacheKey, Response};

use super::handle::{ensure_cacheable, EntryInfo};
use super::memory::entry_infos;
use super::{CacheError, CacheHandle, CachedData};

/// Bucket files are `<cache name>.json` under the storage root.
const BUCKET_EXTENSION: &str = "json";

/// Check that a cache name is usable as a file stem.
pub fn validate_cache_name(name: &str) -> Result<(), CacheError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidName(name.to_string()))
    }
}

#[derive(Serialize, Deserialize)]
struct BucketFile {
    name: String,
    entries: Vec<StoredEntry>,
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: CacheKey,
    cached: CachedData<Response>,
}

// ============================================================================
// DiskCache
// ============================================================================

/// Bucket persisted as a single JSON file.
///
/// The whole bucket is kept in memory and the file is rewritten after
/// every mutation, so a restart sees exactly what the last write stored.
/// Mutations are serialized by `writer`; the file is written on the
/// blocking pool while readers keep using the previous map.
#[derive(Debug)]
pub struct DiskCache {
    name: String,
    path: PathBuf,
    entries: RwLock<HashMap<CacheKey, CachedData<Response>>>,
    writer: Mutex<()>,
}

impl DiskCache {
    /// Open the bucket `name` under `root`, creating an empty one if absent.
    pub fn open(root: &Path, name: &str) -> Result<Self, CacheError> {
        validate_cache_name(name)?;
        std::fs::create_dir_all(root).map_err(|e| CacheError::io(root, e))?;

        let path = bucket_path(root, name);
        let entries = Self::load(&path)?;
        debug!(cache = name, entries = entries.len(), "Opened disk cache");

        Ok(Self {
            name: name.to_string(),
            path,
            entries: RwLock::new(entries),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<HashMap<CacheKey, CachedData<Response>>, CacheError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| CacheError::io(path, e))?;
        let file: BucketFile =
            serde_json::from_str(&contents).map_err(|source| CacheError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(file
            .entries
            .into_iter()
            .map(|entry| (entry.key, entry.cached))
            .collect())
    }

    /// Write the bucket through a temp file so a crash never leaves half a file.
    async fn persist(&self, entries: &HashMap<CacheKey, CachedData<Response>>) -> Result<(), CacheError> {
        let mut stored: Vec<StoredEntry> = entries
            .iter()
            .map(|(key, cached)| StoredEntry {
                key: key.clone(),
                cached: cached.clone(),
            })
            .collect();
        stored.sort_by(|a, b| a.key.cmp(&b.key));

        let file = BucketFile {
            name: self.name.clone(),
            entries: stored,
        };
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_bucket(&path, &file))
            .await
            .map_err(|e| CacheError::io(&self.path, std::io::Error::other(e)))?
    }

    /// Apply `update` to a copy of the map, persist it, then publish it.
    /// Returns whatever `update` returned; `None` means nothing changed.
    async fn mutate<T>(
        &self,
        update: impl FnOnce(&mut HashMap<CacheKey, CachedData<Response>>) -> Option<T>,
    ) -> Result<Option<T>, CacheError> {
        let _writer = self.writer.lock().await;

        let mut updated = self.entries.read().await.clone();
        let Some(result) = update(&mut updated) else {
            return Ok(None);
        };
        self.persist(&updated).await?;
        *self.entries.write().await = updated;
        Ok(Some(result))
    }
}

#[async_trait]
impl CacheHandle for DiskCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Response>, CacheError> {
        Ok(self.entries.read().await.get(key).map(|c| c.data.clone()))
    }

    async fn put(&self, key: CacheKey, response: Response) -> Result<(), CacheError> {
        self.put_all(vec![(key, response)]).await
    }

    async fn put_all(&self, entries: Vec<(CacheKey, Response)>) -> Result<(), CacheError> {
        for (key, _) in &entries {
            ensure_cacheable(key)?;
        }

        self.mutate(|map| {
            for (key, response) in entries {
                map.insert(key, CachedData::new(response));
            }
            Some(())
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let removed = self.mutate(|map| map.remove(key)).await?;
        Ok(removed.is_some())
    }

    async fn entries(&self) -> Result<Vec<EntryInfo>, CacheError> {
        Ok(entry_infos(&*self.entries.read().await))
    }
}

// ============================================================================
// DiskCacheStorage
// ============================================================================

fn write_bucket(path: &Path, file: &BucketFile) -> Result<(), CacheError> {
    let contents = serde_json::to_string_pretty(file)?;
    let tmp = path.with_extension(format!("{}.tmp", BUCKET_EXTENSION));
    std::fs::write(&tmp, contents).map_err(|e| CacheError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| CacheError::io(path, e))?;
    Ok(())
}

fn bucket_path(root: &Path, name: &str) -> PathBuf {
    root.join(format!("{}.{}", name, BUCKET_EXTENSION))
}

/// Registry of cache generations stored under one directory.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open (creating if absent) the bucket for this generation
    pub fn open(&self, name: &str) -> Result<DiskCache, CacheError> {
        DiskCache::open(&self.root, name)
    }

    pub fn has(&self, name: &str) -> bool {
        validate_cache_name(name).is_ok() && bucket_path(&self.root, name).is_file()
    }

    /// Delete one generation, returning whether it existed
    pub fn delete(&self, name: &str) -> Result<bool, CacheError> {
        validate_cache_name(name)?;
        let path = bucket_path(&self.root, name);
        if !path.is_file() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
        info!(cache = name, "Deleted cache generation");
        Ok(true)
    }

    /// Names of all generations on disk, sorted
    pub fn names(&self) -> Result<Vec<String>, CacheError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let dir = std::fs::read_dir(&self.root).map_err(|e| CacheError::io(&self.root, e))?;
        let mut names = Vec::new();
        for entry in dir {
            let path = entry.map_err(|e| CacheError::io(&self.root, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BUCKET_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_cache_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
