//! Cache buckets for offline access to the web app shell.
//!
//! A bucket is a named store of request→response pairs. The name is the
//! cache generation: bumping it (e.g. `airtransfer-v1` → `airtransfer-v2`)
//! starts from an empty bucket and leaves the old one to be purged.
//!
//! Implementations:
//! - `MemoryCache`: process-local, used in tests and `--ephemeral` mode
//! - `DiskCache`: one JSON file per bucket, survives restarts
//!
//! `DiskCacheStorage` is the registry that opens, lists and deletes
//! generations on disk.

pub mod disk;
pub mod entry;
pub mod error;
pub mod handle;
pub mod memory;

pub use disk::{validate_cache_name, DiskCache, DiskCacheStorage};
pub use entry::CachedData;
pub use error::{CacheError, InstallError};
pub use handle::{CacheHandle, EntryInfo};
pub use memory::MemoryCache;
