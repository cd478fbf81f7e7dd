//! Core library for airtransfer-offline.
//!
//! An offline cache for the AirTransfer web app: the app shell is
//! pre-cached into a named bucket at install time, and later requests are
//! answered cache-first, except for the share/upload endpoints which always
//! reach the server.
//!
//! The bucket and the network are injected capabilities (`CacheHandle`,
//! `Network`), so the interceptor runs the same against a disk bucket and
//! a live server as it does against in-memory fakes.

pub mod cache;
pub mod config;
pub mod http;
pub mod interceptor;
pub mod net;

pub use cache::{
    CacheError, CacheHandle, CachedData, DiskCache, DiskCacheStorage, EntryInfo, InstallError,
    MemoryCache,
};
pub use config::{Config, TlsConfig, WorkerConfig};
pub use http::{CacheKey, Request, Response};
pub use interceptor::{CacheInterceptor, FetchDecision};
pub use net::{FetchError, HttpNetwork, Network};
pub use reqwest::{Method, Url};
