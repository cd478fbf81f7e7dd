//! Interceptor behaviour against in-memory fakes.
//!
//! `FakeOrigin` records every request it sees; `CountingCache` wraps a
//! `MemoryCache` and counts lookups, so tests can assert which side of the
//! interceptor was touched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use airtransfer_offline_core::cache::EntryInfo;
use airtransfer_offline_core::{
    CacheError, CacheHandle, CacheInterceptor, CacheKey, FetchDecision, FetchError,
    InstallError, MemoryCache, Method, Network, Request, Response, Url, WorkerConfig,
};
use async_trait::async_trait;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakeOrigin {
    routes: Mutex<HashMap<String, Response>>,
    offline: Mutex<bool>,
    seen: Mutex<Vec<Request>>,
}

impl FakeOrigin {
    fn app_shell() -> Self {
        let origin = Self::default();
        origin.route("/", Response::new(200, "<html>AirTransfer</html>").with_header("content-type", "text/html"));
        origin.route("/static/manifest.json", Response::new(200, r#"{"name":"AirTransfer"}"#));
        origin.route("/static/icon-192.png", Response::new(200, vec![0x89, b'P', b'N', b'G', 0, 1, 2]));
        origin
    }

    fn route(&self, url: &str, response: Response) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    fn go_offline(&self) {
        *self.offline.lock().unwrap() = true;
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn calls_to(&self, url: &str) -> usize {
        self.seen.lock().unwrap().iter().filter(|r| r.url == url).count()
    }
}

#[async_trait]
impl Network for FakeOrigin {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.seen.lock().unwrap().push(request.clone());
        if *self.offline.lock().unwrap() {
            return Err(FetchError::Unreachable("origin offline".to_string()));
        }
        let routes = self.routes.lock().unwrap();
        Ok(routes
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Response::new(404, "Not Found")))
    }
}

struct CountingCache {
    inner: MemoryCache,
    lookups: AtomicUsize,
}

impl CountingCache {
    fn new(name: &str) -> Self {
        Self {
            inner: MemoryCache::new(name),
            lookups: AtomicUsize::new(0),
        }
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheHandle for CountingCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Response>, CacheError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn put(&self, key: CacheKey, response: Response) -> Result<(), CacheError> {
        self.inner.put(key, response).await
    }

    async fn put_all(&self, entries: Vec<(CacheKey, Response)>) -> Result<(), CacheError> {
        self.inner.put_all(entries).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        self.inner.delete(key).await
    }

    async fn entries(&self) -> Result<Vec<EntryInfo>, CacheError> {
        self.inner.entries().await
    }
}

fn setup() -> (CacheInterceptor, Arc<CountingCache>, Arc<FakeOrigin>) {
    let config = WorkerConfig::default();
    let cache = Arc::new(CountingCache::new(&config.cache_name));
    let origin = Arc::new(FakeOrigin::app_shell());
    let interceptor = CacheInterceptor::new(cache.clone(), origin.clone(), config);
    (interceptor, cache, origin)
}

const ORIGIN: &str = "https://192.168.1.20:5000";

fn setup_with_origin() -> (CacheInterceptor, Arc<CountingCache>, Arc<FakeOrigin>) {
    let (interceptor, cache, origin) = setup();
    let interceptor = interceptor.with_origin(Url::parse(ORIGIN).unwrap());
    (interceptor, cache, origin)
}

// ============================================================================
// Install
// ============================================================================

#[tokio::test]
async fn test_install_caches_every_seed() {
    let (interceptor, cache, origin) = setup();
    interceptor.on_install().await.unwrap();

    for url in ["/", "/static/manifest.json", "/static/icon-192.png"] {
        let stored = cache.get(&CacheKey::get(url)).await.unwrap();
        assert!(stored.is_some(), "seed {url} not cached");
    }
    assert_eq!(origin.calls(), 3);
}

#[tokio::test]
async fn test_install_is_idempotent() {
    let (interceptor, cache, _origin) = setup();
    interceptor.on_install().await.unwrap();
    let first = cache.keys().await.unwrap();

    interceptor.on_install().await.unwrap();
    let second = cache.keys().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.len(), 3);
}

#[tokio::test]
async fn test_install_fails_on_unreachable_seed() {
    let (interceptor, cache, origin) = setup();
    origin.go_offline();

    let err = interceptor.on_install().await.unwrap_err();
    assert!(matches!(
        err,
        InstallError::Fetch { source: FetchError::Unreachable(_), .. }
    ));
    assert!(cache.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_install_fails_on_error_status_without_partial_cache() {
    let config = WorkerConfig {
        seed_urls: vec!["/".to_string(), "/static/missing.css".to_string()],
        ..WorkerConfig::default()
    };
    let cache = Arc::new(MemoryCache::new(&config.cache_name));
    let origin = Arc::new(FakeOrigin::app_shell());
    let interceptor = CacheInterceptor::new(cache.clone(), origin, config);

    let err = interceptor.on_install().await.unwrap_err();
    match err {
        InstallError::Fetch { url, source: FetchError::BadStatus { status, .. } } => {
            assert_eq!(url, "/static/missing.css");
            assert_eq!(status, 404);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // "/" fetched fine but must not be stored on its own
    assert!(cache.is_empty().await);
}

// ============================================================================
// Fetch
// ============================================================================

#[tokio::test]
async fn test_bypass_never_consults_cache() {
    let (interceptor, cache, origin) = setup();
    interceptor.on_install().await.unwrap();
    let calls_after_install = origin.calls();

    for url in ["/upload", "/upload?file=x", "/share", "/share?text=hi"] {
        let decision = interceptor.on_fetch(&Request::get(url)).await.unwrap();
        assert_eq!(decision, FetchDecision::Bypass, "{url} should bypass");
    }
    let post = Request::new(Method::POST, "/upload").with_body("file bytes");
    assert_eq!(interceptor.on_fetch(&post).await.unwrap(), FetchDecision::Bypass);

    assert_eq!(cache.lookups(), 0);
    // The interceptor itself does not forward bypassed requests
    assert_eq!(origin.calls(), calls_after_install);
}

#[tokio::test]
async fn test_bypass_applies_even_when_cached() {
    let (interceptor, cache, _origin) = setup();
    cache
        .put(CacheKey::get("/share"), Response::new(200, "stale share page"))
        .await
        .unwrap();

    let decision = interceptor.on_fetch(&Request::get("/share")).await.unwrap();
    assert_eq!(decision, FetchDecision::Bypass);
    assert_eq!(cache.lookups(), 0);
}

#[tokio::test]
async fn test_hit_serves_stored_bytes_without_network() {
    let (interceptor, cache, origin) = setup();
    interceptor.on_install().await.unwrap();
    let stored = cache.get(&CacheKey::get("/static/icon-192.png")).await.unwrap().unwrap();

    // Origin content changes after install; the cached copy still wins
    origin.route("/static/icon-192.png", Response::new(200, "new icon"));
    let calls = origin.calls();

    let decision = interceptor
        .on_fetch(&Request::get("/static/icon-192.png"))
        .await
        .unwrap();
    assert_eq!(decision, FetchDecision::Cached(stored));
    assert_eq!(origin.calls(), calls);
}

#[tokio::test]
async fn test_miss_fetches_once_and_does_not_store() {
    let (interceptor, cache, origin) = setup();
    interceptor.on_install().await.unwrap();
    origin.route("/unseen.css", Response::new(200, "body { color: red }"));
    let keys_before = cache.keys().await.unwrap();

    let decision = interceptor.on_fetch(&Request::get("/unseen.css")).await.unwrap();
    assert_eq!(
        decision,
        FetchDecision::Network(Response::new(200, "body { color: red }"))
    );
    assert_eq!(origin.calls_to("/unseen.css"), 1);
    assert_eq!(cache.keys().await.unwrap(), keys_before);
}

#[tokio::test]
async fn test_miss_returns_error_statuses_verbatim() {
    let (interceptor, _cache, _origin) = setup();
    let decision = interceptor.on_fetch(&Request::get("/nope")).await.unwrap();
    assert_eq!(decision, FetchDecision::Network(Response::new(404, "Not Found")));
}

#[tokio::test]
async fn test_network_failure_on_miss_propagates() {
    let (interceptor, _cache, origin) = setup();
    origin.go_offline();
    let result = interceptor.on_fetch(&Request::get("/unseen.css")).await;
    assert!(matches!(result, Err(FetchError::Unreachable(_))));
}

#[tokio::test]
async fn test_non_get_is_never_a_hit() {
    let (interceptor, _cache, origin) = setup();
    interceptor.on_install().await.unwrap();

    let decision = interceptor
        .on_fetch(&Request::new(Method::POST, "/"))
        .await
        .unwrap();
    assert_eq!(decision.source(), "network");
    assert_eq!(origin.calls_to("/"), 2);
}

#[tokio::test]
async fn test_offline_after_install() {
    let (interceptor, _cache, origin) = setup();
    interceptor.on_install().await.unwrap();
    origin.go_offline();

    for url in ["/", "/static/manifest.json", "/static/icon-192.png#anchor"] {
        let decision = interceptor.on_fetch(&Request::get(url)).await.unwrap();
        assert_eq!(decision.source(), "cache", "{url} should be served offline");
    }
}

#[tokio::test]
async fn test_absolute_url_on_origin_is_served_offline() {
    let (interceptor, _cache, origin) = setup_with_origin();
    interceptor.on_install().await.unwrap();
    origin.go_offline();

    for url in [
        "https://192.168.1.20:5000/",
        "https://192.168.1.20:5000/static/manifest.json",
        "https://192.168.1.20:5000/static/icon-192.png#anchor",
    ] {
        let decision = interceptor.on_fetch(&Request::get(url)).await.unwrap();
        assert_eq!(decision.source(), "cache", "{url} should be served offline");
    }

    // Same path on another host is a different resource
    let other = interceptor
        .on_fetch(&Request::get("https://192.168.1.99:5000/"))
        .await;
    assert!(matches!(other, Err(FetchError::Unreachable(_))));
}

#[tokio::test]
async fn test_absolute_seed_shares_entry_with_relative_path() {
    let (interceptor, cache, origin) = setup();
    let config = WorkerConfig {
        seed_urls: vec![format!("{ORIGIN}/static/manifest.json")],
        ..WorkerConfig::default()
    };
    let interceptor = CacheInterceptor::new(cache.clone(), origin.clone(), config)
        .with_origin(Url::parse(ORIGIN).unwrap());

    interceptor.on_install().await.unwrap();
    assert_eq!(
        cache.keys().await.unwrap(),
        vec![CacheKey::get("/static/manifest.json")]
    );

    origin.go_offline();
    let decision = interceptor
        .on_fetch(&Request::get("/static/manifest.json"))
        .await
        .unwrap();
    assert_eq!(decision.source(), "cache");
}

#[tokio::test]
async fn test_duplicate_seeds_fail_before_any_fetch() {
    let config = WorkerConfig {
        seed_urls: vec![
            "/".to_string(),
            "/static/manifest.json".to_string(),
            format!("{ORIGIN}/"),
        ],
        ..WorkerConfig::default()
    };
    let cache = Arc::new(MemoryCache::new(&config.cache_name));
    let origin = Arc::new(FakeOrigin::app_shell());
    let interceptor = CacheInterceptor::new(cache.clone(), origin.clone(), config)
        .with_origin(Url::parse(ORIGIN).unwrap());

    let err = interceptor.on_install().await.unwrap_err();
    match err {
        InstallError::Cache(CacheError::DuplicateRequest(key)) => assert_eq!(key, "GET /"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(origin.calls(), 0);
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let (interceptor, cache, origin) = setup();
    interceptor.on_install().await.unwrap();
    let calls = origin.calls();

    let home = interceptor.on_fetch(&Request::get("/")).await.unwrap();
    assert_eq!(home.source(), "cache");
    assert_eq!(
        home.into_response().unwrap().body,
        b"<html>AirTransfer</html>"
    );
    assert_eq!(origin.calls(), calls);

    let upload = interceptor.on_fetch(&Request::get("/upload?file=x")).await.unwrap();
    assert_eq!(upload, FetchDecision::Bypass);
    assert!(upload.into_response().is_none());

    origin.route("/unseen.css", Response::new(200, "p {}"));
    let css = interceptor.on_fetch(&Request::get("/unseen.css")).await.unwrap();
    assert_eq!(css.source(), "network");
    assert_eq!(origin.calls(), calls + 1);
    assert_eq!(cache.keys().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_concurrent_fetches_share_bucket() {
    let (interceptor, _cache, origin) = setup();
    interceptor.on_install().await.unwrap();
    let calls = origin.calls();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let interceptor = interceptor.clone();
            tokio::spawn(async move { interceptor.on_fetch(&Request::get("/")).await })
        })
        .collect();
    for handle in handles {
        let decision = handle.await.unwrap().unwrap();
        assert_eq!(decision.source(), "cache");
    }
    assert_eq!(origin.calls(), calls);
}
