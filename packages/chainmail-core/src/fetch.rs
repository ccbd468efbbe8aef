//! # Fetch Pipeline
//!
//! Cache-aside, multi-scheme retrieval of stored bytes, verified against a
//! self-describing digest.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         get_message(location, digest)                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   cache.get(location) ──hit──────────────────────────┐                 │
//! │         │                                            │                 │
//! │        miss                                          │                 │
//! │         ▼                                            │                 │
//! │   ┌─────────────── scheme ───────────────┐           │                 │
//! │   │ http / https  GET, non-2xx is error  │           │                 │
//! │   │ file          local read             │           │                 │
//! │   │ test          literal (tests only)   │           │                 │
//! │   │ other         unsupported scheme     │           │                 │
//! │   └──────────────────┬───────────────────┘           │                 │
//! │                      ▼                               │                 │
//! │   cache.set(location, bytes)   failure only logged   │                 │
//! │                      │                               │                 │
//! │                      ▼                               ▼                 │
//! │          digest non-empty?  ──yes──►  compare_contents_to_hash         │
//! │                      │                               │                 │
//! │                      └────────────► bytes ◄──────────┘                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Concurrent fetches of one location are not deduplicated. Every fetch of
//! a location yields the same verified bytes, so racing writers to the
//! cache store identical values.

use std::io::ErrorKind as IoErrorKind;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{MailboxConfig, DEFAULT_FETCH_TIMEOUT_SECS};
use crate::digest::compare_contents_to_hash;
use crate::error::{Error, Result, Stage, StageExt};
use crate::storage::{Cache, Location};

/// Retrieves stored content through a shared cache
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    cache: Arc<dyn Cache>,
}

impl Fetcher {
    /// Create a fetcher with the default HTTP timeout
    pub fn new(cache: Arc<dyn Cache>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(client, cache))
    }

    /// Create a fetcher around an existing HTTP client
    pub fn with_client(client: reqwest::Client, cache: Arc<dyn Cache>) -> Self {
        Self { client, cache }
    }

    /// Create a fetcher from configuration: timeout, user agent and cache
    pub fn from_config(config: &MailboxConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_client(client, config.build_cache()?))
    }

    /// The cache in use
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Fetch the bytes at `location`, verifying them against
    /// `expected_digest` unless it is empty
    pub async fn get_message(&self, location: &str, expected_digest: &[u8]) -> Result<Vec<u8>> {
        fetch_verified(&self.client, &self.cache, location, expected_digest).await
    }
}

/// Fetch the bytes at `location` through `cache` with a one-off HTTP client
///
/// Prefer [`Fetcher`] when fetching more than once.
pub async fn get_message(
    location: &str,
    expected_digest: &[u8],
    cache: Arc<dyn Cache>,
) -> Result<Vec<u8>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
        .build()?;
    fetch_verified(&client, &cache, location, expected_digest).await
}

async fn fetch_verified(
    client: &reqwest::Client,
    cache: &Arc<dyn Cache>,
    location: &str,
    expected_digest: &[u8],
) -> Result<Vec<u8>> {
    let contents = match cache_get(cache, location).await.stage(Stage::ReadCache)? {
        Some(cached) => {
            tracing::debug!("Cache hit for {}", location);
            cached
        }
        None => {
            tracing::debug!("Cache miss for {}", location);
            let fetched = fetch(client, location).await.stage(Stage::Fetch)?;
            if let Err(e) = cache_set(cache, location, fetched.clone()).await {
                tracing::warn!("Failed to cache contents of {}: {}", location, e);
            }
            fetched
        }
    };

    if !expected_digest.is_empty() {
        compare_contents_to_hash(&contents, expected_digest).stage(Stage::VerifyContents)?;
    }

    Ok(contents)
}

/// Cache implementations may block on disk, so they run off the async workers
async fn cache_get(cache: &Arc<dyn Cache>, location: &str) -> Result<Option<Vec<u8>>> {
    let cache = Arc::clone(cache);
    let location = location.to_string();
    tokio::task::spawn_blocking(move || cache.get(&location))
        .await
        .map_err(|e| Error::StorageReadError(format!("cache lookup task failed: {}", e)))?
}

async fn cache_set(cache: &Arc<dyn Cache>, location: &str, contents: Vec<u8>) -> Result<()> {
    let cache = Arc::clone(cache);
    let location = location.to_string();
    tokio::task::spawn_blocking(move || cache.set(&location, &contents))
        .await
        .map_err(|e| Error::StorageWriteError(format!("cache write task failed: {}", e)))?
}

/// Dispatch on the location's scheme
async fn fetch(client: &reqwest::Client, location: &str) -> Result<Vec<u8>> {
    let parsed = Location::parse(location)?;

    match parsed.scheme() {
        "http" | "https" => fetch_http(client, location).await,
        "file" => fetch_file(location, parsed.remainder()).await,
        #[cfg(any(test, feature = "test-scheme"))]
        "test" => Ok(parsed.remainder().as_bytes().to_vec()),
        other => Err(Error::UnsupportedScheme(other.to_string())),
    }
}

async fn fetch_http(client: &reqwest::Client, location: &str) -> Result<Vec<u8>> {
    let response = client.get(location).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            location: location.to_string(),
        });
    }

    Ok(response.bytes().await?.to_vec())
}

async fn fetch_file(location: &str, path: &str) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        IoErrorKind::NotFound => Error::ContentNotFound(location.to_string()),
        _ => Error::TransportError(format!("{}: {}", location, e)),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{create, HashKind};
    use crate::storage::{FileCache, MemoryCache, NoopCache};

    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const GOLDEN: &str = "file://./testdata/simple.golden.eml-2204ec872b32";

    /// Cache whose reads or writes always fail
    struct BrokenCache {
        fail_reads: bool,
        writes: AtomicUsize,
    }

    impl Cache for BrokenCache {
        fn get(&self, _location: &str) -> Result<Option<Vec<u8>>> {
            if self.fail_reads {
                return Err(Error::StorageReadError("disk on fire".into()));
            }
            Ok(None)
        }

        fn set(&self, _location: &str, _contents: &[u8]) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(Error::StorageWriteError("disk full".into()))
        }
    }

    /// Fetcher that talks to loopback directly, whatever the proxy environment
    fn local_fetcher(cache: Arc<dyn Cache>) -> Fetcher {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        Fetcher::with_client(client, cache)
    }

    /// Serve one canned HTTP response per accepted connection
    async fn serve(status_line: &'static str, body: &'static [u8], connections: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for _ in 0..connections {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status_line,
                    body.len()
                );
                socket.write_all(head.as_bytes()).await.unwrap();
                socket.write_all(body).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        format!("http://{}/message", addr)
    }

    #[tokio::test]
    async fn test_golden_file_fetch() {
        let expected = std::fs::read("./testdata/simple.golden.eml-2204ec872b32").unwrap();
        let digest = hex::decode("2204ec872b32").unwrap();

        let contents = get_message(GOLDEN, &digest, Arc::new(NoopCache)).await.unwrap();

        assert_eq!(contents, expected);
    }

    #[tokio::test]
    async fn test_golden_file_digest_mismatch() {
        let digest = hex::decode("2204ec872b33").unwrap();

        let err = get_message(GOLDEN, &digest, Arc::new(NoopCache)).await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::VerifyContents));
        assert!(matches!(err.root(), Error::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn test_empty_digest_skips_verification() {
        let contents = get_message("test://anything at all", &[], Arc::new(NoopCache))
            .await
            .unwrap();
        assert_eq!(contents, b"anything at all");
    }

    #[tokio::test]
    async fn test_unparseable_digest() {
        let err = get_message("test://abc", &[0xff, 0x00], Arc::new(NoopCache))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::VerifyContents));
        assert!(err.to_string().contains("could not parse hash"));
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let err = get_message("ftp://example.com/x", &[], Arc::new(NoopCache))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Fetch));
        assert!(matches!(err.root(), Error::UnsupportedScheme(s) if s == "ftp"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = get_message("file://./testdata/does-not-exist", &[], Arc::new(NoopCache))
            .await
            .unwrap_err();

        assert!(matches!(err.root(), Error::ContentNotFound(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_fetch_populates_cache_and_is_idempotent() {
        let cache = Arc::new(MemoryCache::new());
        let fetcher = Fetcher::new(cache.clone()).unwrap();
        let location = "test://cached body";
        let digest = create(HashKind::MurMur3_128, b"cached body").unwrap();

        let first = fetcher.get_message(location, &digest).await.unwrap();
        assert_eq!(cache.len(), 1);
        let second = fetcher.get_message(location, &digest).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_cached_bytes_are_verified() {
        let cache = Arc::new(MemoryCache::new());
        cache.set("test://real", b"poisoned").unwrap();
        let digest = create(HashKind::Sha3_256, b"real").unwrap();

        let err = get_message("test://real", &digest, cache).await.unwrap_err();

        assert!(matches!(err.root(), Error::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_swallowed() {
        let cache = Arc::new(BrokenCache {
            fail_reads: false,
            writes: AtomicUsize::new(0),
        });

        let contents = get_message("test://still works", &[], cache.clone())
            .await
            .unwrap();

        assert_eq!(contents, b"still works");
        assert_eq!(cache.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_read_failure_propagates() {
        let cache = Arc::new(BrokenCache {
            fail_reads: true,
            writes: AtomicUsize::new(0),
        });

        let err = get_message("test://x", &[], cache.clone()).await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::ReadCache));
        assert_eq!(cache.writes.load(Ordering::SeqCst), 0);
    }

    /// Records which threads the cache was called from
    #[derive(Default)]
    struct ThreadRecordingCache {
        threads: parking_lot::Mutex<Vec<std::thread::ThreadId>>,
    }

    impl Cache for ThreadRecordingCache {
        fn get(&self, _location: &str) -> Result<Option<Vec<u8>>> {
            self.threads.lock().push(std::thread::current().id());
            Ok(None)
        }

        fn set(&self, _location: &str, _contents: &[u8]) -> Result<()> {
            self.threads.lock().push(std::thread::current().id());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cache_runs_off_the_runtime_thread() {
        let cache = Arc::new(ThreadRecordingCache::default());
        let runtime_thread = std::thread::current().id();

        get_message("test://blocking", &[], cache.clone()).await.unwrap();

        let threads = cache.threads.lock().clone();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|id| *id != runtime_thread));
    }

    #[tokio::test]
    async fn test_file_cache_serves_second_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FileCache::new(dir.path()).unwrap());
        let fetcher = Fetcher::new(cache.clone()).unwrap();
        let digest = create(HashKind::MurMur3_128, b"on disk").unwrap();

        fetcher.get_message("test://on disk", &digest).await.unwrap();
        assert_eq!(cache.get("test://on disk").unwrap().as_deref(), Some(&b"on disk"[..]));

        let again = fetcher.get_message("test://on disk", &digest).await.unwrap();
        assert_eq!(again, b"on disk");
    }

    #[tokio::test]
    async fn test_http_success() {
        let url = serve("200 OK", b"hello over http", 1).await;
        let digest = create(HashKind::Sha3_256, b"hello over http").unwrap();
        let fetcher = local_fetcher(Arc::new(MemoryCache::new()));

        let contents = fetcher.get_message(&url, &digest).await.unwrap();
        assert_eq!(contents, b"hello over http");

        // served from cache; the server only accepts one connection
        let again = fetcher.get_message(&url, &digest).await.unwrap();
        assert_eq!(again, contents);
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let url = serve("404 Not Found", b"nope", 1).await;

        let fetcher = local_fetcher(Arc::new(NoopCache));

        let err = fetcher.get_message(&url, &[]).await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Fetch));
        match err.root() {
            Error::HttpStatus { status, location } => {
                assert_eq!(*status, 404);
                assert_eq!(location, &url);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = MailboxConfig {
            fetch_timeout_secs: 2,
            ..MailboxConfig::default()
        };
        let fetcher = Fetcher::from_config(&config).unwrap();

        let contents = fetcher.get_message("test://configured", &[]).await.unwrap();
        assert_eq!(contents, b"configured");
        assert!(fetcher.cache().get("test://configured").unwrap().is_some());
    }
}
