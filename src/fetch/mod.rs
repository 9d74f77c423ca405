// src/fetch/mod.rs

//! Artifact fetcher: download, verify and cache source archives
//!
//! Archives are cached by checksum at `<cache>/sha256-<hex>`, so a second
//! fetch of the same recipe is a cache hit and never touches the network.
//! Downloads stream into a temporary file in the cache directory while being
//! hashed, and only a verified file is renamed into place.

mod archive;
mod client;

pub use archive::{unpack, ArchiveFormat};
pub use client::{HttpTransport, Transport};

use crate::error::{Error, Result};
use crate::hash::{hash_file, Checksum, Hasher};
use crate::recipe::Recipe;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Retry settings for transient network failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each one after
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// Downloads and verifies source archives, with a checksum-keyed cache
pub struct Fetcher {
    cache_dir: PathBuf,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl Fetcher {
    /// Create a fetcher caching into `cache_dir`
    pub fn new(cache_dir: impl Into<PathBuf>, transport: Arc<dyn Transport>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            transport,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where an archive with this checksum lives in the cache
    pub fn cache_path(&self, checksum: &Checksum) -> PathBuf {
        self.cache_dir.join(format!("sha256-{}", checksum))
    }

    /// Whether an archive with this checksum is already cached
    ///
    /// Does not re-verify the content; [`Fetcher::fetch`] does.
    pub fn is_cached(&self, checksum: &Checksum) -> bool {
        self.cache_path(checksum).is_file()
    }

    /// Fetch a recipe's source archive
    pub fn fetch_recipe(&self, recipe: &Recipe) -> Result<PathBuf> {
        self.fetch(recipe.source_url(), recipe.checksum())
    }

    /// Fetch `url`, verify it against `checksum`, and return the cached path
    ///
    /// A verified cache hit returns immediately. A cached file that fails
    /// verification is discarded and downloaded again. A download whose
    /// digest disagrees fails with [`Error::ChecksumMismatch`] and leaves
    /// nothing in the cache.
    pub fn fetch(&self, url: &Url, checksum: &Checksum) -> Result<PathBuf> {
        fs::create_dir_all(&self.cache_dir).map_err(|e| {
            Error::IoError(format!(
                "Failed to create cache directory {}: {}",
                self.cache_dir.display(),
                e
            ))
        })?;

        let cached_path = self.cache_path(checksum);

        if cached_path.exists() {
            let actual = hash_file(&cached_path)?;
            if &actual == checksum {
                debug!("Using cached source: {}", cached_path.display());
                return Ok(cached_path);
            }
            warn!(
                "Cached file {} has checksum {}, re-downloading",
                cached_path.display(),
                actual
            );
            fs::remove_file(&cached_path)?;
        }

        info!("Downloading: {}", url);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.download_verified(url, checksum, &cached_path) {
                Ok(()) => {
                    info!("Verified {} ({})", url, checksum.to_prefixed_string());
                    return Ok(cached_path);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        "Download attempt {}/{} failed: {}, retrying in {:?}",
                        attempt, self.retry.max_attempts, e, delay
                    );
                    std::thread::sleep(delay);
                }
                Err(Error::Network { url, reason, retryable }) if retryable => {
                    return Err(Error::Network {
                        url,
                        reason: format!("{} (after {} attempts)", reason, attempt),
                        retryable,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn download_verified(&self, url: &Url, checksum: &Checksum, dest: &Path) -> Result<()> {
        let temp = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(&self.cache_dir)?;

        let mut writer = HashingWriter::new(temp);
        let bytes = self.transport.download(url, &mut writer)?;
        writer.flush()?;
        let (temp, actual) = writer.finish();
        debug!("Downloaded {} bytes from {}", bytes, url);

        if &actual != checksum {
            // The temporary file is deleted when dropped
            return Err(Error::ChecksumMismatch {
                expected: checksum.to_string(),
                actual: actual.to_string(),
            });
        }

        temp.persist(dest).map_err(|e| {
            Error::IoError(format!("Failed to move download to {}: {}", dest.display(), e))
        })?;
        Ok(())
    }
}

/// Writer that hashes everything passing through it
struct HashingWriter<W: Write> {
    inner: W,
    hasher: Hasher,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
        }
    }

    fn finish(self) -> (W, Checksum) {
        (self.inner, self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Transport that replays scripted responses and counts calls
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<Vec<u8>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Vec<u8>>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for ScriptedTransport {
        fn download(&self, _url: &Url, writer: &mut dyn Write) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected download call");
            let bytes = next?;
            writer.write_all(&bytes)?;
            Ok(bytes.len() as u64)
        }
    }

    fn url() -> Url {
        Url::parse("https://example.com/kdreports-1.6.0.tar.gz").unwrap()
    }

    fn no_delay() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_fetch_then_refetch_hits_cache() {
        let dir = TempDir::new().unwrap();
        let data = b"archive".to_vec();
        let checksum = hash_bytes(&data);
        let transport = ScriptedTransport::new(vec![Ok(data.clone())]);
        let fetcher = Fetcher::new(dir.path(), transport.clone());

        let first = fetcher.fetch(&url(), &checksum).unwrap();
        let second = fetcher.fetch(&url(), &checksum).unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.calls(), 1);
        assert_eq!(fs::read(&first).unwrap(), data);
        assert!(fetcher.is_cached(&checksum));
    }

    #[test]
    fn test_checksum_mismatch_leaves_cache_empty() {
        let dir = TempDir::new().unwrap();
        let checksum = hash_bytes(b"archive");
        let transport = ScriptedTransport::new(vec![Ok(b"archivf".to_vec())]);
        let fetcher = Fetcher::new(dir.path(), transport.clone()).with_retry(no_delay());

        let err = fetcher.fetch(&url(), &checksum).unwrap_err();
        match err {
            Error::ChecksumMismatch { expected, actual } => {
                assert_eq!(expected, checksum.to_string());
                assert_eq!(actual, hash_bytes(b"archivf").to_string());
            }
            other => panic!("expected ChecksumMismatch, got {other:?}"),
        }
        // Mismatch is not retried
        assert_eq!(transport.calls(), 1);
        assert!(!fetcher.is_cached(&checksum));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let dir = TempDir::new().unwrap();
        let data = b"archive".to_vec();
        let checksum = hash_bytes(&data);
        let transport = ScriptedTransport::new(vec![
            Err(Error::network("u", "connection reset", true)),
            Err(Error::network("u", "HTTP 503", true)),
            Ok(data),
        ]);
        let fetcher = Fetcher::new(dir.path(), transport.clone()).with_retry(no_delay());

        fetcher.fetch(&url(), &checksum).unwrap();
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn test_retries_are_bounded() {
        let dir = TempDir::new().unwrap();
        let checksum = hash_bytes(b"archive");
        let transport = ScriptedTransport::new(vec![
            Err(Error::network("u", "timeout", true)),
            Err(Error::network("u", "timeout", true)),
            Err(Error::network("u", "timeout", true)),
        ]);
        let fetcher = Fetcher::new(dir.path(), transport.clone()).with_retry(no_delay());

        let err = fetcher.fetch(&url(), &checksum).unwrap_err();
        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn test_permanent_errors_are_not_retried() {
        let dir = TempDir::new().unwrap();
        let checksum = hash_bytes(b"archive");
        let transport =
            ScriptedTransport::new(vec![Err(Error::network("u", "HTTP 404", false))]);
        let fetcher = Fetcher::new(dir.path(), transport.clone()).with_retry(no_delay());

        assert!(fetcher.fetch(&url(), &checksum).is_err());
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_corrupt_cache_entry_is_redownloaded() {
        let dir = TempDir::new().unwrap();
        let data = b"archive".to_vec();
        let checksum = hash_bytes(&data);
        let transport = ScriptedTransport::new(vec![Ok(data.clone())]);
        let fetcher = Fetcher::new(dir.path(), transport.clone());

        fs::write(fetcher.cache_path(&checksum), b"stale").unwrap();
        let path = fetcher.fetch(&url(), &checksum).unwrap();

        assert_eq!(transport.calls(), 1);
        assert_eq!(fs::read(path).unwrap(), data);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }
}
