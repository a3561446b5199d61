use crate::manifest::{AssetDescriptor, ManifestSet};
use indicatif::{ProgressBar, ProgressStyle};
use modsync_core::ensure_dir;
use modsync_core::{SyncError, SyncResult};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Per-artifact download timeout; expiry surfaces as a retryable fetch error.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Checksum algorithm for verifying artifact integrity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlgorithm {
    /// SHA-256 (the asset index's native hash, default for bare digests)
    #[default]
    Sha256,
    /// BLAKE3
    Blake3,
}

impl ChecksumAlgorithm {
    /// Parse algorithm from a prefixed checksum string
    pub fn from_checksum(checksum: &str) -> Self {
        if checksum.starts_with("blake3:") {
            ChecksumAlgorithm::Blake3
        } else {
            ChecksumAlgorithm::Sha256
        }
    }
}

/// One asset that could not be cached this run
#[derive(Debug)]
pub struct CacheFailure {
    pub name: String,
    pub error: SyncError,
}

/// Shared artifact cache, keyed by `(name, version)` via the artifact
/// filename. Append-mostly: entries for old versions persist until an
/// explicit `clean`.
#[derive(Clone)]
pub struct AssetCache {
    root: PathBuf,
    client: Client,
    max_concurrent: usize,
    // at-most-one-writer per cache key across concurrent callers
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AssetCache {
    /// Create a cache rooted at `cache_root`, creating the layout if absent.
    pub fn new(cache_root: PathBuf) -> SyncResult<Self> {
        ensure_dir(&cache_root)?;
        let cache = Self {
            root: cache_root,
            client: Client::builder()
                .timeout(DOWNLOAD_TIMEOUT)
                .build()
                .map_err(SyncError::Http)?,
            max_concurrent: 4,
            locks: Arc::new(Mutex::new(HashMap::new())),
        };
        ensure_dir(&cache.mods_dir())?;
        Ok(cache)
    }

    /// Bound the download worker pool (default 4).
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Override the per-download timeout (default 120s).
    pub fn with_timeout(mut self, timeout: Duration) -> SyncResult<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SyncError::Http)?;
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding cached mod artifacts
    pub fn mods_dir(&self) -> PathBuf {
        self.root.join("mods")
    }

    /// Cache location for one asset's artifact
    pub fn entry_path(&self, asset: &AssetDescriptor) -> PathBuf {
        self.mods_dir().join(asset.file_name())
    }

    /// Make every descriptor's artifact available locally, downloading at
    /// most once per `(name, version)`. Returns the name -> path mapping for
    /// everything that is now verified on disk, plus the per-asset failures
    /// (integrity or fetch) that were skipped this run.
    pub async fn ensure_cached(
        &self,
        set: &ManifestSet,
    ) -> (HashMap<String, PathBuf>, Vec<CacheFailure>) {
        let mut join_set = JoinSet::new();
        let mut outcomes = Vec::new();

        for asset in set.iter().cloned() {
            if join_set.len() >= self.max_concurrent {
                if let Some(Ok(outcome)) = join_set.join_next().await {
                    outcomes.push(outcome);
                }
            }

            let cache = self.clone();
            join_set.spawn(async move {
                let name = asset.name.clone();
                let result = cache.ensure_one(&asset).await;
                (name, result)
            });
        }

        while let Some(result) = join_set.join_next().await {
            if let Ok(outcome) = result {
                outcomes.push(outcome);
            }
        }

        let mut paths = HashMap::new();
        let mut failures = Vec::new();
        for (name, result) in outcomes {
            match result {
                Ok(path) => {
                    paths.insert(name, path);
                }
                Err(error) => {
                    warn!("Failed to cache {}: {}", name, error);
                    failures.push(CacheFailure { name, error });
                }
            }
        }
        (paths, failures)
    }

    /// `ensure_cached` with a progress bar over the batch.
    pub async fn ensure_cached_with_progress(
        &self,
        set: &ManifestSet,
    ) -> (HashMap<String, PathBuf>, Vec<CacheFailure>) {
        let pb = ProgressBar::new(set.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} mods")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let (paths, failures) = self.ensure_cached(set).await;

        for name in paths.keys() {
            pb.inc(1);
            pb.println(format!("  ✓ {}", name));
        }
        for failure in &failures {
            pb.inc(1);
            pb.println(format!("  ✗ {} ({})", failure.name, failure.error));
        }
        pb.finish_with_message("Cache up to date");

        (paths, failures)
    }

    /// Cache one asset: reuse a verified entry, replace a corrupt one,
    /// download an absent one. Holds the per-key lock for the whole check
    /// and write so concurrent callers never race on the same destination.
    async fn ensure_one(&self, asset: &AssetDescriptor) -> SyncResult<PathBuf> {
        let dest = self.entry_path(asset);
        let lock = self.key_lock(&asset.file_name()).await;
        let _guard = lock.lock().await;

        if dest.exists() {
            if Self::verify_checksum(&dest, &asset.checksum)? {
                debug!("Cache hit: {}", asset.file_name());
                return Ok(dest);
            }
            warn!("Corrupt cache entry, re-downloading: {}", asset.file_name());
        }

        self.download(asset, &dest).await?;
        Ok(dest)
    }

    /// Download to `{dest}.part`, verify, then atomically rename into place.
    /// The destination path never holds a partial write.
    async fn download(&self, asset: &AssetDescriptor, dest: &Path) -> SyncResult<()> {
        use std::io::Write;

        debug!("Downloading {} from {}", asset.file_name(), asset.source_url);
        let mut response = self
            .client
            .get(&asset.source_url)
            .send()
            .await
            .map_err(map_fetch_error)?;

        if !response.status().is_success() {
            return Err(SyncError::Fetch(format!(
                "{} returned {}",
                asset.source_url,
                response.status()
            )));
        }

        // stream to disk so multi-hundred-MB packs never sit in memory
        let part = dest.with_extension("part");
        let mut file = fs::File::create(&part)?;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => file.write_all(&chunk)?,
                Ok(None) => break,
                Err(e) => {
                    drop(file);
                    let _ = fs::remove_file(&part);
                    return Err(map_fetch_error(e));
                }
            }
        }
        file.flush()?;
        drop(file);

        if !Self::verify_checksum(&part, &asset.checksum)? {
            let actual =
                Self::checksum_file(&part, ChecksumAlgorithm::from_checksum(&asset.checksum))?;
            let _ = fs::remove_file(&part);
            return Err(SyncError::Integrity(format!(
                "{}: expected {}, downloaded {}",
                asset.file_name(),
                asset.checksum,
                actual
            )));
        }

        fs::rename(&part, dest)?;
        Ok(())
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Calculate a file's checksum with the given algorithm
    pub fn checksum_file(path: &Path, algorithm: ChecksumAlgorithm) -> SyncResult<String> {
        let data = fs::read(path)?;
        match algorithm {
            ChecksumAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(&data);
                Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
            }
            ChecksumAlgorithm::Blake3 => {
                let hash = blake3::hash(&data);
                Ok(format!("blake3:{}", hash.to_hex()))
            }
        }
    }

    /// Verify a file against an expected checksum, bare or prefixed
    pub fn verify_checksum(path: &Path, expected: &str) -> SyncResult<bool> {
        let algorithm = ChecksumAlgorithm::from_checksum(expected);
        let actual = Self::checksum_file(path, algorithm)?;

        let expected_hash = expected.split_once(':').map(|(_, h)| h).unwrap_or(expected);
        let actual_hash = actual.split_once(':').map(|(_, h)| h).unwrap_or(&actual);

        Ok(expected_hash.eq_ignore_ascii_case(actual_hash))
    }

    /// Prune cache entries older than `max_age_days`. Stale versions are
    /// otherwise kept indefinitely; this never runs implicitly.
    pub fn clean(&self, max_age_days: u64) -> SyncResult<CacheCleanResult> {
        use std::time::SystemTime;
        use walkdir::WalkDir;

        let max_age = Duration::from_secs(max_age_days * 24 * 60 * 60);
        let now = SystemTime::now();
        let mut result = CacheCleanResult::default();

        for entry in WalkDir::new(self.mods_dir())
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            let Ok(age) = now.duration_since(modified) else {
                continue;
            };
            if age > max_age {
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!("Failed to remove {}: {}", entry.path().display(), e);
                } else {
                    result.files_removed += 1;
                    result.bytes_freed += metadata.len();
                }
            }
        }

        Ok(result)
    }
}

/// Timeouts become retryable fetch errors; everything else stays an HTTP error.
fn map_fetch_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Fetch(format!("Download timed out: {}", e))
    } else {
        SyncError::Http(e)
    }
}

/// Result of a cache clean
#[derive(Debug, Default)]
pub struct CacheCleanResult {
    pub files_removed: usize,
    pub bytes_freed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Side;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sha256_hex(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    fn asset(name: &str, version: &str, url: String, data: &[u8]) -> AssetDescriptor {
        AssetDescriptor {
            name: name.to_string(),
            version: version.to_string(),
            source_url: url,
            checksum: sha256_hex(data),
            side: Side::Both,
        }
    }

    async fn mock_artifact(server: &MockServer, route: &str, data: &'static [u8], hits: u64) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(data))
            .expect(hits)
            .mount(server)
            .await;
    }

    #[test]
    fn test_entry_path_keys_by_name_and_version() {
        let temp = TempDir::new().unwrap();
        let cache = AssetCache::new(temp.path().to_path_buf()).unwrap();
        let a = AssetDescriptor {
            name: "foo".to_string(),
            version: "1.0".to_string(),
            source_url: String::new(),
            checksum: String::new(),
            side: Side::Both,
        };
        assert!(cache.entry_path(&a).ends_with("mods/foo-1.0.jar"));
    }

    #[test]
    fn test_verify_checksum_bare_and_prefixed() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.jar");
        fs::write(&file, b"artifact bytes").unwrap();

        let bare = sha256_hex(b"artifact bytes");
        assert!(AssetCache::verify_checksum(&file, &bare).unwrap());
        assert!(AssetCache::verify_checksum(&file, &format!("sha256:{}", bare)).unwrap());
        assert!(!AssetCache::verify_checksum(&file, &sha256_hex(b"other")).unwrap());

        let b3 = blake3::hash(b"artifact bytes").to_hex().to_string();
        assert!(AssetCache::verify_checksum(&file, &format!("blake3:{}", b3)).unwrap());
    }

    #[tokio::test]
    async fn test_ensure_cached_downloads_once() {
        let server = MockServer::start().await;
        let data: &[u8] = b"jar contents";
        mock_artifact(&server, "/foo-1.0.jar", data, 1).await;

        let temp = TempDir::new().unwrap();
        let cache = AssetCache::new(temp.path().to_path_buf()).unwrap();
        let mut set = ManifestSet::new();
        set.insert(asset("foo", "1.0", format!("{}/foo-1.0.jar", server.uri()), data));

        let (paths, failures) = cache.ensure_cached(&set).await;
        assert!(failures.is_empty());
        assert_eq!(fs::read(&paths["foo"]).unwrap(), data);

        // second pass is a checksum-verified hit, no network call
        let (paths, failures) = cache.ensure_cached(&set).await;
        assert!(failures.is_empty());
        assert!(paths["foo"].exists());
        server.verify().await;
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_redownloaded() {
        let server = MockServer::start().await;
        let data: &[u8] = b"good bytes";
        mock_artifact(&server, "/foo-1.0.jar", data, 1).await;

        let temp = TempDir::new().unwrap();
        let cache = AssetCache::new(temp.path().to_path_buf()).unwrap();
        let mut set = ManifestSet::new();
        let a = asset("foo", "1.0", format!("{}/foo-1.0.jar", server.uri()), data);
        fs::write(cache.entry_path(&a), b"bit-rotted").unwrap();
        set.insert(a);

        let (paths, failures) = cache.ensure_cached(&set).await;
        assert!(failures.is_empty());
        assert_eq!(fs::read(&paths["foo"]).unwrap(), data);
    }

    #[tokio::test]
    async fn test_integrity_failure_skips_asset_not_batch() {
        let server = MockServer::start().await;
        let good: &[u8] = b"good bytes";
        mock_artifact(&server, "/good-1.0.jar", good, 1).await;
        mock_artifact(&server, "/bad-1.0.jar", b"tampered", 1).await;

        let temp = TempDir::new().unwrap();
        let cache = AssetCache::new(temp.path().to_path_buf()).unwrap();
        let mut set = ManifestSet::new();
        set.insert(asset("good", "1.0", format!("{}/good-1.0.jar", server.uri()), good));
        // checksum says one thing, server serves another
        set.insert(asset(
            "bad",
            "1.0",
            format!("{}/bad-1.0.jar", server.uri()),
            b"expected bytes",
        ));

        let (paths, failures) = cache.ensure_cached(&set).await;
        assert_eq!(paths.len(), 1);
        assert!(paths.contains_key("good"));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, "bad");
        assert!(matches!(failures[0].error, SyncError::Integrity(_)));

        // neither the destination nor a partial write is left behind
        let bad_dest = cache.mods_dir().join("bad-1.0.jar");
        assert!(!bad_dest.exists());
        assert!(!bad_dest.with_extension("part").exists());
    }

    #[tokio::test]
    async fn test_same_key_writers_do_not_race() {
        let server = MockServer::start().await;
        let data: &[u8] = b"raced bytes";
        // the response delay keeps both callers in flight at once; exactly
        // one may download, the other waits on the key lock and reuses it
        Mock::given(method("GET"))
            .and(path("/foo-1.0.jar"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(data)
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let cache = AssetCache::new(temp.path().to_path_buf()).unwrap();
        let mut set = ManifestSet::new();
        set.insert(asset("foo", "1.0", format!("{}/foo-1.0.jar", server.uri()), data));

        let (a, b) = tokio::join!(cache.ensure_cached(&set), cache.ensure_cached(&set));
        assert!(a.1.is_empty());
        assert!(b.1.is_empty());
        assert_eq!(a.0["foo"], b.0["foo"]);
        assert_eq!(fs::read(&a.0["foo"]).unwrap(), data);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_slow_download_times_out_as_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow-1.0.jar"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow bytes".to_vec())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let cache = AssetCache::new(temp.path().to_path_buf())
            .unwrap()
            .with_timeout(Duration::from_millis(100))
            .unwrap();
        let mut set = ManifestSet::new();
        set.insert(asset(
            "slow",
            "1.0",
            format!("{}/slow-1.0.jar", server.uri()),
            b"slow bytes",
        ));

        let (paths, failures) = cache.ensure_cached(&set).await;
        assert!(paths.is_empty());
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].error, SyncError::Fetch(_)));
        assert!(failures[0].error.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_artifact_is_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone-1.0.jar"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let cache = AssetCache::new(temp.path().to_path_buf()).unwrap();
        let mut set = ManifestSet::new();
        set.insert(asset("gone", "1.0", format!("{}/gone-1.0.jar", server.uri()), b"x"));

        let (paths, failures) = cache.ensure_cached(&set).await;
        assert!(paths.is_empty());
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].error, SyncError::Fetch(_)));
    }

    #[test]
    fn test_clean_prunes_by_age() {
        let temp = TempDir::new().unwrap();
        let cache = AssetCache::new(temp.path().to_path_buf()).unwrap();
        let stale = cache.mods_dir().join("old-0.9.jar");
        fs::write(&stale, b"old").unwrap();

        // nothing is older than a year
        let result = cache.clean(365).unwrap();
        assert_eq!(result.files_removed, 0);
        assert!(stale.exists());

        // with a zero-day horizon everything qualifies
        std::thread::sleep(Duration::from_millis(50));
        let result = cache.clean(0).unwrap();
        assert_eq!(result.files_removed, 1);
        assert!(!stale.exists());
    }
}
