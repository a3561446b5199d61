use crate::manifest::ManifestSet;
use async_trait::async_trait;
use modsync_core::{SyncError, SyncResult};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// The newest published artifact for a mod name
#[derive(Debug, Clone)]
pub struct ResolvedVersion {
    pub version: String,
    pub source_url: String,
    pub checksum: String,
}

/// Backend that answers "what is the latest published version of this mod?"
///
/// Kept as a trait so the repository can be swapped out and mocked in tests.
#[async_trait]
pub trait VersionLookup: Send + Sync {
    /// `Ok(None)` means the repository has never published this name, which
    /// is normal for pinned or local-only assets.
    async fn latest(&self, name: &str) -> SyncResult<Option<ResolvedVersion>>;
}

/// One asset that failed to resolve this run
#[derive(Debug)]
pub struct ResolveFailure {
    pub name: String,
    pub error: SyncError,
}

/// Outcome of a resolve pass, surfaced in the run summary
#[derive(Debug, Default)]
pub struct ResolveReport {
    /// Descriptors rewritten to a newer published version
    pub resolved: usize,
    /// Descriptors the repository knows nothing about (left as-is)
    pub unchanged: usize,
    pub failures: Vec<ResolveFailure>,
}

/// Rewrite each descriptor in place to its latest published version.
///
/// Partial-failure tolerant: a lookup error for one asset keeps its prior
/// descriptor and is recorded in the report; the rest continue. Lookups run
/// on a bounded worker pool.
pub async fn resolve_latest(
    set: &mut ManifestSet,
    lookup: Arc<dyn VersionLookup>,
    max_concurrent: usize,
) -> ResolveReport {
    let mut report = ResolveReport::default();
    let mut join_set = JoinSet::new();
    let mut outcomes = Vec::new();

    for name in set.names() {
        if join_set.len() >= max_concurrent.max(1) {
            if let Some(Ok(outcome)) = join_set.join_next().await {
                outcomes.push(outcome);
            }
        }

        let lookup = Arc::clone(&lookup);
        join_set.spawn(async move {
            let result = lookup.latest(&name).await;
            (name, result)
        });
    }

    while let Some(result) = join_set.join_next().await {
        if let Ok(outcome) = result {
            outcomes.push(outcome);
        }
    }

    for (name, result) in outcomes {
        match result {
            Ok(Some(resolved)) => {
                if let Some(asset) = set.get_mut(&name) {
                    if asset.version != resolved.version {
                        debug!("{}: {} -> {}", name, asset.version, resolved.version);
                    }
                    asset.version = resolved.version;
                    asset.source_url = resolved.source_url;
                    asset.checksum = resolved.checksum;
                    report.resolved += 1;
                }
            }
            Ok(None) => {
                debug!("{}: not published, keeping pinned descriptor", name);
                report.unchanged += 1;
            }
            Err(error) => {
                warn!("Failed to resolve {}: {}", name, error);
                report.failures.push(ResolveFailure { name, error });
            }
        }
    }

    report
}

/// Resolves latest versions against a Maven repository layout:
/// `{base}/{name}/maven-metadata.xml` for the release version, then the
/// artifact's `.sha256` sidecar for the rewritten checksum.
pub struct MavenVersionLookup {
    client: Client,
    base_url: String,
    release_pattern: regex::Regex,
}

impl MavenVersionLookup {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
            // <release> is preferred; nightly repos sometimes only set <latest>
            release_pattern: regex::Regex::new(r"<(?:release|latest)>([^<]+)</(?:release|latest)>")
                .expect("static regex"),
        }
    }

    async fn fetch_text(&self, url: &str) -> SyncResult<Option<String>> {
        let response = self.client.get(url).send().await.map_err(SyncError::Http)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SyncError::Fetch(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(Some(response.text().await.map_err(SyncError::Http)?))
    }
}

#[async_trait]
impl VersionLookup for MavenVersionLookup {
    async fn latest(&self, name: &str) -> SyncResult<Option<ResolvedVersion>> {
        let metadata_url = format!("{}/{}/maven-metadata.xml", self.base_url, name);
        let Some(metadata) = self.fetch_text(&metadata_url).await? else {
            return Ok(None);
        };

        let version = self
            .release_pattern
            .captures(&metadata)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .ok_or_else(|| {
                SyncError::Fetch(format!("No release version in {}", metadata_url))
            })?;

        let source_url = format!(
            "{}/{}/{}/{}-{}.jar",
            self.base_url, name, version, name, version
        );

        // No published hash means we could not verify the artifact; count
        // that as a failed resolution rather than trusting the bytes.
        let checksum_url = format!("{}.sha256", source_url);
        let checksum = self
            .fetch_text(&checksum_url)
            .await?
            .ok_or_else(|| SyncError::Fetch(format!("Missing checksum: {}", checksum_url)))?
            .trim()
            .to_string();

        Ok(Some(ResolvedVersion {
            version,
            source_url,
            checksum,
        }))
    }
}
