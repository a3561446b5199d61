use crate::manifest::{AssetDescriptor, AssetIndex, ManifestSet};
use modsync_core::{SyncError, SyncResult};
use reqwest::Client;
use std::path::Path;
use tracing::{debug, info};

/// Retrieves the baseline manifest from the remote asset index
pub struct ManifestFetcher {
    client: Client,
    index_url: String,
}

impl ManifestFetcher {
    pub fn new(index_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            index_url: index_url.into(),
        }
    }

    /// Fetch and decode the asset index. Any failure here is fatal for the
    /// run: a partial manifest is not usable.
    pub async fn fetch(&self) -> SyncResult<ManifestSet> {
        info!("Fetching asset index from {}", self.index_url);
        let response = self
            .client
            .get(&self.index_url)
            .send()
            .await
            .map_err(SyncError::Http)?;

        if !response.status().is_success() {
            return Err(SyncError::Fetch(format!(
                "Asset index returned {}: {}",
                response.status(),
                self.index_url
            )));
        }

        let body = response.text().await.map_err(SyncError::Http)?;
        let index: AssetIndex = serde_json::from_str(&body)
            .map_err(|e| SyncError::Manifest(format!("Failed to decode asset index: {}", e)))?;

        debug!("Asset index lists {} assets", index.assets.len());
        Ok(ManifestSet::from_assets(index.assets))
    }
}

/// Merge a line-oriented override file into the manifest. Entries overwrite
/// existing descriptors with the same name, which is how a developer pins a
/// local or unreleased build of a mod.
///
/// A missing file is an `Io` error; callers that treat absence as "no
/// overrides" check existence first.
pub fn merge_local_overrides(set: &mut ManifestSet, path: &Path) -> SyncResult<usize> {
    let content = std::fs::read_to_string(path)?;
    let mut merged = 0;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let asset = AssetDescriptor::parse_override_line(line)?;
        debug!("Local override: {} -> {}", asset.name, asset.version);
        set.insert(asset);
        merged += 1;
    }
    if merged > 0 {
        info!("Merged {} local override(s) from {}", merged, path.display());
    }
    Ok(merged)
}
