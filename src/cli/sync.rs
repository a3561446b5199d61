use crate::cli::InstanceArg;
use modsync::cache::AssetCache;
use modsync::manifest::{fetcher, ManifestFetcher};
use modsync::resolver::{resolve_latest, MavenVersionLookup};
use modsync::sync::{sync_instance, ExclusionSet, InstanceConfig};
use modsync::{SyncError, SyncResult};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

pub struct SyncOptions {
    pub latest: bool,
    pub instances: Vec<InstanceArg>,
    pub manifest_url: String,
    pub maven_url: String,
    pub cache_dir: Option<PathBuf>,
    pub jobs: usize,
}

pub async fn run(options: SyncOptions) -> SyncResult<()> {
    let cache_root = match options.cache_dir {
        Some(dir) => dir,
        None => modsync::core::path::cache_dir()?,
    };
    modsync::core::path::ensure_dir(&cache_root)?;

    // absent file means nothing excluded; unreadable-but-present is fatal
    let exclusions = ExclusionSet::load(&cache_root.join("mod-exclusions.txt"))?;
    if !exclusions.is_empty() {
        info!("{} mod(s) excluded from sync", exclusions.len());
    }

    let fetcher = ManifestFetcher::new(options.manifest_url);
    let mut manifest = fetcher.fetch().await?;
    info!("Manifest lists {} assets", manifest.len());

    let mut failures = 0usize;

    if options.latest {
        let local_assets = cache_root.join("local-assets.txt");
        if local_assets.exists() {
            fetcher::merge_local_overrides(&mut manifest, &local_assets)?;
        }

        let lookup = Arc::new(MavenVersionLookup::new(options.maven_url));
        let report = resolve_latest(&mut manifest, lookup, options.jobs).await;
        info!(
            "Resolved {} asset(s) to latest, {} unpublished",
            report.resolved, report.unchanged
        );
        for failure in &report.failures {
            error!("Could not resolve {}: {}", failure.name, failure.error);
        }
        failures += report.failures.len();
    }

    let cache = AssetCache::new(cache_root)?.with_max_concurrent(options.jobs);
    let (cached, cache_failures) = cache.ensure_cached_with_progress(&manifest).await;
    failures += cache_failures.len();

    for instance in &options.instances {
        info!("Updating {} with side {}", instance.dir.display(), instance.side);
        let config = InstanceConfig {
            mods_dir: instance.dir.join("mods"),
            side: instance.side,
            placement: instance.placement,
        };
        match sync_instance(&manifest, &cached, &exclusions, &config) {
            Ok(outcome) => {
                for (file, err) in &outcome.failed {
                    error!("{}: {}", file, err);
                }
                failures += outcome.failed.len();
            }
            Err(e) => {
                // this installation is lost for the run, the rest proceed
                error!("Skipping {}: {}", instance.dir.display(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(SyncError::Config(format!(
            "Completed with {} failure(s), see log above",
            failures
        )));
    }
    Ok(())
}
