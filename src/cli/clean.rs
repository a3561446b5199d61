use modsync::cache::AssetCache;
use modsync::SyncResult;
use std::path::PathBuf;

pub fn run(max_age_days: u64, cache_dir: Option<PathBuf>) -> SyncResult<()> {
    let cache_root = match cache_dir {
        Some(dir) => dir,
        None => modsync::core::path::cache_dir()?,
    };
    let cache = AssetCache::new(cache_root)?;
    let result = cache.clean(max_age_days)?;
    println!(
        "Removed {} cached artifact(s), freed {} bytes",
        result.files_removed, result.bytes_freed
    );
    Ok(())
}
