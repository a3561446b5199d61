use crate::core::error::{SyncError, SyncResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the modsync cache directory
///
/// Platform-specific locations:
/// - Windows: %LOCALAPPDATA%\modsync
/// - Linux: ~/.cache/modsync
/// - macOS: ~/Library/Caches/modsync
pub fn cache_dir() -> SyncResult<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .ok_or_else(|| SyncError::Path("Could not determine cache directory".to_string()))?;
    Ok(cache_dir.join("modsync"))
}

/// Create a directory (and parents) if it does not exist
pub fn ensure_dir(path: &Path) -> SyncResult<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            SyncError::Path(format!(
                "Failed to create directory {}: {}",
                path.display(),
                e
            ))
        })?;
    }
    Ok(())
}
