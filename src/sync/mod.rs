use crate::manifest::{ManifestSet, Side};
use modsync_core::{SyncError, SyncResult};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Mod names the user manages by hand. The synchronizer never adds, updates,
/// or removes a file belonging to an excluded name.
#[derive(Debug, Default, Clone)]
pub struct ExclusionSet {
    names: HashSet<String>,
}

impl ExclusionSet {
    /// Load from a line-oriented file. An absent file is an empty set; a
    /// present but unreadable file is fatal.
    pub fn load(path: &Path) -> SyncResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let names = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        Ok(Self { names })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<String> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

/// How artifacts land in an installation directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementMode {
    /// Independent file, safe across filesystems
    #[default]
    Copy,
    /// Space-saving link back into the cache
    Symlink,
}

/// One target installation
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// The installation's mods directory
    pub mods_dir: PathBuf,
    /// Client or Server (an instance is never "both")
    pub side: Side,
    pub placement: PlacementMode,
}

/// What one reconciliation pass did
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Filenames placed or replaced
    pub placed: Vec<String>,
    /// Filenames removed
    pub removed: Vec<String>,
    /// Desired assets with no verified cache entry this run; their
    /// previously placed files are left alone
    pub skipped_uncached: Vec<String>,
    /// Per-file placement or removal failures
    pub failed: Vec<(String, SyncError)>,
}

impl SyncOutcome {
    /// True when the pass changed nothing and hit no errors.
    pub fn is_clean(&self) -> bool {
        self.placed.is_empty() && self.removed.is_empty() && self.failed.is_empty()
    }
}

/// Reconcile one installation's mods directory against the manifest.
///
/// Only files whose names embed a known, non-excluded mod name are ever
/// touched; user-added files are invisible. Idempotent: a second pass with
/// unchanged inputs performs no filesystem writes.
pub fn sync_instance(
    set: &ManifestSet,
    cached: &HashMap<String, PathBuf>,
    exclusions: &ExclusionSet,
    config: &InstanceConfig,
) -> SyncResult<SyncOutcome> {
    if !config.mods_dir.is_dir() {
        return Err(SyncError::Path(format!(
            "Mods directory not found: {}",
            config.mods_dir.display()
        )));
    }

    let mut outcome = SyncOutcome::default();

    // desired filename -> cached artifact, for side-matching non-excluded assets
    let mut desired: HashMap<String, &PathBuf> = HashMap::new();
    // desired assets we cannot act on this run (no verified cache entry);
    // their names are fenced off from removal too
    let mut uncached: HashSet<&str> = HashSet::new();

    for asset in set.iter() {
        if !asset.side.applies_to(config.side) || exclusions.contains(&asset.name) {
            continue;
        }
        match cached.get(&asset.name) {
            Some(path) => {
                desired.insert(asset.file_name(), path);
            }
            None => {
                warn!("{}: artifact not cached, leaving installed file alone", asset.name);
                uncached.insert(asset.name.as_str());
                outcome.skipped_uncached.push(asset.file_name());
            }
        }
    }

    // current set: files this tool placed, recognized by the name embedded
    // in the filename
    for entry in fs::read_dir(&config.mods_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() && !entry.path().is_symlink() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some(owner) = placed_owner(&file_name, set) else {
            continue; // user-added file, not ours
        };
        if exclusions.contains(owner) || uncached.contains(owner) {
            continue;
        }
        if !desired.contains_key(&file_name) {
            // stale version, removed asset side, or filtered out
            debug!("Removing {}", file_name);
            match fs::remove_file(entry.path()) {
                Ok(()) => outcome.removed.push(file_name),
                Err(e) => outcome.failed.push((file_name, SyncError::Io(e))),
            }
        }
    }

    let mut placed_names: Vec<&String> = desired.keys().collect();
    placed_names.sort();
    for file_name in placed_names {
        let src = desired[file_name];
        let dest = config.mods_dir.join(file_name);
        if placement_current(&dest, src, config.placement) {
            continue;
        }
        debug!("Placing {}", file_name);
        match place(src, &dest, config.placement) {
            Ok(()) => outcome.placed.push(file_name.clone()),
            Err(e) => {
                warn!("Failed to place {}: {}", file_name, e);
                outcome.failed.push((file_name.clone(), e));
            }
        }
    }

    info!(
        "Synced {} ({}): {} placed, {} removed, {} failed",
        config.mods_dir.display(),
        config.side,
        outcome.placed.len(),
        outcome.removed.len(),
        outcome.failed.len()
    );
    Ok(outcome)
}

/// Which manifest asset a placed filename belongs to, if any. Tool-placed
/// files are `{name}-{version}.jar` where the version starts with a digit,
/// so a user's `foo-fighters-3.1.jar` is never claimed by a mod named `foo`.
/// Longest name wins so `foo-bar-1.0.jar` is owned by `foo-bar`, not `foo`.
fn placed_owner<'a>(file_name: &str, set: &'a ManifestSet) -> Option<&'a str> {
    let stem = file_name.strip_suffix(".jar")?;
    set.iter()
        .map(|a| a.name.as_str())
        .filter(|name| {
            stem.strip_prefix(*name)
                .and_then(|rest| rest.strip_prefix('-'))
                .is_some_and(|version| version.starts_with(|c: char| c.is_ascii_digit()))
        })
        .max_by_key(|name| name.len())
}

/// Whether `dest` already is the wanted placement of `src`.
fn placement_current(dest: &Path, src: &Path, mode: PlacementMode) -> bool {
    match mode {
        // same filename means same (name, version); a plain file is current
        PlacementMode::Copy => dest.is_file() && !dest.is_symlink(),
        PlacementMode::Symlink => match fs::read_link(dest) {
            Ok(target) => target == src,
            Err(_) => false,
        },
    }
}

/// Place an artifact into an installation: stage under a temporary name,
/// then rename over the destination so no reader ever sees a partial file.
fn place(src: &Path, dest: &Path, mode: PlacementMode) -> SyncResult<()> {
    let staging = dest.with_extension("part");
    match mode {
        PlacementMode::Copy => {
            fs::copy(src, &staging).map_err(|e| {
                SyncError::Placement(format!("Copy {} failed: {}", dest.display(), e))
            })?;
        }
        PlacementMode::Symlink => {
            let _ = fs::remove_file(&staging);
            symlink_file(src, &staging).map_err(|e| {
                SyncError::Placement(format!("Symlink {} failed: {}", dest.display(), e))
            })?;
        }
    }
    fs::rename(&staging, dest)
        .map_err(|e| SyncError::Placement(format!("Replace {} failed: {}", dest.display(), e)))
}

#[cfg(unix)]
fn symlink_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, dest)
}

#[cfg(windows)]
fn symlink_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(src, dest)
}
