use modsync_core::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

pub mod fetcher;

pub use fetcher::ManifestFetcher;

/// Which installation types require an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Client,
    Server,
    /// Required on both sides (default when the index omits the field)
    #[default]
    Both,
}

impl Side {
    /// Whether an asset tagged with this side belongs in an installation
    /// configured as `instance_side`.
    pub fn applies_to(&self, instance_side: Side) -> bool {
        *self == Side::Both || *self == instance_side
    }
}

impl FromStr for Side {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CLIENT" => Ok(Side::Client),
            "SERVER" => Ok(Side::Server),
            "BOTH" => Ok(Side::Both),
            other => Err(SyncError::Manifest(format!("Unknown side: {}", other))),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Client => write!(f, "CLIENT"),
            Side::Server => write!(f, "SERVER"),
            Side::Both => write!(f, "BOTH"),
        }
    }
}

/// One mod asset as resolved for this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Logical mod identifier, stable across versions
    pub name: String,
    /// Version string, opaque; ordering is the repository's business
    pub version: String,
    /// Artifact download location
    #[serde(rename = "download_url")]
    pub source_url: String,
    /// Content hash, `sha256:`/`blake3:` prefixed or bare sha256 hex
    pub checksum: String,
    #[serde(default)]
    pub side: Side,
}

impl AssetDescriptor {
    /// Filename this asset takes in the cache and in installation
    /// directories. The `name` prefix is how the synchronizer recognizes
    /// files it placed.
    pub fn file_name(&self) -> String {
        format!("{}-{}.jar", self.name, self.version)
    }

    /// Parse one local-override line: `name|version|url|checksum|side`.
    /// Side may be omitted and defaults to BOTH.
    pub fn parse_override_line(line: &str) -> SyncResult<Self> {
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() < 4 || fields.len() > 5 {
            return Err(SyncError::Manifest(format!(
                "Malformed override line (want name|version|url|checksum[|side]): {}",
                line
            )));
        }
        if fields[..4].iter().any(|f| f.is_empty()) {
            return Err(SyncError::Manifest(format!(
                "Override line has empty fields: {}",
                line
            )));
        }
        let side = match fields.get(4) {
            Some(s) if !s.is_empty() => s.parse()?,
            _ => Side::Both,
        };
        Ok(AssetDescriptor {
            name: fields[0].to_string(),
            version: fields[1].to_string(),
            source_url: fields[2].to_string(),
            checksum: fields[3].to_string(),
            side,
        })
    }
}

/// Wire shape of the remote asset index
#[derive(Debug, Deserialize)]
pub(crate) struct AssetIndex {
    pub assets: Vec<AssetDescriptor>,
}

/// The resolved mapping of mod name to asset descriptor for one run.
///
/// Built once by the fetcher, optionally rewritten by override merging and
/// latest-version resolution, then read-only input to caching and sync.
#[derive(Debug, Default, Clone)]
pub struct ManifestSet {
    assets: HashMap<String, AssetDescriptor>,
}

impl ManifestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_assets(assets: Vec<AssetDescriptor>) -> Self {
        let mut set = Self::new();
        for asset in assets {
            set.insert(asset);
        }
        set
    }

    /// Insert a descriptor, replacing any existing entry with the same name.
    pub fn insert(&mut self, asset: AssetDescriptor) {
        self.assets.insert(asset.name.clone(), asset);
    }

    pub fn get(&self, name: &str) -> Option<&AssetDescriptor> {
        self.assets.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut AssetDescriptor> {
        self.assets.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.assets.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetDescriptor> {
        self.assets.values()
    }

    /// Asset names, snapshot order unspecified.
    pub fn names(&self) -> Vec<String> {
        self.assets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str, version: &str, side: Side) -> AssetDescriptor {
        AssetDescriptor {
            name: name.to_string(),
            version: version.to_string(),
            source_url: format!("https://example.com/{}-{}.jar", name, version),
            checksum: "sha256:00".to_string(),
            side,
        }
    }

    #[test]
    fn test_side_applies_to() {
        assert!(Side::Both.applies_to(Side::Client));
        assert!(Side::Both.applies_to(Side::Server));
        assert!(Side::Client.applies_to(Side::Client));
        assert!(!Side::Client.applies_to(Side::Server));
        assert!(!Side::Server.applies_to(Side::Client));
    }

    #[test]
    fn test_side_from_str_case_insensitive() {
        assert_eq!("client".parse::<Side>().unwrap(), Side::Client);
        assert_eq!("SERVER".parse::<Side>().unwrap(), Side::Server);
        assert_eq!(" Both ".parse::<Side>().unwrap(), Side::Both);
        assert!("sideways".parse::<Side>().is_err());
    }

    #[test]
    fn test_file_name_embeds_name_and_version() {
        let a = asset("ae2", "12.5.0", Side::Both);
        assert_eq!(a.file_name(), "ae2-12.5.0.jar");
    }

    #[test]
    fn test_insert_replaces_same_name() {
        let mut set = ManifestSet::new();
        set.insert(asset("foo", "1.0", Side::Both));
        set.insert(asset("foo", "2.0-local", Side::Both));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("foo").unwrap().version, "2.0-local");
    }

    #[test]
    fn test_parse_override_line() {
        let a = AssetDescriptor::parse_override_line(
            "foo|2.0-local|https://example.com/foo.jar|sha256:ab12|client",
        )
        .unwrap();
        assert_eq!(a.name, "foo");
        assert_eq!(a.version, "2.0-local");
        assert_eq!(a.side, Side::Client);
    }

    #[test]
    fn test_parse_override_line_default_side() {
        let a = AssetDescriptor::parse_override_line(
            "foo|1.0|https://example.com/foo.jar|ab12",
        )
        .unwrap();
        assert_eq!(a.side, Side::Both);
    }

    #[test]
    fn test_parse_override_line_malformed() {
        assert!(AssetDescriptor::parse_override_line("foo|1.0").is_err());
        assert!(AssetDescriptor::parse_override_line("foo||url|sum").is_err());
        assert!(AssetDescriptor::parse_override_line("a|b|c|d|e|f").is_err());
    }

    #[test]
    fn test_index_decode_defaults_side_to_both() {
        let json = r#"{"assets":[{"name":"foo","version":"1.0","download_url":"https://example.com/foo.jar","checksum":"ab"}]}"#;
        let index: AssetIndex = serde_json::from_str(json).unwrap();
        assert_eq!(index.assets[0].side, Side::Both);
    }
}
