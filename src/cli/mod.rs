use modsync::manifest::Side;
use modsync::sync::PlacementMode;
use std::path::PathBuf;
use std::str::FromStr;

pub mod clean;
pub mod sync;

/// One `--instance DIR:SIDE[:symlink]` argument. DIR is the installation
/// root; its `mods` subdirectory is what gets reconciled.
#[derive(Debug, Clone)]
pub struct InstanceArg {
    pub dir: PathBuf,
    pub side: Side,
    pub placement: PlacementMode,
}

impl FromStr for InstanceArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // parse from the right so Windows drive letters survive
        let mut parts: Vec<&str> = s.split(':').collect();

        let placement = if parts.last().map(|p| p.eq_ignore_ascii_case("symlink")) == Some(true) {
            parts.pop();
            PlacementMode::Symlink
        } else {
            PlacementMode::Copy
        };

        let side_str = parts
            .pop()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| format!("Expected DIR:SIDE[:symlink], got '{}'", s))?;
        let side: Side = side_str
            .parse()
            .map_err(|_| format!("Invalid side '{}' (use client or server)", side_str))?;
        if side == Side::Both {
            return Err("An instance is either client or server, not both".to_string());
        }

        let dir = parts.join(":");
        if dir.is_empty() {
            return Err(format!("Expected DIR:SIDE[:symlink], got '{}'", s));
        }

        Ok(InstanceArg {
            dir: PathBuf::from(dir),
            side,
            placement,
        })
    }
}
