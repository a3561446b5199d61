use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote fetch failed: bad status, timeout, or undecodable payload.
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Downloaded or cached bytes do not match the descriptor's checksum.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Copy or symlink into an installation directory failed.
    #[error("Placement error: {0}")]
    Placement(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
