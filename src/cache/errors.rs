//! Cache Error Types

use std::path::PathBuf;

/// Errors from the on-disk response cache
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("No cache entry at {0:?}")]
    NotFound(PathBuf),

    #[error("Cache I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    /// Wrap an I/O error, mapping `NotFound` to [`CacheError::NotFound`]
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            CacheError::NotFound(path)
        } else {
            CacheError::Io { path, source }
        }
    }

    /// Whether the entry simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}
