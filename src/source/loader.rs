/// Raw byte loading
///
/// Loaders run on decode worker threads and may block on I/O for as long as
/// they need; the coordination side never calls them directly.

use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::data::SourceId;

/// Fetches the encoded bytes of one image
pub trait SourceLoader: Send + Sync {
    fn load(&self, source: &SourceId) -> io::Result<Vec<u8>>;
}

impl<F> SourceLoader for F
where
    F: Fn(&SourceId) -> io::Result<Vec<u8>> + Send + Sync,
{
    fn load(&self, source: &SourceId) -> io::Result<Vec<u8>> {
        self(source)
    }
}

/// Reads sources straight from the filesystem
///
/// With a root, identifiers are resolved relative to it; otherwise they are
/// used as paths as-is.
#[derive(Debug, Clone, Default)]
pub struct FsSourceLoader {
    root: Option<PathBuf>,
}

impl FsSourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Path a source identifier resolves to
    pub fn resolve(&self, source: &SourceId) -> PathBuf {
        match &self.root {
            Some(root) => root.join(source.as_path()),
            None => source.as_path().to_path_buf(),
        }
    }
}

impl SourceLoader for FsSourceLoader {
    fn load(&self, source: &SourceId) -> io::Result<Vec<u8>> {
        let path = self.resolve(source);
        let bytes = std::fs::read(&path).map_err(|err| with_path(err, &path))?;
        trace!(path = %path.display(), bytes = bytes.len(), "source loaded");
        Ok(bytes)
    }
}

/// Keep the error kind, add the path to the message
fn with_path(err: io::Error, path: &Path) -> io::Error {
    io::Error::new(err.kind(), format!("{}: {}", path.display(), err))
}
