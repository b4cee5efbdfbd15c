/// Gallery enumeration
///
/// A gallery produces the ordered list of images the grid shows. It is not
/// incrementally updated: calling `entries` again re-derives the whole list.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::AccessGate;
use crate::config::GalleryConfig;
use crate::data::{GalleryEntry, SourceId};
use crate::error::GalleryError;

/// Ordered source of image identifiers
pub trait GalleryIndex: Send + Sync {
    fn entries(&self) -> Result<Vec<GalleryEntry>, GalleryError>;
}

/// Every image file under a directory, newest first
#[derive(Debug, Clone)]
pub struct DirectoryGallery {
    root: PathBuf,
    config: GalleryConfig,
    gate: AccessGate,
}

impl DirectoryGallery {
    pub fn new(root: impl Into<PathBuf>, config: GalleryConfig) -> Self {
        Self {
            root: root.into(),
            config,
            gate: AccessGate::open(),
        }
    }

    /// Share the host's media access gate
    pub fn with_gate(mut self, gate: AccessGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_image(&self, path: &Path) -> bool {
        let Some(extension) = path.extension() else {
            return false;
        };
        let ext = extension.to_string_lossy().to_lowercase();
        self.config.extensions.iter().any(|known| *known == ext)
    }
}

impl GalleryIndex for DirectoryGallery {
    fn entries(&self) -> Result<Vec<GalleryEntry>, GalleryError> {
        if !self.gate.is_open() {
            return Err(GalleryError::AccessDenied);
        }
        if !self.root.is_dir() {
            return Err(GalleryError::MissingRoot(self.root.clone()));
        }

        debug!(root = %self.root.display(), "scanning gallery");

        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(self.config.follow_links) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    // One unreadable directory should not hide the rest
                    warn!("skipping gallery entry: {}", err);
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file() || !self.is_image(path) {
                continue;
            }

            let mut item = GalleryEntry::new(SourceId::from_path(path));
            item.modified = entry.metadata().ok().and_then(|meta| meta.modified().ok());
            if self.config.probe_dimensions {
                item.dimensions = image::image_dimensions(path).ok();
            }
            entries.push(item);
        }

        entries.sort_by(newest_first);
        debug!(count = entries.len(), "gallery scan complete");
        Ok(entries)
    }
}

/// Most recently modified first; unknown times last; ties by identifier
fn newest_first(a: &GalleryEntry, b: &GalleryEntry) -> Ordering {
    match (a.modified, b.modified) {
        (Some(a_time), Some(b_time)) => b_time.cmp(&a_time).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    }
}
