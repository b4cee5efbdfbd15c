/// Image sources
///
/// This module holds the collaborators the pipeline reads from:
/// - Raw byte loading (loader.rs)
/// - Enumerating the images to show (gallery.rs)
/// - The media access gate both of them respect (this file)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod gallery;
pub mod loader;

pub use gallery::{DirectoryGallery, GalleryIndex};
pub use loader::{FsSourceLoader, SourceLoader};

/// Whether the host has granted access to the user's media
///
/// Clones share one flag. While closed, nothing reads from disk: the
/// scheduler leaves requests idle and galleries refuse to scan.
#[derive(Debug, Clone)]
pub struct AccessGate(Arc<AtomicBool>);

impl AccessGate {
    pub fn new(granted: bool) -> Self {
        Self(Arc::new(AtomicBool::new(granted)))
    }

    pub fn open() -> Self {
        Self::new(true)
    }

    pub fn closed() -> Self {
        Self::new(false)
    }

    pub fn set(&self, granted: bool) {
        self.0.store(granted, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::open()
    }
}
