/// Shared data structures for the pipeline
///
/// These types flow between the gallery, the decoder bridge, the cache and
/// the grid. Identifiers are cheap to clone (`Arc<str>`), pixel buffers are
/// owned by exactly one `DecodedImage`.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::DecodeError;

/// Fixed pixel format: RGBA, one byte per channel
pub const BYTES_PER_PIXEL: usize = 4;

/// Identifies one source image (for the directory gallery, its path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Arc<str>);

impl SourceId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self::new(&*path.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier interpreted as a filesystem path
    pub fn as_path(&self) -> &Path {
        Path::new(self.as_str())
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Key of one decoded-and-sized image in the cache
///
/// The same source is cached separately for every target size, so the key
/// carries both. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Wrap an already-formed key
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    /// Canonical key for `source` decoded for a `target`-pixel cell
    pub fn for_source(source: &SourceId, target: u32) -> Self {
        Self::new(format!("{}@{}", source, target))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

/// One image listed by a gallery index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryEntry {
    pub id: SourceId,
    /// Original `(width, height)` when the index already knows it
    pub dimensions: Option<(u32, u32)>,
    pub modified: Option<SystemTime>,
}

impl GalleryEntry {
    pub fn new(id: SourceId) -> Self {
        Self {
            id,
            dimensions: None,
            modified: None,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some((width, height));
        self
    }
}

/// A decoded, downsampled image ready for display
///
/// The pixel buffer always holds exactly `width * height * 4` bytes:
/// RGBA, row-major, no row padding.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl DecodedImage {
    /// Build an image from an RGBA buffer.
    ///
    /// Applies the same checks as a decoder response: both dimensions must
    /// be positive and `pixels` must cover every pixel. Bytes past the last
    /// pixel are dropped.
    pub fn from_rgba(width: u32, height: u32, mut pixels: Vec<u8>) -> Result<Self, DecodeError> {
        let expected = pixel_buffer_len(width, height)?;
        if pixels.len() < expected {
            return Err(DecodeError::PayloadTooShort {
                expected,
                actual: pixels.len(),
            });
        }
        pixels.truncate(expected);
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// The buffer viewed as one `[r, g, b, a]` array per pixel
    pub fn rgba(&self) -> &[[u8; 4]] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Pixel at `(x, y)`, if inside the image
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = y as usize * self.width as usize + x as usize;
        self.rgba().get(index).copied()
    }

    /// Bytes this image counts against the cache budget.
    ///
    /// Always the canonical `width * height * 4`, never an allocator-reported
    /// capacity, so the cache's accounting unit cannot drift.
    pub fn cost(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// `width * height * 4`, rejecting zero dimensions and overflow
pub fn pixel_buffer_len(width: u32, height: u32) -> Result<usize, DecodeError> {
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroDimension { width, height });
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(BYTES_PER_PIXEL))
        .ok_or(DecodeError::Overflow { width, height })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_includes_target() {
        let source = SourceId::new("/photos/a.jpg");
        let small = CacheKey::for_source(&source, 128);
        let large = CacheKey::for_source(&source, 256);

        assert_eq!(small.as_str(), "/photos/a.jpg@128");
        assert_ne!(small, large);
    }

    #[test]
    fn test_from_rgba_trims_excess() {
        let image = DecodedImage::from_rgba(2, 1, vec![7; 12]).unwrap();
        assert_eq!(image.pixels().len(), 8);
        assert_eq!(image.cost(), 8);
    }

    #[test]
    fn test_from_rgba_rejects_short_buffer() {
        let err = DecodedImage::from_rgba(2, 2, vec![0; 15]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::PayloadTooShort {
                expected: 16,
                actual: 15
            }
        );
    }

    #[test]
    fn test_pixel_lookup() {
        let pixels: Vec<u8> = (0..16).collect();
        let image = DecodedImage::from_rgba(2, 2, pixels).unwrap();

        assert_eq!(image.pixel(1, 0), Some([4, 5, 6, 7]));
        assert_eq!(image.pixel(0, 1), Some([8, 9, 10, 11]));
        assert_eq!(image.pixel(2, 0), None);
        assert_eq!(image.rgba().len(), 4);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(matches!(
            pixel_buffer_len(0, 5),
            Err(DecodeError::ZeroDimension { .. })
        ));
    }
}
