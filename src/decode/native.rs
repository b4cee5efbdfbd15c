/// Reference decoder built on the `image` crate
///
/// Speaks the same wire format as any external decoder plugged into the
/// bridge, so the rest of the pipeline cannot tell them apart:
/// - decode to RGBA8
/// - an explicit target size wins; otherwise shrink by the sample size
/// - both output dimensions are clamped to at least 1

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::ImageReader;
use tracing::warn;

use super::bridge::{encode_response, DecodeRequest, NativeDecoder};

/// `NativeDecoder` backed by the `image` crate
#[derive(Debug, Clone, Copy)]
pub struct ImageDecoder {
    filter: FilterType,
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }
}

impl ImageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resampling filter used when shrinking (Lanczos3 for best quality)
    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }
}

impl NativeDecoder for ImageDecoder {
    fn probe(&self, source: &[u8]) -> Option<(u32, u32)> {
        ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }

    fn decode(&self, request: &DecodeRequest) -> Option<Vec<u8>> {
        let decoded = match image::load_from_memory(&request.source) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!("image decode failed: {}", err);
                return None;
            }
        };

        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        let (out_width, out_height) = output_dimensions(width, height, request);

        let rgba = if (out_width, out_height) != (width, height) {
            imageops::resize(&rgba, out_width, out_height, self.filter)
        } else {
            rgba
        };

        Some(encode_response(out_width, out_height, rgba.as_raw()))
    }
}

/// Output size for a `width`x`height` source
fn output_dimensions(width: u32, height: u32, request: &DecodeRequest) -> (u32, u32) {
    let (out_width, out_height) = match request.target {
        Some(target) if target.width > 0 && target.height > 0 => (target.width, target.height),
        _ if request.sample_size > 1 => (width / request.sample_size, height / request.sample_size),
        _ => (width, height),
    };
    (out_width.max(1), out_height.max(1))
}
