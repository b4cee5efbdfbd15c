/// The binary contract with the external pixel decoder
///
/// The decoder answers every request with either nothing (decode failed) or
/// one buffer laid out as:
///
/// ```text
/// offset 0   u32 little-endian   width
/// offset 4   u32 little-endian   height
/// offset 8   width * height * 4  RGBA pixels, row-major, no row padding
/// ```
///
/// The decoder is a foreign component, so its output is untrusted input:
/// every response is validated here before a `DecodedImage` is built.

use std::sync::{Arc, Once};

use tracing::{debug, trace};

use crate::data::{pixel_buffer_len, DecodedImage};
use crate::error::DecodeError;

/// Width + height prefix of every response
pub const HEADER_LEN: usize = 8;

/// Explicit output size for decoders that scale internally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

/// One decode call: the encoded bytes and how far to shrink them
#[derive(Debug, Clone)]
pub struct DecodeRequest {
    /// Encoded source image; freed once the call returns
    pub source: Vec<u8>,
    /// Power of two, at least 1
    pub sample_size: u32,
    /// Only honored by decoders that scale straight to a target size
    pub target: Option<TargetSize>,
}

impl DecodeRequest {
    pub fn new(source: Vec<u8>, sample_size: u32) -> Self {
        Self {
            source,
            sample_size: sample_size.max(1),
            target: None,
        }
    }

    pub fn with_target(mut self, width: u32, height: u32) -> Self {
        self.target = Some(TargetSize { width, height });
        self
    }
}

/// The external decoder behind the bridge
///
/// Implementations must be callable from any decode worker at the same
/// time.
pub trait NativeDecoder: Send + Sync {
    /// One-time setup, run before the first request in the process
    fn init(&self) {}

    /// Source dimensions, if they can be read without a full decode
    fn probe(&self, _source: &[u8]) -> Option<(u32, u32)> {
        None
    }

    /// Decode `request` into the wire format, or `None` on failure
    fn decode(&self, request: &DecodeRequest) -> Option<Vec<u8>>;
}

/// Validating front of a `NativeDecoder`
pub struct DecodeBridge {
    decoder: Arc<dyn NativeDecoder>,
    init: Once,
}

impl DecodeBridge {
    pub fn new(decoder: impl NativeDecoder + 'static) -> Self {
        Self::from_arc(Arc::new(decoder))
    }

    pub fn from_arc(decoder: Arc<dyn NativeDecoder>) -> Self {
        Self {
            decoder,
            init: Once::new(),
        }
    }

    /// Run the decoder's init hook.
    ///
    /// Idempotent; concurrent callers block until the first one finishes.
    pub fn init(&self) {
        self.init.call_once(|| {
            debug!("initializing native decoder");
            self.decoder.init();
        });
    }

    pub fn probe(&self, source: &[u8]) -> Option<(u32, u32)> {
        self.init();
        self.decoder.probe(source)
    }

    /// Decode and validate. The request (and its source bytes) is dropped
    /// before the response is parsed.
    pub fn decode(&self, request: DecodeRequest) -> Result<DecodedImage, DecodeError> {
        self.init();
        trace!(
            bytes = request.source.len(),
            sample_size = request.sample_size,
            "native decode"
        );
        let response = self.decoder.decode(&request);
        drop(request);
        parse_response(response.unwrap_or_default())
    }
}

/// Validate a decoder response and take ownership of its pixels.
///
/// Bytes past `width * height * 4` are ignored.
pub fn parse_response(mut response: Vec<u8>) -> Result<DecodedImage, DecodeError> {
    if response.is_empty() {
        return Err(DecodeError::Empty);
    }
    if response.len() < HEADER_LEN {
        return Err(DecodeError::Truncated {
            len: response.len(),
        });
    }

    let width = read_u32_le(&response[0..4]);
    let height = read_u32_le(&response[4..8]);
    let expected = pixel_buffer_len(width, height)?;
    let actual = response.len() - HEADER_LEN;
    if actual < expected {
        return Err(DecodeError::PayloadTooShort { expected, actual });
    }

    // Reuse the response allocation for the pixel buffer
    response.drain(..HEADER_LEN);
    DecodedImage::from_rgba(width, height, response)
}

/// Build a response in the wire format
pub fn encode_response(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
    let mut response = Vec::with_capacity(HEADER_LEN + pixels.len());
    response.extend_from_slice(&width.to_le_bytes());
    response.extend_from_slice(&height.to_le_bytes());
    response.extend_from_slice(pixels);
    response
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Decoder that answers every request with a fixed buffer
    struct Canned {
        response: Option<Vec<u8>>,
        inits: AtomicUsize,
    }

    impl NativeDecoder for Canned {
        fn init(&self) {
            self.inits.fetch_add(1, Ordering::SeqCst);
        }

        fn decode(&self, _request: &DecodeRequest) -> Option<Vec<u8>> {
            self.response.clone()
        }
    }

    fn canned(response: Option<Vec<u8>>) -> Arc<Canned> {
        Arc::new(Canned {
            response,
            inits: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_header_is_little_endian() {
        let response = encode_response(0x0102_0304, 2, &[]);
        assert_eq!(&response[..8], &[0x04, 0x03, 0x02, 0x01, 2, 0, 0, 0]);
    }

    #[test]
    fn test_valid_response_accepted() {
        let pixels: Vec<u8> = (0..32).collect();
        let image = parse_response(encode_response(4, 2, &pixels)).unwrap();

        assert_eq!((image.width(), image.height()), (4, 2));
        assert_eq!(image.pixels(), &pixels[..]);
        assert_eq!(image.pixel(3, 1), Some([28, 29, 30, 31]));
    }

    #[test]
    fn test_payload_short_by_one_byte_rejected() {
        let response = encode_response(4, 2, &[0u8; 31]);
        assert_eq!(
            parse_response(response),
            Err(DecodeError::PayloadTooShort {
                expected: 32,
                actual: 31
            })
        );
    }

    #[test]
    fn test_extra_payload_ignored() {
        let image = parse_response(encode_response(1, 1, &[1, 2, 3, 4, 5, 6])).unwrap();
        assert_eq!(image.pixels(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_malformed_headers_rejected() {
        assert_eq!(parse_response(Vec::new()), Err(DecodeError::Empty));
        assert_eq!(
            parse_response(vec![1, 0, 0, 0, 1, 0, 0]),
            Err(DecodeError::Truncated { len: 7 })
        );
        assert_eq!(
            parse_response(encode_response(0, 2, &[])),
            Err(DecodeError::ZeroDimension { width: 0, height: 2 })
        );
        assert!(matches!(
            parse_response(encode_response(u32::MAX, u32::MAX, &[])),
            Err(DecodeError::PayloadTooShort { .. }) | Err(DecodeError::Overflow { .. })
        ));
    }

    #[test]
    fn test_bridge_rejects_missing_result() {
        let bridge = DecodeBridge::from_arc(canned(None));
        let err = bridge.decode(DecodeRequest::new(vec![1, 2, 3], 1)).unwrap_err();
        assert_eq!(err, DecodeError::Empty);
    }

    #[test]
    fn test_init_runs_once() {
        let decoder = canned(Some(encode_response(1, 1, &[0; 4])));
        let bridge = Arc::new(DecodeBridge::from_arc(decoder.clone()));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let bridge = &bridge;
                scope.spawn(move || {
                    bridge.init();
                    bridge.decode(DecodeRequest::new(Vec::new(), 1)).unwrap();
                });
            }
        });

        assert_eq!(decoder.inits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sample_size_floor() {
        assert_eq!(DecodeRequest::new(Vec::new(), 0).sample_size, 1);
        let request = DecodeRequest::new(Vec::new(), 4).with_target(64, 48);
        assert_eq!(request.target, Some(TargetSize { width: 64, height: 48 }));
    }
}
