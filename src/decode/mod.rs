/// Decoding module
///
/// This module handles:
/// - The binary contract with the external decoder (bridge.rs)
/// - Choosing a downsampling factor (planner.rs)
/// - A reference decoder built on the `image` crate (native.rs)

pub mod bridge;
pub mod native;
pub mod planner;

pub use bridge::{DecodeBridge, DecodeRequest, NativeDecoder, TargetSize};
pub use native::ImageDecoder;
