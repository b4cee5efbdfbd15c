//! Bounded thumbnail cache and decode pipeline for scrolling image grids.
//!
//! A grid asks for a thumbnail whenever a cell becomes visible. The
//! pipeline answers from a byte-budgeted LRU cache when it can, and
//! otherwise queues a decode on a fixed-size pool:
//!
//! ```text
//! request(key, source, target)
//!     ├─ cache hit  → handle Ready immediately, no task
//!     └─ cache miss → task: load bytes → plan sample size → decode → cache → notify
//! ```
//!
//! Pixel decoding itself sits behind the `NativeDecoder` trait and a fixed
//! binary response format (see `decode::bridge`). `ImageDecoder` is a
//! ready-made implementation on top of the `image` crate.

pub mod cache;
pub mod config;
pub mod data;
pub mod decode;
pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod source;

pub use cache::{CacheStats, PutOutcome, ThumbnailCache};
pub use config::PipelineConfig;
pub use data::{CacheKey, DecodedImage, GalleryEntry, SourceId};
pub use decode::{DecodeBridge, DecodeRequest, ImageDecoder, NativeDecoder};
pub use error::{DecodeError, LoadError};
pub use pipeline::ThumbnailPipeline;
pub use scheduler::{DecodeScheduler, LoadHandle, SlotState};
pub use source::{AccessGate, DirectoryGallery, FsSourceLoader, GalleryIndex, SourceLoader};
