/// Process-wide wiring of cache, decoder and scheduler
///
/// The host builds one `ThumbnailPipeline` at startup. The cache capacity is
/// computed here, once, and the cache is handed to the scheduler rather than
/// living in a global.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::cache::ThumbnailCache;
use crate::config::PipelineConfig;
use crate::decode::{DecodeBridge, NativeDecoder};
use crate::error::SchedulerError;
use crate::scheduler::DecodeScheduler;
use crate::source::{AccessGate, DirectoryGallery, SourceLoader};

pub struct ThumbnailPipeline {
    config: PipelineConfig,
    scheduler: DecodeScheduler,
    gate: AccessGate,
}

impl ThumbnailPipeline {
    /// Build the pipeline on the current tokio runtime.
    ///
    /// Media access starts closed; call `set_access(true)` once the user has
    /// granted it.
    pub fn new(
        config: PipelineConfig,
        decoder: Arc<dyn NativeDecoder>,
        loader: Arc<dyn SourceLoader>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;

        let cache = Arc::new(ThumbnailCache::from_config(&config.cache));
        info!(
            capacity_bytes = cache.capacity_bytes(),
            workers = config.scheduler.workers,
            "thumbnail pipeline ready"
        );

        let gate = AccessGate::closed();
        let bridge = Arc::new(DecodeBridge::from_arc(decoder));
        let scheduler =
            DecodeScheduler::new(cache, bridge, loader, config.scheduler.clone(), gate.clone())?;

        Ok(Self {
            config,
            scheduler,
            gate,
        })
    }

    pub fn scheduler(&self) -> &DecodeScheduler {
        &self.scheduler
    }

    pub fn cache(&self) -> &Arc<ThumbnailCache> {
        self.scheduler.cache()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Permission result from the host
    pub fn set_access(&self, granted: bool) {
        self.gate.set(granted);
    }

    pub fn has_access(&self) -> bool {
        self.gate.is_open()
    }

    /// A directory gallery that honors this pipeline's access gate
    pub fn directory_gallery(&self, root: impl Into<PathBuf>) -> DirectoryGallery {
        DirectoryGallery::new(root, self.config.gallery.clone()).with_gate(self.gate.clone())
    }

    /// The host reported memory pressure: drop every cached thumbnail
    pub fn on_low_memory(&self) {
        info!(bytes = self.cache().size_bytes(), "low memory, clearing thumbnails");
        self.cache().clear();
    }

    /// Milder pressure: shrink the cache to `percent` of its capacity
    pub fn trim_memory(&self, percent: u8) -> usize {
        let percent = u128::from(percent.min(100));
        let capacity = self.cache().capacity_bytes() as u128;
        let target = usize::try_from(capacity * percent / 100).unwrap_or(usize::MAX);
        self.cache().trim_to(target)
    }
}
