/// Decode scheduling
///
/// Turns "this cell became visible" into at most one decode task per
/// request. Cache hits are answered on the caller's thread without touching
/// the pool. Misses become tasks that wait for one of a fixed number of
/// decode permits, then load, plan, decode and cache on tokio's blocking
/// threads.
///
/// The coordination side (`request`, `cancel`) never blocks: it only spawns
/// and is told about results through the returned `LoadHandle`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace, warn};

use crate::cache::{PutOutcome, ThumbnailCache};
use crate::config::SchedulerConfig;
use crate::data::{CacheKey, DecodedImage, GalleryEntry, SourceId};
use crate::decode::{planner, DecodeBridge, DecodeRequest};
use crate::error::{ConfigError, DecodeError, LoadError, SchedulerError};
use crate::source::{AccessGate, SourceLoader};

mod slot;

pub use slot::{LoadHandle, SlotState};
use slot::Slot;

/// Everything a decode task needs to do its work
struct Job {
    key: CacheKey,
    source: SourceId,
    target: u32,
    /// Original dimensions, when the gallery already knows them
    dimensions: Option<(u32, u32)>,
}

/// State shared by the scheduler and its in-flight tasks
struct Shared {
    cache: Arc<ThumbnailCache>,
    bridge: Arc<DecodeBridge>,
    loader: Arc<dyn SourceLoader>,
    permits: Arc<Semaphore>,
    gate: AccessGate,
    config: SchedulerConfig,
    submitted: AtomicU64,
    started: AtomicU64,
    skipped: AtomicU64,
    pending: watch::Sender<usize>,
}

/// Decrements the pending count however a task ends
struct PendingGuard(Arc<Shared>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.pending.send_modify(|pending| *pending -= 1);
    }
}

/// A task's pool permit and pending count, released together.
///
/// Shared between the async task and its blocking decode, so both stay
/// counted until the later of the two finishes.
struct TaskLease {
    _permit: OwnedSemaphorePermit,
    _pending: PendingGuard,
}

/// Bounded decode worker pool in front of a `ThumbnailCache`
pub struct DecodeScheduler {
    shared: Arc<Shared>,
    runtime: Handle,
    next_id: AtomicU64,
}

impl DecodeScheduler {
    /// Create a scheduler on the current tokio runtime.
    ///
    /// `gate` is the host's media access gate; pass `AccessGate::open()` when
    /// there is no permission to wait for.
    pub fn new(
        cache: Arc<ThumbnailCache>,
        bridge: Arc<DecodeBridge>,
        loader: Arc<dyn SourceLoader>,
        config: SchedulerConfig,
        gate: AccessGate,
    ) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current()?;
        Self::with_runtime(cache, bridge, loader, config, gate, runtime)
    }

    /// Create a scheduler that spawns its tasks on `runtime`
    pub fn with_runtime(
        cache: Arc<ThumbnailCache>,
        bridge: Arc<DecodeBridge>,
        loader: Arc<dyn SourceLoader>,
        config: SchedulerConfig,
        gate: AccessGate,
        runtime: Handle,
    ) -> Result<Self, SchedulerError> {
        if config.workers == 0 {
            return Err(ConfigError::Invalid("scheduler.workers must be at least 1".into()).into());
        }

        // The decoder must be initialized before the first request
        bridge.init();

        debug!(workers = config.workers, "decode scheduler started");
        let (pending, _) = watch::channel(0);
        Ok(Self {
            shared: Arc::new(Shared {
                cache,
                bridge,
                loader,
                permits: Arc::new(Semaphore::new(config.workers)),
                gate,
                config,
                submitted: AtomicU64::new(0),
                started: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
                pending,
            }),
            runtime,
            next_id: AtomicU64::new(1),
        })
    }

    /// Request `source` decoded for a `target`-pixel cell, cached under `key`.
    ///
    /// On a cache hit the returned handle is already `Ready` and no task is
    /// submitted.
    pub fn request(&self, key: CacheKey, source: SourceId, target: u32) -> LoadHandle {
        self.submit(Job {
            key,
            source,
            target,
            dimensions: None,
        })
    }

    /// Request a gallery entry, reusing any dimensions the gallery knows
    pub fn request_entry(&self, entry: &GalleryEntry, target: u32) -> LoadHandle {
        self.submit(Job {
            key: CacheKey::for_source(&entry.id, target),
            source: entry.id.clone(),
            target,
            dimensions: entry.dimensions,
        })
    }

    /// Request several entries at once, e.g. the row about to scroll in
    pub fn prefetch<'a>(
        &self,
        entries: impl IntoIterator<Item = &'a GalleryEntry>,
        target: u32,
    ) -> Vec<LoadHandle> {
        entries
            .into_iter()
            .map(|entry| self.request_entry(entry, target))
            .collect()
    }

    /// Cancel `handle`; see `LoadHandle::cancel`
    pub fn cancel(&self, handle: &LoadHandle) -> bool {
        handle.cancel()
    }

    /// Open or close media access
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.gate.set(enabled);
        debug!(enabled, "media access changed");
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.gate.is_open()
    }

    /// The gate this scheduler follows, for sharing with a gallery
    pub fn gate(&self) -> AccessGate {
        self.shared.gate.clone()
    }

    pub fn cache(&self) -> &Arc<ThumbnailCache> {
        &self.shared.cache
    }

    pub fn workers(&self) -> usize {
        self.shared.config.workers
    }

    /// Tasks handed to the pool (cache hits are not counted)
    pub fn submitted_tasks(&self) -> u64 {
        self.shared.submitted.load(Ordering::SeqCst)
    }

    /// Tasks that got a permit and did their work
    pub fn started_tasks(&self) -> u64 {
        self.shared.started.load(Ordering::SeqCst)
    }

    /// Tasks dropped because their handle was cancelled before they started
    pub fn skipped_tasks(&self) -> u64 {
        self.shared.skipped.load(Ordering::SeqCst)
    }

    /// Tasks submitted but not yet finished
    pub fn pending_tasks(&self) -> usize {
        *self.shared.pending.borrow()
    }

    /// Resolve once every submitted task has finished
    pub async fn wait_idle(&self) {
        let mut pending = self.shared.pending.subscribe();
        // The sender is owned by `self.shared`, so it cannot close here
        let _ = pending.wait_for(|count| *count == 0).await;
    }

    fn submit(&self, job: Job) -> LoadHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Slot::new(id, job.key.clone());
        let handle = LoadHandle::new(slot.clone());

        if !self.shared.gate.is_open() {
            trace!(key = %job.key, "media access closed, request left idle");
            return handle;
        }

        slot.publish(SlotState::Requested);

        if let Some(image) = self.shared.cache.get(&job.key) {
            slot.publish(SlotState::Hit);
            slot.publish(SlotState::Ready(Arc::downgrade(&image)));
            return handle;
        }

        self.shared.submitted.fetch_add(1, Ordering::SeqCst);
        self.shared.pending.send_modify(|pending| *pending += 1);
        let guard = PendingGuard(self.shared.clone());
        self.runtime.spawn(run_task(self.shared.clone(), slot, job, guard));
        handle
    }
}

/// One decode task: wait for a permit, then load, decode, cache, publish
async fn run_task(shared: Arc<Shared>, slot: Arc<Slot>, job: Job, pending: PendingGuard) {
    let Ok(permit) = shared.permits.clone().acquire_owned().await else {
        return;
    };
    let lease = Arc::new(TaskLease {
        _permit: permit,
        _pending: pending,
    });

    if slot.is_cancelled() {
        shared.skipped.fetch_add(1, Ordering::SeqCst);
        trace!(slot = slot.id(), key = %job.key, "cancelled before start, skipped");
        return;
    }

    shared.started.fetch_add(1, Ordering::SeqCst);
    slot.publish(SlotState::Decoding);
    let key = job.key.clone();

    let loaded = tokio::task::spawn_blocking({
        let shared = shared.clone();
        let source = job.source.clone();
        move || shared.load_source(&source)
    })
    .await;
    let bytes = match loaded {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(err)) => return finish(&slot, &key, Err(err)),
        Err(join_err) => return finish(&slot, &key, Err(aborted(&key, join_err))),
    };

    // The blocking half keeps its own hold on the lease: a decode abandoned
    // by the timeout still occupies its pool slot until it returns
    let work = tokio::task::spawn_blocking({
        let shared = shared.clone();
        let lease = lease.clone();
        move || {
            let _lease = lease;
            shared.decode_and_cache(&job, bytes)
        }
    });

    let outcome = match shared.config.decode_timeout() {
        Some(limit) => match tokio::time::timeout(limit, work).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(key = %key, "decode timed out, failing slot");
                Ok(Err(timed_out(limit)))
            }
        },
        None => work.await,
    };

    let result = match outcome {
        Ok(result) => result,
        Err(join_err) => Err(aborted(&key, join_err)),
    };
    finish(&slot, &key, result);
    drop(lease);
}

fn finish(slot: &Slot, key: &CacheKey, result: Result<Arc<DecodedImage>, LoadError>) {
    let next = match result {
        Ok(image) => SlotState::Ready(Arc::downgrade(&image)),
        Err(err) => {
            debug!(key = %key, "load failed: {}", err);
            SlotState::Failed(err)
        }
    };
    if !slot.publish(next) {
        trace!(slot = slot.id(), key = %key, "result for cancelled slot dropped");
    }
}

fn aborted(key: &CacheKey, join_err: tokio::task::JoinError) -> LoadError {
    warn!(key = %key, "blocking task aborted: {}", join_err);
    DecodeError::Aborted(join_err.to_string()).into()
}

fn timed_out(limit: Duration) -> LoadError {
    let millis = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
    DecodeError::TimedOut { millis }.into()
}

impl Shared {
    fn load_source(&self, source: &SourceId) -> Result<Vec<u8>, LoadError> {
        if !self.gate.is_open() {
            return Err(LoadError::access_denied());
        }
        Ok(self.loader.load(source)?)
    }

    /// Blocking decode half of a task. The result is cached even if the
    /// requesting handle was cancelled meanwhile, or the task has already
    /// timed out.
    fn decode_and_cache(&self, job: &Job, bytes: Vec<u8>) -> Result<Arc<DecodedImage>, LoadError> {
        let dimensions = job.dimensions.or_else(|| self.bridge.probe(&bytes));
        let sample_size = match dimensions {
            Some((width, height)) => planner::plan(width, height, job.target),
            None => 1,
        };

        let mut request = DecodeRequest::new(bytes, sample_size);
        if self.config.pass_target_dimensions && job.target > 0 {
            request = request.with_target(job.target, job.target);
        }

        let image = Arc::new(self.bridge.decode(request)?);
        let outcome = self.cache.put(job.key.clone(), Arc::clone(&image));
        trace!(
            key = %job.key,
            sample_size,
            width = image.width(),
            height = image.height(),
            ?outcome,
            "decoded"
        );

        if let PutOutcome::Rejected { cost } = outcome {
            return Err(LoadError::TooLargeToCache {
                cost,
                capacity: self.cache.capacity_bytes(),
            });
        }
        Ok(image)
    }
}
