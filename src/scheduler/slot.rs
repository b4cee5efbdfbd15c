/// Per-request load state
///
/// Each visible grid cell owns a `LoadHandle`. The handle tracks one request
/// through `Idle → Requested → (Hit | Decoding) → (Ready | Failed | Cancelled)`.
/// Terminal states never change again, which is how a late result for a
/// cancelled cell gets dropped instead of published.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::watch;

use crate::data::{CacheKey, DecodedImage};
use crate::error::LoadError;

/// Where a request is in its lifecycle
#[derive(Debug, Clone)]
pub enum SlotState {
    /// Nothing requested (or media access not granted)
    Idle,
    /// Request accepted, cache not consulted yet
    Requested,
    /// Found in the cache, about to become `Ready`
    Hit,
    /// A decode task owns this request
    Decoding,
    /// Image available while the cache still holds it
    Ready(Weak<DecodedImage>),
    Failed(LoadError),
    Cancelled,
}

impl SlotState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SlotState::Ready(_) | SlotState::Failed(_) | SlotState::Cancelled
        )
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SlotState::Ready(_))
    }

    fn name(&self) -> &'static str {
        match self {
            SlotState::Idle => "idle",
            SlotState::Requested => "requested",
            SlotState::Hit => "hit",
            SlotState::Decoding => "decoding",
            SlotState::Ready(_) => "ready",
            SlotState::Failed(_) => "failed",
            SlotState::Cancelled => "cancelled",
        }
    }
}

/// State shared between a handle and the task serving it
#[derive(Debug)]
pub(crate) struct Slot {
    id: u64,
    key: CacheKey,
    state: watch::Sender<SlotState>,
    cancelled: AtomicBool,
}

impl Slot {
    pub(crate) fn new(id: u64, key: CacheKey) -> Arc<Self> {
        let (state, _) = watch::channel(SlotState::Idle);
        Arc::new(Self {
            id,
            key,
            state,
            cancelled: AtomicBool::new(false),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn key(&self) -> &CacheKey {
        &self.key
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Move to `next` unless the slot already finished.
    ///
    /// Returns `false` when the update was dropped.
    pub(crate) fn publish(&self, next: SlotState) -> bool {
        self.state.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            tracing::trace!(slot = self.id, from = current.name(), to = next.name(), "slot transition");
            *current = next;
            true
        })
    }

    /// Mark cancelled. Returns `false` if the slot had already finished.
    pub(crate) fn cancel(&self) -> bool {
        self.cancelled.store(true, Ordering::SeqCst);
        self.publish(SlotState::Cancelled)
    }
}

/// A grid cell's view of one thumbnail request
#[derive(Debug, Clone)]
pub struct LoadHandle {
    slot: Arc<Slot>,
}

impl LoadHandle {
    pub(crate) fn new(slot: Arc<Slot>) -> Self {
        Self { slot }
    }

    pub fn id(&self) -> u64 {
        self.slot.id()
    }

    pub fn key(&self) -> &CacheKey {
        self.slot.key()
    }

    pub fn state(&self) -> SlotState {
        self.slot.state.borrow().clone()
    }

    /// The image for this render pass, if ready and still cached.
    ///
    /// Do not keep the returned `Arc` across frames; ask again next time.
    pub fn image(&self) -> Option<Arc<DecodedImage>> {
        match &*self.slot.state.borrow() {
            SlotState::Ready(image) => image.upgrade(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.is_cancelled()
    }

    /// Give up on this request (the cell scrolled away).
    ///
    /// A task that has not started yet is skipped. A running task still
    /// finishes and caches its result, but this handle is not updated.
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }

    /// Resolve once the request is finished.
    ///
    /// An `Idle` handle never progresses, so it resolves immediately.
    pub async fn wait(&self) -> SlotState {
        let mut updates = self.slot.state.subscribe();
        let settled = updates
            .wait_for(|state| state.is_terminal() || matches!(state, SlotState::Idle))
            .await
            .map(|state| state.clone());
        match settled {
            Ok(state) => state,
            // The sender lives in `self.slot`, so this is unreachable in practice
            Err(_) => self.state(),
        }
    }
}
