//! Scripted collaborators for scheduler tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use thumbgrid::decode::bridge::encode_response;
use thumbgrid::decode::{DecodeRequest, NativeDecoder};
use thumbgrid::{DecodeBridge, SourceId, SourceLoader};

/// Route `tracing` output to the test harness when `RUST_LOG` is set
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Decoder returning a small solid image and recording what it was asked
#[derive(Default)]
pub struct FakeDecoder {
    pub requests: Mutex<Vec<(u32, Option<(u32, u32)>)>>,
    pub probe: Option<(u32, u32)>,
    pub delay: Option<Duration>,
    /// Drop the last payload byte, making every response invalid
    pub truncate: bool,
    /// Side length of the produced square image
    pub side: u32,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self {
            side: 2,
            ..Self::default()
        }
    }

    pub fn bridge(self) -> Arc<DecodeBridge> {
        Arc::new(DecodeBridge::new(self))
    }

    pub fn sample_sizes(&self) -> Vec<u32> {
        self.requests.lock().iter().map(|(sample, _)| *sample).collect()
    }

    /// Most decodes seen running at the same time
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl NativeDecoder for FakeDecoder {
    fn probe(&self, _source: &[u8]) -> Option<(u32, u32)> {
        self.probe
    }

    fn decode(&self, request: &DecodeRequest) -> Option<Vec<u8>> {
        self.requests.lock().push((
            request.sample_size,
            request.target.map(|target| (target.width, target.height)),
        ));
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let len = (self.side * self.side * 4) as usize;
        let mut response = encode_response(self.side, self.side, &vec![0x7F; len]);
        if self.truncate {
            response.pop();
        }
        Some(response)
    }
}

/// Loader that counts calls, can fail chosen sources, and can hold callers
/// until released
pub struct ScriptedLoader {
    calls: Mutex<Vec<SourceId>>,
    missing: HashSet<String>,
    held: Mutex<bool>,
    released: Condvar,
    entered: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            missing: HashSet::new(),
            held: Mutex::new(false),
            released: Condvar::new(),
            entered: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Start with every `load` blocked until `release`
    pub fn held() -> Self {
        let loader = Self::new();
        *loader.held.lock() = true;
        loader
    }

    pub fn with_missing(mut self, source: &str) -> Self {
        self.missing.insert(source.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn release(&self) {
        *self.held.lock() = false;
        self.released.notify_all();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|id| id.as_str().to_string()).collect()
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Wait until `count` loads have begun
    pub async fn wait_entered(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.entered() < count {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("loader was never entered");
    }
}

impl SourceLoader for ScriptedLoader {
    fn load(&self, source: &SourceId) -> io::Result<Vec<u8>> {
        self.calls.lock().push(source.clone());
        self.entered.fetch_add(1, Ordering::SeqCst);

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        {
            let mut held = self.held.lock();
            while *held {
                self.released.wait(&mut held);
            }
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.missing.contains(source.as_str()) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        }
        Ok(source.as_str().as_bytes().to_vec())
    }
}
