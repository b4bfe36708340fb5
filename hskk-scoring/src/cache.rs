//! Content-addressed acoustic feature cache
//!
//! Memoizes analyzer results by the SHA-256 of the audio bytes. Concurrent requests
//! for the same audio share one in-flight fetch; failures are never cached, so the
//! next request for that audio tries again.

use crate::types::{AcousticAnalyzer, AnalysisError, AudioPayload, RawFeatures};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::debug;

type Slot = Arc<OnceCell<RawFeatures>>;

#[derive(Default)]
struct Entries {
    slots: HashMap<String, Slot>,
    /// Insertion order for eviction
    order: VecDeque<String>,
}

/// Analyzer wrapper with at most one fetch per audio hash
pub struct CachedAnalyzer {
    inner: Arc<dyn AcousticAnalyzer>,
    capacity: usize,
    entries: Mutex<Entries>,
}

impl CachedAnalyzer {
    pub fn new(inner: Arc<dyn AcousticAnalyzer>, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    fn slot(&self, key: &str) -> Slot {
        // The map is only touched in short critical sections that cannot panic
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(slot) = entries.slots.get(key) {
            return slot.clone();
        }

        while entries.order.len() >= self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.slots.remove(&oldest);
                }
                None => break,
            }
        }
        let slot: Slot = Arc::new(OnceCell::new());
        entries.slots.insert(key.to_string(), slot.clone());
        entries.order.push_back(key.to_string());
        slot
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|e| e.slots.values().filter(|s| s.initialized()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl AcousticAnalyzer for CachedAnalyzer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn analyze(&self, audio: &AudioPayload) -> Result<RawFeatures, AnalysisError> {
        let key = audio.content_hash();
        let slot = self.slot(&key);
        if let Some(features) = slot.get() {
            debug!(hash = %key, "Acoustic feature cache hit");
            return Ok(features.clone());
        }

        let features = slot
            .get_or_try_init(|| async {
                debug!(hash = %key, analyzer = self.inner.name(), "Acoustic feature cache miss");
                self.inner.analyze(audio).await
            })
            .await?;
        Ok(features.clone())
    }
}
