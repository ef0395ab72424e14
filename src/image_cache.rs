//! Connection-scoped image cache with single-flight production.
//!
//! One slot per placeholder token. The first caller for a token runs the producer; concurrent
//! callers for the same token wait on that result. A failed production leaves the slot empty,
//! so a later caller may try again. The cache lives exactly as long as its connection.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ImageCache {
    slots: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, token: &str) -> Arc<OnceCell<String>> {
        let mut slots = self.slots.lock();
        slots
            .entry(token.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Return the cached artifact for `token`, producing it with `producer` on a miss.
    ///
    /// The slot lock is released before awaiting, so producers for different tokens run
    /// concurrently.
    pub async fn get_or_try_create<F, Fut, E>(&self, token: &str, producer: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        let slot = self.slot(token);
        if let Some(hit) = slot.get() {
            debug!(token, "Image cache hit");
            return Ok(hit.clone());
        }
        slot.get_or_try_init(producer).await.cloned()
    }

    /// Record an artifact that already exists, e.g. an image carried over from baseline code.
    /// An existing entry is left untouched.
    pub fn seed(&self, token: impl Into<String>, artifact: impl Into<String>) {
        let mut slots = self.slots.lock();
        slots
            .entry(token.into())
            .or_insert_with(|| Arc::new(OnceCell::new_with(Some(artifact.into()))));
    }

    pub fn get(&self, token: &str) -> Option<String> {
        self.slots.lock().get(token).and_then(|slot| slot.get().cloned())
    }

    /// Number of filled slots
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
