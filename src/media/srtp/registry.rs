//! Per-SSRC stream state, created lazily on first use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Map from SSRC to exclusively owned stream state.
///
/// The outer lock only guards lookup and creation. Each stream has its own
/// lock, held by the caller across estimate, transform and commit, so work on
/// one SSRC is serialized while different SSRCs proceed independently.
pub struct SsrcRegistry<S> {
    streams: Mutex<HashMap<u32, Arc<Mutex<S>>>>,
}

impl<S> Default for SsrcRegistry<S> {
    fn default() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
        }
    }
}

impl<S> SsrcRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the state for `ssrc`, building it with `create` if absent.
    pub fn get_or_create(&self, ssrc: u32, create: impl FnOnce() -> S) -> Arc<Mutex<S>> {
        let mut streams = lock(&self.streams);
        streams
            .entry(ssrc)
            .or_insert_with(|| {
                tracing::debug!("New stream state for SSRC {:#010x}", ssrc);
                Arc::new(Mutex::new(create()))
            })
            .clone()
    }

    pub fn get(&self, ssrc: u32) -> Option<Arc<Mutex<S>>> {
        lock(&self.streams).get(&ssrc).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.streams).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock a mutex, recovering the data if another thread panicked while
/// holding it. Stream state is only ever replaced wholesale by a commit, so a
/// poisoned lock still holds a consistent value.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
