// src/cache.rs
//! Last-known-good payload store used when a collection cycle fails.

use parking_lot::Mutex;

/// Fallback cache owned by exactly one collector.
///
/// Disabled caches never hold a value: `get` is always `None` and
/// `set`/`clear` do nothing.
#[derive(Debug)]
pub struct ResultCache<T> {
    enabled: bool,
    entry: Mutex<Option<T>>,
}

impl<T: Clone> ResultCache<T> {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entry: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(&self) -> Option<T> {
        if !self.enabled {
            return None;
        }
        self.entry.lock().clone()
    }

    pub fn set(&self, payload: T) {
        if self.enabled {
            *self.entry.lock() = Some(payload);
        }
    }

    pub fn clear(&self) {
        if self.enabled {
            self.entry.lock().take();
        }
    }

    pub fn is_populated(&self) -> bool {
        self.enabled && self.entry.lock().is_some()
    }
}
