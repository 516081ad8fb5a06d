//! Exposes the settings structs that configure heap pooling and descriptor deduplication.

use std::time::Duration;

use crate::core::error::Error;

/// Called when the cache hits an error it cannot recover from, such as a sampler heap overflow.
/// Continuing after this would corrupt GPU-visible memory, so the default handler panics.
pub type FatalHandler = fn(&Error);

/// Default [`FatalHandler`]. Logs the error and panics.
pub fn panic_on_fatal(err: &Error) {
    error!("{err}");
    panic!("{err}");
}

/// Settings used by a [`HeapPool`](crate::HeapPool) and every heap and session created from it.
///
/// See also: [`SettingsBuilder`]
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Use an exhaustive search over the shared sampler heap when a worker misses its own table cache.
    /// Reduces sampler heap usage at the cost of some CPU time.
    pub exhaustive_sampler_deduplication: bool,
    /// Maximum number of descriptors per view heap. Typical heap usage in large scenes is around 50k.
    /// An error is reported when this limit is reached and bindings for subsequent tables are skipped.
    pub max_view_descriptors: u32,
    /// Number of view descriptors each worker reserves up front when a session starts.
    /// Allocations from this range do not touch the shared atomic cursor. Set to zero to disable.
    pub view_reservation_per_worker: u32,
    /// Free heaps not used for this many frames are destroyed before a new heap is created.
    pub max_age_frames: u64,
    /// Free heaps not used for this long are destroyed before a new heap is created.
    pub max_age: Duration,
    /// Handler invoked for unrecoverable errors.
    pub fatal_handler: FatalHandler,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            exhaustive_sampler_deduplication: true,
            max_view_descriptors: 250_000,
            view_reservation_per_worker: 256,
            max_age_frames: 100,
            max_age: Duration::from_secs(5),
            fatal_handler: panic_on_fatal,
        }
    }
}

/// Convenience builder for [`CacheSettings`].
///
/// # Example
/// ```
/// # use explicit_descriptor_cache::*;
/// # use std::time::Duration;
/// let settings = SettingsBuilder::new()
///     .exhaustive_sampler_deduplication(false)
///     .max_view_descriptors(100_000)
///     .max_age(100, Duration::from_secs(5))
///     .build();
/// assert!(!settings.exhaustive_sampler_deduplication);
/// ```
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    inner: CacheSettings,
}

impl SettingsBuilder {
    /// Create a new settings builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the exhaustive sampler search.
    pub fn exhaustive_sampler_deduplication(mut self, enabled: bool) -> Self {
        self.inner.exhaustive_sampler_deduplication = enabled;
        self
    }

    /// Maximum number of descriptors in a session's view heap.
    pub fn max_view_descriptors(mut self, count: u32) -> Self {
        self.inner.max_view_descriptors = count;
        self
    }

    /// Size of the per-worker view descriptor reservation.
    pub fn view_reservation_per_worker(mut self, count: u32) -> Self {
        self.inner.view_reservation_per_worker = count;
        self
    }

    /// Age thresholds after which unused free heaps are destroyed.
    pub fn max_age(mut self, frames: u64, time: Duration) -> Self {
        self.inner.max_age_frames = frames;
        self.inner.max_age = time;
        self
    }

    /// Replace the handler for unrecoverable errors.
    pub fn fatal_handler(mut self, handler: FatalHandler) -> Self {
        self.inner.fatal_handler = handler;
        self
    }

    /// Build the resulting settings.
    pub fn build(self) -> CacheSettings {
        self.inner
    }
}
