//! Recycling of native shader-visible descriptor heaps.
//!
//! Creating a descriptor heap is a driver call, and shader-visible heaps are a scarce resource. The [`HeapPool`] keeps
//! heaps that are no longer used in a free list so that later sessions can pick them up again. Heaps are only ever
//! returned to the free list or destroyed through the [`CompletionQueue`], so a heap is never reused or released
//! while the GPU may still read descriptors from it.
//!
//! # Example
//! ```
//! # use explicit_descriptor_cache::*;
//! # use anyhow::Result;
//! fn recycle<D: DescriptorDevice>(pool: &HeapPool<D>) -> Result<()> {
//!     // Rounded up to 4096 descriptors.
//!     let entry = pool.acquire(HeapType::View, 3000)?;
//!     assert!(entry.capacity() >= 3000);
//!     // The entry becomes available again once the current completion token retires.
//!     pool.deferred_release(entry);
//!     Ok(())
//! }
//! ```

use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;

use crate::backend::{DescriptorDevice, HeapType};
use crate::core::settings::CacheSettings;
use crate::heap::stats::{HeapStats, HeapStatsSnapshot};
use crate::sync::clock::Clock;
use crate::sync::deferred::CompletionQueue;

/// A native heap together with its bookkeeping. Owned by the pool while free, and by exactly one
/// [`LinearDescriptorHeap`](crate::LinearDescriptorHeap) while in use.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct HeapEntry<D: DescriptorDevice> {
    ty: HeapType,
    capacity: u32,
    #[derivative(Debug = "ignore")]
    heap: D::Heap,
    last_used_frame: u64,
    last_used_time: Duration,
}

impl<D: DescriptorDevice> HeapEntry<D> {
    /// Type of descriptors this heap holds.
    pub fn ty(&self) -> HeapType {
        self.ty
    }

    /// Number of descriptors this heap holds. May be larger than what was requested.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The native heap.
    pub fn heap(&self) -> &D::Heap {
        &self.heap
    }

    /// Completion token that was pending when this entry was last returned to the pool.
    pub fn last_used_frame(&self) -> u64 {
        self.last_used_frame
    }

    /// Wall time at which this entry was last returned to the pool.
    pub fn last_used_time(&self) -> Duration {
        self.last_used_time
    }

    fn is_stale(&self, current_frame: u64, now: Duration, max_age_frames: u64, max_age: Duration) -> bool {
        self.last_used_frame.saturating_add(max_age_frames) <= current_frame
            || self.last_used_time.saturating_add(max_age) <= now
    }
}

struct PoolInner<D: DescriptorDevice> {
    free: Vec<HeapEntry<D>>,
    allocated: usize,
}

struct PoolShared<D: DescriptorDevice> {
    device: D,
    completion: Arc<dyn CompletionQueue>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    stats: HeapStats,
    inner: Mutex<PoolInner<D>>,
}

/// Device-wide free list of native descriptor heaps. This is cheap to clone, all clones refer to the same pool.
pub struct HeapPool<D: DescriptorDevice> {
    shared: Arc<PoolShared<D>>,
}

impl<D: DescriptorDevice> Clone for HeapPool<D> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<D: DescriptorDevice> Debug for HeapPool<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("HeapPool")
            .field("free", &inner.free)
            .field("allocated", &inner.allocated)
            .field("settings", &self.shared.settings)
            .finish()
    }
}

impl<D: DescriptorDevice> HeapPool<D> {
    /// Create a new, empty heap pool. This should be tied to the lifetime of the device.
    ///
    /// * `completion` is used to defer heap release and destruction until the GPU is done with a heap.
    /// * `clock` is used to age heaps in the free list.
    pub fn new(device: D, completion: Arc<dyn CompletionQueue>, clock: Arc<dyn Clock>, settings: CacheSettings) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                device,
                completion,
                clock,
                settings,
                stats: HeapStats::default(),
                inner: Mutex::new(PoolInner {
                    free: vec![],
                    allocated: 0,
                }),
            }),
        }
    }

    /// The device heaps are created on.
    pub fn device(&self) -> &D {
        &self.shared.device
    }

    /// Settings this pool and everything created from it use.
    pub fn settings(&self) -> &CacheSettings {
        &self.shared.settings
    }

    pub(crate) fn counters(&self) -> &HeapStats {
        &self.shared.stats
    }

    /// Snapshot of the telemetry counters.
    pub fn stats(&self) -> HeapStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Number of heaps currently waiting in the free list.
    pub fn free_count(&self) -> usize {
        self.shared.inner.lock().free.len()
    }

    /// Number of heaps currently handed out and not yet released.
    pub fn allocated_count(&self) -> usize {
        self.shared.inner.lock().allocated
    }

    /// Get a heap that holds at least `count` descriptors of type `ty`.
    ///
    /// The request is rounded up to the next power of two and clamped to the maximum heap size for this type, so the
    /// returned entry can be larger than requested. A compatible free heap is reused if there is one. Otherwise stale
    /// free heaps are purged first, and a new heap is created.
    /// # Errors
    /// * Fails if the device fails to create a heap. There is no fallback heap size.
    pub fn acquire(&self, ty: HeapType, count: u32) -> Result<HeapEntry<D>> {
        let max_count = self.shared.device.max_heap_descriptors(ty);
        let count = count.checked_next_power_of_two().unwrap_or(max_count).min(max_count);

        let mut inner = self.shared.inner.lock();
        inner.allocated += 1;

        if let Some(index) = inner
            .free
            .iter()
            .position(|entry| entry.ty == ty && entry.capacity >= count)
        {
            return Ok(inner.free.swap_remove(index));
        }

        // Release heaps that were not used for a while before allocating new ones.
        let settings = &self.shared.settings;
        self.purge_stale_locked(&mut inner, settings.max_age_frames, settings.max_age);

        info!("Creating {} with {} entries", ty.heap_name(), count);
        let heap = match self.shared.device.create_heap(ty, count, ty.heap_name()) {
            Ok(heap) => heap,
            Err(err) => {
                inner.allocated -= 1;
                return Err(err.context(format!("Failed to create {} with {} entries", ty.heap_name(), count)));
            }
        };
        #[cfg(feature = "log-objects")]
        trace!("Created new {} ({} descriptors)", ty.heap_name(), count);
        self.shared.stats.heap_created(ty, count);

        Ok(HeapEntry {
            ty,
            capacity: count,
            heap,
            last_used_frame: 0,
            last_used_time: Duration::ZERO,
        })
    }

    /// Return a heap to the free list right away.
    ///
    /// Only call this once the GPU can no longer reference the heap. Prefer [`HeapPool::deferred_release`].
    pub fn release(&self, mut entry: HeapEntry<D>) {
        let mut inner = self.shared.inner.lock();
        assert_ne!(inner.allocated, 0, "Released a descriptor heap that was not allocated from this pool");

        entry.last_used_frame = self.shared.completion.current_token();
        entry.last_used_time = self.shared.clock.now();
        inner.free.push(entry);
        inner.allocated -= 1;
    }

    /// Return a heap to the free list once all GPU work recorded so far has completed.
    pub fn deferred_release(&self, entry: HeapEntry<D>) {
        let pool = self.clone();
        let token = self.shared.completion.current_token();
        self.shared.completion.enqueue(token, Box::new(move || pool.release(entry)));
    }

    /// Destroy free heaps that were last used at least `max_age_frames` frames or `max_age` ago.
    /// Destruction itself is deferred until the GPU is done with the current frame.
    pub fn purge_stale(&self, max_age_frames: u64, max_age: Duration) {
        let mut inner = self.shared.inner.lock();
        self.purge_stale_locked(&mut inner, max_age_frames, max_age);
    }

    fn purge_stale_locked(&self, inner: &mut PoolInner<D>, max_age_frames: u64, max_age: Duration) {
        let current_frame = self.shared.completion.current_token();
        let now = self.shared.clock.now();

        let mut index = 0;
        while index < inner.free.len() {
            if inner.free[index].is_stale(current_frame, now, max_age_frames, max_age) {
                let entry = inner.free.swap_remove(index);
                debug!("Purging stale {} with {} entries", entry.ty.heap_name(), entry.capacity);
                self.deferred_destroy(entry);
            } else {
                index += 1;
            }
        }
    }

    /// Destroy every heap in the free list once the GPU is done with the current frame.
    pub fn flush_free_list(&self) {
        let entries = std::mem::take(&mut self.shared.inner.lock().free);
        debug!("Flushing {} free descriptor heaps", entries.len());
        for entry in entries {
            self.deferred_destroy(entry);
        }
    }

    fn deferred_destroy(&self, entry: HeapEntry<D>) {
        self.shared.stats.heap_destroyed(entry.ty, entry.capacity);
        let device = self.shared.device.clone();
        let token = self.shared.completion.current_token();
        self.shared.completion.enqueue(
            token,
            Box::new(move || {
                #[cfg(feature = "log-objects")]
                trace!("Destroying {} ({} descriptors)", entry.ty.heap_name(), entry.capacity);
                device.destroy_heap(entry.heap);
            }),
        );
    }

    /// Destroy every free heap immediately. The device must be idle.
    /// # Panics
    /// Panics if any heap acquired from this pool has not been released yet.
    pub fn shutdown(&self) {
        let mut inner = self.shared.inner.lock();
        assert_eq!(
            inner.allocated, 0,
            "Descriptor heap pool shut down while {} heaps are still in use",
            inner.allocated
        );
        for entry in inner.free.drain(..) {
            self.shared.stats.heap_destroyed(entry.ty, entry.capacity);
            self.shared.device.destroy_heap(entry.heap);
        }
    }
}

impl<D: DescriptorDevice> Drop for PoolShared<D> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.allocated != 0 {
            error!("Descriptor heap pool dropped while {} heaps are still in use", inner.allocated);
        }
        for entry in inner.free.drain(..) {
            self.stats.heap_destroyed(entry.ty, entry.capacity);
            self.device.destroy_heap(entry.heap);
        }
    }
}
