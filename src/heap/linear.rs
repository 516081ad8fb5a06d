//! A linear allocator over one shader-visible descriptor heap.
//!
//! The allocator works by atomically incrementing a cursor on every allocation. Individual ranges are never freed,
//! the whole heap goes back to the [`HeapPool`] when the [`LinearDescriptorHeap`] is dropped. Because slots are never
//! reused while the heap is alive, allocation can be shared between threads without taking a lock: callers can only
//! race for which disjoint range they get.
//!
//! # Example
//! ```
//! # use explicit_descriptor_cache::*;
//! # use anyhow::Result;
//! fn write_table<D: DescriptorDevice>(pool: &HeapPool<D>, table: &[CpuDescriptor]) -> Result<Option<GpuDescriptor>> {
//!     let heap = LinearDescriptorHeap::new(pool, 1024, HeapType::View)?;
//!     let Some(base) = heap.allocate(table.len() as u32) else {
//!         // Heap is full, skip the binding for this draw.
//!         return Ok(None);
//!     };
//!     heap.copy_descriptors(base, table);
//!     Ok(Some(heap.gpu_descriptor(base)))
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use anyhow::Result;
use crossbeam_utils::CachePadded;

use crate::backend::{CpuDescriptor, DescriptorDevice, GpuDescriptor, HeapType};
use crate::core::error::Error;
use crate::heap::pool::{HeapEntry, HeapPool};
use crate::heap::stats::HeapStats;

/// Bump allocator over a native heap obtained from a [`HeapPool`].
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct LinearDescriptorHeap<D: DescriptorDevice> {
    #[derivative(Debug = "ignore")]
    pool: HeapPool<D>,
    // Always Some(_), taken in Drop.
    entry: Option<HeapEntry<D>>,
    ty: HeapType,
    cpu_base: CpuDescriptor,
    gpu_base: GpuDescriptor,
    stride: u32,
    capacity: u32,
    // Wider than the capacity so repeated failing allocations can not wrap around.
    next_free: CachePadded<AtomicU64>,
    written: CachePadded<AtomicU32>,
    #[derivative(Debug = "ignore")]
    shadow: Option<Box<[AtomicU64]>>,
    exhaustive_sampler_deduplication: bool,
    overflow_reported: AtomicBool,
}

impl<D: DescriptorDevice> LinearDescriptorHeap<D> {
    /// Create a heap of at least `capacity` descriptors. The pool may hand out a larger heap, in which case the whole
    /// heap is available for allocation.
    /// # Errors
    /// * Fails if the pool has to create a new native heap and the device fails to do so.
    pub fn new(pool: &HeapPool<D>, capacity: u32, ty: HeapType) -> Result<Self> {
        let entry = pool.acquire(ty, capacity)?;
        let capacity = entry.capacity();
        let device = pool.device();
        let (cpu_base, gpu_base) = device.heap_start(entry.heap());
        assert!(!cpu_base.is_null(), "{} returned from the heap pool is invalid", ty.heap_name());
        let stride = device.descriptor_size(ty);

        let exhaustive_sampler_deduplication = pool.settings().exhaustive_sampler_deduplication && ty == HeapType::Sampler;
        // The exhaustive search scans descriptors that other workers may not have written yet,
        // so every shadow entry starts out as the null handle.
        let shadow = if exhaustive_sampler_deduplication || cfg!(feature = "full-compare") {
            Some((0..capacity).map(|_| AtomicU64::new(0)).collect::<Box<[_]>>())
        } else {
            None
        };

        Ok(Self {
            pool: pool.clone(),
            entry: Some(entry),
            ty,
            cpu_base,
            gpu_base,
            stride,
            capacity,
            next_free: CachePadded::new(AtomicU64::new(0)),
            written: CachePadded::new(AtomicU32::new(0)),
            shadow,
            exhaustive_sampler_deduplication,
            overflow_reported: AtomicBool::new(false),
        })
    }

    /// Type of descriptors in this heap.
    pub fn ty(&self) -> HeapType {
        self.ty
    }

    /// Total number of descriptors in this heap.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Size of one descriptor in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Whether sampler tables are deduplicated across workers by searching this heap.
    pub fn exhaustive_sampler_deduplication(&self) -> bool {
        self.exhaustive_sampler_deduplication
    }

    pub(crate) fn counters(&self) -> &HeapStats {
        self.pool.counters()
    }

    /// Number of descriptors handed out so far, clamped to the capacity.
    pub fn allocated_count(&self) -> u32 {
        self.next_free.load(Ordering::Relaxed).min(self.capacity as u64) as u32
    }

    /// The native heap backing this allocator.
    pub fn native_heap(&self) -> &D::Heap {
        // Only None during drop.
        self.entry.as_ref().unwrap().heap()
    }

    /// Allocate `count` consecutive descriptors and return the index of the first one.
    ///
    /// Returns `None` if the heap is full. A sampler heap overflow can not be recovered from and also invokes the fatal
    /// handler. A view heap overflow is logged once per heap, and the caller should skip the binding it wanted to make.
    pub fn allocate(&self, count: u32) -> Option<u32> {
        let base = self.next_free.fetch_add(count as u64, Ordering::Relaxed);
        if base + count as u64 > self.capacity as u64 {
            self.report_overflow();
            return None;
        }
        if self.ty == HeapType::Sampler {
            self.pool.counters().sampler_cursor(base + count as u64);
        }
        Some(base as u32)
    }

    /// Like [`LinearDescriptorHeap::allocate`], but leaves the cursor untouched and reports nothing if the range does
    /// not fit.
    pub fn try_reserve(&self, count: u32) -> Option<u32> {
        let capacity = self.capacity as u64;
        self.next_free
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |base| {
                (base + count as u64 <= capacity).then_some(base + count as u64)
            })
            .ok()
            .map(|base| base as u32)
    }

    #[cold]
    fn report_overflow(&self) {
        match self.ty {
            HeapType::Sampler => {
                let err = Error::SamplerHeapOverflow {
                    capacity: self.capacity,
                };
                (self.pool.settings().fatal_handler)(&err);
            }
            HeapType::View => {
                // Multiple threads may overflow at the same time, only the first one reports.
                if !self.overflow_reported.swap(true, Ordering::Relaxed) {
                    let err = Error::ViewHeapOverflow {
                        capacity: self.capacity,
                        suggested: self.capacity.saturating_mul(2),
                    };
                    error!("{err}");
                }
            }
        }
    }

    /// Copy descriptors into the heap, starting at `base`. The range must have been allocated by the caller.
    pub fn copy_descriptors(&self, base: u32, descriptors: &[CpuDescriptor]) {
        debug_assert!(base as u64 + descriptors.len() as u64 <= self.capacity as u64);
        self.pool
            .device()
            .copy_descriptors(self.native_heap(), base, descriptors, self.ty);

        // Mirrored after the native copy, so a shadow match implies the native heap holds the same descriptors.
        if let Some(shadow) = &self.shadow {
            for (slot, descriptor) in shadow[base as usize..].iter().zip(descriptors) {
                slot.store(descriptor.0, Ordering::Release);
            }
        }
    }

    /// Compare the descriptors written at `base` with `descriptors`.
    /// Always returns `false` if this heap keeps no shadow copy of its descriptors.
    pub fn compare_descriptors(&self, base: u32, descriptors: &[CpuDescriptor]) -> bool {
        let Some(shadow) = &self.shadow else {
            return false;
        };
        let end = base as usize + descriptors.len();
        if end > shadow.len() {
            return false;
        }
        shadow[base as usize..end]
            .iter()
            .zip(descriptors)
            .all(|(slot, descriptor)| slot.load(Ordering::Acquire) == descriptor.0)
    }

    /// Publish `count` more descriptors as written, making them visible to [`LinearDescriptorHeap::find_written_run`].
    pub fn mark_written(&self, count: u32) {
        self.written.fetch_add(count, Ordering::Release);
    }

    /// Number of descriptors confirmed as written.
    pub fn written_count(&self) -> u32 {
        self.written.load(Ordering::Acquire)
    }

    /// Search the confirmed written part of the heap for a run of descriptors equal to `descriptors`.
    pub fn find_written_run(&self, descriptors: &[CpuDescriptor]) -> Option<u32> {
        let shadow = self.shadow.as_deref()?;
        find_descriptor_run(shadow, self.written_count() as usize, descriptors)
    }

    /// CPU handle of the descriptor at `index`.
    pub fn cpu_descriptor(&self, index: u32) -> CpuDescriptor {
        debug_assert!(index < self.capacity);
        self.cpu_base.offset(index, self.stride)
    }

    /// GPU handle of the descriptor at `index`. Use this to build descriptor table pointers.
    pub fn gpu_descriptor(&self, index: u32) -> GpuDescriptor {
        debug_assert!(index < self.capacity);
        self.gpu_base.offset(index, self.stride)
    }
}

impl<D: DescriptorDevice> Drop for LinearDescriptorHeap<D> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.pool.deferred_release(entry);
        }
    }
}

/// Find the first index at which `descriptors` appears in `shadow`, only looking at the first `search_end` entries.
///
/// Entries that were never written hold the null handle and can not match a valid descriptor.
pub fn find_descriptor_run(shadow: &[AtomicU64], search_end: usize, descriptors: &[CpuDescriptor]) -> Option<u32> {
    let count = descriptors.len();
    let search_end = search_end.min(shadow.len());
    if count == 0 || count > search_end {
        return None;
    }

    (0..=search_end - count)
        .find(|&start| {
            shadow[start..start + count]
                .iter()
                .zip(descriptors)
                .all(|(slot, descriptor)| slot.load(Ordering::Acquire) == descriptor.0)
        })
        .map(|start| start as u32)
}
