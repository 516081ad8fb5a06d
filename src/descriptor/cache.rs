use std::collections::HashMap;
use std::ops::Range;

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use crate::backend::{CpuDescriptor, DescriptorDevice, HeapType};
use crate::descriptor::fingerprint::fingerprint;
use crate::heap::linear::LinearDescriptorHeap;

/// Per-worker state. Each worker only ever locks its own shard, so the lock is uncontended.
#[derive(Debug, Default)]
struct WorkerShard {
    tables: HashMap<u64, u32>,
    reserved: Range<u32>,
}

impl WorkerShard {
    fn allocate_reserved(&mut self, count: u32) -> Option<u32> {
        if self.reserved.end - self.reserved.start < count {
            return None;
        }
        let base = self.reserved.start;
        self.reserved.start += count;
        Some(base)
    }
}

/// This structure writes descriptor tables into one [`LinearDescriptorHeap`] and avoids writing the same table twice.
///
/// Every worker has its own map from table fingerprint to heap offset. Workers do not see each other's tables, so
/// the same table may end up in the heap once per worker. For the sampler heap, which is capped at 2048 descriptors,
/// a miss in the worker's map is followed by a search over everything other workers have written so far.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct DescriptorTableCache<D: DescriptorDevice> {
    heap: LinearDescriptorHeap<D>,
    workers: Vec<CachePadded<Mutex<WorkerShard>>>,
}

impl<D: DescriptorDevice> DescriptorTableCache<D> {
    /// Create a table cache for `worker_count` workers writing into `heap`.
    ///
    /// For view heaps, every worker reserves `reservation` descriptors up front if the heap has room for them.
    /// Sampler heaps never use reservations, their space is too precious.
    pub fn new(heap: LinearDescriptorHeap<D>, worker_count: usize, reservation: u32) -> Self {
        let workers = (0..worker_count)
            .map(|_| {
                let reserved = match heap.ty() {
                    HeapType::View if reservation > 0 => heap
                        .try_reserve(reservation)
                        .map(|base| base..base + reservation)
                        .unwrap_or(0..0),
                    _ => 0..0,
                };
                CachePadded::new(Mutex::new(WorkerShard {
                    tables: HashMap::new(),
                    reserved,
                }))
            })
            .collect();

        Self {
            heap,
            workers,
        }
    }

    /// The heap tables are written to.
    pub fn heap(&self) -> &LinearDescriptorHeap<D> {
        &self.heap
    }

    /// Number of workers this cache was created for.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Get the heap index of a table holding `descriptors`, writing the table only if no identical table was written
    /// by this worker before (or, for samplers, by any worker).
    ///
    /// `versions` holds one version per descriptor, which must change whenever the CPU handle is reused for a
    /// different descriptor. Returns `None` if the table is empty or the heap is full.
    /// # Panics
    /// Panics if `worker` is out of range.
    pub fn allocate_deduplicated(&self, versions: &[u32], descriptors: &[CpuDescriptor], worker: usize) -> Option<u32> {
        debug_assert_eq!(versions.len(), descriptors.len());
        if descriptors.is_empty() {
            return None;
        }

        let key = fingerprint(versions, descriptors);
        let mut shard = self.workers[worker].lock();

        if let Some(&base) = shard.tables.get(&key) {
            #[cfg(feature = "full-compare")]
            let valid = self.heap.compare_descriptors(base, descriptors) || {
                error!("Explicit descriptor cache hash collision detected!");
                false
            };
            #[cfg(not(feature = "full-compare"))]
            let valid = true;

            if valid {
                return Some(base);
            }
        }

        if self.heap.exhaustive_sampler_deduplication() && self.workers.len() > 1 {
            if let Some(base) = self.heap.find_written_run(descriptors) {
                shard.tables.insert(key, base);
                return Some(base);
            }
        }

        let base = self.allocate_locked(&mut shard, descriptors)?;
        shard.tables.insert(key, base);
        Some(base)
    }

    /// Write a table holding `descriptors` without looking for duplicates. Returns the heap index of the table, or
    /// `None` if the table is empty or the heap is full.
    /// # Panics
    /// Panics if `worker` is out of range.
    pub fn allocate(&self, descriptors: &[CpuDescriptor], worker: usize) -> Option<u32> {
        if descriptors.is_empty() {
            return None;
        }
        let mut shard = self.workers[worker].lock();
        self.allocate_locked(&mut shard, descriptors)
    }

    fn allocate_locked(&self, shard: &mut WorkerShard, descriptors: &[CpuDescriptor]) -> Option<u32> {
        let count = descriptors.len() as u32;
        let base = match self.heap.ty() {
            HeapType::View => shard
                .allocate_reserved(count)
                .or_else(|| self.heap.allocate(count)),
            HeapType::Sampler => self.heap.allocate(count),
        }?;

        self.heap.copy_descriptors(base, descriptors);
        if self.heap.exhaustive_sampler_deduplication() {
            self.heap.mark_written(count);
        }
        self.heap.counters().descriptors_used(self.heap.ty(), count);
        Some(base)
    }
}
