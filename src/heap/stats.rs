//! Telemetry counters for descriptor heaps. These are observed, never acted upon.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::HeapType;

#[derive(Debug, Default)]
struct TypeCounters {
    heaps: AtomicU64,
    descriptors: AtomicU64,
    used_descriptors: AtomicU64,
}

/// Live counters shared by a pool and every heap created from it.
#[derive(Debug, Default)]
pub struct HeapStats {
    views: TypeCounters,
    samplers: TypeCounters,
    max_used_sampler_descriptors: AtomicU64,
}

/// Point-in-time copy of [`HeapStats`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct HeapStatsSnapshot {
    /// Native view heaps currently alive, both in use and in the free list.
    pub view_heaps: u64,
    /// Descriptor capacity of all live view heaps.
    pub view_descriptors: u64,
    /// Native sampler heaps currently alive, both in use and in the free list.
    pub sampler_heaps: u64,
    /// Descriptor capacity of all live sampler heaps.
    pub sampler_descriptors: u64,
    /// View descriptors written into tables since the pool was created.
    pub used_view_descriptors: u64,
    /// Sampler descriptors written into tables since the pool was created.
    pub used_sampler_descriptors: u64,
    /// Largest sampler heap cursor observed in any session.
    pub max_used_sampler_descriptors: u64,
}

impl HeapStats {
    fn counters(&self, ty: HeapType) -> &TypeCounters {
        match ty {
            HeapType::View => &self.views,
            HeapType::Sampler => &self.samplers,
        }
    }

    pub(crate) fn heap_created(&self, ty: HeapType, descriptors: u32) {
        let counters = self.counters(ty);
        counters.heaps.fetch_add(1, Ordering::Relaxed);
        counters.descriptors.fetch_add(descriptors as u64, Ordering::Relaxed);
    }

    pub(crate) fn heap_destroyed(&self, ty: HeapType, descriptors: u32) {
        let counters = self.counters(ty);
        counters.heaps.fetch_sub(1, Ordering::Relaxed);
        counters.descriptors.fetch_sub(descriptors as u64, Ordering::Relaxed);
    }

    pub(crate) fn descriptors_used(&self, ty: HeapType, count: u32) {
        self.counters(ty).used_descriptors.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn sampler_cursor(&self, cursor: u64) {
        self.max_used_sampler_descriptors.fetch_max(cursor, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    pub fn snapshot(&self) -> HeapStatsSnapshot {
        HeapStatsSnapshot {
            view_heaps: self.views.heaps.load(Ordering::Relaxed),
            view_descriptors: self.views.descriptors.load(Ordering::Relaxed),
            sampler_heaps: self.samplers.heaps.load(Ordering::Relaxed),
            sampler_descriptors: self.samplers.descriptors.load(Ordering::Relaxed),
            used_view_descriptors: self.views.used_descriptors.load(Ordering::Relaxed),
            used_sampler_descriptors: self.samplers.used_descriptors.load(Ordering::Relaxed),
            max_used_sampler_descriptors: self.max_used_sampler_descriptors.load(Ordering::Relaxed),
        }
    }
}
