use anyhow::Result;

use crate::backend::{CpuDescriptor, DescriptorDevice, GpuDescriptor, HeapType};
use crate::descriptor::cache::DescriptorTableCache;
use crate::heap::linear::LinearDescriptorHeap;
use crate::heap::pool::HeapPool;

/// Which descriptor types are bound through a separate bindless mechanism instead of per-draw tables.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BindlessConfig {
    /// Resource views are bindless. Constant buffer descriptors still go through the view heap.
    pub views: bool,
    /// Samplers are bindless.
    pub samplers: bool,
}

impl BindlessConfig {
    /// Everything goes through descriptor tables.
    pub const DISABLED: Self = Self {
        views: false,
        samplers: false,
    };
    /// Resource views and samplers are both bindless.
    pub const ALL: Self = Self {
        views: true,
        samplers: true,
    };
}

/// Upper bounds on the descriptors a session will write.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SessionDescriptorCounts {
    /// Constant buffer descriptors.
    pub constants: u32,
    /// Shader resource and unordered access view descriptors.
    pub views: u32,
    /// Sampler descriptors.
    pub samplers: u32,
}

/// Owns the view and sampler heaps used by one batch of draws or dispatches, and routes table allocations to them.
///
/// A session is shared by all workers recording the batch. Dropping it hands both heaps back to the pool once the GPU
/// is done with them.
///
/// # Example
/// ```
/// # use explicit_descriptor_cache::*;
/// # use anyhow::Result;
/// fn bind_material<D: DescriptorDevice>(pool: &HeapPool<D>, textures: &[CpuDescriptor], versions: &[u32]) -> Result<()> {
///     let counts = SessionDescriptorCounts {
///         constants: 0,
///         views: 4096,
///         samplers: 64,
///     };
///     let session = DescriptorSession::new(pool, counts, BindlessConfig::DISABLED, 4)?;
///     // Worker 0 records this draw.
///     match session.allocate_deduplicated(versions, textures, HeapType::View, 0) {
///         Some(base) => {
///             let _table = session.gpu_descriptor(HeapType::View, base);
///         }
///         // Heap overflow, this draw renders without its bindings.
///         None => {}
///     }
///     Ok(())
/// }
/// ```
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct DescriptorSession<D: DescriptorDevice> {
    views: Option<DescriptorTableCache<D>>,
    samplers: Option<DescriptorTableCache<D>>,
    worker_count: usize,
}

impl<D: DescriptorDevice> DescriptorSession<D> {
    /// Create a session for `worker_count` workers.
    ///
    /// The view heap holds the constant descriptors plus, unless views are bindless, the view descriptors. It is
    /// clamped to the configured maximum and not created at all if it would be empty. The sampler heap is not created
    /// if samplers are bindless or no samplers are requested.
    /// # Errors
    /// * Fails if a native heap has to be created and the device fails to do so.
    /// # Panics
    /// Panics if `worker_count` is zero.
    pub fn new(pool: &HeapPool<D>, counts: SessionDescriptorCounts, bindless: BindlessConfig, worker_count: usize) -> Result<Self> {
        assert!(worker_count > 0, "A descriptor session needs at least one worker");
        let settings = pool.settings();

        let view_count = counts
            .constants
            .saturating_add(if bindless.views { 0 } else { counts.views })
            .min(settings.max_view_descriptors);
        let views = if view_count > 0 {
            let heap = LinearDescriptorHeap::new(pool, view_count, HeapType::View)?;
            let reservation = reservation_per_worker(heap.capacity(), worker_count, settings.view_reservation_per_worker);
            Some(DescriptorTableCache::new(heap, worker_count, reservation))
        } else {
            None
        };

        let samplers = if !bindless.samplers && counts.samplers > 0 {
            let heap = LinearDescriptorHeap::new(pool, counts.samplers, HeapType::Sampler)?;
            Some(DescriptorTableCache::new(heap, worker_count, 0))
        } else {
            None
        };

        Ok(Self {
            views,
            samplers,
            worker_count,
        })
    }

    /// Number of workers that may record into this session.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// The table cache for a descriptor type, or `None` if descriptors of this type are bindless in this session.
    pub fn cache(&self, ty: HeapType) -> Option<&DescriptorTableCache<D>> {
        match ty {
            HeapType::View => self.views.as_ref(),
            HeapType::Sampler => self.samplers.as_ref(),
        }
    }

    /// The heap for a descriptor type, or `None` if descriptors of this type are bindless in this session.
    pub fn heap(&self, ty: HeapType) -> Option<&LinearDescriptorHeap<D>> {
        self.cache(ty).map(DescriptorTableCache::heap)
    }

    /// See [`DescriptorTableCache::allocate_deduplicated`]. Also returns `None` if this session has no heap for `ty`,
    /// requests for that type must go through the bindless path instead.
    pub fn allocate_deduplicated(&self, versions: &[u32], descriptors: &[CpuDescriptor], ty: HeapType, worker: usize) -> Option<u32> {
        self.cache(ty)?.allocate_deduplicated(versions, descriptors, worker)
    }

    /// See [`DescriptorTableCache::allocate`]. Also returns `None` if this session has no heap for `ty`.
    pub fn allocate(&self, descriptors: &[CpuDescriptor], ty: HeapType, worker: usize) -> Option<u32> {
        self.cache(ty)?.allocate(descriptors, worker)
    }

    /// GPU handle of the descriptor at `index` in the heap for `ty`.
    pub fn gpu_descriptor(&self, ty: HeapType, index: u32) -> Option<GpuDescriptor> {
        self.heap(ty).map(|heap| heap.gpu_descriptor(index))
    }
}

/// Size of the per-worker view reservation. Reservations never take more than half of the heap together, so the
/// shared cursor keeps room for workers that record more than their share.
fn reservation_per_worker(capacity: u32, worker_count: usize, configured: u32) -> u32 {
    let share = capacity as usize / (2 * worker_count);
    configured.min(share as u32)
}
