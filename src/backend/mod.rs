//! The host API seam.
//!
//! Everything above this module only talks to native descriptor heaps through the [`DescriptorDevice`] trait.
//! Implement it to plug the cache into a different graphics API. A Vulkan implementation based on host-visible
//! descriptor buffers lives in [`vulkan`] and is enabled through the `vulkan` feature.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};

#[cfg(feature = "vulkan")]
pub mod vulkan;

/// Maximum size of a shader-visible sampler heap. This is a hard hardware limit.
pub const MAX_SAMPLER_HEAP_DESCRIPTORS: u32 = 2048;
/// Maximum size of a shader-visible view heap on the lowest hardware tier.
pub const MAX_VIEW_HEAP_DESCRIPTORS: u32 = 1_000_000;

/// The kind of descriptors a heap holds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HeapType {
    /// Constant buffer, shader resource and unordered access views.
    View,
    /// Sampler states.
    Sampler,
}

impl HeapType {
    /// Debug name given to native heaps of this type.
    pub fn heap_name(&self) -> &'static str {
        match self {
            HeapType::View => "Explicit View Heap",
            HeapType::Sampler => "Explicit Sampler Heap",
        }
    }

    /// Default maximum number of descriptors a shader-visible heap of this type can hold.
    pub fn default_max_descriptors(&self) -> u32 {
        match self {
            HeapType::View => MAX_VIEW_HEAP_DESCRIPTORS,
            HeapType::Sampler => MAX_SAMPLER_HEAP_DESCRIPTORS,
        }
    }
}

/// Raw CPU-side descriptor handle. What the value means is up to the backend, but zero never
/// refers to a valid descriptor.
#[repr(transparent)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct CpuDescriptor(pub u64);

/// Raw GPU-side descriptor handle, used to build descriptor table pointers for draws and dispatches.
#[repr(transparent)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct GpuDescriptor(pub u64);

static_assertions::assert_eq_size!(CpuDescriptor, u64);
static_assertions::assert_eq_size!(GpuDescriptor, u64);

impl CpuDescriptor {
    /// Handle `index` descriptors past this one, given the descriptor size in bytes.
    pub fn offset(self, index: u32, stride: u32) -> Self {
        Self(self.0 + index as u64 * stride as u64)
    }

    /// Whether this handle is the null handle.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl GpuDescriptor {
    /// Handle `index` descriptors past this one, given the descriptor size in bytes.
    pub fn offset(self, index: u32, stride: u32) -> Self {
        Self(self.0 + index as u64 * stride as u64)
    }
}

/// Interface to the graphics API that owns native descriptor heaps.
///
/// Implementations are expected to be cheap to clone, usually by wrapping their state in an `Arc`.
pub trait DescriptorDevice: Clone + Send + Sync + 'static {
    /// Native shader-visible heap object.
    type Heap: Send + Sync + 'static;

    /// Create a new shader-visible heap holding exactly `count` descriptors.
    /// # Errors
    /// * Any failure is treated as an unrecoverable driver error by the caller.
    fn create_heap(&self, ty: HeapType, count: u32, name: &str) -> Result<Self::Heap>;

    /// Destroy a native heap. Only called once the GPU can no longer reference it.
    fn destroy_heap(&self, heap: Self::Heap);

    /// CPU and GPU handles of the first descriptor in a heap.
    fn heap_start(&self, heap: &Self::Heap) -> (CpuDescriptor, GpuDescriptor);

    /// Size in bytes of one descriptor of the given type, the increment between two handles.
    fn descriptor_size(&self, ty: HeapType) -> u32;

    /// Copy `src` into `heap`, starting at descriptor index `base`.
    /// The destination range is guaranteed to be exclusively owned by the caller.
    fn copy_descriptors(&self, heap: &Self::Heap, base: u32, src: &[CpuDescriptor], ty: HeapType);

    /// Maximum number of descriptors a shader-visible heap of this type can hold.
    fn max_heap_descriptors(&self, ty: HeapType) -> u32 {
        ty.default_max_descriptors()
    }
}
