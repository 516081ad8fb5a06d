//! Exposes the descriptor cache error type

#[cfg(feature = "vulkan")]
use gpu_allocator::AllocationError;
use thiserror::Error;

use crate::backend::HeapType;

/// Error type that the descriptor cache can return or hand to the fatal handler.
#[derive(Error, Debug)]
pub enum Error {
    /// Generic Vulkan error type.
    #[cfg(feature = "vulkan")]
    #[error("Vulkan error: `{0}`")]
    VkError(ash::vk::Result),
    /// Vulkan allocation error.
    #[cfg(feature = "vulkan")]
    #[error("Vulkan allocation error: `{0}`")]
    AllocationError(AllocationError),
    /// The sampler heap ran out of space. There is no way to recover from this, the sampler heap
    /// is already at the maximum size the hardware supports.
    #[error("Explicit sampler descriptor heap overflow (capacity {capacity}). It is not possible to recover from this error.")]
    SamplerHeapOverflow {
        /// Capacity of the overflowing heap.
        capacity: u32,
    },
    /// The view heap ran out of space. Descriptor tables for the rest of the session are skipped.
    #[error("Explicit view descriptor heap overflow (capacity {capacity}). Current frame will not be rendered correctly. Increase the maximum view descriptor count to at least {suggested}.")]
    ViewHeapOverflow {
        /// Capacity of the overflowing heap.
        capacity: u32,
        /// Capacity that would likely have been enough.
        suggested: u32,
    },
    /// The backend created a heap that cannot be written from the CPU.
    #[error("Descriptor heap of type {0:?} is not host visible")]
    UnmappableHeap(HeapType),
    /// A CPU descriptor handle does not refer to a staged descriptor.
    #[error("CPU descriptor `{0:#x}` does not point to a staged descriptor")]
    InvalidStagingDescriptor(u64),
    /// The staging area for CPU descriptors is full.
    #[error("Descriptor staging area is full ({0} bytes)")]
    StagingFull(usize),
}

#[cfg(feature = "vulkan")]
impl From<ash::vk::Result> for Error {
    fn from(value: ash::vk::Result) -> Self {
        Error::VkError(value)
    }
}

#[cfg(feature = "vulkan")]
impl From<AllocationError> for Error {
    fn from(value: AllocationError) -> Self {
        Error::AllocationError(value)
    }
}
