pub use crate::backend::{CpuDescriptor, DescriptorDevice, GpuDescriptor, HeapType};
pub use crate::backend::{MAX_SAMPLER_HEAP_DESCRIPTORS, MAX_VIEW_HEAP_DESCRIPTORS};
#[cfg(feature = "vulkan")]
pub use crate::backend::vulkan::{DescriptorSizes, VulkanDescriptorDevice, VulkanHeap};

pub use crate::core::error::Error;
pub use crate::core::settings::*;

pub use crate::sync::clock::{Clock, SystemClock};
pub use crate::sync::deferred::{CompletionQueue, DeferredAction, DeferredActionQueue};

pub use crate::heap::linear::{find_descriptor_run, LinearDescriptorHeap};
pub use crate::heap::pool::{HeapEntry, HeapPool};
pub use crate::heap::stats::{HeapStats, HeapStatsSnapshot};

pub use crate::descriptor::cache::DescriptorTableCache;
pub use crate::descriptor::fingerprint::fingerprint;
pub use crate::descriptor::session::{BindlessConfig, DescriptorSession, SessionDescriptorCounts};
