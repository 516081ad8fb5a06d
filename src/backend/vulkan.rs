//! Vulkan implementation of [`DescriptorDevice`] based on descriptor buffers (`VK_EXT_descriptor_buffer`).
//!
//! A shader-visible heap is a host-visible buffer allocated through [`gpu_allocator`], with the resource or sampler
//! descriptor buffer usage bit set. Descriptors are fetched from the driver (`vkGetDescriptorEXT`) by the caller and
//! staged through [`VulkanDescriptorDevice::stage`], which hands out the [`CpuDescriptor`] used everywhere else.
//! Copying a table into a heap is a plain memory copy into the mapped buffer.
//!
//! The descriptor sizes differ per driver and must be read from `VkPhysicalDeviceDescriptorBufferPropertiesEXT`.
//! The device must have been created with the `bufferDeviceAddress` and `descriptorBuffer` features enabled.

use std::ptr::NonNull;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;
use gpu_allocator::vulkan as vk_alloc;
use gpu_allocator::vulkan::AllocationScheme;
use gpu_allocator::MemoryLocation;
use parking_lot::{Mutex, RwLock};

use crate::backend::{CpuDescriptor, DescriptorDevice, GpuDescriptor, HeapType};
use crate::core::error::Error;

/// Staged descriptor handles are offsets into the staging area, shifted by one so that zero stays the null handle.
const STAGING_HANDLE_BASE: u64 = 1;

/// Descriptor sizes in bytes, as reported in `VkPhysicalDeviceDescriptorBufferPropertiesEXT`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DescriptorSizes {
    /// The largest of the image, buffer and acceleration structure descriptor sizes used in view tables.
    pub view: u32,
    /// `samplerDescriptorSize`.
    pub sampler: u32,
}

#[derive(Derivative)]
#[derivative(Debug)]
struct DeviceInner {
    #[derivative(Debug = "ignore")]
    device: ash::Device,
    #[derivative(Debug = "ignore")]
    allocator: Mutex<vk_alloc::Allocator>,
    sizes: DescriptorSizes,
    #[derivative(Debug = "ignore")]
    staging: RwLock<Vec<u8>>,
    staging_capacity: usize,
}

/// [`DescriptorDevice`] writing descriptors into host-visible Vulkan descriptor buffers.
/// Internal state is wrapped in an `Arc`, so this is cheap to clone.
#[derive(Debug, Clone)]
pub struct VulkanDescriptorDevice {
    inner: Arc<DeviceInner>,
}

/// A descriptor buffer acting as a shader-visible heap.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VulkanHeap {
    handle: vk::Buffer,
    #[derivative(Debug = "ignore")]
    allocation: vk_alloc::Allocation,
    pointer: NonNull<u8>,
    address: vk::DeviceAddress,
    size: vk::DeviceSize,
}

// SAFETY: The unsafe part of this is the mapped pointer, but this is a pointer to GPU memory
// so its value is not dropped when sending this to a different thread. Writes through it only
// happen to ranges exclusively owned by the writer.
unsafe impl Send for VulkanHeap {}
unsafe impl Sync for VulkanHeap {}

impl VulkanHeap {
    /// The buffer backing this heap.
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    /// Device address of the start of the heap, to be bound with `vkCmdBindDescriptorBuffersEXT`.
    pub fn address(&self) -> vk::DeviceAddress {
        self.address
    }

    /// Size of the heap in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl VulkanDescriptorDevice {
    /// Create a new Vulkan descriptor device.
    ///
    /// `staging_capacity` is the size in bytes of the area holding CPU descriptors between [`Self::stage`] and
    /// [`Self::reset_staging`].
    pub fn new(device: ash::Device, allocator: vk_alloc::Allocator, sizes: DescriptorSizes, staging_capacity: usize) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                device,
                allocator: Mutex::new(allocator),
                sizes,
                staging: RwLock::new(Vec::with_capacity(staging_capacity)),
                staging_capacity,
            }),
        }
    }

    /// Stage a descriptor obtained from `vkGetDescriptorEXT` and get a CPU handle for it.
    /// # Errors
    /// * Fails if `bytes` is not exactly one descriptor of type `ty`.
    /// * Fails if the staging area is full.
    pub fn stage(&self, ty: HeapType, bytes: &[u8]) -> Result<CpuDescriptor> {
        let size = self.descriptor_size(ty) as usize;
        if bytes.len() != size {
            anyhow::bail!("Staged {:?} descriptor is {} bytes, expected {}", ty, bytes.len(), size);
        }

        let mut staging = self.inner.staging.write();
        if staging.len() + size > self.inner.staging_capacity {
            return Err(Error::StagingFull(self.inner.staging_capacity).into());
        }
        let offset = staging.len();
        staging.extend_from_slice(bytes);
        Ok(CpuDescriptor(offset as u64 + STAGING_HANDLE_BASE))
    }

    /// Forget every staged descriptor. Handles staged before this call become invalid, and may be handed out again
    /// for different descriptors, so their versions must be bumped.
    pub fn reset_staging(&self) {
        self.inner.staging.write().clear();
    }

    fn staged_bytes<'a>(staging: &'a [u8], descriptor: CpuDescriptor, size: usize) -> Result<&'a [u8], Error> {
        let start = descriptor
            .0
            .checked_sub(STAGING_HANDLE_BASE)
            .ok_or(Error::InvalidStagingDescriptor(descriptor.0))? as usize;
        staging
            .get(start..start.saturating_add(size))
            .ok_or(Error::InvalidStagingDescriptor(descriptor.0))
    }

    fn destroy_buffer(&self, handle: vk::Buffer, allocation: Option<vk_alloc::Allocation>) {
        // SAFETY: The buffer was created from this device and is no longer in use.
        unsafe { self.inner.device.destroy_buffer(handle, None) };
        if let Some(allocation) = allocation {
            if let Err(err) = self.inner.allocator.lock().free(allocation) {
                error!("Failed to free descriptor heap memory: {err}");
            }
        }
    }
}

impl DescriptorDevice for VulkanDescriptorDevice {
    type Heap = VulkanHeap;

    fn create_heap(&self, ty: HeapType, count: u32, name: &str) -> Result<VulkanHeap> {
        let device = &self.inner.device;
        let size = count as vk::DeviceSize * self.descriptor_size(ty) as vk::DeviceSize;
        let usage = match ty {
            HeapType::View => vk::BufferUsageFlags::RESOURCE_DESCRIPTOR_BUFFER_EXT,
            HeapType::Sampler => vk::BufferUsageFlags::SAMPLER_DESCRIPTOR_BUFFER_EXT,
        };
        let handle = unsafe {
            device.create_buffer(
                &vk::BufferCreateInfo {
                    size,
                    usage: usage | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                    sharing_mode: vk::SharingMode::EXCLUSIVE,
                    ..Default::default()
                },
                None,
            )?
        };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkBuffer {handle:p} for {name} (size = {size} bytes)");

        let requirements = unsafe { device.get_buffer_memory_requirements(handle) };
        let allocation = self.inner.allocator.lock().allocate(&vk_alloc::AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::CpuToGpu,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                self.destroy_buffer(handle, None);
                return Err(Error::from(err).into());
            }
        };

        let Some(pointer) = allocation.mapped_ptr() else {
            self.destroy_buffer(handle, Some(allocation));
            return Err(Error::UnmappableHeap(ty).into());
        };

        if let Err(err) = unsafe { device.bind_buffer_memory(handle, allocation.memory(), allocation.offset()) } {
            self.destroy_buffer(handle, Some(allocation));
            return Err(Error::from(err).into());
        }

        let address = unsafe {
            device.get_buffer_device_address(&vk::BufferDeviceAddressInfo {
                buffer: handle,
                ..Default::default()
            })
        };

        Ok(VulkanHeap {
            handle,
            allocation,
            pointer: pointer.cast(),
            address,
            size,
        })
    }

    fn destroy_heap(&self, heap: VulkanHeap) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkBuffer {:p}", heap.handle);
        self.destroy_buffer(heap.handle, Some(heap.allocation));
    }

    fn heap_start(&self, heap: &VulkanHeap) -> (CpuDescriptor, GpuDescriptor) {
        (CpuDescriptor(heap.pointer.as_ptr() as u64), GpuDescriptor(heap.address))
    }

    fn descriptor_size(&self, ty: HeapType) -> u32 {
        match ty {
            HeapType::View => self.inner.sizes.view,
            HeapType::Sampler => self.inner.sizes.sampler,
        }
    }

    fn copy_descriptors(&self, heap: &VulkanHeap, base: u32, src: &[CpuDescriptor], ty: HeapType) {
        let size = self.descriptor_size(ty) as usize;
        let staging = self.inner.staging.read();
        for (index, descriptor) in src.iter().enumerate() {
            let bytes = match Self::staged_bytes(&staging, *descriptor, size) {
                Ok(bytes) => bytes,
                Err(err) => {
                    error!("Skipping descriptor copy: {err}");
                    continue;
                }
            };
            let offset = (base as usize + index) * size;
            assert!(offset + size <= heap.size as usize, "Descriptor copy out of heap bounds");
            // SAFETY: The destination range lies within the mapped heap (checked above) and is exclusively owned by
            // the caller, the source is a separate CPU allocation.
            unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), heap.pointer.as_ptr().add(offset), size);
            }
        }
    }
}
