#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;

use explicit_descriptor_cache::{
    CacheSettings, Clock, CpuDescriptor, DeferredActionQueue, DescriptorDevice, GpuDescriptor, HeapPool, HeapType,
    SettingsBuilder, MAX_SAMPLER_HEAP_DESCRIPTORS, MAX_VIEW_HEAP_DESCRIPTORS,
};

pub const VIEW_DESCRIPTOR_SIZE: u32 = 32;
pub const SAMPLER_DESCRIPTOR_SIZE: u32 = 16;
/// Added to the CPU address of a heap to get its GPU address, so the two are never mixed up.
pub const GPU_ADDRESS_OFFSET: u64 = 1 << 48;

/// In-memory stand-in for a shader-visible heap.
#[derive(Debug)]
pub struct MockHeap {
    pub id: u64,
    pub ty: HeapType,
    pub count: u32,
    pub base: u64,
    slots: Mutex<Vec<u64>>,
}

impl MockHeap {
    /// Raw descriptor values written at `base..base + count`.
    pub fn read(&self, base: u32, count: usize) -> Vec<u64> {
        let slots = self.slots.lock();
        slots[base as usize..base as usize + count].to_vec()
    }
}

#[derive(Debug)]
struct MockDeviceInner {
    next_id: AtomicU64,
    created: AtomicU64,
    destroyed: AtomicU64,
    copied: AtomicU64,
    fail_create: AtomicBool,
    live: Mutex<HashSet<u64>>,
    max_views: u32,
    max_samplers: u32,
}

/// A descriptor device that keeps heaps in memory and counts every call made to it.
#[derive(Debug, Clone)]
pub struct MockDevice {
    inner: Arc<MockDeviceInner>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::with_limits(MAX_VIEW_HEAP_DESCRIPTORS, MAX_SAMPLER_HEAP_DESCRIPTORS)
    }
}

impl MockDevice {
    pub fn with_limits(max_views: u32, max_samplers: u32) -> Self {
        Self {
            inner: Arc::new(MockDeviceInner {
                next_id: AtomicU64::new(1),
                created: AtomicU64::new(0),
                destroyed: AtomicU64::new(0),
                copied: AtomicU64::new(0),
                fail_create: AtomicBool::new(false),
                live: Mutex::new(HashSet::new()),
                max_views,
                max_samplers,
            }),
        }
    }

    /// Make every following heap creation fail.
    pub fn set_fail_create(&self, fail: bool) {
        self.inner.fail_create.store(fail, Ordering::Relaxed);
    }

    /// Number of native heaps created so far.
    pub fn created(&self) -> u64 {
        self.inner.created.load(Ordering::Relaxed)
    }

    /// Number of native heaps destroyed so far.
    pub fn destroyed(&self) -> u64 {
        self.inner.destroyed.load(Ordering::Relaxed)
    }

    /// Number of descriptors copied into any heap so far.
    pub fn copied(&self) -> u64 {
        self.inner.copied.load(Ordering::Relaxed)
    }

    /// Whether the heap with this id has been created and not destroyed yet.
    pub fn is_live(&self, id: u64) -> bool {
        self.inner.live.lock().contains(&id)
    }
}

impl DescriptorDevice for MockDevice {
    type Heap = MockHeap;

    fn create_heap(&self, ty: HeapType, count: u32, _name: &str) -> Result<MockHeap> {
        if self.inner.fail_create.load(Ordering::Relaxed) {
            anyhow::bail!("Mock device refused to create a heap");
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.created.fetch_add(1, Ordering::Relaxed);
        self.inner.live.lock().insert(id);
        Ok(MockHeap {
            id,
            ty,
            count,
            base: id << 32,
            slots: Mutex::new(vec![0; count as usize]),
        })
    }

    fn destroy_heap(&self, heap: MockHeap) {
        assert!(self.inner.live.lock().remove(&heap.id), "Heap {} destroyed twice", heap.id);
        self.inner.destroyed.fetch_add(1, Ordering::Relaxed);
    }

    fn heap_start(&self, heap: &MockHeap) -> (CpuDescriptor, GpuDescriptor) {
        (CpuDescriptor(heap.base), GpuDescriptor(heap.base + GPU_ADDRESS_OFFSET))
    }

    fn descriptor_size(&self, ty: HeapType) -> u32 {
        match ty {
            HeapType::View => VIEW_DESCRIPTOR_SIZE,
            HeapType::Sampler => SAMPLER_DESCRIPTOR_SIZE,
        }
    }

    fn copy_descriptors(&self, heap: &MockHeap, base: u32, src: &[CpuDescriptor], ty: HeapType) {
        assert_eq!(heap.ty, ty, "Descriptors copied into a heap of the wrong type");
        let mut slots = heap.slots.lock();
        for (slot, descriptor) in slots[base as usize..base as usize + src.len()].iter_mut().zip(src) {
            *slot = descriptor.0;
        }
        self.inner.copied.fetch_add(src.len() as u64, Ordering::Relaxed);
    }

    fn max_heap_descriptors(&self, ty: HeapType) -> u32 {
        match ty {
            HeapType::View => self.inner.max_views,
            HeapType::Sampler => self.inner.max_samplers,
        }
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

pub struct Context {
    pub device: MockDevice,
    pub queue: Arc<DeferredActionQueue>,
    pub clock: Arc<ManualClock>,
    pub pool: HeapPool<MockDevice>,
}

impl Context {
    /// Pretend the GPU finished everything submitted so far.
    pub fn finish_frame(&self) {
        let token = self.queue.signal();
        self.queue.retire(token);
    }
}

/// Creates a heap pool on a mock device with default settings.
pub fn make_context() -> Context {
    make_context_with_settings(|settings| settings)
}

/// Creates a heap pool on a mock device with custom settings.
pub fn make_context_with_settings<F: FnOnce(SettingsBuilder) -> SettingsBuilder>(callback: F) -> Context {
    make_context_with_device(MockDevice::default(), callback(SettingsBuilder::new()).build())
}

pub fn make_context_with_device(device: MockDevice, settings: CacheSettings) -> Context {
    let _ = pretty_env_logger::try_init();
    let queue = Arc::new(DeferredActionQueue::new());
    let clock = Arc::new(ManualClock::default());
    let pool = HeapPool::new(device.clone(), queue.clone(), clock.clone(), settings);
    Context {
        device,
        queue,
        clock,
        pool,
    }
}
