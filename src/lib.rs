//! Shader-visible descriptor heap pooling and descriptor table deduplication.
//!
//! Explicit graphics APIs bind resources to draws and dispatches through descriptor tables: contiguous runs of
//! descriptors inside a shader-visible heap. These heaps are scarce. They are created by the driver with a fixed
//! capacity, and sampler heaps in particular are capped at 2048 descriptors. This library manages them in three
//! layers:
//!
//! - [`HeapPool`] recycles native heaps across frames. Heaps only return to the pool, or get destroyed, once the GPU
//! has finished all work that could still read from them.
//! - [`LinearDescriptorHeap`] allocates descriptor ranges out of one pooled heap with a single atomic cursor, so any
//! number of threads can allocate from it without locking.
//! - [`DescriptorSession`] owns a view heap and a sampler heap for one batch of work, and writes each distinct
//! descriptor table only once through a per-worker [`DescriptorTableCache`].
//!
//! The graphics API is abstracted behind the [`DescriptorDevice`] trait. A Vulkan implementation built on descriptor
//! buffers is available behind the `vulkan` feature.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use explicit_descriptor_cache::*;
//! # use anyhow::Result;
//!
//! fn frame<D: DescriptorDevice>(pool: &HeapPool<D>, queue: &DeferredActionQueue, workers: usize) -> Result<()> {
//!     let counts = SessionDescriptorCounts {
//!         constants: 64,
//!         views: 50_000,
//!         samplers: 256,
//!     };
//!     let session = DescriptorSession::new(pool, counts, BindlessConfig::DISABLED, workers)?;
//!     // ... hand `&session` to the workers recording draws ...
//!     drop(session);
//!     // Once the GPU signals the frame fence, heaps used by this frame can be reused.
//!     let token = queue.signal();
//!     queue.retire(token);
//!     Ok(())
//! }
//!
//! fn setup<D: DescriptorDevice>(device: D) -> (HeapPool<D>, Arc<DeferredActionQueue>) {
//!     let queue = Arc::new(DeferredActionQueue::new());
//!     let settings = SettingsBuilder::new().exhaustive_sampler_deduplication(true).build();
//!     let pool = HeapPool::new(device, queue.clone(), Arc::new(SystemClock::new()), settings);
//!     (pool, queue)
//! }
//! ```
//!
//! For further details, check out the following modules
//! - [`heap`] for heap pooling and linear allocation.
//! - [`descriptor`] for table deduplication and sessions.
//! - [`sync`] for the completion token and clock seams.
//! - [`backend`] for the graphics API seam.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod backend;
pub mod core;
pub mod descriptor;
pub mod heap;
pub mod sync;
