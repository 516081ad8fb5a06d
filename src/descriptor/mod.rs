//! This module handles writing descriptor tables into shader-visible heaps.
//!
//! The main entry point is [`DescriptorSession`](session::DescriptorSession). A session owns a view heap and a sampler
//! heap for one batch of work, and routes table allocations to a [`DescriptorTableCache`](cache::DescriptorTableCache)
//! per heap. The cache fingerprints every table and hands out the offset of an identical table written earlier
//! instead of writing it again.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use explicit_descriptor_cache::*;
//! # use anyhow::Result;
//!
//! fn record<D: DescriptorDevice>(device: D, queue: Arc<DeferredActionQueue>) -> Result<()> {
//!     let pool = HeapPool::new(device, queue.clone(), Arc::new(SystemClock::new()), CacheSettings::default());
//!     let counts = SessionDescriptorCounts {
//!         constants: 16,
//!         views: 1024,
//!         samplers: 16,
//!     };
//!     let session = DescriptorSession::new(&pool, counts, BindlessConfig::DISABLED, 1)?;
//!     let samplers = [CpuDescriptor(0x1000), CpuDescriptor(0x1040)];
//!     let first = session.allocate_deduplicated(&[1, 1], &samplers, HeapType::Sampler, 0);
//!     let second = session.allocate_deduplicated(&[1, 1], &samplers, HeapType::Sampler, 0);
//!     assert_eq!(first, second);
//!     drop(session);
//!     // Heaps return to the pool once the GPU is done with this frame.
//!     let token = queue.signal();
//!     queue.retire(token);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod fingerprint;
pub mod session;
