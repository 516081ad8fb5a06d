//! This module handles native shader-visible descriptor heaps.
//!
//! - The [`pool`] module recycles native heaps across sessions and defers their release until the GPU is done with them.
//! - The [`linear`] module provides a lock-free linear allocator over one pooled heap.
//! - The [`stats`] module exposes telemetry counters shared by a pool and its heaps.

pub mod linear;
pub mod pool;
pub mod stats;
