//! The sync module provides the CPU-GPU timeline seams the cache depends on.
//!
//! - The [`deferred`] module provides the [`CompletionQueue`](deferred::CompletionQueue) trait used to postpone
//! heap release and destruction until the GPU is done with a heap, as well as a simple token-driven implementation.
//! - The [`clock`] module provides the wall clock used to age heaps sitting in the free list.

pub mod clock;
pub mod deferred;
