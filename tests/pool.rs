use std::time::Duration;

use anyhow::Result;

use explicit_descriptor_cache::{CacheSettings, HeapType, LinearDescriptorHeap};

mod framework;

use framework::MockDevice;

#[test]
pub fn view_request_rounds_up_to_power_of_two() -> Result<()> {
    let context = framework::make_context();
    let entry = context.pool.acquire(HeapType::View, 70_000)?;
    assert_eq!(entry.capacity(), 131_072, "View heap capacity should be rounded up to the next power of two");
    assert_eq!(entry.heap().count, 131_072, "The native heap should be created with the rounded capacity");
    context.pool.release(entry);
    Ok(())
}

#[test]
pub fn view_request_clamped_to_device_limit() -> Result<()> {
    let context = framework::make_context_with_device(MockDevice::with_limits(100_000, 2048), CacheSettings::default());
    let entry = context.pool.acquire(HeapType::View, 70_000)?;
    assert_eq!(entry.capacity(), 100_000, "Rounded view heap capacity should be clamped to the device maximum");
    context.pool.release(entry);
    Ok(())
}

#[test]
pub fn sampler_request_clamped_to_hardware_limit() -> Result<()> {
    let context = framework::make_context();
    let entry = context.pool.acquire(HeapType::Sampler, 3_000)?;
    assert_eq!(entry.capacity(), 2048, "Sampler heaps can never be larger than 2048 descriptors");
    context.pool.release(entry);
    Ok(())
}

#[test]
pub fn released_heap_is_reused() -> Result<()> {
    let context = framework::make_context();
    let entry = context.pool.acquire(HeapType::View, 1000)?;
    let id = entry.heap().id;
    context.pool.release(entry);
    assert_eq!(context.pool.free_count(), 1);

    // Smaller requests of the same type can take the larger heap.
    let entry = context.pool.acquire(HeapType::View, 512)?;
    assert_eq!(entry.heap().id, id, "Free heap of the same type should be reused");
    assert_eq!(entry.capacity(), 1024);
    assert_eq!(context.device.created(), 1, "No new heap should be created when one can be reused");
    context.pool.release(entry);

    let sampler = context.pool.acquire(HeapType::Sampler, 16)?;
    assert_ne!(sampler.heap().id, id, "Heaps are never reused across types");
    assert_eq!(context.device.created(), 2);
    context.pool.release(sampler);

    let large = context.pool.acquire(HeapType::View, 2048)?;
    assert_ne!(large.heap().id, id, "A free heap that is too small should not be reused");
    context.pool.release(large);
    Ok(())
}

#[test]
pub fn release_stamps_token_and_time() -> Result<()> {
    let context = framework::make_context();
    let entry = context.pool.acquire(HeapType::View, 64)?;
    context.queue.signal();
    context.queue.signal();
    context.clock.advance(Duration::from_millis(250));
    context.pool.release(entry);

    let entry = context.pool.acquire(HeapType::View, 64)?;
    assert_eq!(entry.last_used_frame(), 3, "Entry should be stamped with the next token to be signaled");
    assert_eq!(entry.last_used_time(), Duration::from_millis(250));
    context.pool.release(entry);
    Ok(())
}

#[test]
pub fn stale_heaps_purged_after_frame_count() -> Result<()> {
    let context = framework::make_context();
    let entry = context.pool.acquire(HeapType::View, 64)?;
    context.pool.release(entry);

    for _ in 0..99 {
        context.queue.signal();
    }
    let large = context.pool.acquire(HeapType::View, 4096)?;
    assert_eq!(context.pool.free_count(), 1, "Heap unused for 99 frames should not be purged yet");
    context.pool.release(large);
    // Take the fresh large heap out again so that the next acquire has to create a heap.
    let large = context.pool.acquire(HeapType::View, 4096)?;

    context.queue.signal();
    let larger = context.pool.acquire(HeapType::View, 8192)?;
    assert_eq!(context.pool.free_count(), 0, "Heap unused for 100 frames should be purged");
    assert_eq!(context.device.destroyed(), 0, "Purged heap should only be destroyed once the GPU is done with it");

    context.finish_frame();
    assert_eq!(context.device.destroyed(), 1);

    context.pool.release(large);
    context.pool.release(larger);
    Ok(())
}

#[test]
pub fn stale_heaps_purged_after_timeout() -> Result<()> {
    let context = framework::make_context();
    let entry = context.pool.acquire(HeapType::Sampler, 64)?;
    context.pool.release(entry);

    context.clock.advance(Duration::from_secs(5));
    let view = context.pool.acquire(HeapType::View, 64)?;
    assert_eq!(context.pool.free_count(), 0, "Heap unused for 5 seconds should be purged");
    assert_eq!(context.pool.stats().sampler_heaps, 0, "Purged heap should no longer count as alive");

    context.finish_frame();
    assert_eq!(context.device.destroyed(), 1);
    context.pool.release(view);
    Ok(())
}

#[test]
pub fn stale_heaps_kept_when_request_is_satisfied() -> Result<()> {
    let context = framework::make_context();
    let small = context.pool.acquire(HeapType::View, 64)?;
    let large = context.pool.acquire(HeapType::View, 4096)?;
    context.pool.release(small);

    context.clock.advance(Duration::from_secs(6));
    context.pool.release(large);

    // The fresh large heap satisfies this, so nothing gets purged.
    let reused = context.pool.acquire(HeapType::View, 4096)?;
    assert_eq!(context.pool.free_count(), 1, "Stale heap should survive an acquire served from the free list");
    assert_eq!(context.device.created(), 2);

    // This one needs a new heap, which purges the stale one first.
    let new = context.pool.acquire(HeapType::View, 8192)?;
    assert_eq!(context.pool.free_count(), 0);
    assert_eq!(context.device.created(), 3);

    context.pool.release(reused);
    context.pool.release(new);
    Ok(())
}

#[test]
pub fn deferred_release_waits_for_completion() -> Result<()> {
    let context = framework::make_context();
    let heap = LinearDescriptorHeap::new(&context.pool, 1024, HeapType::View)?;
    let first = heap.native_heap().id;
    drop(heap);

    assert_eq!(context.pool.free_count(), 0, "Dropped heap should not be back in the pool before the GPU is done");
    assert_eq!(context.pool.allocated_count(), 1);

    let second = context.pool.acquire(HeapType::View, 1024)?;
    assert_ne!(second.heap().id, first, "Heap still in use by the GPU must not be handed out again");
    assert!(context.device.is_live(first), "Heap still in use by the GPU must not be destroyed");

    let token = context.queue.signal();
    context.queue.retire(token - 1);
    assert_eq!(context.pool.free_count(), 0, "Retiring an older token should not release the heap");

    context.queue.retire(token);
    assert_eq!(context.pool.free_count(), 1);
    let third = context.pool.acquire(HeapType::View, 1024)?;
    assert_eq!(third.heap().id, first, "Heap should be reusable once its token has retired");

    context.pool.release(second);
    context.pool.release(third);
    Ok(())
}

#[test]
pub fn live_heaps_never_share_a_native_heap() -> Result<()> {
    let context = framework::make_context();
    for _ in 0..8 {
        let a = LinearDescriptorHeap::new(&context.pool, 256, HeapType::View)?;
        let b = LinearDescriptorHeap::new(&context.pool, 256, HeapType::View)?;
        assert_ne!(a.native_heap().id, b.native_heap().id, "Two live heaps must never own the same native heap");
        drop(a);
        drop(b);
        context.finish_frame();
    }
    assert_eq!(context.device.created(), 2, "Heaps should be recycled across frames");
    Ok(())
}

#[test]
pub fn flush_free_list_destroys_after_completion() -> Result<()> {
    let context = framework::make_context();
    let a = context.pool.acquire(HeapType::View, 64)?;
    let b = context.pool.acquire(HeapType::Sampler, 64)?;
    context.pool.release(a);
    context.pool.release(b);

    context.pool.flush_free_list();
    assert_eq!(context.pool.free_count(), 0);
    assert_eq!(context.device.destroyed(), 0, "Flushed heaps should be destroyed once the GPU is done with them");
    context.finish_frame();
    assert_eq!(context.device.destroyed(), 2);

    let stats = context.pool.stats();
    assert_eq!(stats.view_heaps + stats.sampler_heaps, 0);
    assert_eq!(stats.view_descriptors + stats.sampler_descriptors, 0);
    Ok(())
}

#[test]
pub fn shutdown_destroys_free_heaps() -> Result<()> {
    let context = framework::make_context();
    let entry = context.pool.acquire(HeapType::View, 64)?;
    context.pool.release(entry);
    context.pool.shutdown();
    assert_eq!(context.device.destroyed(), 1, "Shutdown should destroy free heaps immediately");
    Ok(())
}

#[test]
#[should_panic(expected = "still in use")]
pub fn shutdown_with_outstanding_heap_panics() {
    let context = framework::make_context();
    let _entry = context.pool.acquire(HeapType::View, 64).unwrap();
    context.pool.shutdown();
}

#[test]
pub fn creation_failure_propagates() -> Result<()> {
    let context = framework::make_context();
    context.device.set_fail_create(true);
    let result = context.pool.acquire(HeapType::View, 64);
    assert!(result.is_err(), "Failure to create a heap should be returned to the caller");
    assert_eq!(context.pool.allocated_count(), 0, "Failed acquire should not count as an allocated heap");

    let err = LinearDescriptorHeap::new(&context.pool, 64, HeapType::Sampler).unwrap_err();
    assert!(
        err.to_string().contains("Explicit Sampler Heap"),
        "Error should name the heap that could not be created, got: {err}"
    );

    context.device.set_fail_create(false);
    let entry = context.pool.acquire(HeapType::View, 64)?;
    context.pool.release(entry);
    Ok(())
}

#[test]
pub fn stats_track_live_heaps() -> Result<()> {
    let context = framework::make_context();
    let view = context.pool.acquire(HeapType::View, 100)?;
    let sampler = context.pool.acquire(HeapType::Sampler, 10)?;

    let stats = context.pool.stats();
    assert_eq!(stats.view_heaps, 1);
    assert_eq!(stats.view_descriptors, 128);
    assert_eq!(stats.sampler_heaps, 1);
    assert_eq!(stats.sampler_descriptors, 16);

    context.pool.release(view);
    context.pool.release(sampler);
    assert_eq!(context.pool.stats().view_heaps, 1, "Heaps in the free list are still alive");
    Ok(())
}
