use xxhash_rust::xxh64::xxh64;

use crate::backend::CpuDescriptor;

/// Fingerprint of a descriptor table used as the deduplication key.
///
/// Raw CPU descriptor handles can be recycled by whatever allocated them, so the handles alone could match a table
/// that was written before the handle was reused. Each descriptor therefore also carries a version that changes
/// whenever its handle is reused, and both arrays are hashed.
pub fn fingerprint(versions: &[u32], descriptors: &[CpuDescriptor]) -> u64 {
    let version_hash = xxh64(bytemuck::cast_slice(versions), 0);
    let descriptor_hash = xxh64(bytemuck::cast_slice(descriptors), 0);
    version_hash ^ descriptor_hash
}
