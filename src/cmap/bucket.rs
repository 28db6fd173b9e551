//! Persistent bucket layout (spec §4.F).
//!
//! Grounded in `original_source/src/engines/cmap.cc`'s use of a TBB
//! `concurrent_hash_map`: a fixed-size bucket table indexed by key hash,
//! each bucket a small fixed array of entries plus an overflow pointer to
//! another bucket, forming a chain on collision. This crate doesn't carry
//! a `libtbb` equivalent, so the map itself (table, chaining, per-bucket
//! locking) is built directly over the persistent allocator instead of
//! wrapping a concurrent container.

use crate::alloc::{Pool, PPtr};
use crate::error::Result;
use crate::stm::Journal;

/// Entries held directly in a bucket before it chains to an overflow
/// bucket (spec §4.F).
pub const BUCKET_SLOTS: usize = 7;

/// Number of top-level buckets. Fixed at compile time rather than grown
/// dynamically (spec §4.F Non-goals: no online resizing), matching the
/// B+-tree's fixed `LEAF_KEYS` topology.
pub const NUM_BUCKETS: usize = 4096;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct CSlot {
    pub occupied: u8,
    _pad: [u8; 7],
    pub key_len: u32,
    pub val_len: u32,
    pub buf: PPtr<u8>,
}

impl CSlot {
    pub const fn empty() -> Self {
        CSlot {
            occupied: 0,
            _pad: [0; 7],
            key_len: 0,
            val_len: 0,
            buf: PPtr::null(),
        }
    }

    pub fn buf_len(&self) -> usize {
        self.key_len as usize + self.val_len as usize
    }
}

#[repr(C)]
pub struct PBucket {
    pub slots: [CSlot; BUCKET_SLOTS],
    pub overflow: PPtr<PBucket>,
}

impl PBucket {
    pub fn byte_len() -> usize {
        std::mem::size_of::<PBucket>()
    }

    fn slots_byte_len() -> usize {
        std::mem::size_of::<[CSlot; BUCKET_SLOTS]>()
    }
}

/// Deterministic 64-bit FNV-1a hash. Unlike `std::collections::hash_map`'s
/// `DefaultHasher`, this carries no per-process random seed, so the bucket
/// a key maps to is stable across a pool being closed and reopened (spec
/// §4.F "Recovery": entries must be found in the same bucket after a
/// restart).
pub fn bucket_hash(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut h = OFFSET;
    for &byte in data {
        h ^= byte as u64;
        h = h.wrapping_mul(PRIME);
    }
    h
}

pub fn bucket_index(key: &[u8]) -> usize {
    (bucket_hash(key) as usize) % NUM_BUCKETS
}

/// Allocates and zero-initializes the fixed-size table of bucket head
/// pointers. Must run inside an active transaction.
pub fn allocate_table(pool: &Pool, journal: &mut Journal) -> Result<u64> {
    let offset = pool.reserve(journal, NUM_BUCKETS * 8)?;
    let zeros = vec![0u8; NUM_BUCKETS * 8];
    pool.write_bytes(offset, &zeros);
    Ok(offset)
}

pub fn read_head(pool: &Pool, table_offset: u64, bucket: usize) -> PPtr<PBucket> {
    let bytes = pool.read_bytes(table_offset + (bucket * 8) as u64, 8);
    let raw = u64::from_ne_bytes(bytes.try_into().unwrap());
    PPtr::from_offset(raw)
}

pub fn write_head(pool: &Pool, journal: &mut Journal, table_offset: u64, bucket: usize, head: PPtr<PBucket>) {
    let slot_offset = table_offset + (bucket * 8) as u64;
    journal.snapshot(pool, slot_offset, 8);
    pool.write_bytes(slot_offset, &head.offset().to_ne_bytes());
}

/// Allocates and zero-initializes a fresh bucket, without linking it into
/// any chain. Must run inside an active transaction.
pub fn allocate_bucket(pool: &Pool, journal: &mut Journal) -> Result<PPtr<PBucket>> {
    let offset = pool.reserve(journal, PBucket::byte_len())?;
    let pptr = PPtr::<PBucket>::from_offset(offset);
    unsafe {
        std::ptr::write(
            pptr.get_mut(pool) as *mut PBucket,
            PBucket {
                slots: [CSlot::empty(); BUCKET_SLOTS],
                overflow: PPtr::null(),
            },
        );
    }
    Ok(pptr)
}

pub fn read_kv(pool: &Pool, slot: &CSlot) -> Vec<u8> {
    if slot.buf.is_null() {
        return Vec::new();
    }
    pool.read_bytes(slot.buf.offset(), slot.buf_len())
}

pub fn free_slot_buf(pool: &Pool, journal: &mut Journal, slot: &CSlot) {
    if !slot.buf.is_null() {
        pool.release(journal, slot.buf.offset(), slot.buf_len());
    }
}

fn slot_offset(bucket_ptr: PPtr<PBucket>, index: usize) -> u64 {
    bucket_ptr.offset() + (index * std::mem::size_of::<CSlot>()) as u64
}

/// Writes `key ++ value` into slot `index` of the bucket at `bucket_ptr`.
/// The slot must already be empty. Must run inside an active transaction.
pub fn write_slot(
    pool: &Pool,
    journal: &mut Journal,
    bucket_ptr: PPtr<PBucket>,
    index: usize,
    key: &[u8],
    value: &[u8],
) -> Result<()> {
    let mut kv = Vec::with_capacity(key.len() + value.len());
    kv.extend_from_slice(key);
    kv.extend_from_slice(value);
    let buf_offset = if kv.is_empty() { 0 } else { pool.reserve(journal, kv.len())? };
    if !kv.is_empty() {
        pool.write_bytes(buf_offset, &kv);
    }

    let offset = slot_offset(bucket_ptr, index);
    journal.snapshot(pool, offset, std::mem::size_of::<CSlot>());
    let bucket = unsafe { bucket_ptr.get_mut(pool) };
    bucket.slots[index] = CSlot {
        occupied: 1,
        _pad: [0; 7],
        key_len: key.len() as u32,
        val_len: value.len() as u32,
        buf: PPtr::from_offset(buf_offset),
    };
    Ok(())
}

pub fn overwrite_slot_value(
    pool: &Pool,
    journal: &mut Journal,
    bucket_ptr: PPtr<PBucket>,
    index: usize,
    value: &[u8],
) -> Result<()> {
    let key = {
        let bucket = unsafe { bucket_ptr.get(pool) };
        let slot = &bucket.slots[index];
        let kv = read_kv(pool, slot);
        kv[..slot.key_len as usize].to_vec()
    };
    {
        let bucket = unsafe { bucket_ptr.get(pool) };
        free_slot_buf(pool, journal, &bucket.slots[index]);
    }
    write_slot(pool, journal, bucket_ptr, index, &key, value)
}

pub fn clear_slot(pool: &Pool, journal: &mut Journal, bucket_ptr: PPtr<PBucket>, index: usize) {
    let offset = slot_offset(bucket_ptr, index);
    {
        let bucket = unsafe { bucket_ptr.get(pool) };
        free_slot_buf(pool, journal, &bucket.slots[index]);
    }
    journal.snapshot(pool, offset, std::mem::size_of::<CSlot>());
    let bucket = unsafe { bucket_ptr.get_mut(pool) };
    bucket.slots[index] = CSlot::empty();
}

pub fn link_overflow(pool: &Pool, journal: &mut Journal, bucket_ptr: PPtr<PBucket>, next: PPtr<PBucket>) {
    let offset = bucket_ptr.offset() + PBucket::slots_byte_len() as u64;
    journal.snapshot(pool, offset, 8);
    let bucket = unsafe { bucket_ptr.get_mut(pool) };
    bucket.overflow = next;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(bucket_hash(b"hello"), bucket_hash(b"hello"));
    }

    #[test]
    fn index_is_within_table_bounds() {
        assert!(bucket_index(b"any key") < NUM_BUCKETS);
    }
}
