//! Persistent leaf layout (spec §4.E).
//!
//! Grounded in `original_source/src/pmemkv.h`'s `KVSlot`/`KVLeaf`: a fixed
//! array of `LEAF_KEYS` slots, each a `(Pearson-hash, key, value)` triple,
//! plus a `next` pointer threading every leaf into one unsorted singly
//! linked list off the pool root. The original stores the key/value pair
//! in a single `persistent_ptr<char[]>` buffer with the key NUL-terminated;
//! this crate keeps explicit `key_len`/`val_len` fields instead, since
//! spec §3 requires binary-safe keys and values (NUL is a valid byte, so
//! it cannot serve as a separator).

use crate::alloc::{Pool, PPtr};
use crate::error::Result;
use crate::stm::Journal;

/// Maximum occupied slots per leaf (spec §4.E).
pub const LEAF_KEYS: usize = 48;

/// A single leaf slot: empty, or holding one `(hash, key, value)` triple
/// whose bytes live in a separately allocated buffer (key bytes followed
/// immediately by value bytes; lengths are explicit, so no in-band
/// separator is needed).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PSlot {
    pub occupied: u8,
    pub hash: u8,
    _pad: [u8; 6],
    pub key_len: u32,
    pub val_len: u32,
    pub buf: PPtr<u8>,
}

impl PSlot {
    pub const fn empty() -> Self {
        PSlot {
            occupied: 0,
            hash: 0,
            _pad: [0; 6],
            key_len: 0,
            val_len: 0,
            buf: PPtr::null(),
        }
    }

    pub fn buf_len(&self) -> usize {
        self.key_len as usize + self.val_len as usize
    }
}

/// A persistent leaf: up to [`LEAF_KEYS`] slots plus a link to the next
/// leaf in the pool-wide unsorted list (spec §4.E).
#[repr(C)]
pub struct PLeaf {
    pub slots: [PSlot; LEAF_KEYS],
    pub next: PPtr<PLeaf>,
}

impl PLeaf {
    pub fn byte_len() -> usize {
        std::mem::size_of::<PLeaf>()
    }

    fn slots_byte_len() -> usize {
        std::mem::size_of::<[PSlot; LEAF_KEYS]>()
    }
}

/// Allocates and zero-initializes a fresh persistent leaf, without
/// linking it into any list. Must run inside an active transaction.
pub fn allocate_leaf(pool: &Pool, journal: &mut Journal) -> Result<PPtr<PLeaf>> {
    let offset = pool.reserve(journal, PLeaf::byte_len())?;
    let pptr = PPtr::<PLeaf>::from_offset(offset);
    unsafe {
        std::ptr::write(
            pptr.get_mut(pool) as *mut PLeaf,
            PLeaf {
                slots: [PSlot::empty(); LEAF_KEYS],
                next: PPtr::null(),
            },
        );
    }
    Ok(pptr)
}

/// Reads the concatenated `key ++ value` bytes referenced by `slot`.
pub fn read_kv(pool: &Pool, slot: &PSlot) -> Vec<u8> {
    if slot.buf.is_null() {
        return Vec::new();
    }
    pool.read_bytes(slot.buf.offset(), slot.buf_len())
}

/// Frees the slot's out-of-line buffer, if any, inside the active
/// transaction's journal. Caller is responsible for clearing `occupied`.
pub fn free_slot_buf(pool: &Pool, journal: &mut Journal, slot: &PSlot) {
    if !slot.buf.is_null() {
        pool.release(journal, slot.buf.offset(), slot.buf_len());
    }
}

/// Writes `key ++ value` into slot `index` of the leaf at `leaf_ptr`,
/// allocating a fresh out-of-line buffer for it. The slot must already be
/// empty (its previous buffer, if any, freed by the caller). Must run
/// inside an active transaction; snapshots the slot before writing it.
pub fn write_slot(
    pool: &Pool,
    journal: &mut Journal,
    leaf_ptr: PPtr<PLeaf>,
    index: usize,
    hash: u8,
    key: &[u8],
    value: &[u8],
) -> Result<()> {
    let mut kv = Vec::with_capacity(key.len() + value.len());
    kv.extend_from_slice(key);
    kv.extend_from_slice(value);
    let buf_offset = if kv.is_empty() {
        0
    } else {
        pool.reserve(journal, kv.len())?
    };
    if !kv.is_empty() {
        pool.write_bytes(buf_offset, &kv);
    }

    let slot_offset = slot_offset(leaf_ptr, index);
    journal.snapshot(pool, slot_offset, std::mem::size_of::<PSlot>());
    let leaf = unsafe { leaf_ptr.get_mut(pool) };
    leaf.slots[index] = PSlot {
        occupied: 1,
        hash,
        _pad: [0; 6],
        key_len: key.len() as u32,
        val_len: value.len() as u32,
        buf: PPtr::from_offset(buf_offset),
    };
    Ok(())
}

/// Overwrites the value of an already-occupied slot in place, keeping its
/// key and hash. Reallocates the out-of-line buffer when the combined
/// length changes. Must run inside an active transaction.
pub fn overwrite_slot_value(
    pool: &Pool,
    journal: &mut Journal,
    leaf_ptr: PPtr<PLeaf>,
    index: usize,
    value: &[u8],
) -> Result<()> {
    let (hash, key) = {
        let leaf = unsafe { leaf_ptr.get(pool) };
        let slot = &leaf.slots[index];
        let kv = read_kv(pool, slot);
        (slot.hash, kv[..slot.key_len as usize].to_vec())
    };
    {
        let leaf = unsafe { leaf_ptr.get(pool) };
        let slot = &leaf.slots[index];
        free_slot_buf(pool, journal, slot);
    }
    write_slot(pool, journal, leaf_ptr, index, hash, &key, value)
}

/// Clears slot `index`, freeing its buffer. Must run inside an active
/// transaction.
pub fn clear_slot(pool: &Pool, journal: &mut Journal, leaf_ptr: PPtr<PLeaf>, index: usize) {
    let slot_offset = slot_offset(leaf_ptr, index);
    {
        let leaf = unsafe { leaf_ptr.get(pool) };
        free_slot_buf(pool, journal, &leaf.slots[index]);
    }
    journal.snapshot(pool, slot_offset, std::mem::size_of::<PSlot>());
    let leaf = unsafe { leaf_ptr.get_mut(pool) };
    leaf.slots[index] = PSlot::empty();
}

fn slot_offset(leaf_ptr: PPtr<PLeaf>, index: usize) -> u64 {
    leaf_ptr.offset() + (index * std::mem::size_of::<PSlot>()) as u64
}

/// Frees every occupied slot's out-of-line buffer and blanks the whole
/// slot array in a single snapshot, leaving the leaf empty. Used when a
/// full leaf is about to be rewritten during a split.
pub fn clear_all_slots(pool: &Pool, journal: &mut Journal, leaf_ptr: PPtr<PLeaf>) {
    journal.snapshot(pool, leaf_ptr.offset(), PLeaf::slots_byte_len());
    let leaf = unsafe { leaf_ptr.get_mut(pool) };
    for slot in leaf.slots.iter() {
        free_slot_buf(pool, journal, slot);
    }
    for slot in leaf.slots.iter_mut() {
        *slot = PSlot::empty();
    }
}

/// Links `leaf_ptr.next = new_next`, snapshotting the field first.
pub fn link_next(pool: &Pool, journal: &mut Journal, leaf_ptr: PPtr<PLeaf>, new_next: PPtr<PLeaf>) {
    let next_field_offset = leaf_ptr.offset() + PLeaf::slots_byte_len() as u64;
    journal.snapshot(pool, next_field_offset, 8);
    let leaf = unsafe { leaf_ptr.get_mut(pool) };
    leaf.next = new_next;
}
