//! Transactional free-list allocator over a [`Pool`]'s data region
//! (spec §4.A).
//!
//! A first-fit allocator over a singly-linked list of free blocks, each
//! written in place at the start of the free bytes it describes, the
//! classic small-allocator layout, adapted to run entirely through the
//! snapshot-before-mutate discipline of [`Journal`] so a crash mid-split
//! or mid-unlink never corrupts the list (spec §4.B, invariant 4: "no
//! leaked allocations beyond the prealloc free-list that recovery
//! explicitly reclaims").
//!
//! This crate does not coalesce adjacent freed blocks; freed space is
//! prepended to the free list as-is. Engines that churn heavily (the
//! B+-tree) instead reuse whole freed leaves via their own prealloc list
//! (spec §4.E) rather than relying on allocator-level coalescing.

use std::mem;

use memmap::MmapMut;

use crate::error::{EngineError, Result};
use crate::stm::Journal;

use super::pool::Pool;

const ALIGN: usize = 8;

#[repr(C)]
#[derive(Clone, Copy)]
struct FreeBlock {
    len: u64,
    next: u64,
}

const BLOCK_META: usize = mem::size_of::<FreeBlock>();

fn align_up(n: usize) -> usize {
    (n + ALIGN - 1) & !(ALIGN - 1)
}

/// Writes the single free block that spans a freshly created pool's data
/// region. Called once, directly against the raw mapping, before any
/// transaction machinery exists.
pub(crate) fn format_free_list(mmap: &mut MmapMut, offset: u64, len: u64) {
    let block = FreeBlock { len, next: 0 };
    unsafe {
        std::ptr::write(
            mmap.as_mut_ptr().add(offset as usize) as *mut FreeBlock,
            block,
        );
    }
}

impl Pool {
    unsafe fn free_block_at(&self, offset: u64) -> FreeBlock {
        std::ptr::read(self.base_ptr().add(offset as usize) as *const FreeBlock)
    }

    unsafe fn write_free_block_at(&self, offset: u64, block: FreeBlock) {
        std::ptr::write(self.base_ptr().add(offset as usize) as *mut FreeBlock, block);
    }

    /// Rewrites the `next` link of the node at `prev_offset` (or the
    /// allocator head, if `prev_offset == 0`) to point at `new_next`.
    fn relink(&self, journal: &mut Journal, prev_offset: u64, new_next: u64) {
        if prev_offset == 0 {
            self.set_alloc_head(journal, new_next);
        } else {
            journal.snapshot(self, prev_offset, BLOCK_META);
            unsafe {
                let mut block = self.free_block_at(prev_offset);
                block.next = new_next;
                self.write_free_block_at(prev_offset, block);
            }
        }
    }

    /// Reserves at least `len` bytes, returning the offset of the
    /// allocation. First-fit over the free list; splits the matched block
    /// when the remainder is large enough to host another free node.
    pub fn reserve(&self, journal: &mut Journal, len: usize) -> Result<u64> {
        let want = align_up(len).max(BLOCK_META);
        let mut prev_offset = 0u64;
        let mut cur = self.alloc_head();

        while cur != 0 {
            let block = unsafe { self.free_block_at(cur) };
            let block_len = block.len as usize;

            if block_len >= want {
                let remainder = block_len - want;
                if remainder >= BLOCK_META + ALIGN {
                    let new_node_offset = cur + want as u64;
                    unsafe {
                        self.write_free_block_at(
                            new_node_offset,
                            FreeBlock {
                                len: remainder as u64,
                                next: block.next,
                            },
                        );
                    }
                    self.relink(journal, prev_offset, new_node_offset);
                } else {
                    self.relink(journal, prev_offset, block.next);
                }
                // The bytes at `cur` still hold the free-block header the
                // caller is about to overwrite with real payload. Snapshot
                // them so an abort later in this transaction restores a
                // valid free list even though the list-removal undo above
                // only covers the links pointing *at* `cur`, not its body.
                journal.snapshot(self, cur, BLOCK_META);
                #[cfg(feature = "verbose")]
                println!("          ALLOC      offset: {}, len: {}", cur, want);
                return Ok(cur);
            }

            prev_offset = cur;
            cur = block.next;
        }

        Err(EngineError::OutOfMemory)
    }

    /// Returns `len` bytes at `offset` to the free list. Prepends rather
    /// than coalesces (see module docs).
    pub fn release(&self, journal: &mut Journal, offset: u64, len: usize) {
        let want = align_up(len).max(BLOCK_META);
        let head = self.alloc_head();
        // The bytes about to be overwritten with a free-block header still
        // hold live caller data until this call returns; snapshot them so
        // an abort later in the transaction restores the freed allocation
        // instead of leaving it clobbered with free-list bookkeeping.
        journal.snapshot(self, offset, BLOCK_META);
        unsafe {
            self.write_free_block_at(
                offset,
                FreeBlock {
                    len: want as u64,
                    next: head,
                },
            );
        }
        self.set_alloc_head(journal, offset);
        #[cfg(feature = "verbose")]
        println!("          FREE       offset: {}, len: {}", offset, want);
    }

    /// Total bytes currently reachable from the free list. Intended for
    /// diagnostics and tests, not the hot path.
    pub fn free_bytes(&self) -> u64 {
        let mut total = 0u64;
        let mut cur = self.alloc_head();
        while cur != 0 {
            let block = unsafe { self.free_block_at(cur) };
            total += block.len;
            cur = block.next;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stm::Transaction;
    use tempfile::tempdir;

    #[test]
    fn reserve_and_release_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool");
        let pool = Pool::create(&path, 1 << 16).unwrap();
        let free_before = pool.free_bytes();

        let offset = Transaction::run(&pool, |j| pool.reserve(j, 128)).unwrap();
        assert!(pool.free_bytes() < free_before);

        Transaction::run(&pool, |j| {
            pool.release(j, offset, 128);
            Ok(())
        })
        .unwrap();
        assert_eq!(pool.free_bytes(), free_before);
    }

    #[test]
    fn exhausting_the_pool_returns_out_of_memory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool");
        let pool = Pool::create(&path, 4096).unwrap();
        let big = pool.size() as usize * 2;
        let result = Transaction::run(&pool, |j| pool.reserve(j, big));
        assert!(matches!(result, Err(EngineError::OutOfMemory)));
    }
}
