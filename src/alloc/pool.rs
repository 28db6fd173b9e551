//! Persistent Memory Region (spec §4.A).
//!
//! A `Pool` is a file-backed, byte-addressable arena mapped into the
//! address space with `memmap`, carrying a fixed layout tag, one root
//! offset slot per registered engine kind, and a transactional free-list
//! allocator (see [`super::allocator`]).
//!
//! This plays the role Corundum's `MemPool` trait plays for a generic
//! family of allocators, narrowed to one concrete, mmap-backed pool type,
//! since spec §4.A describes a single PMR shape rather than Corundum's
//! pluggable-allocator universe.

use std::fs::OpenOptions;
use std::mem;
use std::path::{Path, PathBuf};

use memmap::MmapMut;

use crate::error::{EngineError, Result};
use crate::stm::Journal;

/// 8-byte layout tag stamped into every pool file (spec §6: `"pmemkv"`).
pub const LAYOUT_TAG: [u8; 8] = *b"pmemkv01";

/// Smallest pool size this crate will create (spec §4.A: "Creation with a
/// too-small size fails with `InvalidArgument`").
pub const MIN_POOL_SIZE: u64 = 4096;

/// Number of root slots carried in the header, one per [`EngineKind`].
pub const MAX_ENGINE_KINDS: usize = 4;

/// Fixed layout tags ordering the root object (spec §6: "Root object: an
/// opaque pointer for each engine type (unused ones are null)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineKind {
    BTree = 0,
    HashMap = 1,
}

#[repr(C)]
struct RawHeader {
    layout_tag: [u8; 8],
    size: u64,
    alloc_head: u64,
    roots: [u64; MAX_ENGINE_KINDS],
}

const HEADER_SIZE: usize = mem::size_of::<RawHeader>();
const ALLOC_HEAD_OFFSET: u64 = 16;
const ROOTS_OFFSET: u64 = 24;

/// A file-backed, crash-consistent memory arena (spec §4.A).
pub struct Pool {
    mmap: MmapMut,
    path: PathBuf,
}

impl Pool {
    /// Creates a fresh pool file of `size` bytes at `path`, formats its
    /// header, and initializes the allocator free list to span the whole
    /// data region.
    pub fn create(path: &Path, size: u64) -> Result<Pool> {
        if size < MIN_POOL_SIZE {
            return Err(EngineError::InvalidArgument(format!(
                "pool size {} is below the minimum of {}",
                size, MIN_POOL_SIZE
            )));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size)?;
        let mut mmap = unsafe { memmap::MmapOptions::new().map_mut(&file)? };

        let data_start = HEADER_SIZE as u64;
        let header = RawHeader {
            layout_tag: LAYOUT_TAG,
            size,
            alloc_head: data_start,
            roots: [0; MAX_ENGINE_KINDS],
        };
        unsafe {
            std::ptr::write(mmap.as_mut_ptr() as *mut RawHeader, header);
        }
        // The entire data region starts life as one free block.
        super::allocator::format_free_list(&mut mmap, data_start, size - data_start);
        mmap.flush()?;

        Ok(Pool {
            mmap,
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing pool file, validating its layout tag.
    pub fn open(path: &Path) -> Result<Pool> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { memmap::MmapOptions::new().map_mut(&file)? };
        if mmap.len() < HEADER_SIZE {
            return Err(EngineError::WrongEngine(
                "file too small to contain a pool header".into(),
            ));
        }
        let tag = &mmap[0..8];
        if tag != LAYOUT_TAG {
            return Err(EngineError::WrongEngine(format!(
                "unrecognized pool layout tag {:?}",
                tag
            )));
        }
        Ok(Pool {
            mmap,
            path: path.to_path_buf(),
        })
    }

    /// Opens `path` if it exists (and `force_create` is false), otherwise
    /// creates it fresh. Mirrors spec §4.C's `force_create` / `size`
    /// contract for engine construction.
    pub fn open_or_create(path: &Path, size: Option<u64>, force_create: bool) -> Result<Pool> {
        if !force_create && path.exists() {
            Pool::open(path)
        } else {
            let size = size.ok_or_else(|| {
                EngineError::InvalidArgument("size is required when creating a pool".into())
            })?;
            Pool::create(path, size)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.header().size
    }

    pub fn base_ptr(&self) -> *mut u8 {
        self.mmap.as_ptr() as *mut u8
    }

    fn header(&self) -> &RawHeader {
        unsafe { &*(self.mmap.as_ptr() as *const RawHeader) }
    }

    fn header_mut(&self) -> &mut RawHeader {
        unsafe { &mut *(self.mmap.as_ptr() as *mut RawHeader) }
    }

    pub(crate) fn alloc_head(&self) -> u64 {
        self.header().alloc_head
    }

    pub(crate) fn set_alloc_head(&self, journal: &mut Journal, new_head: u64) {
        journal.snapshot(self, ALLOC_HEAD_OFFSET, 8);
        self.header_mut().alloc_head = new_head;
    }

    /// Returns the persistent root offset registered for `kind`, or `0`
    /// (null) if none has been installed yet.
    pub fn root(&self, kind: EngineKind) -> u64 {
        self.header().roots[kind as usize]
    }

    /// Installs `offset` as the root for `kind`, snapshotting the slot
    /// first so a crash mid-write leaves the previous root intact.
    pub fn set_root(&self, journal: &mut Journal, kind: EngineKind, offset: u64) {
        let slot_offset = ROOTS_OFFSET + (kind as u64) * 8;
        journal.snapshot(self, slot_offset, 8);
        self.header_mut().roots[kind as usize] = offset;
    }

    /// Reads `len` bytes at `offset` into an owned buffer. Used by the
    /// journal to build undo records.
    pub(crate) fn read_bytes(&self, offset: u64, len: usize) -> Vec<u8> {
        unsafe { std::slice::from_raw_parts(self.base_ptr().add(offset as usize), len).to_vec() }
    }

    /// Overwrites `len` bytes at `offset` with `bytes`. Used by the
    /// journal to replay undo records on abort.
    pub(crate) fn write_bytes(&self, offset: u64, bytes: &[u8]) {
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.base_ptr().add(offset as usize),
                bytes.len(),
            );
        }
    }

    /// Flushes the whole mapping to the backing file. Called at the end
    /// of a committed transaction.
    pub fn flush(&self) -> Result<()> {
        // `Mmap::flush` requires `&self`, but the underlying pages are
        // shared mutable state synchronized by the transaction discipline
        // rather than Rust's borrow checker.
        let mmap = unsafe { &*(&self.mmap as *const MmapMut) };
        mmap.flush()?;
        Ok(())
    }
}

// SAFETY: all mutation of the mapped bytes goes through the transaction
// runtime (snapshot-before-write) or the single-writer engine-level
// locks described in spec §5; `Pool` itself holds no interior state that
// requires additional synchronization beyond those contracts.
unsafe impl Send for Pool {}
unsafe impl Sync for Pool {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_too_small_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool");
        assert!(matches!(
            Pool::create(&path, 16),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn create_then_open_round_trips_roots() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool");
        {
            let pool = Pool::create(&path, 1 << 16).unwrap();
            assert_eq!(pool.root(EngineKind::BTree), 0);
        }
        let pool = Pool::open(&path).unwrap();
        assert_eq!(pool.root(EngineKind::BTree), 0);
        assert_eq!(pool.root(EngineKind::HashMap), 0);
    }

    #[test]
    fn open_rejects_wrong_layout_tag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();
        assert!(matches!(Pool::open(&path), Err(EngineError::WrongEngine(_))));
    }
}
