//! Iterator protocol (spec §4.G).
//!
//! Grounded in `original_source/src/iterator.h`'s `iterator_base` /
//! `write_iterator_base` split, reshaped as two Rust traits instead of
//! C++ virtual inheritance: [`ReadIterator`] covers the read-only cursor
//! surface; [`WriteIterator`] extends it with the staged-write change log
//! and commit/abort. Engines return `Box<dyn ReadIterator>` /
//! `Box<dyn WriteIterator>` from [`crate::engine::Engine::new_const_iterator`]
//! / [`crate::engine::Engine::new_iterator`].
//!
//! Unlike the original's `string_view`/`slice` borrows into persistent
//! memory, `key()` and `read_range()` here return owned `Vec<u8>` copies:
//! a borrow tied to the lifetime of a `Box<dyn Trait>` behind a trait
//! object can't be expressed without GATs, and engines already hold their
//! own locks/snapshots for the iterator's lifetime, so a copy costs little
//! next to the concurrency control already in place.

use crate::error::Result;

/// A read-only cursor over an engine's logical key space.
pub trait ReadIterator {
    /// Exact-match positioning. `NotFound` leaves the cursor unmoved.
    fn seek(&mut self, key: &[u8]) -> Result<()>;

    /// Positions on the greatest key strictly less than `key` (ordered
    /// engines only; `NotSupported` otherwise).
    fn seek_lower(&mut self, key: &[u8]) -> Result<()>;

    /// Positions on the greatest key `<= key`.
    fn seek_lower_eq(&mut self, key: &[u8]) -> Result<()>;

    /// Positions on the least key strictly greater than `key`.
    fn seek_higher(&mut self, key: &[u8]) -> Result<()>;

    /// Positions on the least key `>= key`.
    fn seek_higher_eq(&mut self, key: &[u8]) -> Result<()>;

    fn seek_to_first(&mut self) -> Result<()>;
    fn seek_to_last(&mut self) -> Result<()>;

    /// Steps forward. `NotFound` when already off the end.
    fn next(&mut self) -> Result<()>;
    /// Steps backward. `NotFound` when already off the start.
    fn prev(&mut self) -> Result<()>;

    /// The key at the current position.
    fn key(&self) -> Result<Vec<u8>>;

    /// A copy of `[pos, pos+n)` of the current value. `InvalidArgument`
    /// when the range falls outside the value.
    fn read_range(&self, pos: usize, n: usize) -> Result<Vec<u8>>;
}

/// A read-write cursor (spec §4.G).
///
/// `write_range` stages a pending overwrite in a volatile change log of
/// `(buffer, position)` pairs rather than touching persistent memory
/// immediately; `commit` applies the whole log inside one transaction,
/// snapshotting the affected ranges first. The iterator remembers the key
/// it was positioned on at the first write (`snapshotted_key`) so cursor
/// movement between `write_range` calls doesn't lose track of the target
/// entry.
pub trait WriteIterator: ReadIterator {
    /// Stages a write over `[pos, pos+n)` of the current value and
    /// returns a writable scratch buffer (pre-populated with the current
    /// bytes in that range) for the caller to mutate in place.
    fn write_range(&mut self, pos: usize, n: usize) -> Result<&mut [u8]>;

    /// Applies every staged write inside one transaction and clears the
    /// change log.
    fn commit(&mut self) -> Result<()>;

    /// Discards the change log. No persistent effect.
    fn abort(&mut self);
}
