//! The engine trait every storage engine satisfies (spec §4.D).
//!
//! "Engine" is one capability set (`count_all`, `get_all`, `exists`,
//! `get`, `put`, `remove`, iteration), with the ordered range operations
//! as part of the *same* trait, default-implemented to return
//! `NotSupported` (spec Design Notes: "Implement as a trait / interface
//! with a tag, not as deep inheritance"; mirrors the original `engine`
//! base class's virtual range methods, which only `stree`/the sorted
//! engines override). [`crate::btree::BTreeEngine`] overrides the range
//! methods; [`crate::cmap::CMapEngine`] leaves the defaults in place.

use crate::error::{EngineError, Result};
use crate::iterator::{ReadIterator, WriteIterator};

/// A callback passed to `get_all`/range-scan operations. Returning
/// non-zero stops iteration early (`Status::StoppedByCb`, spec §4.D).
pub type KvCallback<'a> = dyn FnMut(&[u8], &[u8]) -> i32 + 'a;

/// The uniform storage surface (spec §4.D).
pub trait Engine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of distinct keys currently stored (spec invariant 2).
    fn count_all(&self) -> Result<usize>;

    /// Visits every `(key, value)` pair exactly once, in unspecified
    /// order. Stops early and returns `StoppedByCb` if `callback` returns
    /// non-zero (spec §4.D callback contract).
    fn get_all(&self, callback: &mut KvCallback<'_>) -> Result<()>;

    /// `Ok(())` if `key` is present, `Err(NotFound)` otherwise.
    fn exists(&self, key: &[u8]) -> Result<()>;

    /// Looks up `key`, invoking `callback` with its value on a hit.
    fn get(&self, key: &[u8], callback: &mut dyn FnMut(&[u8])) -> Result<()>;

    /// Copies the value for `key` into `buf`, returning the number of
    /// bytes copied. When the value is larger than `buf`,
    /// `Err(EngineError::ValueTooLarge(needed))` is returned so the
    /// caller can retry with a buffer of at least `needed` bytes (spec §6
    /// `get_copy`).
    fn get_copy(&self, key: &[u8], buf: &mut [u8]) -> Result<usize> {
        let mut needed = 0usize;
        let mut copied = None;
        self.get(key, &mut |value| {
            needed = value.len();
            if value.len() <= buf.len() {
                buf[..value.len()].copy_from_slice(value);
                copied = Some(value.len());
            }
        })?;
        copied.ok_or(EngineError::ValueTooLarge(needed))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// `Ok(())` if `key` was present and removed, `Err(NotFound)` if it
    /// was absent.
    fn remove(&self, key: &[u8]) -> Result<()>;

    /// Reclaims space in the `[start_percent, start_percent+amount_percent)`
    /// window of the engine's internal storage (spec §4.D, §4.F).
    fn defrag(&self, start_percent: u8, amount_percent: u8) -> Result<()>;

    fn new_iterator(&self) -> Result<Box<dyn WriteIterator + '_>>;
    fn new_const_iterator(&self) -> Result<Box<dyn ReadIterator + '_>>;

    /// Whether this engine supports the ordered range operations below.
    /// Overridden by `true` for ordered engines.
    fn is_ordered(&self) -> bool {
        false
    }

    /// Count of keys strictly greater than `key`.
    fn count_above(&self, _key: &[u8]) -> Result<usize> {
        Err(EngineError::NotSupported)
    }
    /// Count of keys `>= key`.
    fn count_equal_above(&self, _key: &[u8]) -> Result<usize> {
        Err(EngineError::NotSupported)
    }
    /// Count of keys strictly less than `key`.
    fn count_below(&self, _key: &[u8]) -> Result<usize> {
        Err(EngineError::NotSupported)
    }
    /// Count of keys `<= key`.
    fn count_equal_below(&self, _key: &[u8]) -> Result<usize> {
        Err(EngineError::NotSupported)
    }
    /// Count of keys `a < k < b` (empty if `a >= b`).
    fn count_between(&self, _a: &[u8], _b: &[u8]) -> Result<usize> {
        Err(EngineError::NotSupported)
    }

    fn get_above(&self, _key: &[u8], _callback: &mut KvCallback<'_>) -> Result<()> {
        Err(EngineError::NotSupported)
    }
    fn get_equal_above(&self, _key: &[u8], _callback: &mut KvCallback<'_>) -> Result<()> {
        Err(EngineError::NotSupported)
    }
    fn get_below(&self, _key: &[u8], _callback: &mut KvCallback<'_>) -> Result<()> {
        Err(EngineError::NotSupported)
    }
    fn get_equal_below(&self, _key: &[u8], _callback: &mut KvCallback<'_>) -> Result<()> {
        Err(EngineError::NotSupported)
    }
    fn get_between(&self, _a: &[u8], _b: &[u8], _callback: &mut KvCallback<'_>) -> Result<()> {
        Err(EngineError::NotSupported)
    }
}
