//! Iterator protocol implementation for [`super::BTreeEngine`] (spec
//! §4.G). Positions are a sorted snapshot of keys taken when the iterator
//! is constructed; each operation re-resolves the current value for the
//! positioned key through the engine, so a concurrent `remove` of that
//! key surfaces as `NotFound` rather than stale data.

use std::cmp::Ordering;

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::iterator::{ReadIterator, WriteIterator};

use super::BTreeEngine;
use super::tree::Comparator;

pub struct BTreeReadIter<'a> {
    pub(super) engine: &'a BTreeEngine,
    pub(super) keys: Vec<Vec<u8>>,
    pub(super) pos: Option<usize>,
}

impl<'a> BTreeReadIter<'a> {
    pub(super) fn new(engine: &'a BTreeEngine, keys: Vec<Vec<u8>>) -> Self {
        BTreeReadIter { engine, keys, pos: None }
    }

    fn cmp(&self) -> &Comparator {
        &self.engine.cmp
    }

    fn lower_bound(&self, key: &[u8]) -> usize {
        // first index with keys[idx] >= key
        let cmp = self.cmp();
        let mut lo = 0usize;
        let mut hi = self.keys.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp(&self.keys[mid], key) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    fn upper_bound(&self, key: &[u8]) -> usize {
        // first index with keys[idx] > key
        let cmp = self.cmp();
        let mut lo = 0usize;
        let mut hi = self.keys.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp(&self.keys[mid], key) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }
}

impl<'a> ReadIterator for BTreeReadIter<'a> {
    fn seek(&mut self, key: &[u8]) -> Result<()> {
        let idx = self.lower_bound(key);
        if idx < self.keys.len() && (self.cmp())(&self.keys[idx], key) == Ordering::Equal {
            self.pos = Some(idx);
            Ok(())
        } else {
            Err(EngineError::NotFound)
        }
    }

    fn seek_lower(&mut self, key: &[u8]) -> Result<()> {
        let idx = self.lower_bound(key);
        if idx == 0 {
            Err(EngineError::NotFound)
        } else {
            self.pos = Some(idx - 1);
            Ok(())
        }
    }

    fn seek_lower_eq(&mut self, key: &[u8]) -> Result<()> {
        let idx = self.upper_bound(key);
        if idx == 0 {
            Err(EngineError::NotFound)
        } else {
            self.pos = Some(idx - 1);
            Ok(())
        }
    }

    fn seek_higher(&mut self, key: &[u8]) -> Result<()> {
        let idx = self.upper_bound(key);
        if idx >= self.keys.len() {
            Err(EngineError::NotFound)
        } else {
            self.pos = Some(idx);
            Ok(())
        }
    }

    fn seek_higher_eq(&mut self, key: &[u8]) -> Result<()> {
        let idx = self.lower_bound(key);
        if idx >= self.keys.len() {
            Err(EngineError::NotFound)
        } else {
            self.pos = Some(idx);
            Ok(())
        }
    }

    fn seek_to_first(&mut self) -> Result<()> {
        if self.keys.is_empty() {
            Err(EngineError::NotFound)
        } else {
            self.pos = Some(0);
            Ok(())
        }
    }

    fn seek_to_last(&mut self) -> Result<()> {
        if self.keys.is_empty() {
            Err(EngineError::NotFound)
        } else {
            self.pos = Some(self.keys.len() - 1);
            Ok(())
        }
    }

    fn next(&mut self) -> Result<()> {
        match self.pos {
            Some(p) if p + 1 < self.keys.len() => {
                self.pos = Some(p + 1);
                Ok(())
            }
            _ => Err(EngineError::NotFound),
        }
    }

    fn prev(&mut self) -> Result<()> {
        match self.pos {
            Some(p) if p > 0 => {
                self.pos = Some(p - 1);
                Ok(())
            }
            _ => Err(EngineError::NotFound),
        }
    }

    fn key(&self) -> Result<Vec<u8>> {
        match self.pos {
            Some(p) => Ok(self.keys[p].clone()),
            None => Err(EngineError::InvalidArgument("iterator is not positioned".into())),
        }
    }

    fn read_range(&self, pos: usize, n: usize) -> Result<Vec<u8>> {
        let key = self.key()?;
        let mut value = None;
        self.engine.get(&key, &mut |v| value = Some(v.to_vec()))?;
        let value = value.ok_or(EngineError::NotFound)?;
        if pos.checked_add(n).map(|end| end > value.len()).unwrap_or(true) {
            return Err(EngineError::InvalidArgument(format!(
                "range [{}, {}) out of bounds for value of length {}",
                pos,
                pos + n,
                value.len()
            )));
        }
        Ok(value[pos..pos + n].to_vec())
    }
}

/// Read-write cursor (spec §4.G). `log` accumulates `(buffer, position)`
/// pairs until `commit`; `snapshotted_key` is the key the cursor was on
/// at the first `write_range` call, so later cursor movement doesn't lose
/// track of the entry the pending writes target.
pub struct BTreeWriteIter<'a> {
    pub(super) read: BTreeReadIter<'a>,
    pub(super) log: Vec<(Vec<u8>, usize)>,
    pub(super) snapshotted_key: Option<Vec<u8>>,
}

impl<'a> BTreeWriteIter<'a> {
    pub(super) fn new(engine: &'a BTreeEngine, keys: Vec<Vec<u8>>) -> Self {
        BTreeWriteIter {
            read: BTreeReadIter::new(engine, keys),
            log: Vec::new(),
            snapshotted_key: None,
        }
    }
}

impl<'a> ReadIterator for BTreeWriteIter<'a> {
    fn seek(&mut self, key: &[u8]) -> Result<()> {
        self.read.seek(key)
    }
    fn seek_lower(&mut self, key: &[u8]) -> Result<()> {
        self.read.seek_lower(key)
    }
    fn seek_lower_eq(&mut self, key: &[u8]) -> Result<()> {
        self.read.seek_lower_eq(key)
    }
    fn seek_higher(&mut self, key: &[u8]) -> Result<()> {
        self.read.seek_higher(key)
    }
    fn seek_higher_eq(&mut self, key: &[u8]) -> Result<()> {
        self.read.seek_higher_eq(key)
    }
    fn seek_to_first(&mut self) -> Result<()> {
        self.read.seek_to_first()
    }
    fn seek_to_last(&mut self) -> Result<()> {
        self.read.seek_to_last()
    }
    fn next(&mut self) -> Result<()> {
        self.read.next()
    }
    fn prev(&mut self) -> Result<()> {
        self.read.prev()
    }
    fn key(&self) -> Result<Vec<u8>> {
        self.read.key()
    }
    fn read_range(&self, pos: usize, n: usize) -> Result<Vec<u8>> {
        self.read.read_range(pos, n)
    }
}

impl<'a> WriteIterator for BTreeWriteIter<'a> {
    fn write_range(&mut self, pos: usize, n: usize) -> Result<&mut [u8]> {
        let key = self.read.key()?;
        let current = self.read.read_range(0, {
            let mut len = None;
            self.read.engine.get(&key, &mut |v| len = Some(v.len()))?;
            len.ok_or(EngineError::NotFound)?
        })?;
        if pos.checked_add(n).map(|end| end > current.len()).unwrap_or(true) {
            return Err(EngineError::InvalidArgument(format!(
                "write range [{}, {}) out of bounds for value of length {}",
                pos,
                pos + n,
                current.len()
            )));
        }
        if self.snapshotted_key.is_none() {
            self.snapshotted_key = Some(key);
        }
        let buf = current[pos..pos + n].to_vec();
        self.log.push((buf, pos));
        Ok(&mut self.log.last_mut().unwrap().0)
    }

    fn commit(&mut self) -> Result<()> {
        if self.log.is_empty() {
            return Ok(());
        }
        let key = self
            .snapshotted_key
            .clone()
            .ok_or_else(|| EngineError::InvalidArgument("no write staged".into()))?;
        self.read.engine.apply_write_log(&key, &self.log)?;
        self.log.clear();
        Ok(())
    }

    fn abort(&mut self) {
        self.log.clear();
    }
}
