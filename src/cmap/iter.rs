//! Iterator protocol implementation for [`super::CMapEngine`] (spec §4.G).
//! Unlike the B+-tree's, this enumeration order is bucket-then-chain
//! order, stable for a given table snapshot, but not a key ordering, so
//! the directional range-positioning methods (`seek_lower`/`seek_higher`
//! and friends) return `NotSupported`, matching the engine's own
//! `is_ordered() == false`.

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::iterator::{ReadIterator, WriteIterator};

use super::CMapEngine;

pub struct CMapReadIter<'a> {
    engine: &'a CMapEngine,
    keys: Vec<Vec<u8>>,
    pos: Option<usize>,
}

impl<'a> CMapReadIter<'a> {
    pub(super) fn new(engine: &'a CMapEngine, keys: Vec<Vec<u8>>) -> Self {
        CMapReadIter { engine, keys, pos: None }
    }
}

impl<'a> ReadIterator for CMapReadIter<'a> {
    fn seek(&mut self, key: &[u8]) -> Result<()> {
        match self.keys.iter().position(|k| k == key) {
            Some(idx) => {
                self.pos = Some(idx);
                Ok(())
            }
            None => Err(EngineError::NotFound),
        }
    }

    fn seek_lower(&mut self, _key: &[u8]) -> Result<()> {
        Err(EngineError::NotSupported)
    }
    fn seek_lower_eq(&mut self, _key: &[u8]) -> Result<()> {
        Err(EngineError::NotSupported)
    }
    fn seek_higher(&mut self, _key: &[u8]) -> Result<()> {
        Err(EngineError::NotSupported)
    }
    fn seek_higher_eq(&mut self, _key: &[u8]) -> Result<()> {
        Err(EngineError::NotSupported)
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

pub struct CMapWriteIter<'a> {
    read: CMapReadIter<'a>,
    log: Vec<(Vec<u8>, usize)>,
    snapshotted_key: Option<Vec<u8>>,
}

impl<'a> CMapWriteIter<'a> {
    pub(super) fn new(engine: &'a CMapEngine, keys: Vec<Vec<u8>>) -> Self {
        CMapWriteIter {
            read: CMapReadIter::new(engine, keys),
            log: Vec::new(),
            snapshotted_key: None,
        }
    }
}

impl<'a> ReadIterator for CMapWriteIter<'a> {
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

impl<'a> WriteIterator for CMapWriteIter<'a> {
    fn write_range(&mut self, pos: usize, n: usize) -> Result<&mut [u8]> {
        let key = self.read.key()?;
        let mut len = None;
        self.read.engine.get(&key, &mut |v| len = Some(v.len()))?;
        let len = len.ok_or(EngineError::NotFound)?;
        if pos.checked_add(n).map(|end| end > len).unwrap_or(true) {
            return Err(EngineError::InvalidArgument(format!(
                "write range [{}, {}) out of bounds for value of length {}",
                pos,
                pos + n,
                len
            )));
        }
        let current = self.read.read_range(pos, n)?;
        if self.snapshotted_key.is_none() {
            self.snapshotted_key = Some(key);
        }
        self.log.push((current, pos));
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
