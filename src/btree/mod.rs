//! Ordered B+-tree storage engine (spec §4.E).
//!
//! Persistent leaves (see [`leaf`]) form one unsorted singly linked list
//! anchored at the pool's `EngineKind::BTree` root; a volatile routing
//! structure (see [`tree`]) indexes them for ordered lookup and is rebuilt
//! from scratch every time a pool is opened (spec §4.E "Recovery"). A
//! single `parking_lot::RwLock` around the whole volatile+prealloc state
//! gives the single-writer/multi-reader contract spec §5 requires;
//! persistent mutations additionally go through [`crate::stm::Transaction`].

mod leaf;
mod iter;
mod pearson;
mod tree;

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use parking_lot::RwLock;

use crate::alloc::{EngineKind, PPtr, Pool};
use crate::config::{keys, Config};
use crate::engine::{Engine, KvCallback};
use crate::error::{EngineError, Result};
use crate::iterator::{ReadIterator, WriteIterator};
use crate::stm::Transaction;

use leaf::{PLeaf, LEAF_KEYS};
use pearson::pearson_hash;
use tree::{LeafNode, NodeRef, Tree};

pub use iter::{BTreeReadIter, BTreeWriteIter};
pub use tree::{lexicographic, Comparator, ComparatorFn};

/// Volatile state protected by one lock: the routing tree plus the list of
/// known-empty leaves available for reuse (spec §4.E "Prealloc list").
struct State {
    tree: Tree,
    prealloc: Vec<PPtr<PLeaf>>,
}

/// The ordered storage engine (spec §4.E).
pub struct BTreeEngine {
    pool: Pool,
    cmp: Comparator,
    state: RwLock<State>,
    count: AtomicUsize,
}

impl BTreeEngine {
    pub const NAME: &'static str = "btree";

    /// Opens (or creates) a pool per `config` and either formats it with a
    /// single empty leaf or recovers the routing structure by walking the
    /// persistent leaf list (spec §4.E "Recovery").
    pub fn open(config: Config) -> Result<Self> {
        let path = config.get_string(keys::PATH)?.to_string();
        let size = config.get_uint64(keys::SIZE).ok();
        let force_create = config.force_create()?;
        let pool = Pool::open_or_create(std::path::Path::new(&path), size, force_create)?;

        let cmp = resolve_comparator(&config)?;

        let root_offset = pool.root(EngineKind::BTree);
        let (tree, prealloc, count) = if root_offset == 0 {
            let first = Transaction::run(&pool, |j| {
                let ptr = leaf::allocate_leaf(&pool, j)?;
                pool.set_root(j, EngineKind::BTree, ptr.offset());
                Ok(ptr)
            })?;
            (Tree::with_single_leaf(first), Vec::new(), 0usize)
        } else {
            Self::recover(&pool, root_offset, &cmp)?
        };

        log::info!(
            "opened btree engine at {:?}, {} leaves, {} keys",
            pool.path(),
            tree.leaves.len(),
            count
        );

        Ok(BTreeEngine {
            pool,
            cmp,
            state: RwLock::new(State { tree, prealloc }),
            count: AtomicUsize::new(count),
        })
    }

    fn recover(pool: &Pool, root_offset: u64, cmp: &Comparator) -> Result<(Tree, Vec<PPtr<PLeaf>>, usize)> {
        let mut prealloc = Vec::new();
        let mut total = 0usize;
        let mut cursor = PPtr::<PLeaf>::from_offset(root_offset);
        let mut tree: Option<Tree> = None;

        loop {
            let leaf_ref = unsafe { cursor.get(pool) };
            let mut node = LeafNode::empty(cursor, None);
            let mut occupied = 0usize;
            for (i, slot) in leaf_ref.slots.iter().enumerate() {
                if slot.occupied != 0 {
                    let kv = leaf::read_kv(pool, slot);
                    let key = kv[..slot.key_len as usize].to_vec();
                    node.hashes[i] = slot.hash;
                    node.keys[i] = Some(key);
                    occupied += 1;
                }
            }
            total += occupied;
            let next = leaf_ref.next;

            match &mut tree {
                None => {
                    tree = Some(Tree::with_single_leaf(node.pptr));
                    tree.as_mut().unwrap().leaves[0] = node;
                }
                Some(t) => {
                    if occupied == 0 {
                        prealloc.push(node.pptr);
                    } else {
                        let idx = t.leaves.len();
                        t.leaves.push(node);
                        t.route_existing_leaf(idx, cmp);
                    }
                }
            }

            if next.is_null() {
                break;
            }
            cursor = next;
        }

        Ok((tree.expect("root leaf always yields at least one node"), prealloc, total))
    }

    /// Diagnostic summary used by tests and operational logging: total
    /// leaves, how many are on the prealloc list, and how many distinct
    /// keys are stored.
    pub fn stats(&self) -> (usize, usize, usize) {
        let state = self.state.read();
        (
            state.tree.leaves.len(),
            state.prealloc.len(),
            self.count.load(AtomicOrdering::Relaxed),
        )
    }

    fn read_slot_value(&self, leaf_ptr: PPtr<PLeaf>, slot_idx: usize) -> Vec<u8> {
        let leaf_ref = unsafe { leaf_ptr.get(self.pool()) };
        let slot = &leaf_ref.slots[slot_idx];
        let kv = leaf::read_kv(self.pool(), slot);
        kv[slot.key_len as usize..].to_vec()
    }

    fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Splits a full leaf in two, inserting `key`/`value` into whichever
    /// half it belongs, and grafts the new leaf into the routing structure
    /// (spec §4.E "Insertion"). `state` is the already-acquired write lock.
    fn split_leaf_and_insert(
        &self,
        state: &mut State,
        leaf_idx: usize,
        hash: u8,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let old_ptr = state.tree.leaves[leaf_idx].pptr;

        // Gather every occupied slot (plus the new entry) and sort by key.
        let mut entries: Vec<(u8, Vec<u8>, Vec<u8>)> = Vec::with_capacity(LEAF_KEYS + 1);
        {
            let leaf_ref = unsafe { old_ptr.get(&self.pool) };
            for slot in leaf_ref.slots.iter() {
                if slot.occupied != 0 {
                    let kv = leaf::read_kv(&self.pool, slot);
                    let k = kv[..slot.key_len as usize].to_vec();
                    let v = kv[slot.key_len as usize..].to_vec();
                    entries.push((slot.hash, k, v));
                }
            }
        }
        entries.push((hash, key.to_vec(), value.to_vec()));
        let cmp = &self.cmp;
        entries.sort_by(|a, b| cmp(&a.1, &b.1));

        let mid = entries.len() / 2;
        let (left, right) = entries.split_at(mid);
        let sep_key = right[0].1.clone();

        // A reused prealloc leaf is already reachable from some point in the
        // persistent list (spec §4.E "Prealloc list": leaves are retained,
        // never unlinked, when they empty out). Splicing it to a new list
        // position would orphan whatever it used to point to, so only a
        // freshly allocated leaf gets threaded into the list; a reused one
        // keeps its existing link untouched.
        let (new_ptr, freshly_allocated) = if let Some(reused) = state.prealloc.pop() {
            (reused, false)
        } else {
            (Transaction::run(&self.pool, |j| leaf::allocate_leaf(&self.pool, j))?, true)
        };

        Transaction::run(&self.pool, |j| {
            leaf::clear_all_slots(&self.pool, j, old_ptr);
            for (i, (h, k, v)) in left.iter().enumerate() {
                leaf::write_slot(&self.pool, j, old_ptr, i, *h, k, v)?;
            }
            leaf::clear_all_slots(&self.pool, j, new_ptr);
            for (i, (h, k, v)) in right.iter().enumerate() {
                leaf::write_slot(&self.pool, j, new_ptr, i, *h, k, v)?;
            }
            if freshly_allocated {
                let old_next = unsafe { old_ptr.get(&self.pool) }.next;
                leaf::link_next(&self.pool, j, new_ptr, old_next);
                leaf::link_next(&self.pool, j, old_ptr, new_ptr);
            }
            Ok(())
        })?;

        let mut left_node = LeafNode::empty(old_ptr, state.tree.leaves[leaf_idx].parent);
        for (i, (h, k, _)) in left.iter().enumerate() {
            left_node.hashes[i] = *h;
            left_node.keys[i] = Some(k.clone());
        }
        let mut right_node = LeafNode::empty(new_ptr, None);
        for (i, (h, k, _)) in right.iter().enumerate() {
            right_node.hashes[i] = *h;
            right_node.keys[i] = Some(k.clone());
        }

        state.tree.leaves[leaf_idx] = left_node;
        let new_idx = state.tree.leaves.len();
        state.tree.leaves.push(right_node);
        state
            .tree
            .graft(NodeRef::Leaf(leaf_idx), NodeRef::Leaf(new_idx), sep_key, true);
        Ok(())
    }

    /// Applies a write-iterator's staged `(buffer, position)` patches to
    /// `key`'s current value as one transactional overwrite (spec §4.G
    /// `commit`).
    pub(crate) fn apply_write_log(&self, key: &[u8], log: &[(Vec<u8>, usize)]) -> Result<()> {
        let state = self.state.read();
        let hash = pearson_hash(key);
        let leaf_idx = state.tree.find_leaf(key, &self.cmp);
        let leaf = &state.tree.leaves[leaf_idx];
        let slot_idx = leaf.find_slot(hash, key).ok_or(EngineError::NotFound)?;
        let leaf_ptr = leaf.pptr;
        let mut value = self.read_slot_value(leaf_ptr, slot_idx);
        for (buf, pos) in log {
            if pos + buf.len() > value.len() {
                return Err(EngineError::InvalidArgument(
                    "write log patch extends past the current value length".into(),
                ));
            }
            value[*pos..*pos + buf.len()].copy_from_slice(buf);
        }
        Transaction::run(&self.pool, |j| {
            leaf::overwrite_slot_value(&self.pool, j, leaf_ptr, slot_idx, &value)
        })
    }
}

/// Resolves the key comparator from config (spec §4.C `comparator`),
/// falling back to lexicographic byte order.
fn resolve_comparator(config: &Config) -> Result<Comparator> {
    match config.get_object(keys::COMPARATOR) {
        Ok(obj) => obj
            .clone()
            .downcast::<tree::ComparatorFn>()
            .map(|boxed| (*boxed).0.clone())
            .map_err(|_| EngineError::ConfigType("comparator object is not a Comparator".into())),
        Err(EngineError::NotFound) => Ok(tree::lexicographic()),
        Err(e) => Err(e),
    }
}

impl Engine for BTreeEngine {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn count_all(&self) -> Result<usize> {
        Ok(self.count.load(AtomicOrdering::Relaxed))
    }

    fn get_all(&self, callback: &mut KvCallback<'_>) -> Result<()> {
        let state = self.state.read();
        for positioned in state.tree.sorted_positions(&self.cmp) {
            let (key, leaf_idx, slot_idx) = positioned;
            let leaf_ptr = state.tree.leaves[leaf_idx].pptr;
            let value = self.read_slot_value(leaf_ptr, slot_idx);
            if callback(&key, &value) != 0 {
                return Err(EngineError::StoppedByCb);
            }
        }
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<()> {
        let state = self.state.read();
        let hash = pearson_hash(key);
        let leaf_idx = state.tree.find_leaf(key, &self.cmp);
        match state.tree.leaves[leaf_idx].find_slot(hash, key) {
            Some(_) => Ok(()),
            None => Err(EngineError::NotFound),
        }
    }

    fn get(&self, key: &[u8], callback: &mut dyn FnMut(&[u8])) -> Result<()> {
        let state = self.state.read();
        let hash = pearson_hash(key);
        let leaf_idx = state.tree.find_leaf(key, &self.cmp);
        let leaf = &state.tree.leaves[leaf_idx];
        let slot_idx = leaf.find_slot(hash, key).ok_or(EngineError::NotFound)?;
        let value = self.read_slot_value(leaf.pptr, slot_idx);
        callback(&value);
        Ok(())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        let hash = pearson_hash(key);
        let leaf_idx = state.tree.find_leaf(key, &self.cmp);
        let leaf_ptr = state.tree.leaves[leaf_idx].pptr;

        if let Some(slot_idx) = state.tree.leaves[leaf_idx].find_slot(hash, key) {
            Transaction::run(&self.pool, |j| {
                leaf::overwrite_slot_value(&self.pool, j, leaf_ptr, slot_idx, value)
            })?;
            return Ok(());
        }

        if let Some(empty_idx) = state.tree.leaves[leaf_idx].first_empty_slot() {
            Transaction::run(&self.pool, |j| {
                leaf::write_slot(&self.pool, j, leaf_ptr, empty_idx, hash, key, value)
            })?;
            state.tree.leaves[leaf_idx].hashes[empty_idx] = hash;
            state.tree.leaves[leaf_idx].keys[empty_idx] = Some(key.to_vec());
        } else {
            self.split_leaf_and_insert(&mut state, leaf_idx, hash, key, value)?;
        }
        self.count.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        let hash = pearson_hash(key);
        let leaf_idx = state.tree.find_leaf(key, &self.cmp);
        let leaf_ptr = state.tree.leaves[leaf_idx].pptr;
        let slot_idx = state.tree.leaves[leaf_idx]
            .find_slot(hash, key)
            .ok_or(EngineError::NotFound)?;

        Transaction::run(&self.pool, |j| {
            leaf::clear_slot(&self.pool, j, leaf_ptr, slot_idx);
            Ok(())
        })?;
        state.tree.leaves[leaf_idx].keys[slot_idx] = None;
        self.count.fetch_sub(1, AtomicOrdering::Relaxed);
        Ok(())
        // A leaf left empty by this removal stays on the linked list and is
        // only discovered and moved onto the prealloc list at the next
        // recovery (spec §4.E "Prealloc list").
    }

    fn defrag(&self, start_percent: u8, amount_percent: u8) -> Result<()> {
        if start_percent as u32 + amount_percent as u32 > 100 {
            return Err(EngineError::InvalidArgument(
                "start_percent + amount_percent must not exceed 100".into(),
            ));
        }
        let state = self.state.read();
        let total = state.tree.leaves.len();
        if total == 0 {
            return Ok(());
        }
        let first = total * start_percent as usize / 100;
        let last = total * (start_percent as usize + amount_percent as usize) / 100;
        let leaf_ptrs: Vec<PPtr<PLeaf>> = state.tree.leaves[first..last.min(total)]
            .iter()
            .map(|l| l.pptr)
            .collect();
        drop(state);

        for leaf_ptr in leaf_ptrs {
            Transaction::run(&self.pool, |j| {
                let occupied: Vec<usize> = {
                    let leaf_ref = unsafe { leaf_ptr.get(&self.pool) };
                    leaf_ref
                        .slots
                        .iter()
                        .enumerate()
                        .filter(|(_, s)| s.occupied != 0)
                        .map(|(i, _)| i)
                        .collect()
                };
                for idx in occupied {
                    let (hash, key_len, kv) = {
                        let leaf_ref = unsafe { leaf_ptr.get(&self.pool) };
                        let slot = &leaf_ref.slots[idx];
                        (slot.hash, slot.key_len as usize, leaf::read_kv(&self.pool, slot))
                    };
                    let (key, value) = kv.split_at(key_len);
                    let key = key.to_vec();
                    let value = value.to_vec();
                    {
                        let leaf_ref = unsafe { leaf_ptr.get(&self.pool) };
                        leaf::free_slot_buf(&self.pool, j, &leaf_ref.slots[idx]);
                    }
                    leaf::write_slot(&self.pool, j, leaf_ptr, idx, hash, &key, &value)?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    fn new_iterator(&self) -> Result<Box<dyn WriteIterator + '_>> {
        let state = self.state.read();
        let keys = state
            .tree
            .sorted_positions(&self.cmp)
            .into_iter()
            .map(|(k, _, _)| k)
            .collect();
        Ok(Box::new(BTreeWriteIter::new(self, keys)))
    }

    fn new_const_iterator(&self) -> Result<Box<dyn ReadIterator + '_>> {
        let state = self.state.read();
        let keys = state
            .tree
            .sorted_positions(&self.cmp)
            .into_iter()
            .map(|(k, _, _)| k)
            .collect();
        Ok(Box::new(BTreeReadIter::new(self, keys)))
    }

    fn is_ordered(&self) -> bool {
        true
    }

    fn count_above(&self, key: &[u8]) -> Result<usize> {
        let state = self.state.read();
        Ok(state
            .tree
            .sorted_positions(&self.cmp)
            .iter()
            .filter(|(k, _, _)| (self.cmp)(k, key) == Ordering::Greater)
            .count())
    }

    fn count_equal_above(&self, key: &[u8]) -> Result<usize> {
        let state = self.state.read();
        Ok(state
            .tree
            .sorted_positions(&self.cmp)
            .iter()
            .filter(|(k, _, _)| (self.cmp)(k, key) != Ordering::Less)
            .count())
    }

    fn count_below(&self, key: &[u8]) -> Result<usize> {
        let state = self.state.read();
        Ok(state
            .tree
            .sorted_positions(&self.cmp)
            .iter()
            .filter(|(k, _, _)| (self.cmp)(k, key) == Ordering::Less)
            .count())
    }

    fn count_equal_below(&self, key: &[u8]) -> Result<usize> {
        let state = self.state.read();
        Ok(state
            .tree
            .sorted_positions(&self.cmp)
            .iter()
            .filter(|(k, _, _)| (self.cmp)(k, key) != Ordering::Greater)
            .count())
    }

    fn count_between(&self, a: &[u8], b: &[u8]) -> Result<usize> {
        if (self.cmp)(a, b) != Ordering::Less {
            return Ok(0);
        }
        let state = self.state.read();
        Ok(state
            .tree
            .sorted_positions(&self.cmp)
            .iter()
            .filter(|(k, _, _)| (self.cmp)(a, k) == Ordering::Less && (self.cmp)(k, b) == Ordering::Less)
            .count())
    }

    fn get_above(&self, key: &[u8], callback: &mut KvCallback<'_>) -> Result<()> {
        self.scan(callback, |cmp, k| cmp(k, key) == Ordering::Greater)
    }

    fn get_equal_above(&self, key: &[u8], callback: &mut KvCallback<'_>) -> Result<()> {
        self.scan(callback, |cmp, k| cmp(k, key) != Ordering::Less)
    }

    fn get_below(&self, key: &[u8], callback: &mut KvCallback<'_>) -> Result<()> {
        self.scan(callback, |cmp, k| cmp(k, key) == Ordering::Less)
    }

    fn get_equal_below(&self, key: &[u8], callback: &mut KvCallback<'_>) -> Result<()> {
        self.scan(callback, |cmp, k| cmp(k, key) != Ordering::Greater)
    }

    fn get_between(&self, a: &[u8], b: &[u8], callback: &mut KvCallback<'_>) -> Result<()> {
        if (self.cmp)(a, b) != Ordering::Less {
            return Ok(());
        }
        self.scan(callback, |cmp, k| {
            cmp(a, k) == Ordering::Less && cmp(k, b) == Ordering::Less
        })
    }
}

impl BTreeEngine {
    /// Shared implementation for the `get_*` ordered range scans: walks the
    /// sorted key snapshot, invoking `callback` for every key `predicate`
    /// accepts, stopping early on a non-zero callback return.
    fn scan(
        &self,
        callback: &mut KvCallback<'_>,
        predicate: impl Fn(&Comparator, &[u8]) -> bool,
    ) -> Result<()> {
        let state = self.state.read();
        for (key, leaf_idx, slot_idx) in state.tree.sorted_positions(&self.cmp) {
            if !predicate(&self.cmp, &key) {
                continue;
            }
            let leaf_ptr = state.tree.leaves[leaf_idx].pptr;
            let value = self.read_slot_value(leaf_ptr, slot_idx);
            if callback(&key, &value) != 0 {
                return Err(EngineError::StoppedByCb);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_engine(dir: &std::path::Path) -> BTreeEngine {
        let mut cfg = Config::new();
        cfg.set_string(keys::PATH, dir.join("pool").to_str().unwrap());
        cfg.set_uint64(keys::SIZE, 1 << 20);
        BTreeEngine::open(cfg).unwrap()
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let engine = open_engine(dir.path());
        engine.put(b"hello", b"world").unwrap();
        let mut seen = Vec::new();
        engine.get(b"hello", &mut |v| seen = v.to_vec()).unwrap();
        assert_eq!(seen, b"world");
        assert_eq!(engine.count_all().unwrap(), 1);
    }

    #[test]
    fn overwrite_keeps_single_key() {
        let dir = tempdir().unwrap();
        let engine = open_engine(dir.path());
        engine.put(b"k", b"v1").unwrap();
        engine.put(b"k", b"v2").unwrap();
        assert_eq!(engine.count_all().unwrap(), 1);
        let mut seen = Vec::new();
        engine.get(b"k", &mut |v| seen = v.to_vec()).unwrap();
        assert_eq!(seen, b"v2");
    }

    #[test]
    fn remove_absent_key_is_not_found() {
        let dir = tempdir().unwrap();
        let engine = open_engine(dir.path());
        assert!(matches!(engine.remove(b"missing"), Err(EngineError::NotFound)));
    }

    #[test]
    fn splitting_a_full_leaf_preserves_all_keys() {
        let dir = tempdir().unwrap();
        let engine = open_engine(dir.path());
        for i in 0..(LEAF_KEYS * 3) {
            let key = format!("key{:04}", i);
            engine.put(key.as_bytes(), b"v").unwrap();
        }
        assert_eq!(engine.count_all().unwrap(), LEAF_KEYS * 3);
        for i in 0..(LEAF_KEYS * 3) {
            let key = format!("key{:04}", i);
            let mut seen = Vec::new();
            engine.get(key.as_bytes(), &mut |v| seen = v.to_vec()).unwrap();
            assert_eq!(seen, b"v");
        }
    }

    #[test]
    fn ordered_range_queries_respect_comparator() {
        let dir = tempdir().unwrap();
        let engine = open_engine(dir.path());
        for k in ["a", "b", "c", "d"] {
            engine.put(k.as_bytes(), b"v").unwrap();
        }
        assert_eq!(engine.count_above(b"b").unwrap(), 2);
        assert_eq!(engine.count_equal_above(b"b").unwrap(), 3);
        assert_eq!(engine.count_below(b"c").unwrap(), 2);
        assert_eq!(engine.count_between(b"a", b"d").unwrap(), 2);

        let mut collected = Vec::new();
        engine
            .get_above(b"a", &mut |k, _| {
                collected.push(k.to_vec());
                0
            })
            .unwrap();
        assert_eq!(collected, vec![b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn recovery_rebuilds_routing_over_existing_leaves() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool");
        {
            let mut cfg = Config::new();
            cfg.set_string(keys::PATH, path.to_str().unwrap());
            cfg.set_uint64(keys::SIZE, 1 << 20);
            let engine = BTreeEngine::open(cfg).unwrap();
            for i in 0..(LEAF_KEYS * 2) {
                let key = format!("key{:04}", i);
                engine.put(key.as_bytes(), b"v").unwrap();
            }
        }
        let mut cfg = Config::new();
        cfg.set_string(keys::PATH, path.to_str().unwrap());
        let engine = BTreeEngine::open(cfg).unwrap();
        assert_eq!(engine.count_all().unwrap(), LEAF_KEYS * 2);
        let mut seen = Vec::new();
        engine.get(b"key0000", &mut |v| seen = v.to_vec()).unwrap();
        assert_eq!(seen, b"v");
    }

    #[test]
    fn write_iterator_commits_partial_update() {
        let dir = tempdir().unwrap();
        let engine = open_engine(dir.path());
        engine.put(b"k", b"0123456789").unwrap();
        {
            let mut it = engine.new_iterator().unwrap();
            it.seek(b"k").unwrap();
            let buf = it.write_range(2, 4).unwrap();
            buf.copy_from_slice(b"ABCD");
            it.commit().unwrap();
        }
        let mut seen = Vec::new();
        engine.get(b"k", &mut |v| seen = v.to_vec()).unwrap();
        assert_eq!(seen, b"01ABCD6789");
    }
}
