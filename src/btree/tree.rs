//! Volatile inner-tree routing structure (spec §4.E, §9 "Volatile inner
//! tree over persistent leaves").
//!
//! Leaves are persistent; inner nodes are rebuilt from scratch every time
//! a pool is opened, so they can afford an arena-of-indices
//! representation instead of the original's raw `unique_ptr<KVNode>`
//! parent/child pointers (spec Design Notes: "prefer arena + index over
//! raw cyclic pointers").

use std::cmp::Ordering;

use crate::alloc::PPtr;
use crate::btree::leaf::{PLeaf, LEAF_KEYS};

/// A key comparator (spec §4.C `comparator`). Default is lexicographic
/// byte-order, matching `Vec<u8>`'s derived `Ord`.
pub type Comparator = std::sync::Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

pub fn lexicographic() -> Comparator {
    std::sync::Arc::new(|a: &[u8], b: &[u8]| a.cmp(b))
}

/// Concrete, `Any`-downcastable wrapper around a [`Comparator`], so a
/// pluggable comparator can travel through [`crate::config::ConfigObject`]
/// (spec §4.C `comparator`) despite trait objects not implementing `Any`
/// directly.
pub struct ComparatorFn(pub Comparator);

/// Maximum separator keys per inner node (spec §4.E).
pub const INNER_KEYS: usize = 4;
/// Index at which an overflowing inner node is split (spec §4.E).
pub const INNER_KEYS_MIDPOINT: usize = INNER_KEYS / 2;

pub type LeafIdx = usize;
pub type InnerIdx = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef {
    Leaf(LeafIdx),
    Inner(InnerIdx),
}

/// Volatile mirror of one persistent leaf: a Pearson-hash prefilter plus
/// a cached copy of each occupied slot's key, indexed exactly like the
/// persistent slot array so leaf search and leaf split code can reason
/// about the two in lockstep without re-reading persistent memory for
/// every comparison.
pub struct LeafNode {
    pub pptr: PPtr<PLeaf>,
    pub hashes: [u8; LEAF_KEYS],
    pub keys: Vec<Option<Vec<u8>>>,
    pub parent: Option<InnerIdx>,
}

impl LeafNode {
    pub fn empty(pptr: PPtr<PLeaf>, parent: Option<InnerIdx>) -> Self {
        LeafNode {
            pptr,
            hashes: [0; LEAF_KEYS],
            keys: vec![None; LEAF_KEYS],
            parent,
        }
    }

    pub fn occupied_count(&self) -> usize {
        self.keys.iter().filter(|k| k.is_some()).count()
    }

    pub fn first_empty_slot(&self) -> Option<usize> {
        self.keys.iter().position(|k| k.is_none())
    }

    /// Index of the slot holding exactly `key`, using the Pearson-hash
    /// prefilter before falling back to a full comparison (spec §4.E
    /// "Lookup").
    pub fn find_slot(&self, hash: u8, key: &[u8]) -> Option<usize> {
        self.keys.iter().enumerate().find_map(|(i, k)| {
            if self.hashes[i] == hash && k.as_deref() == Some(key) {
                Some(i)
            } else {
                None
            }
        })
    }

    pub fn min_key(&self, cmp: &Comparator) -> Option<Vec<u8>> {
        self.keys.iter().flatten().fold(None, |acc, k| match acc {
            None => Some(k.clone()),
            Some(best) => {
                if cmp(k, &best) == Ordering::Less {
                    Some(k.clone())
                } else {
                    Some(best)
                }
            }
        })
    }
}

/// Volatile inner node: up to [`INNER_KEYS`] separator keys routing to
/// `keys.len() + 1` children. Grows to `INNER_KEYS + 1` keys /
/// `INNER_KEYS + 2` children for the instant between an insert and the
/// split it triggers (spec §4.E: "one extra slot is reserved for the
/// mid-split boundary").
pub struct InnerNode {
    pub parent: Option<InnerIdx>,
    pub keys: Vec<Vec<u8>>,
    pub children: Vec<NodeRef>,
}

/// The volatile routing structure over a pool's persistent leaves.
pub struct Tree {
    pub leaves: Vec<LeafNode>,
    pub inners: Vec<InnerNode>,
    pub root: NodeRef,
}

impl Tree {
    /// A tree with a single (assumed already persistent) leaf as its
    /// root. Used both at fresh-pool creation and as the seed for
    /// recovery.
    pub fn with_single_leaf(pptr: PPtr<PLeaf>) -> Self {
        Tree {
            leaves: vec![LeafNode::empty(pptr, None)],
            inners: Vec::new(),
            root: NodeRef::Leaf(0),
        }
    }

    fn parent_of(&self, node: NodeRef) -> Option<InnerIdx> {
        match node {
            NodeRef::Leaf(i) => self.leaves[i].parent,
            NodeRef::Inner(i) => self.inners[i].parent,
        }
    }

    fn set_parent(&mut self, node: NodeRef, parent: Option<InnerIdx>) {
        match node {
            NodeRef::Leaf(i) => self.leaves[i].parent = parent,
            NodeRef::Inner(i) => self.inners[i].parent = parent,
        }
    }

    /// Descends from the root to the leaf that currently owns `key`'s
    /// position, by repeated separator-key comparison (spec §4.E
    /// "Lookup": "Descend the inner tree by key comparison to a leaf").
    pub fn find_leaf(&self, key: &[u8], cmp: &Comparator) -> LeafIdx {
        let mut node = self.root;
        loop {
            match node {
                NodeRef::Leaf(i) => return i,
                NodeRef::Inner(i) => {
                    let inner = &self.inners[i];
                    let mut child_pos = inner.keys.len();
                    for (pos, k) in inner.keys.iter().enumerate() {
                        if cmp(key, k) == Ordering::Less {
                            child_pos = pos;
                            break;
                        }
                    }
                    node = inner.children[child_pos];
                }
            }
        }
    }

    /// Inserts `new_node` as `anchor`'s immediate sibling (to its right
    /// if `new_goes_right`, else to its left), with `sep_key` as the
    /// separator between them, splitting `anchor`'s parent (recursively,
    /// up to a new root) if it overflows (spec §4.E "Insertion": "if the
    /// parent has room, insert the split key and pointer; else
    /// recursively split the inner node ... if the root splits, create a
    /// new root").
    pub fn graft(&mut self, anchor: NodeRef, new_node: NodeRef, sep_key: Vec<u8>, new_goes_right: bool) {
        let parent = self.parent_of(anchor);
        self.set_parent(new_node, parent);

        match parent {
            None => {
                let children = if new_goes_right {
                    vec![anchor, new_node]
                } else {
                    vec![new_node, anchor]
                };
                let idx = self.inners.len();
                self.inners.push(InnerNode {
                    parent: None,
                    keys: vec![sep_key],
                    children,
                });
                self.set_parent(anchor, Some(idx));
                self.set_parent(new_node, Some(idx));
                self.root = NodeRef::Inner(idx);
            }
            Some(parent_idx) => {
                let anchor_pos = self.inners[parent_idx]
                    .children
                    .iter()
                    .position(|c| *c == anchor)
                    .expect("anchor must be a child of its recorded parent");
                if new_goes_right {
                    self.inners[parent_idx].children.insert(anchor_pos + 1, new_node);
                } else {
                    self.inners[parent_idx].children.insert(anchor_pos, new_node);
                }
                self.inners[parent_idx].keys.insert(anchor_pos, sep_key);

                if self.inners[parent_idx].keys.len() > INNER_KEYS {
                    self.split_inner(parent_idx);
                }
            }
        }
    }

    /// Splits an overflowing inner node at [`INNER_KEYS_MIDPOINT`],
    /// promoting the midpoint key to the parent (spec §4.E).
    fn split_inner(&mut self, idx: InnerIdx) {
        let parent = self.inners[idx].parent;
        let promoted_key = self.inners[idx].keys[INNER_KEYS_MIDPOINT].clone();
        let right_keys = self.inners[idx].keys.split_off(INNER_KEYS_MIDPOINT + 1);
        self.inners[idx].keys.truncate(INNER_KEYS_MIDPOINT);
        let right_children = self.inners[idx].children.split_off(INNER_KEYS_MIDPOINT + 1);

        let right_idx = self.inners.len();
        self.inners.push(InnerNode {
            parent,
            keys: right_keys,
            children: right_children,
        });
        let children_to_fix: Vec<NodeRef> = self.inners[right_idx].children.clone();
        for c in children_to_fix {
            self.set_parent(c, Some(right_idx));
        }

        self.graft(NodeRef::Inner(idx), NodeRef::Inner(right_idx), promoted_key, true);
    }

    /// Places an already-persistent, already-populated leaf into the
    /// routing structure by key range, using the same graft/split
    /// machinery as a normal leaf split, but without allocating or
    /// touching any persistent state (spec §4.E "Recovery": "insert it
    /// into the volatile inner tree using the same split logic as normal
    /// insertion, but without touching persistent state").
    pub fn route_existing_leaf(&mut self, leaf_idx: LeafIdx, cmp: &Comparator) {
        let new_min = match self.leaves[leaf_idx].min_key(cmp) {
            Some(k) => k,
            None => return, // empty leaves are handled by the prealloc list, not routed
        };
        let existing_idx = self.find_leaf(&new_min, cmp);
        if existing_idx == leaf_idx {
            // First leaf routed: it's already the (sole) root.
            return;
        }
        let existing_min = self.leaves[existing_idx]
            .min_key(cmp)
            .expect("a leaf reachable by find_leaf before this one was routed must be non-empty");

        if cmp(&new_min, &existing_min) == Ordering::Less {
            self.graft(NodeRef::Leaf(existing_idx), NodeRef::Leaf(leaf_idx), existing_min, false);
        } else {
            self.graft(NodeRef::Leaf(existing_idx), NodeRef::Leaf(leaf_idx), new_min, true);
        }
    }

    /// In-order (by comparator) snapshot of every stored key, each paired
    /// with its `(leaf index, slot index)` position, used to back the
    /// iterator protocol (spec §4.G) without requiring a borrow tied to
    /// the tree's own lifetime.
    pub fn sorted_positions(&self, cmp: &Comparator) -> Vec<(Vec<u8>, LeafIdx, usize)> {
        let mut out = Vec::new();
        for (leaf_idx, leaf) in self.leaves.iter().enumerate() {
            for (slot_idx, key) in leaf.keys.iter().enumerate() {
                if let Some(k) = key {
                    out.push((k.clone(), leaf_idx, slot_idx));
                }
            }
        }
        out.sort_by(|a, b| cmp(&a.0, &b.0));
        out
    }
}
