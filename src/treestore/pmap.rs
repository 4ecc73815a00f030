//! # Persistent Ordered Map
//!
//! An immutable, structurally-shared AVL tree. Cloning the map is O(1)
//! (a root pointer copy), and every mutation copies only the nodes on the
//! path from the root to the touched key, sharing the rest with all
//! previously taken clones. This is what makes transaction snapshots free:
//! a snapshot is a clone of the live map, and later commits can never
//! disturb it.
//!
//! ```text
//!        before insert(D)          after insert(D)
//!
//!            [B]                  [B]      [B']   <- new path nodes
//!           /   \                /   \    /   \
//!         [A]   [C]           [A]    [C][A]   [C']
//!                                \________/      \
//!                             shared subtrees    [D]
//! ```
//!
//! ## Complexity
//!
//! - `get` / `insert` / `remove`: O(log n), insert/remove allocate O(log n)
//!   fresh nodes
//! - `clone`: O(1)
//! - `range`: O(log n) to position, O(1) amortized per step
//!
//! The range iterator owns `Arc` handles into the tree, so it keeps working
//! even after the map it came from is dropped or replaced - scans never
//! borrow from shared mutable state.

use std::cmp::Ordering;
use std::ops::Bound;
use std::sync::Arc;

type Link<K, V> = Option<Arc<Node<K, V>>>;

struct Node<K, V> {
    key: K,
    value: V,
    height: u8,
    left: Link<K, V>,
    right: Link<K, V>,
}

pub struct PMap<K, V> {
    root: Link<K, V>,
    len: usize,
}

impl<K, V> Clone for PMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K, V> Default for PMap<K, V> {
    fn default() -> Self {
        Self { root: None, len: 0 }
    }
}

fn height<K, V>(link: &Link<K, V>) -> i16 {
    link.as_ref().map_or(0, |n| n.height as i16)
}

fn make<K, V>(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<Node<K, V>> {
    let height = 1 + height(&left).max(height(&right));
    Arc::new(Node {
        key,
        value,
        height: height as u8,
        left,
        right,
    })
}

/// Builds a balanced node from parts whose heights differ by at most two,
/// applying the appropriate AVL rotation.
fn join<K: Clone, V: Clone>(
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
) -> Arc<Node<K, V>> {
    let bf = height(&left) - height(&right);

    if bf > 1 {
        let l = left.as_ref().map(Arc::clone).unwrap();
        if height(&l.left) >= height(&l.right) {
            // single right rotation
            let new_right = make(key, value, l.right.clone(), right);
            make(l.key.clone(), l.value.clone(), l.left.clone(), Some(new_right))
        } else {
            // left-right double rotation
            let lr = l.right.as_ref().map(Arc::clone).unwrap();
            let new_left = make(l.key.clone(), l.value.clone(), l.left.clone(), lr.left.clone());
            let new_right = make(key, value, lr.right.clone(), right);
            make(
                lr.key.clone(),
                lr.value.clone(),
                Some(new_left),
                Some(new_right),
            )
        }
    } else if bf < -1 {
        let r = right.as_ref().map(Arc::clone).unwrap();
        if height(&r.right) >= height(&r.left) {
            // single left rotation
            let new_left = make(key, value, left, r.left.clone());
            make(
                r.key.clone(),
                r.value.clone(),
                Some(new_left),
                r.right.clone(),
            )
        } else {
            // right-left double rotation
            let rl = r.left.as_ref().map(Arc::clone).unwrap();
            let new_left = make(key, value, left, rl.left.clone());
            let new_right = make(r.key.clone(), r.value.clone(), rl.right.clone(), r.right.clone());
            make(
                rl.key.clone(),
                rl.value.clone(),
                Some(new_left),
                Some(new_right),
            )
        }
    } else {
        make(key, value, left, right)
    }
}

impl<K: Ord + Clone, V: Clone> PMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let mut link = &self.root;
        while let Some(node) = link {
            match key.cmp(&node.key) {
                Ordering::Less => link = &node.left,
                Ordering::Greater => link = &node.right,
                Ordering::Equal => return Some(&node.value),
            }
        }
        None
    }

    /// Inserts or replaces; returns the previous value if the key existed.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let (root, replaced) = insert_at(&self.root, key, value);
        self.root = Some(root);
        if replaced.is_none() {
            self.len += 1;
        }
        replaced
    }

    /// Removes a key; returns its value if it existed.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (root, removed) = remove_at(&self.root, key)?;
        self.root = root;
        self.len -= 1;
        Some(removed)
    }

    /// Ordered iteration over `[lo, hi]` under the given bounds. The
    /// iterator owns its position and survives later mutations of `self`.
    pub fn range(&self, lo: Bound<&K>, hi: Bound<&K>) -> PRange<K, V> {
        let mut iter = PRange {
            stack: Vec::new(),
            hi: match hi {
                Bound::Included(k) => Bound::Included(k.clone()),
                Bound::Excluded(k) => Bound::Excluded(k.clone()),
                Bound::Unbounded => Bound::Unbounded,
            },
        };
        iter.push_left(self.root.clone(), lo);
        iter
    }

    pub fn iter(&self) -> PRange<K, V> {
        self.range(Bound::Unbounded, Bound::Unbounded)
    }
}

fn insert_at<K: Ord + Clone, V: Clone>(
    link: &Link<K, V>,
    key: K,
    value: V,
) -> (Arc<Node<K, V>>, Option<V>) {
    match link {
        None => (make(key, value, None, None), None),
        Some(node) => match key.cmp(&node.key) {
            Ordering::Equal => (
                make(key, value, node.left.clone(), node.right.clone()),
                Some(node.value.clone()),
            ),
            Ordering::Less => {
                let (new_left, replaced) = insert_at(&node.left, key, value);
                (
                    join(
                        node.key.clone(),
                        node.value.clone(),
                        Some(new_left),
                        node.right.clone(),
                    ),
                    replaced,
                )
            }
            Ordering::Greater => {
                let (new_right, replaced) = insert_at(&node.right, key, value);
                (
                    join(
                        node.key.clone(),
                        node.value.clone(),
                        node.left.clone(),
                        Some(new_right),
                    ),
                    replaced,
                )
            }
        },
    }
}

fn remove_at<K: Ord + Clone, V: Clone>(link: &Link<K, V>, key: &K) -> Option<(Link<K, V>, V)> {
    let node = link.as_ref()?;
    match key.cmp(&node.key) {
        Ordering::Less => {
            let (new_left, removed) = remove_at(&node.left, key)?;
            Some((
                Some(join(
                    node.key.clone(),
                    node.value.clone(),
                    new_left,
                    node.right.clone(),
                )),
                removed,
            ))
        }
        Ordering::Greater => {
            let (new_right, removed) = remove_at(&node.right, key)?;
            Some((
                Some(join(
                    node.key.clone(),
                    node.value.clone(),
                    node.left.clone(),
                    new_right,
                )),
                removed,
            ))
        }
        Ordering::Equal => {
            let removed = node.value.clone();
            let merged = match (&node.left, &node.right) {
                (None, right) => right.clone(),
                (left, None) => left.clone(),
                (left, Some(right)) => {
                    let (succ_key, succ_value, new_right) = take_min(right);
                    Some(join(succ_key, succ_value, left.clone(), new_right))
                }
            };
            Some((merged, removed))
        }
    }
}

/// Detaches the minimum entry of a subtree, returning it and the remainder.
fn take_min<K: Ord + Clone, V: Clone>(node: &Arc<Node<K, V>>) -> (K, V, Link<K, V>) {
    match &node.left {
        None => (node.key.clone(), node.value.clone(), node.right.clone()),
        Some(left) => {
            let (min_key, min_value, new_left) = take_min(left);
            (
                min_key,
                min_value,
                Some(join(
                    node.key.clone(),
                    node.value.clone(),
                    new_left,
                    node.right.clone(),
                )),
            )
        }
    }
}

pub struct PRange<K, V> {
    stack: Vec<Arc<Node<K, V>>>,
    hi: Bound<K>,
}

impl<K: Ord + Clone, V: Clone> PRange<K, V> {
    fn push_left(&mut self, mut link: Link<K, V>, lo: Bound<&K>) {
        while let Some(node) = link {
            let in_range = match lo {
                Bound::Unbounded => true,
                Bound::Included(k) => node.key >= *k,
                Bound::Excluded(k) => node.key > *k,
            };
            if in_range {
                link = node.left.clone();
                self.stack.push(node);
            } else {
                link = node.right.clone();
            }
        }
    }

    fn past_hi(&self, key: &K) -> bool {
        match &self.hi {
            Bound::Unbounded => false,
            Bound::Included(k) => key > k,
            Bound::Excluded(k) => key >= k,
        }
    }
}

impl<K: Ord + Clone, V: Clone> Iterator for PRange<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        let node = self.stack.pop()?;
        if self.past_hi(&node.key) {
            self.stack.clear();
            return None;
        }
        self.push_left(node.right.clone(), Bound::Unbounded);
        Some((node.key.clone(), node.value.clone()))
    }
}
