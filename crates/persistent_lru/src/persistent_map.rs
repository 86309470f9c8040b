//! Ordered map with structural sharing.
//!
//! An AVL tree whose nodes live behind `Arc`. Updates copy the nodes on the
//! path from the root to the touched leaf and reuse every other subtree, so a
//! new version costs O(log n) and older versions stay valid.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type Link<K, V> = Option<Arc<Node<K, V>>>;

struct Node<K, V> {
    key: K,
    value: V,
    height: usize,
    left: Link<K, V>,
    right: Link<K, V>,
}

pub struct PersistentMap<K, V> {
    root: Link<K, V>,
    len: usize,
}

impl<K, V> Clone for PersistentMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K, V> Default for PersistentMap<K, V> {
    fn default() -> Self {
        Self { root: None, len: 0 }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for PersistentMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> PersistentMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Smallest key and its value.
    pub fn first(&self) -> Option<(&K, &V)> {
        let mut node = self.root.as_deref()?;
        while let Some(left) = node.left.as_deref() {
            node = left;
        }
        Some((&node.key, &node.value))
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter {
            stack: Vec::new(),
            remaining: self.len,
        };
        iter.push_left(&self.root);
        iter
    }

    #[cfg(test)]
    pub(crate) fn height(&self) -> usize {
        height(&self.root)
    }
}

impl<K: Ord, V> PersistentMap<K, V> {
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

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }
}

impl<K: Ord + Clone, V: Clone> PersistentMap<K, V> {
    /// Returns a map with `key` bound to `value` and the value it replaced.
    pub fn insert(&self, key: K, value: V) -> (Self, Option<V>) {
        let mut replaced = None;
        let root = insert_node(&self.root, key, value, &mut replaced);
        let len = if replaced.is_some() {
            self.len
        } else {
            self.len + 1
        };
        (
            Self {
                root: Some(root),
                len,
            },
            replaced,
        )
    }

    /// Returns a map without `key` and the value that was bound to it.
    /// When the key is absent the returned map shares the whole tree.
    pub fn remove(&self, key: &K) -> (Self, Option<V>) {
        let mut removed = None;
        let root = remove_node(&self.root, key, &mut removed);
        if removed.is_none() {
            return (self.clone(), None);
        }
        (
            Self {
                root,
                len: self.len - 1,
            },
            removed,
        )
    }

    #[cfg(test)]
    pub(crate) fn check_balanced(&self) -> bool {
        fn walk<K: Ord, V>(link: &Link<K, V>, lower: Option<&K>, upper: Option<&K>) -> Option<usize> {
            let Some(node) = link else {
                return Some(0);
            };
            if lower.is_some_and(|lower| node.key <= *lower) {
                return None;
            }
            if upper.is_some_and(|upper| node.key >= *upper) {
                return None;
            }
            let left = walk(&node.left, lower, Some(&node.key))?;
            let right = walk(&node.right, Some(&node.key), upper)?;
            if left.abs_diff(right) > 1 || node.height != left.max(right) + 1 {
                return None;
            }
            Some(node.height)
        }
        walk(&self.root, None, None).is_some()
    }
}

pub struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn push_left(&mut self, mut link: &'a Link<K, V>) {
        while let Some(node) = link.as_deref() {
            self.stack.push(node);
            link = &node.left;
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(&node.right);
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

fn height<K, V>(link: &Link<K, V>) -> usize {
    link.as_ref().map_or(0, |node| node.height)
}

fn make_node<K, V>(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<Node<K, V>> {
    let height = height(&left).max(height(&right)) + 1;
    Arc::new(Node {
        key,
        value,
        height,
        left,
        right,
    })
}

fn balance<K: Clone, V: Clone>(
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
) -> Arc<Node<K, V>> {
    let left_height = height(&left);
    let right_height = height(&right);

    if left_height > right_height + 1 {
        if let Some(l) = &left {
            if height(&l.left) >= height(&l.right) {
                let new_right = make_node(key, value, l.right.clone(), right);
                return make_node(l.key.clone(), l.value.clone(), l.left.clone(), Some(new_right));
            }
            if let Some(lr) = &l.right {
                let new_left =
                    make_node(l.key.clone(), l.value.clone(), l.left.clone(), lr.left.clone());
                let new_right = make_node(key, value, lr.right.clone(), right);
                return make_node(
                    lr.key.clone(),
                    lr.value.clone(),
                    Some(new_left),
                    Some(new_right),
                );
            }
        }
    } else if right_height > left_height + 1 {
        if let Some(r) = &right {
            if height(&r.right) >= height(&r.left) {
                let new_left = make_node(key, value, left, r.left.clone());
                return make_node(r.key.clone(), r.value.clone(), Some(new_left), r.right.clone());
            }
            if let Some(rl) = &r.left {
                let new_left = make_node(key, value, left, rl.left.clone());
                let new_right =
                    make_node(r.key.clone(), r.value.clone(), rl.right.clone(), r.right.clone());
                return make_node(
                    rl.key.clone(),
                    rl.value.clone(),
                    Some(new_left),
                    Some(new_right),
                );
            }
        }
    }

    make_node(key, value, left, right)
}

fn insert_node<K: Ord + Clone, V: Clone>(
    link: &Link<K, V>,
    key: K,
    value: V,
    replaced: &mut Option<V>,
) -> Arc<Node<K, V>> {
    let Some(node) = link else {
        return make_node(key, value, None, None);
    };

    match key.cmp(&node.key) {
        Ordering::Less => {
            let left = insert_node(&node.left, key, value, replaced);
            balance(
                node.key.clone(),
                node.value.clone(),
                Some(left),
                node.right.clone(),
            )
        }
        Ordering::Greater => {
            let right = insert_node(&node.right, key, value, replaced);
            balance(
                node.key.clone(),
                node.value.clone(),
                node.left.clone(),
                Some(right),
            )
        }
        Ordering::Equal => {
            *replaced = Some(node.value.clone());
            Arc::new(Node {
                key,
                value,
                height: node.height,
                left: node.left.clone(),
                right: node.right.clone(),
            })
        }
    }
}

fn remove_node<K: Ord + Clone, V: Clone>(
    link: &Link<K, V>,
    key: &K,
    removed: &mut Option<V>,
) -> Link<K, V> {
    let node = link.as_ref()?;

    match key.cmp(&node.key) {
        Ordering::Less => {
            let left = remove_node(&node.left, key, removed);
            if removed.is_none() {
                return Some(Arc::clone(node));
            }
            Some(balance(
                node.key.clone(),
                node.value.clone(),
                left,
                node.right.clone(),
            ))
        }
        Ordering::Greater => {
            let right = remove_node(&node.right, key, removed);
            if removed.is_none() {
                return Some(Arc::clone(node));
            }
            Some(balance(
                node.key.clone(),
                node.value.clone(),
                node.left.clone(),
                right,
            ))
        }
        Ordering::Equal => {
            *removed = Some(node.value.clone());
            match (&node.left, &node.right) {
                (None, right) => right.clone(),
                (left, None) => left.clone(),
                (left, Some(right)) => {
                    let (min_key, min_value) = leftmost(right);
                    let rest = remove_leftmost(&node.right);
                    Some(balance(min_key, min_value, left.clone(), rest))
                }
            }
        }
    }
}

fn leftmost<K: Clone, V: Clone>(node: &Arc<Node<K, V>>) -> (K, V) {
    let mut current = node;
    while let Some(left) = &current.left {
        current = left;
    }
    (current.key.clone(), current.value.clone())
}

fn remove_leftmost<K: Clone, V: Clone>(link: &Link<K, V>) -> Link<K, V> {
    let node = link.as_ref()?;
    if node.left.is_none() {
        return node.right.clone();
    }
    Some(balance(
        node.key.clone(),
        node.value.clone(),
        remove_leftmost(&node.left),
        node.right.clone(),
    ))
}
