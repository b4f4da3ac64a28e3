//! LRU (Least Recently Used) ordering core
//!
//! Nodes live in an arena of slots addressed by index; the chain links and
//! the hash index only ever hold slot indices, never references. Nothing in
//! here locks: callers wrap it in a `Mutex` or `RwLock`.

use std::collections::HashMap;
use std::hash::Hash;

use ahash::RandomState;

use crate::error::{CacheError, Result};

/// Node in the LRU doubly-linked list
struct Node<K, V> {
    key: K,
    value: V,
    /// Toward the most recently used end
    prev: Option<usize>,
    /// Toward the least recently used end
    next: Option<usize>,
}

/// LRU cache with fixed capacity
pub struct LruCache<K, V> {
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Option<Node<K, V>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    capacity: usize,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a new LRU cache with the given capacity
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries
    ///
    /// # Returns
    /// * `Result<LruCache>` - Empty cache, or `CacheError::ZeroCapacity` if
    ///   `capacity` is 0
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }

        Ok(Self {
            map: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
            nodes: Vec::with_capacity(capacity),
            head: None,
            tail: None,
            free_list: Vec::new(),
            capacity,
        })
    }

    /// Get a value and mark it most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.node(idx).map(|node| &node.value)
    }

    /// Get a value without touching its recency
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.node(idx).map(|node| &node.value)
    }

    /// Mark a key most recently used without reading it.
    /// Returns `false` if the key is not cached.
    pub fn touch(&mut self, key: &K) -> bool {
        match self.map.get(key) {
            Some(&idx) => {
                self.move_to_front(idx);
                true
            }
            None => false,
        }
    }

    /// Insert or update a key-value pair.
    ///
    /// Returns the entry evicted to make room, if any. Updating an existing
    /// key never evicts.
    ///
    /// If `K::clone` or `K::hash` panics, the cache is left as it was before
    /// the call. That only matters in unwinding builds; the workspace release
    /// profile sets `panic = "abort"`, where a panic ends the process.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            if let Some(node) = self.node_mut(idx) {
                node.value = value;
            }
            self.move_to_front(idx);
            return None;
        }

        // Clone and hash run before any link is patched, so a panicking key
        // type cannot leave the chain and the index out of step.
        let node_key = key.clone();
        let idx = self.alloc_node();
        self.map.insert(key, idx);

        self.nodes[idx] = Some(Node {
            key: node_key,
            value,
            prev: None,
            next: None,
        });
        self.push_front(idx);

        if self.map.len() > self.capacity {
            self.evict()
        } else {
            None
        }
    }

    /// Remove a key from the cache
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.free_node(idx);
        self.nodes[idx].take().map(|node| node.value)
    }

    /// Check whether a key is cached, without touching its recency
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Get the current size of the cache
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry.
    ///
    /// The arena itself is released, so no slot index handed out before the
    /// call can reach a node afterwards.
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
    }

    /// Iterate entries from most to least recently used
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            nodes: &self.nodes,
            cursor: self.head,
            remaining: self.map.len(),
        }
    }

    /// Walk the chain and cross-check it against the index.
    ///
    /// Verifies that index and chain sizes agree, that every chained node is
    /// indexed under its own key, that the back links mirror the forward
    /// links, that the chain is acyclic and ends at `tail`, and that the size
    /// is within capacity.
    pub fn check_invariants(&self) -> Result<()> {
        let len = self.map.len();
        if len > self.capacity {
            return Err(CacheError::violation(format!(
                "size {} exceeds capacity {}",
                len, self.capacity
            )));
        }

        let mut count = 0;
        let mut prev = None;
        let mut cursor = self.head;

        while let Some(idx) = cursor {
            if count == len {
                return Err(CacheError::violation(format!(
                    "chain is longer than index ({} entries) or cyclic",
                    len
                )));
            }

            let node = self.node(idx).ok_or_else(|| {
                CacheError::violation(format!("chain links to vacant slot {}", idx))
            })?;

            if node.prev != prev {
                return Err(CacheError::violation(format!(
                    "slot {} has prev {:?}, expected {:?}",
                    idx, node.prev, prev
                )));
            }

            match self.map.get(&node.key) {
                Some(&mapped) if mapped == idx => {}
                Some(&mapped) => {
                    return Err(CacheError::violation(format!(
                        "slot {} holds a key indexed at slot {}",
                        idx, mapped
                    )));
                }
                None => {
                    return Err(CacheError::violation(format!(
                        "slot {} holds a key missing from the index",
                        idx
                    )));
                }
            }

            count += 1;
            prev = Some(idx);
            cursor = node.next;
        }

        if prev != self.tail {
            return Err(CacheError::violation(format!(
                "chain ends at {:?} but tail is {:?}",
                prev, self.tail
            )));
        }

        if count != len {
            return Err(CacheError::violation(format!(
                "chain has {} nodes, index has {}",
                count, len
            )));
        }

        Ok(())
    }

    fn node(&self, idx: usize) -> Option<&Node<K, V>> {
        self.nodes.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<K, V>> {
        self.nodes.get_mut(idx).and_then(Option::as_mut)
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }

        self.unlink(idx);
        self.push_front(idx);
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;

        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = old_head;
        }

        match old_head {
            Some(head_idx) => {
                if let Some(head) = self.node_mut(head_idx) {
                    head.prev = Some(idx);
                }
            }
            None => self.tail = Some(idx),
        }

        self.head = Some(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.node_mut(idx) {
            Some(node) => (node.prev.take(), node.next.take()),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = self.node_mut(prev_idx) {
                    prev_node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = self.node_mut(next_idx) {
                    next_node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn evict(&mut self) -> Option<(K, V)> {
        let tail_idx = self.tail?;
        let tail_key = &self.nodes[tail_idx].as_ref()?.key;
        self.map.remove(tail_key);

        // Unlink while the slot is still occupied; the links live in the node.
        self.unlink(tail_idx);
        self.free_node(tail_idx);
        self.nodes[tail_idx]
            .take()
            .map(|node| (node.key, node.value))
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.free_list.push(idx);
    }
}

/// Iterator over cache entries, most recently used first
pub struct Iter<'a, K, V> {
    nodes: &'a [Option<Node<K, V>>],
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.nodes.get(self.cursor?)?.as_ref()?;
        self.cursor = node.next;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::panic::{self, AssertUnwindSafe};

    fn keys<K: Hash + Eq + Clone, V>(cache: &LruCache<K, V>) -> Vec<K> {
        cache.iter().map(|(k, _)| k.clone()).collect()
    }

    #[test]
    fn test_lru_basic() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");

        assert_eq!(cache.get(&1), Some(&"a"));
        assert_eq!(cache.get(&2), Some(&"b"));
        assert_eq!(cache.len(), 2);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn test_lru_zero_capacity() {
        assert!(matches!(
            LruCache::<u32, u32>::new(0),
            Err(CacheError::ZeroCapacity)
        ));
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");
        let evicted = cache.put(3, "c");

        assert_eq!(evicted, Some((1, "a")));
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(&"b"));
        assert_eq!(cache.get(&3), Some(&"c"));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn test_lru_get_refreshes_recency() {
        let mut cache = LruCache::new(3).unwrap();

        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("c", 3);
        cache.get(&"a");
        cache.put("d", 4);

        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"a"));
        assert!(cache.contains(&"c"));
        assert!(cache.contains(&"d"));
        assert_eq!(keys(&cache), vec!["d", "a", "c"]);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn test_lru_update_does_not_evict() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.put("a", 10), None);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(&10));
        assert_eq!(keys(&cache), vec!["a", "b"]);
    }

    #[test]
    fn test_lru_peek_keeps_order() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");
        assert_eq!(cache.peek(&1), Some(&"a"));
        cache.put(3, "c");

        assert!(!cache.contains(&1));
        assert_eq!(cache.peek(&9), None);
    }

    #[test]
    fn test_lru_touch() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");
        assert!(cache.touch(&1));
        assert!(!cache.touch(&7));
        cache.put(3, "c");

        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
    }

    #[test]
    fn test_lru_remove_head_middle_tail() {
        let mut cache = LruCache::new(5).unwrap();
        for i in 1..=5 {
            cache.put(i, i * 10);
        }
        // chain: 5 4 3 2 1
        assert_eq!(cache.remove(&5), Some(50));
        cache.check_invariants().unwrap();
        assert_eq!(cache.remove(&3), Some(30));
        cache.check_invariants().unwrap();
        assert_eq!(cache.remove(&1), Some(10));
        cache.check_invariants().unwrap();

        assert_eq!(keys(&cache), vec![4, 2]);
        assert_eq!(cache.remove(&3), None);
    }

    #[test]
    fn test_lru_remove_only_entry() {
        let mut cache = LruCache::new(1).unwrap();

        cache.put("a", 1);
        assert_eq!(cache.remove(&"a"), Some(1));
        assert!(cache.is_empty());
        assert_eq!(cache.remove(&"a"), None);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn test_lru_capacity_one() {
        let mut cache = LruCache::new(1).unwrap();

        cache.put(1, "a");
        assert_eq!(cache.put(2, "b"), Some((1, "a")));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&2), Some(&"b"));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn test_lru_reuses_freed_slots() {
        let mut cache = LruCache::new(2).unwrap();

        for i in 0..100 {
            cache.put(i, i);
        }

        assert_eq!(cache.nodes.len(), 3);
        assert_eq!(keys(&cache), vec![99, 98]);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn test_lru_clear() {
        let mut cache = LruCache::new(3).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");
        cache.clear();

        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.iter().count(), 0);
        cache.check_invariants().unwrap();

        cache.put(3, "c");
        assert_eq!(keys(&cache), vec![3]);
    }

    #[test]
    fn test_lru_overwrite() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, "a");
        cache.put(1, "b");

        assert_eq!(cache.get(&1), Some(&"b"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_check_detects_broken_tail() {
        let mut cache = LruCache::new(3).unwrap();
        cache.put(1, "a");
        cache.put(2, "b");

        cache.tail = cache.head;
        assert!(matches!(
            cache.check_invariants(),
            Err(CacheError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_check_detects_cycle() {
        let mut cache = LruCache::new(3).unwrap();
        cache.put(1, "a");
        cache.put(2, "b");

        let head = cache.head.unwrap();
        let tail = cache.tail.unwrap();
        cache.nodes[tail].as_mut().unwrap().next = Some(head);
        assert!(cache.check_invariants().is_err());
    }

    #[test]
    fn test_check_detects_unindexed_node() {
        let mut cache = LruCache::new(3).unwrap();
        cache.put(1, "a");
        cache.put(2, "b");

        cache.map.remove(&1);
        assert!(cache.check_invariants().is_err());
    }

    #[derive(PartialEq, Eq, Hash)]
    struct Fragile {
        id: u32,
        explode_on_clone: bool,
    }

    impl Clone for Fragile {
        fn clone(&self) -> Self {
            if self.explode_on_clone {
                panic!("clone failed");
            }
            Fragile {
                id: self.id,
                explode_on_clone: false,
            }
        }
    }

    #[test]
    fn test_lru_panicking_key_leaves_state_intact() {
        let mut cache = LruCache::new(2).unwrap();
        cache.put(
            Fragile {
                id: 1,
                explode_on_clone: false,
            },
            "a",
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            cache.put(
                Fragile {
                    id: 2,
                    explode_on_clone: true,
                },
                "b",
            );
        }));

        assert!(result.is_err());
        assert_eq!(cache.len(), 1);
        cache.check_invariants().unwrap();
    }

    /// Reference model: keys ordered most recently used first
    fn model_refresh(model: &mut Vec<(u8, u32)>, key: u8) -> Option<(u8, u32)> {
        let pos = model.iter().position(|(k, _)| *k == key)?;
        let entry = model.remove(pos);
        model.insert(0, entry);
        Some(entry)
    }

    #[test]
    fn test_lru_order_matches_model_under_random_ops() {
        for seed in 0..200u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let capacity = rng.gen_range(1..=5);
            let mut cache = LruCache::new(capacity).unwrap();
            let mut model: Vec<(u8, u32)> = Vec::new();

            for step in 0..500u32 {
                let key = rng.gen_range(0..8u8);
                match rng.gen_range(0..20) {
                    0..=5 => {
                        let expected = model_refresh(&mut model, key).map(|(_, v)| v);
                        assert_eq!(cache.get(&key).copied(), expected);
                    }
                    6..=12 => {
                        let evicted = cache.put(key, step);
                        let expected = if model_refresh(&mut model, key).is_some() {
                            model[0].1 = step;
                            None
                        } else {
                            model.insert(0, (key, step));
                            if model.len() > capacity {
                                model.pop()
                            } else {
                                None
                            }
                        };
                        assert_eq!(evicted, expected);
                    }
                    13..=15 => {
                        let expected = model
                            .iter()
                            .position(|(k, _)| *k == key)
                            .map(|pos| model.remove(pos).1);
                        assert_eq!(cache.remove(&key), expected);
                    }
                    16..=18 => {
                        let expected = model_refresh(&mut model, key).is_some();
                        assert_eq!(cache.touch(&key), expected);
                    }
                    _ => {
                        cache.clear();
                        model.clear();
                    }
                }

                cache.check_invariants().unwrap();
                let order: Vec<(u8, u32)> = cache.iter().map(|(k, v)| (*k, *v)).collect();
                assert_eq!(order, model, "seed {} step {}", seed, step);
            }
        }
    }
}
