//! Bounded elite set: keeps the `capacity` smallest items seen.

use std::collections::BinaryHeap;

/// Fixed-capacity set of the best (smallest) items.
///
/// Insert and evict are O(log n): the heap keeps the worst retained item on
/// top so it can be dropped as soon as something better arrives.
#[derive(Debug, Clone)]
pub struct EliteSet<T: Ord> {
    capacity: usize,
    heap: BinaryHeap<T>,
}

impl<T: Ord> EliteSet<T> {
    /// An empty set holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1)),
        }
    }

    /// Insert an item, returning whatever fell out of the set.
    ///
    /// The returned item is either the previous worst member or `item`
    /// itself when it does not beat the current worst.
    pub fn insert(&mut self, item: T) -> Option<T> {
        self.heap.push(item);
        if self.heap.len() > self.capacity {
            self.heap.pop()
        } else {
            None
        }
    }

    /// The worst retained item.
    pub fn worst(&self) -> Option<&T> {
        self.heap.peek()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Members, best first.
    pub fn into_sorted_vec(self) -> Vec<T> {
        self.heap.into_sorted_vec()
    }
}
