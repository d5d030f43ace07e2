// Timer queue - Single-shot deadlines that re-arm scheduler ticks

use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct Entry<K> {
    deadline: f64,
    order: u64,
    key: K,
}

impl<K> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K> Eq for Entry<K> {}

impl<K> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Entry<K> {
    // Reversed: BinaryHeap is a max-heap and the earliest deadline must pop first.
    // Equal deadlines pop in insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .total_cmp(&self.deadline)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Min-heap of (deadline ms, key)
pub struct TimerQueue<K> {
    heap: BinaryHeap<Entry<K>>,
    next_order: u64,
}

impl<K> TimerQueue<K> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_order: 0,
        }
    }

    pub fn schedule(&mut self, deadline: f64, key: K) {
        let order = self.next_order;
        self.next_order += 1;
        self.heap.push(Entry {
            deadline,
            order,
            key,
        });
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.deadline)
    }

    /// Pop the earliest entry if its deadline is at or before `now`
    pub fn pop_due(&mut self, now: f64) -> Option<K> {
        if self.next_deadline()? <= now {
            self.heap.pop().map(|e| e.key)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
