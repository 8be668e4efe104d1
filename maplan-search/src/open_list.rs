use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use maplan_state::StateId;

const BUCKET_QUEUE_SIZE: usize = 1024;

/// Adaptive open-list priority queue (spec §4.B), ordered by a non-negative
/// integer key (f-value, heuristic value, ...).
///
/// While every key seen so far is below [`BUCKET_QUEUE_SIZE`], elements are
/// stored in one `VecDeque` per key value, which makes push/pop O(1). As
/// soon as a key that large is pushed, the queue permanently switches to a
/// binary heap: mixing the two would break pop ordering for any key already
/// sitting in a bucket above the heap's low-water mark.
pub struct OpenList {
    buckets: Vec<VecDeque<StateId>>,
    bucket_lowest: usize,
    bucket_count: usize,
    heap: BinaryHeap<Reverse<(i64, u64, StateId)>>,
    use_heap: bool,
    seq: u64,
}

impl OpenList {
    pub fn new() -> Self {
        OpenList {
            buckets: (0..BUCKET_QUEUE_SIZE).map(|_| VecDeque::new()).collect(),
            bucket_lowest: 0,
            bucket_count: 0,
            heap: BinaryHeap::new(),
            use_heap: false,
            seq: 0,
        }
    }

    pub fn push(&mut self, key: i64, value: StateId) {
        if !self.use_heap && key >= 0 && (key as usize) < BUCKET_QUEUE_SIZE {
            self.buckets[key as usize].push_back(value);
            self.bucket_count += 1;
            if (key as usize) < self.bucket_lowest {
                self.bucket_lowest = key as usize;
            }
            return;
        }

        if !self.use_heap {
            self.migrate_to_heap();
        }
        self.seq += 1;
        self.heap.push(Reverse((key, self.seq, value)));
    }

    fn migrate_to_heap(&mut self) {
        self.use_heap = true;
        for key in self.bucket_lowest..BUCKET_QUEUE_SIZE {
            while let Some(value) = self.buckets[key].pop_front() {
                self.seq += 1;
                self.heap.push(Reverse((key as i64, self.seq, value)));
            }
        }
        self.bucket_count = 0;
    }

    pub fn pop(&mut self) -> Option<(i64, StateId)> {
        if self.use_heap {
            return self.heap.pop().map(|Reverse((key, _, value))| (key, value));
        }

        while self.bucket_lowest < BUCKET_QUEUE_SIZE && self.buckets[self.bucket_lowest].is_empty() {
            self.bucket_lowest += 1;
        }
        if self.bucket_lowest >= BUCKET_QUEUE_SIZE {
            return None;
        }
        let value = self.buckets[self.bucket_lowest].pop_front()?;
        self.bucket_count -= 1;
        Some((self.bucket_lowest as i64, value))
    }

    pub fn is_empty(&self) -> bool {
        if self.use_heap {
            self.heap.is_empty()
        } else {
            self.bucket_count == 0
        }
    }
}

impl Default for OpenList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_mode_pops_in_key_order() {
        let mut q = OpenList::new();
        q.push(5, StateId::from(0usize));
        q.push(1, StateId::from(1usize));
        q.push(3, StateId::from(2usize));
        assert_eq!(q.pop().unwrap().0, 1);
        assert_eq!(q.pop().unwrap().0, 3);
        assert_eq!(q.pop().unwrap().0, 5);
        assert!(q.pop().is_none());
    }

    #[test]
    fn large_key_migrates_to_heap_without_losing_order() {
        let mut q = OpenList::new();
        q.push(2, StateId::from(0usize));
        q.push(BUCKET_QUEUE_SIZE as i64 + 10, StateId::from(1usize));
        q.push(1, StateId::from(2usize));
        assert_eq!(q.pop().unwrap().0, 1);
        assert_eq!(q.pop().unwrap().0, 2);
        assert_eq!(q.pop().unwrap().0, BUCKET_QUEUE_SIZE as i64 + 10);
    }

    #[test]
    fn ties_pop_in_fifo_order() {
        let mut q = OpenList::new();
        q.push(1, StateId::from(0usize));
        q.push(1, StateId::from(1usize));
        assert_eq!(q.pop().unwrap().1, StateId::from(0usize));
        assert_eq!(q.pop().unwrap().1, StateId::from(1usize));
    }
}
