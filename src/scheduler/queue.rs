use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

use super::types::Feed;

/// A queued job: the feed snapshot and when it's due.
#[derive(Clone, Debug)]
pub struct FeedQueueItem {
    pub feed: Feed,
    pub deadline: DateTime<Utc>,
}

// heap key is (deadline, insertion sequence); the sequence makes equal deadlines pop FIFO
#[derive(Debug)]
struct Entry {
    deadline: DateTime<Utc>,
    seq: u64,
    item: FeedQueueItem,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

/// Min-heap of jobs, earliest deadline first.
///
/// Not synchronized: the dispatch loop owns it and is its only caller.
#[derive(Debug, Default)]
pub struct FeedQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl FeedQueue {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.heap.len() }

    pub fn is_empty(&self) -> bool { self.heap.is_empty() }

    pub fn push(&mut self, item: FeedQueueItem) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry { deadline: item.deadline, seq, item }));
    }

    pub fn pop(&mut self) -> Option<FeedQueueItem> {
        self.heap.pop().map(|Reverse(e)| e.item)
    }

    /// The item the next `pop` returns.
    pub fn peek(&self) -> Option<&FeedQueueItem> {
        self.heap.peek().map(|Reverse(e)| &e.item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn base() -> DateTime<Utc> { Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap() }

    fn item(deadline: DateTime<Utc>) -> FeedQueueItem {
        FeedQueueItem { feed: Feed { id: Uuid::new_v4(), ..Default::default() }, deadline }
    }

    #[test]
    fn pops_in_deadline_order() {
        let a = base();
        let b = a + Duration::minutes(10);
        let c = a + Duration::minutes(20);

        let mut q = FeedQueue::new();
        q.push(item(c));
        q.push(item(b));
        q.push(item(a));

        assert_eq!(q.len(), 3);
        assert_eq!(q.peek().unwrap().deadline, a);
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop().unwrap().deadline, a);
        assert_eq!(q.pop().unwrap().deadline, b);
        assert_eq!(q.pop().unwrap().deadline, c);
        assert!(q.pop().is_none());
        assert!(q.peek().is_none());
    }

    #[test]
    fn equal_deadlines_pop_in_push_order() {
        let a = base();
        let later = a + Duration::minutes(20);
        let first = item(a);
        let second = item(a);
        let third = item(a);
        let ids = [first.feed.id, second.feed.id, third.feed.id];

        let mut q = FeedQueue::new();
        q.push(item(later));
        q.push(first);
        q.push(second);
        q.push(third);

        for id in ids {
            let peeked = q.peek().unwrap().feed.id;
            let popped = q.pop().unwrap();
            assert_eq!(popped.feed.id, peeked);
            assert_eq!(popped.feed.id, id);
            assert_eq!(popped.deadline, a);
        }
        assert_eq!(q.pop().unwrap().deadline, later);
    }

    #[test]
    fn len_tracks_pushes_minus_pops_on_mixed_sequences() {
        let mut q = FeedQueue::new();
        let mut pushed = 0usize;
        let mut popped = 0usize;

        // deterministic pseudo-random deadlines with lots of duplicates
        let mut x: u64 = 7;
        for round in 0..200 {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            if round % 3 == 2 {
                if q.pop().is_some() { popped += 1; }
            } else {
                q.push(item(base() + Duration::minutes((x >> 60) as i64)));
                pushed += 1;
            }
            assert_eq!(q.len(), pushed - popped);
        }

        // draining what's left is non-decreasing
        let mut prev = None;
        while let Some(it) = q.pop() {
            if let Some(p) = prev { assert!(it.deadline >= p); }
            prev = Some(it.deadline);
            popped += 1;
        }
        assert_eq!(pushed, popped);
        assert!(q.is_empty());
    }
}
