use std::cmp::Ordering;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{TimerCallback, TimerId};

/// An armed timer inside the registry heap.
pub(crate) struct TimerEntry {
    pub(crate) id: TimerId,

    /// The instant at which the timer next produces a message.
    pub(crate) deadline: Instant,

    /// Insertion sequence, breaks ties between equal deadlines.
    pub(crate) seq: u64,

    pub(crate) interval: Duration,

    pub(crate) repeating: bool,

    pub(crate) callback: TimerCallback,

    /// Set on cancellation; shared with every message this timer produced.
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl TimerEntry {
    fn key(&self) -> (Instant, u64) {
        (self.deadline, self.seq)
    }
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Ord for TimerEntry {
    /// Reversed so that `BinaryHeap<TimerEntry>` pops the earliest
    /// deadline first, and among equal deadlines the earliest armed.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;
    use std::sync::Mutex;

    fn entry(id: TimerId, deadline: Instant, seq: u64) -> TimerEntry {
        let callback: Box<dyn FnMut(TimerId) + Send> = Box::new(|_| {});
        TimerEntry {
            id,
            deadline,
            seq,
            interval: Duration::from_millis(10),
            repeating: false,
            callback: Arc::new(Mutex::new(callback)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn heap_pops_earliest_deadline_first() {
        let base = Instant::now();
        let mut heap = BinaryHeap::new();
        heap.push(entry(1, base + Duration::from_millis(30), 0));
        heap.push(entry(2, base + Duration::from_millis(10), 1));
        heap.push(entry(3, base + Duration::from_millis(20), 2));

        let order: Vec<TimerId> = std::iter::from_fn(|| heap.pop().map(|e| e.id)).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn equal_deadlines_pop_in_insertion_order() {
        let deadline = Instant::now() + Duration::from_millis(5);
        let mut heap = BinaryHeap::new();
        heap.push(entry(7, deadline, 2));
        heap.push(entry(5, deadline, 0));
        heap.push(entry(6, deadline, 1));

        let order: Vec<TimerId> = std::iter::from_fn(|| heap.pop().map(|e| e.id)).collect();
        assert_eq!(order, vec![5, 6, 7]);
    }
}
