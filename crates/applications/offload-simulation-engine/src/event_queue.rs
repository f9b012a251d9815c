//! Simulated-time event queue
//!
//! Events are ordered by time, then by insertion sequence, so two events at
//! the same instant always fire in the order they were scheduled.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// What wakes up the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Task at this index of the run's task list arrives
    TaskArrival { index: usize },
    /// In-flight process resumes after a suspension
    Resume { process: usize },
}

/// Timed event wrapper for priority queue ordering
#[derive(Debug, Clone)]
struct TimedEvent {
    time: f64,
    seq: u64,
    event: Event,
}

// Priority queue orders by (time, seq), earliest first
impl Ord for TimedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for min-heap (BinaryHeap is max-heap by default)
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for TimedEvent {}

impl PartialEq for TimedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

/// Min-heap of pending events
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<TimedEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, time: f64, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimedEvent { time, seq, event });
    }

    /// Pop the earliest event as `(time, event)`
    pub fn pop(&mut self) -> Option<(f64, Event)> {
        self.heap.pop().map(|timed| (timed.time, timed.event))
    }

    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|timed| timed.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pops_in_time_order() {
        let mut queue = EventQueue::new();
        queue.schedule(3.0, Event::Resume { process: 3 });
        queue.schedule(1.0, Event::Resume { process: 1 });
        queue.schedule(2.0, Event::Resume { process: 2 });

        assert_eq!(queue.peek_time(), Some(1.0));
        let order: Vec<f64> = std::iter::from_fn(|| queue.pop().map(|(t, _)| t)).collect();
        assert_eq!(order, vec![1.0, 2.0, 3.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_ties_break_by_insertion() {
        let mut queue = EventQueue::new();
        queue.schedule(5.0, Event::TaskArrival { index: 0 });
        queue.schedule(5.0, Event::Resume { process: 9 });
        queue.schedule(5.0, Event::TaskArrival { index: 1 });
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop(), Some((5.0, Event::TaskArrival { index: 0 })));
        assert_eq!(queue.pop(), Some((5.0, Event::Resume { process: 9 })));
        assert_eq!(queue.pop(), Some((5.0, Event::TaskArrival { index: 1 })));
        assert_eq!(queue.pop(), None);
    }
}
