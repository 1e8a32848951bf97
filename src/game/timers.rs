//! Deferred timers
//!
//! Timers carry entity ids or placement data, never references. When a timer
//! fires against an id that is no longer registered it is a no-op, so there
//! is nothing to cancel when an entity is removed early.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use super::entity::{EntityId, Position};

/// Work to run when a timer fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// A dropped item starts blinking
    ItemBlink { item: EntityId },
    /// A dropped item is removed
    ItemDespawn { item: EntityId },
    /// A picked up static item reappears
    RespawnItem { kind: String, position: Position },
    /// An opened static chest reappears
    RespawnChest { position: Position, items: Vec<String> },
    /// A dead mob comes back
    RespawnMob {
        kind: String,
        spawn: Position,
        area: Option<usize>,
    },
}

#[derive(Debug)]
struct Scheduled {
    due: Instant,
    /// Insertion order, keeps timers with equal deadlines FIFO
    seq: u64,
    event: TimerEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed: the heap pops the earliest deadline first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of pending timers
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `event` to fire `delay` after `now`
    pub fn schedule(&mut self, now: Instant, delay: Duration, event: TimerEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled {
            due: now + delay,
            seq,
            event,
        });
    }

    /// Deadline of the earliest pending timer
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|s| s.due)
    }

    /// Pop the earliest timer if it is due at `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerEvent> {
        if self.heap.peek()?.due > now {
            return None;
        }
        self.heap.pop().map(|s| s.event)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
