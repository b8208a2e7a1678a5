//! One-shot timers drained by the world tick.
//!
//! Tasks are never cancelled. Each handler re-checks the state it acts on when it
//! fires, so a stale timer is a harmless no-op.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::identity_key::IdentityKey;
use crate::lifecycle::ControllerId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FamilyId(pub usize);

impl std::fmt::Display for FamilyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "family#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TimerTask {
    /// Recurring spawn cycle; re-arms itself after running.
    SpawnCycle { family: FamilyId },
    /// Single spawn re-attempt requested after a depletion or destroy.
    RespawnAttempt { family: FamilyId },
    DeferredRelease { family: FamilyId, controller: ControllerId },
    SwingExpiry { owner: IdentityKey, swing_id: u64 },
    PickupDespawn { pickup_id: u64 },
}

#[derive(Debug)]
struct ScheduledTimer {
    due_ms: u64,
    seq: u64,
    task: TimerTask,
}

impl PartialEq for ScheduledTimer {
    fn eq(&self, other: &Self) -> bool {
        self.due_ms == other.due_ms && self.seq == other.seq
    }
}

impl Eq for ScheduledTimer {}

impl PartialOrd for ScheduledTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due_ms, self.seq).cmp(&(other.due_ms, other.seq))
    }
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<ScheduledTimer>>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, due_ms: u64, task: TimerTask) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(ScheduledTimer { due_ms, seq, task }));
    }

    pub fn schedule_in(&mut self, now_ms: u64, delay_ms: u64, task: TimerTask) {
        self.schedule_at(now_ms.saturating_add(delay_ms), task);
    }

    /// Pops the earliest timer due at or before `now_ms`, with its due time.
    /// Timers due at the same instant come out in the order they were scheduled.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(u64, TimerTask)> {
        match self.heap.peek() {
            Some(Reverse(next)) if next.due_ms <= now_ms => {}
            _ => return None,
        }
        self.heap.pop().map(|Reverse(timer)| (timer.due_ms, timer.task))
    }

    pub fn next_due(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(timer)| timer.due_ms)
    }

    pub fn pending(&self) -> impl Iterator<Item = &TimerTask> {
        self.heap.iter().map(|Reverse(timer)| &timer.task)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
