use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::envelope::NoteId;
use super::nodes::NodeId;
use super::track::TrackId;

/// Bookkeeping to undo once a scheduled sound is certainly over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    /// Stop and forget a synth note
    Note(NoteId),
    /// Remove a clip's buffer player
    Source { track: TrackId, node: NodeId },
    /// Remove a metronome click player
    Tick(NodeId),
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: f64,
    seq: u64,
    action: CleanupAction,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.total_cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

/// Min-heap of cleanup deadlines on the audio clock
///
/// Entries scheduled with the same deadline come out in insertion order.
/// Actions for things that were already cleaned up some other way are
/// harmless: every handler treats an unknown id as a no-op.
#[derive(Debug, Default)]
pub struct CleanupQueue {
    heap: BinaryHeap<Reverse<Deadline>>,
    seq: u64,
}

impl CleanupQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, at: f64, action: CleanupAction) {
        self.heap.push(Reverse(Deadline {
            at,
            seq: self.seq,
            action,
        }));
        self.seq += 1;
    }

    /// Next action whose deadline is at or before `now`
    pub fn pop_due(&mut self, now: f64) -> Option<CleanupAction> {
        match self.heap.peek() {
            Some(Reverse(next)) if next.at <= now => self.heap.pop().map(|Reverse(d)| d.action),
            _ => None,
        }
    }

    /// Keep only the actions `keep` accepts
    pub fn retain(&mut self, mut keep: impl FnMut(&CleanupAction) -> bool) {
        self.heap.retain(|Reverse(deadline)| keep(&deadline.action));
    }

    /// Deadline of the earliest pending action
    pub fn next_deadline(&self) -> Option<f64> {
        self.heap.peek().map(|Reverse(d)| d.at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
