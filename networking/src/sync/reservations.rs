use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use containers::{HashDigest, Height};
use metrics::SharedMetrics;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::states::ReservationState;
use crate::types::WorkerId;

/// Snapshot of a table entry handed out to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub hash: HashDigest,
    pub height: Height,
    pub state: ReservationState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReservationStats {
    pub pending: usize,
    pub assigned: usize,
    /// Total reassignments of stalled entries since creation.
    pub reassigned: u64,
}

#[derive(Debug)]
struct Entry {
    hash: HashDigest,
    state: ReservationState,
    /// Lowest pending height when the entry was last assigned.
    frontier: Height,
}

/// Entries plus ordered indexes of pending and assigned heights.
///
/// Every tracked height is in exactly one of the two indexes.
#[derive(Debug, Default)]
struct Table {
    entries: BTreeMap<Height, Entry>,
    pending: BTreeSet<Height>,
    assigned: BTreeSet<Height>,
    reassigned: u64,
}

impl Table {
    fn lowest(&self) -> Option<Height> {
        self.entries.keys().next().copied()
    }

    fn highest(&self) -> Option<Height> {
        self.entries.keys().next_back().copied()
    }

    fn lowest_pending(&self) -> Option<Height> {
        self.pending.first().copied()
    }

    fn insert(&mut self, hash: HashDigest, height: Height) {
        self.entries.insert(height, Entry::pending(hash, height));
        self.pending.insert(height);
    }

    fn remove(&mut self, height: Height) -> Option<Entry> {
        let entry = self.entries.remove(&height)?;
        self.pending.remove(&height);
        self.assigned.remove(&height);
        Some(entry)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.pending.clear();
        self.assigned.clear();
    }

    fn stats(&self) -> ReservationStats {
        ReservationStats {
            pending: self.pending.len(),
            assigned: self.assigned.len(),
            reassigned: self.reassigned,
        }
    }
}

/// Height-ordered table of blocks still to be downloaded.
///
/// Heights form a contiguous run: entries are added below the lowest
/// height by backfill and above the highest height by header
/// reorganizations, and removed from the top when headers are displaced or
/// from anywhere when completed. A single lock serializes all operations,
/// so a height is never handed to two workers by one `get`.
pub struct Reservations {
    table: Mutex<Table>,
    maximum_deviation: Height,
    block_latency: Duration,
    metrics: Option<SharedMetrics>,
}

impl Reservations {
    pub fn new(maximum_deviation: Height, block_latency: Duration) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            maximum_deviation,
            block_latency,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn maximum_deviation(&self) -> Height {
        self.maximum_deviation
    }

    pub fn block_latency(&self) -> Duration {
        self.block_latency
    }

    /// Add `hash` below the current lowest height.
    ///
    /// Returns false if `height` does not extend the table downward.
    pub fn push_front(&self, hash: HashDigest, height: Height) -> bool {
        let mut table = self.table.lock();
        if let Some(lowest) = table.lowest() {
            if height >= lowest {
                warn!(height, lowest, "Reservation pushed out of order at front");
                return false;
            }
        }

        table.insert(hash, height);
        self.report(&table);
        true
    }

    /// Add `hash` above the current highest height.
    ///
    /// Returns false if `height` does not extend the table upward.
    pub fn push_back(&self, hash: HashDigest, height: Height) -> bool {
        let mut table = self.table.lock();
        if let Some(highest) = table.highest() {
            if height <= highest {
                warn!(height, highest, "Reservation pushed out of order at back");
                return false;
            }
        }

        table.insert(hash, height);
        self.report(&table);
        true
    }

    /// Remove the entry at `height` if it is the highest one.
    ///
    /// Heights that are no longer tracked (already completed) are ignored.
    /// An in-flight assignment at `height` is dropped with the entry, so
    /// its worker can no longer complete it.
    pub fn pop_back(&self, hash: &HashDigest, height: Height) -> bool {
        let mut table = self.table.lock();
        if !table.entries.contains_key(&height) {
            return false;
        }

        if table.highest() != Some(height) {
            warn!(height, highest = ?table.highest(), "Reservation popped out of order");
            return false;
        }

        let Some(entry) = table.remove(height) else {
            return false;
        };

        if entry.hash != *hash {
            warn!(height, expected = %hash, tracked = %entry.hash, "Popped reservation hash mismatch");
        }

        self.report(&table);
        true
    }

    /// Hand out work to `worker`.
    ///
    /// A stalled assignment of another worker is re-offered first, lowest
    /// height first. Otherwise the lowest pending entry is assigned.
    ///
    /// Deviation is measured from the lowest pending height at the time of
    /// assignment, so a reassigned entry is not taken again until the
    /// frontier moves a further `maximum_deviation` or the block latency
    /// elapses.
    pub fn get(&self, worker: WorkerId) -> Option<Reservation> {
        let now = Instant::now();
        let mut table = self.table.lock();
        let lowest_pending = table.lowest_pending();

        let stalled = table.assigned.iter().copied().find(|height| {
            table
                .entries
                .get(height)
                .is_some_and(|entry| self.is_stalled(entry, worker, now, lowest_pending))
        });

        let height = match stalled {
            Some(height) => height,
            None => lowest_pending?,
        };

        let entry = table.entries.get_mut(&height)?;
        let target = ReservationState::Assigned { worker, since: now };
        debug_assert!(entry.state.can_transition_to(target));

        let previous = std::mem::replace(&mut entry.state, target);
        entry.frontier = lowest_pending.map_or(height, |pending| pending.max(height));
        let reservation = Reservation {
            hash: entry.hash,
            height,
            state: target,
        };

        match previous {
            ReservationState::Assigned { worker: stalled_worker, .. } => {
                table.reassigned += 1;
                debug!(height, from = %stalled_worker, to = %worker, "Reassigned stalled reservation");
                if let Some(metrics) = &self.metrics {
                    metrics.inc_reservations_reassigned();
                }
            }
            _ => {
                table.pending.remove(&height);
                table.assigned.insert(height);
            }
        }

        self.report(&table);
        Some(reservation)
    }

    /// Mark the entry at `height` downloaded by `worker` and remove it.
    ///
    /// Only the current assignee may complete an entry, and `hash` must
    /// match the tracked hash.
    pub fn complete(&self, worker: WorkerId, height: Height, hash: &HashDigest) -> bool {
        let mut table = self.table.lock();
        let accepted = table
            .entries
            .get(&height)
            .is_some_and(|entry| entry.state.is_assigned_to(worker) && entry.hash == *hash);

        if !accepted {
            debug!(height, %worker, "Ignored completion of reservation not held by worker");
            return false;
        }

        table.remove(height);
        self.report(&table);
        true
    }

    /// Return the entry at `height` held by `worker` to pending.
    pub fn release(&self, worker: WorkerId, height: Height) -> bool {
        let mut table = self.table.lock();
        let Some(entry) = table.entries.get_mut(&height) else {
            return false;
        };

        if !entry.state.is_assigned_to(worker) {
            return false;
        }

        entry.state = ReservationState::Pending;
        table.assigned.remove(&height);
        table.pending.insert(height);
        self.report(&table);
        true
    }

    pub fn size(&self) -> usize {
        self.table.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().entries.is_empty()
    }

    pub fn contains(&self, height: Height) -> bool {
        self.table.lock().entries.contains_key(&height)
    }

    pub fn stats(&self) -> ReservationStats {
        self.table.lock().stats()
    }

    /// Tracked heights in ascending order.
    pub fn heights(&self) -> Vec<Height> {
        self.table.lock().entries.keys().copied().collect()
    }

    pub fn clear(&self) {
        let mut table = self.table.lock();
        table.clear();
        self.report(&table);
    }

    fn is_stalled(
        &self,
        entry: &Entry,
        worker: WorkerId,
        now: Instant,
        lowest_pending: Option<Height>,
    ) -> bool {
        match entry.state {
            ReservationState::Assigned { worker: assignee, since } => {
                assignee != worker
                    && (now.saturating_duration_since(since) >= self.block_latency
                        || lowest_pending.is_some_and(|pending| {
                            pending.saturating_sub(entry.frontier) > self.maximum_deviation
                        }))
            }
            _ => false,
        }
    }

    fn report(&self, table: &Table) {
        if let Some(metrics) = &self.metrics {
            let stats = table.stats();
            metrics.set_reservations(stats.pending, stats.assigned);
        }
    }
}

impl Entry {
    fn pending(hash: HashDigest, height: Height) -> Self {
        Self {
            hash,
            state: ReservationState::Pending,
            frontier: height,
        }
    }
}
