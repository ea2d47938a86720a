use std::time::Instant;

use crate::types::WorkerId;

/// Reservation state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReservationState {
    /// Awaiting a worker.
    #[default]
    Pending,

    /// Handed to `worker` at `since`.
    ///
    /// An assignment that outlives the block latency, or that the lowest
    /// pending height has passed by more than the maximum deviation since it
    /// was made, is stalled and may be re-offered to a different worker.
    Assigned { worker: WorkerId, since: Instant },

    /// Block downloaded and stored. Complete entries leave the table.
    Complete,
}

impl ReservationState {
    /// Check if a transition to the target state is valid.
    ///
    /// Assigned to Assigned is a reassignment to another worker.
    pub fn can_transition_to(&self, target: ReservationState) -> bool {
        match self {
            ReservationState::Pending => matches!(target, ReservationState::Assigned { .. }),
            ReservationState::Assigned { worker, .. } => match target {
                ReservationState::Pending | ReservationState::Complete => true,
                ReservationState::Assigned { worker: next, .. } => next != *worker,
            },
            ReservationState::Complete => false,
        }
    }

    pub fn is_assigned_to(&self, worker: WorkerId) -> bool {
        matches!(self, ReservationState::Assigned { worker: assignee, .. } if *assignee == worker)
    }
}

