/// Block download coordination for the full node.
///
/// This module keeps the set of blocks still to be downloaded in step with
/// the chain index and hands them out to download workers. It includes:
///
/// - **Reservations**: Height-ordered table of outstanding block downloads
/// - **Sync Coordinator**: Reacts to chain reorganizations and backfills the table
///
/// ## Flow
///
/// 1. On run, the coordinator backfills every downloadable height above the
///    top valid candidate
/// 2. A header reorganization pops displaced heights off the back of the
///    table and pushes the new headers on
/// 3. Workers take the lowest pending height, or a stalled assignment of
///    another worker, download it and complete it
/// 4. A block reorganization advances the confirmed top
///
/// ## Reservation States
///
/// - **PENDING**: Waiting for a worker
/// - **ASSIGNED**: In flight on one worker
/// - **COMPLETE**: Stored, removed from the table
pub mod config;
pub mod coordinator;
pub mod reservations;
pub mod states;

pub use config::*;
pub use coordinator::SyncCoordinator;
pub use reservations::{Reservation, ReservationStats, Reservations};
pub use states::ReservationState;

#[cfg(test)]
mod tests;
