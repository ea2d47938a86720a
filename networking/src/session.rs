use std::sync::Arc;

use chain::ChainIndex;
use containers::Block;
use tracing::debug;

use crate::error::SessionError;
use crate::sync::{Reservation, Reservations};
use crate::types::{SessionKind, WorkerId};

/// A peer session acting as one download worker.
///
/// The session takes work from the shared reservation table, hands
/// downloaded blocks to the chain index, and reports the outcome back to
/// the table. Transport is left to the network service driving it.
pub struct Session {
    id: WorkerId,
    kind: SessionKind,
    chain: Arc<dyn ChainIndex>,
    reservations: Arc<Reservations>,
}

impl Session {
    pub fn new(
        id: WorkerId,
        kind: SessionKind,
        chain: Arc<dyn ChainIndex>,
        reservations: Arc<Reservations>,
    ) -> Self {
        Self {
            id,
            kind,
            chain,
            reservations,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn chain(&self) -> &Arc<dyn ChainIndex> {
        &self.chain
    }

    pub fn reservations(&self) -> &Arc<Reservations> {
        &self.reservations
    }

    pub fn next_reservation(&self) -> Option<Reservation> {
        self.reservations.get(self.id)
    }

    /// Store a downloaded `block` and complete `reservation`.
    ///
    /// On a hash mismatch or a store failure the reservation is released
    /// for another attempt.
    pub fn deliver(&self, reservation: &Reservation, block: Block) -> Result<(), SessionError> {
        let actual = block.hash();
        if actual != reservation.hash {
            self.reservations.release(self.id, reservation.height);
            return Err(SessionError::UnexpectedBlock {
                expected: reservation.hash,
                actual,
                height: reservation.height,
            });
        }

        if let Err(source) = self.chain.store(Arc::new(block), reservation.height) {
            self.reservations.release(self.id, reservation.height);
            return Err(SessionError::Store {
                height: reservation.height,
                source,
            });
        }

        if !self
            .reservations
            .complete(self.id, reservation.height, &reservation.hash)
        {
            return Err(SessionError::NotAssigned(reservation.height));
        }

        debug!(worker = %self.id, height = reservation.height, "Block downloaded");
        Ok(())
    }

    /// Give `reservation` back to the table without downloading it.
    pub fn abandon(&self, reservation: &Reservation) -> bool {
        self.reservations.release(self.id, reservation.height)
    }
}
