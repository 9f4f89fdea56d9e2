mod ledger;

pub use ledger::LedgerStore;

use async_trait::async_trait;
use thiserror::Error;
use ulid::Ulid;

use crate::model::{Booking, NewBooking, Occupancy, ProviderId, Span};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The write overlaps an occupying interval with this id.
    #[error("overlaps occupied interval {0}")]
    Conflict(Ulid),
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("invalid record: {0}")]
    Invalid(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    /// Backend unreachable, timed out or failed to persist.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read side: what occupies a provider's calendar.
#[async_trait]
pub trait OccupancyProvider: Send + Sync {
    /// All bookings (cancelled ones marked as such) and blocked periods whose
    /// interval intersects `window`.
    async fn fetch_occupancy(
        &self,
        provider_id: ProviderId,
        window: Span,
    ) -> Result<Occupancy, StoreError>;
}

/// Write side. Implementations are the serialization point for bookings:
/// `insert_booking` must reject any record overlapping an active booking or
/// blocked period of the same provider, atomically with the write.
#[async_trait]
pub trait BookingWriter: Send + Sync {
    async fn insert_booking(&self, record: NewBooking) -> Result<Booking, StoreError>;

    async fn cancel_booking(&self, id: Ulid) -> Result<Booking, StoreError>;
}
