use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::{Engine, EngineError};

fn now_ms() -> Ms {
    to_ms(chrono::Local::now().naive_local())
}

fn validate_metadata(metadata: &BookingMetadata) -> Result<(), EngineError> {
    if metadata.client_id.trim().is_empty() {
        return Err(EngineError::Validation("client id is required".into()));
    }
    if metadata.client_id.len() > MAX_CLIENT_ID_LEN {
        return Err(EngineError::LimitExceeded("client id too long"));
    }
    if metadata.label.as_ref().is_some_and(|l| l.len() > MAX_LABEL_LEN) {
        return Err(EngineError::LimitExceeded("label too long"));
    }
    if metadata.note.as_ref().is_some_and(|n| n.len() > MAX_NOTE_LEN) {
        return Err(EngineError::LimitExceeded("note too long"));
    }
    Ok(())
}

impl Engine {
    /// Persist a booking for `requested` if the slot is still free.
    ///
    /// Availability is re-checked first so a slot taken since the client last
    /// looked fails without a write. That check cannot close the race between
    /// two clients submitting at once; the writer's overlap rejection does, and
    /// it surfaces as the same [`EngineError::Conflict`].
    pub async fn commit_booking(
        &self,
        provider_id: ProviderId,
        requested: TimeSlot,
        quote: PriceQuote,
        metadata: BookingMetadata,
    ) -> Result<Booking, EngineError> {
        let result = self.commit_inner(provider_id, requested, quote, metadata).await;
        let outcome = match &result {
            Ok(_) => "committed",
            Err(e) => e.kind(),
        };
        metrics::counter!(observability::COMMITS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn commit_inner(
        &self,
        provider_id: ProviderId,
        requested: TimeSlot,
        quote: PriceQuote,
        metadata: BookingMetadata,
    ) -> Result<Booking, EngineError> {
        validate_metadata(&metadata)?;
        quote.verify()?;

        if let AvailabilityResult::Unavailable { conflict_with } =
            self.check_availability(provider_id, &requested).await?
        {
            warn!(
                "booking for provider {provider_id} at {} already taken by {conflict_with}",
                requested.start()
            );
            return Err(EngineError::Conflict(conflict_with));
        }

        let record = NewBooking {
            id: Ulid::new(),
            provider_id,
            slot: requested,
            quote,
            metadata,
            created_at: now_ms(),
        };
        match self.writer.insert_booking(record).await {
            Ok(booking) => {
                info!(
                    "booking {} committed for provider {provider_id} at {} ({} min)",
                    booking.id,
                    requested.start(),
                    requested.duration_minutes()
                );
                Ok(booking)
            }
            Err(e) => {
                let err = EngineError::from(e);
                if err.is_conflict() {
                    warn!(
                        "store rejected booking for provider {provider_id} at {}: {err}",
                        requested.start()
                    );
                }
                Err(err)
            }
        }
    }
}
