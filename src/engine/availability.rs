use chrono::NaiveDate;
use tracing::debug;

use crate::model::*;
use crate::observability;

use super::interval::{merge_overlapping, overlaps, subtract_intervals};
use super::{Engine, EngineError};

/// Verdict for `requested` against already-fetched occupancy. Cancelled
/// bookings are skipped; blocked periods always count. Stops at the first
/// overlap.
pub fn evaluate(requested: &TimeSlot, occupancy: &Occupancy) -> AvailabilityResult {
    occupancy
        .iter()
        .find(|interval| interval.is_occupying() && overlaps(requested, interval))
        .map_or(AvailabilityResult::Available, |interval| {
            AvailabilityResult::Unavailable {
                conflict_with: interval.id,
            }
        })
}

/// Occupancy window for one check: `lookback` before the slot starts through
/// the later of its end and one day after its start.
///
/// The lookback catches intervals that begin before the slot and run into it,
/// even from a provider that only filters records by start time.
pub fn occupancy_window(requested: &TimeSlot, lookback: Ms) -> Span {
    let span = requested.span();
    Span::new(span.start - lookback, span.end.max(span.start + DAY_MS))
}

impl Engine {
    /// Whether `requested` is bookable for the provider right now.
    pub async fn check_availability(
        &self,
        provider_id: ProviderId,
        requested: &TimeSlot,
    ) -> Result<AvailabilityResult, EngineError> {
        let window = occupancy_window(requested, self.config.lookback_ms());
        let occupancy = self.fetch_occupancy(provider_id, window).await?;
        let result = evaluate(requested, &occupancy);

        let label = if result.is_available() { "available" } else { "unavailable" };
        metrics::counter!(observability::AVAILABILITY_CHECKS_TOTAL, "result" => label).increment(1);
        debug!(
            "availability for provider {provider_id} at {} ({} min): {label}",
            requested.start(),
            requested.duration_minutes()
        );
        Ok(result)
    }

    /// Free stretches of one business day, in order.
    pub async fn free_windows(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
        hours: BusinessHours,
    ) -> Result<Vec<FreeWindow>, EngineError> {
        hours.validate()?;
        let day = hours.span_on(date);
        let window = Span::new(day.start - self.config.lookback_ms(), day.end);
        let occupancy = self.fetch_occupancy(provider_id, window).await?;
        let busy = merge_overlapping(&occupancy.occupying_spans());
        Ok(subtract_intervals(&[day], &busy)
            .iter()
            .filter_map(FreeWindow::from_span)
            .collect())
    }
}
