mod alternatives;
mod attempt;
mod availability;
mod commit;
mod error;
mod interval;
mod pricing;
#[cfg(test)]
mod tests;

pub use alternatives::AlternativeQuery;
pub use attempt::{AttemptOutcome, AttemptState};
pub use availability::{evaluate, occupancy_window};
pub use error::EngineError;
pub use interval::{merge_overlapping, overlaps, subtract_intervals};
pub use pricing::compute_quote;

use std::sync::Arc;
use std::time::{Duration, Instant};

use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::store::{BookingWriter, OccupancyProvider};

/// Tunables for availability checks and the alternative search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub business_hours: BusinessHours,
    pub horizon_days: u32,
    pub max_alternatives: usize,
    pub step_minutes: u32,
    /// How far before a requested slot occupancy is fetched, so records
    /// starting earlier but reaching into the slot are seen, even from a
    /// provider that filters by start time. At least the longest booking.
    pub lookback_minutes: u32,
    pub query_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            business_hours: BusinessHours {
                open_hour: 8,
                close_hour: 20,
            },
            horizon_days: 7,
            max_alternatives: 3,
            step_minutes: 60,
            lookback_minutes: 24 * 60,
            query_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    pub fn lookback_ms(&self) -> Ms {
        self.lookback_minutes as Ms * MINUTE_MS
    }
}

/// Availability, alternative search, pricing and booking commit over a pair of
/// narrow store contracts.
pub struct Engine {
    occupancy: Arc<dyn OccupancyProvider>,
    writer: Arc<dyn BookingWriter>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        occupancy: Arc<dyn OccupancyProvider>,
        writer: Arc<dyn BookingWriter>,
        config: EngineConfig,
    ) -> Self {
        Self {
            occupancy,
            writer,
            config,
        }
    }

    /// Engine reading from and writing to the same store.
    pub fn over<S>(store: Arc<S>, config: EngineConfig) -> Self
    where
        S: OccupancyProvider + BookingWriter + 'static,
    {
        Self::new(store.clone(), store, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One occupancy query, bounded by the configured timeout. A timeout is a
    /// transient failure, never an empty calendar.
    pub(super) async fn fetch_occupancy(
        &self,
        provider_id: ProviderId,
        window: Span,
    ) -> Result<Occupancy, EngineError> {
        let started = Instant::now();
        let result = tokio::time::timeout(
            self.config.query_timeout,
            self.occupancy.fetch_occupancy(provider_id, window),
        )
        .await;
        metrics::histogram!(observability::OCCUPANCY_QUERY_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(Ok(occupancy)) => Ok(occupancy),
            Ok(Err(e)) => {
                metrics::counter!(observability::OCCUPANCY_QUERY_FAILURES_TOTAL).increment(1);
                tracing::error!("occupancy query for provider {provider_id} failed: {e}");
                Err(e.into())
            }
            Err(_) => {
                metrics::counter!(observability::OCCUPANCY_QUERY_FAILURES_TOTAL).increment(1);
                tracing::error!(
                    "occupancy query for provider {provider_id} timed out after {:?}",
                    self.config.query_timeout
                );
                Err(EngineError::Transient(format!(
                    "occupancy query timed out after {}ms",
                    self.config.query_timeout.as_millis()
                )))
            }
        }
    }

    pub async fn cancel_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let booking = self.writer.cancel_booking(id).await?;
        tracing::info!("cancelled booking {id} for provider {}", booking.provider_id);
        Ok(booking)
    }
}
