use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::evaluate;
use super::{Engine, EngineError};

/// Bounded search for free slots of a given length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeQuery {
    pub anchor_date: NaiveDate,
    pub duration_minutes: u32,
    pub hours: BusinessHours,
    pub horizon_days: u32,
    pub max_results: usize,
    pub step_minutes: u32,
    /// Candidates starting earlier than this are skipped.
    pub not_before: Option<NaiveDateTime>,
}

impl AlternativeQuery {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.hours.validate()?;
        if self.duration_minutes == 0 {
            return Err(ModelError::ZeroDuration.into());
        }
        if self.duration_minutes > MAX_DURATION_MINUTES {
            return Err(ModelError::DurationTooLong(self.duration_minutes).into());
        }
        if self.step_minutes < MIN_STEP_MINUTES {
            return Err(EngineError::Validation(format!(
                "step must be at least {MIN_STEP_MINUTES} minutes"
            )));
        }
        if self.horizon_days > MAX_HORIZON_DAYS {
            return Err(EngineError::LimitExceeded("horizon too far"));
        }
        if self.max_results > MAX_ALTERNATIVES {
            return Err(EngineError::LimitExceeded("too many results requested"));
        }
        Ok(())
    }

    /// Candidate start instants on `date`, in order: from opening time in
    /// `step_minutes` increments, as long as the slot ends by closing time.
    /// With hourly steps the start hours are exactly
    /// `open_hour..=close_hour - ceil(duration / 60)`.
    pub fn candidate_starts(&self, date: NaiveDate) -> Vec<NaiveDateTime> {
        let midnight = date.and_time(NaiveTime::MIN);
        let close = self.hours.close_hour * 60;
        let mut starts = Vec::new();
        let mut minute = self.hours.open_hour * 60;
        while minute + self.duration_minutes <= close {
            let start = midnight + TimeDelta::minutes(minute as i64);
            if self.not_before.is_none_or(|nb| start >= nb) {
                starts.push(start);
            }
            minute += self.step_minutes;
        }
        starts
    }
}

impl Engine {
    /// Query seeded with the configured hours, horizon, result cap and step.
    pub fn alternative_query(&self, anchor_date: NaiveDate, duration_minutes: u32) -> AlternativeQuery {
        AlternativeQuery {
            anchor_date,
            duration_minutes,
            hours: self.config.business_hours,
            horizon_days: self.config.horizon_days,
            max_results: self.config.max_alternatives,
            step_minutes: self.config.step_minutes,
            not_before: None,
        }
    }

    /// The earliest free slots within the horizon, chronologically, at most
    /// `max_results` of them. An empty list means nothing is free; it is not
    /// an error.
    ///
    /// Occupancy is fetched once per day and every candidate is judged by the
    /// same [`evaluate`] the availability check uses.
    pub async fn find_alternatives(
        &self,
        provider_id: ProviderId,
        query: &AlternativeQuery,
    ) -> Result<Vec<AlternativeSlot>, EngineError> {
        query.validate()?;
        metrics::counter!(observability::ALTERNATIVE_SEARCHES_TOTAL).increment(1);

        let mut found = Vec::new();
        if query.max_results == 0 {
            return Ok(found);
        }

        for offset in 0..query.horizon_days {
            let Some(date) = query.anchor_date.checked_add_days(Days::new(offset as u64)) else {
                break;
            };
            let candidates = query.candidate_starts(date);
            if candidates.is_empty() {
                continue;
            }

            let day = query.hours.span_on(date);
            let window = Span::new(day.start - self.config.lookback_ms(), day.end);
            let occupancy = self.fetch_occupancy(provider_id, window).await?;

            for start in candidates {
                let slot = TimeSlot::new(start, query.duration_minutes)?;
                if evaluate(&slot, &occupancy).is_available() {
                    found.push(AlternativeSlot::at(start));
                    if found.len() == query.max_results {
                        metrics::histogram!(observability::ALTERNATIVES_FOUND)
                            .record(found.len() as f64);
                        return Ok(found);
                    }
                }
            }
        }

        metrics::histogram!(observability::ALTERNATIVES_FOUND).record(found.len() as f64);
        debug!(
            "alternative search for provider {provider_id} from {} found {} of {}",
            query.anchor_date,
            found.len(),
            query.max_results
        );
        Ok(found)
    }
}
