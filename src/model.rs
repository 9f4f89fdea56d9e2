use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::limits::*;

/// Milliseconds on the provider's local wall clock, mapped onto the Unix epoch.
pub type Ms = i64;

pub type ProviderId = Ulid;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

pub fn to_ms(t: NaiveDateTime) -> Ms {
    t.and_utc().timestamp_millis()
}

pub fn from_ms(ms: Ms) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|d| d.naive_utc())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("duration must be positive")]
    ZeroDuration,
    #[error("duration of {0} minutes exceeds the {MAX_DURATION_MINUTES} minute limit")]
    DurationTooLong(u32),
    #[error("timestamp out of range")]
    OutOfRange,
    #[error("business hours {open}..{close} are not a valid range")]
    InvalidHours { open: u32, close: u32 },
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// A requested appointment: start instant plus a positive duration.
///
/// Fields are private so every value in circulation went through
/// [`TimeSlot::new`], deserialization included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeSlot")]
pub struct TimeSlot {
    start: NaiveDateTime,
    duration_minutes: u32,
}

#[derive(Deserialize)]
struct RawTimeSlot {
    start: NaiveDateTime,
    duration_minutes: u32,
}

impl TryFrom<RawTimeSlot> for TimeSlot {
    type Error = ModelError;

    fn try_from(raw: RawTimeSlot) -> Result<Self, Self::Error> {
        TimeSlot::new(raw.start, raw.duration_minutes)
    }
}

impl TimeSlot {
    pub fn new(start: NaiveDateTime, duration_minutes: u32) -> Result<Self, ModelError> {
        if duration_minutes == 0 {
            return Err(ModelError::ZeroDuration);
        }
        if duration_minutes > MAX_DURATION_MINUTES {
            return Err(ModelError::DurationTooLong(duration_minutes));
        }
        let start_ms = to_ms(start);
        let end_ms = start_ms + duration_minutes as Ms * MINUTE_MS;
        if start_ms < MIN_VALID_TIMESTAMP_MS || end_ms > MAX_VALID_TIMESTAMP_MS {
            return Err(ModelError::OutOfRange);
        }
        Ok(Self {
            start,
            duration_minutes,
        })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    pub fn end(&self) -> NaiveDateTime {
        self.start + TimeDelta::minutes(self.duration_minutes as i64)
    }

    pub fn span(&self) -> Span {
        assert!(self.duration_minutes > 0, "TimeSlot with non-positive duration");
        let start = to_ms(self.start);
        Span::new(start, start + self.duration_minutes as Ms * MINUTE_MS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Active,
    Cancelled,
}

/// What an occupied interval represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyKind {
    Booking { status: BookingStatus },
    /// Manually blocked by the provider; always occupying.
    Blocked { reason: Option<String> },
}

/// A booking or blocked period as seen by the availability checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupiedInterval {
    pub id: Ulid,
    pub span: Span,
    pub kind: OccupancyKind,
}

impl OccupiedInterval {
    pub fn booking(id: Ulid, span: Span, status: BookingStatus) -> Self {
        Self {
            id,
            span,
            kind: OccupancyKind::Booking { status },
        }
    }

    pub fn blocked(id: Ulid, span: Span, reason: Option<String>) -> Self {
        Self {
            id,
            span,
            kind: OccupancyKind::Blocked { reason },
        }
    }

    /// Cancelled bookings never occupy; everything else does.
    pub fn is_occupying(&self) -> bool {
        match &self.kind {
            OccupancyKind::Booking { status } => *status == BookingStatus::Active,
            OccupancyKind::Blocked { .. } => true,
        }
    }

    pub fn is_booking(&self) -> bool {
        matches!(self.kind, OccupancyKind::Booking { .. })
    }
}

/// Result of one occupancy fetch for a provider and window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub bookings: Vec<OccupiedInterval>,
    pub blocked: Vec<OccupiedInterval>,
}

impl Occupancy {
    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty() && self.blocked.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OccupiedInterval> {
        self.bookings.iter().chain(self.blocked.iter())
    }

    /// Sorted spans of every interval that actually occupies time.
    pub fn occupying_spans(&self) -> Vec<Span> {
        let mut spans: Vec<Span> = self
            .iter()
            .filter(|i| i.is_occupying())
            .map(|i| i.span)
            .collect();
        spans.sort_by_key(|s| s.start);
        spans
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AvailabilityResult {
    Available,
    Unavailable { conflict_with: Ulid },
}

impl AvailabilityResult {
    pub fn is_available(&self) -> bool {
        matches!(self, AvailabilityResult::Available)
    }
}

/// Daily opening hours, whole hours in local time. `close_hour` may be 24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    pub open_hour: u32,
    pub close_hour: u32,
}

impl BusinessHours {
    pub fn new(open_hour: u32, close_hour: u32) -> Result<Self, ModelError> {
        let hours = Self {
            open_hour,
            close_hour,
        };
        hours.validate()?;
        Ok(hours)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.open_hour >= self.close_hour || self.close_hour > 24 {
            return Err(ModelError::InvalidHours {
                open: self.open_hour,
                close: self.close_hour,
            });
        }
        Ok(())
    }

    /// The business day on `date` as a span.
    pub fn span_on(&self, date: NaiveDate) -> Span {
        let midnight = to_ms(date.and_time(NaiveTime::MIN));
        Span::new(
            midnight + self.open_hour as Ms * HOUR_MS,
            midnight + self.close_hour as Ms * HOUR_MS,
        )
    }
}

/// An unoccupied stretch of a business day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl FreeWindow {
    pub fn from_span(span: &Span) -> Option<Self> {
        Some(Self {
            start: from_ms(span.start)?,
            end: from_ms(span.end)?,
        })
    }
}

/// A free candidate slot offered in place of a taken one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeSlot {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub display_label: String,
}

impl AlternativeSlot {
    pub fn at(start: NaiveDateTime) -> Self {
        Self {
            date: start.date(),
            time: start.time(),
            display_label: start.format("%a %-d %b %Y at %H:%M").to_string(),
        }
    }

    pub fn start(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub unit_rate: Decimal,
    pub quantity: Decimal,
    pub deposit_percent: Decimal,
    pub total: Decimal,
    pub deposit: Decimal,
}

/// Caller-supplied details stored with a booking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingMetadata {
    pub client_id: String,
    pub label: Option<String>,
    pub note: Option<String>,
}

/// Durable booking record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub provider_id: ProviderId,
    pub slot: TimeSlot,
    pub quote: PriceQuote,
    pub metadata: BookingMetadata,
    pub status: BookingStatus,
    pub created_at: Ms,
}

impl Booking {
    pub fn as_interval(&self) -> OccupiedInterval {
        OccupiedInterval::booking(self.id, self.slot.span(), self.status)
    }
}

/// Everything a writer needs to persist a new booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub id: Ulid,
    pub provider_id: ProviderId,
    pub slot: TimeSlot,
    pub quote: PriceQuote,
    pub metadata: BookingMetadata,
    pub created_at: Ms,
}

impl NewBooking {
    pub fn into_booking(self) -> Booking {
        Booking {
            id: self.id,
            provider_id: self.provider_id,
            slot: self.slot,
            quote: self.quote,
            metadata: self.metadata,
            status: BookingStatus::Active,
            created_at: self.created_at,
        }
    }
}

/// Occupancy of a single provider.
#[derive(Debug, Clone)]
pub struct ProviderState {
    pub id: ProviderId,
    /// Bookings (any status) and blocked periods, sorted by `span.start`.
    pub intervals: Vec<OccupiedInterval>,
    pub bookings: HashMap<Ulid, Booking>,
}

impl ProviderState {
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            intervals: Vec::new(),
            bookings: HashMap::new(),
        }
    }

    /// Insert interval maintaining sort order by span.start.
    pub fn insert_interval(&mut self, interval: OccupiedInterval) {
        let pos = self
            .intervals
            .binary_search_by_key(&interval.span.start, |i| i.span.start)
            .unwrap_or_else(|e| e);
        self.intervals.insert(pos, interval);
    }

    pub fn remove_interval(&mut self, id: Ulid) -> Option<OccupiedInterval> {
        let pos = self.intervals.iter().position(|i| i.id == id)?;
        Some(self.intervals.remove(pos))
    }

    pub fn set_booking_status(&mut self, id: Ulid, status: BookingStatus) -> Option<&Booking> {
        if let Some(interval) = self.intervals.iter_mut().find(|i| i.id == id) {
            interval.kind = OccupancyKind::Booking { status };
        }
        let booking = self.bookings.get_mut(&id)?;
        booking.status = status;
        Some(booking)
    }

    /// Intervals whose span overlaps the query window, whatever their status.
    /// Binary search skips everything starting at or after `query.end`; earlier
    /// intervals are filtered by end, so long intervals starting well before the
    /// window are still found.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &OccupiedInterval> {
        let right_bound = self
            .intervals
            .partition_point(|i| i.span.start < query.end);
        self.intervals[..right_bound]
            .iter()
            .filter(move |i| i.span.end > query.start)
    }

    /// First occupying interval overlapping `span`, if any.
    pub fn first_conflict(&self, span: &Span) -> Option<&OccupiedInterval> {
        self.overlapping(span).find(|i| i.is_occupying())
    }

    pub fn occupancy(&self, window: &Span) -> Occupancy {
        let mut occupancy = Occupancy::default();
        for interval in self.overlapping(window) {
            if interval.is_booking() {
                occupancy.bookings.push(interval.clone());
            } else {
                occupancy.blocked.push(interval.clone());
            }
        }
        occupancy
    }
}

/// WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated {
        booking: Booking,
    },
    BookingCancelled {
        id: Ulid,
        provider_id: ProviderId,
    },
    BlockAdded {
        id: Ulid,
        provider_id: ProviderId,
        span: Span,
        reason: Option<String>,
    },
    BlockRemoved {
        id: Ulid,
        provider_id: ProviderId,
    },
}

impl Event {
    pub fn provider_id(&self) -> ProviderId {
        match self {
            Event::BookingCreated { booking } => booking.provider_id,
            Event::BookingCancelled { provider_id, .. }
            | Event::BlockAdded { provider_id, .. }
            | Event::BlockRemoved { provider_id, .. } => *provider_id,
        }
    }
}
