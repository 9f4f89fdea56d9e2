use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use rust_decimal_macros::dec;

use super::*;
use crate::store::{LedgerStore, StoreError};

// ── Helpers ──────────────────────────────────────────────

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("slotkeeper_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").unwrap()
}

fn slot(start: &str, minutes: u32) -> TimeSlot {
    TimeSlot::new(at(start), minutes).unwrap()
}

fn span(start: &str, end: &str) -> Span {
    Span::new(to_ms(at(start)), to_ms(at(end)))
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn quote() -> PriceQuote {
    compute_quote(dec!(100), dec!(3), Some(dec!(30))).unwrap()
}

fn meta(client: &str) -> BookingMetadata {
    BookingMetadata {
        client_id: client.into(),
        label: Some("Wedding photography".into()),
        note: None,
    }
}

fn ledger_engine(name: &str) -> (Arc<LedgerStore>, Engine) {
    let store = Arc::new(LedgerStore::open(test_wal_path(name)).unwrap());
    let engine = Engine::over(store.clone(), EngineConfig::default());
    (store, engine)
}

fn occupancy_of(intervals: Vec<OccupiedInterval>) -> Occupancy {
    let mut occupancy = Occupancy::default();
    for i in intervals {
        if i.is_booking() {
            occupancy.bookings.push(i);
        } else {
            occupancy.blocked.push(i);
        }
    }
    occupancy
}

// ── Test doubles ─────────────────────────────────────────

/// Returns only records whose start lies inside the window, the way a query
/// filtering on a start-time column would.
struct StartIndexed {
    records: Vec<OccupiedInterval>,
}

#[async_trait]
impl OccupancyProvider for StartIndexed {
    async fn fetch_occupancy(&self, _: ProviderId, window: Span) -> Result<Occupancy, StoreError> {
        Ok(occupancy_of(
            self.records
                .iter()
                .filter(|r| r.span.start >= window.start && r.span.start < window.end)
                .cloned()
                .collect(),
        ))
    }
}

struct Unreachable;

#[async_trait]
impl OccupancyProvider for Unreachable {
    async fn fetch_occupancy(&self, _: ProviderId, _: Span) -> Result<Occupancy, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

struct Stalled;

#[async_trait]
impl OccupancyProvider for Stalled {
    async fn fetch_occupancy(&self, _: ProviderId, _: Span) -> Result<Occupancy, StoreError> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Ok(Occupancy::default())
    }
}

/// Always reports an empty calendar, like a stale read replica.
struct Blind;

#[async_trait]
impl OccupancyProvider for Blind {
    async fn fetch_occupancy(&self, _: ProviderId, _: Span) -> Result<Occupancy, StoreError> {
        Ok(Occupancy::default())
    }
}

// ── Availability ─────────────────────────────────────────

#[tokio::test]
async fn booked_morning_blocks_overlap_but_not_touching_slot() {
    let (store, engine) = ledger_engine("booked_morning.wal");
    let pid = Ulid::new();
    let existing = engine
        .commit_booking(pid, slot("2025-06-15T10:00", 120), quote(), meta("alice"))
        .await
        .unwrap();

    let overlap = engine
        .check_availability(pid, &slot("2025-06-15T11:00", 60))
        .await
        .unwrap();
    assert_eq!(
        overlap,
        AvailabilityResult::Unavailable {
            conflict_with: existing.id
        }
    );

    let touching = engine
        .check_availability(pid, &slot("2025-06-15T12:00", 60))
        .await
        .unwrap();
    assert_eq!(touching, AvailabilityResult::Available);

    assert_eq!(store.get_booking(&existing.id).await.unwrap().status, BookingStatus::Active);
}

#[tokio::test]
async fn empty_calendar_is_available() {
    let (_store, engine) = ledger_engine("empty_calendar.wal");
    let result = engine
        .check_availability(Ulid::new(), &slot("2025-06-15T10:00", 60))
        .await
        .unwrap();
    assert!(result.is_available());
}

#[tokio::test]
async fn blocked_period_is_unavailable() {
    let (store, engine) = ledger_engine("blocked_period.wal");
    let pid = Ulid::new();
    let block_id = Ulid::new();
    store
        .add_block(block_id, pid, span("2025-06-15T13:00", "2025-06-15T17:00"), None)
        .await
        .unwrap();

    let result = engine
        .check_availability(pid, &slot("2025-06-15T16:30", 60))
        .await
        .unwrap();
    assert_eq!(
        result,
        AvailabilityResult::Unavailable {
            conflict_with: block_id
        }
    );
}

#[tokio::test]
async fn cancelled_booking_frees_slot() {
    let (_store, engine) = ledger_engine("cancel_frees.wal");
    let pid = Ulid::new();
    let booking = engine
        .commit_booking(pid, slot("2025-06-15T10:00", 60), quote(), meta("alice"))
        .await
        .unwrap();
    assert!(!engine
        .check_availability(pid, &slot("2025-06-15T10:00", 60))
        .await
        .unwrap()
        .is_available());

    let cancelled = engine.cancel_booking(booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    assert!(engine
        .check_availability(pid, &slot("2025-06-15T10:00", 60))
        .await
        .unwrap()
        .is_available());
}

#[tokio::test]
async fn cancel_unknown_booking_is_not_found() {
    let (_store, engine) = ledger_engine("cancel_unknown.wal");
    let err = engine.cancel_booking(Ulid::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[test]
fn evaluate_skips_cancelled_and_counts_blocks() {
    let requested = slot("2025-06-15T10:00", 60);
    let cancelled = OccupiedInterval::booking(
        Ulid::new(),
        span("2025-06-15T09:30", "2025-06-15T10:30"),
        BookingStatus::Cancelled,
    );
    assert!(evaluate(&requested, &occupancy_of(vec![cancelled.clone()])).is_available());

    let block = OccupiedInterval::blocked(Ulid::new(), span("2025-06-15T10:59", "2025-06-15T12:00"), None);
    let block_id = block.id;
    assert_eq!(
        evaluate(&requested, &occupancy_of(vec![cancelled, block])),
        AvailabilityResult::Unavailable {
            conflict_with: block_id
        }
    );
}

#[test]
fn adding_occupancy_never_frees_a_slot() {
    let requests = [
        slot("2025-06-15T08:00", 60),
        slot("2025-06-15T10:00", 120),
        slot("2025-06-15T13:30", 30),
        slot("2025-06-15T18:00", 180),
    ];
    let additions = [
        OccupiedInterval::booking(Ulid::new(), span("2025-06-15T09:00", "2025-06-15T10:00"), BookingStatus::Active),
        OccupiedInterval::booking(Ulid::new(), span("2025-06-15T11:00", "2025-06-15T11:30"), BookingStatus::Cancelled),
        OccupiedInterval::blocked(Ulid::new(), span("2025-06-15T13:00", "2025-06-15T14:00"), None),
        OccupiedInterval::booking(Ulid::new(), span("2025-06-15T07:00", "2025-06-15T08:30"), BookingStatus::Active),
        OccupiedInterval::blocked(Ulid::new(), span("2025-06-15T20:00", "2025-06-15T22:00"), None),
    ];

    for requested in &requests {
        let mut records = Vec::new();
        let mut was_available = evaluate(requested, &occupancy_of(records.clone())).is_available();
        assert!(was_available);
        for interval in &additions {
            records.push(interval.clone());
            let now_available = evaluate(requested, &occupancy_of(records.clone())).is_available();
            assert!(
                was_available || !now_available,
                "adding {:?} freed {:?}",
                interval.span,
                requested
            );
            was_available = now_available;
        }
    }
}

#[test]
fn window_covers_slot_and_lookback() {
    let requested = slot("2025-06-15T10:00", 60);
    let window = occupancy_window(&requested, 6 * HOUR_MS);
    assert!(window.contains_span(&requested.span()));
    assert_eq!(window.start, to_ms(at("2025-06-15T04:00")));
    assert_eq!(window.end, to_ms(at("2025-06-16T10:00")));

    let long = slot("2025-06-15T10:00", 24 * 60);
    assert!(occupancy_window(&long, 0).contains_span(&long.span()));
}

#[tokio::test]
async fn lookback_catches_interval_starting_before_window() {
    // Overnight block 20:00 → 12:00 the next day.
    let overnight = OccupiedInterval::blocked(
        Ulid::new(),
        span("2025-06-14T20:00", "2025-06-15T12:00"),
        Some("travel".into()),
    );
    let overnight_id = overnight.id;
    let provider = Arc::new(StartIndexed {
        records: vec![overnight],
    });
    let requested = slot("2025-06-15T10:00", 60);

    // A window anchored at the requested start misses it.
    let anchored = provider
        .fetch_occupancy(Ulid::new(), occupancy_window(&requested, 0))
        .await
        .unwrap();
    assert!(evaluate(&requested, &anchored).is_available());

    let engine = Engine::new(
        provider,
        Arc::new(LedgerStore::open(test_wal_path("lookback.wal")).unwrap()),
        EngineConfig::default(),
    );
    assert_eq!(
        engine.check_availability(Ulid::new(), &requested).await.unwrap(),
        AvailabilityResult::Unavailable {
            conflict_with: overnight_id
        }
    );
}

#[tokio::test]
async fn unreachable_store_is_transient_not_available() {
    let engine = Engine::new(
        Arc::new(Unreachable),
        Arc::new(LedgerStore::open(test_wal_path("unreachable.wal")).unwrap()),
        EngineConfig::default(),
    );
    let err = engine
        .check_availability(Ulid::new(), &slot("2025-06-15T10:00", 60))
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.kind(), "transient");
}

#[tokio::test]
async fn slow_store_times_out_as_transient() {
    let config = EngineConfig {
        query_timeout: std::time::Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let engine = Engine::new(
        Arc::new(Stalled),
        Arc::new(LedgerStore::open(test_wal_path("stalled.wal")).unwrap()),
        config,
    );
    let err = engine
        .check_availability(Ulid::new(), &slot("2025-06-15T10:00", 60))
        .await
        .unwrap_err();
    assert!(err.is_transient(), "{err}");
}

#[tokio::test]
async fn free_windows_subtract_occupancy() {
    let (store, engine) = ledger_engine("free_windows.wal");
    let pid = Ulid::new();
    engine
        .commit_booking(pid, slot("2025-06-15T10:00", 120), quote(), meta("alice"))
        .await
        .unwrap();
    store
        .add_block(Ulid::new(), pid, span("2025-06-15T15:00", "2025-06-15T16:00"), None)
        .await
        .unwrap();
    let cancelled = engine
        .commit_booking(pid, slot("2025-06-15T17:00", 60), quote(), meta("bob"))
        .await
        .unwrap();
    engine.cancel_booking(cancelled.id).await.unwrap();

    let windows = engine
        .free_windows(pid, date("2025-06-15"), BusinessHours::new(8, 20).unwrap())
        .await
        .unwrap();
    let got: Vec<(NaiveDateTime, NaiveDateTime)> = windows.iter().map(|w| (w.start, w.end)).collect();
    assert_eq!(
        got,
        vec![
            (at("2025-06-15T08:00"), at("2025-06-15T10:00")),
            (at("2025-06-15T12:00"), at("2025-06-15T15:00")),
            (at("2025-06-15T16:00"), at("2025-06-15T20:00")),
        ]
    );
}

// ── Alternatives ─────────────────────────────────────────

#[tokio::test]
async fn full_first_day_moves_to_next_morning() {
    let (store, engine) = ledger_engine("alt_next_morning.wal");
    let pid = Ulid::new();
    store
        .add_block(Ulid::new(), pid, span("2025-06-15T08:00", "2025-06-15T20:00"), None)
        .await
        .unwrap();

    let query = engine.alternative_query(date("2025-06-15"), 120);
    let alternatives = engine.find_alternatives(pid, &query).await.unwrap();

    assert_eq!(alternatives.len(), 3);
    assert_eq!(alternatives[0].start(), at("2025-06-16T08:00"));
    assert_eq!(alternatives[1].start(), at("2025-06-16T09:00"));
    assert_eq!(alternatives[2].start(), at("2025-06-16T10:00"));
    assert_eq!(alternatives[0].display_label, "Mon 16 Jun 2025 at 08:00");
}

#[tokio::test]
async fn alternatives_recheck_available_in_order_within_hours() {
    let (store, engine) = ledger_engine("alt_properties.wal");
    let pid = Ulid::new();
    for (start, minutes) in [
        ("2025-06-15T08:00", 180),
        ("2025-06-15T12:00", 60),
        ("2025-06-15T14:30", 90),
        ("2025-06-16T09:00", 480),
    ] {
        engine
            .commit_booking(pid, slot(start, minutes), quote(), meta("alice"))
            .await
            .unwrap();
    }
    store
        .add_block(Ulid::new(), pid, span("2025-06-15T16:00", "2025-06-16T08:30"), None)
        .await
        .unwrap();

    let hours = BusinessHours::new(8, 20).unwrap();
    let query = AlternativeQuery {
        max_results: 10,
        ..engine.alternative_query(date("2025-06-15"), 90)
    };
    let alternatives = engine.find_alternatives(pid, &query).await.unwrap();
    assert_eq!(alternatives.len(), 10);

    let last_start_hour = hours.close_hour - 90u32.div_ceil(60);
    let mut previous: Option<NaiveDateTime> = None;
    for alt in &alternatives {
        let start = alt.start();
        assert!(previous.is_none_or(|p| p < start), "not chronological at {start}");
        previous = Some(start);

        assert!(start.hour() >= hours.open_hour && start.hour() <= last_start_hour);

        let recheck = engine
            .check_availability(pid, &TimeSlot::new(start, 90).unwrap())
            .await
            .unwrap();
        assert!(recheck.is_available(), "{start} offered but not available");
    }

    // 13:00 to 14:30 fits between the 12:00 and 14:30 bookings.
    assert_eq!(alternatives[0].start(), at("2025-06-15T13:00"));
}

#[tokio::test]
async fn fully_booked_horizon_returns_empty() {
    let (store, engine) = ledger_engine("alt_empty.wal");
    let pid = Ulid::new();
    store
        .add_block(Ulid::new(), pid, span("2025-06-15T00:00", "2025-06-22T00:00"), Some("vacation".into()))
        .await
        .unwrap();

    let query = engine.alternative_query(date("2025-06-15"), 60);
    let alternatives = engine.find_alternatives(pid, &query).await.unwrap();
    assert!(alternatives.is_empty());

    // Day 8 is outside the 7 day horizon but reachable with a longer one.
    let wider = AlternativeQuery {
        horizon_days: 8,
        ..query
    };
    let alternatives = engine.find_alternatives(pid, &wider).await.unwrap();
    assert_eq!(alternatives[0].start(), at("2025-06-22T08:00"));
}

#[tokio::test]
async fn alternatives_ignore_cancelled_bookings() {
    let (_store, engine) = ledger_engine("alt_cancelled.wal");
    let pid = Ulid::new();
    let booking = engine
        .commit_booking(pid, slot("2025-06-15T08:00", 60), quote(), meta("alice"))
        .await
        .unwrap();
    engine.cancel_booking(booking.id).await.unwrap();

    let query = engine.alternative_query(date("2025-06-15"), 60);
    let alternatives = engine.find_alternatives(pid, &query).await.unwrap();
    assert_eq!(alternatives[0].start(), at("2025-06-15T08:00"));
}

#[tokio::test]
async fn zero_results_requested_is_empty() {
    let (_store, engine) = ledger_engine("alt_zero.wal");
    let query = AlternativeQuery {
        max_results: 0,
        ..engine.alternative_query(date("2025-06-15"), 60)
    };
    assert!(engine.find_alternatives(Ulid::new(), &query).await.unwrap().is_empty());
}

#[tokio::test]
async fn alternative_search_propagates_store_failure() {
    let engine = Engine::new(
        Arc::new(Unreachable),
        Arc::new(LedgerStore::open(test_wal_path("alt_unreachable.wal")).unwrap()),
        EngineConfig::default(),
    );
    let query = engine.alternative_query(date("2025-06-15"), 60);
    let err = engine.find_alternatives(Ulid::new(), &query).await.unwrap_err();
    assert!(err.is_transient());
}

// ── Commit gate ──────────────────────────────────────────

#[tokio::test]
async fn commit_persists_active_booking() {
    let (store, engine) = ledger_engine("commit_ok.wal");
    let pid = Ulid::new();
    let booking = engine
        .commit_booking(pid, slot("2025-06-15T10:00", 60), quote(), meta("alice"))
        .await
        .unwrap();

    assert_eq!(booking.provider_id, pid);
    assert_eq!(booking.status, BookingStatus::Active);
    assert_eq!(booking.quote.total, dec!(300));
    assert_eq!(booking.quote.deposit, dec!(90));
    assert_eq!(booking.metadata.client_id, "alice");
    assert_eq!(store.get_booking(&booking.id).await, Some(booking));
}

#[tokio::test]
async fn commit_on_taken_slot_conflicts_without_writing() {
    let (store, engine) = ledger_engine("commit_taken.wal");
    let pid = Ulid::new();
    let first = engine
        .commit_booking(pid, slot("2025-06-15T10:00", 120), quote(), meta("alice"))
        .await
        .unwrap();

    let err = engine
        .commit_booking(pid, slot("2025-06-15T11:00", 60), quote(), meta("bob"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(id) if id == first.id));
    assert_eq!(store.wal_appends_since_compact().await, 1);
}

#[tokio::test]
async fn store_rejection_surfaces_as_conflict() {
    let store = Arc::new(LedgerStore::open(test_wal_path("commit_blind.wal")).unwrap());
    let pid = Ulid::new();
    let honest = Engine::over(store.clone(), EngineConfig::default());
    let first = honest
        .commit_booking(pid, slot("2025-06-15T10:00", 60), quote(), meta("alice"))
        .await
        .unwrap();

    // Pre-check sees nothing; only the store stands in the way.
    let blind = Engine::new(Arc::new(Blind), store.clone(), EngineConfig::default());
    let err = blind
        .commit_booking(pid, slot("2025-06-15T10:30", 60), quote(), meta("bob"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(id) if id == first.id));
}

#[tokio::test]
async fn concurrent_commits_for_same_slot_admit_exactly_one() {
    let (_store, engine) = ledger_engine("commit_race.wal");
    let engine = Arc::new(engine);
    let pid = Ulid::new();

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .commit_booking(pid, slot("2025-06-15T10:00", 60), quote(), meta(&format!("client-{i}")))
                .await
        }));
    }

    let mut committed = 0;
    let mut conflicted = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => committed += 1,
            Err(e) if e.is_conflict() => conflicted += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(conflicted, 7);
}

#[tokio::test]
async fn concurrent_commits_through_blind_prechecks_admit_exactly_one() {
    let store = Arc::new(LedgerStore::open(test_wal_path("commit_race_blind.wal")).unwrap());
    let pid = Ulid::new();
    let a = Arc::new(Engine::new(Arc::new(Blind), store.clone(), EngineConfig::default()));
    let b = Arc::new(Engine::new(Arc::new(Blind), store.clone(), EngineConfig::default()));

    let (ra, rb) = tokio::join!(
        a.commit_booking(pid, slot("2025-06-15T10:00", 60), quote(), meta("alice")),
        b.commit_booking(pid, slot("2025-06-15T10:30", 60), quote(), meta("bob")),
    );
    let results = [ra, rb];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::Conflict(_))))
            .count(),
        1
    );
}

#[tokio::test]
async fn commit_rejects_stale_quote() {
    let (store, engine) = ledger_engine("commit_stale_quote.wal");
    let stale = PriceQuote {
        quantity: dec!(4),
        ..quote()
    };
    let err = engine
        .commit_booking(Ulid::new(), slot("2025-06-15T10:00", 60), stale, meta("alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::QuoteMismatch));
    assert!(err.is_validation());
    assert_eq!(store.wal_appends_since_compact().await, 0);
}

#[tokio::test]
async fn commit_requires_client() {
    let (_store, engine) = ledger_engine("commit_no_client.wal");
    let err = engine
        .commit_booking(Ulid::new(), slot("2025-06-15T10:00", 60), quote(), meta("  "))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn commit_with_unreachable_occupancy_writes_nothing() {
    let store = Arc::new(LedgerStore::open(test_wal_path("commit_unreachable.wal")).unwrap());
    let engine = Engine::new(Arc::new(Unreachable), store.clone(), EngineConfig::default());
    let err = engine
        .commit_booking(Ulid::new(), slot("2025-06-15T10:00", 60), quote(), meta("alice"))
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(store.wal_appends_since_compact().await, 0);
}

#[tokio::test]
async fn quote_preview_matches_committed_amounts() {
    let (_store, engine) = ledger_engine("commit_preview.wal");
    let preview = compute_quote(dec!(85.50), dec!(2), Some(dec!(25))).unwrap();
    let booking = engine
        .commit_booking(Ulid::new(), slot("2025-06-15T10:00", 120), preview, meta("alice"))
        .await
        .unwrap();
    let recomputed = compute_quote(dec!(85.50), dec!(2), Some(dec!(25))).unwrap();
    assert_eq!(booking.quote, recomputed);
    assert_eq!(booking.quote.total, dec!(171));
    assert_eq!(booking.quote.deposit, dec!(43));
}

// ── Booking attempts ─────────────────────────────────────

#[tokio::test]
async fn attempt_commits_on_free_slot() {
    let (_store, engine) = ledger_engine("attempt_ok.wal");
    let outcome = engine
        .attempt_booking(Ulid::new(), slot("2025-06-15T10:00", 60), quote(), meta("alice"))
        .await;
    assert_eq!(outcome.state(), AttemptState::Committed);
    assert!(matches!(outcome, AttemptOutcome::Committed(_)));
}

#[tokio::test]
async fn attempt_conflict_offers_alternatives() {
    let (_store, engine) = ledger_engine("attempt_conflict.wal");
    let pid = Ulid::new();
    let first = engine
        .commit_booking(pid, slot("2025-06-15T08:00", 120), quote(), meta("alice"))
        .await
        .unwrap();

    let outcome = engine
        .attempt_booking(pid, slot("2025-06-15T09:00", 120), quote(), meta("bob"))
        .await;
    assert_eq!(outcome.state(), AttemptState::Conflicted);
    let AttemptOutcome::Conflicted {
        conflict_with,
        alternatives,
    } = outcome
    else {
        panic!("expected conflict");
    };
    assert_eq!(conflict_with, first.id);
    let starts: Vec<NaiveDateTime> = alternatives.unwrap().iter().map(|a| a.start()).collect();
    assert_eq!(
        starts,
        vec![
            at("2025-06-15T10:00"),
            at("2025-06-15T11:00"),
            at("2025-06-15T12:00"),
        ]
    );
}

#[tokio::test]
async fn attempt_fails_on_transient_error() {
    let engine = Engine::new(
        Arc::new(Unreachable),
        Arc::new(LedgerStore::open(test_wal_path("attempt_transient.wal")).unwrap()),
        EngineConfig::default(),
    );
    let outcome = engine
        .attempt_booking(Ulid::new(), slot("2025-06-15T10:00", 60), quote(), meta("alice"))
        .await;
    assert_eq!(outcome.state(), AttemptState::Failed);
    assert!(matches!(outcome, AttemptOutcome::Failed(e) if e.is_transient()));
}
