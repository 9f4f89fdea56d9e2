use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::wal::Wal;

use super::{BookingWriter, OccupancyProvider, StoreError};

pub type SharedProviderState = Arc<RwLock<ProviderState>>;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Every append that is already queued when the first one is
/// picked up joins its batch and shares a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = wal.append_batch(batch.iter().map(|(event, _)| event));
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!("WAL flush of {} records failed: {e}", batch.len());
        }
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// Apply an event to a provider's state. Caller holds the write lock.
fn apply_event(ps: &mut ProviderState, event: &Event, entities: &DashMap<Ulid, ProviderId>) {
    match event {
        Event::BookingCreated { booking } => {
            ps.insert_interval(booking.as_interval());
            ps.bookings.insert(booking.id, booking.clone());
            entities.insert(booking.id, booking.provider_id);
        }
        Event::BookingCancelled { id, .. } => {
            ps.set_booking_status(*id, BookingStatus::Cancelled);
        }
        Event::BlockAdded {
            id,
            provider_id,
            span,
            reason,
        } => {
            ps.insert_interval(OccupiedInterval::blocked(*id, *span, reason.clone()));
            entities.insert(*id, *provider_id);
        }
        Event::BlockRemoved { id, .. } => {
            ps.remove_interval(*id);
            entities.remove(id);
        }
    }
}

fn validate_span(span: &Span, max_len: Ms) -> Result<(), StoreError> {
    if span.start >= span.end {
        return Err(StoreError::Invalid("interval must end after it starts"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(StoreError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > max_len {
        return Err(StoreError::LimitExceeded("interval too long"));
    }
    Ok(())
}

/// Durable booking store: in-memory per-provider interval index rebuilt from a
/// write-ahead log.
///
/// Each provider's state sits behind its own write lock; a booking insert
/// checks for overlap and appends to the WAL while holding it, which makes the
/// lock the serialization point between racing commits.
pub struct LedgerStore {
    providers: DashMap<ProviderId, SharedProviderState>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: booking or block id → provider id.
    entities: DashMap<Ulid, ProviderId>,
    /// Writers share it; compaction takes it exclusively so the snapshot it
    /// writes cannot miss an in-flight append. Always acquired before any
    /// provider lock.
    compaction_gate: RwLock<()>,
}

impl LedgerStore {
    /// Replay the WAL at `wal_path`, cut off any torn tail, and start the
    /// background writer. Must be called inside a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let entities = DashMap::new();
        let mut states: HashMap<ProviderId, ProviderState> = HashMap::new();
        for event in &events {
            let pid = event.provider_id();
            let ps = states.entry(pid).or_insert_with(|| ProviderState::new(pid));
            apply_event(ps, event, &entities);
        }
        info!(
            "replayed {} WAL records for {} providers from {}",
            events.len(),
            states.len(),
            wal_path.display()
        );

        let providers = DashMap::new();
        for (pid, ps) in states {
            providers.insert(pid, Arc::new(RwLock::new(ps)));
        }
        Ok(Self {
            providers,
            wal_tx,
            entities,
            compaction_gate: RwLock::new(()),
        })
    }

    pub fn get_provider(&self, id: &ProviderId) -> Option<SharedProviderState> {
        self.providers.get(id).map(|e| e.value().clone())
    }

    /// Providers have no lifecycle of their own; state appears on first write.
    fn provider_entry(&self, id: ProviderId) -> SharedProviderState {
        self.providers
            .entry(id)
            .or_insert_with(|| Arc::new(RwLock::new(ProviderState::new(id))))
            .value()
            .clone()
    }

    pub fn provider_for(&self, entity_id: &Ulid) -> Option<ProviderId> {
        self.entities.get(entity_id).map(|e| *e.value())
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Unavailable(format!("WAL append failed: {e}")))
    }

    /// Durable first, visible second.
    async fn persist_and_apply(&self, ps: &mut ProviderState, event: &Event) -> Result<(), StoreError> {
        self.wal_append(event).await?;
        apply_event(ps, event, &self.entities);
        Ok(())
    }

    /// Reserve a new entity id. Ids are global while provider locks are not,
    /// so the map entry itself is the claim.
    fn claim_id(&self, id: Ulid, provider_id: ProviderId) -> Result<(), StoreError> {
        match self.entities.entry(id) {
            Entry::Occupied(_) => Err(StoreError::Invalid("duplicate id")),
            Entry::Vacant(slot) => {
                slot.insert(provider_id);
                Ok(())
            }
        }
    }

    /// `persist_and_apply` for a freshly claimed id; the claim is released if
    /// the write fails.
    async fn persist_claimed(&self, ps: &mut ProviderState, id: Ulid, event: &Event) -> Result<(), StoreError> {
        let result = self.persist_and_apply(ps, event).await;
        if result.is_err() {
            self.entities.remove(&id);
        }
        result
    }

    /// Block a period on the provider's calendar. Blocks may sit on top of
    /// existing bookings; they only prevent new ones.
    pub async fn add_block(
        &self,
        id: Ulid,
        provider_id: ProviderId,
        span: Span,
        reason: Option<String>,
    ) -> Result<(), StoreError> {
        validate_span(&span, MAX_BLOCK_DAYS * DAY_MS)?;
        if reason.as_ref().is_some_and(|r| r.len() > MAX_LABEL_LEN) {
            return Err(StoreError::LimitExceeded("block reason too long"));
        }
        let _gate = self.compaction_gate.read().await;
        let ps = self.provider_entry(provider_id);
        let mut guard = ps.write().await;
        if guard.intervals.len() >= MAX_INTERVALS_PER_PROVIDER {
            return Err(StoreError::LimitExceeded("too many intervals for provider"));
        }
        self.claim_id(id, provider_id)?;
        let event = Event::BlockAdded {
            id,
            provider_id,
            span,
            reason,
        };
        self.persist_claimed(&mut guard, id, &event).await?;
        debug!("blocked [{}, {}) for provider {provider_id}", span.start, span.end);
        Ok(())
    }

    pub async fn remove_block(&self, id: Ulid) -> Result<ProviderId, StoreError> {
        let _gate = self.compaction_gate.read().await;
        let provider_id = self.provider_for(&id).ok_or(StoreError::NotFound(id))?;
        let ps = self.get_provider(&provider_id).ok_or(StoreError::NotFound(id))?;
        let mut guard = ps.write().await;
        let is_block = guard
            .intervals
            .iter()
            .any(|i| i.id == id && !i.is_booking());
        if !is_block {
            return Err(StoreError::NotFound(id));
        }
        let event = Event::BlockRemoved { id, provider_id };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(provider_id)
    }

    pub async fn get_booking(&self, id: &Ulid) -> Option<Booking> {
        let provider_id = self.provider_for(id)?;
        let ps = self.get_provider(&provider_id)?;
        let guard = ps.read().await;
        guard.bookings.get(id).cloned()
    }

    /// Bookings of any status overlapping `window`, in start order.
    pub async fn bookings_for(&self, provider_id: ProviderId, window: Span) -> Vec<Booking> {
        let Some(ps) = self.get_provider(&provider_id) else {
            return Vec::new();
        };
        let guard = ps.read().await;
        guard
            .overlapping(&window)
            .filter_map(|i| guard.bookings.get(&i.id).cloned())
            .collect()
    }

    /// Rewrite the WAL with one record per live booking and block.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.write().await;
        let mut events = Vec::new();
        let snapshot: Vec<SharedProviderState> =
            self.providers.iter().map(|e| e.value().clone()).collect();
        for ps in snapshot {
            let guard = ps.read().await;
            for interval in &guard.intervals {
                match &interval.kind {
                    OccupancyKind::Booking { .. } => {
                        if let Some(booking) = guard.bookings.get(&interval.id) {
                            events.push(Event::BookingCreated {
                                booking: booking.clone(),
                            });
                        }
                    }
                    OccupancyKind::Blocked { reason } => events.push(Event::BlockAdded {
                        id: interval.id,
                        provider_id: guard.id,
                        span: interval.span,
                        reason: reason.clone(),
                    }),
                }
            }
        }

        let records = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Unavailable(format!("WAL compaction failed: {e}")))?;
        info!("compacted WAL to {records} records");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl OccupancyProvider for LedgerStore {
    async fn fetch_occupancy(
        &self,
        provider_id: ProviderId,
        window: Span,
    ) -> Result<Occupancy, StoreError> {
        let Some(ps) = self.get_provider(&provider_id) else {
            return Ok(Occupancy::default());
        };
        let guard = ps.read().await;
        Ok(guard.occupancy(&window))
    }
}

#[async_trait]
impl BookingWriter for LedgerStore {
    async fn insert_booking(&self, record: NewBooking) -> Result<Booking, StoreError> {
        let span = record.slot.span();
        validate_span(&span, MAX_DURATION_MINUTES as Ms * MINUTE_MS)?;
        let _gate = self.compaction_gate.read().await;
        let ps = self.provider_entry(record.provider_id);
        let mut guard = ps.write().await;
        if guard.intervals.len() >= MAX_INTERVALS_PER_PROVIDER {
            return Err(StoreError::LimitExceeded("too many intervals for provider"));
        }
        if let Some(existing) = guard.first_conflict(&span) {
            warn!(
                "rejecting booking {} for provider {}: overlaps {}",
                record.id, record.provider_id, existing.id
            );
            return Err(StoreError::Conflict(existing.id));
        }
        self.claim_id(record.id, record.provider_id)?;

        let booking = record.into_booking();
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_claimed(&mut guard, booking.id, &event).await?;
        Ok(booking)
    }

    async fn cancel_booking(&self, id: Ulid) -> Result<Booking, StoreError> {
        let _gate = self.compaction_gate.read().await;
        let provider_id = self.provider_for(&id).ok_or(StoreError::NotFound(id))?;
        let ps = self.get_provider(&provider_id).ok_or(StoreError::NotFound(id))?;
        let mut guard = ps.write().await;
        let booking = guard.bookings.get(&id).ok_or(StoreError::NotFound(id))?;
        if booking.status == BookingStatus::Cancelled {
            return Ok(booking.clone());
        }
        let event = Event::BookingCancelled { id, provider_id };
        self.persist_and_apply(&mut guard, &event).await?;
        guard
            .bookings
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }
}
