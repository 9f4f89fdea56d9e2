use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime};
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::debug;
use ulid::Ulid;

use crate::engine::{AttemptOutcome, Engine, EngineError, compute_quote};
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::store::LedgerStore;

/// One request line. Times are local wall-clock ISO 8601 without offset;
/// money amounts are decimal strings.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CheckAvailability {
        provider_id: ProviderId,
        slot: TimeSlot,
    },
    FindAlternatives {
        provider_id: ProviderId,
        anchor_date: NaiveDate,
        duration_minutes: u32,
        max_results: Option<usize>,
        horizon_days: Option<u32>,
        step_minutes: Option<u32>,
        hours: Option<BusinessHours>,
        not_before: Option<NaiveDateTime>,
    },
    Quote {
        unit_rate: Decimal,
        quantity: Decimal,
        deposit_percent: Option<Decimal>,
    },
    CommitBooking {
        provider_id: ProviderId,
        slot: TimeSlot,
        quote: PriceQuote,
        metadata: BookingMetadata,
    },
    AttemptBooking {
        provider_id: ProviderId,
        slot: TimeSlot,
        quote: PriceQuote,
        metadata: BookingMetadata,
    },
    CancelBooking {
        id: Ulid,
    },
    GetBooking {
        id: Ulid,
    },
    ListBookings {
        provider_id: ProviderId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    },
    AddBlock {
        id: Option<Ulid>,
        provider_id: ProviderId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        reason: Option<String>,
    },
    RemoveBlock {
        id: Ulid,
    },
    FreeWindows {
        provider_id: ProviderId,
        date: NaiveDate,
        hours: Option<BusinessHours>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum Response {
    Ok(Value),
    Error(ErrorBody),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

impl Response {
    fn error(kind: &'static str, message: impl Into<String>) -> Self {
        Response::Error(ErrorBody {
            kind,
            message: message.into(),
        })
    }

    fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"error":{{"kind":"internal","message":"response encoding failed: {e}"}}}}"#)
        })
    }
}

impl From<EngineError> for Response {
    fn from(e: EngineError) -> Self {
        Response::error(e.kind(), e.to_string())
    }
}

/// Executes decoded requests against one engine and its backing store.
pub struct SlotHandler {
    engine: Arc<Engine>,
    store: Arc<LedgerStore>,
}

impl SlotHandler {
    pub fn new(engine: Arc<Engine>, store: Arc<LedgerStore>) -> Self {
        Self { engine, store }
    }

    /// Decode, execute and encode one request line.
    pub async fn handle_line(&self, line: &str) -> String {
        let req: Request = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                metrics::counter!(observability::REQUESTS_TOTAL, "op" => "unknown", "status" => "malformed")
                    .increment(1);
                return Response::error("validation", format!("malformed request: {e}")).to_line();
            }
        };

        let op = observability::op_label(&req);
        let started = Instant::now();
        let result = self.execute(req).await;
        metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => op)
            .record(started.elapsed().as_secs_f64());

        let status = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!(observability::REQUESTS_TOTAL, "op" => op, "status" => status).increment(1);
        debug!("{op} -> {status}");

        let response = match result {
            Ok(value) => Response::Ok(value),
            Err(e) => Response::from(e),
        };
        response.to_line()
    }

    async fn execute(&self, req: Request) -> Result<Value, EngineError> {
        match req {
            Request::CheckAvailability { provider_id, slot } => {
                let result = self.engine.check_availability(provider_id, &slot).await?;
                to_value(&result)
            }
            Request::FindAlternatives {
                provider_id,
                anchor_date,
                duration_minutes,
                max_results,
                horizon_days,
                step_minutes,
                hours,
                not_before,
            } => {
                let mut query = self.engine.alternative_query(anchor_date, duration_minutes);
                if let Some(n) = max_results {
                    query.max_results = n;
                }
                if let Some(days) = horizon_days {
                    query.horizon_days = days;
                }
                if let Some(step) = step_minutes {
                    query.step_minutes = step;
                }
                if let Some(hours) = hours {
                    query.hours = hours;
                }
                query.not_before = not_before;
                let alternatives = self.engine.find_alternatives(provider_id, &query).await?;
                to_value(&alternatives)
            }
            Request::Quote {
                unit_rate,
                quantity,
                deposit_percent,
            } => to_value(&compute_quote(unit_rate, quantity, deposit_percent)?),
            Request::CommitBooking {
                provider_id,
                slot,
                quote,
                metadata,
            } => {
                let booking = self
                    .engine
                    .commit_booking(provider_id, slot, quote, metadata)
                    .await?;
                to_value(&booking)
            }
            Request::AttemptBooking {
                provider_id,
                slot,
                quote,
                metadata,
            } => {
                let outcome = self
                    .engine
                    .attempt_booking(provider_id, slot, quote, metadata)
                    .await;
                let state = outcome.state();
                match outcome {
                    AttemptOutcome::Committed(booking) => Ok(json!({
                        "state": state,
                        "booking": booking,
                    })),
                    AttemptOutcome::Conflicted {
                        conflict_with,
                        alternatives,
                    } => {
                        let (alternatives, search_error) = match alternatives {
                            Ok(found) => (found, None),
                            Err(e) => (Vec::new(), Some(e.to_string())),
                        };
                        Ok(json!({
                            "state": state,
                            "conflict_with": conflict_with,
                            "alternatives": alternatives,
                            "alternatives_error": search_error,
                        }))
                    }
                    AttemptOutcome::Failed(e) => Err(e),
                }
            }
            Request::CancelBooking { id } => to_value(&self.engine.cancel_booking(id).await?),
            Request::GetBooking { id } => {
                let booking = self
                    .store
                    .get_booking(&id)
                    .await
                    .ok_or(EngineError::NotFound(id))?;
                to_value(&booking)
            }
            Request::ListBookings {
                provider_id,
                from,
                to,
            } => {
                let window = span_between(from, to)?;
                to_value(&self.store.bookings_for(provider_id, window).await)
            }
            Request::AddBlock {
                id,
                provider_id,
                start,
                end,
                reason,
            } => {
                let id = id.unwrap_or_else(Ulid::new);
                let span = span_between(start, end)?;
                self.store.add_block(id, provider_id, span, reason).await?;
                Ok(json!({ "id": id }))
            }
            Request::RemoveBlock { id } => {
                let provider_id = self.store.remove_block(id).await?;
                Ok(json!({ "id": id, "provider_id": provider_id }))
            }
            Request::FreeWindows {
                provider_id,
                date,
                hours,
            } => {
                let hours = hours.unwrap_or(self.engine.config().business_hours);
                to_value(&self.engine.free_windows(provider_id, date, hours).await?)
            }
        }
    }
}

fn span_between(start: NaiveDateTime, end: NaiveDateTime) -> Result<Span, EngineError> {
    let (start, end) = (to_ms(start), to_ms(end));
    if start >= end {
        return Err(EngineError::Validation("start must be before end".into()));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(ModelError::OutOfRange.into());
    }
    Ok(Span::new(start, end))
}

fn to_value<T: Serialize>(v: &T) -> Result<Value, EngineError> {
    serde_json::to_value(v).map_err(|e| EngineError::Validation(format!("unencodable result: {e}")))
}

/// Serve one client: one JSON request per line, one JSON response per line,
/// in order, until the peer closes.
pub async fn process_connection(
    socket: TcpStream,
    handler: Arc<SlotHandler>,
) -> Result<(), LinesCodecError> {
    let mut framed = Framed::new(
        socket,
        LinesCodec::new_with_max_length(MAX_REQUEST_LINE_BYTES),
    );

    while let Some(line) = framed.next().await {
        let line = match line {
            Ok(line) => line,
            // The stream ends after a decode error; tell the client why first.
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                let reply =
                    Response::error("limit", format!("request exceeds {MAX_REQUEST_LINE_BYTES} bytes"));
                framed.send(reply.to_line()).await?;
                break;
            }
            Err(e) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = handler.handle_line(&line).await;
        framed.send(response).await?;
    }
    Ok(())
}
