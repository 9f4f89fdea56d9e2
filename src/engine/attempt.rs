use serde::Serialize;
use tracing::debug;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

/// Lifecycle of one booking attempt. `Drafting` and `Validating` are live;
/// the other three end the attempt. A retry starts over at `Drafting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Drafting,
    Validating,
    Committed,
    Conflicted,
    Failed,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptState::Committed | AttemptState::Conflicted | AttemptState::Failed
        )
    }

    /// The client confirmed the draft.
    pub fn confirm(self) -> Result<Self, EngineError> {
        match self {
            AttemptState::Drafting => Ok(AttemptState::Validating),
            other => Err(EngineError::Validation(format!(
                "cannot confirm an attempt in state {other:?}"
            ))),
        }
    }

    /// Terminal state for the result of a commit.
    pub fn resolve(self, result: &Result<Booking, EngineError>) -> Result<Self, EngineError> {
        if self != AttemptState::Validating {
            return Err(EngineError::Validation(format!(
                "cannot resolve an attempt in state {self:?}"
            )));
        }
        Ok(match result {
            Ok(_) => AttemptState::Committed,
            Err(e) if e.is_conflict() => AttemptState::Conflicted,
            Err(_) => AttemptState::Failed,
        })
    }
}

/// How a booking attempt ended.
#[derive(Debug)]
pub enum AttemptOutcome {
    Committed(Booking),
    /// The slot was taken. `alternatives` seeds the next attempt; it holds the
    /// search error if the follow-up search itself failed.
    Conflicted {
        conflict_with: Ulid,
        alternatives: Result<Vec<AlternativeSlot>, EngineError>,
    },
    Failed(EngineError),
}

impl AttemptOutcome {
    pub fn state(&self) -> AttemptState {
        match self {
            AttemptOutcome::Committed(_) => AttemptState::Committed,
            AttemptOutcome::Conflicted { .. } => AttemptState::Conflicted,
            AttemptOutcome::Failed(_) => AttemptState::Failed,
        }
    }
}

impl Engine {
    /// Run a confirmed draft through the commit gate. On conflict, search for
    /// alternatives of the same length from the requested day on.
    pub async fn attempt_booking(
        &self,
        provider_id: ProviderId,
        requested: TimeSlot,
        quote: PriceQuote,
        metadata: BookingMetadata,
    ) -> AttemptOutcome {
        let state = match AttemptState::Drafting.confirm() {
            Ok(state) => state,
            Err(e) => return AttemptOutcome::Failed(e),
        };
        let result = self
            .commit_booking(provider_id, requested, quote, metadata)
            .await;
        let state = match state.resolve(&result) {
            Ok(state) => state,
            Err(e) => return AttemptOutcome::Failed(e),
        };
        debug!("booking attempt for provider {provider_id} ended {state:?}");

        match result {
            Ok(booking) => AttemptOutcome::Committed(booking),
            Err(EngineError::Conflict(conflict_with)) => {
                let query =
                    self.alternative_query(requested.start().date(), requested.duration_minutes());
                let alternatives = self.find_alternatives(provider_id, &query).await;
                AttemptOutcome::Conflicted {
                    conflict_with,
                    alternatives,
                }
            }
            Err(e) => AttemptOutcome::Failed(e),
        }
    }
}
