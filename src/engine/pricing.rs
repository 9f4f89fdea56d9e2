use rust_decimal::{Decimal, RoundingStrategy};

use crate::model::PriceQuote;

use super::EngineError;

/// Total and deposit for `quantity` units at `unit_rate`.
///
/// The deposit is `deposit_percent` of the total rounded to whole currency
/// units (ties away from zero) and never exceeds the total. A missing
/// percentage means no deposit. A non-positive quantity is a form still being
/// filled in and prices at zero.
///
/// The preview shown to the client and the commit path both call this; the
/// commit gate rejects any quote this function would not reproduce.
pub fn compute_quote(
    unit_rate: Decimal,
    quantity: Decimal,
    deposit_percent: Option<Decimal>,
) -> Result<PriceQuote, EngineError> {
    let deposit_percent = deposit_percent.unwrap_or(Decimal::ZERO);
    if unit_rate < Decimal::ZERO {
        return Err(EngineError::Validation("unit rate must not be negative".into()));
    }
    if deposit_percent < Decimal::ZERO || deposit_percent > Decimal::ONE_HUNDRED {
        return Err(EngineError::Validation(
            "deposit percent must be between 0 and 100".into(),
        ));
    }

    if quantity <= Decimal::ZERO {
        return Ok(PriceQuote {
            unit_rate,
            quantity,
            deposit_percent,
            total: Decimal::ZERO,
            deposit: Decimal::ZERO,
        });
    }

    let total = unit_rate
        .checked_mul(quantity)
        .ok_or(EngineError::LimitExceeded("price overflow"))?;
    let deposit = total
        .checked_mul(deposit_percent)
        .ok_or(EngineError::LimitExceeded("price overflow"))?
        / Decimal::ONE_HUNDRED;
    let deposit = deposit
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .min(total);

    Ok(PriceQuote {
        unit_rate,
        quantity,
        deposit_percent,
        total,
        deposit,
    })
}

impl PriceQuote {
    /// Check that `total` and `deposit` are what [`compute_quote`] yields for
    /// this rate, quantity and percentage.
    pub fn verify(&self) -> Result<(), EngineError> {
        let expected = compute_quote(self.unit_rate, self.quantity, Some(self.deposit_percent))?;
        if expected.total != self.total || expected.deposit != self.deposit {
            return Err(EngineError::QuoteMismatch);
        }
        Ok(())
    }
}
