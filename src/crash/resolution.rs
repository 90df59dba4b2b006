use crate::errors::ArithmeticError;
use crate::math::Fraction;
use serde::{Deserialize, Serialize};

/// Cash-out choice fixed when the bet is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashOut {
    /// Ride the round to its crash point (capped at max-odd).
    NoPresetPoint,
    /// Cash out at this multiplier if the round reaches it.
    PresetPoint(Fraction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetOutcome {
    Won,
    Lost,
}

/// Result of applying the payout policy to one bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub outcome: BetOutcome,
    /// Multiplier the payout was computed at (zero on a loss).
    pub point: Fraction,
    pub payout: u64,
    /// True when the reward ceiling cut the payout down.
    pub clamped: bool,
}

/// Applies the settlement policy for one bet.
///
/// A preset point wins iff it is at or below the crash point and pays
/// `floor(stake × point)`. Without a preset point the bet pays
/// `floor(stake × min(crash_point, max_odd))`. Every payout is clamped to the
/// reward ceiling reserved when the bet was placed.
pub fn resolve(
    stake: u64,
    cash_out: CashOut,
    crash_point: Fraction,
    max_odd: Fraction,
    reward_ceiling: u64,
) -> Result<Resolution, ArithmeticError> {
    let point = match cash_out {
        CashOut::PresetPoint(point) if point <= crash_point => point,
        CashOut::PresetPoint(_) => {
            return Ok(Resolution {
                outcome: BetOutcome::Lost,
                point: Fraction::zero(),
                payout: 0,
                clamped: false,
            })
        }
        CashOut::NoPresetPoint => crash_point.min(max_odd),
    };

    let (payout, clamped) = match point.mul_u64(stake) {
        Ok(raw) if raw > reward_ceiling => (reward_ceiling, true),
        Ok(raw) => (raw, false),
        // Wider than u64 is necessarily above the ceiling.
        Err(ArithmeticError::AmountOverflow(_)) => (reward_ceiling, true),
        Err(e) => return Err(e),
    };

    let outcome = if payout > 0 { BetOutcome::Won } else { BetOutcome::Lost };
    Ok(Resolution {
        outcome,
        point,
        payout,
        clamped,
    })
}
