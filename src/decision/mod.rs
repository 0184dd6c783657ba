//! Update decision engine
//!
//! Decides whether a fresh quote justifies a new on-chain round:
//! - Deviation: `|new - old| * K >= new`, i.e. the price moved by at least 1/K
//! - Heartbeat: the latest round is older than the staleness window
//!
//! Prices are converted to the feed's fixed-point integer once, with decimal
//! arithmetic, and every comparison after that is integer-only.

#[cfg(test)]
mod tests;

use crate::config::{FeedConfig, PolicyConfig};
use crate::error::{ReporterError, Result};
use crate::types::{Decision, FeedState, Quote, UpdateTrigger};
use chrono::{DateTime, Duration, Utc};
use ethers::types::I256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Convert decimal price text into a fixed-point integer with `decimals`
/// fractional digits, truncating the remainder.
///
/// Zero, negative and unparsable prices are rejected rather than mapped to
/// zero, since a zero answer would always look like a large deviation.
pub fn to_fixed_point(price: &str, decimals: u32) -> Result<I256> {
    let text = price.trim();
    let value = Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| ReporterError::InvalidPrice(price.to_string()))?;

    if value <= Decimal::ZERO {
        return Err(ReporterError::InvalidPrice(price.to_string()));
    }

    let scale = 10i64
        .checked_pow(decimals)
        .map(Decimal::from)
        .ok_or_else(|| ReporterError::Config(format!("unsupported decimals {}", decimals)))?;

    let scaled = value
        .checked_mul(scale)
        .ok_or_else(|| ReporterError::InvalidPrice(price.to_string()))?
        .trunc();

    let integer = scaled
        .to_i128()
        .ok_or_else(|| ReporterError::InvalidPrice(price.to_string()))?;

    if integer == 0 {
        // positive but below the feed's resolution
        return Err(ReporterError::InvalidPrice(price.to_string()));
    }

    Ok(I256::from(integer))
}

/// Heartbeat window for a minute count, `None` when it cannot be represented
pub fn heartbeat_window(minutes: u64) -> Option<Duration> {
    i64::try_from(minutes).ok().and_then(Duration::try_minutes)
}

/// Deviation/heartbeat update policy for one feed
#[derive(Debug, Clone)]
pub struct UpdateDecisionEngine {
    decimals: u32,
    deviation_divisor: u64,
    heartbeat: Duration,
}

impl UpdateDecisionEngine {
    pub fn new(decimals: u32, deviation_divisor: u64, heartbeat: Duration) -> Self {
        Self {
            decimals,
            deviation_divisor,
            heartbeat,
        }
    }

    /// Build the engine for a feed, applying its overrides over the global policy
    pub fn for_feed(policy: &PolicyConfig, feed: &FeedConfig) -> Self {
        let heartbeat_minutes = feed.heartbeat_minutes.unwrap_or(policy.heartbeat_minutes);
        Self::new(
            feed.decimals.unwrap_or(policy.decimals),
            feed.deviation_divisor.unwrap_or(policy.deviation_divisor),
            heartbeat_window(heartbeat_minutes).unwrap_or(Duration::MAX),
        )
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    /// Evaluate the policy against the latest round, `since_last_update`
    /// being the age of that round.
    pub fn decide(
        &self,
        state: &FeedState,
        quote: &Quote,
        since_last_update: Duration,
    ) -> Result<Decision> {
        let target_round = state.round_id.checked_add(1).ok_or_else(|| {
            ReporterError::Internal(format!("round {} has no successor", state.round_id))
        })?;
        let new_answer = to_fixed_point(&quote.price, self.decimals)?;
        let deviation = (new_answer - state.answer).abs();

        let deviation_hit = deviation
            .checked_mul(I256::from(self.deviation_divisor as i128))
            .map(|scaled| scaled >= new_answer)
            // overflow means the deviation dwarfs any feed value
            .unwrap_or(true);
        let heartbeat_hit = since_last_update > self.heartbeat;

        let trigger = match (deviation_hit, heartbeat_hit) {
            (true, true) => Some(UpdateTrigger::Both),
            (true, false) => Some(UpdateTrigger::Deviation),
            (false, true) => Some(UpdateTrigger::Heartbeat),
            (false, false) => None,
        };

        Ok(Decision {
            should_update: trigger.is_some(),
            new_answer,
            target_round,
            deviation,
            trigger,
        })
    }

    /// Same as [`decide`](Self::decide), measuring the round's age at `now`
    pub fn decide_at(&self, state: &FeedState, quote: &Quote, now: DateTime<Utc>) -> Result<Decision> {
        self.decide(state, quote, now - state.started_at)
    }
}
