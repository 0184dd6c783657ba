//! Core data types shared across the reporter

use crate::keyring::SigningIdentity;
use chrono::{DateTime, Utc};
use ethers::types::{H256, I256};
use std::sync::Arc;

/// A market quote as returned by the quote source.
///
/// The price is kept as the decimal text the source sent; it is converted to
/// the feed's fixed-point integer exactly once, by the decision engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub price: String,
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(price: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            price: price.into(),
            observed_at,
        }
    }
}

/// Snapshot of the on-chain feed at decision time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedState {
    pub round_id: u64,
    pub answer: I256,
    /// When the latest round was started on-chain
    pub started_at: DateTime<Utc>,
}

/// Which update trigger(s) fired for a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTrigger {
    Deviation,
    Heartbeat,
    Both,
}

/// Result of evaluating the update policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub should_update: bool,
    /// Quote price in the feed's fixed-point representation
    pub new_answer: I256,
    /// `round_id + 1` of the state the decision was made against
    pub target_round: u64,
    /// `|new_answer - answer|`
    pub deviation: I256,
    pub trigger: Option<UpdateTrigger>,
}

/// An update about to be signed and submitted. Never persisted.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub target_round: u64,
    pub new_answer: I256,
    pub identity: Arc<SigningIdentity>,
}

/// Chain-side confirmation of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    /// False when the transaction was mined but reverted
    pub success: bool,
}
