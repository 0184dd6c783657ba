//! Transmission controller
//!
//! Runs one update cycle for a single feed target:
//! read state -> fetch quote -> decide -> sign/submit -> confirm.
//! Every step of a cycle is awaited in order, so a target never has more than
//! one update in flight. Per-cycle failures end up in [`CycleOutcome`] and are
//! never returned as errors.

mod scheduler;

pub use scheduler::{spawn_feed_tasks, FeedTask};

use crate::chain::{ChainClient, TransactAuth};
use crate::decision::UpdateDecisionEngine;
use crate::error::{ReporterError, Result};
use crate::keyring::{KeyRing, SigningIdentity};
use crate::quote::QuoteSource;
use crate::types::{Decision, PendingUpdate, TxReceipt};
use chrono::Utc;
use ethers::types::{Address, H256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Receipt polling settings
#[derive(Debug, Clone, Copy)]
pub struct ConfirmPolicy {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            attempts: 10,
        }
    }
}

/// Result of waiting for a receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed { receipt: TxReceipt, polls: u32 },
    Reverted { receipt: TxReceipt, polls: u32 },
    /// Attempts ran out; the transaction is left as is
    Deferred { polls: u32 },
}

/// What happened to one update transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmitOutcome {
    Confirmed,
    Reverted,
    Deferred,
    SubmitFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitReport {
    pub from: Address,
    pub round_id: u64,
    pub tx_hash: Option<H256>,
    pub outcome: TransmitOutcome,
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Latest round could not be read or has no successor
    StateUnavailable(String),
    /// Quote fetch or body extraction failed
    QuoteUnavailable(String),
    /// Quote price was not a usable number
    InvalidQuote(String),
    /// Neither deviation nor heartbeat fired
    NoUpdate(Decision),
    /// Update warranted but dry run is on
    DryRun(Decision),
    Transmitted {
        decision: Decision,
        reports: Vec<TransmitReport>,
    },
}

/// Drives update cycles for one (feed, chain, contract) target
pub struct TransmissionController {
    feed_name: String,
    chain_name: String,
    contract: Address,
    quotes: Arc<dyn QuoteSource>,
    chain: Arc<dyn ChainClient>,
    keyring: Arc<KeyRing>,
    engine: UpdateDecisionEngine,
    confirm: ConfirmPolicy,
    dry_run: bool,
    turn: u64,
}

impl TransmissionController {
    pub fn new(
        feed_name: impl Into<String>,
        chain_name: impl Into<String>,
        contract: Address,
        quotes: Arc<dyn QuoteSource>,
        chain: Arc<dyn ChainClient>,
        keyring: Arc<KeyRing>,
        engine: UpdateDecisionEngine,
    ) -> Self {
        Self {
            feed_name: feed_name.into(),
            chain_name: chain_name.into(),
            contract,
            quotes,
            chain,
            keyring,
            engine,
            confirm: ConfirmPolicy::default(),
            dry_run: false,
            turn: 0,
        }
    }

    pub fn with_confirm_policy(mut self, confirm: ConfirmPolicy) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// `feed@chain`, used in logs
    pub fn label(&self) -> String {
        format!("{}@{}", self.feed_name, self.chain_name)
    }

    /// Run one full cycle
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let label = self.label();

        let state = match self.chain.latest_round(self.contract).await {
            Ok(state) => state,
            Err(e) => {
                warn!(feed = %label, error = %e, "Failed to read latest round, skipping cycle");
                return CycleOutcome::StateUnavailable(e.to_string());
            }
        };

        let quote = match self.quotes.fetch().await {
            Ok(quote) => quote,
            Err(e) => {
                warn!(feed = %label, error = %e, "Failed to fetch quote, skipping cycle");
                return CycleOutcome::QuoteUnavailable(e.to_string());
            }
        };

        let decision = match self.engine.decide_at(&state, &quote, Utc::now()) {
            Ok(decision) => decision,
            Err(e @ ReporterError::InvalidPrice(_)) => {
                warn!(feed = %label, price = %quote.price, error = %e, "Rejected quote, skipping cycle");
                return CycleOutcome::InvalidQuote(e.to_string());
            }
            Err(e) => {
                warn!(feed = %label, round = state.round_id, error = %e, "Unusable feed state, skipping cycle");
                return CycleOutcome::StateUnavailable(e.to_string());
            }
        };

        if !decision.should_update {
            debug!(
                feed = %label,
                round = state.round_id,
                answer = %state.answer,
                proposed = %decision.new_answer,
                "No update needed"
            );
            return CycleOutcome::NoUpdate(decision);
        }

        info!(
            feed = %label,
            trigger = ?decision.trigger,
            round = decision.target_round,
            answer = %decision.new_answer,
            previous = %state.answer,
            "Update warranted"
        );

        if self.dry_run {
            return CycleOutcome::DryRun(decision);
        }

        let identities = self.keyring.select(self.turn);
        self.turn = self.turn.wrapping_add(1);

        let mut reports = Vec::with_capacity(identities.len());
        for (offset, identity) in identities.into_iter().enumerate() {
            let update = PendingUpdate {
                target_round: decision.target_round.saturating_add(offset as u64),
                new_answer: decision.new_answer,
                identity,
            };
            let report = self.transmit(&update).await;
            // later rounds cannot land once this one did not
            let failed = matches!(
                report.outcome,
                TransmitOutcome::SubmitFailed(_) | TransmitOutcome::Reverted
            );
            reports.push(report);
            if failed {
                break;
            }
        }

        CycleOutcome::Transmitted { decision, reports }
    }

    /// Sign, submit and confirm one update
    pub async fn transmit(&self, update: &PendingUpdate) -> TransmitReport {
        let from = update.identity.address();
        let label = self.label();

        let tx_hash = match self.submit(update).await {
            Ok(hash) => hash,
            Err(e) => {
                error!(feed = %label, from = ?from, round = update.target_round, error = %e, "Submission failed");
                return TransmitReport {
                    from,
                    round_id: update.target_round,
                    tx_hash: None,
                    outcome: TransmitOutcome::SubmitFailed(e.to_string()),
                };
            }
        };

        info!(
            feed = %label,
            tx = ?tx_hash,
            from = ?from,
            round = update.target_round,
            answer = %update.new_answer,
            "Transmit submitted"
        );

        let outcome = match self.confirm(tx_hash).await {
            Confirmation::Confirmed { receipt, polls } => {
                info!(feed = %label, tx = ?tx_hash, block = ?receipt.block_number, polls, "Transmit confirmed");
                TransmitOutcome::Confirmed
            }
            Confirmation::Reverted { receipt, polls } => {
                error!(feed = %label, tx = ?tx_hash, block = ?receipt.block_number, polls, "Transmit reverted");
                TransmitOutcome::Reverted
            }
            Confirmation::Deferred { polls } => {
                warn!(feed = %label, tx = ?tx_hash, polls, "No receipt yet, confirm later");
                TransmitOutcome::Deferred
            }
        };

        TransmitReport {
            from,
            round_id: update.target_round,
            tx_hash: Some(tx_hash),
            outcome,
        }
    }

    async fn submit(&self, update: &PendingUpdate) -> Result<H256> {
        let round_id = u32::try_from(update.target_round).map_err(|_| {
            ReporterError::Internal(format!("round {} does not fit uint32", update.target_round))
        })?;

        let auth = self.authorize(&update.identity).await?;
        self.chain
            .submit_transmit(self.contract, &auth, round_id, update.new_answer)
            .await
    }

    /// Nonce, gas price and chain id, always read fresh before signing
    async fn authorize(&self, identity: &Arc<SigningIdentity>) -> Result<TransactAuth> {
        let nonce = self.chain.pending_nonce(identity.address()).await?;
        let gas_price = self.chain.suggest_gas_price().await?;
        let chain_id = self.chain.chain_id().await?;

        Ok(TransactAuth {
            identity: Arc::clone(identity),
            nonce,
            gas_price,
            chain_id,
        })
    }

    /// Poll for a receipt, at most `attempts` times
    pub async fn confirm(&self, tx_hash: H256) -> Confirmation {
        let attempts = self.confirm.attempts;

        for poll in 1..=attempts {
            match self.chain.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.success => {
                    return Confirmation::Confirmed { receipt, polls: poll };
                }
                Ok(Some(receipt)) => {
                    return Confirmation::Reverted { receipt, polls: poll };
                }
                Ok(None) => {
                    debug!(tx = ?tx_hash, poll, attempts, "Receipt not found yet");
                }
                Err(e) => {
                    warn!(tx = ?tx_hash, poll, error = %e, "Receipt query failed");
                }
            }

            if poll < attempts {
                tokio::time::sleep(self.confirm.interval).await;
            }
        }

        Confirmation::Deferred { polls: attempts }
    }
}
