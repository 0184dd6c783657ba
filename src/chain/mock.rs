//! In-memory chain for tests
//!
//! Behaves like a single node's view of the chain:
//! - Pending nonce counts every transaction already submitted by an address
//! - A transmit does not touch the feed state until it is "mined"
//! - Receipts appear after a configurable number of polls, or never

use super::{ChainClient, TransactAuth};
use crate::error::{ReporterError, Result};
use crate::types::{FeedState, TxReceipt};
use async_trait::async_trait;
use chrono::Utc;
use ethers::types::{Address, H256, I256, U256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// When receipts become visible
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptBehavior {
    /// Receipt is returned on the Nth poll (1-based)
    AfterPolls(u32),
    /// Receipt is never found
    Never,
    /// Receipt is returned on the Nth poll, with status 0
    RevertAfterPolls(u32),
}

/// A transmit the mock accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTx {
    pub tx_hash: H256,
    pub feed: Address,
    pub from: Address,
    pub nonce: U256,
    pub gas_price: U256,
    pub chain_id: u64,
    pub round_id: u32,
    pub answer: I256,
}

#[derive(Debug, Default)]
struct MockState {
    feeds: HashMap<Address, FeedState>,
    submitted: Vec<SubmittedTx>,
    receipt_polls: HashMap<H256, u32>,
    nonce_queries: u32,
}

/// Mock chain client
pub struct MockChainClient {
    state: Arc<RwLock<MockState>>,
    chain_id: u64,
    gas_price: U256,
    receipts: ReceiptBehavior,
    /// Polls (1-based) on which the receipt query fails
    receipt_errors: Vec<u32>,
    fail_reads: bool,
    fail_submits: bool,
}

impl MockChainClient {
    pub fn new(chain_id: u64) -> Self {
        Self {
            state: Arc::new(RwLock::new(MockState::default())),
            chain_id,
            gas_price: U256::from(1_000_000_000u64),
            receipts: ReceiptBehavior::AfterPolls(1),
            receipt_errors: Vec::new(),
            fail_reads: false,
            fail_submits: false,
        }
    }

    pub fn with_feed(self, feed: Address, state: FeedState) -> Self {
        self.set_feed(feed, state);
        self
    }

    pub fn with_receipts(mut self, behavior: ReceiptBehavior) -> Self {
        self.receipts = behavior;
        self
    }

    pub fn with_receipt_errors(mut self, polls: Vec<u32>) -> Self {
        self.receipt_errors = polls;
        self
    }

    pub fn with_failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn with_failing_submits(mut self) -> Self {
        self.fail_submits = true;
        self
    }

    pub fn set_feed(&self, feed: Address, state: FeedState) {
        self.write().feeds.insert(feed, state);
    }

    pub fn submitted(&self) -> Vec<SubmittedTx> {
        self.read().submitted.clone()
    }

    /// Number of receipt queries made for `tx_hash`
    pub fn receipt_polls(&self, tx_hash: H256) -> u32 {
        self.read().receipt_polls.get(&tx_hash).copied().unwrap_or(0)
    }

    pub fn nonce_queries(&self) -> u32 {
        self.read().nonce_queries
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn pending_nonce(&self, address: Address) -> Result<U256> {
        if self.fail_reads {
            return Err(ReporterError::Rpc("mock: nonce unavailable".to_string()));
        }
        let mut state = self.write();
        state.nonce_queries += 1;
        let sent = state.submitted.iter().filter(|tx| tx.from == address).count();
        Ok(U256::from(sent))
    }

    async fn suggest_gas_price(&self) -> Result<U256> {
        if self.fail_reads {
            return Err(ReporterError::Rpc("mock: gas price unavailable".to_string()));
        }
        Ok(self.gas_price)
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    async fn latest_round(&self, feed: Address) -> Result<FeedState> {
        if self.fail_reads {
            return Err(ReporterError::Rpc("mock: call failed".to_string()));
        }
        self.read()
            .feeds
            .get(&feed)
            .cloned()
            .ok_or_else(|| ReporterError::Rpc(format!("mock: no contract at {:?}", feed)))
    }

    async fn submit_transmit(
        &self,
        feed: Address,
        auth: &TransactAuth,
        round_id: u32,
        answer: I256,
    ) -> Result<H256> {
        if self.fail_submits {
            return Err(ReporterError::Rpc("mock: transaction rejected".to_string()));
        }

        let mut state = self.write();
        let from = auth.from();
        if state
            .submitted
            .iter()
            .any(|tx| tx.from == from && tx.nonce == auth.nonce)
        {
            return Err(ReporterError::Rpc("mock: nonce too low".to_string()));
        }

        let tx_hash = H256::from_low_u64_be(state.submitted.len() as u64 + 1);
        state.submitted.push(SubmittedTx {
            tx_hash,
            feed,
            from,
            nonce: auth.nonce,
            gas_price: auth.gas_price,
            chain_id: auth.chain_id,
            round_id,
            answer,
        });
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TxReceipt>> {
        let mut state = self.write();
        let poll = {
            let count = state.receipt_polls.entry(tx_hash).or_insert(0);
            *count += 1;
            *count
        };

        if self.receipt_errors.contains(&poll) {
            return Err(ReporterError::Rpc("mock: receipt query failed".to_string()));
        }

        let (ready_at, success) = match self.receipts {
            ReceiptBehavior::AfterPolls(n) => (n, true),
            ReceiptBehavior::RevertAfterPolls(n) => (n, false),
            ReceiptBehavior::Never => return Ok(None),
        };
        if poll < ready_at {
            return Ok(None);
        }

        let mined = state.submitted.iter().find(|tx| tx.tx_hash == tx_hash).cloned();
        let Some(tx) = mined else {
            return Ok(None);
        };

        if success {
            // Mining applies the round to the feed
            state.feeds.insert(
                tx.feed,
                FeedState {
                    round_id: tx.round_id as u64,
                    answer: tx.answer,
                    started_at: Utc::now(),
                },
            );
        }

        Ok(Some(TxReceipt {
            tx_hash,
            block_number: Some(tx.nonce.low_u64() + 1),
            success,
        }))
    }
}
