//! Chain access
//!
//! Everything the reporter needs from a chain node sits behind [`ChainClient`]:
//! - Reading the aggregator's latest round
//! - Nonce, gas price and chain id for building a transaction
//! - Submitting a signed `transmit(round, answer)` call
//! - Polling for the transaction receipt

mod mock;
mod rpc;

pub use mock::{MockChainClient, ReceiptBehavior, SubmittedTx};
pub use rpc::RpcChainClient;

use crate::error::Result;
use crate::keyring::SigningIdentity;
use crate::types::{FeedState, TxReceipt};
use async_trait::async_trait;
use ethers::types::{Address, H256, I256, U256};
use std::sync::Arc;

/// Everything needed to sign one transaction: who signs, and the values read
/// from the chain immediately before signing.
#[derive(Debug, Clone)]
pub struct TransactAuth {
    pub identity: Arc<SigningIdentity>,
    pub nonce: U256,
    pub gas_price: U256,
    pub chain_id: u64,
}

impl TransactAuth {
    pub fn from(&self) -> Address {
        self.identity.address()
    }
}

/// Chain node operations (allows mocking)
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Next nonce for `address`, counting transactions still in the mempool
    async fn pending_nonce(&self, address: Address) -> Result<U256>;

    async fn suggest_gas_price(&self) -> Result<U256>;

    async fn chain_id(&self) -> Result<u64>;

    /// Latest round of the aggregator at `feed`
    async fn latest_round(&self, feed: Address) -> Result<FeedState>;

    /// Sign and send `transmit(round_id, answer)` to `feed`, returning the tx hash
    async fn submit_transmit(
        &self,
        feed: Address,
        auth: &TransactAuth,
        round_id: u32,
        answer: I256,
    ) -> Result<H256>;

    /// `None` while the transaction is not yet mined
    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TxReceipt>>;
}
