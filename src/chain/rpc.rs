//! JSON-RPC chain client backed by ethers

use super::{ChainClient, TransactAuth};
use crate::config::ChainConfig;
use crate::error::{ReporterError, Result};
use crate::types::{FeedState, TxReceipt};
use async_trait::async_trait;
use chrono::DateTime;
use ethers::contract::abigen;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, TransactionRequest, H256, I256, U256};
use std::sync::Arc;

abigen!(
    OffchainAggregator,
    r#"[
        function latestRoundData() external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound)
        function transmit(uint32 roundId, int192 answer) external
    ]"#
);

fn rpc_err(err: impl std::fmt::Display) -> ReporterError {
    ReporterError::Rpc(err.to_string())
}

/// Chain client for one configured node
pub struct RpcChainClient {
    name: String,
    provider: Arc<Provider<Http>>,
    gas_limit: Option<U256>,
}

impl RpcChainClient {
    pub fn new(config: &ChainConfig) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str()).map_err(|e| {
            ReporterError::Config(format!("invalid rpc_url for chain {}: {}", config.name, e))
        })?;

        Ok(Self {
            name: config.name.clone(),
            provider: Arc::new(provider),
            gas_limit: config.gas_limit.map(U256::from),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn aggregator(&self, feed: Address) -> OffchainAggregator<Provider<Http>> {
        OffchainAggregator::new(feed, Arc::clone(&self.provider))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn pending_nonce(&self, address: Address) -> Result<U256> {
        self.provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(rpc_err)
    }

    async fn suggest_gas_price(&self) -> Result<U256> {
        self.provider.get_gas_price().await.map_err(rpc_err)
    }

    async fn chain_id(&self) -> Result<u64> {
        let id = self.provider.get_chainid().await.map_err(rpc_err)?;
        if id > U256::from(u64::MAX) {
            return Err(ReporterError::Rpc(format!("chain id {} out of range", id)));
        }
        Ok(id.as_u64())
    }

    async fn latest_round(&self, feed: Address) -> Result<FeedState> {
        let (round_id, answer, started_at, _updated_at, _answered_in_round) = self
            .aggregator(feed)
            .latest_round_data()
            .call()
            .await
            .map_err(rpc_err)?;

        let round_id = U256::from(round_id);
        if round_id > U256::from(u64::MAX) {
            return Err(ReporterError::Rpc(format!("round id {} out of range", round_id)));
        }
        let started_at = DateTime::from_timestamp(started_at.low_u64() as i64, 0)
            .ok_or_else(|| ReporterError::Rpc(format!("bad round timestamp {}", started_at)))?;

        Ok(FeedState {
            round_id: round_id.as_u64(),
            answer,
            started_at,
        })
    }

    async fn submit_transmit(
        &self,
        feed: Address,
        auth: &TransactAuth,
        round_id: u32,
        answer: I256,
    ) -> Result<H256> {
        let call = self.aggregator(feed).transmit(round_id, answer);
        let data = call
            .calldata()
            .ok_or_else(|| ReporterError::Internal("transmit call has no calldata".to_string()))?;

        // Legacy gas-price transaction; not every target chain supports EIP-1559
        let mut tx: TypedTransaction = TransactionRequest::new()
            .from(auth.from())
            .to(feed)
            .data(data)
            .value(U256::zero())
            .nonce(auth.nonce)
            .gas_price(auth.gas_price)
            .chain_id(auth.chain_id)
            .into();

        let gas = match self.gas_limit {
            Some(limit) => limit,
            None => self.provider.estimate_gas(&tx, None).await.map_err(rpc_err)?,
        };
        tx.set_gas(gas);

        let signature = auth.identity.sign_transaction(&tx, auth.chain_id)?;
        let raw = tx.rlp_signed(&signature);

        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(rpc_err)?;

        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TxReceipt>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(rpc_err)?;

        Ok(receipt.map(|r| TxReceipt {
            tx_hash,
            block_number: r.block_number.map(|n| n.as_u64()),
            // pre-Byzantium receipts carry no status
            success: r.status.map(|s| s.as_u64() == 1).unwrap_or(true),
        }))
    }
}
