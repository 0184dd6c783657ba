//! Signing identities
//!
//! Keys are decrypted once at startup from JSON keystores sharing a single
//! passphrase. The ring is immutable afterwards and shared read-only between
//! feed tasks; selection state (the round-robin turn) lives with the caller.

#[cfg(test)]
mod tests;

use crate::error::{ReporterError, Result};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Signature};
use rand::Rng;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// One decrypted reporter key
pub struct SigningIdentity {
    wallet: LocalWallet,
}

impl SigningIdentity {
    /// Decrypt a JSON keystore file
    pub fn from_keystore<P: AsRef<Path>>(path: P, passphrase: &str) -> Result<Self> {
        let path = path.as_ref();
        let keystore_err = |reason: String| ReporterError::Keystore {
            path: path.display().to_string(),
            reason,
        };

        let secret = eth_keystore::decrypt_key(path, passphrase)
            .map_err(|e| keystore_err(e.to_string()))?;
        let wallet = LocalWallet::from_bytes(&secret).map_err(|e| keystore_err(e.to_string()))?;

        Ok(Self { wallet })
    }

    /// Build an identity from a raw hex private key
    pub fn from_private_key(key: &str) -> Result<Self> {
        let wallet = key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| ReporterError::Signing(format!("invalid private key: {}", e)))?;
        Ok(Self { wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Sign a fully populated transaction with EIP-155 replay protection.
    /// The chain id set on `tx` wins over `chain_id`.
    pub fn sign_transaction(&self, tx: &TypedTransaction, chain_id: u64) -> Result<Signature> {
        let wallet = self.wallet.clone().with_chain_id(chain_id);
        wallet
            .sign_transaction_sync(tx)
            .map_err(|e| ReporterError::Signing(e.to_string()))
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// How identities are drawn for each update pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySelection {
    /// One identity per pass, rotating
    #[default]
    RoundRobin,
    /// One identity per pass, picked at random
    Random,
    /// Every identity, one transaction each, in order
    All,
}

/// Read-only set of signing identities
#[derive(Debug)]
pub struct KeyRing {
    identities: Vec<Arc<SigningIdentity>>,
    selection: KeySelection,
}

impl KeyRing {
    /// Decrypt every keystore with the shared passphrase
    pub fn load(paths: &[String], passphrase: &str, selection: KeySelection) -> Result<Self> {
        let mut identities = Vec::with_capacity(paths.len());

        for raw in paths {
            let expanded = shellexpand::tilde(raw);
            let identity = SigningIdentity::from_keystore(expanded.as_ref(), passphrase)?;
            tracing::info!(keystore = %raw, address = ?identity.address(), "Loaded signing key");
            identities.push(identity);
        }

        Self::from_identities(identities, selection)
    }

    pub fn from_identities(identities: Vec<SigningIdentity>, selection: KeySelection) -> Result<Self> {
        if identities.is_empty() {
            return Err(ReporterError::Config("key ring is empty".to_string()));
        }

        Ok(Self {
            identities: identities.into_iter().map(Arc::new).collect(),
            selection,
        })
    }

    /// Identities to use for pass number `turn`, in submission order
    pub fn select(&self, turn: u64) -> Vec<Arc<SigningIdentity>> {
        let count = self.identities.len();
        if count == 1 {
            return vec![Arc::clone(&self.identities[0])];
        }

        match self.selection {
            KeySelection::RoundRobin => {
                let index = (turn % count as u64) as usize;
                vec![Arc::clone(&self.identities[index])]
            }
            KeySelection::Random => {
                let index = rand::rng().random_range(0..count);
                vec![Arc::clone(&self.identities[index])]
            }
            KeySelection::All => self.identities.clone(),
        }
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.identities.iter().map(|id| id.address()).collect()
    }

    pub fn selection(&self) -> KeySelection {
        self.selection
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
