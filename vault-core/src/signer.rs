use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use k256::ecdsa::SigningKey;

use crate::derivation::Account;
use crate::errors::{WalletError, WalletResult};
use crate::transaction::{LegacyTransaction, SignedTransaction};
use crate::validation::InputValidator;

/// Network collaborator used by [`AccountSigner::send`].
///
/// Implementations talk to an RPC node; nothing here retries.
pub trait TransactionBroadcaster {
    /// Next nonce for `address` (pending transaction count).
    fn transaction_count(&self, address: &Address) -> WalletResult<u64>;

    /// Current gas price in wei.
    fn gas_price(&self) -> WalletResult<u128>;

    /// Submit a signed transaction; returns the hash the node acknowledged.
    fn send_raw_transaction(&self, raw: &[u8]) -> WalletResult<String>;
}

/// Signing capability for one account.
///
/// Owns a copy of the key that is zeroized when the signer is dropped.
pub struct AccountSigner {
    index: u32,
    address: Address,
    chain_id: u64,
    key: SigningKey,
}

impl AccountSigner {
    pub fn new(account: &Account, chain_id: u64) -> WalletResult<Self> {
        let key = SigningKey::from_slice(account.private_key_bytes())
            .map_err(|_| WalletError::InvalidPrivateKey("scalar out of range".to_string()))?;
        let address = Address::from_str(&account.address)
            .map_err(|e| WalletError::InvalidAddress(e.to_string()))?;

        Ok(Self {
            index: account.index,
            address,
            chain_id,
            key,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn address(&self) -> String {
        self.address.to_checksum(None)
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Sign a plain value transfer without touching the network.
    pub fn sign_transfer(
        &self,
        to: Address,
        value_wei: u128,
        nonce: u64,
        gas_price: u128,
    ) -> WalletResult<SignedTransaction> {
        LegacyTransaction::transfer(to, value_wei, nonce, gas_price, self.chain_id).sign(&self.key)
    }

    /// Transfer `amount` (decimal ether) to `recipient` and return the
    /// acknowledged transaction hash.
    pub fn send(
        &self,
        recipient: &str,
        amount: &str,
        provider: &dyn TransactionBroadcaster,
    ) -> WalletResult<String> {
        let validator = InputValidator::new()?;
        let to = validator.parse_address(recipient)?;
        let value = validator.parse_amount(amount)?;

        let nonce = provider
            .transaction_count(&self.address)
            .map_err(network_error)?;
        let gas_price = provider.gas_price().map_err(network_error)?;

        let signed = self.sign_transfer(to, value, nonce, gas_price)?;
        let hash = provider
            .send_raw_transaction(&signed.raw())
            .map_err(network_error)?;

        log::info!(
            "Broadcast transfer from account {} (nonce {}), tx {}",
            self.index,
            nonce,
            hash
        );
        Ok(hash)
    }
}

impl fmt::Debug for AccountSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSigner")
            .field("index", &self.index)
            .field("address", &self.address())
            .field("chain_id", &self.chain_id)
            .field("key", &"<redacted>")
            .finish()
    }
}

fn network_error(error: WalletError) -> WalletError {
    match error {
        WalletError::NetworkError(_) => error,
        other => WalletError::NetworkError(other.to_string()),
    }
}
