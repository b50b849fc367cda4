//! Legacy (EIP-155) value transfers: RLP encoding, signing and hashing.

use std::fmt;

use alloy_primitives::Address;
use k256::ecdsa::SigningKey;
use sha3::{Digest, Keccak256};

use crate::errors::{WalletError, WalletResult};

/// Gas for a plain value transfer with no calldata.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Transaction hash (Keccak-256 of the raw signed bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    /// Wei per gas unit.
    pub gas_price: u128,
    pub gas_limit: u64,
    /// `None` for contract creation.
    pub to: Option<[u8; 20]>,
    /// Wei.
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    pub fn transfer(to: Address, value: u128, nonce: u64, gas_price: u128, chain_id: u64) -> Self {
        let mut recipient = [0u8; 20];
        recipient.copy_from_slice(to.as_slice());
        Self {
            nonce,
            gas_price,
            gas_limit: TRANSFER_GAS_LIMIT,
            to: Some(recipient),
            value,
            data: Vec::new(),
            chain_id,
        }
    }

    /// RLP of `[nonce, gas_price, gas_limit, to, value, data, chain_id, 0, 0]`.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut items = self.base_items();
        items.push(rlp_encode_u64(self.chain_id));
        items.push(rlp_encode_u64(0));
        items.push(rlp_encode_u64(0));
        rlp_encode_list(&items)
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        keccak256(&self.signing_payload())
    }

    pub fn sign(&self, key: &SigningKey) -> WalletResult<SignedTransaction> {
        let hash = self.signing_hash();
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| WalletError::CryptoError(format!("Signing failed: {}", e)))?;

        let v = self
            .chain_id
            .checked_mul(2)
            .and_then(|n| n.checked_add(35 + u64::from(recovery_id.to_byte())))
            .ok_or_else(|| WalletError::ValidationError("Chain id too large".to_string()))?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        Ok(SignedTransaction {
            transaction: self.clone(),
            v,
            r,
            s,
        })
    }

    fn base_items(&self) -> Vec<Vec<u8>> {
        vec![
            rlp_encode_u64(self.nonce),
            rlp_encode_u128(self.gas_price),
            rlp_encode_u64(self.gas_limit),
            match &self.to {
                Some(addr) => rlp_encode_bytes(addr),
                None => rlp_encode_bytes(&[]),
            },
            rlp_encode_u128(self.value),
            rlp_encode_bytes(&self.data),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction: LegacyTransaction,
    pub v: u64,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl SignedTransaction {
    /// Network encoding, ready for `eth_sendRawTransaction`.
    pub fn raw(&self) -> Vec<u8> {
        let mut items = self.transaction.base_items();
        items.push(rlp_encode_u64(self.v));
        items.push(rlp_encode_bytes(trim_leading_zeros(&self.r)));
        items.push(rlp_encode_bytes(trim_leading_zeros(&self.s)));
        rlp_encode_list(&items)
    }

    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(self.raw()))
    }

    pub fn hash(&self) -> TxHash {
        TxHash(keccak256(&self.raw()))
    }

    /// Parity of the signature, or `None` when `v` is not an EIP-155 value
    /// for this transaction's chain id.
    pub fn recovery_id(&self) -> Option<u8> {
        // v = chain_id * 2 + 35 + recid
        let base = self.transaction.chain_id.checked_mul(2)?.checked_add(35)?;
        match self.v.checked_sub(base)? {
            id @ (0 | 1) => Some(id as u8),
            _ => None,
        }
    }
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn rlp_encode_u64(value: u64) -> Vec<u8> {
    if value == 0 {
        return vec![0x80];
    }
    rlp_encode_bytes(trim_leading_zeros(&value.to_be_bytes()))
}

fn rlp_encode_u128(value: u128) -> Vec<u8> {
    if value == 0 {
        return vec![0x80];
    }
    rlp_encode_bytes(trim_leading_zeros(&value.to_be_bytes()))
}

fn rlp_encode_bytes(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        return vec![bytes[0]];
    }

    let mut result = encode_header(0x80, 0xb7, bytes.len());
    result.extend_from_slice(bytes);
    result
}

fn rlp_encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let total_len: usize = items.iter().map(Vec::len).sum();
    let mut result = encode_header(0xc0, 0xf7, total_len);
    for item in items {
        result.extend_from_slice(item);
    }
    result
}

fn encode_header(short_offset: u8, long_offset: u8, len: usize) -> Vec<u8> {
    if len <= 55 {
        return vec![short_offset + len as u8];
    }
    let len_bytes = (len as u64).to_be_bytes();
    let len_bytes = trim_leading_zeros(&len_bytes);
    let mut header = Vec::with_capacity(1 + len_bytes.len());
    header.push(long_offset + len_bytes.len() as u8);
    header.extend_from_slice(len_bytes);
    header
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[first_nonzero..]
}
