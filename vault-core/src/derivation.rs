//! Deterministic key derivation for EVM accounts.
//!
//! Every account is a pure function of `(mnemonic, index)`: the BIP-39 seed
//! (empty passphrase) is walked along `m/44'/60'/0'/0/{index}` with BIP-32,
//! and the resulting secp256k1 key is turned into an EIP-55 address.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use alloy_primitives::Address;
use bip32::{ChildNumber, DerivationPath, XPrv};
use bip39::Language;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::errors::{WalletError, WalletResult};

/// Parent of every derived account: purpose 44, coin 60, account 0, external chain.
pub const ACCOUNT_PARENT_PATH: &str = "m/44'/60'/0'/0";

/// Shortest prefix for which wordlist suggestions are offered.
pub const MIN_SUGGESTION_PREFIX: usize = 3;

const PRIVATE_KEY_LEN: usize = 32;

/// Full derivation path for an account index.
pub fn derivation_path(index: u32) -> String {
    format!("{}/{}", ACCOUNT_PARENT_PATH, index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MnemonicStrength {
    Bits128,
    Bits256,
}

impl MnemonicStrength {
    pub fn entropy_bytes(self) -> usize {
        match self {
            MnemonicStrength::Bits128 => 16,
            MnemonicStrength::Bits256 => 32,
        }
    }

    pub fn word_count(self) -> usize {
        match self {
            MnemonicStrength::Bits128 => 12,
            MnemonicStrength::Bits256 => 24,
        }
    }

    pub fn from_word_count(words: usize) -> Option<Self> {
        match words {
            12 => Some(MnemonicStrength::Bits128),
            24 => Some(MnemonicStrength::Bits256),
            _ => None,
        }
    }
}

/// A checksum-validated English BIP-39 phrase of 12 or 24 words.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Mnemonic {
    phrase: String,
}

impl Mnemonic {
    /// Normalize whitespace and case, then validate word count and checksum.
    pub fn parse(phrase: &str) -> WalletResult<Self> {
        let words: Vec<&str> = phrase.split_whitespace().collect();
        if MnemonicStrength::from_word_count(words.len()).is_none() {
            return Err(WalletError::InvalidMnemonic(format!(
                "expected 12 or 24 words, got {}",
                words.len()
            )));
        }

        let normalized = Zeroizing::new(words.join(" ").to_lowercase());
        bip39::Mnemonic::parse_in_normalized(Language::English, &normalized)
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;

        Ok(Self {
            phrase: normalized.to_string(),
        })
    }

    pub fn generate(strength: MnemonicStrength) -> WalletResult<Self> {
        let mut entropy = Zeroizing::new(vec![0u8; strength.entropy_bytes()]);
        OsRng
            .try_fill_bytes(&mut entropy)
            .map_err(|e| WalletError::CryptoError(format!("Failed to generate entropy: {}", e)))?;

        let mnemonic = bip39::Mnemonic::from_entropy(&entropy)
            .map_err(|e| WalletError::CryptoError(format!("Failed to create mnemonic: {}", e)))?;

        Ok(Self {
            phrase: mnemonic.to_string(),
        })
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn word_count(&self) -> usize {
        self.phrase.split_whitespace().count()
    }

    fn to_seed(&self) -> WalletResult<Zeroizing<[u8; 64]>> {
        let parsed = bip39::Mnemonic::parse_in_normalized(Language::English, &self.phrase)
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
        Ok(Zeroizing::new(parsed.to_seed_normalized("")))
    }
}

impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mnemonic")
            .field("word_count", &self.word_count())
            .field("phrase", &"<redacted>")
            .finish()
    }
}

impl Serialize for Mnemonic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.phrase)
    }
}

impl<'de> Deserialize<'de> for Mnemonic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Zeroizing::new(String::deserialize(deserializer)?);
        Mnemonic::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// One derived (or imported) signing account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub index: u32,
    /// `None` for an account imported from a bare private key.
    pub derivation_path: Option<String>,
    pub address: String,
    #[serde(with = "private_key_hex")]
    private_key: Zeroizing<[u8; PRIVATE_KEY_LEN]>,
    /// Display value only; never used for decisions.
    #[serde(default)]
    pub cached_balance: Option<String>,
}

impl Account {
    fn from_key(
        index: u32,
        derivation_path: Option<String>,
        private_key: Zeroizing<[u8; PRIVATE_KEY_LEN]>,
    ) -> WalletResult<Self> {
        let address = address_from_private_key(&private_key)?;
        Ok(Self {
            index,
            derivation_path,
            address,
            private_key,
            cached_balance: None,
        })
    }

    pub fn private_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", hex::encode(*self.private_key)))
    }

    pub(crate) fn private_key_bytes(&self) -> &[u8; PRIVATE_KEY_LEN] {
        &self.private_key
    }

    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            index: self.index,
            derivation_path: self.derivation_path.clone(),
            address: self.address.clone(),
            cached_balance: self.cached_balance.clone(),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("index", &self.index)
            .field("derivation_path", &self.derivation_path)
            .field("address", &self.address)
            .field("cached_balance", &self.cached_balance)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Public view of an account, safe to hand to presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub index: u32,
    pub derivation_path: Option<String>,
    pub address: String,
    pub cached_balance: Option<String>,
}

mod private_key_hex {
    use serde::{Deserialize, Deserializer, Serializer};
    use zeroize::Zeroizing;

    pub fn serialize<S: Serializer>(
        key: &Zeroizing<[u8; 32]>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded = Zeroizing::new(hex::encode(**key));
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Zeroizing<[u8; 32]>, D::Error> {
        let raw = Zeroizing::new(String::deserialize(deserializer)?);
        let mut key = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(raw.as_str(), key.as_mut()).map_err(serde::de::Error::custom)?;
        Ok(key)
    }
}

pub fn generate_mnemonic(strength: MnemonicStrength) -> WalletResult<Mnemonic> {
    Mnemonic::generate(strength)
}

/// Word count, wordlist membership and checksum check for user-supplied words.
pub fn validate_mnemonic(words: &[&str]) -> bool {
    if MnemonicStrength::from_word_count(words.len()).is_none() {
        return false;
    }
    let normalized = Zeroizing::new(words.join(" ").to_lowercase());
    bip39::Mnemonic::parse_in_normalized(Language::English, &normalized).is_ok()
}

pub fn derive_account(mnemonic: &Mnemonic, index: u32) -> WalletResult<Account> {
    let seed = mnemonic.to_seed()?;
    let parent = derive_parent(&seed)?;
    derive_child_account(&parent, index)
}

/// Derive a contiguous run of accounts, walking to the parent node only once.
pub fn derive_accounts(mnemonic: &Mnemonic, indices: Range<u32>) -> WalletResult<Vec<Account>> {
    let seed = mnemonic.to_seed()?;
    let parent = derive_parent(&seed)?;

    let mut accounts = Vec::with_capacity(indices.len());
    for index in indices {
        accounts.push(derive_child_account(&parent, index)?);
    }
    Ok(accounts)
}

/// Build a path-less account straight from a raw key (hex, optional `0x`).
pub fn restore_from_private_key(key_hex: &str) -> WalletResult<Account> {
    let trimmed = key_hex.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.len() != PRIVATE_KEY_LEN * 2 {
        return Err(WalletError::InvalidPrivateKey(format!(
            "expected {} hex characters, got {}",
            PRIVATE_KEY_LEN * 2,
            digits.len()
        )));
    }

    let mut key = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
    hex::decode_to_slice(digits, key.as_mut())
        .map_err(|_| WalletError::InvalidPrivateKey("malformed hex".to_string()))?;

    Account::from_key(0, None, key)
}

/// EIP-55 address for a raw secp256k1 key.
pub fn address_from_private_key(key: &[u8; PRIVATE_KEY_LEN]) -> WalletResult<String> {
    let secret = SecretKey::from_slice(key).map_err(|_| {
        WalletError::InvalidPrivateKey("scalar is zero or not below the curve order".to_string())
    })?;

    let encoded = secret.public_key().to_encoded_point(false);
    // Drop the 0x04 SEC1 tag; the address hashes the raw 64-byte point.
    let address = Address::from_raw_public_key(&encoded.as_bytes()[1..]);
    Ok(address.to_checksum(None))
}

/// English wordlist entries beginning with `prefix`.
pub fn suggest_words(prefix: &str) -> Vec<&'static str> {
    let prefix = prefix.trim().to_lowercase();
    if prefix.len() < MIN_SUGGESTION_PREFIX {
        return Vec::new();
    }

    Language::English
        .word_list()
        .iter()
        .copied()
        .filter(|word| word.starts_with(&prefix))
        .collect()
}

fn derive_parent(seed: &[u8; 64]) -> WalletResult<XPrv> {
    let root = XPrv::new(seed)
        .map_err(|e| WalletError::CryptoError(format!("Failed to create master key: {}", e)))?;

    let path = DerivationPath::from_str(ACCOUNT_PARENT_PATH)
        .map_err(|e| WalletError::CryptoError(format!("Invalid parent path: {}", e)))?;

    let mut node = root;
    for child in path {
        node = node
            .derive_child(child)
            .map_err(|e| WalletError::CryptoError(format!("Child derivation failed: {}", e)))?;
    }
    Ok(node)
}

fn derive_child_account(parent: &XPrv, index: u32) -> WalletResult<Account> {
    let child_number = ChildNumber::new(index, false).map_err(|_| {
        WalletError::ValidationError(format!(
            "Account index {} is outside the non-hardened range",
            index
        ))
    })?;

    let child = parent
        .derive_child(child_number)
        .map_err(|e| WalletError::CryptoError(format!("Child derivation failed: {}", e)))?;

    let key: [u8; PRIVATE_KEY_LEN] = child.private_key().to_bytes().into();
    Account::from_key(index, Some(derivation_path(index)), Zeroizing::new(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON_PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const TEST_JUNK_PHRASE: &str = "test test test test test test test test test test test junk";

    fn mnemonic(phrase: &str) -> Mnemonic {
        Mnemonic::parse(phrase).unwrap()
    }

    #[test]
    fn derives_reference_vectors() {
        let abandon = mnemonic(ABANDON_PHRASE);
        let first = derive_account(&abandon, 0).unwrap();
        assert_eq!(first.address, "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");
        assert_eq!(
            first.private_key_hex().as_str(),
            "0x1ab42cc412b618bdea3a599e3c9bae199ebf030895b039e9db1e30dafb12b727"
        );
        assert_eq!(
            derive_account(&abandon, 1).unwrap().address,
            "0x6Fac4D18c912343BF86fa7049364Dd4E424Ab9C0"
        );

        let junk = mnemonic(TEST_JUNK_PHRASE);
        let anvil = derive_account(&junk, 0).unwrap();
        assert_eq!(anvil.address, "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        assert_eq!(
            anvil.private_key_hex().as_str(),
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
        );
        assert_eq!(
            derive_account(&junk, 1).unwrap().address,
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let m = mnemonic(ABANDON_PHRASE);
        let a = derive_account(&m, 7).unwrap();
        let b = derive_account(&m, 7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.derivation_path.as_deref(), Some("m/44'/60'/0'/0/7"));
        assert_eq!(a.index, 7);
    }

    #[test]
    fn batch_matches_single_and_addresses_are_distinct() {
        let m = mnemonic(TEST_JUNK_PHRASE);
        let batch = derive_accounts(&m, 0..5).unwrap();
        assert_eq!(batch.len(), 5);

        for (i, account) in batch.iter().enumerate() {
            assert_eq!(account, &derive_account(&m, i as u32).unwrap());
        }
        for i in 0..batch.len() {
            for j in (i + 1)..batch.len() {
                assert_ne!(batch[i].address, batch[j].address);
            }
        }
    }

    #[test]
    fn hardened_range_index_rejected() {
        let m = mnemonic(ABANDON_PHRASE);
        let err = derive_account(&m, 1u32 << 31).unwrap_err();
        assert!(matches!(err, WalletError::ValidationError(_)));
    }

    #[test]
    fn generated_mnemonics_have_expected_length_and_validate() {
        let short = generate_mnemonic(MnemonicStrength::Bits128).unwrap();
        assert_eq!(short.word_count(), 12);
        let long = generate_mnemonic(MnemonicStrength::Bits256).unwrap();
        assert_eq!(long.word_count(), 24);

        let words: Vec<&str> = long.phrase().split(' ').collect();
        assert!(validate_mnemonic(&words));
    }

    #[test]
    fn eleven_words_rejected() {
        let words: Vec<&str> = ABANDON_PHRASE.split(' ').take(11).collect();
        assert!(!validate_mnemonic(&words));

        let err = Mnemonic::parse(&words.join(" ")).unwrap_err();
        assert!(matches!(err, WalletError::InvalidMnemonic(msg) if msg.contains("got 11")));
    }

    #[test]
    fn bad_checksum_and_unknown_words_rejected() {
        let bad_checksum = ["abandon"; 12];
        assert!(!validate_mnemonic(&bad_checksum));
        assert!(matches!(
            Mnemonic::parse(&bad_checksum.join(" ")),
            Err(WalletError::InvalidMnemonic(_))
        ));

        let mut unknown: Vec<&str> = ABANDON_PHRASE.split(' ').collect();
        unknown[3] = "notaword";
        assert!(!validate_mnemonic(&unknown));
    }

    #[test]
    fn parse_normalizes_case_and_spacing() {
        let messy = format!("  {}  ", ABANDON_PHRASE.to_uppercase().replace(' ', "   "));
        let parsed = Mnemonic::parse(&messy).unwrap();
        assert_eq!(parsed.phrase(), ABANDON_PHRASE);
    }

    #[test]
    fn restore_from_private_key_accepts_prefixed_and_bare_hex() {
        let bare = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let account = restore_from_private_key(bare).unwrap();
        assert_eq!(account.address, "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        assert_eq!(account.derivation_path, None);
        assert_eq!(account.index, 0);

        let prefixed = restore_from_private_key(&format!("0x{}", bare)).unwrap();
        assert_eq!(prefixed, account);
    }

    #[test]
    fn restore_from_private_key_rejects_bad_input() {
        let cases = [
            "0x1234",
            "zz0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            "0x0000000000000000000000000000000000000000000000000000000000000000",
            // secp256k1 group order
            "0xfffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141",
        ];
        for case in cases {
            assert!(
                matches!(
                    restore_from_private_key(case),
                    Err(WalletError::InvalidPrivateKey(_))
                ),
                "expected rejection for {case}"
            );
        }
    }

    #[test]
    fn suggestions_require_three_characters() {
        assert!(suggest_words("ab").is_empty());
        let suggestions = suggest_words("aba");
        assert!(suggestions.contains(&"abandon"));
        assert!(suggestions.iter().all(|w| w.starts_with("aba")));
        assert!(suggest_words("xyzq").is_empty());
    }

    #[test]
    fn account_serde_keeps_key_and_debug_hides_it() {
        let account = derive_account(&mnemonic(TEST_JUNK_PHRASE), 0).unwrap();
        let json = serde_json::to_string(&account).unwrap();
        let restored: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, account);

        let debug = format!("{:?}", account);
        assert!(!debug.contains("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"));
        assert!(debug.contains("<redacted>"));

        let mnemonic_debug = format!("{:?}", mnemonic(TEST_JUNK_PHRASE));
        assert!(!mnemonic_debug.contains("junk"));
    }
}
