// lib.rs - Core library structure for the key vault

pub mod app_state;
pub mod cipher;
pub mod config_store;
pub mod derivation;
pub mod errors;
pub mod manager;
pub mod session;
pub mod signer;
pub mod storage;
pub mod transaction;
pub mod units;
pub mod validation;

// Re-export common types
pub use app_state::WalletContext;
pub use cipher::{CipherEnvelope, EncryptedBlob, KdfProfile};
pub use config_store::{
    ConfigStore, ExplorerConfig, NetworkConfig, SessionConfig, WalletConfig,
};
pub use derivation::{
    derivation_path, derive_account, derive_accounts, generate_mnemonic,
    restore_from_private_key, suggest_words, validate_mnemonic, Account, AccountSummary,
    Mnemonic, MnemonicStrength,
};
pub use errors::{WalletError, WalletResult};
pub use manager::{Vault, WalletManager, WalletState, WalletStatus};
pub use session::{PasswordSession, SessionSecret};
pub use signer::{AccountSigner, TransactionBroadcaster};
pub use storage::{FileVaultStore, MemoryVaultStore, VaultStore, WalletPaths, DEFAULT_VAULT_KEY};
pub use transaction::{LegacyTransaction, SignedTransaction, TxHash};
pub use validation::InputValidator;
