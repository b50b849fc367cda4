pub mod paths;
pub mod vault;

pub use paths::WalletPaths;
pub use vault::{
    validate_vault_key, FileVaultStore, MemoryVaultStore, VaultStore, DEFAULT_VAULT_KEY,
};
