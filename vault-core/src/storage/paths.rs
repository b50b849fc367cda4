use std::fs;
use std::path::{Path, PathBuf};

use super::vault::validate_vault_key;
use crate::errors::{WalletError, WalletResult};

/// Manages filesystem paths used by the vault backend.
#[derive(Debug, Clone)]
pub struct WalletPaths {
    /// Root directory for wallet data.
    root_dir: PathBuf,
    /// Directory holding one encrypted blob per vault key.
    vault_dir: PathBuf,
    /// Path to persisted wallet configuration.
    config_file: PathBuf,
}

impl WalletPaths {
    /// Extension of every encrypted blob file.
    pub const VAULT_EXTENSION: &'static str = "vault";
    /// Extension of the in-flight file written before an atomic rename.
    pub const PENDING_EXTENSION: &'static str = "new";

    /// Create a new path manager rooted at the provided directory.
    pub fn new(root: impl AsRef<Path>) -> WalletResult<Self> {
        let root_dir = root.as_ref().to_path_buf();
        if root_dir.as_os_str().is_empty() {
            return Err(WalletError::StorageError(
                "Wallet root directory cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            vault_dir: root_dir.join("vaults"),
            config_file: root_dir.join("wallet.config"),
            root_dir,
        })
    }

    /// Ensure the directory structure exists, creating missing folders.
    pub fn ensure_directories(&self) -> WalletResult<()> {
        fs::create_dir_all(&self.root_dir)?;
        fs::create_dir_all(&self.vault_dir)?;
        Ok(())
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn vault_dir(&self) -> &Path {
        &self.vault_dir
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Blob path for `key`. The key is validated so it cannot leave `vault_dir`.
    pub fn vault_file(&self, key: &str) -> WalletResult<PathBuf> {
        validate_vault_key(key)?;
        Ok(self
            .vault_dir
            .join(format!("{}.{}", key, Self::VAULT_EXTENSION)))
    }

    /// Keys of every blob currently on disk, sorted.
    pub fn list_vault_keys(&self) -> WalletResult<Vec<String>> {
        if !self.vault_dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.vault_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let is_vault = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext == Self::VAULT_EXTENSION)
                .unwrap_or(false);
            if !is_vault {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                if validate_vault_key(stem).is_ok() {
                    keys.push(stem.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
