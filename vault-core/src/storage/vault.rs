use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;

use parking_lot::RwLock;

use super::WalletPaths;
use crate::cipher::EncryptedBlob;
use crate::errors::{WalletError, WalletResult};

/// Slot used by the wallet manager for its single vault.
pub const DEFAULT_VAULT_KEY: &str = "wallet";

const MAX_KEY_LEN: usize = 64;

/// Keys are `[A-Za-z0-9_-]{1,64}`.
pub fn validate_vault_key(key: &str) -> WalletResult<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(WalletError::ValidationError(format!(
            "Vault key must be 1 to {} characters",
            MAX_KEY_LEN
        )));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(WalletError::ValidationError(
            "Vault key may only contain letters, digits, '_' and '-'".to_string(),
        ));
    }
    Ok(())
}

/// Keyed persistence for encrypted vault blobs.
///
/// Stores never see a session secret; they move opaque bytes only.
pub trait VaultStore: Send + Sync {
    /// Replace whatever is stored under `key`. A reader sees the old or the new
    /// blob, never a partial one.
    fn save(&self, key: &str, blob: &EncryptedBlob) -> WalletResult<()>;

    /// `Ok(None)` when nothing was ever saved under `key`.
    fn load(&self, key: &str) -> WalletResult<Option<EncryptedBlob>>;

    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> WalletResult<()>;
}

/// One file per key under [`WalletPaths::vault_dir`].
#[derive(Debug, Clone)]
pub struct FileVaultStore {
    paths: WalletPaths,
}

impl FileVaultStore {
    pub fn new(paths: WalletPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &WalletPaths {
        &self.paths
    }

    pub fn keys(&self) -> WalletResult<Vec<String>> {
        self.paths.list_vault_keys()
    }
}

impl VaultStore for FileVaultStore {
    fn save(&self, key: &str, blob: &EncryptedBlob) -> WalletResult<()> {
        let path = self.paths.vault_file(key)?;
        let mut file = create_atomic_file(&path)?;
        file.write_all(blob.as_bytes())?;
        file.sync_all()?;
        finalize_atomic_file(file, &path)?;
        log::debug!("Saved vault blob '{}' ({} bytes)", key, blob.len());
        Ok(())
    }

    fn load(&self, key: &str) -> WalletResult<Option<EncryptedBlob>> {
        let path = self.paths.vault_file(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(EncryptedBlob::from_bytes(bytes))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn remove(&self, key: &str) -> WalletResult<()> {
        let path = self.paths.vault_file(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!("Removed vault blob '{}'", key);
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Volatile store for tests and hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryVaultStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryVaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl VaultStore for MemoryVaultStore {
    fn save(&self, key: &str, blob: &EncryptedBlob) -> WalletResult<()> {
        validate_vault_key(key)?;
        self.blobs
            .write()
            .insert(key.to_string(), blob.as_bytes().to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> WalletResult<Option<EncryptedBlob>> {
        validate_vault_key(key)?;
        Ok(self
            .blobs
            .read()
            .get(key)
            .map(|bytes| EncryptedBlob::from_bytes(bytes.clone())))
    }

    fn remove(&self, key: &str) -> WalletResult<()> {
        validate_vault_key(key)?;
        self.blobs.write().remove(key);
        Ok(())
    }
}

fn create_atomic_file(path: &Path) -> WalletResult<File> {
    let dir = path
        .parent()
        .ok_or_else(|| WalletError::StorageError("Invalid vault path".to_string()))?;
    fs::create_dir_all(dir)?;
    let tmp_path = path.with_extension(WalletPaths::PENDING_EXTENSION);
    Ok(File::create(&tmp_path)?)
}

fn finalize_atomic_file(mut file: File, final_path: &Path) -> WalletResult<()> {
    file.flush()?;
    drop(file);
    let tmp_path = final_path.with_extension(WalletPaths::PENDING_EXTENSION);
    fs::rename(tmp_path, final_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn blob(bytes: &[u8]) -> EncryptedBlob {
        EncryptedBlob::from_bytes(bytes.to_vec())
    }

    fn file_store(dir: &TempDir) -> FileVaultStore {
        FileVaultStore::new(WalletPaths::new(dir.path()).unwrap())
    }

    fn exercise_store(store: &dyn VaultStore) {
        assert_eq!(store.load(DEFAULT_VAULT_KEY).unwrap(), None);

        store.save(DEFAULT_VAULT_KEY, &blob(b"first")).unwrap();
        assert_eq!(store.load(DEFAULT_VAULT_KEY).unwrap(), Some(blob(b"first")));

        store.save(DEFAULT_VAULT_KEY, &blob(b"second")).unwrap();
        assert_eq!(store.load(DEFAULT_VAULT_KEY).unwrap(), Some(blob(b"second")));

        store.remove(DEFAULT_VAULT_KEY).unwrap();
        assert_eq!(store.load(DEFAULT_VAULT_KEY).unwrap(), None);
        store.remove(DEFAULT_VAULT_KEY).unwrap();
    }

    #[test]
    fn file_store_save_load_remove() {
        let dir = TempDir::new().unwrap();
        exercise_store(&file_store(&dir));
    }

    #[test]
    fn memory_store_save_load_remove() {
        let store = MemoryVaultStore::new();
        exercise_store(&store);
        assert!(store.is_empty());
    }

    #[test]
    fn file_store_leaves_no_pending_file() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir);
        store.save("wallet", &blob(b"payload")).unwrap();

        let path = store.paths().vault_file("wallet").unwrap();
        assert!(path.exists());
        assert!(!path.with_extension(WalletPaths::PENDING_EXTENSION).exists());
        assert_eq!(store.keys().unwrap(), vec!["wallet".to_string()]);
    }

    #[test]
    fn keys_are_isolated() {
        let store = MemoryVaultStore::new();
        store.save("alpha", &blob(b"a")).unwrap();
        store.save("beta", &blob(b"b")).unwrap();
        store.remove("alpha").unwrap();
        assert_eq!(store.load("beta").unwrap(), Some(blob(b"b")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn invalid_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir);
        let too_long = "k".repeat(MAX_KEY_LEN + 1);
        for key in ["", "../escape", "with space", too_long.as_str()] {
            assert!(matches!(
                store.save(key, &blob(b"x")),
                Err(WalletError::ValidationError(_))
            ));
            assert!(matches!(
                MemoryVaultStore::new().load(key),
                Err(WalletError::ValidationError(_))
            ));
        }
        assert!(validate_vault_key(&"k".repeat(MAX_KEY_LEN)).is_ok());
        assert!(validate_vault_key("backup_2024-01").is_ok());
    }
}
