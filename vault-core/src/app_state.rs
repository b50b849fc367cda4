use std::path::PathBuf;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::cipher::CipherEnvelope;
use crate::config_store::{ConfigStore, NetworkConfig, WalletConfig};
use crate::errors::WalletResult;
use crate::manager::{WalletManager, WalletStatus};
use crate::session::PasswordSession;
use crate::storage::{FileVaultStore, WalletPaths};
use crate::validation::InputValidator;

pub const ENVIRONMENT_VAR: &str = "KEYVAULT_ENV";

/// Everything a host needs, wired from one data directory.
#[derive(Debug)]
pub struct WalletContext {
    paths: WalletPaths,
    config_store: ConfigStore,
    network: NetworkConfig,
    manager: WalletManager,
    environment: String,
}

impl WalletContext {
    pub fn initialize(root_dir: PathBuf) -> WalletResult<Self> {
        let environment =
            std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "development".to_string());
        let paths = WalletPaths::new(&root_dir)?;
        paths.ensure_directories()?;

        let config_store = ConfigStore::from_paths(&paths);
        let config = config_store.load_or_default(environment.clone())?;

        let session = PasswordSession::new(config.session.timeout());
        let cipher = CipherEnvelope::new(config.kdf)?;
        let store = Arc::new(FileVaultStore::new(paths.clone()));
        let manager = WalletManager::new(session, cipher, store, config.network.chain_id);

        log::info!(
            "Wallet context initialized ({} environment, {} network)",
            environment,
            config.network.name
        );

        Ok(Self {
            paths,
            config_store,
            network: config.network,
            manager,
            environment,
        })
    }

    pub fn manager(&self) -> &WalletManager {
        &self.manager
    }

    pub fn session(&self) -> &PasswordSession {
        self.manager.session()
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn paths(&self) -> &WalletPaths {
        &self.paths
    }

    /// Network the manager's signers were built for.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn transaction_url(&self, tx_hash: &str) -> String {
        self.network.transaction_url(tx_hash)
    }

    pub fn load_config(&self) -> WalletResult<WalletConfig> {
        self.config_store.load_or_default(self.environment.clone())
    }

    /// Persist a config change. Session, KDF and network settings are read
    /// once, so they apply from the next `initialize`.
    pub fn update_config<F>(&self, updater: F) -> WalletResult<WalletConfig>
    where
        F: FnOnce(&mut WalletConfig) -> WalletResult<()>,
    {
        self.config_store.update(self.environment.clone(), updater)
    }

    pub fn save_explorer_api_key(&self, api_key: &str) -> WalletResult<()> {
        self.config_store
            .save_explorer_api_key(self.environment.clone(), api_key)
            .map(|_| ())
    }

    pub fn explorer_api_key(&self) -> WalletResult<Option<String>> {
        self.config_store.explorer_api_key(self.environment.clone())
    }

    /// Start a session with `password` and load whatever vault is stored.
    pub fn unlock(&self, password: &SecretString) -> WalletResult<WalletStatus> {
        InputValidator::new()?.validate_password(password.expose_secret())?;
        self.manager.session().set_password(password)?;
        self.manager.bootstrap()
    }

    pub fn lock(&self) {
        self.manager.lock();
    }
}
