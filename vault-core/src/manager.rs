use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::cipher::CipherEnvelope;
use crate::derivation::{
    derive_account, generate_mnemonic, restore_from_private_key, Account, AccountSummary,
    Mnemonic, MnemonicStrength,
};
use crate::errors::{WalletError, WalletResult};
use crate::session::PasswordSession;
use crate::signer::AccountSigner;
use crate::storage::{validate_vault_key, VaultStore, DEFAULT_VAULT_KEY};

/// Highest index usable as a non-hardened BIP-32 child, plus one.
const INDEX_LIMIT: u32 = 1 << 31;

/// Plaintext vault contents. Only ever persisted through the cipher envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Vault {
    /// `accounts[i].index == i`; new accounts append at `accounts.len()`.
    MnemonicBacked {
        mnemonic: Mnemonic,
        accounts: Vec<Account>,
    },
    KeyOnly { account: Account },
}

impl Vault {
    pub fn accounts(&self) -> &[Account] {
        match self {
            Vault::MnemonicBacked { accounts, .. } => accounts,
            Vault::KeyOnly { account } => std::slice::from_ref(account),
        }
    }

    pub fn account(&self, index: u32) -> Option<&Account> {
        self.accounts().iter().find(|account| account.index == index)
    }

    pub fn is_mnemonic_backed(&self) -> bool {
        matches!(self, Vault::MnemonicBacked { .. })
    }

    pub fn summaries(&self) -> Vec<AccountSummary> {
        self.accounts().iter().map(Account::summary).collect()
    }

    /// Structural check run on every decrypted vault.
    fn check_indices(&self) -> bool {
        match self {
            Vault::MnemonicBacked { accounts, .. } => {
                !accounts.is_empty()
                    && accounts
                        .iter()
                        .enumerate()
                        .all(|(position, account)| account.index as usize == position)
            }
            Vault::KeyOnly { account } => account.index == 0,
        }
    }

    fn account_mut(&mut self, index: u32) -> Option<&mut Account> {
        match self {
            Vault::MnemonicBacked { accounts, .. } => {
                accounts.iter_mut().find(|account| account.index == index)
            }
            Vault::KeyOnly { account } => Some(account).filter(|account| account.index == index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletState {
    Uninitialized,
    Loading,
    Ready(Vault),
    Empty,
    Error(WalletError),
}

/// Secret-free view of [`WalletState`] for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WalletStatus {
    Uninitialized,
    Loading,
    Ready {
        mnemonic_backed: bool,
        account_count: usize,
    },
    Empty,
    Error { reason: String },
}

impl From<&WalletState> for WalletStatus {
    fn from(state: &WalletState) -> Self {
        match state {
            WalletState::Uninitialized => WalletStatus::Uninitialized,
            WalletState::Loading => WalletStatus::Loading,
            WalletState::Ready(vault) => WalletStatus::Ready {
                mnemonic_backed: vault.is_mnemonic_backed(),
                account_count: vault.accounts().len(),
            },
            WalletState::Empty => WalletStatus::Empty,
            WalletState::Error(error) => WalletStatus::Error {
                reason: error.to_string(),
            },
        }
    }
}

/// Owns the decrypted vault and serializes every change to it.
///
/// Mutations take the state lock with `try_write` and fail fast with
/// [`WalletError::ConcurrentModification`] instead of queueing. Each mutation
/// runs derive -> encrypt -> save entirely under that lock, and only swaps the
/// in-memory vault once the blob is on disk.
pub struct WalletManager {
    session: PasswordSession,
    cipher: CipherEnvelope,
    store: Arc<dyn VaultStore>,
    vault_key: String,
    chain_id: u64,
    state: RwLock<WalletState>,
}

impl WalletManager {
    pub fn new(
        session: PasswordSession,
        cipher: CipherEnvelope,
        store: Arc<dyn VaultStore>,
        chain_id: u64,
    ) -> Self {
        Self {
            session,
            cipher,
            store,
            vault_key: DEFAULT_VAULT_KEY.to_string(),
            chain_id,
            state: RwLock::new(WalletState::Uninitialized),
        }
    }

    pub fn with_vault_key(mut self, key: impl Into<String>) -> WalletResult<Self> {
        let key = key.into();
        validate_vault_key(&key)?;
        self.vault_key = key;
        Ok(self)
    }

    pub fn session(&self) -> &PasswordSession {
        &self.session
    }

    /// Current state. A session ended elsewhere drops the vault here too.
    pub fn status(&self) -> WalletStatus {
        if !self.session.is_session_active() {
            self.forget_vault();
            return WalletStatus::Uninitialized;
        }
        WalletStatus::from(&*self.state.read())
    }

    /// Load the stored vault with the current session secret.
    pub fn bootstrap(&self) -> WalletResult<WalletStatus> {
        let mut state = self.begin_mutation()?;
        *state = WalletState::Loading;

        match self.load_vault() {
            Ok(None) => {
                log::info!("No stored vault found");
                *state = WalletState::Empty;
            }
            Ok(Some(vault)) => {
                log::info!(
                    "Vault loaded with {} account(s)",
                    vault.accounts().len()
                );
                *state = WalletState::Ready(vault);
            }
            Err(WalletError::NoActiveSession) => {
                *state = WalletState::Uninitialized;
                return Err(WalletError::NoActiveSession);
            }
            Err(error) => {
                log::warn!("Vault bootstrap failed: {}", error);
                *state = WalletState::Error(error.clone());
                return Err(error);
            }
        }

        Ok(WalletStatus::from(&*state))
    }

    /// Create a mnemonic-backed wallet, generating 12 words when none is given.
    ///
    /// Replaces a loaded vault. A stored vault that was never unlocked is left
    /// alone; it has to be unlocked or deleted first.
    pub fn create_wallet(&self, mnemonic: Option<Mnemonic>) -> WalletResult<Vec<AccountSummary>> {
        let mut state = self.begin_mutation()?;
        self.ensure_replaceable(&state)?;

        let mnemonic = match mnemonic {
            Some(mnemonic) => mnemonic,
            None => generate_mnemonic(MnemonicStrength::Bits128)?,
        };
        let first = derive_account(&mnemonic, 0)?;
        let vault = Vault::MnemonicBacked {
            mnemonic,
            accounts: vec![first],
        };

        self.commit(&mut state, vault)?;
        log::info!("Mnemonic wallet created");
        Ok(Self::ready_summaries(&state))
    }

    pub fn import_mnemonic(&self, phrase: &str) -> WalletResult<Vec<AccountSummary>> {
        let mnemonic = Mnemonic::parse(phrase)?;
        self.create_wallet(Some(mnemonic))
    }

    pub fn import_private_key(&self, key_hex: &str) -> WalletResult<Vec<AccountSummary>> {
        let mut state = self.begin_mutation()?;
        self.ensure_replaceable(&state)?;

        let account = restore_from_private_key(key_hex)?;
        self.commit(&mut state, Vault::KeyOnly { account })?;
        log::info!("Private-key wallet imported");
        Ok(Self::ready_summaries(&state))
    }

    /// Derive the next account and persist the grown vault.
    pub fn add_account(&self) -> WalletResult<AccountSummary> {
        let mut state = self.begin_mutation()?;

        let updated = match &*state {
            WalletState::Ready(Vault::MnemonicBacked { mnemonic, accounts }) => {
                let next = u32::try_from(accounts.len())
                    .ok()
                    .filter(|index| *index < INDEX_LIMIT)
                    .ok_or_else(|| {
                        WalletError::ValidationError(
                            "Account index space exhausted".to_string(),
                        )
                    })?;

                let mut accounts = accounts.clone();
                accounts.push(derive_account(mnemonic, next)?);
                Vault::MnemonicBacked {
                    mnemonic: mnemonic.clone(),
                    accounts,
                }
            }
            WalletState::Ready(Vault::KeyOnly { .. }) => {
                return Err(crate::wallet_error!(
                    UnsupportedOperation,
                    "wallet is not mnemonic-backed"
                ));
            }
            _ => return Err(no_wallet_loaded()),
        };

        self.commit(&mut state, updated)?;
        let added = match &*state {
            WalletState::Ready(vault) => vault.accounts().last().map(Account::summary),
            _ => None,
        }
        .ok_or_else(no_wallet_loaded)?;

        log::info!("Account {} added", added.index);
        Ok(added)
    }

    /// Remove the stored vault and forget the decrypted one. Irreversible.
    pub fn delete_wallet(&self) -> WalletResult<()> {
        let mut state = self.begin_mutation()?;
        self.store.remove(&self.vault_key)?;
        *state = WalletState::Empty;
        log::info!("Wallet deleted");
        Ok(())
    }

    /// Record a display balance for an account and persist it.
    pub fn set_cached_balance(&self, index: u32, balance: Option<String>) -> WalletResult<()> {
        let mut state = self.begin_mutation()?;

        let mut updated = match &*state {
            WalletState::Ready(vault) => vault.clone(),
            _ => return Err(no_wallet_loaded()),
        };
        let account = updated
            .account_mut(index)
            .ok_or_else(|| account_not_found(index))?;
        account.cached_balance = balance;

        self.commit(&mut state, updated)?;
        log::debug!("Cached balance updated for account {}", index);
        Ok(())
    }

    /// Public account data in index order.
    pub fn accounts(&self) -> WalletResult<Vec<AccountSummary>> {
        self.read_ready(|state| match state {
            WalletState::Ready(vault) => Ok(vault.summaries()),
            WalletState::Error(error) => Err(error.clone()),
            _ => Ok(Vec::new()),
        })
    }

    /// Signer for one account, with its key re-derived for this call.
    pub fn get_signer(&self, account_index: u32) -> WalletResult<AccountSigner> {
        self.read_ready(|state| {
            let vault = ready_vault(state)?;
            let account = match vault {
                Vault::MnemonicBacked { mnemonic, accounts } => {
                    if account_index as usize >= accounts.len() {
                        return Err(account_not_found(account_index));
                    }
                    derive_account(mnemonic, account_index)?
                }
                Vault::KeyOnly { account } => {
                    if account.index != account_index {
                        return Err(account_not_found(account_index));
                    }
                    account.clone()
                }
            };
            AccountSigner::new(&account, self.chain_id)
        })
    }

    /// Explicit export of one account's private key as `0x` hex.
    pub fn reveal_private_key(&self, account_index: u32) -> WalletResult<Zeroizing<String>> {
        self.read_ready(|state| {
            let account = ready_vault(state)?
                .account(account_index)
                .ok_or_else(|| account_not_found(account_index))?;
            log::info!("Private key revealed for account {}", account_index);
            Ok(account.private_key_hex())
        })
    }

    /// End the session and drop the decrypted vault.
    pub fn lock(&self) {
        self.session.clear_session();
        *self.state.write() = WalletState::Uninitialized;
        log::info!("Wallet locked");
    }

    fn begin_mutation(&self) -> WalletResult<RwLockWriteGuard<'_, WalletState>> {
        let mut state = self
            .state
            .try_write()
            .ok_or(WalletError::ConcurrentModification)?;

        if !self.session.is_session_active() {
            *state = WalletState::Uninitialized;
            return Err(WalletError::NoActiveSession);
        }
        Ok(state)
    }

    /// Overwriting is allowed only when the current blob is known: nothing
    /// stored, or the vault is loaded.
    fn ensure_replaceable(&self, state: &WalletState) -> WalletResult<()> {
        match state {
            WalletState::Ready(_) | WalletState::Empty => Ok(()),
            WalletState::Error(error) => Err(error.clone()),
            WalletState::Uninitialized | WalletState::Loading => {
                if self.store.load(&self.vault_key)?.is_some() {
                    return Err(crate::wallet_error!(
                        UnsupportedOperation,
                        "a stored wallet must be unlocked or deleted before it is replaced"
                    ));
                }
                Ok(())
            }
        }
    }

    fn read_ready<F, T>(&self, operation: F) -> WalletResult<T>
    where
        F: FnOnce(&WalletState) -> WalletResult<T>,
    {
        if !self.session.is_session_active() {
            self.forget_vault();
            return Err(WalletError::NoActiveSession);
        }
        let state = self.state.read();
        operation(&state)
    }

    fn forget_vault(&self) {
        // A writer in flight will hit the same missing session itself.
        if let Some(mut state) = self.state.try_write() {
            if !matches!(*state, WalletState::Uninitialized) {
                log::info!("Session gone; dropping decrypted vault");
            }
            *state = WalletState::Uninitialized;
        }
    }

    fn load_vault(&self) -> WalletResult<Option<Vault>> {
        let blob = match self.store.load(&self.vault_key)? {
            Some(blob) => blob,
            None => return Ok(None),
        };
        let vault = self
            .session
            .with_secret(|secret| self.cipher.decrypt(&blob, secret))?;

        if !vault.check_indices() {
            log::warn!("Decrypted vault has inconsistent account indices");
            return Err(WalletError::AuthenticationFailure);
        }
        Ok(Some(vault))
    }

    /// Persist `vault`, then make it the in-memory vault. On failure the
    /// previous state is kept, unless the session vanished meanwhile.
    fn commit(&self, state: &mut WalletState, vault: Vault) -> WalletResult<()> {
        let persisted = self
            .session
            .with_secret(|secret| self.cipher.encrypt(&vault, secret))
            .and_then(|blob| self.store.save(&self.vault_key, &blob));

        match persisted {
            Ok(()) => {
                *state = WalletState::Ready(vault);
                Ok(())
            }
            Err(WalletError::NoActiveSession) => {
                *state = WalletState::Uninitialized;
                Err(WalletError::NoActiveSession)
            }
            Err(error) => {
                log::warn!("Vault was not persisted: {}", error);
                Err(error)
            }
        }
    }

    fn ready_summaries(state: &WalletState) -> Vec<AccountSummary> {
        match state {
            WalletState::Ready(vault) => vault.summaries(),
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletManager")
            .field("vault_key", &self.vault_key)
            .field("chain_id", &self.chain_id)
            .field("status", &self.status())
            .finish()
    }
}

fn ready_vault(state: &WalletState) -> WalletResult<&Vault> {
    match state {
        WalletState::Ready(vault) => Ok(vault),
        WalletState::Error(error) => Err(error.clone()),
        _ => Err(no_wallet_loaded()),
    }
}

fn no_wallet_loaded() -> WalletError {
    WalletError::NotFound("no wallet loaded".to_string())
}

fn account_not_found(index: u32) -> WalletError {
    WalletError::NotFound(format!("account {}", index))
}
