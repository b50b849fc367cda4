use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::errors::{WalletError, WalletResult};

/// Default duration before an idle session forgets its secret.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(15 * 60);

pub const SESSION_SECRET_LEN: usize = 32;

/// Password-derived key material held for the lifetime of a session.
///
/// The bytes never leave the crate; callers only reach them through
/// [`PasswordSession::with_secret`] for the span of one cipher call.
pub struct SessionSecret(Zeroizing<[u8; SESSION_SECRET_LEN]>);

impl SessionSecret {
    /// One-way hash of the raw password. Rejects empty input.
    pub fn derive(password: &SecretString) -> WalletResult<Self> {
        let raw = password.expose_secret();
        if raw.is_empty() {
            return Err(WalletError::ValidationError(
                "Password cannot be empty".to_string(),
            ));
        }

        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = Zeroizing::new([0u8; SESSION_SECRET_LEN]);
        bytes.copy_from_slice(&digest);
        Ok(Self(bytes))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; SESSION_SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(<redacted>)")
    }
}

#[derive(Debug)]
struct ActiveSecret {
    secret: SessionSecret,
    expires_at: Instant,
}

impl ActiveSecret {
    fn touch(&mut self, timeout: Duration) {
        self.expires_at = Instant::now() + timeout;
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Holds at most one session secret, with automatic expiry after inactivity.
///
/// Cloning shares the same slot, so a host can end the session from anywhere
/// and every holder observes it on its next call.
#[derive(Debug, Clone)]
pub struct PasswordSession {
    state: Arc<RwLock<Option<ActiveSecret>>>,
    timeout: Duration,
}

impl PasswordSession {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(None)),
            timeout,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Replace any held secret with one derived from `password`.
    pub fn set_password(&self, password: &SecretString) -> WalletResult<()> {
        let secret = SessionSecret::derive(password)?;
        let mut state = self.state.write();
        let replaced = state.is_some();
        *state = Some(ActiveSecret {
            secret,
            expires_at: Instant::now() + self.timeout,
        });
        drop(state);

        if replaced {
            log::info!("Session password replaced");
        } else {
            log::info!("Session started");
        }
        Ok(())
    }

    pub fn is_session_active(&self) -> bool {
        let state = self.state.read();
        matches!(state.as_ref(), Some(active) if !active.is_expired())
    }

    /// Drop the secret immediately. Its bytes are zeroized on drop.
    pub fn clear_session(&self) {
        let mut state = self.state.write();
        if state.take().is_some() {
            log::info!("Session cleared");
        }
    }

    /// Lend the secret to `operation`, refreshing the idle timeout.
    pub fn with_secret<F, T>(&self, operation: F) -> WalletResult<T>
    where
        F: FnOnce(&SessionSecret) -> WalletResult<T>,
    {
        let mut state = self.state.write();
        let active = state.as_mut().ok_or(WalletError::NoActiveSession)?;

        if active.is_expired() {
            *state = None;
            log::info!("Session expired after inactivity");
            return Err(WalletError::NoActiveSession);
        }

        active.touch(self.timeout);
        operation(&active.secret)
    }
}

impl Default for PasswordSession {
    fn default() -> Self {
        Self::with_defaults()
    }
}
