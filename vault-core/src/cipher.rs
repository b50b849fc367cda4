use argon2::{Algorithm, Argon2, Params, Version};
use blake3::Hasher as Blake3;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::errors::{WalletError, WalletResult};
use crate::manager::Vault;
use crate::session::SessionSecret;

const ENVELOPE_MAGIC: &[u8; 8] = b"KEYVAULT";
const ENVELOPE_VERSION: u16 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

// Upper bounds accepted from a stored blob, so a damaged header cannot
// request an unbounded KDF run.
const MAX_M_COST_KIB: u32 = 1024 * 1024;
const MAX_T_COST: u32 = 64;
const MAX_P_COST: u32 = 16;

/// Argon2id cost settings used when sealing new blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfProfile {
    pub m_cost_kib: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfProfile {
    fn default() -> Self {
        Self {
            m_cost_kib: 64 * 1024, // 64 MiB
            t_cost: 3,
            p_cost: 1,
        }
    }
}

impl KdfProfile {
    /// Minimal Argon2 cost. Only meant for tests and throwaway vaults.
    pub fn light() -> Self {
        Self {
            m_cost_kib: 8,
            t_cost: 1,
            p_cost: 1,
        }
    }

    pub fn validate(&self) -> WalletResult<()> {
        if self.m_cost_kib > MAX_M_COST_KIB || self.t_cost > MAX_T_COST || self.p_cost > MAX_P_COST
        {
            return Err(WalletError::ValidationError(format!(
                "KDF profile exceeds limits (m_cost_kib <= {}, t_cost <= {}, p_cost <= {})",
                MAX_M_COST_KIB, MAX_T_COST, MAX_P_COST
            )));
        }
        self.argon2_params()
            .map(|_| ())
            .map_err(|e| WalletError::ValidationError(format!("Invalid Argon2 params: {e}")))
    }

    fn argon2_params(&self) -> Result<Params, argon2::Error> {
        Params::new(self.m_cost_kib, self.t_cost, self.p_cost, Some(KEY_LEN))
    }
}

/// One serialized, encrypted vault. Opaque to everything but [`CipherEnvelope`].
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedBlob(Vec<u8>);

impl EncryptedBlob {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptedBlob({} bytes)", self.0.len())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EnvelopeFile {
    magic: [u8; 8],
    version: u16,
    kdf: KdfParameters,
    nonce: [u8; NONCE_LEN],
    checksum: [u8; 32],
    ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KdfParameters {
    m_cost_kib: u32,
    t_cost: u32,
    p_cost: u32,
    salt: [u8; SALT_LEN],
}

impl KdfParameters {
    fn profile(&self) -> KdfProfile {
        KdfProfile {
            m_cost_kib: self.m_cost_kib,
            t_cost: self.t_cost,
            p_cost: self.p_cost,
        }
    }
}

/// Seals vaults with Argon2id + AES-256-GCM under the session secret.
#[derive(Debug, Clone, Default)]
pub struct CipherEnvelope {
    profile: KdfProfile,
}

impl CipherEnvelope {
    pub fn new(profile: KdfProfile) -> WalletResult<Self> {
        profile.validate()?;
        Ok(Self { profile })
    }

    pub fn profile(&self) -> KdfProfile {
        self.profile
    }

    pub fn encrypt(&self, vault: &Vault, secret: &SessionSecret) -> WalletResult<EncryptedBlob> {
        let mut rng = OsRng;
        let mut salt = [0u8; SALT_LEN];
        rng.try_fill_bytes(&mut salt)
            .map_err(|e| WalletError::CryptoError(format!("Failed to generate salt: {e}")))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.try_fill_bytes(&mut nonce_bytes)
            .map_err(|e| WalletError::CryptoError(format!("Failed to generate nonce: {e}")))?;

        let kdf = KdfParameters {
            m_cost_kib: self.profile.m_cost_kib,
            t_cost: self.profile.t_cost,
            p_cost: self.profile.p_cost,
            salt,
        };

        let key = derive_key(secret, &kdf)?;
        let mut buffer = Zeroizing::new(serde_json::to_vec(vault)?);
        let checksum = blake3_checksum(&buffer);
        encrypt_aes_gcm(&key, Nonce::assume_unique_for_key(nonce_bytes), &mut buffer)?;

        let envelope = EnvelopeFile {
            magic: *ENVELOPE_MAGIC,
            version: ENVELOPE_VERSION,
            kdf,
            nonce: nonce_bytes,
            checksum,
            ciphertext: buffer.to_vec(),
        };

        Ok(EncryptedBlob(serde_json::to_vec(&envelope)?))
    }

    /// Every failure is reported as [`WalletError::AuthenticationFailure`].
    pub fn decrypt(&self, blob: &EncryptedBlob, secret: &SessionSecret) -> WalletResult<Vault> {
        open_envelope(blob, secret).map_err(|_| {
            log::warn!("Vault blob could not be opened with the current session");
            WalletError::AuthenticationFailure
        })
    }
}

fn open_envelope(blob: &EncryptedBlob, secret: &SessionSecret) -> WalletResult<Vault> {
    let envelope: EnvelopeFile = serde_json::from_slice(blob.as_bytes())?;

    if &envelope.magic != ENVELOPE_MAGIC {
        return Err(WalletError::ValidationError(
            "Invalid envelope magic marker".to_string(),
        ));
    }
    if envelope.version != ENVELOPE_VERSION {
        return Err(WalletError::ValidationError(format!(
            "Unsupported envelope version: {}",
            envelope.version
        )));
    }
    envelope.kdf.profile().validate()?;

    let key = derive_key(secret, &envelope.kdf)?;
    let plaintext = decrypt_aes_gcm(
        &key,
        Nonce::assume_unique_for_key(envelope.nonce),
        &envelope.ciphertext,
    )?;

    if blake3_checksum(&plaintext) != envelope.checksum {
        return Err(WalletError::ValidationError(
            "Vault integrity verification failed".to_string(),
        ));
    }

    Ok(serde_json::from_slice(&plaintext)?)
}

fn derive_key(
    secret: &SessionSecret,
    params: &KdfParameters,
) -> WalletResult<Zeroizing<[u8; KEY_LEN]>> {
    let argon_params = params
        .profile()
        .argon2_params()
        .map_err(|e| WalletError::CryptoError(format!("Invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(secret.as_bytes(), &params.salt, key.as_mut())
        .map_err(|e| WalletError::CryptoError(format!("KDF failed: {e}")))?;
    Ok(key)
}

fn encrypt_aes_gcm(
    key: &Zeroizing<[u8; KEY_LEN]>,
    nonce: Nonce,
    buffer: &mut Zeroizing<Vec<u8>>,
) -> WalletResult<()> {
    let unbound_key = UnboundKey::new(&aead::AES_256_GCM, key.as_ref())
        .map_err(|e| WalletError::CryptoError(format!("Invalid encryption key: {e}")))?;
    let key = LessSafeKey::new(unbound_key);

    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut **buffer)
        .map_err(|_| WalletError::CryptoError("Encryption failure".to_string()))
}

fn decrypt_aes_gcm(
    key: &Zeroizing<[u8; KEY_LEN]>,
    nonce: Nonce,
    ciphertext: &[u8],
) -> WalletResult<Zeroizing<Vec<u8>>> {
    let unbound_key = UnboundKey::new(&aead::AES_256_GCM, key.as_ref())
        .map_err(|e| WalletError::CryptoError(format!("Invalid encryption key: {e}")))?;
    let key = LessSafeKey::new(unbound_key);

    if ciphertext.len() < aead::AES_256_GCM.tag_len() {
        return Err(WalletError::CryptoError(
            "Ciphertext shorter than authentication tag".to_string(),
        ));
    }

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| WalletError::CryptoError("Decryption failure".to_string()))?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

fn blake3_checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake3::new();
    hasher.update(data);
    *hasher.finalize().as_bytes()
}
