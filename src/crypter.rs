//! Key crypter: Argon2id password stretching and AES-256-GCM key wrapping
//!
//! A [`KeyCrypter`] is the encryption provider a key chain is encrypted
//! under. It owns the KDF salt and parameters, so two crypters compare equal
//! only when they would derive the same [`AesKey`] from the same password.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::KeyCrypterError;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// Argon2 salt length in bytes
const SALT_LEN: usize = 16;

/// Argon2id parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kb: u32,
    /// Time cost (iterations)
    pub iterations: u32,
    /// Parallelism
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kb: 65536, // 64 MiB
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// 256-bit symmetric key, zeroized on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AesKey([u8; 32]);

impl AesKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(<redacted>)")
    }
}

/// Ciphertext plus the nonce it was sealed with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    #[serde(with = "hex::serde")]
    pub nonce: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCrypter {
    #[serde(with = "hex::serde")]
    salt: Vec<u8>,
    params: KdfParams,
}

impl KeyCrypter {
    /// Create a crypter with a fresh random salt
    pub fn new(params: KdfParams) -> Self {
        use bitcoin::key::rand;

        let salt = rand::random::<[u8; SALT_LEN]>().to_vec();
        Self { salt, params }
    }

    pub fn with_salt(salt: Vec<u8>, params: KdfParams) -> Self {
        Self { salt, params }
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Stretch a password into an AES key
    pub fn derive_key(&self, password: &str) -> Result<AesKey, KeyCrypterError> {
        let params = Params::new(
            self.params.memory_kb,
            self.params.iterations,
            self.params.parallelism,
            Some(32),
        )
        .map_err(|e| KeyCrypterError::Kdf(e.to_string()))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; 32];
        argon2
            .hash_password_into(password.as_bytes(), &self.salt, &mut key)
            .map_err(|e| KeyCrypterError::Kdf(e.to_string()))?;

        let aes_key = AesKey(key);
        key.zeroize();
        Ok(aes_key)
    }

    pub fn encrypt(&self, plaintext: &[u8], key: &AesKey) -> Result<EncryptedData, KeyCrypterError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| KeyCrypterError::Cipher(e.to_string()))?;

        Ok(EncryptedData {
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    /// Fails with [`KeyCrypterError::InvalidKey`] when `key` did not seal `data`
    pub fn decrypt(
        &self,
        data: &EncryptedData,
        key: &AesKey,
    ) -> Result<Zeroizing<Vec<u8>>, KeyCrypterError> {
        if data.nonce.len() != NONCE_LEN {
            return Err(KeyCrypterError::Cipher(format!(
                "invalid nonce length {}",
                data.nonce.len()
            )));
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&data.nonce), data.ciphertext.as_ref())
            .map_err(|_| KeyCrypterError::InvalidKey)?;

        Ok(Zeroizing::new(plaintext))
    }
}
