//! Authenticated symmetric ciphers used to seal worker payloads.
//!
//! Every cipher frames its output the same way:
//!
//! ```text
//! nonce (12 bytes) || ciphertext || tag (16 bytes)
//! ```
//!
//! A fresh random nonce is drawn from the OS RNG on each call, so sealing the
//! same plaintext twice never produces the same bytes. No associated data is
//! bound into the tag.

use crate::error::{CryptoError, CryptoResult};
use crate::key::KEY_SIZE;
use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;
use chacha20poly1305::aead::{Aead, KeyInit, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Size of nonce in bytes (96 bits for both AES-GCM and ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A stateless, key-parameterized authenticated cipher.
///
/// Implementations own no key material; the caller passes the raw key on
/// every call. [`Cipher::algorithm`] is written to the wire next to the
/// ciphertext, so it must never change for an existing implementation.
pub trait Cipher: Send + Sync + fmt::Debug {
    /// Stable algorithm name used as a wire tag.
    fn algorithm(&self) -> &'static str;

    /// Encrypts `plaintext`, returning `nonce || ciphertext_with_tag`.
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Decrypts bytes produced by [`Cipher::encrypt`].
    ///
    /// Fails with [`CryptoError::Decryption`] when the tag does not verify.
    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// AES-256 in Galois/Counter Mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct CipherAes256Gcm;

impl CipherAes256Gcm {
    pub const ALGORITHM: &'static str = "AES-256-GCM";
}

impl Cipher for CipherAes256Gcm {
    fn algorithm(&self) -> &'static str {
        Self::ALGORITHM
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(check_key(key)?)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        seal(&cipher, plaintext)
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(check_key(key)?)
            .map_err(|e| CryptoError::Decryption(e.to_string()))?;
        open(&cipher, ciphertext)
    }
}

/// ChaCha20-Poly1305, for hosts without AES hardware acceleration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CipherChaCha20Poly1305;

impl CipherChaCha20Poly1305 {
    pub const ALGORITHM: &'static str = "CHACHA20-POLY1305";
}

impl Cipher for CipherChaCha20Poly1305 {
    fn algorithm(&self) -> &'static str {
        Self::ALGORITHM
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(check_key(key)?)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        seal(&cipher, plaintext)
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(check_key(key)?)
            .map_err(|e| CryptoError::Decryption(e.to_string()))?;
        open(&cipher, ciphertext)
    }
}

/// The algorithms a worker can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    #[default]
    #[serde(rename = "AES-256-GCM")]
    Aes256Gcm,
    #[serde(rename = "CHACHA20-POLY1305")]
    ChaCha20Poly1305,
}

impl CipherAlgorithm {
    /// Returns the wire tag for this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            CipherAlgorithm::Aes256Gcm => CipherAes256Gcm::ALGORITHM,
            CipherAlgorithm::ChaCha20Poly1305 => CipherChaCha20Poly1305::ALGORITHM,
        }
    }

    /// Parses a wire tag. Matching is exact.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            CipherAes256Gcm::ALGORITHM => Some(CipherAlgorithm::Aes256Gcm),
            CipherChaCha20Poly1305::ALGORITHM => Some(CipherAlgorithm::ChaCha20Poly1305),
            _ => None,
        }
    }

    /// Instantiates the cipher for this algorithm.
    pub fn cipher(&self) -> Arc<dyn Cipher> {
        match self {
            CipherAlgorithm::Aes256Gcm => Arc::new(CipherAes256Gcm),
            CipherAlgorithm::ChaCha20Poly1305 => Arc::new(CipherChaCha20Poly1305),
        }
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn check_key(key: &[u8]) -> CryptoResult<&[u8]> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        });
    }
    Ok(key)
}

fn seal<A: Aead>(cipher: &A, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(Nonce::<A>::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

fn open<A: Aead>(cipher: &A, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption("data too short".to_string()));
    }

    let (nonce, sealed) = ciphertext.split_at(NONCE_SIZE);
    cipher.decrypt(Nonce::<A>::from_slice(nonce), sealed).map_err(|_| {
        CryptoError::Decryption("decryption failed (wrong key or tampered data)".to_string())
    })
}
