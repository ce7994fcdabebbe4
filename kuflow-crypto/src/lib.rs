//! Symmetric payload ciphers for KuFlow Temporal workers.
//!
//! Provides the primitive layer of the encrypted payload pipeline:
//!
//! - [`Cipher`]: a stateless, algorithm-tagged authenticated cipher
//! - [`CipherAes256Gcm`]: the default AES-256-GCM implementation
//! - [`CipherChaCha20Poly1305`]: an alternate AEAD behind the same interface
//! - [`EncryptionKey`]: 256-bit key material, zeroized on drop
//!
//! Key lifecycle (fetching, caching, expiry) is owned by the worker crate;
//! ciphers take the raw key on every call.

mod cipher;
mod error;
mod key;

pub use cipher::{
    Cipher, CipherAes256Gcm, CipherAlgorithm, CipherChaCha20Poly1305, NONCE_SIZE, TAG_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{EncryptionKey, KEY_SIZE};
