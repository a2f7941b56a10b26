//! Secret fields at rest.
//!
//! Every secret the coordination node persists (CA key, node certificate,
//! ACME account, issued TLS material) goes through AES-256-GCM under a key
//! derived once from the operator's passphrase. Blobs are laid out as
//! `nonce || ciphertext || tag` with a fresh random 96-bit nonce per call.
//!
//! The key is an explicit [`EncryptionKey`] value created at startup and
//! handed to whoever needs it; nothing here reads ambient global state.

mod field;

pub use field::EncryptedField;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::Argon2;
use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;

/// Shortest blob that can possibly authenticate.
pub const MIN_CIPHERTEXT_LEN: usize = NONCE_LEN + TAG_LEN;

/// Length of the salt stored alongside settings for key derivation.
pub const SALT_LEN: usize = 16;

const KEY_LEN: usize = 32;

/// Errors from the secret store.
#[derive(Error, Debug)]
pub enum SecretError {
    /// Blob is shorter than nonce + tag; authentication was not attempted.
    #[error("ciphertext too short: {len} bytes, need at least {MIN_CIPHERTEXT_LEN}")]
    ShortCiphertext {
        /// Length of the rejected blob.
        len: usize,
    },

    /// Wrong key or tampered blob.
    #[error("ciphertext failed authentication")]
    AuthenticationFailure,

    /// Stored field was not valid base64.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Passphrase could not be turned into a key.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Cipher or RNG failure while sealing.
    #[error("encryption failed")]
    Encryption,
}

/// The process-wide AEAD key.
///
/// Created exactly once at startup and shared read-only afterwards.
pub struct EncryptionKey {
    bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl EncryptionKey {
    /// Derive a key from a passphrase with Argon2id.
    pub fn derive(passphrase: &[u8], salt: &[u8]) -> Result<Self, SecretError> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        Argon2::default()
            .hash_password_into(passphrase, salt, &mut bytes[..])
            .map_err(|e| SecretError::KeyDerivation(e.to_string()))?;
        Ok(Self { bytes })
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    /// Fresh random salt for [`EncryptionKey::derive`].
    pub fn generate_salt() -> Result<[u8; SALT_LEN], SecretError> {
        let mut salt = [0u8; SALT_LEN];
        SystemRandom::new()
            .fill(&mut salt)
            .map_err(|_| SecretError::KeyDerivation("system rng unavailable".into()))?;
        Ok(salt)
    }

    /// Derive an independent subkey for another purpose (HKDF-SHA256).
    pub fn subkey(&self, label: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, SecretError> {
        let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, b"west-srv").extract(&self.bytes[..]);
        let info = [label];
        let okm = prk
            .expand(&info, hkdf::HKDF_SHA256)
            .map_err(|_| SecretError::KeyDerivation("hkdf expand".into()))?;
        let mut out = Zeroizing::new([0u8; KEY_LEN]);
        okm.fill(&mut out[..])
            .map_err(|_| SecretError::KeyDerivation("hkdf fill".into()))?;
        Ok(out)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.bytes[..]))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Seal `plaintext`. Empty input yields an empty blob.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, SecretError> {
    if plaintext.is_empty() {
        return Ok(Vec::new());
    }

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = key
        .cipher()
        .encrypt(&nonce, plaintext)
        .map_err(|_| SecretError::Encryption)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&sealed);
    Ok(blob)
}

/// Open a blob produced by [`encrypt`]. Empty input yields empty output.
///
/// Never returns partial plaintext: either the whole blob authenticates or
/// the call fails.
pub fn decrypt(key: &EncryptionKey, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, SecretError> {
    if blob.is_empty() {
        return Ok(Zeroizing::new(Vec::new()));
    }
    if blob.len() < MIN_CIPHERTEXT_LEN {
        return Err(SecretError::ShortCiphertext { len: blob.len() });
    }

    let (nonce, sealed) = blob.split_at(NONCE_LEN);
    key.cipher()
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map(Zeroizing::new)
        .map_err(|_| SecretError::AuthenticationFailure)
}

/// Shared handle to the process key for sealing and opening persisted fields.
#[derive(Clone, Debug)]
pub struct SecretStore {
    key: Arc<EncryptionKey>,
}

impl SecretStore {
    /// Wrap the process key.
    pub fn new(key: EncryptionKey) -> Self {
        Self { key: Arc::new(key) }
    }

    /// The underlying key.
    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    /// Seal bytes into a storable field.
    pub fn seal(&self, plaintext: &[u8]) -> Result<EncryptedField, SecretError> {
        encrypt(&self.key, plaintext).map(EncryptedField::from_blob)
    }

    /// Open a stored field.
    pub fn open(&self, field: &EncryptedField) -> Result<Zeroizing<Vec<u8>>, SecretError> {
        decrypt(&self.key, field.as_blob())
    }

    /// Open a stored field that must hold UTF-8 (PEM, JSON).
    pub fn open_string(&self, field: &EncryptedField) -> Result<Zeroizing<String>, SecretError> {
        let bytes = self.open(field)?;
        String::from_utf8(bytes.to_vec())
            .map(Zeroizing::new)
            .map_err(|e| SecretError::Encoding(format!("field is not utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> EncryptionKey {
        EncryptionKey::from_bytes([byte; KEY_LEN])
    }

    #[test]
    fn test_roundtrip() {
        let k = key(1);
        for plaintext in [&b"x"[..], b"ca key material", &[0u8; 4096]] {
            let blob = encrypt(&k, plaintext).unwrap();
            assert_eq!(decrypt(&k, &blob).unwrap().as_slice(), plaintext);
        }
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let blob = encrypt(&key(1), b"secret").unwrap();
        assert!(matches!(
            decrypt(&key(2), &blob),
            Err(SecretError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_tampered_blob_fails_closed() {
        let k = key(1);
        let mut blob = encrypt(&k, b"secret").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(matches!(
            decrypt(&k, &blob),
            Err(SecretError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_empty_passthrough() {
        let k = key(1);
        assert!(encrypt(&k, b"").unwrap().is_empty());
        assert!(decrypt(&k, b"").unwrap().is_empty());
    }

    #[test]
    fn test_short_ciphertext() {
        let err = decrypt(&key(1), &[0u8; MIN_CIPHERTEXT_LEN - 1]).unwrap_err();
        assert!(matches!(err, SecretError::ShortCiphertext { len: 27 }));
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let k = key(1);
        let a = encrypt(&k, b"same").unwrap();
        let b = encrypt(&k, b"same").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_passphrase_derivation() {
        let salt = EncryptionKey::generate_salt().unwrap();
        let a = EncryptionKey::derive(b"correct horse", &salt).unwrap();
        let b = EncryptionKey::derive(b"correct horse", &salt).unwrap();
        let c = EncryptionKey::derive(b"battery staple", &salt).unwrap();

        let blob = encrypt(&a, b"payload").unwrap();
        assert_eq!(decrypt(&b, &blob).unwrap().as_slice(), b"payload");
        assert!(decrypt(&c, &blob).is_err());
    }

    #[test]
    fn test_subkeys_are_distinct() {
        let k = key(7);
        let a = k.subkey(b"one").unwrap();
        let b = k.subkey(b"two").unwrap();
        assert_ne!(*a, *b);
        assert_ne!(*a, [7u8; KEY_LEN]);
        assert_eq!(*a, *k.subkey(b"one").unwrap());
    }

    #[test]
    fn test_store_fields() {
        let store = SecretStore::new(key(3));
        let field = store.seal(b"-----BEGIN WEST CERTIFICATE-----").unwrap();
        assert_eq!(
            store.open_string(&field).unwrap().as_str(),
            "-----BEGIN WEST CERTIFICATE-----"
        );
        assert!(store.seal(b"").unwrap().is_empty());
    }

    #[test]
    fn test_debug_redacts_key() {
        assert_eq!(format!("{:?}", key(9)), "EncryptionKey(<redacted>)");
    }
}
