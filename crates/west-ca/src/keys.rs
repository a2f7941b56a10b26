//! Key material for CAs (Ed25519) and mesh hosts (X25519).
//!
//! Both are stored as raw 32-byte secrets inside PEM blocks. The CA key
//! signs certificates; the host key is only ever used by the mesh transport
//! for its handshakes, so this crate never does anything with it beyond
//! generating and encoding it.

use ed25519_dalek::{Signer, SigningKey};
use ring::rand::{SecureRandom, SystemRandom};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::CaError;

/// PEM label for CA signing keys.
pub const CA_KEY_LABEL: &str = "WEST ED25519 PRIVATE KEY";

/// PEM label for host private keys.
pub const HOST_KEY_LABEL: &str = "WEST X25519 PRIVATE KEY";

/// PEM label for host public keys.
pub const HOST_PUBLIC_KEY_LABEL: &str = "WEST X25519 PUBLIC KEY";

/// Ed25519 signing key held by a certificate authority.
pub struct CaSigningKey {
    inner: SigningKey,
}

impl CaSigningKey {
    /// Generate a fresh signing key from the system RNG.
    pub fn generate() -> Result<Self, CaError> {
        let seed = random_seed()?;
        Ok(Self {
            inner: SigningKey::from_bytes(&seed),
        })
    }

    /// Parse a key previously written by [`CaSigningKey::to_pem`].
    ///
    /// Accepts either the 32-byte seed or the 64-byte seed+public layout.
    pub fn from_pem(input: &[u8]) -> Result<Self, CaError> {
        let contents = decode_pem(input, CA_KEY_LABEL)?;
        let seed: [u8; 32] = match contents.len() {
            32 | 64 => contents[..32]
                .try_into()
                .map_err(|_| CaError::Key("invalid ed25519 seed".into()))?,
            n => return Err(CaError::Key(format!("invalid ed25519 key length {n}"))),
        };
        Ok(Self {
            inner: SigningKey::from_bytes(&seed),
        })
    }

    /// Encode the seed as PEM.
    pub fn to_pem(&self) -> Zeroizing<String> {
        let seed = Zeroizing::new(self.inner.to_bytes().to_vec());
        Zeroizing::new(pem::encode(&pem::Pem::new(CA_KEY_LABEL, seed.to_vec())))
    }

    /// Raw Ed25519 public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.inner.verifying_key().to_bytes()
    }

    pub(crate) fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.inner.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for CaSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaSigningKey")
            .field("public_key", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}

/// X25519 keypair for a mesh host.
pub struct HostKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl HostKeyPair {
    /// Generate a fresh keypair from the system RNG.
    pub fn generate() -> Result<Self, CaError> {
        let secret = StaticSecret::from(random_seed()?);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    /// Parse a private key written by [`HostKeyPair::private_key_pem`].
    pub fn from_pem(input: &[u8]) -> Result<Self, CaError> {
        let contents = decode_pem(input, HOST_KEY_LABEL)?;
        let bytes: [u8; 32] = contents
            .as_slice()
            .try_into()
            .map_err(|_| CaError::Key(format!("invalid x25519 key length {}", contents.len())))?;
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    /// Raw X25519 public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Private key as PEM.
    pub fn private_key_pem(&self) -> Zeroizing<String> {
        let raw = Zeroizing::new(self.secret.to_bytes().to_vec());
        Zeroizing::new(pem::encode(&pem::Pem::new(HOST_KEY_LABEL, raw.to_vec())))
    }

    /// Public key as PEM.
    pub fn public_key_pem(&self) -> String {
        pem::encode(&pem::Pem::new(
            HOST_PUBLIC_KEY_LABEL,
            self.public.to_bytes().to_vec(),
        ))
    }
}

fn random_seed() -> Result<[u8; 32], CaError> {
    let mut seed = [0u8; 32];
    SystemRandom::new()
        .fill(&mut seed)
        .map_err(|_| CaError::Key("system rng unavailable".into()))?;
    Ok(seed)
}

pub(crate) fn decode_pem(input: &[u8], label: &str) -> Result<Zeroizing<Vec<u8>>, CaError> {
    let block = pem::parse(input).map_err(|e| CaError::Encoding(format!("invalid pem: {e}")))?;
    if block.tag() != label {
        return Err(CaError::Encoding(format!(
            "expected pem block `{label}`, found `{}`",
            block.tag()
        )));
    }
    Ok(Zeroizing::new(block.into_contents()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ca_key_pem_roundtrip() {
        let key = CaSigningKey::generate().unwrap();
        let pem = key.to_pem();
        assert!(pem.contains(CA_KEY_LABEL));

        let parsed = CaSigningKey::from_pem(pem.as_bytes()).unwrap();
        assert_eq!(parsed.public_key(), key.public_key());
    }

    #[test]
    fn test_host_key_pem_roundtrip() {
        let pair = HostKeyPair::generate().unwrap();
        let parsed = HostKeyPair::from_pem(pair.private_key_pem().as_bytes()).unwrap();
        assert_eq!(parsed.public_key(), pair.public_key());
    }

    #[test]
    fn test_wrong_label_rejected() {
        let pair = HostKeyPair::generate().unwrap();
        let err = CaSigningKey::from_pem(pair.private_key_pem().as_bytes()).unwrap_err();
        assert!(matches!(err, CaError::Encoding(_)));
    }

    #[test]
    fn test_generated_keys_differ() {
        let a = HostKeyPair::generate().unwrap();
        let b = HostKeyPair::generate().unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }
}
