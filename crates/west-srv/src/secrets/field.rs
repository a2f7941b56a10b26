//! Base64 storage form for sealed blobs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::SecretError;

/// A sealed secret as it appears in the persisted settings record.
///
/// Opaque: the bytes mean nothing without the key that sealed them.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EncryptedField(Vec<u8>);

impl EncryptedField {
    /// Wrap a blob produced by [`super::encrypt`].
    pub fn from_blob(blob: Vec<u8>) -> Self {
        Self(blob)
    }

    /// The raw blob.
    pub fn as_blob(&self) -> &[u8] {
        &self.0
    }

    /// True for a field that was never set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode the base64 storage form.
    pub fn from_base64(encoded: &str) -> Result<Self, SecretError> {
        STANDARD
            .decode(encoded.trim())
            .map(Self)
            .map_err(|e| SecretError::Encoding(e.to_string()))
    }

    /// Encode to the base64 storage form.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

impl std::fmt::Debug for EncryptedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptedField({} bytes)", self.0.len())
    }
}

impl Serialize for EncryptedField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for EncryptedField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_form_is_base64() {
        let field = EncryptedField::from_blob(vec![0xde, 0xad, 0xbe, 0xef]);
        let json = serde_json::to_string(&field).unwrap();
        assert_eq!(json, "\"3q2+7w==\"");
        assert_eq!(serde_json::from_str::<EncryptedField>(&json).unwrap(), field);
    }

    #[test]
    fn test_bad_base64_rejected() {
        assert!(serde_json::from_str::<EncryptedField>("\"not base64!\"").is_err());
    }

    #[test]
    fn test_debug_hides_contents() {
        let field = EncryptedField::from_blob(vec![1, 2, 3]);
        assert_eq!(format!("{field:?}"), "EncryptedField(3 bytes)");
    }
}
