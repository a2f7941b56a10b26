//! ACME account record as persisted in sealed form.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// A registered ACME account.
///
/// `credentials` holds the account private key, so the whole record is
/// sealed before it is persisted.
#[derive(Clone, Serialize, Deserialize)]
pub struct AcmeAccount {
    /// Contact email used at registration.
    pub email: String,
    /// Account URL returned by the directory.
    pub registration: String,
    /// Directory the account belongs to.
    pub directory: String,
    /// Serialized `instant_acme::AccountCredentials`.
    pub credentials: Zeroizing<String>,
}

impl AcmeAccount {
    /// JSON form for sealing.
    pub fn to_json(&self) -> Result<Zeroizing<String>, serde_json::Error> {
        serde_json::to_string(self).map(Zeroizing::new)
    }

    /// Parse the JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Debug for AcmeAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcmeAccount")
            .field("email", &self.email)
            .field("registration", &self.registration)
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_and_debug() {
        let account = AcmeAccount {
            email: "ops@example.com".into(),
            registration: "https://acme.test/acct/1".into(),
            directory: "https://acme.test/directory".into(),
            credentials: Zeroizing::new(r#"{"key_pkcs8":"secret"}"#.into()),
        };

        let parsed = AcmeAccount::from_json(&account.to_json().unwrap()).unwrap();
        assert_eq!(parsed.registration, account.registration);
        assert_eq!(*parsed.credentials, *account.credentials);

        let debug = format!("{account:?}");
        assert!(debug.contains("ops@example.com"));
        assert!(!debug.contains("secret"));
    }
}
