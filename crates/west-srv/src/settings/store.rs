//! ACME state kept inside the settings record.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Settings, SettingsFile};
use crate::acme::{AcmeAccount, AcmeError, CertificateStore, IssuedCertificate};
use crate::secrets::SecretStore;

/// [`CertificateStore`] over the sealed settings fields.
#[derive(Debug)]
pub struct SettingsCertificateStore {
    file: SettingsFile,
    secrets: SecretStore,
    write_lock: Mutex<()>,
}

impl SettingsCertificateStore {
    /// Store backed by `file`, sealing with `secrets`.
    pub fn new(file: SettingsFile, secrets: SecretStore) -> Self {
        Self {
            file,
            secrets,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Settings, AcmeError> {
        self.file.load().await.map_err(storage)
    }

    async fn update(&self, apply: impl FnOnce(&mut Settings) -> Result<(), AcmeError> + Send) -> Result<(), AcmeError> {
        let _guard = self.write_lock.lock().await;
        let mut settings = self.load().await?;
        apply(&mut settings)?;
        self.file.save(&settings).await.map_err(storage)
    }
}

fn storage(e: impl std::fmt::Display) -> AcmeError {
    AcmeError::Storage(e.to_string())
}

#[async_trait]
impl CertificateStore for SettingsCertificateStore {
    async fn load_certificate(&self) -> Result<Option<IssuedCertificate>, AcmeError> {
        let settings = self.load().await?;
        if settings.tls_cert.is_empty() || settings.tls_key.is_empty() {
            return Ok(None);
        }

        let cert = self.secrets.open_string(&settings.tls_cert).map_err(storage)?;
        let key = self.secrets.open_string(&settings.tls_key).map_err(storage)?;
        IssuedCertificate::from_pem(cert.to_string(), key).map(Some)
    }

    async fn save_certificate(&self, certificate: &IssuedCertificate) -> Result<(), AcmeError> {
        let cert = self
            .secrets
            .seal(certificate.certificate_pem().as_bytes())
            .map_err(storage)?;
        let key = self
            .secrets
            .seal(certificate.private_key_pem().as_bytes())
            .map_err(storage)?;

        self.update(move |settings| {
            settings.tls_cert = cert;
            settings.tls_key = key;
            Ok(())
        })
        .await
    }

    async fn load_account(&self) -> Result<Option<AcmeAccount>, AcmeError> {
        let settings = self.load().await?;
        if settings.acme_account.is_empty() {
            return Ok(None);
        }

        let json = self
            .secrets
            .open_string(&settings.acme_account)
            .map_err(storage)?;
        AcmeAccount::from_json(&json).map(Some).map_err(storage)
    }

    async fn save_account(&self, account: &AcmeAccount) -> Result<(), AcmeError> {
        let json = account.to_json().map_err(storage)?;
        let sealed = self.secrets.seal(json.as_bytes()).map_err(storage)?;
        let email = account.email.clone();

        self.update(move |settings| {
            settings.acme_account = sealed;
            settings.acme_email.get_or_insert(email);
            Ok(())
        })
        .await
    }
}
