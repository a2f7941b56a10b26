//! Certificate load-or-renew against the settings-backed store.

use async_trait::async_trait;
use chrono::{Datelike, Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use west_ca::{generate_ca, CaRequest};
use west_srv::acme::{
    AcmeAccount, AcmeError, AcmeIssuer, CertificateLifecycleManager, CertificateState,
    ChallengeSolvers, IssuedCertificate,
};
use west_srv::challenge::{dns01_fqdn, dns01_value, ChallengeRegistry};
use west_srv::settings::{install, InstallRequest, SettingsCertificateStore, SettingsFile};
use zeroize::Zeroizing;

const ZONE: &str = "west.example.com";

/// Presents a DNS challenge, checks it is visible, cleans it up, then hands
/// back a self-signed certificate valid for 90 days.
#[derive(Default)]
struct CountingIssuer {
    registrations: AtomicUsize,
    orders: AtomicUsize,
}

#[async_trait]
impl AcmeIssuer for CountingIssuer {
    async fn register(&self, email: &str) -> Result<AcmeAccount, AcmeError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(AcmeAccount {
            email: email.to_string(),
            registration: "https://acme.test/acct/1".into(),
            directory: "https://acme.test/directory".into(),
            credentials: Zeroizing::new("{}".into()),
        })
    }

    async fn obtain(
        &self,
        _account: &AcmeAccount,
        domain: &str,
        solvers: &ChallengeSolvers,
    ) -> Result<IssuedCertificate, AcmeError> {
        self.orders.fetch_add(1, Ordering::SeqCst);

        let dns = solvers
            .dns
            .as_ref()
            .ok_or_else(|| AcmeError::NoChallengeProvider(domain.into()))?;
        dns.present(domain, "token", "token.thumbprint");
        assert_eq!(
            dns.lookup(&dns01_fqdn(domain)),
            Some(dns01_value("token.thumbprint"))
        );
        dns.clean_up(domain, "token", "token.thumbprint");

        let not_after = Utc::now() + Duration::days(90);
        let key = rcgen::KeyPair::generate().map_err(|e| AcmeError::ObtainFailed(e.to_string()))?;
        let mut params =
            rcgen::CertificateParams::new(vec![domain.to_string()]).map_err(|e| AcmeError::ObtainFailed(e.to_string()))?;
        params.not_after = rcgen::date_time_ymd(
            not_after.year(),
            u8::try_from(not_after.month()).unwrap_or(1),
            u8::try_from(not_after.day()).unwrap_or(1),
        );
        let cert = params.self_signed(&key).map_err(|e| AcmeError::ObtainFailed(e.to_string()))?;
        IssuedCertificate::from_pem(cert.pem(), Zeroizing::new(key.serialize_pem()))
    }
}

async fn manager(dir: &std::path::Path, issuer: Arc<CountingIssuer>) -> (CertificateLifecycleManager, ChallengeRegistry) {
    let file = SettingsFile::new(dir.join("settings.json"));
    let ca = generate_ca(&CaRequest {
        name: "west".into(),
        ..Default::default()
    })
    .unwrap();
    let settings = install(
        &file,
        b"hunter2",
        &ca,
        &InstallRequest {
            domain_zone: ZONE.into(),
            email: Some("ops@example.com".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let secrets = settings.unlock(b"hunter2").unwrap();
    let dns = ChallengeRegistry::fqdns();
    let store = Arc::new(SettingsCertificateStore::new(file, secrets));
    let solvers = ChallengeSolvers {
        http: None,
        dns: Some(dns.clone()),
    };
    (
        CertificateLifecycleManager::new(issuer, store, solvers, "ops@example.com"),
        dns,
    )
}

#[tokio::test]
async fn test_second_call_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let issuer = Arc::new(CountingIssuer::default());
    let (manager, dns) = manager(dir.path(), issuer.clone()).await;

    assert_eq!(manager.status(ZONE).await.unwrap(), CertificateState::NoCertificate);

    let first = manager.get_or_obtain(ZONE).await.unwrap();
    let second = manager.get_or_obtain(ZONE).await.unwrap();

    assert_eq!(first.certificate_pem(), second.certificate_pem());
    assert_eq!(first.private_key_pem(), second.private_key_pem());
    assert_eq!(issuer.registrations.load(Ordering::SeqCst), 1);
    assert_eq!(issuer.orders.load(Ordering::SeqCst), 1);
    assert!(dns.is_empty());
    assert!(matches!(
        manager.status(ZONE).await.unwrap(),
        CertificateState::Valid { .. }
    ));
}

#[tokio::test]
async fn test_state_survives_a_new_manager() {
    let dir = tempfile::tempdir().unwrap();
    let issuer = Arc::new(CountingIssuer::default());
    let (manager, _) = manager(dir.path(), issuer.clone()).await;
    let issued = manager.get_or_obtain(ZONE).await.unwrap();
    drop(manager);

    // A restarted process reads the same record back.
    let file = SettingsFile::new(dir.path().join("settings.json"));
    let settings = file.load().await.unwrap();
    let secrets = settings.unlock(b"hunter2").unwrap();
    let restarted = CertificateLifecycleManager::new(
        issuer.clone(),
        Arc::new(SettingsCertificateStore::new(file, secrets)),
        ChallengeSolvers {
            http: None,
            dns: Some(ChallengeRegistry::fqdns()),
        },
        "ops@example.com",
    );

    let reloaded = restarted.get_or_obtain(ZONE).await.unwrap();
    assert_eq!(reloaded, issued);
    assert_eq!(issuer.orders.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_renewal_window_forces_reissue() {
    let dir = tempfile::tempdir().unwrap();
    let issuer = Arc::new(CountingIssuer::default());
    let (manager, _) = manager(dir.path(), issuer.clone()).await;
    manager.get_or_obtain(ZONE).await.unwrap();

    // Anything expiring within a year counts as due.
    let eager = manager.with_renew_before(Duration::days(365));
    assert!(matches!(
        eager.status(ZONE).await.unwrap(),
        CertificateState::Expiring { .. }
    ));
    eager.get_or_obtain(ZONE).await.unwrap();

    assert_eq!(issuer.orders.load(Ordering::SeqCst), 2);
    assert_eq!(issuer.registrations.load(Ordering::SeqCst), 1);
}
