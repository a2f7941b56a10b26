//! ACME issuer backed by `instant-acme`.

use async_trait::async_trait;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
    NewOrder, Order, OrderStatus,
};
use std::time::Duration;
use tracing::{debug, info, trace};
use zeroize::Zeroizing;

use super::{AcmeAccount, AcmeError, AcmeIssuer, ChallengeSolvers, IssuedCertificate};
use crate::challenge::ChallengeRegistry;

/// Timeout for challenge validation.
const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for certificate issuance after finalization.
const ISSUANCE_TIMEOUT: Duration = Duration::from_secs(60);

/// Talks to one ACME directory.
#[derive(Debug, Clone)]
pub struct InstantAcmeIssuer {
    directory_url: String,
}

/// A challenge that was presented and must be cleaned up.
struct Presented {
    registry: ChallengeRegistry,
    domain: String,
    token: String,
    key_authorization: Zeroizing<String>,
}

/// Install ring as the process-wide rustls provider, unless one is already set.
///
/// Must run before the first ACME or HTTPS request.
pub fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
}

impl InstantAcmeIssuer {
    /// Issuer for the directory at `directory_url`.
    pub fn new(directory_url: impl Into<String>) -> Self {
        install_crypto_provider();
        Self {
            directory_url: directory_url.into(),
        }
    }

    /// The directory URL.
    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    async fn present_challenges(
        order: &mut Order,
        solvers: &ChallengeSolvers,
        presented: &mut Vec<Presented>,
    ) -> Result<(), AcmeError> {
        let mut authorizations = order.authorizations();

        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(AcmeError::obtain)?;

            let domain = match &authz.identifier().identifier {
                Identifier::Dns(domain) => domain.clone(),
                _ => continue,
            };

            debug!(domain = %domain, status = ?authz.status, "processing authorization");
            if authz.status == AuthorizationStatus::Valid {
                continue;
            }

            let offered = |kind: &ChallengeType| authz.challenges.iter().any(|c| c.r#type == *kind);
            let (kind, registry) = match (&solvers.http, &solvers.dns) {
                (Some(http), _) if offered(&ChallengeType::Http01) => {
                    (ChallengeType::Http01, http.clone())
                }
                (_, Some(dns)) if offered(&ChallengeType::Dns01) => {
                    (ChallengeType::Dns01, dns.clone())
                }
                _ => return Err(AcmeError::NoChallengeProvider(domain)),
            };

            let mut challenge = authz
                .challenge(kind.clone())
                .ok_or_else(|| AcmeError::NoChallengeProvider(domain.clone()))?;

            let key_authorization = Zeroizing::new(challenge.key_authorization().as_str().to_string());
            let token = challenge.token.clone();

            registry.present(&domain, &token, &key_authorization);
            presented.push(Presented {
                registry,
                domain: domain.clone(),
                token,
                key_authorization,
            });

            challenge.set_ready().await.map_err(AcmeError::obtain)?;
            info!(domain = %domain, kind = ?kind, "challenge ready");
        }

        Ok(())
    }

    async fn wait_for_ready(order: &mut Order) -> Result<(), AcmeError> {
        let deadline = tokio::time::Instant::now() + CHALLENGE_TIMEOUT;

        loop {
            let state = order.refresh().await.map_err(AcmeError::obtain)?;

            match state.status {
                OrderStatus::Ready | OrderStatus::Valid => return Ok(()),
                OrderStatus::Invalid => {
                    return Err(AcmeError::ObtainFailed("order became invalid".into()));
                }
                OrderStatus::Pending | OrderStatus::Processing => {
                    if tokio::time::Instant::now() > deadline {
                        return Err(AcmeError::ObtainFailed(
                            "timed out waiting for challenge validation".into(),
                        ));
                    }
                    trace!(status = ?state.status, "order not ready yet");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }

    async fn finalize(order: &mut Order, domain: &str) -> Result<IssuedCertificate, AcmeError> {
        let key = rcgen::KeyPair::generate().map_err(AcmeError::obtain)?;
        let csr = rcgen::CertificateParams::new(vec![domain.to_string()])
            .map_err(AcmeError::obtain)?
            .serialize_request(&key)
            .map_err(AcmeError::obtain)?
            .der()
            .to_vec();

        order.finalize_csr(&csr).await.map_err(AcmeError::obtain)?;

        let deadline = tokio::time::Instant::now() + ISSUANCE_TIMEOUT;
        let chain = loop {
            let state = order.refresh().await.map_err(AcmeError::obtain)?;

            match state.status {
                OrderStatus::Valid => {
                    break order
                        .certificate()
                        .await
                        .map_err(AcmeError::obtain)?
                        .ok_or_else(|| AcmeError::ObtainFailed("no certificate in response".into()))?;
                }
                OrderStatus::Invalid => {
                    return Err(AcmeError::ObtainFailed("order became invalid".into()));
                }
                _ => {
                    if tokio::time::Instant::now() > deadline {
                        return Err(AcmeError::ObtainFailed(
                            "timed out waiting for certificate".into(),
                        ));
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        };

        IssuedCertificate::from_pem(chain, Zeroizing::new(key.serialize_pem()))
    }
}

#[async_trait]
impl AcmeIssuer for InstantAcmeIssuer {
    async fn register(&self, email: &str) -> Result<AcmeAccount, AcmeError> {
        let contact = format!("mailto:{email}");
        let (account, credentials) = Account::builder()
            .map_err(|e| AcmeError::AccountCreation(e.to_string()))?
            .create(
                &NewAccount {
                    contact: &[&contact],
                    terms_of_service_agreed: true,
                    only_return_existing: false,
                },
                self.directory_url.clone(),
                None,
            )
            .await
            .map_err(|e| AcmeError::AccountCreation(e.to_string()))?;

        let credentials = serde_json::to_string(&credentials)
            .map_err(|e| AcmeError::AccountCreation(format!("failed to serialize credentials: {e}")))?;

        Ok(AcmeAccount {
            email: email.to_string(),
            registration: account.id().to_string(),
            directory: self.directory_url.clone(),
            credentials: Zeroizing::new(credentials),
        })
    }

    async fn obtain(
        &self,
        account: &AcmeAccount,
        domain: &str,
        solvers: &ChallengeSolvers,
    ) -> Result<IssuedCertificate, AcmeError> {
        let credentials: AccountCredentials = serde_json::from_str(&account.credentials)
            .map_err(|e| AcmeError::ObtainFailed(format!("stored account is unreadable: {e}")))?;
        let acme = Account::builder()
            .map_err(AcmeError::obtain)?
            .from_credentials(credentials)
            .await
            .map_err(AcmeError::obtain)?;

        info!(domain, directory = %self.directory_url, "creating certificate order");
        let identifiers = [Identifier::Dns(domain.to_string())];
        let mut order = acme
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(AcmeError::obtain)?;

        let mut presented = Vec::new();
        let result = async {
            Self::present_challenges(&mut order, solvers, &mut presented).await?;
            Self::wait_for_ready(&mut order).await?;
            Self::finalize(&mut order, domain).await
        }
        .await;

        for challenge in &presented {
            challenge.registry.clean_up(
                &challenge.domain,
                &challenge.token,
                &challenge.key_authorization,
            );
        }

        result
    }
}
