//! Node runtime.
//!
//! Unlocks the settings record, binds every listener, then runs them as
//! sibling tasks under one [`CancellationToken`]:
//!
//! - DNS (UDP+TCP) for the authoritative zone
//! - HTTP for path-based challenges
//! - the mesh transport
//! - certificate load-or-renew, checked on an interval
//!
//! The first task to fail cancels the rest. Shutdown waits for every task to
//! unwind for at most the configured grace period, then aborts stragglers.

mod public_ip;

pub use public_ip::{discover_public_ip, PUBLIC_IP_URL};

use chrono::Duration as ChronoDuration;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::acme::{
    install_crypto_provider, AcmeIssuer, CertificateLifecycleManager, ChallengeSolvers,
    InstantAcmeIssuer,
};
use crate::authority::{NameResolver, ZoneHandler};
use crate::challenge::{self, ChallengeRegistry};
use crate::mesh::{MeshConfig, MeshTransport};
use crate::registry::DeviceRegistry;
use crate::settings::{Settings, SettingsCertificateStore, SettingsFile};
use crate::{NodeConfig, SrvError};

/// How often the certificate is re-checked for renewal.
pub const RENEWAL_CHECK_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

type TaskResult = (&'static str, crate::Result<()>);

/// External collaborators the runtime drives.
#[derive(Clone)]
pub struct NodeServices {
    /// Device registry backing DNS answers.
    pub registry: Arc<dyn DeviceRegistry>,
    /// Mesh transport engine.
    pub transport: Arc<dyn MeshTransport>,
    /// ACME issuer. Defaults to the configured directory when unset.
    pub issuer: Option<Arc<dyn AcmeIssuer>>,
}

/// Run the node until `shutdown` is cancelled, Ctrl-C arrives or a task fails.
///
/// A missing or undecryptable settings record, or a listener that cannot
/// bind, fails before anything is spawned.
pub async fn run(
    config: &NodeConfig,
    passphrase: &[u8],
    services: NodeServices,
    shutdown: CancellationToken,
) -> crate::Result<()> {
    install_crypto_provider();

    let file = SettingsFile::new(&config.settings_path);
    let settings = file.load().await?;
    let secrets = settings.unlock(passphrase)?;
    info!(zone = %settings.domain_zone, cidr = %settings.cidr, node_ip = %settings.node_ip, "settings loaded");

    let public_ip = resolve_public_ip(config).await;

    let http_challenges = ChallengeRegistry::tokens();
    let dns_challenges = ChallengeRegistry::fqdns();
    let solvers = ChallengeSolvers {
        http: config.acme.challenge.http().then(|| http_challenges.clone()),
        dns: config.acme.challenge.dns().then(|| dns_challenges.clone()),
    };

    let resolver = NameResolver::new(
        &settings.domain_zone,
        public_ip,
        services.registry.clone(),
        dns_challenges,
    );
    let handler = ZoneHandler::new(resolver);

    let identity = settings.node_identity(&secrets)?;
    let mesh_config = MeshConfig::for_node(identity.to_pki(), config.mesh_listen, settings.cipher);
    drop(identity);

    let udp = UdpSocket::bind(config.dns_listen)
        .await
        .map_err(|e| SrvError::Server(format!("UDP bind {}: {e}", config.dns_listen)))?;
    let tcp = TcpListener::bind(config.dns_listen)
        .await
        .map_err(|e| SrvError::Server(format!("TCP bind {}: {e}", config.dns_listen)))?;
    let http = TcpListener::bind(config.http_listen)
        .await
        .map_err(|e| SrvError::Server(format!("HTTP bind {}: {e}", config.http_listen)))?;
    info!(dns = %config.dns_listen, http = %config.http_listen, "listeners bound");

    let mut tasks: JoinSet<TaskResult> = JoinSet::new();

    let token = shutdown.clone();
    tasks.spawn(async move { ("dns", crate::server::serve(udp, tcp, handler, token).await) });

    let token = shutdown.clone();
    tasks.spawn(async move {
        (
            "http",
            challenge::http::serve_listener(http, http_challenges, token).await,
        )
    });

    let transport = services.transport.clone();
    let token = shutdown.clone();
    tasks.spawn(async move {
        let on_started = Box::new(|| info!("mesh transport started"));
        ("mesh", transport.start(mesh_config, on_started, token).await)
    });

    match lifecycle_manager(config, &settings, file, secrets, solvers, services.issuer.clone()) {
        Some(manager) => {
            let domain = settings.domain_zone.clone();
            let token = shutdown.clone();
            tasks.spawn(async move {
                (
                    "certificates",
                    renewal_loop(manager, domain, RENEWAL_CHECK_INTERVAL, token).await,
                )
            });
        }
        None => warn!("no ACME contact email configured, certificate issuance disabled"),
    }

    let outcome = supervise(&mut tasks, &shutdown).await;

    let grace = Duration::from_secs(config.shutdown_grace_secs);
    let mesh = services.transport;
    let drained = tokio::time::timeout(grace, async {
        if let Err(e) = mesh.stop().await {
            warn!(error = %e, "mesh transport stop failed");
        }
        while let Some(joined) = tasks.join_next().await {
            log_exit(joined);
        }
    })
    .await;
    if drained.is_err() {
        warn!(grace_secs = config.shutdown_grace_secs, remaining = tasks.len(), "grace period elapsed, aborting tasks");
        tasks.abort_all();
    }

    info!("node stopped");
    outcome
}

/// Wait for the first task failure, Ctrl-C or external cancellation.
async fn supervise(tasks: &mut JoinSet<TaskResult>, shutdown: &CancellationToken) -> crate::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                None => break Ok(()),
                Some(Ok((name, Ok(())))) => {
                    info!(task = name, "task finished");
                }
                Some(Ok((name, Err(e)))) => {
                    error!(task = name, error = %e, "task failed, shutting down");
                    break Err(e);
                }
                Some(Err(e)) => {
                    error!(error = %e, "task panicked, shutting down");
                    break Err(SrvError::Server(format!("task panicked: {e}")));
                }
            },
            () = shutdown.cancelled() => break Ok(()),
            signal = &mut ctrl_c => {
                match signal {
                    Ok(()) => info!("interrupt received, shutting down"),
                    Err(e) => warn!(error = %e, "signal handler failed, shutting down"),
                }
                break Ok(());
            }
        }
    };

    shutdown.cancel();
    outcome
}

fn log_exit(joined: Result<TaskResult, tokio::task::JoinError>) {
    match joined {
        Ok((name, Ok(()))) => debug!(task = name, "task stopped"),
        Ok((name, Err(e))) => warn!(task = name, error = %e, "task failed during shutdown"),
        Err(e) => warn!(error = %e, "task aborted"),
    }
}

async fn resolve_public_ip(config: &NodeConfig) -> Option<Ipv4Addr> {
    if let Some(ip) = config.public_ip {
        return Some(ip);
    }
    match discover_public_ip(PUBLIC_IP_URL).await {
        Ok(ip) => {
            info!(%ip, "public address discovered");
            Some(ip)
        }
        Err(e) => {
            warn!(error = %e, "public address discovery failed, zone apex will not resolve");
            None
        }
    }
}

fn lifecycle_manager(
    config: &NodeConfig,
    settings: &Settings,
    file: SettingsFile,
    secrets: crate::secrets::SecretStore,
    solvers: ChallengeSolvers,
    issuer: Option<Arc<dyn AcmeIssuer>>,
) -> Option<Arc<CertificateLifecycleManager>> {
    let email = config
        .acme
        .email
        .clone()
        .or_else(|| settings.acme_email.clone())
        .filter(|e| !e.trim().is_empty())?;

    let issuer =
        issuer.unwrap_or_else(|| Arc::new(InstantAcmeIssuer::new(config.acme.directory())));
    let store = Arc::new(SettingsCertificateStore::new(file, secrets));
    let manager = CertificateLifecycleManager::new(issuer, store, solvers, email)
        .with_renew_before(ChronoDuration::days(config.acme.renew_before_days));
    Some(Arc::new(manager))
}

/// Load-or-renew on every tick until cancelled.
///
/// A failed attempt is logged and retried on the next tick; it never takes
/// the node down.
async fn renewal_loop(
    manager: Arc<CertificateLifecycleManager>,
    domain: String,
    every: Duration,
    shutdown: CancellationToken,
) -> crate::Result<()> {
    info!(domain = %domain, check_interval_hours = every.as_secs() / 3600, "certificate renewal loop started");
    let mut ticker = tokio::time::interval(every);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            result = manager.get_or_obtain(&domain) => match result {
                Ok(certificate) => {
                    debug!(domain = %domain, not_after = %certificate.not_after(), "certificate check complete");
                }
                Err(e) => error!(domain = %domain, error = %e, "certificate check failed"),
            },
        }
    }
}
