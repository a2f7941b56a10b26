//! DNS server runner: binds UDP+TCP and serves the node's zone.

use hickory_server::server::ServerFuture;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::authority::ZoneHandler;

/// TCP connection timeout for DNS queries.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Bind `listen` on UDP and TCP and serve until `shutdown` is cancelled.
pub async fn run(
    listen: SocketAddr,
    handler: ZoneHandler,
    shutdown: CancellationToken,
) -> crate::Result<()> {
    // Bind UDP.
    let udp_socket = UdpSocket::bind(listen)
        .await
        .map_err(|e| crate::SrvError::Server(format!("UDP bind {listen}: {e}")))?;
    info!(addr = %listen, "UDP socket bound");

    // Bind TCP.
    let tcp_listener = TcpListener::bind(listen)
        .await
        .map_err(|e| crate::SrvError::Server(format!("TCP bind {listen}: {e}")))?;
    info!(addr = %listen, "TCP listener bound");

    serve(udp_socket, tcp_listener, handler, shutdown).await
}

/// Serve on already-bound sockets until `shutdown` is cancelled.
pub async fn serve(
    udp_socket: UdpSocket,
    tcp_listener: TcpListener,
    handler: ZoneHandler,
    shutdown: CancellationToken,
) -> crate::Result<()> {
    let mut server = ServerFuture::new(handler);
    server.register_socket(udp_socket);
    server.register_listener(tcp_listener, TCP_TIMEOUT);

    info!("west DNS server running");

    let cancelled = tokio::select! {
        result = server.block_until_done() => {
            result.map_err(|e| crate::SrvError::Server(format!("server error: {e}")))?;
            false
        }
        () = shutdown.cancelled() => true,
    };

    if cancelled {
        server
            .shutdown_gracefully()
            .await
            .map_err(|e| crate::SrvError::Server(format!("shutdown error: {e}")))?;
        info!("west DNS server stopped");
    }

    Ok(())
}
