//! Shared utilities for gateway integration tests.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

use emr_gateway::{GatewayConfig, GatewayServer, Shutdown};

/// Start a mock EMR backend that answers every request with a fixed body.
pub async fn start_upstream(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new().fallback(move || async move { response });
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Spawn a gateway fronting the given upstream; returns its address and
/// the shutdown handle.
pub async fn spawn_gateway(upstream: SocketAddr, enforce_https: bool) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = GatewayConfig::default();
    config.listener.bind_address = addr.to_string();
    config.upstream.address = upstream.to_string();
    config.transport.enforce_https = enforce_https;

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    let server = GatewayServer::new(config);
    tokio::spawn(async move {
        let _ = server.run(listener, shutdown_rx).await;
    });

    (addr, shutdown)
}

/// HTTP client that ignores system proxies and follows no redirects.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
