//! EMR Security Gateway
//!
//! A security gateway for an Electronic Medical Record backend, built with
//! Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────┐
//!                  │                 SECURITY GATEWAY                  │
//!                  │                                                   │
//!  Client Request  │  ┌──────────┐   ┌───────────┐   ┌────────────┐   │
//!  ────────────────┼─▶│ listener │──▶│ transport │──▶│  WAF gate  │   │
//!                  │  │ (TCP/TLS)│   │   guard   │   │ scan+block │   │
//!                  │  └──────────┘   └─────┬─────┘   └──────┬─────┘   │
//!                  │                       │ 301            │ 403      │
//!                  │                       ▼                ▼          │
//!  Client Response │                 ┌───────────────────────────┐    │
//!  ◀───────────────┼─────────────────│   forward to EMR backend  │◀───┼── Backend
//!                  │                 └───────────────────────────┘    │
//!                  │                                                   │
//!                  │  Cross-cutting: config, observability, lifecycle  │
//!                  └──────────────────────────────────────────────────┘
//! ```

use std::path::Path;

use tokio::net::TcpListener;

use emr_gateway::config::loader::load_config;
use emr_gateway::{GatewayConfig, GatewayServer, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional config file path as the first argument; defaults otherwise.
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(Path::new(&path))?,
        None => GatewayConfig::default(),
    };

    emr_gateway::observability::logging::init(&config.observability);

    tracing::info!("emr-gateway v0.1.0 starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        enforce_https = config.transport.enforce_https,
        waf_enabled = config.waf.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            emr_gateway::observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();

    let tls = config.listener.tls.clone();
    let bind_address = config.listener.bind_address.clone();
    let server = GatewayServer::new(config);

    match tls {
        Some(tls) => {
            let addr = bind_address.parse()?;
            let rustls = emr_gateway::net::tls::load_tls_config(
                Path::new(&tls.cert_path),
                Path::new(&tls.key_path),
            )
            .await?;
            server.run_tls(addr, rustls, shutdown_rx).await?;
        }
        None => {
            let listener = TcpListener::bind(&bind_address).await?;
            server.run(listener, shutdown_rx).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
