//! HTTP server setup and upstream forwarding.
//!
//! # Responsibilities
//! - Create the Axum router with the inspection pipeline
//! - Wire up middleware (tracing, request ID, timeout, guard, gate)
//! - Serve plain HTTP or terminate TLS directly
//! - Forward clean requests to the EMR backend

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        Request, StatusCode, Uri,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Extension, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::http::request::{RequestIdLayer, X_REQUEST_ID};
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::transport::{transport_guard, SecureTransport};
use crate::waf::{waf_gate, PatternRegistry, RequestScanner};

/// Application state injected into middleware and handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub scanner: Arc<RequestScanner>,
    pub client: Client<HttpConnector, Body>,
}

/// HTTP server for the security gateway.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    /// Create a new gateway server with the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let registry = Arc::new(PatternRegistry::builtin());
        tracing::info!(rules = registry.len(), "Pattern registry compiled");

        let scanner = Arc::new(RequestScanner::new(registry));
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let config = Arc::new(config);
        let state = AppState {
            config: config.clone(),
            scanner,
            client,
        };

        let router = Self::build_router(&config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Request order: trace → request ID → timeout → transport guard →
    /// WAF gate → forwarder.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(forward_handler))
            .route("/", any(forward_handler))
            .layer(middleware::from_fn_with_state(state.clone(), waf_gate))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                transport_guard,
            ))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Run the server, accepting plain HTTP connections on the listener.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listening");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }

    /// Run the server terminating TLS directly.
    ///
    /// Requests served here carry the [`SecureTransport`] marker, so the
    /// transport guard sees them as secure.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "Gateway listening (TLS)");

        let handle = axum_server::Handle::new();
        let graceful = handle.clone();
        tokio::spawn(async move {
            shutdown::wait(shutdown_rx).await;
            graceful.graceful_shutdown(Some(Duration::from_secs(10)));
        });

        let app = self
            .router
            .layer(Extension(SecureTransport))
            .into_make_service_with_connect_info::<SocketAddr>();

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Forward a clean request to the configured EMR backend.
async fn forward_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> impl IntoResponse {
    let start_time = Instant::now();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let method_str = request.method().to_string();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method_str,
        path = %path,
        "Forwarding request"
    );

    let (mut parts, body) = request.into_parts();

    // Rewrite the URI to target the upstream; the address was validated
    // at startup.
    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    match Authority::from_str(&state.config.upstream.address) {
        Ok(authority) => uri_parts.authority = Some(authority),
        Err(e) => {
            tracing::error!(error = %e, "Upstream address is not a valid authority");
            return (StatusCode::BAD_GATEWAY, "Upstream misconfigured").into_response();
        }
    }
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build upstream URI");
            return (StatusCode::BAD_GATEWAY, "Upstream misconfigured").into_response();
        }
    };

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let status = response.status();
            metrics::record_request(&method_str, status.as_u16(), start_time);

            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body)).into_response()
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                path = %path,
                error = %e,
                "Upstream request failed"
            );
            metrics::record_request(&method_str, 502, start_time);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
