//! WAF decision gate.
//!
//! # Data Flow
//! ```text
//! Incoming request (transport guard already passed):
//!     → allow-list check (health, docs, favicon) → skip scanning
//!     → scan path + query (always)
//!     → scan JSON body (non-GET, non-upload endpoints)
//!     → findings? → 403 + audit record
//!     → clean    → hand request to the forwarder
//! ```
//!
//! # Design Decisions
//! - Stateless across requests: every request is judged independently
//! - Unparseable bodies yield no findings; the body-parsing layer owns
//!   rejecting malformed payloads
//! - Matched payloads stay in the server-side audit record only

use std::net::SocketAddr;

use axum::{
    body::{self, Body},
    extract::{ConnectInfo, State},
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::http::server::AppState;
use crate::observability::metrics;
use crate::waf::scanner::ScanVerdict;

/// Machine-readable code returned on every blocked request.
pub const BLOCK_CODE: &str = "WAF_BLOCKED";

/// Client-facing body for a blocked request. Generic on purpose.
#[derive(Debug, Serialize)]
struct BlockBody {
    success: bool,
    message: &'static str,
    code: &'static str,
}

/// Middleware enforcing the WAF decision per request.
pub async fn waf_gate(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let waf = &state.config.waf;
    if !waf.enabled {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    if waf.allowlist.iter().any(|p| path.starts_with(p.as_str())) {
        return next.run(request).await;
    }

    let mut verdict = ScanVerdict::default();
    verdict.extend(state.scanner.scan_path(&path));

    let pairs = query_pairs(request.uri().query());
    verdict.extend(
        state
            .scanner
            .scan_query(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
    );

    let method = request.method().clone();
    let is_upload = waf
        .upload_prefixes
        .iter()
        .any(|p| path.starts_with(p.as_str()));

    // Body inspection only where a scannable body is expected: uploads are
    // opaque blobs and GET bodies are not a thing the backend reads.
    let request = if method != Method::GET && !is_upload {
        let (parts, body) = request.into_parts();
        let bytes = match body::to_bytes(body, waf.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(client = %client, path = %path, error = %e, "Request body exceeded scan limit");
                return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
            }
        };
        if let Ok(json) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            verdict.extend(state.scanner.scan_body(&json));
        }
        Request::from_parts(parts, Body::from(bytes))
    } else {
        request
    };

    if verdict.is_blocked() {
        return block(&verdict, client, &method, &path);
    }

    next.run(request).await
}

/// Decode the raw query string into key/value pairs.
fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

/// Reject the request and emit the audit record.
fn block(verdict: &ScanVerdict, client: SocketAddr, method: &Method, path: &str) -> Response {
    // Full findings stay server-side; the caller only ever sees the code.
    tracing::warn!(
        client = %client,
        method = %method,
        path = %path,
        findings = %serde_json::to_string(&verdict.findings).unwrap_or_default(),
        "Request blocked by WAF"
    );
    for finding in &verdict.findings {
        metrics::record_waf_block(finding.category.as_str());
    }

    (
        StatusCode::FORBIDDEN,
        Json(BlockBody {
            success: false,
            message: "Request rejected by security policy",
            code: BLOCK_CODE,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pairs_decodes_percent_encoding() {
        let pairs = query_pairs(Some("name=%27%20OR%20%271%27%3D%271&page=2"));
        assert_eq!(pairs[0], ("name".to_string(), "' OR '1'='1".to_string()));
        assert_eq!(pairs[1], ("page".to_string(), "2".to_string()));
    }

    #[test]
    fn test_query_pairs_empty() {
        assert!(query_pairs(None).is_empty());
        assert!(query_pairs(Some("")).is_empty());
    }
}
