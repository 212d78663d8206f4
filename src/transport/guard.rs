//! HTTPS enforcement middleware.

use axum::{
    body::Body,
    extract::State,
    http::{header, uri::Scheme, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::server::AppState;
use crate::observability::metrics;

/// Marker extension present on requests served over the gateway's own TLS
/// listener. Treated as a trusted "secure channel" flag.
#[derive(Debug, Clone, Copy)]
pub struct SecureTransport;

/// Middleware redirecting insecure transport when enforcement is on.
pub async fn transport_guard(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.transport.enforce_https || is_secure(&request) {
        return next.run(request).await;
    }

    match https_location(&request) {
        Some(location) => {
            tracing::debug!(location = %location, "Redirecting insecure request");
            metrics::record_redirect();
            permanent_redirect(&location)
        }
        None => {
            // No host to redirect to; pass through rather than answer with
            // a broken Location.
            tracing::warn!("Insecure request without a host, passing through");
            next.run(request).await
        }
    }
}

/// A request is secure if any of the three independent hints is present:
/// the TLS-listener marker, a forwarded-protocol header, or an https URI.
fn is_secure(request: &Request<Body>) -> bool {
    if request.extensions().get::<SecureTransport>().is_some() {
        return true;
    }
    if request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("https"))
    {
        return true;
    }
    request.uri().scheme() == Some(&Scheme::HTTPS)
}

/// The `https://` equivalent of the original URL, including the query.
fn https_location(request: &Request<Body>) -> Option<String> {
    let host = request
        .uri()
        .authority()
        .map(|a| a.as_str().to_string())
        .or_else(|| {
            request
                .headers()
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })?;
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Some(format!("https://{host}{path_and_query}"))
}

fn permanent_redirect(location: &str) -> Response {
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(header::LOCATION, location)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::MOVED_PERMANENTLY.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    #[test]
    fn test_forwarded_proto_header_is_secure() {
        let req = Request::builder()
            .uri("/patients")
            .header("x-forwarded-proto", "HTTPS")
            .body(Body::empty())
            .expect("request");
        assert!(is_secure(&req));
    }

    #[test]
    fn test_tls_marker_is_secure() {
        let mut req = request("/patients");
        req.extensions_mut().insert(SecureTransport);
        assert!(is_secure(&req));
    }

    #[test]
    fn test_https_uri_is_secure() {
        assert!(is_secure(&request("https://emr.example/patients")));
        assert!(!is_secure(&request("/patients")));
    }

    #[test]
    fn test_location_preserves_path_and_query() {
        let req = Request::builder()
            .uri("/patients?name=alice&page=2")
            .header(header::HOST, "emr.example")
            .body(Body::empty())
            .expect("request");
        assert_eq!(
            https_location(&req).as_deref(),
            Some("https://emr.example/patients?name=alice&page=2")
        );
    }

    #[test]
    fn test_location_none_without_host() {
        assert!(https_location(&request("/patients")).is_none());
    }

    #[test]
    fn test_redirect_is_301() {
        let res = permanent_redirect("https://emr.example/");
        assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            res.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()),
            Some("https://emr.example/")
        );
    }
}
