//! End-to-end tests for HTTPS enforcement.

mod common;

#[tokio::test]
async fn test_passthrough_when_not_enforced() {
    let upstream = common::start_upstream("ok").await;
    let (gateway, shutdown) = common::spawn_gateway(upstream, false).await;

    let res = common::client()
        .get(format!("http://{}/patients", gateway))
        .send()
        .await
        .expect("gateway unreachable");

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "ok");

    shutdown.trigger();
}

#[tokio::test]
async fn test_redirect_to_https_when_enforced() {
    let upstream = common::start_upstream("ok").await;
    let (gateway, shutdown) = common::spawn_gateway(upstream, true).await;

    let res = common::client()
        .get(format!("http://{}/patients?name=alice", gateway))
        .send()
        .await
        .expect("gateway unreachable");

    assert_eq!(res.status(), 301);
    assert_eq!(
        res.headers()
            .get("location")
            .and_then(|v| v.to_str().ok()),
        Some(format!("https://{}/patients?name=alice", gateway).as_str())
    );

    shutdown.trigger();
}

#[tokio::test]
async fn test_forwarded_proto_hint_passes_through() {
    let upstream = common::start_upstream("ok").await;
    let (gateway, shutdown) = common::spawn_gateway(upstream, true).await;

    let res = common::client()
        .get(format!("http://{}/patients", gateway))
        .header("x-forwarded-proto", "https")
        .send()
        .await
        .expect("gateway unreachable");

    assert_eq!(res.status(), 200);

    shutdown.trigger();
}

#[tokio::test]
async fn test_secure_channel_is_still_scanned() {
    let upstream = common::start_upstream("ok").await;
    let (gateway, shutdown) = common::spawn_gateway(upstream, true).await;
    let client = common::client();

    // Enforce mode on, already-secure channel: the injection is blocked.
    let res = client
        .get(format!("http://{}/patients", gateway))
        .header("x-forwarded-proto", "https")
        .query(&[("name", "' OR '1'='1")])
        .send()
        .await
        .expect("gateway unreachable");
    assert_eq!(res.status(), 403);
    let body: serde_json::Value = res.json().await.expect("json body");
    assert_eq!(body["code"], serde_json::json!("WAF_BLOCKED"));

    // The same request without the payload reaches the upstream.
    let res = client
        .get(format!("http://{}/patients", gateway))
        .header("x-forwarded-proto", "https")
        .query(&[("name", "alice")])
        .send()
        .await
        .expect("gateway unreachable");
    assert_eq!(res.status(), 200);

    shutdown.trigger();
}
