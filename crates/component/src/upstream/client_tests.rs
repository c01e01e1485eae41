// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Query;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use tokio::net::TcpListener;

use super::*;

type Seen = Arc<Mutex<Vec<(HashMap<String, String>, serde_json::Value)>>>;

/// Start a mock API server that records query + body and replies with `reply`.
async fn mock_api(path: &'static str, status: u16, reply: &'static str) -> (SocketAddr, Seen) {
    crate::test_support::ensure_crypto_provider();
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);

    let app = Router::new().route(
        path,
        post(move |Query(q): Query<HashMap<String, String>>, Json(body): Json<serde_json::Value>| {
            let seen = Arc::clone(&seen_clone);
            async move {
                seen.lock().push((q, body));
                (
                    axum::http::StatusCode::from_u16(status)
                        .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
                    reply,
                )
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (addr, seen)
}

#[tokio::test]
async fn posts_json_without_token() -> anyhow::Result<()> {
    let (addr, seen) = mock_api(
        "/cgi-bin/component/api_component_token",
        200,
        r#"{"component_access_token":"ACCESS1","expires_in":7200}"#,
    )
    .await;
    let upstream = HttpUpstream::new(format!("http://{addr}/"), Duration::from_secs(5));

    let body = serde_json::json!({ "component_appid": "wx123" });
    let bytes = upstream.post_json(Endpoint::ComponentToken, None, body.clone()).await?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(value["component_access_token"], "ACCESS1");

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].0.is_empty());
    assert_eq!(seen[0].1, body);
    Ok(())
}

#[tokio::test]
async fn passes_token_as_query_parameter() -> anyhow::Result<()> {
    let (addr, seen) =
        mock_api("/cgi-bin/component/api_create_preauthcode", 200, r#"{"pre_auth_code":"PAC1"}"#)
            .await;
    let upstream = HttpUpstream::new(format!("http://{addr}"), Duration::from_secs(5));

    upstream
        .post_json(Endpoint::PreAuthCode, Some("ACCESS1"), serde_json::json!({}))
        .await?;

    let seen = seen.lock();
    assert_eq!(seen[0].0.get("component_access_token").map(String::as_str), Some("ACCESS1"));
    Ok(())
}

#[tokio::test]
async fn error_status_is_a_transport_failure() -> anyhow::Result<()> {
    let (addr, _seen) = mock_api("/cgi-bin/component/api_query_auth", 503, "busy").await;
    let upstream = HttpUpstream::new(format!("http://{addr}"), Duration::from_secs(5));

    let result = upstream.post_json(Endpoint::QueryAuth, Some("t"), serde_json::json!({})).await;
    let err = result.expect_err("503 should fail");
    assert!(err.to_string().contains("503"), "got: {err}");
    Ok(())
}

#[tokio::test]
async fn unreachable_server_fails() {
    crate::test_support::ensure_crypto_provider();
    let upstream = HttpUpstream::new("http://127.0.0.1:1", Duration::from_secs(2));
    let result =
        upstream.post_json(Endpoint::AuthorizerToken, None, serde_json::json!({})).await;
    assert!(result.is_err());
}
