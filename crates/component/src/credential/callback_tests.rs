// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::credential::ChainState;
use crate::test_support::{
    authorized_push_xml, component_token_reply, query_auth_reply, seal_push, tenant_config,
    ticket_push_xml, unauthorized_push_xml, StubUpstream, TestChain,
};
use crate::upstream::Endpoint;

fn verifier(t: &TestChain) -> CallbackVerifier {
    CallbackVerifier::new(tenant_config("wx123"), Arc::clone(&t.chain))
}

#[tokio::test]
async fn ticket_push_applies_ticket_and_warms_platform_token() -> anyhow::Result<()> {
    let upstream = StubUpstream::new();
    upstream.reply(Endpoint::ComponentToken, component_token_reply("ACCESS1", 7200));
    let t = TestChain::new("wx123", upstream);
    let v = verifier(&t);

    let push = seal_push(&tenant_config("wx123"), "wx123", &ticket_push_xml("wx123", "tk-abc"))?;
    let n = v.verify(&push.encrypt, &push.msg_signature, &push.timestamp, &push.nonce).await?;

    assert_eq!(n.source_id, "wx123");
    assert_eq!(n.renewed_ticket(), Some("tk-abc"));
    assert_eq!(t.chain.ticket().as_deref(), Some("tk-abc"));
    assert_eq!(t.upstream.calls(Endpoint::ComponentToken), 1);
    assert_eq!(t.chain.state(), ChainState::PlatformTokenReady);
    Ok(())
}

#[tokio::test]
async fn platform_fetch_failure_does_not_fail_verification() -> anyhow::Result<()> {
    let upstream = StubUpstream::new();
    upstream.fail(Endpoint::ComponentToken, "connection refused");
    let t = TestChain::new("wx123", upstream);
    let v = verifier(&t);

    let push = seal_push(&tenant_config("wx123"), "wx123", &ticket_push_xml("wx123", "tk-abc"))?;
    let n = v.verify(&push.encrypt, &push.msg_signature, &push.timestamp, &push.nonce).await?;

    assert_eq!(n.renewed_ticket(), Some("tk-abc"));
    assert_eq!(t.chain.ticket().as_deref(), Some("tk-abc"));
    assert_eq!(t.chain.state(), ChainState::Unticketed);
    Ok(())
}

#[tokio::test]
async fn latest_ticket_wins() -> anyhow::Result<()> {
    let upstream = StubUpstream::new();
    upstream.reply(Endpoint::ComponentToken, component_token_reply("ACCESS1", 7200));
    let t = TestChain::new("wx123", upstream);
    let v = verifier(&t);

    for ticket in ["tk-1", "tk-2"] {
        let push = seal_push(&tenant_config("wx123"), "wx123", &ticket_push_xml("wx123", ticket))?;
        v.verify(&push.encrypt, &push.msg_signature, &push.timestamp, &push.nonce).await?;
    }
    assert_eq!(t.chain.ticket().as_deref(), Some("tk-2"));
    // Second push hits the cached platform token.
    assert_eq!(t.upstream.calls(Endpoint::ComponentToken), 1);
    Ok(())
}

#[tokio::test]
async fn mismatched_tenant_leaves_ticket_unchanged() -> anyhow::Result<()> {
    let t = TestChain::new("wx123", StubUpstream::new());
    t.chain.apply_ticket("tk-original");
    let v = verifier(&t);

    // Correct receiver, but the payload names another component.
    let push = seal_push(&tenant_config("wx123"), "wx123", &ticket_push_xml("wx999", "tk-evil"))?;
    let err = v.verify(&push.encrypt, &push.msg_signature, &push.timestamp, &push.nonce).await;

    assert!(matches!(err, Err(CredentialError::TenantMismatch { ref actual, .. }) if actual == "wx999"));
    assert_eq!(t.chain.ticket().as_deref(), Some("tk-original"));
    assert_eq!(t.upstream.calls(Endpoint::ComponentToken), 0);
    Ok(())
}

#[tokio::test]
async fn foreign_receiver_is_a_tenant_mismatch() -> anyhow::Result<()> {
    let t = TestChain::new("wx123", StubUpstream::new());
    let v = verifier(&t);

    let push = seal_push(&tenant_config("wx123"), "wx999", &ticket_push_xml("wx999", "tk-evil"))?;
    let err = v.verify(&push.encrypt, &push.msg_signature, &push.timestamp, &push.nonce).await;

    assert!(matches!(err, Err(CredentialError::TenantMismatch { .. })));
    assert_eq!(t.chain.ticket(), None);
    Ok(())
}

#[tokio::test]
async fn bad_signature_is_a_decryption_error() -> anyhow::Result<()> {
    let t = TestChain::new("wx123", StubUpstream::new());
    let v = verifier(&t);

    let push = seal_push(&tenant_config("wx123"), "wx123", &ticket_push_xml("wx123", "tk-abc"))?;
    let err = v.verify(&push.encrypt, "0000000000000000000000000000000000000000", &push.timestamp, &push.nonce).await;

    assert!(matches!(err, Err(CredentialError::Decryption { code: -40001, .. })));
    assert!(err.is_err_and(|e| e.acknowledge_push()));
    assert_eq!(t.chain.ticket(), None);
    Ok(())
}

#[tokio::test]
async fn non_xml_plaintext_is_malformed() -> anyhow::Result<()> {
    let t = TestChain::new("wx123", StubUpstream::new());
    let v = verifier(&t);

    let push = seal_push(&tenant_config("wx123"), "wx123", "not xml at all")?;
    let err = v.verify(&push.encrypt, &push.msg_signature, &push.timestamp, &push.nonce).await;

    assert!(matches!(err, Err(CredentialError::MalformedPayload(_))));
    Ok(())
}

#[tokio::test]
async fn ticket_push_without_ticket_is_malformed() -> anyhow::Result<()> {
    let t = TestChain::new("wx123", StubUpstream::new());
    let v = verifier(&t);

    let push = seal_push(&tenant_config("wx123"), "wx123", &ticket_push_xml("wx123", ""))?;
    let err = v.verify(&push.encrypt, &push.msg_signature, &push.timestamp, &push.nonce).await;

    assert!(matches!(err, Err(CredentialError::MalformedPayload(_))));
    assert_eq!(t.chain.ticket(), None);
    Ok(())
}

#[tokio::test]
async fn illegal_key_surfaces_code() {
    let t = TestChain::new("wx123", StubUpstream::new());
    let mut tenant = tenant_config("wx123");
    tenant.encoding_aes_key = "short".to_owned();
    let v = CallbackVerifier::new(tenant, Arc::clone(&t.chain));

    let err = v.verify("AAAA", "sig", "1", "2").await;
    assert!(matches!(err, Err(CredentialError::Decryption { code: -40004, .. })));
}

#[tokio::test]
async fn authorized_push_records_code() -> anyhow::Result<()> {
    let t = TestChain::new("wx123", StubUpstream::new());
    let v = verifier(&t);

    let xml = authorized_push_xml("wx123", "authorized", "wxAUTH", "queryauthcode@@@xyz");
    let push = seal_push(&tenant_config("wx123"), "wx123", &xml)?;
    let n = v.verify(&push.encrypt, &push.msg_signature, &push.timestamp, &push.nonce).await?;

    assert_eq!(
        n.event,
        PushEvent::Authorized {
            authorizer_appid: "wxAUTH".into(),
            code: "queryauthcode@@@xyz".into(),
            ttl_seconds: 3600,
        }
    );
    assert_eq!(n.renewed_ticket(), None);
    assert_eq!(t.chain.state(), ChainState::AwaitingUserConsent);
    Ok(())
}

#[tokio::test]
async fn push_for_exchanged_code_keeps_token_ready() -> anyhow::Result<()> {
    let upstream = StubUpstream::new();
    upstream
        .reply(Endpoint::ComponentToken, component_token_reply("ACCESS1", 7200))
        .reply(Endpoint::QueryAuth, query_auth_reply("wxAUTH", "AT1", "RT1", 7200));
    let t = TestChain::new("wx123", upstream);
    t.chain.apply_ticket("tk-abc");
    let v = verifier(&t);

    // Redirect delivers the code first, then the push repeats it.
    t.chain.exchange_authorization_code("AC1").await?;
    let push = seal_push(
        &tenant_config("wx123"),
        "wx123",
        &authorized_push_xml("wx123", "authorized", "wxAUTH", "AC1"),
    )?;
    v.verify(&push.encrypt, &push.msg_signature, &push.timestamp, &push.nonce).await?;

    assert_eq!(t.chain.state(), ChainState::AuthorizerTokenReady);
    assert!(t.chain.status().has_refresh_grant);
    assert_eq!(t.chain.authorizer_access_token().await?.access_token, "AT1");
    assert_eq!(t.upstream.calls(Endpoint::QueryAuth), 1);
    Ok(())
}

#[tokio::test]
async fn update_push_while_ready_keeps_state() -> anyhow::Result<()> {
    let upstream = StubUpstream::new();
    upstream
        .reply(Endpoint::ComponentToken, component_token_reply("ACCESS1", 7200))
        .reply(Endpoint::QueryAuth, query_auth_reply("wxAUTH", "AT1", "RT1", 7200));
    let t = TestChain::new("wx123", upstream);
    t.chain.apply_ticket("tk-abc");
    t.chain.exchange_authorization_code("AC1").await?;
    let v = verifier(&t);

    let xml = authorized_push_xml("wx123", "updateauthorized", "wxAUTH", "AC2");
    let push = seal_push(&tenant_config("wx123"), "wx123", &xml)?;
    v.verify(&push.encrypt, &push.msg_signature, &push.timestamp, &push.nonce).await?;

    assert_eq!(t.chain.state(), ChainState::AuthorizerTokenReady);
    assert_eq!(t.upstream.calls(Endpoint::QueryAuth), 1);
    Ok(())
}

#[tokio::test]
async fn unauthorized_push_is_parsed() -> anyhow::Result<()> {
    let t = TestChain::new("wx123", StubUpstream::new());
    let v = verifier(&t);

    let push = seal_push(&tenant_config("wx123"), "wx123", &unauthorized_push_xml("wx123", "wxAUTH"))?;
    let n = v.verify(&push.encrypt, &push.msg_signature, &push.timestamp, &push.nonce).await?;

    assert_eq!(n.event, PushEvent::Unauthorized { authorizer_appid: "wxAUTH".into() });
    Ok(())
}

#[test]
fn envelope_parses_encrypt_field() -> anyhow::Result<()> {
    let env = parse_envelope(
        "<xml><AppId><![CDATA[wx123]]></AppId><Encrypt><![CDATA[abc+/=]]></Encrypt></xml>",
    )?;
    assert_eq!(env.app_id.as_deref(), Some("wx123"));
    assert_eq!(env.encrypt, "abc+/=");
    Ok(())
}

#[yare::parameterized(
    not_xml = { "hello" },
    no_encrypt = { "<xml><AppId>wx123</AppId></xml>" },
    empty_encrypt = { "<xml><Encrypt></Encrypt></xml>" },
)]
fn envelope_rejects_malformed(body: &str) {
    assert!(matches!(parse_envelope(body), Err(CredentialError::MalformedPayload(_))));
}
