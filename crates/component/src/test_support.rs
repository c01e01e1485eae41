// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: builders, a scripted upstream, and assertion helpers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Once};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;

use crate::cache::{BoxFuture, MemoryCache, TokenCache};
use crate::credential::chain::CredentialChain;
use crate::credential::crypto::{CryptError, MsgCrypt};
use crate::credential::{CredentialEvent, TenantConfig};
use crate::upstream::{Endpoint, Upstream};

/// Valid 43-character message key used across tests.
pub const TEST_AES_KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";

/// Push token used across tests.
pub const TEST_PUSH_TOKEN: &str = "tk-push";

static CRYPTO_INIT: Once = Once::new();

/// Install the rustls crypto provider (needed for reqwest even on plain HTTP).
pub fn ensure_crypto_provider() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Tenant with secret `sec`, push token [`TEST_PUSH_TOKEN`] and key [`TEST_AES_KEY`].
pub fn tenant_config(app_id: &str) -> TenantConfig {
    TenantConfig {
        app_id: app_id.to_owned(),
        secret: "sec".to_owned(),
        token: TEST_PUSH_TOKEN.to_owned(),
        encoding_aes_key: TEST_AES_KEY.to_owned(),
    }
}

/// Decrypted body of a ticket push.
pub fn ticket_push_xml(app_id: &str, ticket: &str) -> String {
    format!(
        "<xml><AppId><![CDATA[{app_id}]]></AppId><CreateTime>1413192605</CreateTime>\
         <InfoType><![CDATA[component_verify_ticket]]></InfoType>\
         <ComponentVerifyTicket><![CDATA[{ticket}]]></ComponentVerifyTicket></xml>"
    )
}

/// Decrypted body of an `authorized` / `updateauthorized` push.
pub fn authorized_push_xml(app_id: &str, info_type: &str, authorizer: &str, code: &str) -> String {
    format!(
        "<xml><AppId><![CDATA[{app_id}]]></AppId><CreateTime>1413192760</CreateTime>\
         <InfoType><![CDATA[{info_type}]]></InfoType>\
         <AuthorizerAppid><![CDATA[{authorizer}]]></AuthorizerAppid>\
         <AuthorizationCode><![CDATA[{code}]]></AuthorizationCode>\
         <AuthorizationCodeExpiredTime>1413196360</AuthorizationCodeExpiredTime></xml>"
    )
}

/// Decrypted body of an `unauthorized` push.
pub fn unauthorized_push_xml(app_id: &str, authorizer: &str) -> String {
    format!(
        "<xml><AppId><![CDATA[{app_id}]]></AppId><CreateTime>1413192760</CreateTime>\
         <InfoType><![CDATA[unauthorized]]></InfoType>\
         <AuthorizerAppid><![CDATA[{authorizer}]]></AuthorizerAppid></xml>"
    )
}

/// An encrypted push as the platform would deliver it.
#[derive(Debug, Clone)]
pub struct SealedPush {
    pub encrypt: String,
    pub msg_signature: String,
    pub timestamp: String,
    pub nonce: String,
}

impl SealedPush {
    /// Outer request body.
    pub fn body(&self, app_id: &str) -> String {
        format!(
            "<xml><AppId><![CDATA[{app_id}]]></AppId><Encrypt><![CDATA[{}]]></Encrypt></xml>",
            self.encrypt
        )
    }
}

/// Encrypt `xml` for `receive_id` with the tenant's push credentials.
pub fn seal_push(tenant: &TenantConfig, receive_id: &str, xml: &str) -> Result<SealedPush, CryptError> {
    let crypt = MsgCrypt::new(&tenant.token, &tenant.encoding_aes_key, receive_id)?;
    let reply = crypt.encrypt(xml, "1413192605", "1320562132")?;
    Ok(SealedPush {
        encrypt: reply.encrypt,
        msg_signature: reply.msg_signature,
        timestamp: reply.timestamp,
        nonce: reply.nonce,
    })
}

// -- Upstream replies ---------------------------------------------------------

pub fn component_token_reply(token: &str, expires_in: u64) -> serde_json::Value {
    json!({ "component_access_token": token, "expires_in": expires_in })
}

pub fn pre_auth_code_reply(code: &str) -> serde_json::Value {
    json!({ "pre_auth_code": code, "expires_in": 600 })
}

pub fn query_auth_reply(authorizer: &str, access: &str, refresh: &str, expires_in: u64) -> serde_json::Value {
    json!({
        "authorization_info": {
            "authorizer_appid": authorizer,
            "authorizer_access_token": access,
            "expires_in": expires_in,
            "authorizer_refresh_token": refresh,
            "func_info": [
                { "funcscope_category": { "id": 1 } },
                { "funcscope_category": { "id": 15 } },
            ],
        }
    })
}

pub fn authorizer_token_reply(access: &str, refresh: &str, expires_in: u64) -> serde_json::Value {
    json!({
        "authorizer_access_token": access,
        "expires_in": expires_in,
        "authorizer_refresh_token": refresh,
    })
}

pub fn error_reply(errcode: i64, errmsg: &str) -> serde_json::Value {
    json!({ "errcode": errcode, "errmsg": errmsg })
}

// -- StubUpstream -------------------------------------------------------------

/// Scripted reply for one call.
#[derive(Debug, Clone)]
pub enum StubReply {
    Json(serde_json::Value),
    /// Transport-level failure.
    Fail(String),
}

/// One call the stub received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: Endpoint,
    pub access_token: Option<String>,
    pub body: serde_json::Value,
}

/// In-process [`Upstream`] that replays scripted replies per endpoint.
///
/// Replies queue per endpoint; the last one repeats once the queue drains.
#[derive(Default)]
pub struct StubUpstream {
    replies: Mutex<HashMap<Endpoint, VecDeque<StubReply>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl StubUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before every reply (for concurrency tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reply(&self, endpoint: Endpoint, value: serde_json::Value) -> &Self {
        self.replies.lock().entry(endpoint).or_default().push_back(StubReply::Json(value));
        self
    }

    pub fn fail(&self, endpoint: Endpoint, msg: &str) -> &Self {
        self.replies.lock().entry(endpoint).or_default().push_back(StubReply::Fail(msg.to_owned()));
        self
    }

    /// Number of calls made to `endpoint`.
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.calls.lock().iter().filter(|c| c.endpoint == endpoint).count()
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Most recent call to `endpoint`.
    pub fn last_call(&self, endpoint: Endpoint) -> Option<RecordedCall> {
        self.calls.lock().iter().rev().find(|c| c.endpoint == endpoint).cloned()
    }

    fn next_reply(&self, endpoint: Endpoint) -> Option<StubReply> {
        let mut replies = self.replies.lock();
        let queue = replies.get_mut(&endpoint)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Upstream for StubUpstream {
    fn post_json<'a>(
        &'a self,
        endpoint: Endpoint,
        access_token: Option<&'a str>,
        body: serde_json::Value,
    ) -> BoxFuture<'a, anyhow::Result<Bytes>> {
        Box::pin(async move {
            self.calls.lock().push(RecordedCall {
                endpoint,
                access_token: access_token.map(str::to_owned),
                body,
            });
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.next_reply(endpoint) {
                Some(StubReply::Json(value)) => Ok(Bytes::from(serde_json::to_vec(&value)?)),
                Some(StubReply::Fail(msg)) => Err(anyhow::anyhow!(msg)),
                None => Err(anyhow::anyhow!("no stub reply for {}", endpoint.path())),
            }
        })
    }
}

// -- Chain builder ------------------------------------------------------------

/// A chain wired to a [`MemoryCache`] and a [`StubUpstream`].
pub struct TestChain {
    pub chain: Arc<CredentialChain>,
    pub cache: Arc<MemoryCache>,
    pub upstream: Arc<StubUpstream>,
    pub events: broadcast::Receiver<CredentialEvent>,
}

impl TestChain {
    pub fn new(app_id: &str, upstream: StubUpstream) -> Self {
        Self::with_cache(app_id, upstream, Arc::new(MemoryCache::new()))
    }

    pub fn with_cache(app_id: &str, upstream: StubUpstream, cache: Arc<MemoryCache>) -> Self {
        let upstream = Arc::new(upstream);
        let (event_tx, events) = broadcast::channel(64);
        let chain = CredentialChain::new(
            tenant_config(app_id),
            Arc::clone(&cache) as Arc<dyn TokenCache>,
            Arc::clone(&upstream) as Arc<dyn Upstream>,
            crate::credential::chain::DEFAULT_SAFETY_MARGIN,
            event_tx,
        );
        Self { chain, cache, upstream, events }
    }

    /// Drain every event emitted so far.
    pub fn drain_events(&mut self) -> Vec<CredentialEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

/// Assert that `$expr` is `Err` and its message contains `$substr`.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
