// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential lifecycle for a third-party platform component.
//!
//! The chain runs verification ticket -> platform access token -> pre-auth
//! code -> authorization code -> authorizer token pair. Tickets arrive via
//! encrypted pushes ([`callback`]); delegations are correlated by
//! [`session`]; every token fetch and cache write goes through [`chain`].

pub mod api;
pub mod callback;
pub mod chain;
pub mod crypto;
pub mod delegation;
pub mod flight;
pub mod session;

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Static configuration for one tenant (a component app).
#[derive(Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Component app id; the unit of credential isolation.
    pub app_id: String,
    pub secret: String,
    /// Message token used in push signatures.
    pub token: String,
    /// 43-character message encryption key.
    pub encoding_aes_key: String,
}

impl fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantConfig")
            .field("app_id", &self.app_id)
            .field("secret", &"<redacted>")
            .field("token", &"<redacted>")
            .field("encoding_aes_key", &"<redacted>")
            .finish()
    }
}

/// Latest ticket pushed by the authorization server. Latest wins.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationTicket(pub String);

impl fmt::Debug for VerificationTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationTicket({})", redact(&self.0))
    }
}

/// Platform-level access token, one per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformAccessToken {
    pub value: String,
    /// Epoch seconds at which the token was issued.
    pub issued_at: u64,
    pub ttl_seconds: u64,
}

/// Single-use code that starts one delegation attempt. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreAuthCode {
    pub value: String,
    pub ttl_seconds: u64,
}

/// Code returned by the consent redirect; exchanged exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub value: String,
    /// Zero when the sender did not state a lifetime.
    pub ttl_seconds: u64,
    pub received_at: Instant,
}

impl AuthorizationCode {
    pub fn new(value: impl Into<String>, ttl_seconds: u64) -> Self {
        Self { value: value.into(), ttl_seconds, received_at: Instant::now() }
    }

    pub fn is_expired(&self) -> bool {
        self.ttl_seconds > 0 && self.received_at.elapsed() >= Duration::from_secs(self.ttl_seconds)
    }
}

/// Access/refresh pair for one authorized account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizerTokenPair {
    pub authorizer_appid: String,
    pub access_token: String,
    pub refresh_token: String,
    pub ttl_seconds: u64,
    /// Granted permission set ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub func_info: Vec<u32>,
}

/// Delegation progress for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    Unticketed,
    PlatformTokenReady,
    PreAuthIssued,
    AwaitingUserConsent,
    AuthorizerTokenReady,
}

/// Events emitted by the credential chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CredentialEvent {
    /// A verified push delivered a new ticket.
    TicketRenewed { tenant: String },
    /// A stage fetched and cached a fresh credential.
    Refreshed { tenant: String, stage: String },
    /// A stage failed to obtain a credential.
    #[serde(rename = "refresh:failed")]
    RefreshFailed { tenant: String, stage: String, error: String },
    /// The refresh path is gone; the user must consent again.
    ReauthRequired { tenant: String },
}

/// Status snapshot of one tenant (returned by the API).
#[derive(Debug, Clone, Serialize)]
pub struct ChainStatus {
    pub app_id: String,
    pub state: ChainState,
    pub has_ticket: bool,
    pub has_refresh_grant: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorizer_appid: Option<String>,
}

/// Show only the first few characters of a secret.
pub fn redact(s: &str) -> String {
    let head: String = s.chars().take(4).collect();
    format!("{head}…")
}

pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
