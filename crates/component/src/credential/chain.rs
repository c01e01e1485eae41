// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential chain manager: the single authority that issues and caches
//! every token for one tenant.
//!
//! Each "check cache, else fetch and store" sequence runs under the
//! [`FlightGate`] slot for its (tenant, stage) key, so concurrent callers
//! produce at most one upstream call per stage. Lock order is authorizer
//! slot, then platform slot; nothing takes them the other way round.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::cache::{CacheKey, Stage, TokenCache};
use crate::credential::api::{
    decode, AuthorizerTokenRequest, AuthorizerTokenResponse, ComponentTokenRequest,
    ComponentTokenResponse, PreAuthCodeRequest, PreAuthCodeResponse, QueryAuthRequest,
    QueryAuthResponse,
};
use crate::credential::delegation::{build_delegation_url, build_web_oauth_url};
use crate::credential::flight::FlightGate;
use crate::credential::{
    epoch_secs, AuthorizationCode, AuthorizerTokenPair, ChainState, ChainStatus,
    CredentialEvent, PlatformAccessToken, PreAuthCode, TenantConfig, VerificationTicket,
};
use crate::error::{CredentialError, Result};
use crate::upstream::{Endpoint, Upstream};

/// Subtracted from every upstream `expires_in` before caching (clock drift
/// plus the ten-minute push interval).
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(1500);

/// Upstream codes meaning the refresh token itself is dead.
const REVOKED_REFRESH_CODES: &[i64] = &[
    61003, // component is not authorized by this account
    61023, // refresh_token is invalid
];

/// Refresh token retained for the process lifetime, independent of the
/// access token's cache entry.
#[derive(Debug, Clone)]
struct RefreshGrant {
    authorizer_appid: String,
    refresh_token: String,
    func_info: Vec<u32>,
}

impl From<&AuthorizerTokenPair> for RefreshGrant {
    fn from(pair: &AuthorizerTokenPair) -> Self {
        Self {
            authorizer_appid: pair.authorizer_appid.clone(),
            refresh_token: pair.refresh_token.clone(),
            func_info: pair.func_info.clone(),
        }
    }
}

/// Token chain for one tenant.
pub struct CredentialChain {
    tenant: TenantConfig,
    cache: Arc<dyn TokenCache>,
    upstream: Arc<dyn Upstream>,
    safety_margin: Duration,
    ticket: RwLock<Option<VerificationTicket>>,
    /// Most recent authorization code handed to us (redirect or push).
    pending_code: RwLock<Option<AuthorizationCode>>,
    /// Codes already posted to the exchange endpoint.
    exchanged: RwLock<HashSet<String>>,
    refresh_grant: RwLock<Option<RefreshGrant>>,
    state: RwLock<ChainState>,
    flights: FlightGate,
    event_tx: broadcast::Sender<CredentialEvent>,
}

impl CredentialChain {
    pub fn new(
        tenant: TenantConfig,
        cache: Arc<dyn TokenCache>,
        upstream: Arc<dyn Upstream>,
        safety_margin: Duration,
        event_tx: broadcast::Sender<CredentialEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            tenant,
            cache,
            upstream,
            safety_margin,
            ticket: RwLock::new(None),
            pending_code: RwLock::new(None),
            exchanged: RwLock::new(HashSet::new()),
            refresh_grant: RwLock::new(None),
            state: RwLock::new(ChainState::Unticketed),
            flights: FlightGate::new(),
            event_tx,
        })
    }

    pub fn app_id(&self) -> &str {
        &self.tenant.app_id
    }

    pub fn state(&self) -> ChainState {
        *self.state.read()
    }

    fn set_state(&self, next: ChainState) {
        let mut state = self.state.write();
        if *state != next {
            tracing::debug!(tenant = %self.tenant.app_id, from = ?*state, to = ?next, "chain state");
            *state = next;
        }
    }

    pub fn status(&self) -> ChainStatus {
        let grant = self.refresh_grant.read();
        ChainStatus {
            app_id: self.tenant.app_id.clone(),
            state: self.state(),
            has_ticket: self.ticket.read().is_some(),
            has_refresh_grant: grant.is_some(),
            authorizer_appid: grant.as_ref().map(|g| g.authorizer_appid.clone()),
        }
    }

    // -- Verification ticket --------------------------------------------------

    /// Replace the current ticket. Latest wins.
    pub fn apply_ticket(&self, ticket: impl Into<String>) {
        let ticket = VerificationTicket(ticket.into());
        tracing::info!(tenant = %self.tenant.app_id, ?ticket, "verification ticket renewed");
        *self.ticket.write() = Some(ticket);
        self.emit(CredentialEvent::TicketRenewed { tenant: self.tenant.app_id.clone() });
    }

    pub fn ticket(&self) -> Option<String> {
        self.ticket.read().as_ref().map(|t| t.0.clone())
    }

    // -- Platform access token ------------------------------------------------

    /// Cache-first platform access token; fetched with the current ticket on miss.
    pub async fn platform_access_token(&self) -> Result<PlatformAccessToken> {
        let key = CacheKey::platform(&self.tenant.app_id);
        let _flight = self.flights.acquire(&key).await;

        if let Some(token) = self.load::<PlatformAccessToken>(&key).await? {
            tracing::trace!(tenant = %self.tenant.app_id, "platform token cache hit");
            return Ok(token);
        }

        let result = self.fetch_platform_token(&key).await;
        self.report(Stage::PlatformAccessToken, &result);
        let token = result?;
        if self.state() == ChainState::Unticketed {
            self.set_state(ChainState::PlatformTokenReady);
        }
        Ok(token)
    }

    async fn fetch_platform_token(&self, key: &CacheKey) -> Result<PlatformAccessToken> {
        let ticket = self
            .ticket
            .read()
            .as_ref()
            .filter(|t| !t.0.is_empty())
            .map(|t| t.0.clone())
            .ok_or(CredentialError::MissingTicket)?;

        let body = serde_json::to_value(ComponentTokenRequest {
            component_appid: &self.tenant.app_id,
            component_appsecret: &self.tenant.secret,
            component_verify_ticket: &ticket,
        })?;
        let bytes = self
            .upstream
            .post_json(Endpoint::ComponentToken, None, body)
            .await
            .map_err(CredentialError::Transport)?;
        let resp: ComponentTokenResponse = decode(&bytes)?;

        let token = PlatformAccessToken {
            value: resp.component_access_token,
            issued_at: epoch_secs(),
            ttl_seconds: resp.expires_in,
        };
        self.store(key, &token, token.ttl_seconds).await?;
        Ok(token)
    }

    // -- Pre-authorization code -----------------------------------------------

    /// Request a fresh pre-auth code. Never served from cache.
    pub async fn pre_auth_code(&self) -> Result<PreAuthCode> {
        let platform = self.platform_access_token().await?;

        let body =
            serde_json::to_value(PreAuthCodeRequest { component_appid: &self.tenant.app_id })?;
        let bytes = self
            .upstream
            .post_json(Endpoint::PreAuthCode, Some(&platform.value), body)
            .await
            .map_err(CredentialError::Transport)?;
        let resp: PreAuthCodeResponse = decode(&bytes)?;

        tracing::info!(tenant = %self.tenant.app_id, expires_in = resp.expires_in, "pre-auth code issued");
        self.set_state(ChainState::PreAuthIssued);
        Ok(PreAuthCode { value: resp.pre_auth_code, ttl_seconds: resp.expires_in })
    }

    /// Consent page URL for a pre-auth code. No network call.
    pub fn delegation_url(&self, pre_auth_code: &str, redirect_uri: &str) -> String {
        build_delegation_url(&self.tenant.app_id, pre_auth_code, redirect_uri)
    }

    /// Web authorization URL on behalf of an authorized account.
    pub fn web_oauth_url(
        &self,
        authorizer_appid: &str,
        redirect_uri: &str,
        scope: &str,
        state: &str,
    ) -> String {
        build_web_oauth_url(&self.tenant.app_id, authorizer_appid, redirect_uri, scope, state)
    }

    // -- Authorization code ---------------------------------------------------

    /// Remember a code from the consent redirect or an `authorized` push.
    ///
    /// A code already exchanged is ignored: the platform delivers the same
    /// code through both the redirect and the push.
    pub fn record_authorization_code(&self, code: impl Into<String>, ttl_seconds: u64) {
        let code = AuthorizationCode::new(code, ttl_seconds);
        if self.exchanged.read().contains(&code.value) {
            tracing::debug!(tenant = %self.tenant.app_id, "authorization code already exchanged, ignoring");
            return;
        }
        tracing::info!(tenant = %self.tenant.app_id, ttl_seconds, "authorization code received");
        *self.pending_code.write() = Some(code);
        if self.state() != ChainState::AuthorizerTokenReady {
            self.set_state(ChainState::AwaitingUserConsent);
        }
    }

    /// Exchange an authorization code for the authorizer token pair.
    ///
    /// A code already exchanged is served from cache (or refreshed with the
    /// retained refresh token once the entry expired) and never posted
    /// again; a new code always goes upstream and overwrites the cached pair.
    pub async fn exchange_authorization_code(&self, code: &str) -> Result<AuthorizerTokenPair> {
        let key = CacheKey::authorizer(&self.tenant.app_id);
        let _flight = self.flights.acquire(&key).await;

        if self.exchanged.read().contains(code) {
            if let Some(pair) = self.load::<AuthorizerTokenPair>(&key).await? {
                tracing::trace!(tenant = %self.tenant.app_id, "authorizer pair cache hit");
                return Ok(pair);
            }
            let retained = self.refresh_grant.read().clone();
            return match retained {
                Some(grant) => self.refresh_with(&key, grant).await,
                None => Err(self.reauth_required()),
            };
        }
        self.exchange_locked(&key, code).await
    }

    async fn exchange_locked(&self, key: &CacheKey, code: &str) -> Result<AuthorizerTokenPair> {
        if code.is_empty() || self.exchanged.read().contains(code) {
            return Err(self.reauth_required());
        }

        let result = self.post_exchange(key, code).await;
        self.report(Stage::AuthorizerToken, &result);
        let pair = result?;

        self.exchanged.write().insert(code.to_owned());
        if self.pending_code.read().as_ref().is_some_and(|c| c.value == code) {
            *self.pending_code.write() = None;
        }
        *self.refresh_grant.write() = Some(RefreshGrant::from(&pair));
        self.set_state(ChainState::AuthorizerTokenReady);
        tracing::info!(tenant = %self.tenant.app_id, authorizer = %pair.authorizer_appid, "authorization code exchanged");
        Ok(pair)
    }

    async fn post_exchange(&self, key: &CacheKey, code: &str) -> Result<AuthorizerTokenPair> {
        let platform = self.platform_access_token().await?;

        let body = serde_json::to_value(QueryAuthRequest {
            component_appid: &self.tenant.app_id,
            authorization_code: code,
        })?;
        let bytes = self
            .upstream
            .post_json(Endpoint::QueryAuth, Some(&platform.value), body)
            .await
            .map_err(CredentialError::Transport)?;
        let info = decode::<QueryAuthResponse>(&bytes)?.authorization_info;

        let pair = AuthorizerTokenPair {
            authorizer_appid: info.authorizer_appid,
            access_token: info.authorizer_access_token,
            refresh_token: info.authorizer_refresh_token,
            ttl_seconds: info.expires_in,
            func_info: info.func_info.into_iter().map(|f| f.funcscope_category.id).collect(),
        };
        self.store(key, &pair, pair.ttl_seconds).await?;
        Ok(pair)
    }

    // -- Authorizer token -----------------------------------------------------

    /// Refresh the authorizer pair and persist the result.
    ///
    /// Uses the cached pair's refresh token, else the retained one. With
    /// neither, falls back to exchanging the pending authorization code.
    pub async fn refresh_authorizer_token(&self) -> Result<AuthorizerTokenPair> {
        let key = CacheKey::authorizer(&self.tenant.app_id);
        let _flight = self.flights.acquire(&key).await;
        self.refresh_locked(&key).await
    }

    /// Cache-first authorizer pair, refreshed transparently on miss.
    pub async fn authorizer_access_token(&self) -> Result<AuthorizerTokenPair> {
        let key = CacheKey::authorizer(&self.tenant.app_id);
        let _flight = self.flights.acquire(&key).await;

        if let Some(pair) = self.load::<AuthorizerTokenPair>(&key).await? {
            return Ok(pair);
        }
        self.refresh_locked(&key).await
    }

    async fn refresh_locked(&self, key: &CacheKey) -> Result<AuthorizerTokenPair> {
        let cached = self.load::<AuthorizerTokenPair>(key).await?;
        let retained = self.refresh_grant.read().clone();
        let grant = match (cached, retained) {
            (Some(pair), _) => RefreshGrant::from(&pair),
            (None, Some(grant)) => grant,
            (None, None) => {
                let pending = self.pending_code.read().clone();
                return match pending {
                    Some(code) if code.is_expired() => {
                        tracing::info!(tenant = %self.tenant.app_id, "pending authorization code expired");
                        *self.pending_code.write() = None;
                        Err(self.reauth_required())
                    }
                    Some(code) => {
                        tracing::info!(tenant = %self.tenant.app_id, "no refresh token on hand, exchanging authorization code");
                        self.exchange_locked(key, &code.value).await
                    }
                    None => Err(self.reauth_required()),
                };
            }
        };
        self.refresh_with(key, grant).await
    }

    async fn refresh_with(&self, key: &CacheKey, grant: RefreshGrant) -> Result<AuthorizerTokenPair> {
        let result = self.post_refresh(key, &grant).await;
        self.report(Stage::AuthorizerToken, &result);
        match result {
            Ok(pair) => {
                *self.refresh_grant.write() = Some(RefreshGrant::from(&pair));
                self.set_state(ChainState::AuthorizerTokenReady);
                Ok(pair)
            }
            Err(CredentialError::Upstream { code, msg }) if REVOKED_REFRESH_CODES.contains(&code) => {
                tracing::warn!(tenant = %self.tenant.app_id, code, msg = %msg, "refresh token rejected");
                self.forget_authorizer(key).await?;
                self.emit(CredentialEvent::ReauthRequired { tenant: self.tenant.app_id.clone() });
                Err(CredentialError::Upstream { code, msg })
            }
            Err(e) => Err(e),
        }
    }

    async fn post_refresh(
        &self,
        key: &CacheKey,
        grant: &RefreshGrant,
    ) -> Result<AuthorizerTokenPair> {
        let platform = self.platform_access_token().await?;

        let body = serde_json::to_value(AuthorizerTokenRequest {
            component_appid: &self.tenant.app_id,
            authorizer_appid: &grant.authorizer_appid,
            authorizer_refresh_token: &grant.refresh_token,
        })?;
        let bytes = self
            .upstream
            .post_json(Endpoint::AuthorizerToken, Some(&platform.value), body)
            .await
            .map_err(CredentialError::Transport)?;
        let resp: AuthorizerTokenResponse = decode(&bytes)?;

        let pair = AuthorizerTokenPair {
            authorizer_appid: grant.authorizer_appid.clone(),
            access_token: resp.authorizer_access_token,
            refresh_token: resp
                .authorizer_refresh_token
                .filter(|rt| !rt.is_empty())
                .unwrap_or_else(|| grant.refresh_token.clone()),
            ttl_seconds: resp.expires_in,
            func_info: grant.func_info.clone(),
        };
        self.store(key, &pair, pair.ttl_seconds).await?;
        tracing::info!(tenant = %self.tenant.app_id, authorizer = %pair.authorizer_appid, "authorizer token refreshed");
        Ok(pair)
    }

    /// Drop the authorizer pair and the retained refresh token (`unauthorized` push).
    pub async fn revoke_authorization(&self, authorizer_appid: &str) -> Result<()> {
        let key = CacheKey::authorizer(&self.tenant.app_id);
        let _flight = self.flights.acquire(&key).await;

        let matches = self
            .refresh_grant
            .read()
            .as_ref()
            .is_none_or(|g| g.authorizer_appid == authorizer_appid);
        if !matches {
            tracing::debug!(tenant = %self.tenant.app_id, authorizer = %authorizer_appid, "revocation for unknown authorizer ignored");
            return Ok(());
        }
        self.forget_authorizer(&key).await?;
        tracing::info!(tenant = %self.tenant.app_id, authorizer = %authorizer_appid, "authorization revoked");
        self.emit(CredentialEvent::ReauthRequired { tenant: self.tenant.app_id.clone() });
        Ok(())
    }

    async fn forget_authorizer(&self, key: &CacheKey) -> Result<()> {
        *self.refresh_grant.write() = None;
        self.set_state(ChainState::AwaitingUserConsent);
        self.cache.remove(key).await.map_err(CredentialError::Cache)
    }

    // -- Helpers --------------------------------------------------------------

    fn reauth_required(&self) -> CredentialError {
        self.emit(CredentialEvent::ReauthRequired { tenant: self.tenant.app_id.clone() });
        CredentialError::ReauthorizationRequired { tenant: self.tenant.app_id.clone() }
    }

    async fn load<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        let Some(raw) = self.cache.get(key).await.map_err(CredentialError::Cache)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // Unreadable entry (e.g. written by another version): treat as a miss.
                tracing::warn!(key = %key, err = %e, "discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    /// Cache `value` for `ttl_seconds` minus the safety margin.
    async fn store<T: Serialize>(&self, key: &CacheKey, value: &T, ttl_seconds: u64) -> Result<()> {
        let ttl = ttl_seconds.saturating_sub(self.safety_margin.as_secs());
        if ttl == 0 {
            tracing::warn!(key = %key, ttl_seconds, "expires_in within safety margin, not caching");
            return Ok(());
        }
        let raw = serde_json::to_string(value)?;
        self.cache.put(key, raw, Duration::from_secs(ttl)).await.map_err(CredentialError::Cache)
    }

    fn report<T>(&self, stage: Stage, result: &Result<T>) {
        let tenant = self.tenant.app_id.clone();
        match result {
            Ok(_) => {
                self.emit(CredentialEvent::Refreshed { tenant, stage: stage.to_string() });
            }
            Err(e) => {
                tracing::warn!(tenant = %tenant, stage = %stage, err = %e, "credential fetch failed");
                self.emit(CredentialEvent::RefreshFailed {
                    tenant,
                    stage: stage.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    fn emit(&self, event: CredentialEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
#[path = "chain_tests.rs"]
mod tests;
