// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delegation attempts: pre-auth code out, authorization code back in.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use crate::credential::chain::CredentialChain;
use crate::error::{CredentialError, Result};

/// The attempt currently waiting on the consent redirect.
#[derive(Debug, Clone)]
struct PendingDelegation {
    redirect_uri: String,
    started: Instant,
}

/// Raw code and expiry from a completed consent redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedDelegation {
    pub authorization_code: String,
    pub expires_in: u64,
}

/// Correlates one tenant's delegation attempts. Nothing is persisted; the
/// authorization code goes straight to the chain.
pub struct AuthorizationSession {
    chain: Arc<CredentialChain>,
    pending: Mutex<Option<PendingDelegation>>,
}

impl AuthorizationSession {
    pub fn new(chain: Arc<CredentialChain>) -> Self {
        Self { chain, pending: Mutex::new(None) }
    }

    /// Request a pre-auth code and return the consent page URL.
    pub async fn begin_delegation(&self, redirect_uri: &str) -> Result<String> {
        let code = self.chain.pre_auth_code().await?;
        let url = self.chain.delegation_url(&code.value, redirect_uri);
        let previous = self.pending.lock().replace(PendingDelegation {
            redirect_uri: redirect_uri.to_owned(),
            started: Instant::now(),
        });
        if previous.is_some() {
            tracing::debug!(tenant = %self.chain.app_id(), "superseding unfinished delegation");
        }
        Ok(url)
    }

    /// Record the code from the consent redirect and exchange it right away.
    ///
    /// Exchange failures propagate. The token pair itself is read later
    /// through the chain.
    pub async fn complete_delegation(
        &self,
        auth_code: &str,
        expires_in: u64,
    ) -> Result<CompletedDelegation> {
        if auth_code.is_empty() {
            return Err(CredentialError::MalformedPayload("missing auth_code".to_owned()));
        }
        match self.pending.lock().take() {
            Some(p) => tracing::info!(
                tenant = %self.chain.app_id(),
                redirect_uri = %p.redirect_uri,
                elapsed_ms = p.started.elapsed().as_millis() as u64,
                "delegation completed"
            ),
            None => tracing::info!(tenant = %self.chain.app_id(), "delegation completed without a pending attempt"),
        }

        self.chain.record_authorization_code(auth_code, expires_in);
        self.chain.exchange_authorization_code(auth_code).await?;
        Ok(CompletedDelegation { authorization_code: auth_code.to_owned(), expires_in })
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
