// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::cache::TokenCache;
use crate::credential::callback::CallbackVerifier;
use crate::credential::chain::CredentialChain;
use crate::credential::session::AuthorizationSession;
use crate::credential::{CredentialEvent, TenantConfig};
use crate::upstream::Upstream;

/// Everything the service holds for one tenant.
pub struct Tenant {
    pub chain: Arc<CredentialChain>,
    pub verifier: CallbackVerifier,
    pub session: AuthorizationSession,
}

impl Tenant {
    fn new(
        config: TenantConfig,
        cache: Arc<dyn TokenCache>,
        upstream: Arc<dyn Upstream>,
        safety_margin: Duration,
        event_tx: broadcast::Sender<CredentialEvent>,
    ) -> Self {
        let chain =
            CredentialChain::new(config.clone(), cache, upstream, safety_margin, event_tx);
        Self {
            verifier: CallbackVerifier::new(config, Arc::clone(&chain)),
            session: AuthorizationSession::new(Arc::clone(&chain)),
            chain,
        }
    }
}

/// Shared service state. The tenant set is fixed at startup.
pub struct AppState {
    pub auth_token: Option<String>,
    pub tenants: BTreeMap<String, Arc<Tenant>>,
    pub event_tx: broadcast::Sender<CredentialEvent>,
}

impl AppState {
    pub fn new(
        auth_token: Option<String>,
        tenants: Vec<TenantConfig>,
        cache: Arc<dyn TokenCache>,
        upstream: Arc<dyn Upstream>,
        safety_margin: Duration,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let tenants = tenants
            .into_iter()
            .map(|config| {
                let id = config.app_id.clone();
                let tenant = Tenant::new(
                    config,
                    Arc::clone(&cache),
                    Arc::clone(&upstream),
                    safety_margin,
                    event_tx.clone(),
                );
                (id, Arc::new(tenant))
            })
            .collect();
        Self { auth_token, tenants, event_tx }
    }

    pub fn tenant(&self, app_id: &str) -> Option<&Arc<Tenant>> {
        self.tenants.get(app_id)
    }
}
