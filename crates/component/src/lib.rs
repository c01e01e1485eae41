// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wxcomponent: credential lifecycle manager for third-party platform components.

pub mod cache;
pub mod config;
pub mod credential;
pub mod error;
pub mod state;
pub mod test_support;
pub mod transport;
pub mod upstream;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::cache::{MemoryCache, TokenCache};
use crate::config::Config;
use crate::credential::CredentialEvent;
use crate::state::AppState;
use crate::transport::build_router;
use crate::upstream::client::HttpUpstream;
use crate::upstream::Upstream;

/// How often expired cache entries are swept.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Run the service until ctrl-c.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let tenants = config.tenants()?;
    let cache = Arc::new(MemoryCache::new());
    let upstream: Arc<dyn Upstream> =
        Arc::new(HttpUpstream::new(config.api_base.clone(), config.http_timeout()));
    let state = Arc::new(AppState::new(
        config.auth_token.clone(),
        tenants,
        Arc::clone(&cache) as Arc<dyn TokenCache>,
        upstream,
        config.safety_margin(),
    ));

    spawn_event_logger(state.event_tx.subscribe(), shutdown.clone());
    spawn_cache_purger(cache, shutdown.clone());

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
            shutdown.cancel();
        });
    }

    tracing::info!(tenants = state.tenants.len(), auth = state.auth_token.is_some(), "wxcomponent listening on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}

/// Log every credential event until shutdown.
fn spawn_event_logger(
    mut rx: broadcast::Receiver<CredentialEvent>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(CredentialEvent::RefreshFailed { tenant, stage, error }) => {
                    tracing::warn!(tenant = %tenant, stage = %stage, err = %error, "credential refresh failed");
                }
                Ok(CredentialEvent::ReauthRequired { tenant }) => {
                    tracing::warn!(tenant = %tenant, "reauthorization required");
                }
                Ok(e) => tracing::debug!(event = ?e, "credential event"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Sweep expired entries so an idle tenant's tokens do not linger.
fn spawn_cache_purger(cache: Arc<MemoryCache>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let dropped = cache.purge_expired().await;
                    if dropped > 0 {
                        tracing::trace!(dropped, "purged expired cache entries");
                    }
                }
            }
        }
    });
}
