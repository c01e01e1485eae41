// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport: push endpoint and management API.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Tenants
        .route("/api/v1/tenants", get(http::list_tenants))
        // Platform pushes (no auth, signed payload)
        .route("/api/v1/tenants/{app_id}/notify", post(http::notify))
        // Delegation
        .route("/api/v1/tenants/{app_id}/delegation", post(http::begin_delegation))
        .route("/api/v1/tenants/{app_id}/delegation/callback", get(http::delegation_callback))
        // Authorizer token
        .route("/api/v1/tenants/{app_id}/authorizer/token", get(http::authorizer_token))
        .route("/api/v1/tenants/{app_id}/authorizer/refresh", post(http::authorizer_refresh))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
