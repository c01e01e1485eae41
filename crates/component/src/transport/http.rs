// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::credential::callback::parse_envelope;
use crate::credential::{AuthorizerTokenPair, ChainStatus};
use crate::error::{ApiError, CredentialError};
use crate::state::{AppState, Tenant};

/// Body the platform expects for an accepted push.
const PUSH_ACK: &str = "success";

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub tenant_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct NotifyQuery {
    pub timestamp: String,
    pub nonce: String,
    pub msg_signature: String,
}

#[derive(Debug, Deserialize)]
pub struct DelegationRequest {
    pub redirect_uri: String,
}

#[derive(Debug, Serialize)]
pub struct DelegationResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub auth_code: String,
    #[serde(default)]
    pub expires_in: u64,
}

/// Authorizer token as exposed over HTTP. The refresh token stays inside.
#[derive(Debug, Serialize)]
pub struct AuthorizerTokenResponse {
    pub authorizer_appid: String,
    pub access_token: String,
    pub expires_in: u64,
    pub func_info: Vec<u32>,
}

impl From<AuthorizerTokenPair> for AuthorizerTokenResponse {
    fn from(pair: AuthorizerTokenPair) -> Self {
        Self {
            authorizer_appid: pair.authorizer_appid,
            access_token: pair.access_token,
            expires_in: pair.ttl_seconds,
            func_info: pair.func_info,
        }
    }
}

// -- Helpers ------------------------------------------------------------------

fn find_tenant(s: &AppState, app_id: &str) -> Result<Arc<Tenant>, Box<Response>> {
    s.tenant(app_id).cloned().ok_or_else(|| {
        Box::new(
            ApiError::TenantNotFound
                .to_http_response(format!("unknown tenant: {app_id}"))
                .into_response(),
        )
    })
}

fn error_response(e: &CredentialError) -> Response {
    e.api_error().to_http_response(e.to_string()).into_response()
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse { status: "running".to_owned(), tenant_count: s.tenants.len() })
}

/// `GET /api/v1/tenants`
pub async fn list_tenants(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let list: Vec<ChainStatus> = s.tenants.values().map(|t| t.chain.status()).collect();
    Json(list)
}

/// `POST /api/v1/tenants/{app_id}/notify`: encrypted platform push.
///
/// Authentication and tenant failures are still acknowledged so the
/// platform does not keep redelivering; only malformed bodies get a 400.
pub async fn notify(
    State(s): State<Arc<AppState>>,
    Path(app_id): Path<String>,
    Query(q): Query<NotifyQuery>,
    body: String,
) -> Response {
    let tenant = match find_tenant(&s, &app_id) {
        Ok(t) => t,
        Err(resp) => return *resp,
    };
    let envelope = match parse_envelope(&body) {
        Ok(env) => env,
        Err(e) => {
            tracing::warn!(tenant = %app_id, err = %e, "rejecting malformed push");
            return error_response(&e);
        }
    };

    match tenant.verifier.verify(&envelope.encrypt, &q.msg_signature, &q.timestamp, &q.nonce).await {
        Ok(n) => {
            tracing::debug!(tenant = %app_id, event = ?n.event, "push accepted");
            PUSH_ACK.into_response()
        }
        Err(e) if e.acknowledge_push() => {
            tracing::warn!(tenant = %app_id, err = %e, "push rejected");
            PUSH_ACK.into_response()
        }
        Err(e) => {
            tracing::warn!(tenant = %app_id, err = %e, "push rejected");
            error_response(&e)
        }
    }
}

/// `POST /api/v1/tenants/{app_id}/delegation`: start a delegation.
pub async fn begin_delegation(
    State(s): State<Arc<AppState>>,
    Path(app_id): Path<String>,
    Json(req): Json<DelegationRequest>,
) -> Response {
    let tenant = match find_tenant(&s, &app_id) {
        Ok(t) => t,
        Err(resp) => return *resp,
    };
    if req.redirect_uri.is_empty() {
        return ApiError::BadRequest.to_http_response("redirect_uri is required").into_response();
    }
    match tenant.session.begin_delegation(&req.redirect_uri).await {
        Ok(url) => Json(DelegationResponse { url }).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/v1/tenants/{app_id}/delegation/callback`: consent redirect.
pub async fn delegation_callback(
    State(s): State<Arc<AppState>>,
    Path(app_id): Path<String>,
    Query(q): Query<CallbackQuery>,
) -> Response {
    let tenant = match find_tenant(&s, &app_id) {
        Ok(t) => t,
        Err(resp) => return *resp,
    };
    match tenant.session.complete_delegation(&q.auth_code, q.expires_in).await {
        Ok(done) => Json(done).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/v1/tenants/{app_id}/authorizer/token`
pub async fn authorizer_token(
    State(s): State<Arc<AppState>>,
    Path(app_id): Path<String>,
) -> Response {
    let tenant = match find_tenant(&s, &app_id) {
        Ok(t) => t,
        Err(resp) => return *resp,
    };
    match tenant.chain.authorizer_access_token().await {
        Ok(pair) => Json(AuthorizerTokenResponse::from(pair)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/v1/tenants/{app_id}/authorizer/refresh`
pub async fn authorizer_refresh(
    State(s): State<Arc<AppState>>,
    Path(app_id): Path<String>,
) -> Response {
    let tenant = match find_tenant(&s, &app_id) {
        Ok(t) => t,
        Err(resp) => return *resp,
    };
    match tenant.chain.refresh_authorizer_token().await {
        Ok(pair) => Json(AuthorizerTokenResponse::from(pair)).into_response(),
        Err(e) => error_response(&e),
    }
}
