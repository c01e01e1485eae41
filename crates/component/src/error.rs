// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failures surfaced by the credential chain and the callback verifier.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// No verification ticket on file; wait for the next push.
    #[error("no component_verify_ticket on file")]
    MissingTicket,

    /// Non-zero `errcode` returned by the authorization server.
    #[error("upstream error {code}: {msg}")]
    Upstream { code: i64, msg: String },

    /// Push payload failed signature check or decryption.
    #[error("callback decryption failed ({code}): {reason}")]
    Decryption { code: i32, reason: String },

    /// Decrypted push body is not well-formed XML.
    #[error("malformed callback payload: {0}")]
    MalformedPayload(String),

    /// Push addressed to a different component app id.
    #[error("callback for {actual} does not match tenant {expected}")]
    TenantMismatch { expected: String, actual: String },

    /// No refresh token and no unused authorization code; the user must consent again.
    #[error("reauthorization required for {tenant}")]
    ReauthorizationRequired { tenant: String },

    #[error(transparent)]
    Transport(anyhow::Error),

    #[error("cache: {0:#}")]
    Cache(anyhow::Error),

    /// Upstream replied with a body that does not decode.
    #[error("undecodable upstream response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CredentialError {
    /// The error code used on the HTTP API.
    pub fn api_error(&self) -> ApiError {
        match self {
            Self::MissingTicket => ApiError::NotReady,
            Self::Upstream { .. } | Self::Transport(_) | Self::Decode(_) => ApiError::UpstreamError,
            Self::Decryption { .. } | Self::MalformedPayload(_) | Self::TenantMismatch { .. } => {
                ApiError::BadRequest
            }
            Self::ReauthorizationRequired { .. } => ApiError::ReauthRequired,
            Self::Cache(_) => ApiError::Internal,
        }
    }

    /// Whether a rejected push should still be acknowledged to stop redelivery.
    pub fn acknowledge_push(&self) -> bool {
        matches!(self, Self::Decryption { .. } | Self::TenantMismatch { .. })
    }
}

pub type Result<T, E = CredentialError> = std::result::Result<T, E>;

/// Error codes for the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    Unauthorized,
    BadRequest,
    TenantNotFound,
    NotReady,
    ReauthRequired,
    UpstreamError,
    Internal,
}

impl ApiError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::TenantNotFound => 404,
            Self::NotReady => 503,
            Self::ReauthRequired => 409,
            Self::UpstreamError => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::TenantNotFound => "TENANT_NOT_FOUND",
            Self::NotReady => "NOT_READY",
            Self::ReauthRequired => "REAUTH_REQUIRED",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
