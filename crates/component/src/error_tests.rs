// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    missing_ticket = { CredentialError::MissingTicket, ApiError::NotReady, 503 },
    upstream = { CredentialError::Upstream { code: 40001, msg: "invalid credential".into() }, ApiError::UpstreamError, 502 },
    reauth = { CredentialError::ReauthorizationRequired { tenant: "wx123".into() }, ApiError::ReauthRequired, 409 },
    malformed = { CredentialError::MalformedPayload("eof".into()), ApiError::BadRequest, 400 },
    cache = { CredentialError::Cache(anyhow::anyhow!("down")), ApiError::Internal, 500 },
)]
fn maps_to_api_error(err: CredentialError, code: ApiError, status: u16) {
    assert_eq!(err.api_error(), code);
    assert_eq!(err.api_error().http_status(), status);
}

#[test]
fn upstream_error_display_is_verbatim() {
    let err = CredentialError::Upstream { code: 40001, msg: "invalid credential".into() };
    assert_eq!(err.to_string(), "upstream error 40001: invalid credential");
}

#[test]
fn transport_error_is_transparent() {
    let err = CredentialError::Transport(anyhow::anyhow!("connection refused"));
    assert_eq!(err.to_string(), "connection refused");
}

#[test]
fn only_authenticated_rejections_are_acknowledged() {
    assert!(CredentialError::Decryption { code: -40001, reason: "sig".into() }.acknowledge_push());
    assert!(CredentialError::TenantMismatch { expected: "a".into(), actual: "b".into() }
        .acknowledge_push());
    assert!(!CredentialError::MalformedPayload("bad".into()).acknowledge_push());
    assert!(!CredentialError::MissingTicket.acknowledge_push());
}

#[test]
fn error_body_uses_code_string() {
    let body = ApiError::TenantNotFound.to_error_body("no such tenant");
    assert_eq!(body.code, "TENANT_NOT_FOUND");
    assert_eq!(body.message, "no such tenant");
}
