// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound push verification: authenticate, decrypt, check the tenant, then
//! feed the result to the credential chain.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::credential::chain::CredentialChain;
use crate::credential::crypto::MsgCrypt;
use crate::credential::TenantConfig;
use crate::error::{CredentialError, Result};

/// Outer XML body of a push request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "xml")]
pub struct EncryptedEnvelope {
    #[serde(rename = "AppId", default)]
    pub app_id: Option<String>,
    #[serde(rename = "Encrypt")]
    pub encrypt: String,
}

/// Parse the request body of a push. Missing `Encrypt` is malformed.
pub fn parse_envelope(body: &str) -> Result<EncryptedEnvelope> {
    let envelope: EncryptedEnvelope = quick_xml::de::from_str(body)
        .map_err(|e| CredentialError::MalformedPayload(e.to_string()))?;
    if envelope.encrypt.trim().is_empty() {
        return Err(CredentialError::MalformedPayload("empty Encrypt element".to_owned()));
    }
    Ok(envelope)
}

/// Decrypted push body.
#[derive(Debug, Deserialize)]
#[serde(rename = "xml")]
struct PushBody {
    #[serde(rename = "AppId", default)]
    app_id: String,
    #[serde(rename = "CreateTime", default)]
    create_time: i64,
    #[serde(rename = "InfoType", default)]
    info_type: String,
    #[serde(rename = "ComponentVerifyTicket", default)]
    component_verify_ticket: Option<String>,
    #[serde(rename = "AuthorizerAppid", default)]
    authorizer_appid: Option<String>,
    #[serde(rename = "AuthorizationCode", default)]
    authorization_code: Option<String>,
    #[serde(rename = "AuthorizationCodeExpiredTime", default)]
    authorization_code_expired_time: Option<i64>,
}

/// What a verified push carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    VerifyTicket { ticket: String },
    Authorized { authorizer_appid: String, code: String, ttl_seconds: u64 },
    UpdateAuthorized { authorizer_appid: String, code: String, ttl_seconds: u64 },
    Unauthorized { authorizer_appid: String },
    Other { info_type: String },
}

/// A verified, tenant-checked push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub source_id: String,
    pub create_time: i64,
    pub event: PushEvent,
}

impl Notification {
    pub fn renewed_ticket(&self) -> Option<&str> {
        match &self.event {
            PushEvent::VerifyTicket { ticket } => Some(ticket),
            _ => None,
        }
    }
}

impl PushBody {
    fn into_notification(self) -> Result<Notification> {
        let required = |field: Option<String>, name: &str| {
            field
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CredentialError::MalformedPayload(format!("missing {name}")))
        };
        let code_ttl = |expired: Option<i64>| {
            expired.map_or(0, |at| u64::try_from(at.saturating_sub(self.create_time)).unwrap_or(0))
        };

        let event = match self.info_type.as_str() {
            "component_verify_ticket" => PushEvent::VerifyTicket {
                ticket: required(self.component_verify_ticket, "ComponentVerifyTicket")?,
            },
            "authorized" => PushEvent::Authorized {
                ttl_seconds: code_ttl(self.authorization_code_expired_time),
                authorizer_appid: required(self.authorizer_appid, "AuthorizerAppid")?,
                code: required(self.authorization_code, "AuthorizationCode")?,
            },
            "updateauthorized" => PushEvent::UpdateAuthorized {
                ttl_seconds: code_ttl(self.authorization_code_expired_time),
                authorizer_appid: required(self.authorizer_appid, "AuthorizerAppid")?,
                code: required(self.authorization_code, "AuthorizationCode")?,
            },
            "unauthorized" => PushEvent::Unauthorized {
                authorizer_appid: required(self.authorizer_appid, "AuthorizerAppid")?,
            },
            "" => return Err(CredentialError::MalformedPayload("missing InfoType".to_owned())),
            other => PushEvent::Other { info_type: other.to_owned() },
        };
        Ok(Notification { source_id: self.app_id, create_time: self.create_time, event })
    }
}

/// Verifies pushes for one tenant and applies them to its chain.
pub struct CallbackVerifier {
    tenant: TenantConfig,
    chain: Arc<CredentialChain>,
    /// Built on first push, reused afterwards.
    crypt: OnceCell<MsgCrypt>,
}

impl CallbackVerifier {
    pub fn new(tenant: TenantConfig, chain: Arc<CredentialChain>) -> Self {
        Self { tenant, chain, crypt: OnceCell::new() }
    }

    async fn crypt(&self) -> Result<&MsgCrypt> {
        let crypt = self
            .crypt
            .get_or_try_init(|| async {
                MsgCrypt::new(&self.tenant.token, &self.tenant.encoding_aes_key, &self.tenant.app_id)
            })
            .await?;
        Ok(crypt)
    }

    /// Authenticate and decrypt one push, then apply it.
    ///
    /// Nothing is applied unless the decrypted `AppId` matches this tenant.
    /// A ticket push also warms the platform token; failure there is logged
    /// and does not fail verification.
    pub async fn verify(
        &self,
        encrypted: &str,
        signature: &str,
        timestamp: &str,
        nonce: &str,
    ) -> Result<Notification> {
        let crypt = self.crypt().await?;
        let xml = crypt.decrypt(signature, timestamp, nonce, encrypted)?;
        let body: PushBody = quick_xml::de::from_str(&xml)
            .map_err(|e| CredentialError::MalformedPayload(e.to_string()))?;

        if body.app_id != self.tenant.app_id {
            return Err(CredentialError::TenantMismatch {
                expected: self.tenant.app_id.clone(),
                actual: body.app_id,
            });
        }
        let notification = body.into_notification()?;
        self.apply(&notification).await;
        Ok(notification)
    }

    async fn apply(&self, notification: &Notification) {
        match &notification.event {
            PushEvent::VerifyTicket { ticket } => {
                self.chain.apply_ticket(ticket.clone());
                if let Err(e) = self.chain.platform_access_token().await {
                    tracing::warn!(tenant = %self.tenant.app_id, err = %e, "platform token refresh after ticket push failed");
                }
            }
            PushEvent::Authorized { authorizer_appid, code, ttl_seconds }
            | PushEvent::UpdateAuthorized { authorizer_appid, code, ttl_seconds } => {
                tracing::info!(tenant = %self.tenant.app_id, authorizer = %authorizer_appid, "authorization pushed");
                self.chain.record_authorization_code(code.clone(), *ttl_seconds);
            }
            PushEvent::Unauthorized { authorizer_appid } => {
                if let Err(e) = self.chain.revoke_authorization(authorizer_appid).await {
                    tracing::warn!(tenant = %self.tenant.app_id, err = %e, "revocation failed");
                }
            }
            PushEvent::Other { info_type } => {
                tracing::debug!(tenant = %self.tenant.app_id, info_type = %info_type, "ignoring push");
            }
        }
    }
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
