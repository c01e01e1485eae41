// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound calls to the authorization server.

pub mod client;

use bytes::Bytes;

use crate::cache::BoxFuture;

/// Default authorization server API base.
pub const DEFAULT_API_BASE: &str = "https://api.weixin.qq.com";

/// Authorization server endpoints used by the credential chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `api_component_token`: ticket -> platform access token.
    ComponentToken,
    /// `api_create_preauthcode`: platform token -> pre-auth code.
    PreAuthCode,
    /// `api_query_auth`: authorization code -> authorizer token pair.
    QueryAuth,
    /// `api_authorizer_token`: refresh token -> new authorizer token pair.
    AuthorizerToken,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Self::ComponentToken => "/cgi-bin/component/api_component_token",
            Self::PreAuthCode => "/cgi-bin/component/api_create_preauthcode",
            Self::QueryAuth => "/cgi-bin/component/api_query_auth",
            Self::AuthorizerToken => "/cgi-bin/component/api_authorizer_token",
        }
    }
}

/// Transport port: POST a JSON body and return the raw response bytes.
///
/// When `access_token` is set it travels as the `component_access_token`
/// query parameter. Network failures come back as `Err` and are never
/// retried by the caller; retry policy belongs to the implementation.
pub trait Upstream: Send + Sync + 'static {
    fn post_json<'a>(
        &'a self,
        endpoint: Endpoint,
        access_token: Option<&'a str>,
        body: serde_json::Value,
    ) -> BoxFuture<'a, anyhow::Result<Bytes>>;
}
