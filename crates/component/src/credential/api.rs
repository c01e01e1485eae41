// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the component API.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CredentialError, Result};

/// `{errcode, errmsg}` header present on every response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiStatus {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
}

/// Decode a response body, surfacing a non-zero `errcode` verbatim.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let status: ApiStatus = serde_json::from_slice(bytes)?;
    if status.errcode != 0 {
        return Err(CredentialError::Upstream { code: status.errcode, msg: status.errmsg });
    }
    Ok(serde_json::from_slice(bytes)?)
}

#[derive(Debug, Serialize)]
pub struct ComponentTokenRequest<'a> {
    pub component_appid: &'a str,
    pub component_appsecret: &'a str,
    pub component_verify_ticket: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ComponentTokenResponse {
    pub component_access_token: String,
    #[serde(default)]
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct PreAuthCodeRequest<'a> {
    pub component_appid: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct PreAuthCodeResponse {
    pub pre_auth_code: String,
    #[serde(default)]
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct QueryAuthRequest<'a> {
    pub component_appid: &'a str,
    pub authorization_code: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct QueryAuthResponse {
    pub authorization_info: AuthorizationInfo,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizationInfo {
    pub authorizer_appid: String,
    pub authorizer_access_token: String,
    #[serde(default)]
    pub expires_in: u64,
    pub authorizer_refresh_token: String,
    #[serde(default)]
    pub func_info: Vec<FuncInfo>,
}

#[derive(Debug, Deserialize)]
pub struct FuncInfo {
    pub funcscope_category: FuncscopeCategory,
}

#[derive(Debug, Deserialize)]
pub struct FuncscopeCategory {
    pub id: u32,
}

#[derive(Debug, Serialize)]
pub struct AuthorizerTokenRequest<'a> {
    pub component_appid: &'a str,
    pub authorizer_appid: &'a str,
    pub authorizer_refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizerTokenResponse {
    pub authorizer_access_token: String,
    #[serde(default)]
    pub expires_in: u64,
    /// May be omitted, in which case the previous refresh token stays valid.
    #[serde(default)]
    pub authorizer_refresh_token: Option<String>,
}
