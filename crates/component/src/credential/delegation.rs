// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consent-page URL builders. Pure string construction, no network.

/// Component consent page (account binding).
pub const DELEGATION_BASE_URL: &str = "https://mp.weixin.qq.com/safe/bindcomponent";

/// Web authorization page used on behalf of an authorized account.
pub const WEB_OAUTH_BASE_URL: &str = "https://open.weixin.qq.com/connect/oauth2/authorize";

/// Fragment the consent pages require at the end of the URL.
const REDIRECT_FRAGMENT: &str = "#wechat_redirect";

/// Build the URL that sends an account owner to the consent page.
///
/// `auth_type=3` offers both account kinds; `no_scan=1` shows the
/// confirmation page instead of a QR code.
pub fn build_delegation_url(component_appid: &str, pre_auth_code: &str, redirect_uri: &str) -> String {
    format!(
        "{DELEGATION_BASE_URL}?action=bindcomponent\
         &auth_type=3\
         &no_scan=1\
         &component_appid={component_appid}\
         &pre_auth_code={pre_auth_code}\
         &redirect_uri={redirect_uri}\
         {REDIRECT_FRAGMENT}",
        component_appid = urlencoding(component_appid),
        pre_auth_code = urlencoding(pre_auth_code),
        redirect_uri = urlencoding(redirect_uri),
    )
}

/// Build the web authorization URL for an authorized account's end users.
pub fn build_web_oauth_url(
    component_appid: &str,
    authorizer_appid: &str,
    redirect_uri: &str,
    scope: &str,
    state: &str,
) -> String {
    format!(
        "{WEB_OAUTH_BASE_URL}?appid={authorizer_appid}\
         &redirect_uri={redirect_uri}\
         &response_type=code\
         &scope={scope}\
         &state={state}\
         &component_appid={component_appid}\
         {REDIRECT_FRAGMENT}",
        authorizer_appid = urlencoding(authorizer_appid),
        redirect_uri = urlencoding(redirect_uri),
        scope = urlencoding(scope),
        state = urlencoding(state),
        component_appid = urlencoding(component_appid),
    )
}

/// Form-style encoding for URL query parameters (spaces as `+`).
pub fn urlencoding(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push('+'),
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0xf) as usize]));
            }
        }
    }
    out
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

#[cfg(test)]
#[path = "delegation_tests.rs"]
mod tests;
