// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn delegation_url_exact_shape() {
    let url = build_delegation_url("wx123", "PAC1", "https://x.test/cb");
    assert_eq!(
        url,
        "https://mp.weixin.qq.com/safe/bindcomponent?action=bindcomponent\
         &auth_type=3&no_scan=1&component_appid=wx123&pre_auth_code=PAC1\
         &redirect_uri=https%3A%2F%2Fx.test%2Fcb#wechat_redirect"
    );
}

#[test]
fn redirect_is_encoded_exactly_once() {
    let url = build_delegation_url("wx123", "PAC1", "https://x.test/cb?a=1&b=%20");
    assert!(url.contains("redirect_uri=https%3A%2F%2Fx.test%2Fcb%3Fa%3D1%26b%3D%2520#"));
    assert!(!url.contains("%253A"));
}

#[test]
fn delegation_url_params_in_order() {
    let url = build_delegation_url("wx123", "PAC1", "https://x.test/cb");
    let q = url.split('?').nth(1).and_then(|q| q.split('#').next()).unwrap_or_default();
    let keys: Vec<&str> = q.split('&').filter_map(|p| p.split('=').next()).collect();
    assert_eq!(
        keys,
        ["action", "auth_type", "no_scan", "component_appid", "pre_auth_code", "redirect_uri"]
    );
    assert!(url.ends_with("#wechat_redirect"));
}

#[test]
fn web_oauth_url_includes_component() {
    let url = build_web_oauth_url("wx123", "wxAUTH", "https://x.test/u", "snsapi_base", "st 1");
    assert_eq!(
        url,
        "https://open.weixin.qq.com/connect/oauth2/authorize?appid=wxAUTH\
         &redirect_uri=https%3A%2F%2Fx.test%2Fu&response_type=code&scope=snsapi_base\
         &state=st+1&component_appid=wx123#wechat_redirect"
    );
}

#[yare::parameterized(
    unreserved = { "aZ09-_.~", "aZ09-_.~" },
    space = { "a b", "a+b" },
    at_signs = { "preauthcode@@@x", "preauthcode%40%40%40x" },
    utf8 = { "é", "%C3%A9" },
)]
fn encodes_like_query_escape(input: &str, expected: &str) {
    assert_eq!(urlencoding(input), expected);
}
