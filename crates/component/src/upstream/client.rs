// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! reqwest-backed [`Upstream`] implementation.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;

use crate::cache::BoxFuture;
use crate::upstream::{Endpoint, Upstream};

/// HTTP client for the authorization server API.
pub struct HttpUpstream {
    base_url: String,
    client: Client,
}

impl HttpUpstream {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { base_url, client }
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    async fn send(
        &self,
        endpoint: Endpoint,
        access_token: Option<&str>,
        body: serde_json::Value,
    ) -> anyhow::Result<Bytes> {
        let mut req = self.client.post(self.url(endpoint)).json(&body);
        if let Some(token) = access_token {
            req = req.query(&[("component_access_token", token)]);
        }
        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} failed ({status}): {text}", endpoint.path());
        }

        tracing::debug!(endpoint = endpoint.path(), "upstream call completed");
        Ok(resp.bytes().await?)
    }
}

impl Upstream for HttpUpstream {
    fn post_json<'a>(
        &'a self,
        endpoint: Endpoint,
        access_token: Option<&'a str>,
        body: serde_json::Value,
    ) -> BoxFuture<'a, anyhow::Result<Bytes>> {
        Box::pin(self.send(endpoint, access_token, body))
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
