// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

use crate::credential::crypto::AES_KEY_LEN;
use crate::credential::TenantConfig;
use crate::upstream::DEFAULT_API_BASE;

/// Credential lifecycle service for third-party platform components.
#[derive(Debug, Clone, Parser)]
#[command(name = "wxcomponent", version, about)]
pub struct Config {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "WXC_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9810, env = "WXC_PORT")]
    pub port: u16,

    /// Bearer token for the management API. If unset, auth is disabled.
    #[arg(long, env = "WXC_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Path to a JSON file listing tenants (`{"tenants": [...]}`).
    #[arg(long, env = "WXC_TENANT_CONFIG")]
    pub tenant_config: Option<PathBuf>,

    /// Inline tenant: component app id.
    #[arg(long, env = "WXC_COMPONENT_APPID")]
    pub component_appid: Option<String>,

    /// Inline tenant: component app secret.
    #[arg(long, env = "WXC_COMPONENT_SECRET", hide_env_values = true)]
    pub component_secret: Option<String>,

    /// Inline tenant: push message token.
    #[arg(long, env = "WXC_COMPONENT_TOKEN", hide_env_values = true)]
    pub component_token: Option<String>,

    /// Inline tenant: 43-character EncodingAESKey.
    #[arg(long, env = "WXC_ENCODING_AES_KEY", hide_env_values = true)]
    pub encoding_aes_key: Option<String>,

    /// Authorization server API base URL.
    #[arg(long, default_value = DEFAULT_API_BASE, env = "WXC_API_BASE")]
    pub api_base: String,

    /// Timeout for each upstream request, in seconds.
    #[arg(long, default_value_t = 30, env = "WXC_HTTP_TIMEOUT_SECS")]
    pub http_timeout_secs: u64,

    /// Seconds subtracted from every upstream `expires_in` before caching.
    #[arg(long, default_value_t = 1500, env = "WXC_SAFETY_MARGIN_SECS")]
    pub safety_margin_secs: u64,

    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    #[arg(long, env = "WXC_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (json or text).
    #[arg(long, env = "WXC_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

/// On-disk tenant list.
#[derive(Debug, Deserialize)]
struct TenantFile {
    tenants: Vec<TenantConfig>,
}

impl Config {
    /// Check that the configuration describes at least one usable tenant.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid log format: {} (expected json or text)", self.log_format);
        }

        let tenants = self.tenants()?;
        if tenants.is_empty() {
            anyhow::bail!("no tenants configured: pass --tenant-config or --component-appid");
        }

        let mut seen = HashSet::new();
        for t in &tenants {
            if t.app_id.is_empty() {
                anyhow::bail!("tenant is missing its app id");
            }
            for (name, value) in [
                ("secret", &t.secret),
                ("token", &t.token),
                ("encoding_aes_key", &t.encoding_aes_key),
            ] {
                if value.is_empty() {
                    anyhow::bail!("tenant {} is missing {name}", t.app_id);
                }
            }
            if t.encoding_aes_key.len() != AES_KEY_LEN {
                anyhow::bail!(
                    "tenant {}: encoding_aes_key must be {AES_KEY_LEN} characters",
                    t.app_id
                );
            }
            if !seen.insert(t.app_id.as_str()) {
                anyhow::bail!("duplicate tenant: {}", t.app_id);
            }
        }
        Ok(())
    }

    /// All configured tenants: the file's entries, then the inline one.
    pub fn tenants(&self) -> anyhow::Result<Vec<TenantConfig>> {
        let mut tenants = match self.tenant_config {
            Some(ref path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str::<TenantFile>(&contents)
                    .with_context(|| format!("parsing {}", path.display()))?
                    .tenants
            }
            None => vec![],
        };

        if let Some(ref app_id) = self.component_appid {
            tenants.push(TenantConfig {
                app_id: app_id.clone(),
                secret: self.component_secret.clone().unwrap_or_default(),
                token: self.component_token.clone().unwrap_or_default(),
                encoding_aes_key: self.encoding_aes_key.clone().unwrap_or_default(),
            });
        }
        Ok(tenants)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Build a minimal `Config` for tests (port 0, one inline tenant `wx123`).
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            auth_token: None,
            tenant_config: None,
            component_appid: Some("wx123".into()),
            component_secret: Some("sec".into()),
            component_token: Some(crate::test_support::TEST_PUSH_TOKEN.into()),
            encoding_aes_key: Some(crate::test_support::TEST_AES_KEY.into()),
            api_base: DEFAULT_API_BASE.into(),
            http_timeout_secs: 30,
            safety_margin_secs: 1500,
            log_level: "debug".into(),
            log_format: "text".into(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
