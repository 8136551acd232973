//! OAuth provider contract (spec §4.6): one token-endpoint shape per provider.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{BrokerError, Result};

/// Response shape from an OAuth2 token endpoint, for both `refresh_token`
/// and `authorization_code` grants.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// A provider's fixed OAuth2 endpoint. Built-in providers are named by the
/// manifests that reference them; unknown providers yield `-32013` at
/// credential-resolution time (spec §4.6).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: &'static str,
    pub token_url: &'static str,
}

/// The fixed set of providers this build understands. A deployment adding a
/// new provider adds an entry here; manifests never invent providers.
pub const BUILTIN_PROVIDERS: &[ProviderConfig] = &[
    ProviderConfig { name: "google", token_url: "https://oauth2.googleapis.com/token" },
    ProviderConfig { name: "oura", token_url: "https://api.ouraring.com/oauth/token" },
    ProviderConfig { name: "github", token_url: "https://github.com/login/oauth/access_token" },
];

pub fn lookup(name: &str) -> Option<&'static ProviderConfig> {
    BUILTIN_PROVIDERS.iter().find(|p| p.name == name)
}

pub fn is_supported(name: &str) -> bool {
    lookup(name).is_some()
}

pub fn names() -> Vec<&'static str> {
    BUILTIN_PROVIDERS.iter().map(|p| p.name).collect()
}

/// Thin OAuth2 client shared by the background daemon and on-demand refresh
/// calls. HTTP timeouts mirror the Proxy implementation's (spec §4.4/§5).
pub struct OAuthClient {
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| BrokerError::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self { http })
    }

    pub async fn refresh(
        &self,
        provider: &str,
        refresh_token: &str,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Result<TokenResponse> {
        let cfg = lookup(provider).ok_or(BrokerError::ProviderNotSupported(provider.to_string()))?;
        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        if let Some(id) = client_id {
            form.push(("client_id", id.to_string()));
        }
        if let Some(secret) = client_secret {
            form.push(("client_secret", secret.to_string()));
        }

        let resp = self
            .http
            .post(cfg.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|_| BrokerError::TokenRefreshFailed("request failed".into()))?;

        if !resp.status().is_success() {
            return Err(BrokerError::TokenRefreshFailed("request failed".into()));
        }
        resp.json::<TokenResponse>()
            .await
            .map_err(|_| BrokerError::TokenRefreshFailed("request failed".into()))
    }

    pub async fn exchange_code(
        &self,
        provider: &str,
        code: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse> {
        let cfg = lookup(provider).ok_or(BrokerError::ProviderNotSupported(provider.to_string()))?;
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("client_id", client_id.to_string()),
            ("client_secret", client_secret.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier.to_string()));
        }

        let resp = self
            .http
            .post(cfg.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|_| BrokerError::TokenRefreshFailed("request failed".into()))?;
        if !resp.status().is_success() {
            return Err(BrokerError::TokenRefreshFailed("request failed".into()));
        }
        resp.json::<TokenResponse>()
            .await
            .map_err(|_| BrokerError::TokenRefreshFailed("request failed".into()))
    }
}

/// Parse a space-delimited OAuth `scope` string into a set, as used when
/// folding a refresh response's `scope` field back into a `TokenRecord`.
pub fn parse_scope(scope: Option<&str>, fallback: &BTreeSet<String>) -> BTreeSet<String> {
    match scope {
        Some(s) if !s.is_empty() => s.split_whitespace().map(str::to_string).collect(),
        _ => fallback.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_providers_are_supported() {
        assert!(is_supported("google"));
        assert!(is_supported("oura"));
        assert!(!is_supported("nonexistent-provider"));
    }

    #[test]
    fn parse_scope_falls_back_when_absent() {
        let fallback = BTreeSet::from(["read".to_string()]);
        assert_eq!(parse_scope(None, &fallback), fallback);
        assert_eq!(
            parse_scope(Some("read write"), &fallback),
            BTreeSet::from(["read".to_string(), "write".to_string()])
        );
    }
}
