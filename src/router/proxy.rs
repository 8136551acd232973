//! HTTP Proxy dispatch (spec §4.4 "Proxy (HTTP)").

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine;
use serde_json::Value;

use crate::error::{BrokerError, Result};
use crate::manifest::{HttpMethod, PaginationSpec, ProxyAuth, ProxyAuthStrategy, ProxyBinding};

use super::interpolate::{self, CredentialMap};

pub struct ProxyDispatcher {
    http: reqwest::Client,
}

impl ProxyDispatcher {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| BrokerError::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self { http })
    }

    /// `credentials` is the already-loaded, already-refreshed set of tokens
    /// keyed by manifest `credentialId` (see `router/mod.rs::load_credentials`);
    /// this dispatcher never talks to the Auth Broker itself.
    pub async fn dispatch(
        &self,
        base_url: &str,
        proxy_auth: &ProxyAuth,
        binding: &ProxyBinding,
        params: &Value,
        credentials: &CredentialMap,
        max_results: Option<u64>,
    ) -> Result<Value> {
        let path = interpolate::interpolate_bare(&binding.path, params)?;
        let url = format!("{}{}", base_url.trim_end_matches('/'), path);

        let query = interpolate::interpolate_map_bare(&binding.query, params, true)?;
        let mut headers = interpolate::interpolate_map_bare(&binding.headers, params, false)?;
        let mut query_params: Vec<(String, String)> = query.into_iter().collect();

        apply_auth(proxy_auth, credentials, &mut headers, &mut query_params)?;

        let consumed = consumed_param_names(binding);
        let body = build_body(binding, params, &consumed)?;

        let response = self
            .send(binding.method, &url, &query_params, &headers, body.as_ref())
            .await?;
        let first_page = self.parse_success_body(response).await?;

        match &binding.pagination {
            Some(pagination) => {
                self.paginate(binding.method, &url, &query_params, &headers, pagination, first_page, max_results)
                    .await
            }
            None => Ok(extract_response_path(&first_page, binding.response_path.as_deref())),
        }
    }

    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        query: &[(String, String)],
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
    ) -> Result<reqwest::Response> {
        let mut req = match method {
            HttpMethod::Get => self.http.get(url),
            HttpMethod::Post => self.http.post(url),
            HttpMethod::Put => self.http.put(url),
            HttpMethod::Patch => self.http.patch(url),
            HttpMethod::Delete => self.http.delete(url),
        };
        req = req.query(query);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        if let Some(b) = body {
            req = req.json(b);
        }
        req.send()
            .await
            .map_err(|e| BrokerError::Upstream(format!("request failed: {e}")))
    }

    /// Status-check and parse a response body, shared by the first request
    /// and every follow-up page fetch (spec §4.4 "Response").
    async fn parse_success_body(&self, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(BrokerError::Upstream("rate limited".into()));
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(|e| e.get("message").or_else(|| e.get("code")))
                .and_then(Value::as_str)
                .unwrap_or("upstream request failed");
            return Err(BrokerError::Upstream(message.to_string()));
        }
        Ok(body)
    }

    /// Follow `nextPageToken`-style pagination (spec §4.4): concatenate the
    /// declared/conventional items field across pages, re-issuing the
    /// request with the prior page's token echoed back as a `pageToken`
    /// query parameter, until a page carries no next token, `max_results`
    /// is reached, or the items field goes missing.
    async fn paginate(
        &self,
        method: HttpMethod,
        url: &str,
        base_query: &[(String, String)],
        headers: &BTreeMap<String, String>,
        pagination: &PaginationSpec,
        first_page: Value,
        max_results: Option<u64>,
    ) -> Result<Value> {
        let Some(field) = pagination
            .items_field
            .clone()
            .or_else(|| detect_items_field(&first_page))
        else {
            return Ok(first_page);
        };

        let mut items: Vec<Value> = Vec::new();
        let mut page = first_page;
        loop {
            let page_items = page.get(&field).and_then(Value::as_array).cloned().unwrap_or_default();
            items.extend(page_items);
            if let Some(limit) = max_results {
                if items.len() as u64 >= limit {
                    items.truncate(limit as usize);
                    break;
                }
            }

            let Some(token) = page.get(&pagination.next_page_field).and_then(Value::as_str) else {
                break;
            };
            let mut next_query = base_query.to_vec();
            next_query.push(("pageToken".to_string(), token.to_string()));

            let response = self.send(method, url, &next_query, headers, None).await?;
            page = self.parse_success_body(response).await?;
        }
        Ok(serde_json::json!({ field: items }))
    }
}

fn detect_items_field(body: &Value) -> Option<String> {
    for candidate in ["items", "messages", "events", "data"] {
        if body.get(candidate).and_then(Value::as_array).is_some() {
            return Some(candidate.to_string());
        }
    }
    None
}

fn extract_response_path(body: &Value, response_path: Option<&str>) -> Value {
    match response_path {
        None | Some("$") => body.clone(),
        Some(path) => {
            let mut current = body;
            for segment in path.split('.') {
                match current.get(segment) {
                    Some(v) => current = v,
                    None => return Value::Null,
                }
            }
            current.clone()
        }
    }
}

fn consumed_param_names(binding: &ProxyBinding) -> Vec<String> {
    let mut names = interpolate::bare_placeholder_names(&binding.path);
    for template in binding.query.values() {
        names.extend(interpolate::bare_placeholder_names(template));
    }
    names
}

fn build_body(binding: &ProxyBinding, params: &Value, consumed: &[String]) -> Result<Option<Value>> {
    if !matches!(binding.method, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch) {
        return Ok(None);
    }
    if let Some(template) = &binding.body {
        return Ok(Some(template.clone()));
    }
    let Value::Object(map) = params else {
        return Ok(None);
    };
    let mut remainder = serde_json::Map::new();
    for (k, v) in map {
        if !consumed.contains(k) {
            remainder.insert(k.clone(), v.clone());
        }
    }
    Ok(Some(Value::Object(remainder)))
}

fn credential_field(credentials: &CredentialMap, proxy_auth: &ProxyAuth) -> Result<String> {
    credentials
        .get(&proxy_auth.credential_id)
        .and_then(|fields| fields.get(&proxy_auth.token_field))
        .cloned()
        .ok_or_else(|| {
            BrokerError::InvalidParams(format!(
                "credential '{}' missing field '{}'",
                proxy_auth.credential_id, proxy_auth.token_field
            ))
        })
}

fn apply_auth(
    proxy_auth: &ProxyAuth,
    credentials: &CredentialMap,
    headers: &mut BTreeMap<String, String>,
    query: &mut Vec<(String, String)>,
) -> Result<()> {
    match proxy_auth.strategy {
        ProxyAuthStrategy::Bearer => {
            let token = credential_field(credentials, proxy_auth)?;
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        ProxyAuthStrategy::ApiKeyHeader => {
            let token = credential_field(credentials, proxy_auth)?;
            let name = proxy_auth.header_name.clone().unwrap_or_else(|| "X-Api-Key".to_string());
            headers.insert(name, token);
        }
        ProxyAuthStrategy::ApiKeyQuery => {
            let token = credential_field(credentials, proxy_auth)?;
            let name = proxy_auth.header_name.clone().unwrap_or_else(|| "api_key".to_string());
            query.push((name, token));
        }
        ProxyAuthStrategy::Basic => {
            let user = credential_field(credentials, proxy_auth)?;
            let pass = credentials
                .get(&proxy_auth.credential_id)
                .and_then(|f| f.get("password"))
                .cloned()
                .unwrap_or_default();
            let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
            headers.insert("Authorization".to_string(), format!("Basic {encoded}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_response_path_root() {
        let body = serde_json::json!({"a": {"b": 1}});
        assert_eq!(extract_response_path(&body, None), body);
        assert_eq!(extract_response_path(&body, Some("$")), body);
    }

    #[test]
    fn extract_response_path_nested() {
        let body = serde_json::json!({"a": {"b": 42}});
        assert_eq!(extract_response_path(&body, Some("a.b")), serde_json::json!(42));
    }

    #[test]
    fn detect_items_field_prefers_first_match() {
        let body = serde_json::json!({"messages": [1, 2]});
        assert_eq!(detect_items_field(&body), Some("messages".to_string()));
    }

    #[test]
    fn detect_items_field_skips_non_array_candidates() {
        let body = serde_json::json!({"items": null, "messages": [1, 2]});
        assert_eq!(detect_items_field(&body), Some("messages".to_string()));
    }

    #[test]
    fn detect_items_field_finds_nothing_when_no_candidate_is_an_array() {
        let body = serde_json::json!({"items": "not an array"});
        assert_eq!(detect_items_field(&body), None);
    }

    #[test]
    fn build_body_excludes_consumed_path_params() {
        let binding = ProxyBinding {
            method: HttpMethod::Post,
            path: "/items/{id}".to_string(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
            response_path: None,
            pagination: None,
        };
        let params = serde_json::json!({"id": "1", "title": "hi"});
        let consumed = consumed_param_names(&binding);
        let body = build_body(&binding, &params, &consumed).unwrap().unwrap();
        assert_eq!(body, serde_json::json!({"title": "hi"}));
    }

    #[test]
    fn bearer_auth_reads_token_field_from_credential_map() {
        let proxy_auth = ProxyAuth {
            strategy: ProxyAuthStrategy::Bearer,
            credential_id: "oura".to_string(),
            token_field: "access_token".to_string(),
            header_name: None,
        };
        let mut credentials = CredentialMap::new();
        credentials.insert("oura".into(), BTreeMap::from([("access_token".to_string(), "tok".to_string())]));
        let mut headers = BTreeMap::new();
        let mut query = Vec::new();
        apply_auth(&proxy_auth, &credentials, &mut headers, &mut query).unwrap();
        assert_eq!(headers.get("Authorization"), Some(&"Bearer tok".to_string()));
    }
}
