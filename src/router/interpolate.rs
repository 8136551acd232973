//! `{credentials.<id>.<field>}` / `{params.<name>}` template interpolation
//! (spec §4.4, §9 "Credential-keyed environment/header injection").
//!
//! A narrow pure function that fails closed: any placeholder it cannot
//! resolve is an error, never a silent empty substitution.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{BrokerError, Result};

/// A loaded credential's fields, addressable as `{credentials.<id>.<field>}`.
pub type CredentialMap = BTreeMap<String, BTreeMap<String, String>>;

/// Substitute every `{...}` placeholder in `template` using `params` and
/// `credentials`. Returns `InvalidParams` on any unresolved reference.
pub fn interpolate(template: &str, params: &Value, credentials: &CredentialMap) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let start = i + 1;
        let end = match template[start..].find('}') {
            Some(offset) => start + offset,
            None => return Err(BrokerError::InvalidParams(format!("unterminated placeholder in '{template}'"))),
        };
        let reference = &template[start..end];
        let resolved = resolve(reference, params, credentials)?;
        out.push_str(&resolved);
        // Skip past the consumed placeholder, including the closing brace.
        while let Some((j, _)) = chars.peek().copied() {
            if j > end {
                break;
            }
            chars.next();
        }
    }
    Ok(out)
}

fn resolve(reference: &str, params: &Value, credentials: &CredentialMap) -> Result<String> {
    if let Some(rest) = reference.strip_prefix("params.") {
        return params
            .get(rest)
            .and_then(value_to_string)
            .ok_or_else(|| BrokerError::InvalidParams(format!("unresolved placeholder: params.{rest}")));
    }
    if let Some(rest) = reference.strip_prefix("credentials.") {
        let mut parts = rest.splitn(2, '.');
        let cred_id = parts.next().unwrap_or("");
        let field = parts.next().ok_or_else(|| {
            BrokerError::InvalidParams(format!("malformed credential placeholder: {reference}"))
        })?;
        return credentials
            .get(cred_id)
            .and_then(|fields| fields.get(field))
            .cloned()
            .ok_or_else(|| BrokerError::InvalidParams(format!("unresolved placeholder: credentials.{rest}")));
    }
    Err(BrokerError::InvalidParams(format!("unknown placeholder namespace: {reference}")))
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Interpolate every value in a `BTreeMap<String, String>` of templates
/// (script env), dropping entries whose resolved value is empty.
pub fn interpolate_map(
    templates: &BTreeMap<String, String>,
    params: &Value,
    credentials: &CredentialMap,
    omit_empty: bool,
) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for (k, template) in templates {
        let resolved = interpolate(template, params, credentials)?;
        if omit_empty && resolved.is_empty() {
            continue;
        }
        out.insert(k.clone(), resolved);
    }
    Ok(out)
}

/// Substitute bare `{name}` placeholders directly from top-level `params`
/// fields, as the Proxy implementation's path/query/header templates do
/// (spec §4.4) — distinct from the namespaced `{params.name}` form the
/// Script implementation's env templates use.
pub fn interpolate_bare(template: &str, params: &Value) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let start = i + 1;
        let end = match template[start..].find('}') {
            Some(offset) => start + offset,
            None => return Err(BrokerError::InvalidParams(format!("unterminated placeholder in '{template}'"))),
        };
        let name = &template[start..end];
        let resolved = params
            .get(name)
            .and_then(value_to_string)
            .ok_or_else(|| BrokerError::InvalidParams(format!("unresolved placeholder: {name}")))?;
        out.push_str(&resolved);
        while let Some((j, _)) = chars.peek().copied() {
            if j > end {
                break;
            }
            chars.next();
        }
    }
    Ok(out)
}

/// Bare-placeholder variant of [`interpolate_map`], for Proxy query/header
/// templates.
pub fn interpolate_map_bare(
    templates: &BTreeMap<String, String>,
    params: &Value,
    omit_empty: bool,
) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for (k, template) in templates {
        let resolved = interpolate_bare(template, params)?;
        if omit_empty && resolved.is_empty() {
            continue;
        }
        out.insert(k.clone(), resolved);
    }
    Ok(out)
}

/// Names of params consumed by bare placeholders in `template` — used to
/// compute the remainder of `params` for a Proxy request body.
pub fn bare_placeholder_names(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        rest = &rest[open + 1..];
        if let Some(close) = rest.find('}') {
            names.push(rest[..close].to_string());
            rest = &rest[close + 1..];
        } else {
            break;
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_params_and_credentials() {
        let params = serde_json::json!({"account": "me"});
        let mut creds = CredentialMap::new();
        creds.insert("oura".into(), BTreeMap::from([("access_token".to_string(), "tok123".to_string())]));
        let out = interpolate(
            "Bearer {credentials.oura.access_token} for {params.account}",
            &params,
            &creds,
        )
        .unwrap();
        assert_eq!(out, "Bearer tok123 for me");
    }

    #[test]
    fn unresolved_reference_fails_closed() {
        let params = serde_json::json!({});
        let creds = CredentialMap::new();
        assert!(interpolate("{params.missing}", &params, &creds).is_err());
    }

    #[test]
    fn bare_substitutes_top_level_params() {
        let params = serde_json::json!({"id": "42"});
        assert_eq!(interpolate_bare("/v2/items/{id}", &params).unwrap(), "/v2/items/42");
    }

    #[test]
    fn bare_placeholder_names_collected() {
        assert_eq!(
            bare_placeholder_names("/a/{x}/b/{y}"),
            vec!["x".to_string(), "y".to_string()]
        );
    }

    #[test]
    fn omit_empty_drops_blank_entries() {
        let params = serde_json::json!({"q": ""});
        let creds = CredentialMap::new();
        let templates = BTreeMap::from([("query".to_string(), "{params.q}".to_string())]);
        let out = interpolate_map(&templates, &params, &creds, true).unwrap();
        assert!(out.is_empty());
    }
}
