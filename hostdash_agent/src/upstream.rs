//! Optional remote API: another agent (or the legacy Node API) that already
//! exposes the same JSON. Requests are forwarded and answers returned as-is.

use std::time::Duration;

use axum::body::Bytes;
use reqwest::{header, Client, Method};
use serde_json::Value;

use crate::error::AdapterError;

#[derive(Clone)]
pub struct UpstreamApi {
    client: Client,
    base: String,
    token: Option<String>,
}

impl UpstreamApi {
    pub fn new(base: &str, token: Option<String>, timeout: Duration) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Upstream(format!("client setup: {e}")))?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!("{}/api/{}", self.base, path.trim_start_matches('/'));
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        url
    }

    /// Forward one call. Query string and body pass through untouched; the
    /// caller's own auth (cookie, `token=`) is not sent on, only ours.
    pub async fn forward(&self, call: Forward<'_>) -> Result<Value, AdapterError> {
        let query = call.query.map(strip_token_param);
        let mut req = self
            .client
            .request(call.method, self.url_for(call.path, query.as_deref()));
        if let Some(t) = &self.token {
            req = req.bearer_auth(t);
        }
        if !call.body.is_empty() {
            if let Some(ct) = call.content_type {
                req = req.header(header::CONTENT_TYPE, ct);
            }
            req = req.body(call.body);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| AdapterError::Upstream(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AdapterError::Upstream(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| AdapterError::Upstream(format!("decode: {e}")))
    }
}

pub struct Forward<'a> {
    pub method: Method,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub body: Bytes,
}

impl<'a> Forward<'a> {
    pub fn get(path: &'a str) -> Self {
        Forward {
            method: Method::GET,
            path,
            query: None,
            content_type: None,
            body: Bytes::new(),
        }
    }
}

fn strip_token_param(query: &str) -> String {
    query
        .split('&')
        .filter(|kv| !kv.is_empty() && kv.split('=').next() != Some("token"))
        .collect::<Vec<_>>()
        .join("&")
}
