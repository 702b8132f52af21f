use std::sync::{Mutex, PoisonError};

use chrono::{Duration, Utc};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, error, trace, warn};

use crate::error::AuthError;
use crate::logger::MessageLogger;
use crate::oauth::OAuthClient;
use crate::token::{TokenState, TokenStore};
use crate::{Error, Result};

/// Refresh ahead of any call made this close to expiry.
const EXPIRY_MARGIN_MINUTES: i64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(path)
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PUT,
            body: Some(body),
            ..Self::get(path)
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

enum Attempt {
    Done(ApiResponse),
    Unauthorized,
}

/// Authenticated access to the vendor REST API.
///
/// Every call carries the bearer token and the `apikey` query parameter. An
/// authorization failure triggers one token refresh and one resend of the
/// identical request; a second failure is returned to the caller.
pub(crate) struct ApiGateway {
    http: reqwest::Client,
    base_url: String,
    oauth: OAuthClient,
    token: tokio::sync::Mutex<Option<TokenState>>,
    store: Box<dyn TokenStore>,
    logger: Option<Mutex<MessageLogger>>,
}

impl ApiGateway {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        oauth: OAuthClient,
        token: Option<TokenState>,
        store: Box<dyn TokenStore>,
        logger: Option<MessageLogger>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            oauth,
            token: tokio::sync::Mutex::new(token),
            store,
            logger: logger.map(Mutex::new),
        }
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    pub fn with_logger(&self, f: impl FnOnce(&mut MessageLogger)) {
        if let Some(logger) = &self.logger {
            f(&mut logger.lock().unwrap_or_else(PoisonError::into_inner));
        }
    }

    pub async fn token(&self) -> Option<TokenState> {
        self.token.lock().await.clone()
    }

    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenState> {
        let mut guard = self.token.lock().await;
        let token = self.oauth.exchange_code(code, redirect_uri).await?;
        self.persist(&token);
        *guard = Some(token.clone());
        Ok(token)
    }

    pub async fn refresh(&self) -> Result<TokenState> {
        let mut guard = self.token.lock().await;
        self.refresh_locked(&mut guard).await
    }

    async fn refresh_locked(&self, slot: &mut Option<TokenState>) -> Result<TokenState> {
        let refresh_token = slot
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or(AuthError::MissingRefreshToken)?;
        let token = self.oauth.refresh(&refresh_token).await?;
        self.persist(&token);
        *slot = Some(token.clone());
        Ok(token)
    }

    fn persist(&self, token: &TokenState) {
        if let Err(e) = self.store.save(token) {
            warn!("failed to persist token: {e}");
        }
    }

    /// Current access token, refreshed first if it is about to expire.
    async fn access_token(&self) -> Result<SecretString> {
        let mut guard = self.token.lock().await;
        let Some(token) = guard.as_ref() else {
            return Err(AuthError::NotAuthorized.into());
        };
        if token.expires_within(Duration::minutes(EXPIRY_MARGIN_MINUTES), Utc::now())
            && token.refresh_token.is_some()
        {
            debug!(expires_at = %token.expires_at, "access token near expiry, refreshing");
            return Ok(self.refresh_locked(&mut guard).await?.access_token);
        }
        Ok(token.access_token.clone())
    }

    /// Refreshes after a rejected call unless another task already did.
    async fn refresh_after_rejection(&self, rejected: &SecretString) -> Result<SecretString> {
        let mut guard = self.token.lock().await;
        if let Some(current) = guard.as_ref()
            && current.access_token.expose_secret() != rejected.expose_secret()
        {
            return Ok(current.access_token.clone());
        }
        Ok(self.refresh_locked(&mut guard).await?.access_token)
    }

    pub async fn send(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let token = self.access_token().await?;
        match self.send_once(req, &token).await? {
            Attempt::Done(resp) => Ok(resp),
            Attempt::Unauthorized => {
                warn!(method = %req.method, path = %req.path, "unauthorized, refreshing token and retrying once");
                let token = self.refresh_after_rejection(&token).await?;
                match self.send_once(req, &token).await? {
                    Attempt::Done(resp) => Ok(resp),
                    Attempt::Unauthorized => {
                        error!(method = %req.method, path = %req.path, "still unauthorized after refresh");
                        Err(Error::Unauthorized)
                    }
                }
            }
        }
    }

    async fn send_once(&self, req: &ApiRequest, token: &SecretString) -> Result<Attempt> {
        let url = format!("{}{}", self.base_url, req.path);
        let mut query: Vec<(&str, &str)> = vec![("apikey", self.oauth.client_id())];
        query.extend(req.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        trace!(method = %req.method, url = %url, "sending request");
        self.with_logger(|l| l.log_request(req.method.as_str(), &req.path, req.body.as_ref()));

        let mut builder = self
            .http
            .request(req.method.clone(), &url)
            .bearer_auth(token.expose_secret())
            .query(&query);
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let text = resp.text().await?;
        let body = parse_body(&text);

        self.with_logger(|l| l.log_response(req.method.as_str(), &req.path, status.as_u16(), &body));

        if is_unauthorized(status.as_u16(), &text) {
            return Ok(Attempt::Unauthorized);
        }

        if status.is_server_error() {
            error!(
                method = %req.method,
                path = %req.path,
                status = status.as_u16(),
                headers = ?headers,
                request_body = ?req.body,
                response_body = %text,
                "vendor server error"
            );
            return Err(Error::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        if !status.is_success() {
            warn!(method = %req.method, path = %req.path, status = status.as_u16(), body = %text, "request failed");
            return Err(Error::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(Attempt::Done(ApiResponse {
            status: status.as_u16(),
            body,
        }))
    }
}

fn is_unauthorized(status: u16, body: &str) -> bool {
    status == 401 || ((400..500).contains(&status) && body.contains("Unauthorized"))
}

/// Writes often answer with an empty body; some answers are not JSON at all.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "response_text": text }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_detection() {
        assert!(is_unauthorized(401, ""));
        assert!(is_unauthorized(403, r#"{"fault":"Unauthorized"}"#));
        assert!(!is_unauthorized(403, "Forbidden"));
        assert!(!is_unauthorized(500, "Unauthorized"));
        assert!(!is_unauthorized(200, "Unauthorized"));
    }

    #[test]
    fn body_parsing() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_body("OK"), json!({"response_text": "OK"}));
    }

    #[test]
    fn request_builders() {
        let req = ApiRequest::post("/x", json!({"a": 1})).query("locationId", "L1");
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.query, vec![("locationId".to_string(), "L1".to_string())]);
        assert_eq!(ApiRequest::put("/p", json!({})).method, Method::PUT);
        assert!(ApiRequest::get("/g").body.is_none());
    }
}
