use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::AuthError;
use crate::protocol::{authorization_code_form, authorization_url, refresh_token_form, token_url};
use crate::token::{TokenState, MAX_TOKEN_LIFETIME_SECS};
use crate::types::coerce_f64;
use crate::Result;

const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Talks to the vendor token endpoint. Holds no token state itself.
pub struct OAuthClient {
    http: reqwest::Client,
    auth_base: String,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
}

impl OAuthClient {
    pub fn new(
        http: reqwest::Client,
        auth_base: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http,
            auth_base: auth_base.into(),
            client_id: client_id.into(),
            client_secret,
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn authorization_url(&self) -> Result<Url> {
        authorization_url(&self.auth_base, &self.client_id, &self.redirect_uri)
    }

    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenState> {
        debug!("exchanging authorization code");
        let body = self
            .token_request(authorization_code_form(code, redirect_uri))
            .await?;
        parse_token_response(&body, None, Utc::now())
    }

    /// The vendor may rotate the refresh token; the old one is kept only if
    /// the response omits a new one.
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenState> {
        debug!("refreshing access token");
        let body = self
            .token_request(refresh_token_form(refresh_token.expose_secret()))
            .await?;
        parse_token_response(&body, Some(refresh_token), Utc::now())
    }

    async fn token_request(&self, form: Vec<(&'static str, String)>) -> Result<Value> {
        let resp = self
            .http
            .post(token_url(&self.auth_base))
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), body = %text, "token endpoint rejected grant");
            return Err(AuthError::ExchangeRejected {
                status: status.as_u16(),
                body: text,
            }
            .into());
        }

        serde_json::from_str(&text)
            .map_err(|e| AuthError::InvalidResponse(format!("not JSON: {e}")).into())
    }
}

pub(crate) fn parse_token_response(
    body: &Value,
    previous_refresh: Option<&SecretString>,
    now: DateTime<Utc>,
) -> Result<TokenState> {
    let access_token = body
        .get("access_token")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::InvalidResponse("missing access_token".to_string()))?;

    let expires_in = match body.get("expires_in").and_then(coerce_f64) {
        None => DEFAULT_EXPIRES_IN_SECS,
        Some(secs) if (0.0..=MAX_TOKEN_LIFETIME_SECS as f64).contains(&secs) => secs as i64,
        Some(secs) => {
            warn!(expires_in = secs, "token lifetime out of range, clamping");
            secs.clamp(0.0, MAX_TOKEN_LIFETIME_SECS as f64) as i64
        }
    };

    let refresh_token = body
        .get("refresh_token")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| previous_refresh.map(|r| r.expose_secret().to_string()));

    debug!(expires_in, rotated = body.get("refresh_token").is_some(), "token issued");
    Ok(TokenState::new(access_token, refresh_token, expires_in, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn parses_full_response() {
        let now = Utc::now();
        let t = parse_token_response(
            &json!({"access_token": "a", "refresh_token": "r", "expires_in": "1799"}),
            None,
            now,
        )
        .unwrap();
        assert_eq!(t.access_token.expose_secret(), "a");
        assert_eq!(t.refresh_token.unwrap().expose_secret(), "r");
        assert_eq!(t.expires_at, now + Duration::seconds(1799));
    }

    #[test]
    fn defaults_expiry_to_an_hour() {
        let now = Utc::now();
        let t = parse_token_response(&json!({"access_token": "a"}), None, now).unwrap();
        assert_eq!(t.expires_at, now + Duration::seconds(3600));
        assert!(t.refresh_token.is_none());
    }

    #[test]
    fn keeps_previous_refresh_token_when_not_rotated() {
        let prev = SecretString::from("old".to_string());
        let t = parse_token_response(&json!({"access_token": "a"}), Some(&prev), Utc::now()).unwrap();
        assert_eq!(t.refresh_token.unwrap().expose_secret(), "old");

        let t = parse_token_response(
            &json!({"access_token": "a", "refresh_token": "new"}),
            Some(&prev),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(t.refresh_token.unwrap().expose_secret(), "new");
    }

    #[test]
    fn absurd_lifetimes_are_clamped() {
        let now = Utc::now();
        let t = parse_token_response(&json!({"access_token": "a", "expires_in": 1e18}), None, now).unwrap();
        assert_eq!(t.expires_at, now + Duration::seconds(MAX_TOKEN_LIFETIME_SECS));

        let t = parse_token_response(&json!({"access_token": "a", "expires_in": -5}), None, now).unwrap();
        assert_eq!(t.expires_at, now);
    }

    #[test]
    fn missing_access_token_is_invalid() {
        let err = parse_token_response(&json!({"refresh_token": "r"}), None, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::InvalidResponse(_))));
    }
}
