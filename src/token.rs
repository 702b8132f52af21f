use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;

/// Share of the access-token lifetime after which a proactive refresh is due.
pub const PROACTIVE_REFRESH_FRACTION: f64 = 0.8;

/// Upper bound accepted for `expires_in`; longer lifetimes are clamped.
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct TokenState {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
}

impl TokenState {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: refresh_token.map(SecretString::from),
            expires_at: now + Duration::seconds(expires_in_secs.clamp(0, MAX_TOKEN_LIFETIME_SECS)),
            issued_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        now + margin >= self.expires_at
    }

    pub fn lifetime(&self) -> Duration {
        self.expires_at - self.issued_at
    }

    /// When the maintenance loop should refresh ahead of expiry.
    pub fn refresh_due_at(&self) -> DateTime<Utc> {
        let lifetime_ms = self.lifetime().num_milliseconds().max(0) as f64;
        self.issued_at + Duration::milliseconds((lifetime_ms * PROACTIVE_REFRESH_FRACTION) as i64)
    }
}

/// Host-side persistence for the token. Nothing else is stored durably.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<TokenState>>;
    fn save(&self, token: &TokenState) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
    #[serde(default)]
    issued_at: Option<DateTime<Utc>>,
}

/// JSON file holding the current token set.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<TokenState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)?;
        let stored: StoredToken = serde_json::from_str(&text)?;
        debug!(path = %self.path.display(), expires_at = %stored.expires_at, "loaded token");
        Ok(Some(TokenState {
            access_token: SecretString::from(stored.access_token),
            refresh_token: stored.refresh_token.map(SecretString::from),
            expires_at: stored.expires_at,
            // older files lack issued_at; assume the usual hour
            issued_at: stored
                .issued_at
                .unwrap_or(stored.expires_at - Duration::seconds(3600)),
        }))
    }

    fn save(&self, token: &TokenState) -> Result<()> {
        let stored = StoredToken {
            access_token: token.access_token.expose_secret().to_string(),
            refresh_token: token
                .refresh_token
                .as_ref()
                .map(|r| r.expose_secret().to_string()),
            expires_at: token.expires_at,
            issued_at: Some(token.issued_at),
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&stored)?)?;
        debug!(path = %self.path.display(), "saved token");
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<TokenState>>,
}

impl MemoryTokenStore {
    pub fn new(token: Option<TokenState>) -> Self {
        Self {
            token: Mutex::new(token),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<TokenState>> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, token: &TokenState) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(())
    }
}
