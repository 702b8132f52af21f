//! Operator configuration: TOML file plus `RESIDEO_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ResideoClientBuilder;
use crate::logger::MessageLogMode;
use crate::protocol::{DEFAULT_API_BASE, DEFAULT_AUTH_BASE, DEFAULT_REDIRECT_URI};
use crate::token::FileTokenStore;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing config value: {0}")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Figment(Box::new(e))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub client_id: Option<String>,
    /// Never written back out; `Debug` prints it redacted.
    #[serde(default, skip_serializing)]
    pub client_secret: Option<SecretString>,
    pub redirect_uri: String,
    pub api_base: String,
    pub auth_base: String,
    /// Defaults to the platform data directory.
    pub token_file: Option<PathBuf>,
    pub poll_interval_secs: u64,
    pub settle_delay_ms: u64,
    pub refresh_after_command_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub message_log: Option<PathBuf>,
    /// "full" or "diffed".
    pub message_log_mode: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            auth_base: DEFAULT_AUTH_BASE.to_string(),
            token_file: None,
            poll_interval_secs: 300,
            settle_delay_ms: 500,
            refresh_after_command_ms: Some(2000),
            timeout_secs: None,
            message_log: None,
            message_log_mode: "full".to_string(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "resideo", "resideo-t10")
}

pub fn default_config_path() -> PathBuf {
    project_dirs().map_or_else(|| PathBuf::from("resideo.toml"), |d| d.config_dir().join("config.toml"))
}

pub fn default_token_path() -> PathBuf {
    project_dirs().map_or_else(|| PathBuf::from("resideo_tokens.json"), |d| d.data_dir().join("tokens.json"))
}

impl Config {
    /// Defaults, then the TOML file (if it exists), then `RESIDEO_*` variables.
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("RESIDEO_"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map_or_else(default_config_path, Path::to_path_buf);
        Self::from_figment(Self::figment(&path))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Config = figment.extract()?;
        config.log_mode()?;
        Ok(config)
    }

    pub fn token_path(&self) -> PathBuf {
        self.token_file.clone().unwrap_or_else(default_token_path)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    fn log_mode(&self) -> Result<MessageLogMode, ConfigError> {
        match self.message_log_mode.as_str() {
            "full" => Ok(MessageLogMode::Full),
            "diffed" => Ok(MessageLogMode::Diffed),
            other => Err(ConfigError::Invalid {
                field: "message_log_mode",
                reason: format!("expected \"full\" or \"diffed\", got {other:?}"),
            }),
        }
    }

    /// Client builder carrying every configured value, with a file-backed token store.
    pub fn client_builder(&self) -> Result<ResideoClientBuilder, ConfigError> {
        let client_id = self.client_id.clone().ok_or(ConfigError::Missing("client_id"))?;
        let client_secret = self
            .client_secret
            .as_ref()
            .ok_or(ConfigError::Missing("client_secret"))?
            .expose_secret()
            .to_string();

        let mut builder = ResideoClientBuilder::new(client_id, client_secret)
            .api_base(&self.api_base)
            .auth_base(&self.auth_base)
            .redirect_uri(&self.redirect_uri)
            .token_store(FileTokenStore::new(self.token_path()))
            .settle_delay(Duration::from_millis(self.settle_delay_ms))
            .post_command_refresh(self.refresh_after_command_ms.map(Duration::from_millis));

        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(path) = &self.message_log {
            builder = builder.message_log(self.log_mode()?, path.to_string_lossy());
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> Result<Config, ConfigError> {
        Config::from_figment(
            Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Toml::string(toml)),
        )
    }

    #[test]
    fn defaults_fill_in() {
        let cfg = from_toml(r#"client_id = "abc""#).unwrap();
        assert_eq!(cfg.client_id.as_deref(), Some("abc"));
        assert_eq!(cfg.api_base, DEFAULT_API_BASE);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(300));
        assert_eq!(cfg.refresh_after_command_ms, Some(2000));
    }

    #[test]
    fn overrides_apply() {
        let cfg = from_toml(
            r#"
            client_id = "abc"
            client_secret = "shh"
            api_base = "http://127.0.0.1:9000/v2"
            token_file = "/tmp/t.json"
            poll_interval_secs = 60
            message_log_mode = "diffed"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.api_base, "http://127.0.0.1:9000/v2");
        assert_eq!(cfg.token_path(), PathBuf::from("/tmp/t.json"));
        assert_eq!(cfg.poll_interval(), Duration::from_secs(60));
        assert!(cfg.client_builder().is_ok());
    }

    #[test]
    fn debug_redacts_client_secret() {
        let cfg = from_toml(
            r#"
            client_id = "abc"
            client_secret = "hunter2-secret"
            "#,
        )
        .unwrap();
        assert!(!format!("{cfg:?}").contains("hunter2-secret"));
        assert_eq!(cfg.client_secret.as_ref().unwrap().expose_secret(), "hunter2-secret");
    }

    #[test]
    fn rejects_unknown_log_mode() {
        let err = from_toml(r#"message_log_mode = "verbose""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "message_log_mode", .. }));
    }

    #[test]
    fn builder_needs_credentials() {
        let cfg = from_toml("").unwrap();
        assert!(matches!(cfg.client_builder(), Err(ConfigError::Missing("client_id"))));
    }
}
