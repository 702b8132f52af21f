mod client;
pub mod config;
mod device;
mod diff;
mod directory;
mod error;
mod gateway;
mod logger;
mod oauth;
pub mod protocol;
mod scheduler;
mod token;
pub mod translator;
mod types;

pub use client::{ResideoClient, ResideoClientBuilder, DEFAULT_POST_COMMAND_REFRESH, DEFAULT_SETTLE_DELAY};
pub use device::ThermostatDevice;
pub use error::{AuthError, Error, Result};
pub use logger::MessageLogMode;
pub use oauth::OAuthClient;
pub use scheduler::{spawn_maintenance, Maintenance, DEFAULT_POLL_INTERVAL};
pub use token::{
    FileTokenStore, MemoryTokenStore, TokenState, TokenStore, MAX_TOKEN_LIFETIME_SECS, PROACTIVE_REFRESH_FRACTION,
};
pub use types::*;
