use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tracing::{debug, info, warn};
use url::Url;

use crate::device::ThermostatDevice;
use crate::directory::{parse_locations, parse_thermostat, DeviceDirectory};
use crate::gateway::{ApiGateway, ApiRequest};
use crate::logger::{MessageLogMode, MessageLogger};
use crate::oauth::OAuthClient;
use crate::protocol::{
    fan_path, parse_callback, parse_priority, parse_rooms, priority_path, rooms_path,
    thermostat_path, DEFAULT_API_BASE, DEFAULT_AUTH_BASE, DEFAULT_REDIRECT_URI, LOCATIONS_PATH,
};
use crate::token::{MemoryTokenStore, TokenState, TokenStore};
use crate::translator::{check_capability, fan_body, merge_intent, priority_body, validate_intent, Intent};
use crate::types::*;
use crate::{Error, Result};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_POST_COMMAND_REFRESH: Duration = Duration::from_secs(2);

type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;
type SnapshotCallback = Box<dyn Fn(&[Thermostat]) + Send + Sync>;

pub struct ResideoClientBuilder {
    client_id: String,
    client_secret: SecretString,
    api_base: String,
    auth_base: String,
    redirect_uri: String,
    token: Option<TokenState>,
    store: Option<Box<dyn TokenStore>>,
    settle_delay: Duration,
    post_command_refresh: Option<Duration>,
    timeout: Option<Duration>,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl ResideoClientBuilder {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            api_base: DEFAULT_API_BASE.to_string(),
            auth_base: DEFAULT_AUTH_BASE.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            token: None,
            store: None,
            settle_delay: DEFAULT_SETTLE_DELAY,
            post_command_refresh: Some(DEFAULT_POST_COMMAND_REFRESH),
            timeout: None,
            event_callbacks: Vec::new(),
            snapshot_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into();
        self
    }

    pub fn auth_base(mut self, url: impl Into<String>) -> Self {
        self.auth_base = url.into();
        self
    }

    pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    /// Seed token. Takes precedence over whatever the store holds.
    pub fn token(mut self, token: TokenState) -> Self {
        self.token = Some(token);
        self
    }

    pub fn token_store(mut self, store: impl TokenStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Pause between the fresh fetch and the write of every command.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Delay before re-reading the directory after a successful command; `None` disables it.
    pub fn post_command_refresh(mut self, delay: Option<Duration>) -> Self {
        self.post_command_refresh = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn on_snapshot(mut self, f: impl Fn(&[Thermostat]) + Send + Sync + 'static) -> Self {
        self.snapshot_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ResideoClient> {
        let mut http = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }
        let http = http.build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(MessageLogger::new(mode, &path)?),
            _ => None,
        };

        let store = self
            .store
            .unwrap_or_else(|| Box::new(MemoryTokenStore::default()));
        let token = match self.token {
            Some(t) => Some(t),
            None => store.load()?,
        };

        let oauth = OAuthClient::new(
            http.clone(),
            self.auth_base,
            self.client_id,
            self.client_secret,
            self.redirect_uri,
        );

        Ok(ResideoClient {
            inner: Arc::new(Inner {
                gateway: ApiGateway::new(http, self.api_base, oauth, token, store, logger),
                directory: RwLock::new(DeviceDirectory::default()),
                event_callbacks: self.event_callbacks,
                snapshot_callbacks: self.snapshot_callbacks,
                settle_delay: self.settle_delay,
                post_command_refresh: self.post_command_refresh,
            }),
        })
    }
}

struct Inner {
    gateway: ApiGateway,
    directory: RwLock<DeviceDirectory>,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
    settle_delay: Duration,
    post_command_refresh: Option<Duration>,
}

/// Session with the Resideo cloud API. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ResideoClient {
    inner: Arc<Inner>,
}

impl ResideoClient {
    pub fn builder(client_id: impl Into<String>, client_secret: impl Into<String>) -> ResideoClientBuilder {
        ResideoClientBuilder::new(client_id, client_secret)
    }

    // -- OAuth --

    pub fn authorization_url(&self) -> Result<Url> {
        self.inner.gateway.oauth().authorization_url()
    }

    pub async fn exchange_code(&self, code: &str) -> Result<()> {
        let redirect_uri = self.inner.gateway.oauth().redirect_uri().to_string();
        let token = self.inner.gateway.exchange_code(code, &redirect_uri).await?;
        info!(expires_at = %token.expires_at, "authorization complete");
        Ok(())
    }

    /// Handles the OAuth redirect (full URL or query string) and returns a
    /// short message suitable for the callback page.
    pub async fn complete_authorization(&self, callback: &str) -> Result<String> {
        let code = parse_callback(callback).inspect_err(|e| warn!("OAuth callback failed: {e}"))?;
        self.exchange_code(&code).await?;
        Ok("Authorization successful. Thermostats can now be discovered.".to_string())
    }

    pub async fn refresh_token(&self) -> Result<()> {
        let token = self.inner.gateway.refresh().await?;
        debug!(expires_at = %token.expires_at, "token refreshed");
        Ok(())
    }

    pub async fn is_authorized(&self) -> bool {
        self.inner.gateway.token().await.is_some()
    }

    pub async fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        self.inner.gateway.token().await.map(|t| t.expires_at)
    }

    pub async fn token_refresh_due_at(&self) -> Option<DateTime<Utc>> {
        self.inner.gateway.token().await.map(|t| t.refresh_due_at())
    }

    // -- Discovery --

    /// Fetches all locations and replaces the cached directory with their thermostats.
    pub async fn discover(&self) -> Result<Vec<Thermostat>> {
        let resp = self
            .inner
            .gateway
            .send(&ApiRequest::get(LOCATIONS_PATH))
            .await
            .inspect_err(|e| warn!("discovery failed: {e}"))?;
        self.inner.gateway.with_logger(|l| l.log_poll(&resp.body));

        let thermostats = parse_locations(&resp.body).inspect_err(|e| warn!("discovery failed: {e}"))?;
        debug!(count = thermostats.len(), "discovered thermostats");

        let events = self
            .inner
            .directory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(thermostats.clone());

        for event in &events {
            for cb in &self.inner.event_callbacks {
                cb(event);
            }
        }
        for cb in &self.inner.snapshot_callbacks {
            cb(&thermostats);
        }
        if !events.is_empty() {
            debug!(count = events.len(), "processed events from discovery");
        }

        Ok(thermostats)
    }

    pub fn thermostats(&self) -> Vec<Thermostat> {
        self.inner
            .directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .thermostats()
            .to_vec()
    }

    pub fn thermostat(&self, device_id: &str) -> Option<Thermostat> {
        self.inner
            .directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .find(device_id)
            .cloned()
    }

    pub fn device(&self, device_id: impl Into<String>) -> ThermostatDevice {
        ThermostatDevice::new(self.clone(), device_id)
    }

    /// Reads a single thermostat directly. Does not touch the cached directory.
    pub async fn thermostat_status(&self, device_id: &str) -> Result<Thermostat> {
        let cached = self.locate(device_id).await?;
        let req = ApiRequest::get(thermostat_path(device_id)).query("locationId", &cached.location_id);
        let resp = self.inner.gateway.send(&req).await?;
        parse_thermostat(&resp.body, &cached.location_id, &cached.location_name)
            .ok_or_else(|| Error::NotFound(device_id.to_string()))
    }

    // -- Commands --

    pub async fn set_temperature(&self, device_id: &str, heat: Option<f64>, cool: Option<f64>) -> Result<()> {
        self.apply_intent(device_id, Intent::SetTemperature { heat, cool }).await
    }

    pub async fn set_heating_setpoint(&self, device_id: &str, setpoint: f64) -> Result<()> {
        self.set_temperature(device_id, Some(setpoint), None).await
    }

    pub async fn set_cooling_setpoint(&self, device_id: &str, setpoint: f64) -> Result<()> {
        self.set_temperature(device_id, None, Some(setpoint)).await
    }

    pub async fn set_mode(&self, device_id: &str, mode: HvacMode) -> Result<()> {
        self.apply_intent(device_id, Intent::SetMode(mode)).await
    }

    /// Fails with `UnsupportedCapability` on units without auxiliary heat.
    pub async fn emergency_heat(&self, device_id: &str) -> Result<()> {
        self.set_mode(device_id, HvacMode::EmergencyHeat).await
    }

    pub async fn set_fan_mode(&self, device_id: &str, mode: FanMode) -> Result<()> {
        let thermostat = self.locate(device_id).await?;
        let body = fan_body(mode);
        self.inner.gateway.with_logger(|l| l.log_command("set_fan_mode", device_id, &body));
        let req = ApiRequest::post(fan_path(device_id), body).query("locationId", &thermostat.location_id);
        self.inner.gateway.send(&req).await?;
        debug!(device_id, mode = mode.as_vendor_str(), "fan mode set");
        self.schedule_refresh();
        Ok(())
    }

    pub async fn priority(&self, device_id: &str) -> Result<Priority> {
        let thermostat = self.locate(device_id).await?;
        let req = ApiRequest::get(priority_path(device_id)).query("locationId", &thermostat.location_id);
        let resp = self.inner.gateway.send(&req).await?;
        parse_priority(&resp.body).ok_or_else(|| Error::Status {
            status: resp.status,
            body: format!("unrecognised priority response: {}", resp.body),
        })
    }

    pub async fn set_priority(&self, device_id: &str, priority_type: PriorityType) -> Result<()> {
        self.put_priority(device_id, priority_type, None).await
    }

    /// Switches to room priority over the given rooms.
    pub async fn set_selected_rooms(&self, device_id: &str, rooms: &[u32]) -> Result<()> {
        self.put_priority(device_id, PriorityType::PickARoom, Some(rooms)).await
    }

    pub async fn rooms(&self, device_id: &str, group_id: u32) -> Result<Vec<Room>> {
        let thermostat = self.locate(device_id).await?;
        let req = ApiRequest::get(rooms_path(device_id, group_id)).query("locationId", &thermostat.location_id);
        let resp = self.inner.gateway.send(&req).await?;
        Ok(parse_rooms(&resp.body))
    }

    // -- Helpers --

    async fn put_priority(&self, device_id: &str, priority_type: PriorityType, rooms: Option<&[u32]>) -> Result<()> {
        let thermostat = self.locate(device_id).await?;
        let body = priority_body(priority_type, rooms);
        self.inner.gateway.with_logger(|l| l.log_command("set_priority", device_id, &body));
        let req = ApiRequest::put(priority_path(device_id), body).query("locationId", &thermostat.location_id);
        self.inner.gateway.send(&req).await?;
        self.schedule_refresh();
        Ok(())
    }

    /// Cached entry if present, otherwise a discovery round.
    async fn locate(&self, device_id: &str) -> Result<Thermostat> {
        if let Some(t) = self.thermostat(device_id) {
            return Ok(t);
        }
        self.discover().await?;
        self.thermostat(device_id)
            .ok_or_else(|| Error::NotFound(device_id.to_string()))
    }

    /// Fresh read before a write; the vendor lags behind its own writes and
    /// other clients (the mobile app) may have changed things.
    async fn fresh_thermostat(&self, device_id: &str) -> Result<Thermostat> {
        self.discover().await?;
        if !self.inner.settle_delay.is_zero() {
            tokio::time::sleep(self.inner.settle_delay).await;
        }
        self.thermostat(device_id)
            .ok_or_else(|| Error::NotFound(device_id.to_string()))
    }

    async fn apply_intent(&self, device_id: &str, intent: Intent) -> Result<()> {
        validate_intent(&intent)?;
        let thermostat = self.fresh_thermostat(device_id).await?;
        check_capability(&thermostat, &intent).inspect_err(|e| warn!("{e}"))?;

        let body = merge_intent(&thermostat.changeable_values, &intent);
        self.inner.gateway.with_logger(|l| l.log_command(intent.action(), device_id, &body));

        let req = ApiRequest::post(thermostat_path(device_id), body).query("locationId", &thermostat.location_id);
        self.inner.gateway.send(&req).await?;
        debug!(device_id, action = intent.action(), "command accepted");

        self.schedule_refresh();
        Ok(())
    }

    fn schedule_refresh(&self) {
        let Some(delay) = self.inner.post_command_refresh else {
            return;
        };
        let client = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = client.discover().await {
                warn!("post-command refresh failed: {e}");
            }
        });
    }
}
