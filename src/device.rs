//! Command surface for a home-automation device driver.
//!
//! Each call reports `CommandOutcome` instead of an error so the host layer
//! never sees a failure escape the integration boundary.

use tracing::warn;

use crate::client::ResideoClient;
use crate::types::{CommandOutcome, FanMode, HvacMode, Thermostat};
use crate::{Error, Result};

pub struct ThermostatDevice {
    client: ResideoClient,
    device_id: String,
}

impl ThermostatDevice {
    pub(crate) fn new(client: ResideoClient, device_id: impl Into<String>) -> Self {
        Self {
            client,
            device_id: device_id.into(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Last known snapshot from the shared directory.
    pub fn state(&self) -> Option<Thermostat> {
        self.client.thermostat(&self.device_id)
    }

    pub async fn set_heating_setpoint(&self, setpoint: f64) -> CommandOutcome {
        self.outcome(
            "setHeatingSetpoint",
            self.client.set_heating_setpoint(&self.device_id, setpoint).await,
        )
    }

    pub async fn set_cooling_setpoint(&self, setpoint: f64) -> CommandOutcome {
        self.outcome(
            "setCoolingSetpoint",
            self.client.set_cooling_setpoint(&self.device_id, setpoint).await,
        )
    }

    pub async fn set_thermostat_mode(&self, mode: &str) -> CommandOutcome {
        let result = match HvacMode::parse(mode) {
            Some(m) => self.client.set_mode(&self.device_id, m).await,
            None => Err(Error::InvalidMode(mode.to_string())),
        };
        self.outcome("setThermostatMode", result)
    }

    pub async fn set_thermostat_fan_mode(&self, mode: &str) -> CommandOutcome {
        let result = match FanMode::parse(mode) {
            Some(m) => self.client.set_fan_mode(&self.device_id, m).await,
            None => Err(Error::InvalidFanMode(mode.to_string())),
        };
        self.outcome("setThermostatFanMode", result)
    }

    pub async fn emergency_heat(&self) -> CommandOutcome {
        self.outcome("emergencyHeat", self.client.emergency_heat(&self.device_id).await)
    }

    pub async fn refresh(&self) -> CommandOutcome {
        let result = self.client.discover().await.and_then(|thermostats| {
            if thermostats.iter().any(|t| t.device_id == self.device_id) {
                Ok(())
            } else {
                Err(Error::NotFound(self.device_id.clone()))
            }
        });
        self.outcome("refresh", result)
    }

    fn outcome(&self, command: &str, result: Result<()>) -> CommandOutcome {
        if let Err(e) = &result {
            warn!(device_id = %self.device_id, command, status = ?e.status(), "command failed: {e}");
        }
        CommandOutcome::from(result)
    }
}
