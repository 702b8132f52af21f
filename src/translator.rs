//! Builds vendor write bodies from logical commands.
//!
//! The thermostat write endpoint only behaves when it receives the complete
//! changeable-values object, so every body starts as a copy of the current
//! state with just the intended fields replaced.

use serde_json::{json, Value};

use crate::types::{ChangeableValues, FanMode, HvacMode, PriorityType, Thermostat, PERMANENT_HOLD};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    SetTemperature { heat: Option<f64>, cool: Option<f64> },
    SetMode(HvacMode),
}

impl Intent {
    pub fn action(&self) -> &'static str {
        match self {
            Intent::SetTemperature { .. } => "set_temperature",
            Intent::SetMode(HvacMode::EmergencyHeat) => "emergency_heat",
            Intent::SetMode(_) => "set_mode",
        }
    }
}

/// Rejects malformed setpoints before any network traffic.
pub fn validate_intent(intent: &Intent) -> Result<()> {
    if let Intent::SetTemperature { heat, cool } = *intent {
        for setpoint in [heat, cool].into_iter().flatten() {
            if !setpoint.is_finite() {
                return Err(Error::InvalidSetpoint(setpoint));
            }
        }
    }
    Ok(())
}

/// Rejects intents the physical unit cannot carry out, before anything is sent.
pub fn check_capability(thermostat: &Thermostat, intent: &Intent) -> Result<()> {
    if let Intent::SetMode(HvacMode::EmergencyHeat) = intent
        && !thermostat.changeable_values.supports_emergency_heat()
    {
        return Err(Error::UnsupportedCapability {
            device_id: thermostat.device_id.clone(),
            capability: "emergency heat",
        });
    }
    Ok(())
}

pub fn merge_intent(current: &ChangeableValues, intent: &Intent) -> Value {
    let mut next = current.clone();
    next.thermostat_setpoint_status = Some(PERMANENT_HOLD.to_string());

    match *intent {
        Intent::SetTemperature { heat, cool } => {
            if let Some(h) = heat {
                next.heat_setpoint = Some(h);
            }
            if let Some(c) = cool {
                next.cool_setpoint = Some(c);
            }
        }
        Intent::SetMode(mode) => {
            next.mode = Some(mode.as_vendor_str().to_string());
            if mode == HvacMode::EmergencyHeat {
                next.emergency_heat_active = Some(true);
            } else if next.emergency_heat_active.is_some() {
                next.emergency_heat_active = Some(false);
            }
            // strict write schema: whole-degree setpoints
            next.heat_setpoint = next.heat_setpoint.map(round_half_up);
            next.cool_setpoint = next.cool_setpoint.map(round_half_up);
            next.end_heat_setpoint = next.end_heat_setpoint.map(round_half_up);
            next.end_cool_setpoint = next.end_cool_setpoint.map(round_half_up);
        }
    }

    next.to_json()
}

pub fn fan_body(mode: FanMode) -> Value {
    json!({ "mode": mode.as_vendor_str() })
}

pub fn priority_body(priority_type: PriorityType, selected_rooms: Option<&[u32]>) -> Value {
    let mut current = json!({ "priorityType": priority_type.as_vendor_str() });
    if let Some(rooms) = selected_rooms {
        current["selectedRooms"] = json!(rooms);
    }
    json!({ "currentPriority": current })
}

fn round_half_up(v: f64) -> f64 {
    (v + 0.5).floor()
}
