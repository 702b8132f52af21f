use serde_json::Value;
use tracing::trace;

use crate::diff::diff_snapshots;
use crate::protocol::THERMOSTAT_DEVICE_TYPE;
use crate::types::*;
use crate::{Error, Result};

/// Cached thermostat list. Always replaced as a whole, never merged.
#[derive(Debug, Default)]
pub(crate) struct DeviceDirectory {
    thermostats: Vec<Thermostat>,
}

impl DeviceDirectory {
    pub fn thermostats(&self) -> &[Thermostat] {
        &self.thermostats
    }

    pub fn find(&self, device_id: &str) -> Option<&Thermostat> {
        self.thermostats.iter().find(|t| t.device_id == device_id)
    }

    /// Swaps in a fresh snapshot and returns what changed.
    pub fn replace(&mut self, thermostats: Vec<Thermostat>) -> Vec<Event> {
        let events = diff_snapshots(&self.thermostats, &thermostats);
        self.thermostats = thermostats;
        events
    }
}

fn is_thermostat(device: &Value) -> bool {
    device.get("deviceType").and_then(|v| v.as_str()) == Some(THERMOSTAT_DEVICE_TYPE)
        || device.get("deviceClass").and_then(|v| v.as_str()) == Some(THERMOSTAT_DEVICE_TYPE)
}

/// Flattens a `/locations` response into thermostats tagged with their location.
///
/// Anything but a JSON array (an HTML maintenance page, an empty body) is an
/// error, never an empty account.
pub(crate) fn parse_locations(body: &Value) -> Result<Vec<Thermostat>> {
    let Some(locations) = body.as_array() else {
        let shown: String = body.to_string().chars().take(200).collect();
        return Err(Error::InvalidResponse(format!("locations is not an array: {shown}")));
    };

    let mut thermostats = Vec::new();
    for location in locations {
        let Some(location_id) = location.get("locationID").and_then(coerce_string) else {
            continue;
        };
        let location_name = location
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let Some(Value::Array(devices)) = location.get("devices") else {
            continue;
        };
        for device in devices.iter().filter(|d| is_thermostat(d)) {
            if let Some(t) = parse_thermostat(device, &location_id, &location_name) {
                trace!(device_id = %t.device_id, location_id = %location_id, "found thermostat");
                thermostats.push(t);
            }
        }
    }
    Ok(thermostats)
}

pub(crate) fn parse_thermostat(device: &Value, location_id: &str, location_name: &str) -> Option<Thermostat> {
    let device_id = device.get("deviceID").and_then(coerce_string)?;

    let display_name = device
        .get("userDefinedDeviceName")
        .or_else(|| device.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or(device_id.as_str())
        .to_string();

    let native_unit = device
        .get("units")
        .and_then(|v| v.as_str())
        .and_then(TemperatureUnit::from_vendor_str)
        .unwrap_or(TemperatureUnit::Fahrenheit);

    let fan_mode = device
        .pointer("/settings/fan/changeableValues/mode")
        .and_then(|v| v.as_str())
        .and_then(FanMode::parse);

    let allowed_modes = device
        .get("allowedModes")
        .and_then(|v| v.as_array())
        .map(|modes| modes.iter().filter_map(coerce_string).collect())
        .unwrap_or_default();

    Some(Thermostat {
        device_id,
        location_id: location_id.to_string(),
        location_name: location_name.to_string(),
        display_name,
        device_model: device
            .get("deviceModel")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        native_unit,
        changeable_values: ChangeableValues::from_json(
            device.get("changeableValues").unwrap_or(&Value::Null),
        ),
        operation_status: OperatingStatus::from_json(
            device.get("operationStatus").unwrap_or(&Value::Null),
        ),
        fan_mode,
        indoor_temperature: device.get("indoorTemperature").and_then(coerce_f64),
        indoor_humidity: device.get("indoorHumidity").and_then(coerce_f64),
        outdoor_temperature: device.get("outdoorTemperature").and_then(coerce_f64),
        allowed_modes,
        is_alive: device.get("isAlive").and_then(coerce_bool).unwrap_or(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn locations() -> Value {
        json!([
            {
                "locationID": 123,
                "name": "Home",
                "devices": [
                    {
                        "deviceClass": "Thermostat",
                        "deviceType": "Thermostat",
                        "deviceID": "LCC-A",
                        "userDefinedDeviceName": "Hallway",
                        "deviceModel": "T10",
                        "units": "Celsius",
                        "indoorTemperature": 21.5,
                        "indoorHumidity": "41",
                        "outdoorTemperature": 4,
                        "allowedModes": ["EmergencyHeat", "Heat", "Off", "Cool", "Auto"],
                        "settings": {"fan": {"changeableValues": {"mode": "Circulate"}}},
                        "operationStatus": {"mode": "Heat", "fanRequest": true, "circulationFanRequest": false},
                        "changeableValues": {"mode": "Heat", "heatSetpoint": 21, "coolSetpoint": 25, "emergencyHeatActive": false}
                    },
                    {"deviceType": "Water Leak Detector", "deviceID": "WLD-1"}
                ]
            },
            {
                "locationID": "456",
                "name": "Cabin",
                "devices": [
                    {"deviceClass": "Thermostat", "deviceID": "LCC-B", "changeableValues": {"mode": "Off"}}
                ]
            },
            {"name": "no id", "devices": []}
        ])
    }

    #[test]
    fn parses_thermostats_across_locations() {
        let ts = parse_locations(&locations()).unwrap();
        assert_eq!(ts.len(), 2);

        let a = &ts[0];
        assert_eq!(a.device_id, "LCC-A");
        assert_eq!(a.location_id, "123");
        assert_eq!(a.location_name, "Home");
        assert_eq!(a.display_name, "Hallway");
        assert_eq!(a.native_unit, TemperatureUnit::Celsius);
        assert_eq!(a.indoor_humidity, Some(41.0));
        assert_eq!(a.fan_mode, Some(FanMode::Circulate));
        assert_eq!(a.operation_status.mode, OperatingMode::Heat);
        assert!(a.operation_status.fan_request);
        assert!(a.changeable_values.supports_emergency_heat());
        assert_eq!(a.mode(), Some(HvacMode::Heat));

        let b = &ts[1];
        assert_eq!(b.location_id, "456");
        assert_eq!(b.display_name, "LCC-B");
        assert_eq!(b.native_unit, TemperatureUnit::Fahrenheit);
        assert_eq!(b.mode(), Some(HvacMode::Off));
    }

    #[test]
    fn non_array_body_is_rejected() {
        assert!(matches!(
            parse_locations(&json!({"response_text": "<html>maintenance</html>"})),
            Err(Error::InvalidResponse(_))
        ));
        assert!(parse_locations(&Value::Null).is_err());
        assert!(parse_locations(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn replace_is_wholesale() {
        let mut dir = DeviceDirectory::default();
        let first = dir.replace(parse_locations(&locations()).unwrap());
        assert_eq!(first.len(), 2);
        assert!(dir.find("LCC-B").is_some());

        let only_a: Vec<Thermostat> = parse_locations(&locations()).unwrap()
            .into_iter()
            .filter(|t| t.device_id == "LCC-A")
            .collect();
        dir.replace(only_a);
        assert_eq!(dir.thermostats().len(), 1);
        assert!(dir.find("LCC-B").is_none());
    }
}
