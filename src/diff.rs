use serde_json::Value;

use crate::types::*;

pub(crate) fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<(String, Value, Value)>,
) {
    let child = |key: &str| {
        if path_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{path_prefix}.{key}")
        }
    };

    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = child(key);
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None => {
                        if curr_val.is_object() {
                            diff_json(&Value::Object(serde_json::Map::new()), curr_val, &path, changes);
                        } else {
                            changes.push((path, Value::Null, curr_val.clone()));
                        }
                    }
                }
            }
        }
        (Value::Array(prev_arr), Value::Array(curr_arr)) if prev_arr.len() == curr_arr.len() => {
            for (idx, (p, c)) in prev_arr.iter().zip(curr_arr).enumerate() {
                diff_json(p, c, &child(&idx.to_string()), changes);
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

/// Compares two discovery snapshots and reports what a device driver would
/// mirror onto its attributes.
pub(crate) fn diff_snapshots(previous: &[Thermostat], current: &[Thermostat]) -> Vec<Event> {
    let mut events = Vec::new();

    for curr in current {
        let Some(prev) = previous.iter().find(|p| p.device_id == curr.device_id) else {
            events.push(Event::ThermostatAdded {
                device_id: curr.device_id.clone(),
                name: curr.display_name.clone(),
            });
            continue;
        };
        diff_thermostat(prev, curr, &mut events);
    }

    for prev in previous {
        if !current.iter().any(|c| c.device_id == prev.device_id) {
            events.push(Event::ThermostatRemoved {
                device_id: prev.device_id.clone(),
            });
        }
    }

    events
}

fn diff_thermostat(prev: &Thermostat, curr: &Thermostat, events: &mut Vec<Event>) {
    let device_id = || curr.device_id.clone();
    let name = || curr.display_name.clone();

    if prev.indoor_temperature != curr.indoor_temperature
        && let Some(temp) = curr.indoor()
    {
        events.push(Event::TemperatureChanged {
            device_id: device_id(),
            name: name(),
            temp,
        });
    }

    if prev.indoor_humidity != curr.indoor_humidity
        && let Some(humidity) = curr.indoor_humidity
    {
        events.push(Event::HumidityChanged {
            device_id: device_id(),
            name: name(),
            humidity,
        });
    }

    if prev.outdoor_temperature != curr.outdoor_temperature
        && let Some(temp) = curr.outdoor()
    {
        events.push(Event::OutdoorTemperatureChanged {
            device_id: device_id(),
            temp,
        });
    }

    if prev.mode() != curr.mode()
        && let Some(mode) = curr.mode()
    {
        events.push(Event::ModeChanged {
            device_id: device_id(),
            name: name(),
            mode,
        });
    }

    let prev_cv = &prev.changeable_values;
    let curr_cv = &curr.changeable_values;
    if prev_cv.heat_setpoint != curr_cv.heat_setpoint || prev_cv.cool_setpoint != curr_cv.cool_setpoint {
        events.push(Event::SetpointsChanged {
            device_id: device_id(),
            name: name(),
            heat: curr.heat_setpoint(),
            cool: curr.cool_setpoint(),
        });
    }

    if prev.is_permanent_hold() != curr.is_permanent_hold() {
        events.push(Event::HoldChanged {
            device_id: device_id(),
            name: name(),
            permanent: curr.is_permanent_hold(),
        });
    }

    if prev.fan_mode != curr.fan_mode
        && let Some(mode) = curr.fan_mode
    {
        events.push(Event::FanModeChanged {
            device_id: device_id(),
            name: name(),
            mode,
        });
    }

    if prev.operation_status != curr.operation_status {
        events.push(Event::OperatingChanged {
            device_id: device_id(),
            name: name(),
            status: curr.operation_status.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn thermostat(id: &str) -> Thermostat {
        Thermostat {
            device_id: id.into(),
            location_id: "L1".into(),
            location_name: "Home".into(),
            display_name: format!("T {id}"),
            device_model: "T10".into(),
            native_unit: TemperatureUnit::Fahrenheit,
            changeable_values: ChangeableValues::from_json(&json!({
                "mode": "Heat", "heatSetpoint": 68, "coolSetpoint": 76,
                "thermostatSetpointStatus": "NoHold"
            })),
            operation_status: OperatingStatus::default(),
            fan_mode: Some(FanMode::Auto),
            indoor_temperature: Some(70.0),
            indoor_humidity: Some(40.0),
            outdoor_temperature: None,
            allowed_modes: vec![],
            is_alive: true,
        }
    }

    #[test]
    fn diff_detects_leaf_change() {
        let prev = json!({"status": {"temperature": 71.0}});
        let curr = json!({"status": {"temperature": 72.0}});
        let mut changes = vec![];
        diff_json(&prev, &curr, "", &mut changes);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, "status.temperature");
        assert_eq!(changes[0].1, json!(71.0));
        assert_eq!(changes[0].2, json!(72.0));
    }

    #[test]
    fn diff_walks_arrays_by_index() {
        let prev = json!([{"devices": [{"indoorTemperature": 70}]}]);
        let curr = json!([{"devices": [{"indoorTemperature": 71}]}]);
        let mut changes = vec![];
        diff_json(&prev, &curr, "", &mut changes);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, "0.devices.0.indoorTemperature");
    }

    #[test]
    fn diff_ignores_unchanged() {
        let val = json!({"status": {"temperature": 71.0, "humidity": 45.0}});
        let mut changes = vec![];
        diff_json(&val, &val, "", &mut changes);
        assert!(changes.is_empty());
    }

    #[test]
    fn first_snapshot_reports_additions() {
        let events = diff_snapshots(&[], &[thermostat("A"), thermostat("B")]);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Event::ThermostatAdded { device_id, .. } if device_id == "A"));
    }

    #[test]
    fn unchanged_snapshot_is_quiet() {
        let events = diff_snapshots(&[thermostat("A")], &[thermostat("A")]);
        assert!(events.is_empty());
    }

    #[test]
    fn mode_and_setpoint_changes() {
        let prev = thermostat("A");
        let mut curr = thermostat("A");
        curr.changeable_values.mode = Some("Cool".into());
        curr.changeable_values.cool_setpoint = Some(74.0);
        curr.changeable_values.thermostat_setpoint_status = Some(PERMANENT_HOLD.into());

        let events = diff_snapshots(&[prev], &[curr]);
        assert!(events.iter().any(|e| matches!(e, Event::ModeChanged { mode: HvacMode::Cool, .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            Event::SetpointsChanged { cool: Some(t), .. } if t.value() == 74.0
        )));
        assert!(events.iter().any(|e| matches!(e, Event::HoldChanged { permanent: true, .. })));
    }

    #[test]
    fn removed_thermostat() {
        let events = diff_snapshots(&[thermostat("A"), thermostat("B")], &[thermostat("A")]);
        assert_eq!(
            events,
            vec![Event::ThermostatRemoved {
                device_id: "B".into()
            }]
        );
    }
}
