use std::fmt;

use serde_json::{Map, Number, Value};

pub const PERMANENT_HOLD: &str = "PermanentHold";
pub const NO_HOLD: &str = "NoHold";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    Fahrenheit,
    Celsius,
}

impl TemperatureUnit {
    /// Parses the vendor `units` field ("Fahrenheit", "Celsius", "F", "C").
    pub fn from_vendor_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fahrenheit" | "f" => Some(TemperatureUnit::Fahrenheit),
            "celsius" | "c" => Some(TemperatureUnit::Celsius),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "\u{00b0}F",
            TemperatureUnit::Celsius => "\u{00b0}C",
        }
    }
}

/// Display conversion between units.
/// Celsius results are rounded to the nearest 0.5, Fahrenheit to whole degrees.
pub fn convert_temperature(value: f64, from: TemperatureUnit, to: TemperatureUnit) -> f64 {
    match (from, to) {
        (TemperatureUnit::Fahrenheit, TemperatureUnit::Celsius) => {
            ((value - 32.0) * 5.0 / 9.0 * 2.0).round() / 2.0
        }
        (TemperatureUnit::Celsius, TemperatureUnit::Fahrenheit) => (value * 9.0 / 5.0 + 32.0).round(),
        _ => value,
    }
}

/// A reading or setpoint in the thermostat's native unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature {
    value: f64,
    unit: TemperatureUnit,
}

impl Temperature {
    pub fn new(value: f64, unit: TemperatureUnit) -> Self {
        Self { value, unit }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> TemperatureUnit {
        self.unit
    }

    /// Presentation-only conversion. Never send the result to the vendor.
    pub fn to_unit(&self, unit: TemperatureUnit) -> Self {
        Self::new(convert_temperature(self.value, self.unit, unit), unit)
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}{}", self.value, self.unit.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    Auto,
    EmergencyHeat,
}

impl HvacMode {
    /// Vendor `mode` string. Emergency heat rides on `Heat` plus a flag.
    pub fn as_vendor_str(&self) -> &'static str {
        match self {
            HvacMode::Off => "Off",
            HvacMode::Heat | HvacMode::EmergencyHeat => "Heat",
            HvacMode::Cool => "Cool",
            HvacMode::Auto => "Auto",
        }
    }

    pub fn from_vendor_str(s: &str) -> Option<Self> {
        match s {
            "Off" => Some(HvacMode::Off),
            "Heat" => Some(HvacMode::Heat),
            "Cool" => Some(HvacMode::Cool),
            "Auto" => Some(HvacMode::Auto),
            _ => None,
        }
    }

    /// Lenient parse of host/user input: "heat", "Cool", "emergency heat", "emergencyHeat".
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "off" => Some(HvacMode::Off),
            "heat" => Some(HvacMode::Heat),
            "cool" => Some(HvacMode::Cool),
            "auto" => Some(HvacMode::Auto),
            "emergencyheat" | "auxheat" => Some(HvacMode::EmergencyHeat),
            _ => None,
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HvacMode::EmergencyHeat => f.write_str("emergency heat"),
            other => f.write_str(&other.as_vendor_str().to_ascii_lowercase()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanMode {
    On,
    Auto,
    Circulate,
}

impl FanMode {
    pub fn as_vendor_str(&self) -> &'static str {
        match self {
            FanMode::On => "On",
            FanMode::Auto => "Auto",
            FanMode::Circulate => "Circulate",
        }
    }

    /// Case-insensitive; accepts both vendor and host spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Some(FanMode::On),
            "auto" => Some(FanMode::Auto),
            "circulate" => Some(FanMode::Circulate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OperatingMode {
    Heat,
    Cool,
    #[default]
    EquipmentOff,
    Other(String),
}

impl OperatingMode {
    pub fn from_vendor_str(s: &str) -> Self {
        match s {
            "Heat" => OperatingMode::Heat,
            "Cool" => OperatingMode::Cool,
            "EquipmentOff" => OperatingMode::EquipmentOff,
            other => OperatingMode::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperatingStatus {
    pub mode: OperatingMode,
    pub fan_request: bool,
    pub circulation_fan_request: bool,
}

impl OperatingStatus {
    pub fn from_json(data: &Value) -> Self {
        Self {
            mode: data
                .get("mode")
                .and_then(coerce_string)
                .map(|s| OperatingMode::from_vendor_str(&s))
                .unwrap_or_default(),
            fan_request: data.get("fanRequest").and_then(coerce_bool).unwrap_or(false),
            circulation_fan_request: data
                .get("circulationFanRequest")
                .and_then(coerce_bool)
                .unwrap_or(false),
        }
    }
}

/// The vendor's mutable thermostat configuration.
///
/// Fields the write API cares about are typed; everything else the read API
/// returned is kept in `extra` so a write can resend the complete object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeableValues {
    pub mode: Option<String>,
    pub heat_setpoint: Option<f64>,
    pub cool_setpoint: Option<f64>,
    pub thermostat_setpoint_status: Option<String>,
    pub emergency_heat_active: Option<bool>,
    pub heat_cool_mode: Option<String>,
    pub end_heat_setpoint: Option<f64>,
    pub end_cool_setpoint: Option<f64>,
    pub auto_changeover_active: Option<bool>,
    pub next_period_time: Option<String>,
    pub extra: Map<String, Value>,
}

const TYPED_FIELDS: &[&str] = &[
    "mode",
    "heatSetpoint",
    "coolSetpoint",
    "thermostatSetpointStatus",
    "emergencyHeatActive",
    "heatCoolMode",
    "endHeatSetpoint",
    "endCoolSetpoint",
    "autoChangeoverActive",
    "nextPeriodTime",
];

impl ChangeableValues {
    /// Coerces loosely typed vendor JSON into the strict schema.
    /// A key that is present but `null` still counts as present.
    ///
    /// Typed keys whose value could not be coerced (usually `null`) stay in
    /// `extra` verbatim, so they are resent exactly as read.
    pub fn from_json(data: &Value) -> Self {
        let Some(obj) = data.as_object() else {
            return Self::default();
        };

        let mut values = Self {
            mode: obj.get("mode").and_then(coerce_string),
            heat_setpoint: obj.get("heatSetpoint").and_then(coerce_f64),
            cool_setpoint: obj.get("coolSetpoint").and_then(coerce_f64),
            thermostat_setpoint_status: obj.get("thermostatSetpointStatus").and_then(coerce_string),
            emergency_heat_active: obj
                .get("emergencyHeatActive")
                .map(|v| coerce_bool(v).unwrap_or(false)),
            heat_cool_mode: obj.get("heatCoolMode").and_then(coerce_string),
            end_heat_setpoint: obj.get("endHeatSetpoint").and_then(coerce_f64),
            end_cool_setpoint: obj.get("endCoolSetpoint").and_then(coerce_f64),
            auto_changeover_active: obj.get("autoChangeoverActive").and_then(coerce_bool),
            next_period_time: obj.get("nextPeriodTime").and_then(coerce_string),
            extra: Map::new(),
        };

        let typed = values.to_json();
        values.extra = obj
            .iter()
            .filter(|(k, _)| !TYPED_FIELDS.contains(&k.as_str()) || typed.get(k.as_str()).is_none())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        values
    }

    /// The complete object as the write API expects it.
    pub fn to_json(&self) -> Value {
        let mut obj = self.extra.clone();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(v) = value {
                obj.insert(key.to_string(), v);
            }
        };
        put("mode", self.mode.clone().map(Value::String));
        put("heatSetpoint", self.heat_setpoint.map(number));
        put("coolSetpoint", self.cool_setpoint.map(number));
        put(
            "thermostatSetpointStatus",
            self.thermostat_setpoint_status.clone().map(Value::String),
        );
        put("emergencyHeatActive", self.emergency_heat_active.map(Value::Bool));
        put("heatCoolMode", self.heat_cool_mode.clone().map(Value::String));
        put("endHeatSetpoint", self.end_heat_setpoint.map(number));
        put("endCoolSetpoint", self.end_cool_setpoint.map(number));
        put("autoChangeoverActive", self.auto_changeover_active.map(Value::Bool));
        put("nextPeriodTime", self.next_period_time.clone().map(Value::String));
        Value::Object(obj)
    }

    /// Presence of `emergencyHeatActive` means the unit has auxiliary heat.
    pub fn supports_emergency_heat(&self) -> bool {
        self.emergency_heat_active.is_some()
    }
}

/// Integral values serialize as JSON integers, the rest as floats.
pub(crate) fn number(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Value::Number(Number::from(v as i64))
    } else {
        Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
    }
}

pub(crate) fn coerce_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|f: &f64| f.is_finite())
}

pub(crate) fn coerce_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

pub(crate) fn coerce_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thermostat {
    pub device_id: String,
    pub location_id: String,
    pub location_name: String,
    pub display_name: String,
    pub device_model: String,
    pub native_unit: TemperatureUnit,
    pub changeable_values: ChangeableValues,
    pub operation_status: OperatingStatus,
    pub fan_mode: Option<FanMode>,
    pub indoor_temperature: Option<f64>,
    pub indoor_humidity: Option<f64>,
    pub outdoor_temperature: Option<f64>,
    pub allowed_modes: Vec<String>,
    pub is_alive: bool,
}

impl Thermostat {
    /// Logical mode, folding the emergency-heat flag into `Heat`.
    pub fn mode(&self) -> Option<HvacMode> {
        let mode = HvacMode::from_vendor_str(self.changeable_values.mode.as_deref()?)?;
        if mode == HvacMode::Heat && self.changeable_values.emergency_heat_active == Some(true) {
            return Some(HvacMode::EmergencyHeat);
        }
        Some(mode)
    }

    pub fn indoor(&self) -> Option<Temperature> {
        self.indoor_temperature.map(|v| Temperature::new(v, self.native_unit))
    }

    pub fn outdoor(&self) -> Option<Temperature> {
        self.outdoor_temperature.map(|v| Temperature::new(v, self.native_unit))
    }

    pub fn heat_setpoint(&self) -> Option<Temperature> {
        self.changeable_values
            .heat_setpoint
            .map(|v| Temperature::new(v, self.native_unit))
    }

    pub fn cool_setpoint(&self) -> Option<Temperature> {
        self.changeable_values
            .cool_setpoint
            .map(|v| Temperature::new(v, self.native_unit))
    }

    pub fn is_permanent_hold(&self) -> bool {
        self.changeable_values.thermostat_setpoint_status.as_deref() == Some(PERMANENT_HOLD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityType {
    PickARoom,
    WholeHouse,
    FollowMe,
}

impl PriorityType {
    pub fn as_vendor_str(&self) -> &'static str {
        match self {
            PriorityType::PickARoom => "PickARoom",
            PriorityType::WholeHouse => "WholeHouse",
            PriorityType::FollowMe => "FollowMe",
        }
    }

    pub fn from_vendor_str(s: &str) -> Option<Self> {
        match s {
            "PickARoom" => Some(PriorityType::PickARoom),
            "WholeHouse" => Some(PriorityType::WholeHouse),
            "FollowMe" => Some(PriorityType::FollowMe),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Priority {
    pub priority_type: PriorityType,
    pub selected_rooms: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: u32,
    pub name: String,
    pub avg_temperature: Option<f64>,
    pub avg_humidity: Option<f64>,
}

/// Emitted when a discovery snapshot differs from the previous one.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ThermostatAdded { device_id: String, name: String },
    ThermostatRemoved { device_id: String },
    TemperatureChanged { device_id: String, name: String, temp: Temperature },
    HumidityChanged { device_id: String, name: String, humidity: f64 },
    OutdoorTemperatureChanged { device_id: String, temp: Temperature },
    ModeChanged { device_id: String, name: String, mode: HvacMode },
    SetpointsChanged { device_id: String, name: String, heat: Option<Temperature>, cool: Option<Temperature> },
    HoldChanged { device_id: String, name: String, permanent: bool },
    FanModeChanged { device_id: String, name: String, mode: FanMode },
    OperatingChanged { device_id: String, name: String, status: OperatingStatus },
}

/// Result shape handed back to the host device layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self { success: false, error: Some(msg.into()) }
    }
}

impl<T> From<crate::Result<T>> for CommandOutcome {
    fn from(result: crate::Result<T>) -> Self {
        match result {
            Ok(_) => CommandOutcome::ok(),
            Err(e) => CommandOutcome::failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn changeable_values_coerces_loose_types() {
        let cv = ChangeableValues::from_json(&json!({
            "mode": "Heat",
            "heatSetpoint": "68.5",
            "coolSetpoint": 76,
            "autoChangeoverActive": "true",
            "nextPeriodTime": 1800,
            "someVendorField": [1, 2]
        }));
        assert_eq!(cv.mode.as_deref(), Some("Heat"));
        assert_eq!(cv.heat_setpoint, Some(68.5));
        assert_eq!(cv.cool_setpoint, Some(76.0));
        assert_eq!(cv.auto_changeover_active, Some(true));
        assert_eq!(cv.next_period_time.as_deref(), Some("1800"));
        assert_eq!(cv.extra["someVendorField"], json!([1, 2]));
        assert!(!cv.supports_emergency_heat());
    }

    #[test]
    fn emergency_heat_presence_is_capability() {
        let cv = ChangeableValues::from_json(&json!({"mode": "Heat", "emergencyHeatActive": false}));
        assert!(cv.supports_emergency_heat());
        let cv = ChangeableValues::from_json(&json!({"mode": "Heat", "emergencyHeatActive": null}));
        assert!(cv.supports_emergency_heat());
    }

    #[test]
    fn uncoercible_typed_fields_pass_through() {
        let raw = json!({
            "mode": "Heat",
            "heatSetpoint": 68,
            "nextPeriodTime": null,
            "endHeatSetpoint": null,
            "heatCoolMode": {"odd": true}
        });
        let cv = ChangeableValues::from_json(&raw);
        assert_eq!(cv.next_period_time, None);
        assert_eq!(cv.end_heat_setpoint, None);
        assert_eq!(cv.to_json(), raw);
    }

    #[test]
    fn to_json_keeps_unknown_fields() {
        let raw = json!({"mode": "Cool", "heatSetpoint": 68, "coolSetpoint": 75.5, "vendorThing": "x"});
        let out = ChangeableValues::from_json(&raw).to_json();
        assert_eq!(out, raw);
        assert!(out["heatSetpoint"].is_i64());
    }

    #[test]
    fn hvac_mode_parse_host_strings() {
        assert_eq!(HvacMode::parse("heat"), Some(HvacMode::Heat));
        assert_eq!(HvacMode::parse("Emergency Heat"), Some(HvacMode::EmergencyHeat));
        assert_eq!(HvacMode::parse("emergencyHeat"), Some(HvacMode::EmergencyHeat));
        assert_eq!(HvacMode::parse("dry"), None);
        assert_eq!(HvacMode::EmergencyHeat.as_vendor_str(), "Heat");
    }

    #[test]
    fn outcome_from_result() {
        let ok: crate::Result<()> = Ok(());
        assert_eq!(CommandOutcome::from(ok), CommandOutcome::ok());
        let err: crate::Result<()> = Err(crate::Error::NotFound("LCC-X".into()));
        let outcome = CommandOutcome::from(err);
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("LCC-X"));
    }
}
