use resideo_t10::{convert_temperature, HvacMode, Temperature, TemperatureUnit};

use TemperatureUnit::{Celsius, Fahrenheit};

#[test]
fn fahrenheit_to_celsius_rounds_to_half_degrees() {
    assert_eq!(convert_temperature(70.0, Fahrenheit, Celsius), 21.0);
    assert_eq!(convert_temperature(72.0, Fahrenheit, Celsius), 22.0);
    assert_eq!(convert_temperature(68.0, Fahrenheit, Celsius), 20.0);
    assert_eq!(convert_temperature(71.0, Fahrenheit, Celsius), 21.5);
    assert_eq!(convert_temperature(32.0, Fahrenheit, Celsius), 0.0);
}

#[test]
fn celsius_to_fahrenheit_rounds_to_whole_degrees() {
    assert_eq!(convert_temperature(21.0, Celsius, Fahrenheit), 70.0);
    assert_eq!(convert_temperature(22.0, Celsius, Fahrenheit), 72.0);
    assert_eq!(convert_temperature(22.5, Celsius, Fahrenheit), 73.0);
    assert_eq!(convert_temperature(-40.0, Celsius, Fahrenheit), -40.0);
}

#[test]
fn same_unit_is_untouched() {
    assert_eq!(convert_temperature(70.3, Fahrenheit, Fahrenheit), 70.3);
    assert_eq!(convert_temperature(21.3, Celsius, Celsius), 21.3);
}

#[test]
fn temperature_display_and_conversion() {
    let t = Temperature::new(70.0, Fahrenheit);
    assert_eq!(t.to_string(), "70.0\u{00b0}F");

    let c = t.to_unit(Celsius);
    assert_eq!(c.value(), 21.0);
    assert_eq!(c.unit(), Celsius);
}

#[test]
fn unit_parsing() {
    assert_eq!(TemperatureUnit::from_vendor_str("Celsius"), Some(Celsius));
    assert_eq!(TemperatureUnit::from_vendor_str("F"), Some(Fahrenheit));
    assert_eq!(TemperatureUnit::from_vendor_str("Kelvin"), None);
}

#[test]
fn mode_parsing_is_lenient() {
    assert_eq!(HvacMode::parse("emergency heat"), Some(HvacMode::EmergencyHeat));
    assert_eq!(HvacMode::parse("emergencyHeat"), Some(HvacMode::EmergencyHeat));
    assert_eq!(HvacMode::parse("COOL"), Some(HvacMode::Cool));
    assert_eq!(HvacMode::parse("dry"), None);
}
