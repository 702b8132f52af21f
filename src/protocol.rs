use serde_json::Value;
use url::Url;

use crate::error::AuthError;
use crate::types::{coerce_f64, coerce_string, Priority, PriorityType, Room};
use crate::{Error, Result};

pub const DEFAULT_API_BASE: &str = "https://api.honeywell.com/v2";
pub const DEFAULT_AUTH_BASE: &str = "https://api.honeywell.com/oauth2";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/callback";

pub const THERMOSTAT_DEVICE_TYPE: &str = "Thermostat";

pub const LOCATIONS_PATH: &str = "/locations";

pub fn thermostat_path(device_id: &str) -> String {
    format!("/devices/thermostats/{device_id}")
}

pub fn fan_path(device_id: &str) -> String {
    format!("/devices/thermostats/{device_id}/fan")
}

pub fn priority_path(device_id: &str) -> String {
    format!("/devices/thermostats/{device_id}/priority")
}

pub fn rooms_path(device_id: &str, group_id: u32) -> String {
    format!("/devices/thermostats/{device_id}/group/{group_id}/rooms")
}

/// Browser URL for the user-consent step. The vendor wants an explicitly empty scope.
pub fn authorization_url(auth_base: &str, client_id: &str, redirect_uri: &str) -> Result<Url> {
    let url = Url::parse_with_params(
        &format!("{}/authorize", auth_base.trim_end_matches('/')),
        &[
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("scope", ""),
        ],
    )?;
    Ok(url)
}

pub fn token_url(auth_base: &str) -> String {
    format!("{}/token", auth_base.trim_end_matches('/'))
}

pub fn authorization_code_form(code: &str, redirect_uri: &str) -> Vec<(&'static str, String)> {
    vec![
        ("grant_type", "authorization_code".to_string()),
        ("code", code.to_string()),
        ("redirect_uri", redirect_uri.to_string()),
    ]
}

pub fn refresh_token_form(refresh_token: &str) -> Vec<(&'static str, String)> {
    vec![
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", refresh_token.to_string()),
    ]
}

/// Extracts the authorization code from the OAuth redirect.
///
/// Accepts the full redirect URL or just its query string. An `error`
/// parameter wins over `code`.
pub fn parse_callback(input: &str) -> Result<String> {
    let query = match input.split_once('?') {
        Some((_, q)) => q,
        None => input,
    };

    let mut code = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(err) = error {
        let msg = match description {
            Some(d) => format!("{err}: {d}"),
            None => err,
        };
        return Err(Error::Auth(AuthError::Callback(msg)));
    }

    match code {
        Some(c) if !c.is_empty() => Ok(c),
        _ => Err(Error::Auth(AuthError::Callback("no authorization code in callback".to_string()))),
    }
}

/// Reads `{ "currentPriority": { "priorityType": ..., "selectedRooms": [...] } }`.
pub fn parse_priority(body: &Value) -> Option<Priority> {
    let current = body.get("currentPriority").unwrap_or(body);
    let priority_type = current
        .get("priorityType")
        .and_then(|v| v.as_str())
        .and_then(PriorityType::from_vendor_str)?;
    let selected_rooms = current
        .get("selectedRooms")
        .and_then(|v| v.as_array())
        .map(|rooms| {
            rooms
                .iter()
                .filter_map(|r| coerce_f64(r).map(|f| f as u32))
                .collect()
        })
        .unwrap_or_default();
    Some(Priority {
        priority_type,
        selected_rooms,
    })
}

pub fn parse_rooms(body: &Value) -> Vec<Room> {
    let Some(Value::Array(rooms)) = body.get("rooms") else {
        return vec![];
    };
    rooms
        .iter()
        .filter_map(|room| {
            let id = room.get("id").and_then(coerce_f64)? as u32;
            Some(Room {
                id,
                name: room
                    .get("name")
                    .and_then(coerce_string)
                    .unwrap_or_default(),
                avg_temperature: room.get("avgTemperature").and_then(coerce_f64),
                avg_humidity: room.get("avgHumidity").and_then(coerce_f64),
            })
        })
        .collect()
}
