use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::diff::diff_json;

/// How discovery snapshots are written to the message log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    Full,
    Diffed,
}

/// NDJSON record of traffic with the vendor API. Never contains tokens.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous_state: Option<Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            mode,
            file,
            previous_state: None,
        })
    }

    pub fn log_request(&mut self, method: &str, path: &str, body: Option<&Value>) {
        self.record("req", json!({ "method": method, "path": path, "body": body }));
    }

    pub fn log_response(&mut self, method: &str, path: &str, status: u16, body: &Value) {
        self.record(
            "resp",
            json!({ "method": method, "path": path, "status": status, "body": body }),
        );
    }

    pub fn log_command(&mut self, action: &str, device_id: &str, body: &Value) {
        self.record("cmd", json!({ "action": action, "device": device_id, "body": body }));
    }

    /// Records a `/locations` snapshot, either whole or as changes since the last one.
    pub fn log_poll(&mut self, body: &Value) {
        let fields = match (self.mode, self.previous_state.as_ref()) {
            (MessageLogMode::Full, _) => json!({ "body": body }),
            (MessageLogMode::Diffed, None) => json!({ "full": true, "body": body }),
            (MessageLogMode::Diffed, Some(prev)) => {
                let mut changes = Vec::new();
                diff_json(prev, body, "", &mut changes);
                let changes: Vec<Value> = changes
                    .into_iter()
                    .map(|(path, old, new)| json!({ "path": path, "old": old, "new": new }))
                    .collect();
                json!({ "changes": changes })
            }
        };
        self.record("poll", fields);
        if self.mode == MessageLogMode::Diffed {
            self.previous_state = Some(body.clone());
        }
    }

    /// Stamps `ts` and `dir` onto `fields` and appends the line.
    fn record(&mut self, dir: &str, mut fields: Value) {
        if let Value::Object(map) = &mut fields {
            map.insert("ts".to_string(), Value::String(Utc::now().to_rfc3339()));
            map.insert("dir".to_string(), Value::String(dir.to_string()));
        }
        match serde_json::to_string(&fields) {
            Ok(line) => {
                if let Err(e) = writeln!(self.file, "{line}") {
                    warn!("failed to write message log: {e}");
                }
            }
            Err(e) => warn!("failed to encode message log entry: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn read_lines(path: &str) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn log_request_writes_ndjson() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_request("GET", "/locations", None);

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "req");
        assert_eq!(lines[0]["method"], "GET");
        assert!(lines[0]["ts"].as_str().is_some());
    }

    #[test]
    fn log_response_keeps_status() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_response("POST", "/devices/thermostats/LCC-1", 500, &json!({"code": 500}));

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "resp");
        assert_eq!(lines[0]["status"], 500);
    }

    #[test]
    fn diffed_mode_logs_full_first_then_changes() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Diffed, path).unwrap();

        logger.log_poll(&json!([{"locationID": 1, "devices": [{"indoorTemperature": 71}]}]));
        logger.log_poll(&json!([{"locationID": 1, "devices": [{"indoorTemperature": 72}]}]));
        logger.log_poll(&json!([{"locationID": 1, "devices": [{"indoorTemperature": 72}]}]));

        let lines = read_lines(path);
        assert_eq!(lines[0]["full"], true);
        assert!(lines[0]["body"].is_array());
        assert_eq!(lines[1]["changes"].as_array().unwrap().len(), 1);
        assert_eq!(lines[2]["changes"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn log_command_captures_device() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_command("set_mode", "LCC-1", &json!({"mode": "Heat"}));

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "cmd");
        assert_eq!(lines[0]["action"], "set_mode");
        assert_eq!(lines[0]["device"], "LCC-1");
    }
}
