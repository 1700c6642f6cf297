use chrono::{DateTime, Utc};
use colored::Colorize;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// A diagnostic event reported by the command-line tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub level: String,     // "info", "warn", "error"
    pub tag: String,       // e.g. "load", "validate", "run", "fault"
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

static LOG_FORMAT: Lazy<Mutex<LogFormat>> = Lazy::new(|| Mutex::new(LogFormat::Pretty));
static LOG_FILE: Lazy<Mutex<Option<String>>> = Lazy::new(|| Mutex::new(None));

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Event {
    pub fn new(
        level: impl Into<String>,
        tag: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let now: DateTime<Utc> = Utc::now();

        Self {
            level: level.into(),
            tag: tag.into(),
            message: message.into(),
            timestamp: now.to_rfc3339(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn info(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new("info", tag, message)
    }

    pub fn warn(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new("warn", tag, message)
    }

    pub fn error(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new("error", tag, message)
    }

    /// Write the event to stderr in the configured format.
    pub fn emit(&self) -> io::Result<()> {
        let format = *lock(&LOG_FORMAT);
        let log_file = lock(&LOG_FILE).clone();

        match format {
            LogFormat::Pretty => self.emit_pretty(log_file),
            LogFormat::Json => self.emit_json(log_file),
        }
    }

    fn clock(&self) -> &str {
        self.timestamp
            .split('T')
            .nth(1)
            .unwrap_or(&self.timestamp)
            .split('.')
            .next()
            .unwrap_or("")
    }

    fn pretty_line(&self) -> String {
        let level = format!("[{}]", self.level.to_uppercase());
        let level = match self.level.as_str() {
            "info" => level.green(),
            "warn" => level.yellow(),
            "error" => level.red().bold(),
            _ => level.normal(),
        };
        format!("{} {} [{}] {}", self.clock().dimmed(), level, self.tag, self.message)
    }

    fn emit_pretty(&self, log_file: Option<String>) -> io::Result<()> {
        eprintln!("{}", self.pretty_line());

        if let Some(file_path) = log_file {
            let plain_line = format!(
                "{} [{}] [{}] {}",
                self.timestamp,
                self.level.to_uppercase(),
                self.tag,
                self.message
            );
            append_to_file(&file_path, &plain_line)?;
        }

        Ok(())
    }

    fn emit_json(&self, log_file: Option<String>) -> io::Result<()> {
        let json = serde_json::to_string(&self)?;

        eprintln!("{}", json);

        if let Some(file_path) = log_file {
            append_to_file(&file_path, &json)?;
        }

        Ok(())
    }
}

pub fn set_log_format(format: LogFormat) {
    *lock(&LOG_FORMAT) = format;
}

pub fn set_log_file(file_path: Option<String>) {
    *lock(&LOG_FILE) = file_path;
}

fn append_to_file(file_path: &str, content: &str) -> io::Result<()> {
    let path = Path::new(file_path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", content)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = Event::error("fault", "Null function call")
            .with_data(serde_json::json!({ "statement": 12 }));
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["tag"], "fault");
        assert_eq!(json["data"]["statement"], 12);
        assert!(DateTime::parse_from_rfc3339(&event.timestamp).is_ok());
    }

    #[test]
    fn test_event_without_data_omits_field() {
        let json = serde_json::to_string(&Event::info("load", "ok")).unwrap();
        assert!(!json.contains("\"data\""));
    }

    #[test]
    fn test_constructors_accept_mixed_string_types() {
        let event = Event::warn("assemble", format!("{} functions", 0));
        assert_eq!(event.level, "warn");
        assert_eq!(event.message, "0 functions");

        let event = Event::new(String::from("info"), "run", "done");
        assert_eq!(event.tag, "run");
    }

    #[test]
    fn test_append_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("events.log");
        let path = path.to_str().unwrap();
        append_to_file(path, "first").unwrap();
        append_to_file(path, "second").unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "first\nsecond\n");
    }
}
