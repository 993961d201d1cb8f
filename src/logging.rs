use chrono::Utc;
use serde_json::{json, Value};

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Logger struct for handling structured logging
#[derive(Debug, Clone)]
pub struct Logger {
    request_id: String,
}

impl Logger {
    /// Create a new Logger instance
    ///
    /// # Arguments
    ///
    /// * `request_id` - A unique identifier for the current request
    pub fn new(request_id: String) -> Self {
        Self { request_id }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Log an info message
    pub fn info(&self, message: &str, data: Option<Value>) {
        self.log(Level::Info, message, data);
    }

    /// Log a warning message
    pub fn warn(&self, message: &str, data: Option<Value>) {
        self.log(Level::Warn, message, data);
    }

    /// Log an error message
    pub fn error(&self, message: &str, data: Option<Value>) {
        self.log(Level::Error, message, data);
    }

    /// Builds the JSON line written for one log call.
    pub fn render(&self, level: Level, message: &str, data: Option<Value>) -> Value {
        json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level.as_str(),
            "request_id": self.request_id,
            "message": message,
            "data": data
        })
    }

    fn log(&self, level: Level, message: &str, data: Option<Value>) {
        let line = self.render(level, message, data).to_string();
        emit(level, &line);
    }
}

#[cfg(target_arch = "wasm32")]
fn emit(level: Level, line: &str) {
    use worker::{console_error, console_log, console_warn};

    match level {
        Level::Info => console_log!("{}", line),
        Level::Warn => console_warn!("{}", line),
        Level::Error => console_error!("{}", line),
    }
}

// Native builds (unit tests) have no JS console to write to.
#[cfg(not(target_arch = "wasm32"))]
fn emit(_level: Level, line: &str) {
    eprintln!("{}", line);
}

/// Macro to create a JSON object for additional log data
///
/// Usage: log_data!("key1" => "value1", "key2" => 42)
#[macro_export]
macro_rules! log_data {
    ($($key:expr => $value:expr),* $(,)?) => {
        Some(serde_json::json!({ $($key: $value),* }))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_line_carries_request_id_and_level() {
        let logger = Logger::new("req-1".to_string());
        let line = logger.render(Level::Warn, "audit write failed", log_data!("attempts" => 2));
        assert_eq!(line["request_id"], "req-1");
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["data"]["attempts"], 2);
    }
}
