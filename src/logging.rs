use std::io::Write;
use std::sync::Mutex;
use chrono::Utc;

use crate::runner::OutputSink;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Debug => write!(f, "DEBUG"),
            Level::Info => write!(f, "INFO"),
            Level::Warn => write!(f, "WARN"),
            Level::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            other => Err(format!(
                "unknown log level {:?}, expected debug, info, warn or error",
                other
            )),
        }
    }
}

pub struct Logger {
    out: Mutex<Box<dyn Write + Send>>,
    json_mode: Mutex<bool>,
    level: Mutex<Level>,
}

impl Logger {
    pub fn new(out: Box<dyn Write + Send>, json_mode: bool, level: Level) -> Self {
        Self {
            out: Mutex::new(out),
            json_mode: Mutex::new(json_mode),
            level: Mutex::new(level),
        }
    }

    pub fn default_logger() -> Self {
        Self::new(Box::new(std::io::stderr()), false, Level::Info)
    }

    pub fn set_json(&self, enabled: bool) {
        if let Ok(mut mode) = self.json_mode.lock() {
            *mode = enabled;
        }
    }

    pub fn set_level(&self, level: Level) {
        if let Ok(mut current) = self.level.lock() {
            *current = level;
        }
    }

    fn log(&self, level: Level, msg: &str, kvs: &[(&str, &str)]) {
        let min = self.level.lock().map(|l| *l).unwrap_or(Level::Info);
        if level < min {
            return;
        }
        let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let json_mode = self.json_mode.lock().map(|m| *m).unwrap_or(false);
        // A poisoned writer only means another relay thread panicked mid-line.
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };

        if json_mode {
            let mut map = serde_json::Map::new();
            map.insert("time".into(), serde_json::Value::String(now));
            map.insert("level".into(), serde_json::Value::String(level.to_string()));
            map.insert("msg".into(), serde_json::Value::String(msg.into()));
            for (k, v) in kvs {
                map.insert((*k).into(), serde_json::Value::String(redact_value(k, v)));
            }
            let _ = writeln!(out, "{}", serde_json::Value::Object(map));
        } else {
            let mut line = format!("{} [{}] {}", now, level, msg);
            for (k, v) in kvs {
                line.push_str(&format!(" {}={}", k, redact_value(k, v)));
            }
            let _ = writeln!(out, "{}", line);
        }
    }

    pub fn debug(&self, msg: &str, kvs: &[(&str, &str)]) { self.log(Level::Debug, msg, kvs); }
    pub fn info(&self, msg: &str, kvs: &[(&str, &str)]) { self.log(Level::Info, msg, kvs); }
    pub fn warn(&self, msg: &str, kvs: &[(&str, &str)]) { self.log(Level::Warn, msg, kvs); }
    pub fn error(&self, msg: &str, kvs: &[(&str, &str)]) { self.log(Level::Error, msg, kvs); }
}

impl OutputSink for Logger {
    fn stdout_line(&self, line: &str) {
        self.info(line, &[("stream", "stdout")]);
    }

    fn stderr_line(&self, line: &str) {
        self.error(line, &[("stream", "stderr")]);
    }

    fn acknowledge(&self, command_line: &str) {
        self.info("using command", &[("command", command_line)]);
    }

    fn failure(&self, command_line: &str, detail: &str) {
        self.error(
            &format!("Django command \"{}\" exited with {}", command_line, detail),
            &[("command", command_line), ("exit", detail)],
        );
    }

    fn fatal(&self, msg: &str) {
        self.error(msg, &[("fatal", "true")]);
    }
}

// Keys whose values never reach the log verbatim. Management commands such
// as `createsuperuser` are commonly driven with credentials in their args.
const SENSITIVE_KEYS: &[&str] = &[
    "password", "secret", "token", "authorization", "auth", "api_key", "apikey",
    "secret_key", "database_url",
];

pub fn redact_value(key: &str, value: &str) -> String {
    if SENSITIVE_KEYS.contains(&key.to_lowercase().as_str()) {
        if value.is_empty() {
            return String::new();
        }
        return "REDACTED".into();
    }
    value.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn capture_logger(json: bool, level: Level) -> (Arc<Logger>, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        struct SharedBuf(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedBuf {
            fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().write(data)
            }
            fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
        }
        let logger = Arc::new(Logger::new(Box::new(SharedBuf(buf.clone())), json, level));
        (logger, buf)
    }

    fn captured(buf: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(buf.lock().unwrap().clone()).unwrap()
    }

    #[test]
    fn test_text_output() {
        let (log, buf) = capture_logger(false, Level::Info);
        log.info("hello world", &[]);
        let output = captured(&buf);
        assert!(output.contains("[INFO]"));
        assert!(output.contains("hello world"));
    }

    #[test]
    fn test_json_output() {
        let (log, buf) = capture_logger(true, Level::Info);
        log.info("test message", &[("key", "val")]);
        let output = captured(&buf);
        let parsed: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(parsed["msg"], "test message");
        assert_eq!(parsed["key"], "val");
        assert_eq!(parsed["level"], "INFO");
    }

    #[test]
    fn test_level_filtering() {
        let (log, buf) = capture_logger(false, Level::Warn);
        log.info("should not appear", &[]);
        log.warn("should appear", &[]);
        let output = captured(&buf);
        assert!(!output.contains("should not appear"));
        assert!(output.contains("should appear"));
    }

    #[test]
    fn test_set_level() {
        let (log, buf) = capture_logger(false, Level::Info);
        log.debug("hidden", &[]);
        log.set_level(Level::Debug);
        log.debug("visible", &[]);
        let output = captured(&buf);
        assert!(!output.contains("hidden"));
        assert!(output.contains("[DEBUG] visible"));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!("debug".parse::<Level>().unwrap(), Level::Debug);
        assert_eq!("WARN".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!("warning".parse::<Level>().unwrap(), Level::Warn);
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn test_redact_sensitive() {
        assert_eq!(redact_value("password", "secret123"), "REDACTED");
        assert_eq!(redact_value("Token", "abc"), "REDACTED");
        assert_eq!(redact_value("SECRET_KEY", "django-insecure"), "REDACTED");
        assert_eq!(redact_value("command", "migrate"), "migrate");
        assert_eq!(redact_value("password", ""), "");
    }

    #[test]
    fn test_stream_lines_routed_by_level() {
        let (log, buf) = capture_logger(false, Level::Info);
        log.stdout_line("Applying auth.0001_initial... OK");
        log.stderr_line("Traceback (most recent call last):");
        let output = captured(&buf);
        assert!(output.contains("[INFO] Applying auth.0001_initial... OK stream=stdout"));
        assert!(output.contains("[ERROR] Traceback (most recent call last): stream=stderr"));
    }

    #[test]
    fn test_failure_names_command_and_code() {
        let (log, buf) = capture_logger(false, Level::Info);
        log.failure("python manage.py migrate", "code 1");
        let output = captured(&buf);
        assert!(output.contains("Django command \"python manage.py migrate\" exited with code 1"));
    }

    #[test]
    fn test_error_level_still_shows_stderr() {
        let (log, buf) = capture_logger(false, Level::Error);
        log.acknowledge("python manage.py check");
        log.stdout_line("System check identified no issues");
        log.stderr_line("boom");
        let output = captured(&buf);
        assert!(!output.contains("using command"));
        assert!(!output.contains("System check"));
        assert!(output.contains("boom"));
    }
}
