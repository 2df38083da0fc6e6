use chrono::{DateTime, Utc};
use colored::*;
use log::{Level, Metadata, Record};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

static LOGGER: Lazy<ImagenioLogger> = Lazy::new(ImagenioLogger::new);

tokio::task_local! {
    static REQUEST_ID: String;
}

pub fn init_with_config(config: LoggerConfig) -> Result<(), String> {
    let max_level = config.min_level.to_log_level_filter();
    LOGGER.update_config(config);

    if let Err(e) = log::set_logger(&*LOGGER) {
        return Err(format!("Failed to set logger: {:?}", e));
    }

    log::set_max_level(max_level);
    Ok(())
}

/// Runs `fut` with `request_id` attached to every log line it emits.
pub async fn with_request_id<F: Future>(request_id: String, fut: F) -> F::Output {
    REQUEST_ID.scope(request_id, fut).await
}

pub fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|id| id.clone()).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl LogLevel {
    pub fn color(&self) -> Color {
        match self {
            LogLevel::Trace => Color::Cyan,
            LogLevel::Debug => Color::Blue,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            LogLevel::Trace => "🔍",
            LogLevel::Debug => "🐛",
            LogLevel::Info => "💡",
            LogLevel::Warn => "⚠️",
            LogLevel::Error => "❌",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Parses `LOG_LEVEL` style names, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    pub fn to_log_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }

    pub fn from_log_level(level: Level) -> Self {
        match level {
            Level::Trace => LogLevel::Trace,
            Level::Debug => LogLevel::Debug,
            Level::Info => LogLevel::Info,
            Level::Warn => LogLevel::Warn,
            Level::Error => LogLevel::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub module: String,
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    pub show_colors: bool,
    pub show_emojis: bool,
    pub show_file_location: bool,
    pub show_module: bool,
    pub timestamp_format: String,
    pub output_json: bool,
    pub log_file_path: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: true,
            show_emojis: true,
            show_file_location: false,
            show_module: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
            output_json: false,
            log_file_path: None,
        }
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.show_colors = enabled;
        self
    }

    pub fn with_file_output(mut self, path: &str) -> Self {
        self.log_file_path = Some(path.to_string());
        self
    }

    /// One JSON object per line, no colours. Suited to hosted log collectors.
    pub fn production() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: false,
            show_emojis: false,
            output_json: true,
            ..Default::default()
        }
    }

    pub fn development() -> Self {
        Self {
            min_level: LogLevel::Debug,
            show_file_location: true,
            ..Default::default()
        }
    }
}

pub struct ImagenioLogger {
    config: Mutex<LoggerConfig>,
    log_file: Mutex<Option<File>>,
}

impl ImagenioLogger {
    fn new() -> Self {
        Self {
            config: Mutex::new(LoggerConfig::default()),
            log_file: Mutex::new(None),
        }
    }

    fn update_config(&self, new_config: LoggerConfig) {
        if let Some(path) = &new_config.log_file_path {
            if let Ok(file) = OpenOptions::new().create(true).append(true).open(path) {
                if let Ok(mut log_file) = self.log_file.lock() {
                    *log_file = Some(file);
                }
            }
        }
        if let Ok(mut config) = self.config.lock() {
            *config = new_config;
        }
    }

    fn format_line(&self, entry: &LogEntry, config: &LoggerConfig) -> String {
        if config.output_json {
            return serde_json::to_string(entry).unwrap_or_default();
        }

        let mut output = String::new();

        let timestamp = entry.timestamp.format(&config.timestamp_format).to_string();
        let level = if config.show_emojis {
            format!("{} {}", entry.level.emoji(), entry.level.as_str())
        } else {
            entry.level.as_str().to_string()
        };

        if config.show_colors {
            output.push_str(&format!(
                "{} [{}] ",
                timestamp.bright_black(),
                level.color(entry.level.color()).bold()
            ));
        } else {
            output.push_str(&format!("{} [{}] ", timestamp, level));
        }

        if let Some(request_id) = &entry.request_id {
            if config.show_colors {
                output.push_str(&format!("[req:{}] ", request_id.bright_yellow()));
            } else {
                output.push_str(&format!("[req:{}] ", request_id));
            }
        }

        if config.show_module && !entry.module.is_empty() {
            if config.show_colors {
                output.push_str(&format!("{}: ", entry.module.bright_blue()));
            } else {
                output.push_str(&format!("{}: ", entry.module));
            }
        }

        if config.show_colors {
            output.push_str(&entry.message.white().bold().to_string());
        } else {
            output.push_str(&entry.message);
        }

        if config.show_file_location {
            let location = format!("{}:{}", entry.file, entry.line);
            if config.show_colors {
                output.push_str(&format!(" ({})", location.bright_black()));
            } else {
                output.push_str(&format!(" ({})", location));
            }
        }

        output
    }

    fn create_log_entry(&self, record: &Record) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::from_log_level(record.level()),
            message: record.args().to_string(),
            module: record.module_path().unwrap_or("unknown").to_string(),
            file: record.file().unwrap_or("unknown").to_string(),
            line: record.line().unwrap_or(0),
            request_id: current_request_id(),
        }
    }
}

impl log::Log for ImagenioLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        match self.config.lock() {
            Ok(config) => LogLevel::from_log_level(metadata.level()) >= config.min_level,
            Err(_) => true,
        }
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = self.create_log_entry(record);

        if let Ok(config) = self.config.lock() {
            let line = self.format_line(&entry, &config);
            // stderr so stdout stays free for anything piped from the binary
            eprintln!("{}", line);

            if let Ok(mut guard) = self.log_file.lock() {
                if let Some(file) = guard.as_mut() {
                    let plain = if config.show_colors {
                        let plain_config = LoggerConfig {
                            show_colors: false,
                            ..config.clone()
                        };
                        self.format_line(&entry, &plain_config)
                    } else {
                        line
                    };
                    let _ = writeln!(file, "{}", plain);
                }
            }
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
        if let Ok(mut guard) = self.log_file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

/// Logs how long a named operation took when dropped.
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        log::info!(
            "⏱️  {} completed in {}ms",
            self.name,
            self.elapsed().as_millis()
        );
    }
}

pub fn timer(name: &str) -> Timer {
    Timer::new(name)
}

/// Log application startup information
pub fn log_startup_info(app_name: &str, version: &str, host: &str, port: u16) {
    log::info!("🚀 Starting {} v{}", app_name, version);
    log::info!("🌐 Listening on http://{}:{}", host, port);
}

/// Log configuration details
pub fn log_config_info(config: &crate::config::AppConfig) {
    use crate::config::Backend;

    log::info!("⚙️  Configuration loaded:");
    log::info!("   Backend: {}", config.backend.as_str());
    match config.backend {
        Backend::Vertex => {
            log::info!(
                "   Vertex AI: project {} in {}",
                config.vertex.project_id,
                config.vertex.location
            );
            log::info!(
                "   Models: {} / {}",
                config.vertex.image_model,
                config.vertex.caption_model
            );
            log::info!(
                "   Access token: {}",
                if config.vertex.access_token.is_some() {
                    "fixed (VERTEX_ACCESS_TOKEN)".to_string()
                } else {
                    format!("refreshed from {}", config.vertex.metadata_host)
                }
            );
        }
        Backend::Bedrock => {
            log::info!(
                "   Bedrock region: {}",
                config.bedrock.region.as_deref().unwrap_or("from environment")
            );
            log::info!(
                "   Models: {} / {}",
                config.bedrock.image_model,
                config.bedrock.caption_model
            );
        }
        Backend::Mock => {}
    }
    log::info!(
        "   Images per request: up to {}, {} per provider call",
        config.limits.max_image_count,
        config.limits.per_call_limit
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(request_id: Option<&str>) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Warn,
            message: "Image call 1 returned no images".to_string(),
            module: "imagenio::generator".to_string(),
            file: "src/generator.rs".to_string(),
            line: 42,
            request_id: request_id.map(String::from),
        }
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(LogLevel::Info.as_str(), "INFO");
        assert_eq!(LogLevel::Error.emoji(), "❌");
        assert_eq!(LogLevel::Debug.color(), Color::Blue);
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
        assert!(LogLevel::Error > LogLevel::Info);
    }

    #[test]
    fn test_logger_config() {
        let config = LoggerConfig::development();
        assert_eq!(config.min_level, LogLevel::Debug);
        assert!(config.show_colors);

        let prod_config = LoggerConfig::production();
        assert!(!prod_config.show_colors);
        assert!(prod_config.output_json);
    }

    #[test]
    fn test_plain_line_includes_request_id() {
        let logger = ImagenioLogger::new();
        let config = LoggerConfig::new().with_colors(false);
        let line = logger.format_line(&entry(Some("abc123")), &config);
        assert!(line.contains("[⚠️ WARN]"));
        assert!(line.contains("[req:abc123] imagenio::generator: Image call 1"));
    }

    #[test]
    fn test_json_line() {
        let logger = ImagenioLogger::new();
        let line = logger.format_line(&entry(None), &LoggerConfig::production());
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "Warn");
        assert_eq!(value["line"], 42);
        assert!(value.get("request_id").is_none());
    }

    #[test]
    fn test_file_output_gets_plain_lines() {
        let path = std::env::temp_dir().join(format!("imagenio-{}.log", new_request_id()));
        let path_str = path.to_string_lossy().to_string();

        let logger = ImagenioLogger::new();
        logger.update_config(LoggerConfig::new().with_file_output(&path_str));
        log::Log::log(
            &logger,
            &Record::builder()
                .level(Level::Info)
                .args(format_args!("Images generated so far: 2"))
                .module_path(Some("imagenio::generator"))
                .build(),
        );
        log::Log::flush(&logger);

        let written = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(written.contains("imagenio::generator: Images generated so far: 2"));
        assert!(!written.contains('\u{1b}'));
    }

    #[tokio::test]
    async fn test_request_id_scope() {
        assert!(current_request_id().is_none());
        let seen = with_request_id("req-1".to_string(), async { current_request_id() }).await;
        assert_eq!(seen.as_deref(), Some("req-1"));
        assert_eq!(new_request_id().len(), 12);
    }
}
