/// Tag + level console logger
///
/// Standard levels (Error/Warning/Info/Debug), per-tag debug gating and a
/// global minimum level. Colored console output with UTC timestamps.
///
/// Call `logger::init(&LoggerConfig)` once at startup; the level-specific
/// functions are cheap no-ops when filtered out.
use std::collections::HashSet;
use std::sync::RwLock;

use chrono::Utc;
use colored::Colorize;
use once_cell::sync::Lazy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warning = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    /// Parse a config value; unknown values fall back to Info.
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warning" | "warn" => LogLevel::Warning,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Subsystem tags; each maps to a `debug_tags` entry in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Rpc,
    Multicall,
    Tokens,
    Assets,
    Balances,
    Storage,
    Service,
}

impl LogTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Rpc => "RPC",
            LogTag::Multicall => "MULTICALL",
            LogTag::Tokens => "TOKENS",
            LogTag::Assets => "ASSETS",
            LogTag::Balances => "BALANCES",
            LogTag::Storage => "STORAGE",
            LogTag::Service => "SERVICE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    /// Tags with debug logging enabled regardless of `min_level`
    /// (lowercase tag names, e.g. "rpc").
    pub debug_tags: HashSet<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
        }
    }
}

static CONFIG: Lazy<RwLock<LoggerConfig>> = Lazy::new(|| RwLock::new(LoggerConfig::default()));

pub fn init(config: &LoggerConfig) {
    *CONFIG.write().unwrap() = config.clone();
}

fn should_log(tag: LogTag, level: LogLevel) -> bool {
    // Errors always log
    if level == LogLevel::Error {
        return true;
    }

    let config = CONFIG.read().unwrap();
    if level == LogLevel::Debug {
        return config.min_level >= LogLevel::Debug
            || config.debug_tags.contains(&tag.as_str().to_lowercase());
    }

    level <= config.min_level
}

fn write(tag: LogTag, level: LogLevel, message: &str) {
    if !should_log(tag, level) {
        return;
    }

    let timestamp = Utc::now().format("%H:%M:%S").to_string();
    let level_str = match level {
        LogLevel::Error => level.as_str().red().bold(),
        LogLevel::Warning => level.as_str().yellow().bold(),
        LogLevel::Info => level.as_str().green(),
        LogLevel::Debug => level.as_str().purple().dimmed(),
    };

    println!(
        "{} {} {} {}",
        format!("[{timestamp}]").dimmed(),
        level_str,
        tag.as_str().cyan().bold(),
        message
    );
}

pub fn error(tag: LogTag, message: &str) {
    write(tag, LogLevel::Error, message);
}

pub fn warning(tag: LogTag, message: &str) {
    write(tag, LogLevel::Warning, message);
}

pub fn info(tag: LogTag, message: &str) {
    write(tag, LogLevel::Info, message);
}

pub fn debug(tag: LogTag, message: &str) {
    write(tag, LogLevel::Debug, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_gated_by_tag() {
        let mut config = LoggerConfig::default();
        config.debug_tags.insert("rpc".to_string());
        init(&config);

        assert!(should_log(LogTag::Rpc, LogLevel::Debug));
        assert!(!should_log(LogTag::Tokens, LogLevel::Debug));
        assert!(should_log(LogTag::Tokens, LogLevel::Error));
    }
}
