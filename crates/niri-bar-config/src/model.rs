//! Configuration data model

use std::path::PathBuf;
use std::time::Duration;

/// Delay before a dropped niri connection is retried
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Root configuration structure
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub niri: NiriConfig,
    pub displays: Vec<DisplayHint>,
}

/// Global settings
#[derive(Debug, Clone, Default)]
pub struct GlobalConfig {
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// Connection settings for the niri IPC socket
#[derive(Debug, Clone)]
pub struct NiriConfig {
    /// Explicit socket path, takes precedence over `$NIRI_SOCKET`
    pub socket_path: Option<PathBuf>,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,
}

impl Default for NiriConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// A known pairing of a display identifier with a niri output name
///
/// Display identifiers come from the windowing layer (usually the monitor
/// model string) and rarely match niri's connector names, so hints let the
/// user pin the pairing up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayHint {
    /// Display identifier as reported by the windowing layer
    pub display: String,
    /// niri output name (e.g., "HDMI-A-1")
    pub output: String,
}
