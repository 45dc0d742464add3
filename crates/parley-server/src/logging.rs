//! Logging configuration and initialization.
//!
//! Presets pick a baseline per target, `--log target=level` overrides it,
//! and `RUST_LOG` wins over both when set.

use std::collections::HashMap;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const TARGET_PREFIX: &str = "parley::";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: '{}'. Use 'text' or 'json'.", s)),
        }
    }
}

/// Logging preset levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    /// Session lifecycle and startup only
    #[default]
    Production,
    /// Adds scenario loading and HTTP requests
    Verbose,
    /// Flow decisions and grading detail
    Debug,
    /// Everything, including per-event broadcasts and pings
    Trace,
    /// Warnings and errors only
    Quiet,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub preset: LogPreset,
    /// Per-target level overrides (e.g. "parley::flow" -> DEBUG)
    pub overrides: HashMap<String, Level>,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            preset: LogPreset::Production,
            overrides: HashMap::new(),
            format: LogFormat::Text,
        }
    }
}

impl LogConfig {
    /// Build from CLI flags. Quiet beats trace beats debug beats verbose.
    pub fn from_cli(
        verbose: bool,
        debug: bool,
        trace: bool,
        quiet: bool,
        log_overrides: Vec<String>,
        format: LogFormat,
    ) -> Self {
        let preset = if quiet {
            LogPreset::Quiet
        } else if trace {
            LogPreset::Trace
        } else if debug {
            LogPreset::Debug
        } else if verbose {
            LogPreset::Verbose
        } else {
            LogPreset::Production
        };

        let mut overrides = HashMap::new();
        for part in log_overrides.iter().flat_map(|s| s.split(',')) {
            let Some((target, level_str)) = part.split_once('=') else {
                continue;
            };
            let target = target.trim();
            let full_target = if target.starts_with(TARGET_PREFIX) || target == "tower_http" {
                target.to_string()
            } else {
                format!("{}{}", TARGET_PREFIX, target)
            };
            if let Some(level) = parse_level(level_str.trim()) {
                overrides.insert(full_target, level);
            }
        }

        Self {
            preset,
            overrides,
            format,
        }
    }

    fn directives(&self) -> Vec<String> {
        let mut directives: Vec<String> = match self.preset {
            LogPreset::Production => vec![
                "parley::startup=info".into(),
                "parley::api=info".into(),
                "parley::ws=info".into(),
                "parley::ws::ping=off".into(),
                "parley::session=info".into(),
                "parley::scenario=warn".into(),
                "parley::flow=warn".into(),
                "parley::grader=warn".into(),
                "tower_http=warn".into(),
            ],
            LogPreset::Verbose => vec![
                "parley=info".into(),
                "parley::ws::ping=off".into(),
                "tower_http=info".into(),
            ],
            LogPreset::Debug => vec![
                "parley=debug".into(),
                "parley::ws::ping=off".into(),
                "tower_http=debug".into(),
            ],
            LogPreset::Trace => vec!["parley=trace".into(), "tower_http=trace".into()],
            LogPreset::Quiet => vec!["parley=warn".into(), "tower_http=error".into()],
        };

        for (target, level) in &self.overrides {
            directives.push(format!("{}={}", target, level_to_str(*level)));
        }
        directives
    }

    pub fn build_filter(&self) -> EnvFilter {
        if let Ok(env_filter) = EnvFilter::try_from_default_env() {
            return env_filter;
        }
        EnvFilter::try_new(self.directives().join(",")).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn level_to_str(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Install the global subscriber.
pub fn init(config: &LogConfig) {
    let filter = config.build_filter();

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(true).with_span_events(FmtSpan::CLOSE))
                .init();
        }
    }
}
