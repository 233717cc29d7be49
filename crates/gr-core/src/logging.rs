//! Structured logging foundation for gr-core.
//!
//! Dual-mode logging in the usual split:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSONL for automation
//!
//! stdout is reserved for command payloads (the report JSON); all log
//! output goes to stderr. Respects `GR_LOG` / `RUST_LOG` for level
//! filtering and `GR_LOG_FORMAT` for the output mode.

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Jsonl,
}

/// Logging configuration resolved before startup.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level filter for gr_core targets (error, warn, info, debug, trace).
    pub level: String,
    pub format: LogFormat,
    pub timestamps: bool,
}

impl LogConfig {
    /// Resolve from the environment, with an optional explicit level
    /// override (e.g. from `--verbose`/`--quiet` flags).
    pub fn from_env(level_override: Option<&str>) -> Self {
        let level = level_override
            .map(str::to_string)
            .or_else(|| std::env::var("GR_LOG").ok())
            .unwrap_or_else(|| "info".to_string());
        let format = match std::env::var("GR_LOG_FORMAT").as_deref() {
            Ok("jsonl") => LogFormat::Jsonl,
            _ => LogFormat::Human,
        };
        Self {
            level,
            format,
            timestamps: true,
        }
    }
}

/// Initialize the logging subsystem.
///
/// Must be called once at startup before any logging occurs.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gr_core={}", config.level)));

    match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);

            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .init();
            }
        }
        LogFormat::Jsonl => {
            let json_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .init();
        }
    }
}
