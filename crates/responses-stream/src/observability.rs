//! Opt-in `tracing` subscriber setup for binaries and examples using this
//! crate. Library code only emits records; call [`init_observability`] from
//! `main` if you have no subscriber of your own.

use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "responses-stream.logs.jsonl";

#[derive(Debug, PartialEq)]
enum LogOutput {
    Console,
    JsonFile(PathBuf),
}

#[derive(Debug, PartialEq)]
struct LogSettings {
    enabled: bool,
    level: Option<String>,
    output: LogOutput,
}

impl LogSettings {
    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("RESPONSES_OBSERVABILITY_ENABLED")
            .map(|v| parse_flag(&v).unwrap_or(true))
            .unwrap_or(true);
        let level = lookup("RESPONSES_LOG_LEVEL").filter(|v| !v.trim().is_empty());
        let output = match lookup("RESPONSES_JSON_LOG_PATH").filter(|v| !v.trim().is_empty()) {
            Some(path) => LogOutput::JsonFile(PathBuf::from(path)),
            None => LogOutput::Console,
        };
        Self {
            enabled,
            level,
            output,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if let Some(level) = &self.level
            && let Ok(filter) = EnvFilter::try_new(level)
        {
            return filter;
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Installs a global subscriber once per process; later calls are no-ops.
///
/// - `RESPONSES_OBSERVABILITY_ENABLED`: `false`/`0`/`off` skips setup (default on).
/// - `RESPONSES_LOG_LEVEL`: filter directive, else `RUST_LOG`, else `info`.
/// - `RESPONSES_JSON_LOG_PATH`: write JSONL to this file instead of compact
///   console output on stderr.
///
/// An already-installed global subscriber is left in place.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let settings = LogSettings::resolve(|key| std::env::var(key).ok());
        if !settings.enabled {
            return;
        }
        let filter = settings.env_filter();
        match &settings.output {
            LogOutput::JsonFile(path) => {
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."));
                let _ = std::fs::create_dir_all(&dir);
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(DEFAULT_LOG_FILE);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
            LogOutput::Console => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
        }
    });
}
