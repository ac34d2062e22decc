use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const ENV_ENABLED_KEYS: [&str; 2] = [
    "CHAT_PACER_OBSERVABILITY_ENABLED",
    "CHAT_PACER_OBSERVABILITY",
];
const ENV_LOG_LEVEL: &str = "CHAT_PACER_LOG_LEVEL";
const ENV_JSON_LOG_PATH: &str = "CHAT_PACER_JSON_LOG_PATH";
const DEFAULT_LOG_FILE: &str = "chat-pacer.logs.jsonl";
const DEFAULT_FILTER: &str = "info";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Subscriber settings resolved from the environment.
#[derive(Debug, PartialEq, Eq)]
struct LogSettings {
    enabled: bool,
    filter: String,
    json_file: Option<(PathBuf, String)>,
}

impl LogSettings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = ENV_ENABLED_KEYS
            .iter()
            .find_map(|&key| lookup(key))
            .map(|value| parse_bool_env(&value).unwrap_or(true))
            .unwrap_or(true);
        let filter = lookup(ENV_LOG_LEVEL)
            .filter(|level| tracing_subscriber::EnvFilter::try_new(level).is_ok())
            .or_else(|| lookup("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let json_file = lookup(ENV_JSON_LOG_PATH).map(|raw| split_log_path(Path::new(&raw)));
        Self {
            enabled,
            filter,
            json_file,
        }
    }

    fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        tracing_subscriber::EnvFilter::try_new(&self.filter)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Directory and file name for the JSONL appender.
fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    (dir, file_name)
}

/// Installs the process-wide tracing subscriber once.
///
/// Environment variables:
/// - `CHAT_PACER_OBSERVABILITY_ENABLED` / `CHAT_PACER_OBSERVABILITY`: optional enable/disable
///   flag (default enabled).
/// - `CHAT_PACER_LOG_LEVEL`: optional level/filter override (`info`, `chat_pacer=debug`, etc.).
/// - `CHAT_PACER_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
///   If unset, logs go to stderr in a compact console format so stdout stays free for
///   streamed text.
/// - `RUST_LOG`: fallback filter.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let settings = LogSettings::from_lookup(|key| std::env::var(key).ok());
        if !settings.enabled {
            return;
        }

        let env_filter = settings.env_filter();
        if let Some((dir, file_name)) = &settings.json_file {
            let _ = std::fs::create_dir_all(dir);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        LogSettings::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn parse_bool_env_accepts_common_spellings() {
        assert_eq!(parse_bool_env(" Yes "), Some(true));
        assert_eq!(parse_bool_env("off"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn defaults_to_enabled_console_logging_at_info() {
        assert_eq!(
            settings(&[]),
            LogSettings {
                enabled: true,
                filter: "info".into(),
                json_file: None,
            }
        );
    }

    #[test]
    fn explicit_flag_wins_over_alias_and_unknown_values_keep_logging_on() {
        let off = settings(&[
            ("CHAT_PACER_OBSERVABILITY_ENABLED", "off"),
            ("CHAT_PACER_OBSERVABILITY", "on"),
        ]);
        assert!(!off.enabled);
        assert!(!settings(&[("CHAT_PACER_OBSERVABILITY", "0")]).enabled);
        assert!(settings(&[("CHAT_PACER_OBSERVABILITY", "sometimes")]).enabled);
    }

    #[test]
    fn invalid_log_level_falls_back_to_rust_log() {
        let resolved = settings(&[
            ("CHAT_PACER_LOG_LEVEL", "chat_pacer=loud"),
            ("RUST_LOG", "chat_pacer=debug"),
        ]);
        assert_eq!(resolved.filter, "chat_pacer=debug");

        let resolved = settings(&[("CHAT_PACER_LOG_LEVEL", "chat_pacer=trace")]);
        assert_eq!(resolved.filter, "chat_pacer=trace");
    }

    #[test]
    fn json_log_path_splits_into_directory_and_file() {
        let resolved = settings(&[("CHAT_PACER_JSON_LOG_PATH", "logs/pacer/run.jsonl")]);
        assert_eq!(
            resolved.json_file,
            Some((PathBuf::from("logs/pacer"), "run.jsonl".to_string()))
        );
        assert_eq!(
            split_log_path(Path::new("run.jsonl")),
            (PathBuf::from("."), "run.jsonl".to_string())
        );
        assert_eq!(
            split_log_path(Path::new("/")),
            (PathBuf::from("."), DEFAULT_LOG_FILE.to_string())
        );
    }

    #[test]
    fn init_is_idempotent() {
        init_observability();
        init_observability();
        assert!(INIT.get().is_some());
    }
}
