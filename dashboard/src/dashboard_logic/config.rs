use clap::Parser;
use lib_realtime::RealtimeOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "dashboard_feed.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Live IoT dashboard fed by the realtime event stream", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "DASHBOARD_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "DASHBOARD_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "DASHBOARD_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "DASHBOARD_ORIGIN", help = "Base URL of the dashboard API, e.g. http://localhost:8000.")]
    pub origin: Option<String>,

    #[clap(long, env = "DASHBOARD_ENDPOINT", help = "Realtime feed path or absolute ws:// URL.")]
    pub endpoint: Option<String>,

    #[clap(long, env = "DASHBOARD_RECONNECT_DELAY_MS", help = "Delay in milliseconds before each reconnect attempt.")]
    pub reconnect_delay_ms: Option<u64>,

    #[clap(long, env = "DASHBOARD_FALLBACK_THRESHOLD", help = "Consecutive failures before switching to the SSE fallback.")]
    pub fallback_threshold: Option<u32>,

    #[clap(long, env = "DASHBOARD_SKIP_SNAPSHOT", help = "Skip the REST snapshot at startup (true/false).")]
    pub skip_snapshot: Option<bool>,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_dir: PathBuf,
    pub log_level: String,
    pub realtime: RealtimeOptions,
    pub skip_snapshot: bool,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            origin: other.origin.or(self.origin),
            endpoint: other.endpoint.or(self.endpoint),
            reconnect_delay_ms: other.reconnect_delay_ms.or(self.reconnect_delay_ms),
            fallback_threshold: other.fallback_threshold.or(self.fallback_threshold),
            skip_snapshot: other.skip_snapshot.or(self.skip_snapshot),
        }
    }

    fn defaults() -> Config {
        let realtime = RealtimeOptions::default();
        Config {
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            origin: Some(realtime.origin),
            endpoint: Some(realtime.endpoint),
            reconnect_delay_ms: Some(realtime.reconnect_delay.as_millis() as u64),
            fallback_threshold: Some(realtime.fallback_threshold),
            skip_snapshot: Some(false),
            ..Default::default()
        }
    }

    /// Resolves every option, falling back to the built-in defaults.
    pub fn settings(&self) -> Settings {
        let merged = Config::defaults().merge(self.clone());
        let realtime = RealtimeOptions::default();
        Settings {
            log_dir: merged.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: merged.log_level.unwrap_or_else(|| "info".to_string()),
            realtime: RealtimeOptions {
                origin: merged.origin.unwrap_or(realtime.origin),
                endpoint: merged.endpoint.unwrap_or(realtime.endpoint),
                reconnect_delay: merged
                    .reconnect_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(realtime.reconnect_delay),
                fallback_threshold: merged.fallback_threshold.unwrap_or(realtime.fallback_threshold),
            },
            skip_snapshot: merged.skip_snapshot.unwrap_or(false),
        }
    }
}

fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    let config_str = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<Config>(&config_str) {
        Ok(file_config) => Some(file_config),
        Err(e) => {
            log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Layers defaults, then the config file, then environment variables and CLI
/// arguments (`cli`), each overriding the previous for the values it sets.
pub fn load_config_from(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config.merge(cli)
}

pub fn load_config() -> Config {
    load_config_from(Config::parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_client_defaults() {
        let settings = Config::default().settings();
        assert_eq!(settings.realtime, RealtimeOptions::default());
        assert_eq!(settings.log_level, "info");
        assert!(!settings.skip_snapshot);
    }

    #[test]
    fn file_overrides_defaults_and_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard_feed.conf");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"origin":"https://dash.example.com","reconnectDelayMs":500,"logLevel":"debug"}}"#
        )
        .unwrap();

        let cli = Config {
            config_path: Some(path.clone()),
            log_level: Some("warn".to_string()),
            ..Default::default()
        };
        let settings = load_config_from(cli).settings();

        assert_eq!(settings.realtime.origin, "https://dash.example.com");
        assert_eq!(settings.realtime.reconnect_delay, Duration::from_millis(500));
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.realtime.endpoint, "/api/ws");
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.conf");
        fs::write(&path, "{ not json").unwrap();

        let config = load_config_from(Config {
            config_path: Some(path),
            ..Default::default()
        });
        assert_eq!(config.fallback_threshold, Some(3));
        assert_eq!(config.origin.as_deref(), Some("http://localhost:8000"));
    }

    #[test]
    fn cli_flags_parse() {
        let config = Config::try_parse_from([
            "dashboard_feed",
            "--origin",
            "http://10.0.0.5:8000",
            "--fallback-threshold",
            "5",
            "--skip-snapshot",
            "true",
        ])
        .unwrap();
        assert_eq!(config.fallback_threshold, Some(5));
        assert_eq!(config.skip_snapshot, Some(true));
        assert_eq!(config.settings().realtime.origin, "http://10.0.0.5:8000");
    }
}
