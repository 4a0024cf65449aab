use std::str::FromStr;
use std::time::Duration;

use complaint_map_sync::MapSyncConfig;

/// Output format of the simulator logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Simulator settings read from the environment (and `.env`).
pub struct Config {
    pub record_count: usize,
    pub batch_size: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub max_attempts: Option<u32>,
    pub run_for: Duration,
    pub log_format: LogFormat,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let max_attempts: u32 = env_or("MAPSYNC_MAX_ATTEMPTS", 0);
        Self {
            record_count: env_or("MAPSYNC_RECORD_COUNT", 1200),
            batch_size: env_or("MAPSYNC_BATCH_SIZE", 500),
            backoff_base: Duration::from_millis(env_or("MAPSYNC_BACKOFF_BASE_MS", 2000)),
            backoff_max: Duration::from_millis(env_or("MAPSYNC_BACKOFF_MAX_MS", 30000)),
            max_attempts: (max_attempts > 0).then_some(max_attempts),
            run_for: Duration::from_secs(env_or("MAPSYNC_RUN_SECS", 30)),
            log_format: env_or("MAPSYNC_LOG_FORMAT", LogFormat::Text),
        }
    }

    /// Engine configuration with the simulator overrides applied.
    pub fn map_sync_config(&self) -> MapSyncConfig {
        let mut config = MapSyncConfig::default();
        config.annotations.batch_size = self.batch_size.max(1);
        config.backoff.base_delay = self.backoff_base;
        config.backoff.max_delay = self.backoff_max.max(self.backoff_base);
        config.backoff.max_attempts = self.max_attempts;
        config.backoff.jitter = 0.1;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
