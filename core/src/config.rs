use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub http: HttpConfig,
    pub aggregate: AggregateConfig,
    pub batch: BatchConfig,
    pub output: OutputConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// Shared request budget across all connectors, 0 disables limiting.
    pub requests_per_second: u32,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregateConfig {
    pub max_concurrency: usize,
    pub deadline_secs: u64,
    pub tourism_enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    pub chunk_size: usize,
    pub master_list: PathBuf,
    pub checkpoint: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        // Load default configuration
        builder = builder.add_source(config::Config::try_from(&Config::default())?);

        // Layer on config file if it exists
        if Path::new("config.toml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        // Layer on environment variables (TRAVEL_ prefix)
        builder = builder.add_source(
            Environment::with_prefix("TRAVEL")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Config = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.max_attempts == 0 {
            return Err(ConfigError::Message(
                "http.max_attempts must be greater than 0".into(),
            ));
        }

        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "http.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.aggregate.max_concurrency == 0 {
            return Err(ConfigError::Message(
                "aggregate.max_concurrency must be greater than 0".into(),
            ));
        }

        if self.batch.chunk_size == 0 {
            return Err(ConfigError::Message(
                "batch.chunk_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                user_agent: "travel-data-toolkit/1.0 (+https://example.com)".to_string(),
                timeout_secs: 30,
                max_attempts: 4,
                retry_base_delay_ms: 500,
                requests_per_second: 2,
            },
            aggregate: AggregateConfig {
                max_concurrency: 4,
                deadline_secs: 180,
                tourism_enabled: true,
            },
            batch: BatchConfig {
                chunk_size: 10,
                master_list: PathBuf::from("prod/airports.json"),
                checkpoint: PathBuf::from("dev/airports.json"),
            },
            output: OutputConfig {
                dir: PathBuf::from("output"),
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                log_format: LogFormat::Pretty,
                metrics_enabled: false,
                metrics_port: 9090,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http.max_attempts, 4);
        assert_eq!(config.http.retry_base_delay_ms, 500);
        assert_eq!(config.batch.chunk_size, 10);
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let mut config = Config::default();
        config.batch.chunk_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn rejects_zero_attempts() {
        let mut config = Config::default();
        config.http.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
