use log_api::config::Config as LogApiConfig;
use serde::Deserialize;
use std::fs::File;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub sentry_dsn: Option<String>,
    /// Default `tracing` filter, overridden by `RUST_LOG`
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            sentry_dsn: None,
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Debug, Default)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub log_api: Option<LogApiConfig>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Checks that the log API section is present and consistent
    pub fn log_api(&self) -> Result<&LogApiConfig, ConfigError> {
        let config = self
            .log_api
            .as_ref()
            .ok_or(ConfigError::MissingSection("log_api"))?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("missing `{0}` section")]
    MissingSection(&'static str),
    #[error("invalid log_api config: {0}")]
    Invalid(#[from] log_api::config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use log_api::config::{KeyFormat, QueueConfig};
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn log_api_config() {
        let yaml = r#"
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            logging:
                sentry_dsn: https://key@sentry.example.com/1
            log_api:
                listener:
                    host: 0.0.0.0
                    port: 5607
                admin_listener:
                    host: 127.0.0.1
                    port: 5608
                service:
                    region: useast
                log_publisher:
                    topics: [logs, transformed-logs]
                    key_format: legacy
                queue:
                    type: rest_proxy
                    url: http://kafka-rest:8082
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(
            config.common.metrics,
            Some(MetricsConfig {
                statsd_host: "127.0.0.1".into(),
                statsd_port: 8125,
            })
        );
        let logging = config.common.logging.clone().expect("logging config");
        assert_eq!(logging.level, "info");
        assert!(logging.sentry_dsn.is_some());

        let log_api = config.log_api().expect("log_api config");
        assert_eq!(log_api.service.region.as_deref(), Some("useast"));
        assert_eq!(
            log_api.log_publisher.topics,
            vec!["logs", "transformed-logs"]
        );
        assert_eq!(log_api.log_publisher.key_format, KeyFormat::Legacy);
        assert!(matches!(log_api.queue, QueueConfig::RestProxy { .. }));
    }

    #[test]
    fn missing_log_api_section() {
        let tmp = write_tmp_file("metrics: {statsd_host: localhost, statsd_port: 8125}\n");
        let config = Config::from_file(tmp.path()).expect("load config");
        assert!(matches!(
            config.log_api(),
            Err(ConfigError::MissingSection("log_api"))
        ));
    }

    #[test]
    fn invalid_log_api_section() {
        let yaml = r#"
            log_api:
                listener: {host: 0.0.0.0, port: 0}
                admin_listener: {host: 127.0.0.1, port: 5608}
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");
        assert!(matches!(config.log_api(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unreadable_file() {
        let result = Config::from_file(std::path::Path::new("/nonexistent/gateway.yaml"));
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }
}
