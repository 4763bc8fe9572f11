use std::time::Duration;

use clap::Parser;
use dashboard::RetryPolicy;
use serde::Deserialize;

use crate::error::{AppError, Result};

const DEFAULT_CONFIG_PATH: &str = "config/tui.toml";
/// Largest `limit` the backend accepts.
const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub timezone: String,
    pub page_size: u32,
    pub min_confidence: f64,
    pub retries: u32,
    pub retry_base_ms: u64,
    /// `0` keeps fetched data until a manual refresh.
    pub stale_secs: u64,
    pub log_level: String,
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api/v1".to_string(),
            timezone: "America/Jamaica".to_string(),
            page_size: dashboard::DEFAULT_PAGE_SIZE,
            min_confidence: 0.0,
            retries: 2,
            retry_base_ms: 1000,
            stale_secs: 30,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl AppConfig {
    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse()
            .map_err(|_| AppError::InvalidConfig(format!("unknown timezone {:?}", self.timezone)))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            base_delay: Duration::from_millis(self.retry_base_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn stale_after(&self) -> Option<Duration> {
        (self.stale_secs > 0).then(|| Duration::from_secs(self.stale_secs))
    }

    fn validate(&self) -> Result<()> {
        if self.page_size > MAX_PAGE_SIZE {
            return Err(AppError::InvalidConfig(format!(
                "page_size {} exceeds {MAX_PAGE_SIZE}",
                self.page_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Parser)]
#[command(name = "budget_tui", disable_version_flag = true)]
struct Args {
    /// Optional config file path (TOML).
    #[arg(long)]
    config: Option<String>,
    /// Override base URL (e.g. http://127.0.0.1:8000/api/v1).
    #[arg(long)]
    base_url: Option<String>,
    /// Override timezone (IANA name).
    #[arg(long)]
    timezone: Option<String>,
    /// Override page size.
    #[arg(long)]
    page_size: Option<u32>,
    /// Override minimum classifier confidence (0.0 - 1.0).
    #[arg(long)]
    min_confidence: Option<f64>,
    /// Write logs to this file.
    #[arg(long)]
    log_file: Option<String>,
}

pub fn load() -> Result<AppConfig> {
    let args = Args::parse();

    let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let mut builder = config::Config::builder();
    builder = builder.add_source(config::File::with_name(config_path).required(false));
    builder = builder.add_source(config::Environment::with_prefix("BUDGET_TUI"));
    let mut settings: AppConfig = builder.build()?.try_deserialize()?;

    if let Some(base_url) = args.base_url {
        settings.base_url = base_url;
    }
    if let Some(timezone) = args.timezone {
        settings.timezone = timezone;
    }
    if let Some(page_size) = args.page_size {
        settings.page_size = page_size;
    }
    if let Some(min_confidence) = args.min_confidence {
        settings.min_confidence = min_confidence;
    }
    if let Some(log_file) = args.log_file {
        settings.log_file = Some(log_file);
    }

    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backend_behaviour() {
        let config = AppConfig::default();
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.stale_after(), Some(Duration::from_secs(30)));
        assert_eq!(config.timezone().unwrap(), chrono_tz::America::Jamaica);
    }

    #[test]
    fn zero_stale_secs_disables_revalidation() {
        let config = AppConfig {
            stale_secs: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.stale_after(), None);
    }

    #[test]
    fn page_size_is_capped_at_backend_limit() {
        let at_limit = AppConfig {
            page_size: 1000,
            ..AppConfig::default()
        };
        assert!(at_limit.validate().is_ok());

        let over = AppConfig {
            page_size: 1001,
            ..AppConfig::default()
        };
        assert!(matches!(over.validate(), Err(AppError::InvalidConfig(_))));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let config = AppConfig {
            timezone: "Mars/Olympus".to_string(),
            ..AppConfig::default()
        };
        assert!(config.timezone().is_err());
    }
}
