// catalog_app/src/config.rs

use crate::errors::{AppError, Result};
use catalog_core::{RetryPolicy, TestModeProbe};
use dotenvy::dotenv;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Text,
  Json,
}

impl FromStr for LogFormat {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "text" => Ok(LogFormat::Text),
      "json" => Ok(LogFormat::Json),
      other => Err(format!("expected 'text' or 'json', got '{}'", other)),
    }
  }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  /// Without it, products are kept in memory for the lifetime of the process.
  pub database_url: Option<String>,
  pub run_migrations: bool,

  pub event_queue_capacity: usize,
  pub event_max_retries: u32,
  pub event_retry_delay_ms: u64,

  pub log_format: LogFormat,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      server_host: "127.0.0.1".to_string(),
      server_port: 8080,
      database_url: None,
      run_migrations: false,
      event_queue_capacity: 1024,
      event_max_retries: 3,
      event_retry_delay_ms: 1000,
      log_format: LogFormat::Text,
    }
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let defaults = Self::default();

    let server_host = env::var("SERVER_HOST").unwrap_or(defaults.server_host);
    let server_port = parse_var("SERVER_PORT", defaults.server_port)?;
    let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());
    let run_migrations = parse_var("RUN_MIGRATIONS", defaults.run_migrations)?;

    let event_queue_capacity = parse_var("EVENT_QUEUE_CAPACITY", defaults.event_queue_capacity)?;
    if event_queue_capacity == 0 {
      return Err(AppError::Config("EVENT_QUEUE_CAPACITY must be at least 1".to_string()));
    }
    let event_max_retries = parse_var("EVENT_MAX_RETRIES", defaults.event_max_retries)?;
    let event_retry_delay_ms = parse_var("EVENT_RETRY_DELAY_MS", defaults.event_retry_delay_ms)?;

    let log_format = parse_var("LOG_FORMAT", defaults.log_format)?;

    Ok(Self {
      server_host,
      server_port,
      database_url,
      run_migrations,
      event_queue_capacity,
      event_max_retries,
      event_retry_delay_ms,
      log_format,
    })
  }

  pub fn server_address(&self) -> String {
    format!("{}:{}", self.server_host, self.server_port)
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_retries: self.event_max_retries,
      initial_delay: Duration::from_millis(self.event_retry_delay_ms),
      ..RetryPolicy::default()
    }
  }
}

fn parse_var<T>(var_name: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: Display,
{
  match env::var(var_name) {
    Ok(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {} value '{}': {}", var_name, raw, e))),
    Err(_) => Ok(default),
  }
}

/// `APP_ENV=test` switches off request-path fault injection. Read on every
/// call so the switch takes effect without a restart.
pub fn app_env_test_probe() -> TestModeProbe {
  Arc::new(|| env::var("APP_ENV").map(|v| v == "test").unwrap_or(false))
}
