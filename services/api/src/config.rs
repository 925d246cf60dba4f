use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// The service falls back to the in-memory store when unset.
    pub database_url: Option<String>,
    pub environment: String,
    pub schedule_interval: Duration,
    pub schedule_batch: usize,
    pub settlement: SettlementConfig,
}

#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: parse_var("PORT", 3000)?,
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            schedule_interval: Duration::from_secs(parse_var("SCHEDULE_INTERVAL_SECS", 30)?),
            schedule_batch: parse_var("SCHEDULE_BATCH", 50)?,
            settlement: SettlementConfig {
                enabled: parse_var("SETTLEMENT_ENABLED", false)?,
                interval: Duration::from_secs(parse_var("SETTLEMENT_INTERVAL_SECS", 15)?),
                max_attempts: parse_var("SETTLEMENT_MAX_ATTEMPTS", 5)?,
                timeout: Duration::from_secs(parse_var("SETTLEMENT_TIMEOUT_SECS", 300)?),
            },
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {name}: {raw}")),
        _ => Ok(default),
    }
}
