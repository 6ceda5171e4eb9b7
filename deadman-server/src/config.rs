//! Server settings read from environment variables

use anyhow::Context;
use deadman::base::constants::{DEFAULT_CONCURRENCY, DEFAULT_FOLLOW_UP_CRON, DEFAULT_STALE_THRESHOLD};
use deadman::config::{PoolConfig, ProbeConfig, RequeuerConfig};
use std::time::Duration;

/// Settings of the standalone server
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
  /// PostgresSQL connection string; the in-memory store is used when unset
  pub database_url: Option<String>,
  pub concurrency: usize,
  pub follow_up_cron: String,
  /// In-progress jobs untouched for longer than this are requeued
  pub stale_after: Duration,
}

impl Default for ServerSettings {
  fn default() -> Self {
    Self {
      database_url: None,
      concurrency: DEFAULT_CONCURRENCY,
      follow_up_cron: DEFAULT_FOLLOW_UP_CRON.to_string(),
      stale_after: DEFAULT_STALE_THRESHOLD,
    }
  }
}

impl ServerSettings {
  /// Read settings from the process environment
  pub fn from_env() -> anyhow::Result<Self> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Read settings through a lookup function, unset keys keep their defaults
  pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut settings = Self::default();
    let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    settings.database_url = lookup("DEADMAN_DATABASE_URL");
    if let Some(value) = lookup("DEADMAN_CONCURRENCY") {
      settings.concurrency = value
        .trim()
        .parse()
        .with_context(|| format!("invalid DEADMAN_CONCURRENCY: {value}"))?;
    }
    if let Some(value) = lookup("DEADMAN_FOLLOW_UP_CRON") {
      settings.follow_up_cron = value;
    }
    if let Some(value) = lookup("DEADMAN_STALE_AFTER_SECS") {
      let secs: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("invalid DEADMAN_STALE_AFTER_SECS: {value}"))?;
      settings.stale_after = Duration::from_secs(secs);
    }
    Ok(settings)
  }

  pub fn pool_config(&self) -> PoolConfig {
    PoolConfig::default()
      .concurrency(self.concurrency)
      .requeuer(RequeuerConfig::default().stale_threshold(self.stale_after))
  }

  pub fn probe_config(&self) -> ProbeConfig {
    ProbeConfig::default().follow_up_cron(self.follow_up_cron.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |key| map.get(key).cloned()
  }

  #[test]
  fn test_defaults() {
    let settings = ServerSettings::from_lookup(lookup(&[])).unwrap();
    assert_eq!(settings, ServerSettings::default());
    assert!(settings.pool_config().validate().is_ok());
  }

  #[test]
  fn test_overrides() {
    let settings = ServerSettings::from_lookup(lookup(&[
      ("DEADMAN_DATABASE_URL", "postgres://localhost/deadman"),
      ("DEADMAN_CONCURRENCY", "8"),
      ("DEADMAN_FOLLOW_UP_CRON", "*/10 * * * *"),
      ("DEADMAN_STALE_AFTER_SECS", "120"),
    ]))
    .unwrap();
    assert_eq!(
      settings.database_url.as_deref(),
      Some("postgres://localhost/deadman")
    );
    assert_eq!(settings.concurrency, 8);
    assert_eq!(settings.stale_after, Duration::from_secs(120));
    assert_eq!(settings.pool_config().concurrency, 8);
    assert_eq!(settings.probe_config().follow_up_cron, "*/10 * * * *");
  }

  #[test]
  fn test_invalid_number() {
    assert!(ServerSettings::from_lookup(lookup(&[("DEADMAN_CONCURRENCY", "many")])).is_err());
  }

  #[test]
  fn test_blank_values_ignored() {
    let settings = ServerSettings::from_lookup(lookup(&[("DEADMAN_DATABASE_URL", "  ")])).unwrap();
    assert!(settings.database_url.is_none());
  }
}
