//! Configuration file and environment handling

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::info;

use whoall_logs::{FRESHNESS_WINDOW_MINUTES, IngestConfig, PlayerFilter};

/// Largest accepted freshness window (one year)
const MAX_FRESHNESS_MINUTES: i64 = 365 * 24 * 60;

/// Config file looked for in the working directory when none is given
const DEFAULT_CONFIG_FILE: &str = "whoall.toml";

/// Default query shown after every batch
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct FilterConfig {
    pub level_start: Option<u32>,
    pub level_end: Option<u32>,
    pub class: Option<String>,
    pub name: Option<String>,
    pub race: Option<String>,
    pub zone: Option<String>,
    pub guild: Option<String>,
    pub lfg: bool,
}

impl FilterConfig {
    pub fn to_filter(&self) -> PlayerFilter {
        PlayerFilter::new()
            .with_level_start(self.level_start)
            .with_level_end(self.level_end)
            .with_class(self.class.as_deref().unwrap_or_default())
            .with_name(self.name.as_deref().unwrap_or_default())
            .with_race(self.race.as_deref().unwrap_or_default())
            .with_zone(self.zone.as_deref().unwrap_or_default())
            .with_guild(self.guild.as_deref().unwrap_or_default())
            .lfg_only(self.lfg)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Game client log file to tail
    pub log_path: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub fallback_poll_ticks: Option<u32>,
    pub freshness_minutes: i64,
    /// Where to write the JSON snapshot on shutdown
    pub export_path: Option<PathBuf>,
    pub filter: FilterConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            poll_interval_ms: 1000,
            fallback_poll_ticks: None,
            freshness_minutes: FRESHNESS_WINDOW_MINUTES,
            export_path: None,
            filter: FilterConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Uses `explicit` if given, else `$WHOALL_CONFIG`, else `./whoall.toml`
    /// when it exists, else defaults. Environment overrides are applied on top.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let requested = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os("WHOALL_CONFIG").map(PathBuf::from));

        let mut config = match requested {
            Some(path) => Self::from_file(&path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    info!("{DEFAULT_CONFIG_FILE} not found, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `WHOALL_LOG_PATH` and `WHOALL_POLL_MS` from `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(log_path) = lookup("WHOALL_LOG_PATH") {
            self.log_path = Some(PathBuf::from(log_path));
        }
        if let Some(poll_ms) = lookup("WHOALL_POLL_MS") {
            self.poll_interval_ms = poll_ms
                .trim()
                .parse()
                .with_context(|| format!("WHOALL_POLL_MS is not a number: {poll_ms}"))?;
        }
        Ok(())
    }

    /// Turn blank strings into `None`
    pub fn normalize(&mut self) {
        if let Some(path) = &self.log_path {
            if path.as_os_str().is_empty() {
                self.log_path = None;
            }
        }
        if let Some(path) = &self.export_path {
            if path.as_os_str().is_empty() {
                self.export_path = None;
            }
        }
        if self.fallback_poll_ticks == Some(0) {
            self.fallback_poll_ticks = None;
        }
        for value in [
            &mut self.filter.class,
            &mut self.filter.name,
            &mut self.filter.race,
            &mut self.filter.zone,
            &mut self.filter.guild,
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *value = None;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_path.is_none() {
            bail!("no log file configured (pass LOG_PATH, set log_path, or set WHOALL_LOG_PATH)");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if !(1..=MAX_FRESHNESS_MINUTES).contains(&self.freshness_minutes) {
            bail!("freshness_minutes must be between 1 and {MAX_FRESHNESS_MINUTES}");
        }
        Ok(())
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            fallback_poll_ticks: self.fallback_poll_ticks,
        }
    }

    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.freshness_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.ingest_config().poll_interval, Duration::from_secs(1));
        assert_eq!(config.freshness_window(), chrono::Duration::minutes(10));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_file() {
        let config = AppConfig::from_toml_str(
            r#"
            log_path = "/games/eq/eqlog_Rune_pq.proj.txt"
            poll_interval_ms = 500
            fallback_poll_ticks = 10
            export_path = "data.json"

            [filter]
            level_start = 10
            level_end = 20
            lfg = true
            "#,
        )
        .unwrap();

        assert_eq!(
            config.log_path,
            Some(PathBuf::from("/games/eq/eqlog_Rune_pq.proj.txt"))
        );
        assert_eq!(config.ingest_config().fallback_poll_ticks, Some(10));
        assert_eq!(config.filter.level_start, Some(10));
        assert!(config.filter.lfg);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_freshness_window_bounds() {
        let mut config = AppConfig::from_toml_str(
            r#"
            log_path = "/tmp/eqlog.txt"
            freshness_minutes = 1000000000000
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        config.freshness_minutes = 0;
        assert!(config.validate().is_err());

        config.freshness_minutes = MAX_FRESHNESS_MINUTES;
        assert!(config.validate().is_ok());
        let store = whoall_logs::PlayerStore::with_window(config.freshness_window());
        assert!(
            store
                .query(&PlayerFilter::new(), chrono::Local::now().naive_local())
                .is_empty()
        );
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("WHOALL_LOG_PATH", "/tmp/eqlog.txt"),
            ("WHOALL_POLL_MS", "250"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.log_path, Some(PathBuf::from("/tmp/eqlog.txt")));
        assert_eq!(config.poll_interval_ms, 250);

        let mut config = AppConfig::default();
        assert!(
            config
                .apply_env_overrides(|_| Some("soon".to_string()))
                .is_err()
        );
    }

    #[test]
    fn test_normalize_blanks() {
        let mut config = AppConfig::from_toml_str(
            r#"
            log_path = ""
            fallback_poll_ticks = 0

            [filter]
            class = "  "
            zone = "gfay"
            "#,
        )
        .unwrap();
        config.normalize();

        assert_eq!(config.log_path, None);
        assert_eq!(config.fallback_poll_ticks, None);
        assert_eq!(config.filter.class, None);
        assert_eq!(config.filter.zone, Some("gfay".to_string()));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "log_path = \"/tmp/eqlog.txt\"\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.log_path, Some(PathBuf::from("/tmp/eqlog.txt")));

        assert!(AppConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_filter_config_to_filter() {
        let filter = FilterConfig {
            level_start: Some(10),
            level_end: Some(20),
            lfg: true,
            ..FilterConfig::default()
        }
        .to_filter();

        assert_eq!(filter, PlayerFilter::new().with_level_range(10, 20).lfg_only(true));
        assert!(FilterConfig::default().to_filter().is_empty());
    }
}
