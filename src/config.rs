use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeDelta};
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::publish::{LinkStyle, PublishSettings, RecordLayout};
use crate::reconcile::{EarlyStop, ReconcilePolicy};

/// Entry cap used when `max_entries` is unset or 0.
pub const DEFAULT_MAX_ENTRIES: usize = 50;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}

/// Application configuration loaded from TOML config file.
/// Every field has a default, so the config file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// IANA name of the zone used for every written timestamp.
    pub timezone: String,
    /// Title of the placeholder row written when there is nothing to show.
    pub no_history_label: String,
    /// Maximum published entries. 0 = default (50).
    pub max_entries: usize,
    /// Drop entries older than this many hours. Unset = keep everything.
    pub retention_hours: Option<u32>,
    pub link_style: LinkStyle,
    pub early_stop: EarlyStop,
    pub store: StoreConfig,
    pub source: SourceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: "America/Chicago".to_string(),
            no_history_label: "No_recent_history_found_".to_string(),
            max_entries: DEFAULT_MAX_ENTRIES,
            retention_hours: None,
            link_style: LinkStyle::default(),
            early_stop: EarlyStop::default(),
            store: StoreConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

/// Where the published record lives.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    pub record_id: String,
    /// Whether the record takes formula writes (hyperlink-style links).
    pub accept_formulas: bool,
    /// Create the record on first run instead of failing.
    pub create_record: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            record_id: "live-history".to_string(),
            accept_formulas: true,
            create_record: true,
        }
    }
}

/// Where playlist exports are read from.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SourceConfig {
    pub playlist_dir: Option<PathBuf>,
    /// Also descend into subfolders.
    pub recursive: bool,
}

impl AppConfig {
    /// Load config from `~/.config/livehistory/config.toml`.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path.
    /// Logs a warning and falls back to defaults if it can't be read or parsed.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Resolve entry cap: 0 → 50.
    pub fn resolve_max_entries(&self) -> usize {
        if self.max_entries > 0 {
            self.max_entries
        } else {
            DEFAULT_MAX_ENTRIES
        }
    }

    pub fn resolve_timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))
    }

    /// Oldest wall-clock time still retained, if a retention window is set.
    /// A window reaching past the earliest representable time means no cutoff.
    pub fn cutoff(&self, now: &DateTime<Tz>) -> Option<NaiveDateTime> {
        let hours = self.retention_hours?;
        let cutoff = TimeDelta::try_hours(i64::from(hours))
            .and_then(|window| now.naive_local().checked_sub_signed(window));
        if cutoff.is_none() {
            log::warn!("retention_hours = {hours} is out of range, keeping everything");
        }
        cutoff
    }

    pub fn reconcile_policy(&self, now: &DateTime<Tz>) -> ReconcilePolicy {
        ReconcilePolicy {
            max_entries: self.resolve_max_entries(),
            cutoff: self.cutoff(now),
            early_stop: self.early_stop,
        }
    }

    pub fn publish_settings(&self) -> PublishSettings {
        PublishSettings {
            layout: RecordLayout::default(),
            no_history_label: self.no_history_label.clone(),
            link_style: self.link_style,
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("livehistory.db")
    } else {
        // Fallback: current directory
        PathBuf::from("livehistory.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.resolve_max_entries(), 50);
        assert_eq!(config.link_style, LinkStyle::RawUrl);
        assert_eq!(config.early_stop, EarlyStop::NewEntries);
        assert_eq!(config.store.record_id, "live-history");
        assert!(config.store.accept_formulas);
        assert!(config.source.playlist_dir.is_none());
    }

    #[test]
    fn test_partial_file() {
        let config: AppConfig = toml::from_str(
            r#"
            max_entries = 0
            retention_hours = 3
            link_style = "hyperlink"
            early_stop = "combined"

            [source]
            playlist_dir = "/music/History"
            "#,
        )
        .unwrap();

        assert_eq!(config.resolve_max_entries(), 50);
        assert_eq!(config.retention_hours, Some(3));
        assert_eq!(config.link_style, LinkStyle::Hyperlink);
        assert_eq!(config.early_stop, EarlyStop::Combined);
        assert_eq!(config.source.playlist_dir, Some(PathBuf::from("/music/History")));
        assert_eq!(config.timezone, "America/Chicago");
        assert!(config.store.create_record);
    }

    #[test]
    fn test_bad_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_entries = \"lots\"").unwrap();
        assert_eq!(AppConfig::load_from(&path).max_entries, 50);

        assert_eq!(AppConfig::load_from(&dir.path().join("missing.toml")).max_entries, 50);
    }

    #[test]
    fn test_timezone() {
        let mut config = AppConfig::default();
        assert_eq!(config.resolve_timezone().unwrap(), chrono_tz::America::Chicago);

        config.timezone = "Mars/Olympus_Mons".to_string();
        assert!(matches!(config.resolve_timezone(), Err(ConfigError::UnknownTimezone(_))));
    }

    #[test]
    fn test_cutoff_is_local_wall_clock() {
        let now = chrono_tz::America::Chicago.with_ymd_and_hms(2025, 10, 27, 23, 0, 0).unwrap();
        let mut config = AppConfig::default();
        assert!(config.reconcile_policy(&now).cutoff.is_none());

        config.retention_hours = Some(3);
        let cutoff = config.reconcile_policy(&now).cutoff.unwrap();
        assert_eq!(cutoff.to_string(), "2025-10-27 20:00:00");
    }

    #[test]
    fn test_huge_retention_window_disables_cutoff() {
        let now = chrono_tz::America::Chicago.with_ymd_and_hms(2025, 10, 27, 23, 0, 0).unwrap();
        let config: AppConfig = toml::from_str("retention_hours = 4294967295").unwrap();
        assert_eq!(config.retention_hours, Some(u32::MAX));
        assert!(config.reconcile_policy(&now).cutoff.is_none());
    }
}
