use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{TrackerError, TrackerResult};

pub const DEFAULT_DB_FILE: &str = "carb_tracker.db";
pub const DEFAULT_CONFIG_FILE: &str = "carb_tracker_config.json";

/// User settings persisted as a small JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub report_date_format: String,
    /// Informational only; reports flag readings at or above it.
    pub glucose_alert_threshold: f64,
    pub db_location_override: Option<PathBuf>,
    pub app_theme: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            report_date_format: "%d/%m/%Y".to_string(),
            glucose_alert_threshold: 180.0,
            db_location_override: None,
            app_theme: "clam".to_string(),
        }
    }
}

/// A partial settings change. `None` leaves the current value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub report_date_format: Option<String>,
    pub glucose_alert_threshold: Option<f64>,
    pub db_location_override: Option<Option<PathBuf>>,
    pub app_theme: Option<String>,
}

impl AppConfig {
    /// Read the config file. A missing or unreadable document yields the defaults.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let Ok(raw) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt config file, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> TrackerResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TrackerError::Config(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| TrackerError::Config(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| TrackerError::Config(e.to_string()))
    }

    /// Validate and merge a settings change.
    pub fn update(&mut self, update: ConfigUpdate) -> TrackerResult<()> {
        if let Some(format) = &update.report_date_format {
            validate_date_format(format)?;
        }
        if let Some(threshold) = update.glucose_alert_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(TrackerError::InvalidInput(
                    "Glucose alert threshold must be a non-negative number".to_string(),
                ));
            }
        }

        if let Some(format) = update.report_date_format {
            self.report_date_format = format;
        }
        if let Some(threshold) = update.glucose_alert_threshold {
            self.glucose_alert_threshold = threshold;
        }
        if let Some(db) = update.db_location_override {
            self.db_location_override = db;
        }
        if let Some(theme) = update.app_theme {
            self.app_theme = theme;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn format_report_date(&self, date: NaiveDate) -> String {
        let mut out = String::new();
        if write!(out, "{}", date.format(&self.report_date_format)).is_err() {
            return crate::models::iso_date(date);
        }
        out
    }

    #[must_use]
    pub fn is_glucose_alert(&self, glucose: f64) -> bool {
        glucose >= self.glucose_alert_threshold
    }
}

/// Reject strftime patterns chrono cannot render.
pub fn validate_date_format(format: &str) -> TrackerResult<()> {
    if format.trim().is_empty() {
        return Err(TrackerError::InvalidInput(
            "Date format must not be empty".to_string(),
        ));
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(TrackerError::InvalidInput(format!(
            "Invalid date format '{format}'. Use something like %d/%m/%Y"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("nope.json"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(AppConfig::load(&path), AppConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"app_theme": "alt"}"#).unwrap();

        let config = AppConfig::load(&path);
        assert_eq!(config.app_theme, "alt");
        assert_eq!(config.report_date_format, "%d/%m/%Y");
        assert!((config.glucose_alert_threshold - 180.0).abs() < f64::EPSILON);
        assert!(config.db_location_override.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config
            .update(ConfigUpdate {
                report_date_format: Some("%Y/%m/%d".to_string()),
                glucose_alert_threshold: Some(200.0),
                db_location_override: Some(Some(PathBuf::from("/tmp/x.db"))),
                app_theme: None,
            })
            .unwrap();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path);
        assert_eq!(loaded, config);
        assert_eq!(loaded.app_theme, "clam");
    }

    #[test]
    fn test_update_rejects_bad_values_without_changes() {
        let mut config = AppConfig::default();
        let err = config
            .update(ConfigUpdate {
                report_date_format: Some("%Q".to_string()),
                app_theme: Some("alt".to_string()),
                ..ConfigUpdate::default()
            })
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(config, AppConfig::default());

        assert!(
            config
                .update(ConfigUpdate {
                    glucose_alert_threshold: Some(-1.0),
                    ..ConfigUpdate::default()
                })
                .is_err()
        );
    }

    #[test]
    fn test_reset() {
        let mut config = AppConfig {
            app_theme: "alt".to_string(),
            ..AppConfig::default()
        };
        config.reset();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_format_report_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let config = AppConfig::default();
        assert_eq!(config.format_report_date(date), "01/03/2024");
    }

    #[test]
    fn test_glucose_alert() {
        let config = AppConfig::default();
        assert!(config.is_glucose_alert(180.0));
        assert!(!config.is_glucose_alert(179.9));
    }
}
