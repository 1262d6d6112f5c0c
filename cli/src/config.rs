use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

use carblog_core::config::{AppConfig, DEFAULT_CONFIG_FILE, DEFAULT_DB_FILE};
use carblog_core::service::TrackerService;

/// Resolved file locations for this run.
pub struct Config {
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub settings: AppConfig,
}

impl Config {
    /// `--config` and `--db` win over the data directory; the settings file's
    /// `db_location_override` wins over the default database path.
    pub fn load(config_path: Option<PathBuf>, db_path: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_path {
            Some(p) => p,
            None => data_dir()?.join(DEFAULT_CONFIG_FILE),
        };
        let settings = AppConfig::load(&config_path);

        let db_path = match db_path.or_else(|| settings.db_location_override.clone()) {
            Some(p) => p,
            None => data_dir()?.join(DEFAULT_DB_FILE),
        };

        Ok(Config {
            db_path,
            config_path,
            settings,
        })
    }
}

fn data_dir() -> Result<PathBuf> {
    let proj_dirs =
        ProjectDirs::from("", "", "carblog").context("Could not determine home directory")?;

    let data_dir = proj_dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    Ok(data_dir)
}

/// Everything a command handler needs: the open service plus current settings.
pub struct Session {
    pub service: TrackerService,
    pub settings: AppConfig,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
}

impl Session {
    pub fn open(config: Config) -> Result<Self> {
        let service = TrackerService::new(&config.db_path)?;
        Ok(Session {
            service,
            settings: config.settings,
            config_path: config.config_path,
            db_path: config.db_path,
        })
    }

    pub fn save_settings(&self) -> Result<()> {
        self.settings.save(&self.config_path)?;
        Ok(())
    }
}
