use anyhow::{Result, bail};
use std::path::PathBuf;

use carblog_core::config::ConfigUpdate;

use crate::config::Session;

fn print_settings(session: &Session) {
    let s = &session.settings;
    println!("Config file:          {}", session.config_path.display());
    println!("Database:             {}", session.db_path.display());
    println!("Report date format:   {}", s.report_date_format);
    println!("Glucose alert (mg/dL): {:.0}", s.glucose_alert_threshold);
    println!(
        "Database override:    {}",
        s.db_location_override
            .as_ref()
            .map_or_else(|| "-".to_string(), |p| p.display().to_string())
    );
    println!("Theme:                {}", s.app_theme);
}

pub(crate) fn cmd_config_show(session: &Session, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&session.settings)?);
    } else {
        print_settings(session);
    }
    Ok(())
}

pub(crate) fn cmd_config_set(
    session: &mut Session,
    date_format: Option<String>,
    glucose_alert: Option<f64>,
    db: Option<String>,
    theme: Option<String>,
    json: bool,
) -> Result<()> {
    if date_format.is_none() && glucose_alert.is_none() && db.is_none() && theme.is_none() {
        bail!("Nothing to update. Provide at least one of --date-format, --glucose-alert, --db-location, or --theme");
    }

    // An empty --db clears the override
    let db_location_override = db.map(|p| (!p.trim().is_empty()).then(|| PathBuf::from(p)));
    session.settings.update(ConfigUpdate {
        report_date_format: date_format,
        glucose_alert_threshold: glucose_alert,
        db_location_override,
        app_theme: theme,
    })?;
    session.save_settings()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session.settings)?);
    } else {
        println!("Settings saved.");
        print_settings(session);
    }
    Ok(())
}

pub(crate) fn cmd_config_reset(session: &mut Session, json: bool) -> Result<()> {
    session.settings.reset();
    session.save_settings()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session.settings)?);
    } else {
        println!("Settings reset to defaults.");
        print_settings(session);
    }
    Ok(())
}
