use anyhow::{Context, Result, bail};
use std::io::Read;
use std::path::Path;

use carblog_core::models::{DayForm, EntryFields, MealForm, MealSlot, parse_iso_date};
use carblog_core::service::validate_meal_form;

use crate::config::Session;

use super::helpers::{fmt_opt, parse_iso, parse_meal, print_meal_table};

pub(crate) fn cmd_day_show(session: &Session, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_iso(date)?;
    let day = session.service.get_daily_data(&date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&day)?);
        return Ok(());
    }

    let title = session.settings.format_report_date(parse_iso_date(&date)?);
    println!("=== {title} ===\n");
    println!("  Glargina: {} UI\n", fmt_opt(day.glargina));
    print_meal_table(
        &day.meals,
        Some(session.settings.glucose_alert_threshold),
    );
    Ok(())
}

/// Save a whole day from a JSON form (`-` reads stdin).
pub(crate) fn cmd_day_save(session: &Session, date: Option<String>, file: &Path, json: bool) -> Result<()> {
    let date = parse_iso(date)?;
    let raw = if file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read day form from stdin")?;
        buf
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?
    };
    let form: DayForm = serde_json::from_str(&raw).context("Invalid day form JSON")?;

    let message = session.service.save_day_form(&date, &form)?;
    if json {
        println!("{}", serde_json::json!({ "saved": date, "message": message }));
    } else {
        println!("{message}");
    }
    Ok(())
}

/// Raw flag values for one meal. `None` keeps the stored value, `Some("")` clears it.
pub(crate) struct MealFlags {
    pub carbs: Option<String>,
    pub glucose: Option<String>,
    pub lispro: Option<String>,
    pub bolus: Option<String>,
    pub observations: Option<String>,
}

impl MealFlags {
    fn is_empty(&self) -> bool {
        self.carbs.is_none()
            && self.glucose.is_none()
            && self.lispro.is_none()
            && self.bolus.is_none()
            && self.observations.is_none()
    }

    /// Layer the flags over the stored row, keeping form-string semantics.
    fn merge(self, current: &EntryFields) -> MealForm {
        let keep = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
        MealForm {
            carbs: self.carbs.unwrap_or_else(|| keep(current.carbs)),
            glucose: self.glucose.unwrap_or_else(|| keep(current.glucose)),
            lispro: self.lispro.unwrap_or_else(|| keep(current.lispro)),
            bolus: self.bolus.unwrap_or_else(|| keep(current.bolus)),
            observations: self
                .observations
                .unwrap_or_else(|| current.observations.clone().unwrap_or_default()),
        }
    }
}

pub(crate) fn cmd_log(
    session: &Session,
    date: Option<String>,
    meal: &str,
    flags: MealFlags,
    json: bool,
) -> Result<()> {
    if flags.is_empty() {
        bail!("Nothing to log. Provide at least one of --carbs, --glucose, --lispro, --bolus, or --obs");
    }
    let date = parse_iso(date)?;
    let day = session.service.get_daily_data(&date)?;

    // Bare "extra" opens the next free extra snack
    let slot = if meal.trim().eq_ignore_ascii_case("extra") {
        day.next_extra_slot()?
    } else {
        parse_meal(meal)?
    };

    let current = day.meals.get(&slot).cloned().unwrap_or_default();
    let fields = validate_meal_form(slot, &flags.merge(&current))?;
    session.service.set_meal(&date, slot, &fields)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "date": date, "meal": slot, "fields": fields })
        );
    } else if fields.is_empty() {
        println!("Cleared {slot} on {date}");
    } else {
        println!("Logged {slot} on {date}");
        print_meal_table([(&slot, &fields)], Some(session.settings.glucose_alert_threshold));
    }
    Ok(())
}

pub(crate) fn cmd_remove(session: &Session, date: Option<String>, meal: &str, json: bool) -> Result<()> {
    let date = parse_iso(date)?;
    let slot: MealSlot = parse_meal(meal)?;
    let removed = session.service.remove_meal(&date, slot)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "date": date, "meal": slot, "removed": removed })
        );
    } else if removed {
        println!("Removed {slot} from {date}");
    } else {
        eprintln!("No {slot} entry on {date}");
    }
    Ok(())
}

pub(crate) fn cmd_glargina(
    session: &Session,
    date: Option<String>,
    dose: Option<f64>,
    json: bool,
) -> Result<()> {
    let date = parse_iso(date)?;
    session.service.set_glargina(&date, dose)?;

    if json {
        println!("{}", serde_json::json!({ "date": date, "glargina": dose }));
    } else {
        println!("Glargina for {date}: {} UI", fmt_opt(dose));
    }
    Ok(())
}
