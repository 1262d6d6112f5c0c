use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use carblog_core::models::{EntryFields, MealSlot, iso_date};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Resolve a CLI date argument straight to the ISO string the service expects.
pub(crate) fn parse_iso(date_str: Option<String>) -> Result<String> {
    parse_date(date_str).map(iso_date)
}

pub(crate) fn parse_meal(s: &str) -> Result<MealSlot> {
    Ok(s.parse::<MealSlot>()?)
}

pub(crate) fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{:.1}", no_neg_zero(v)))
}

pub(crate) fn print_meal_table<'a>(
    meals: impl IntoIterator<Item = (&'a MealSlot, &'a EntryFields)>,
    alert_threshold: Option<f64>,
) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Carbs (g)")]
        carbs: String,
        #[tabled(rename = "Glucose")]
        glucose: String,
        #[tabled(rename = "Lispro (UI)")]
        lispro: String,
        #[tabled(rename = "Bolus (UI)")]
        bolus: String,
        #[tabled(rename = "Notes")]
        observations: String,
    }

    let rows: Vec<MealRow> = meals
        .into_iter()
        .map(|(slot, f)| {
            let mut glucose = fmt_opt(f.glucose);
            if let (Some(g), Some(limit)) = (f.glucose, alert_threshold) {
                if g >= limit {
                    glucose.push_str(" !");
                }
            }
            MealRow {
                meal: slot.label(),
                carbs: fmt_opt(f.carbs),
                glucose,
                lispro: fmt_opt(f.lispro),
                bolus: fmt_opt(f.bolus),
                observations: f
                    .observations
                    .as_deref()
                    .map(|o| truncate(o, 40))
                    .unwrap_or_default(),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
