use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use anyhow::Result;
use serde::Serialize;

use crate::models::{Entry, PeriodTotals};

/// Rows and per-date doses for a date range, as consumed by report formatters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportData {
    pub rows: Vec<Entry>,
    pub glargina_by_date: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayReport {
    pub date: String,
    pub entries: Vec<Entry>,
    pub glargina: Option<f64>,
    pub carbs: f64,
    /// Zero when the day has no glucose readings.
    pub avg_glucose: f64,
    pub lispro: f64,
    pub bolus: f64,
}

/// Group rows by date. Days appear if they have entries or a dose row.
#[must_use]
pub fn build_day_reports(data: &ReportData) -> Vec<DayReport> {
    let mut by_date: BTreeMap<&str, Vec<Entry>> = BTreeMap::new();
    for entry in &data.rows {
        by_date
            .entry(entry.date.as_str())
            .or_default()
            .push(entry.clone());
    }

    let dates: BTreeSet<&str> = by_date
        .keys()
        .copied()
        .chain(data.glargina_by_date.keys().map(String::as_str))
        .collect();

    dates
        .into_iter()
        .map(|date| {
            let mut entries = by_date.remove(date).unwrap_or_default();
            entries.sort_by_key(|e| e.meal);

            let carbs = entries.iter().filter_map(|e| e.fields.carbs).sum();
            let lispro = entries.iter().filter_map(|e| e.fields.lispro).sum();
            let bolus = entries.iter().filter_map(|e| e.fields.bolus).sum();
            let glucose: Vec<f64> = entries.iter().filter_map(|e| e.fields.glucose).collect();
            #[allow(clippy::cast_precision_loss)]
            let avg_glucose = if glucose.is_empty() {
                0.0
            } else {
                glucose.iter().sum::<f64>() / glucose.len() as f64
            };

            DayReport {
                date: date.to_string(),
                glargina: data.glargina_by_date.get(date).copied().flatten(),
                entries,
                carbs,
                avg_glucose,
                lispro,
                bolus,
            }
        })
        .collect()
}

/// Period totals over already-fetched report data, with the same rules as
/// [`crate::service::TrackerService::calculate_period_totals`].
#[must_use]
pub fn period_totals(data: &ReportData) -> PeriodTotals {
    let mut totals = PeriodTotals::default();
    for entry in &data.rows {
        totals.carbs += entry.fields.carbs.unwrap_or(0.0);
        totals.lispro += entry.fields.lispro.unwrap_or(0.0);
        totals.bolus += entry.fields.bolus.unwrap_or(0.0);
        if let Some(g) = entry.fields.glucose {
            totals.glucose_sum += g;
            totals.glucose_count += 1;
        }
    }
    for dose in data.glargina_by_date.values().flatten() {
        if *dose > 0.0 {
            totals.glargina_sum += dose;
            totals.glargina_count += 1;
        }
    }
    if totals.glucose_count > 0 {
        totals.avg_glucose = totals.glucose_sum / f64::from(totals.glucose_count);
    }
    if totals.glargina_count > 0 {
        totals.avg_glargina = totals.glargina_sum / f64::from(totals.glargina_count);
    }
    totals
}

#[derive(Serialize)]
struct CsvRow<'a> {
    date: &'a str,
    meal: String,
    carbs: Option<f64>,
    glucose: Option<f64>,
    lispro: Option<f64>,
    bolus: Option<f64>,
    observations: Option<&'a str>,
    glargina: Option<f64>,
}

/// One CSV line per meal row. Days with only a dose get a line with an empty meal.
pub fn write_csv<W: Write>(writer: W, days: &[DayReport]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for day in days {
        if day.entries.is_empty() {
            wtr.serialize(CsvRow {
                date: &day.date,
                meal: String::new(),
                carbs: None,
                glucose: None,
                lispro: None,
                bolus: None,
                observations: None,
                glargina: day.glargina,
            })?;
            continue;
        }
        for entry in &day.entries {
            wtr.serialize(CsvRow {
                date: &day.date,
                meal: entry.meal.label(),
                carbs: entry.fields.carbs,
                glucose: entry.fields.glucose,
                lispro: entry.fields.lispro,
                bolus: entry.fields.bolus,
                observations: entry.fields.observations.as_deref(),
                glargina: day.glargina,
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryFields, FixedMeal, MealSlot};

    fn entry(date: &str, meal: MealSlot, carbs: Option<f64>, glucose: Option<f64>) -> Entry {
        Entry {
            date: date.to_string(),
            meal,
            fields: EntryFields {
                carbs,
                glucose,
                lispro: Some(2.0),
                bolus: None,
                observations: None,
            },
        }
    }

    fn sample() -> ReportData {
        ReportData {
            rows: vec![
                entry(
                    "2024-03-01",
                    MealSlot::Fixed(FixedMeal::Lunch),
                    Some(50.0),
                    Some(120.0),
                ),
                entry(
                    "2024-03-01",
                    MealSlot::Fixed(FixedMeal::Breakfast),
                    Some(30.0),
                    Some(90.0),
                ),
                entry("2024-03-03", MealSlot::Extra(1), None, None),
            ],
            glargina_by_date: [
                ("2024-03-01".to_string(), Some(20.0)),
                ("2024-03-02".to_string(), Some(0.0)),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn test_build_day_reports_groups_and_totals() {
        let days = build_day_reports(&sample());
        let dates: Vec<&str> = days.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-03-02", "2024-03-03"]);

        let first = &days[0];
        // Sorted in meal order, not by stored key
        assert_eq!(first.entries[0].meal, MealSlot::Fixed(FixedMeal::Breakfast));
        assert!((first.carbs - 80.0).abs() < 1e-9);
        assert!((first.avg_glucose - 105.0).abs() < 1e-9);
        assert!((first.lispro - 4.0).abs() < 1e-9);
        assert_eq!(first.glargina, Some(20.0));

        let dose_only = &days[1];
        assert!(dose_only.entries.is_empty());
        assert_eq!(dose_only.glargina, Some(0.0));

        let no_dose = &days[2];
        assert!(no_dose.glargina.is_none());
        assert!((no_dose.avg_glucose - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_period_totals_from_report() {
        let totals = period_totals(&sample());
        assert!((totals.carbs - 80.0).abs() < 1e-9);
        assert!((totals.lispro - 6.0).abs() < 1e-9);
        assert!((totals.avg_glucose - 105.0).abs() < 1e-9);
        assert_eq!(totals.glargina_count, 1);
        assert!((totals.avg_glargina - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_write_csv() {
        let days = build_day_reports(&sample());
        let mut out = Vec::new();
        write_csv(&mut out, &days).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "date,meal,carbs,glucose,lispro,bolus,observations,glargina"
        );
        assert_eq!(lines[1], "2024-03-01,Café da manhã,30.0,90.0,2.0,,,20.0");
        assert_eq!(lines[3], "2024-03-02,,,,,,,0.0");
        assert_eq!(lines[4], "2024-03-03,Lanche Extra 1,,,2.0,,,");
        assert_eq!(lines.len(), 5);
    }
}
