use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use chrono::Duration;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{TrackerError, TrackerResult};
use crate::models::{
    DailyAggregate, DailyData, DayForm, EntryFields, FIXED_MEALS, FieldKind, MealForm, MealSlot,
    PeriodTotals, iso_date, parse_iso_date,
};
use crate::report::{self, ReportData};

/// A validated form value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    fn into_number(self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(v),
            FieldValue::Text(_) => None,
        }
    }

    fn into_text(self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }
}

/// Turn one raw form string into a typed value.
///
/// Empty input is valid and yields `None`. Observations are free text and never fail.
pub fn validate_numeric_input(
    text: &str,
    kind: FieldKind,
    context: &str,
) -> TrackerResult<Option<FieldValue>> {
    let trimmed = text.trim();
    if kind == FieldKind::Observations {
        return Ok((!trimmed.is_empty()).then(|| FieldValue::Text(trimmed.to_string())));
    }
    if trimmed.is_empty() {
        return Ok(None);
    }

    let field = kind.title().to_string();
    let context = context.to_string();
    let value = match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => return Err(TrackerError::InvalidNumber { field, context }),
    };
    if value < 0.0 {
        return Err(TrackerError::NegativeValue { field, context });
    }
    Ok(Some(FieldValue::Number(value)))
}

fn validate_number(text: &str, kind: FieldKind, context: &str) -> TrackerResult<Option<f64>> {
    Ok(validate_numeric_input(text, kind, context)?.and_then(FieldValue::into_number))
}

/// Validate every field of a meal row, naming the meal in any error.
pub fn validate_meal_form(slot: MealSlot, form: &MealForm) -> TrackerResult<EntryFields> {
    let context = slot.label();
    Ok(EntryFields {
        carbs: validate_number(&form.carbs, FieldKind::Carbs, &context)?,
        glucose: validate_number(&form.glucose, FieldKind::Glucose, &context)?,
        lispro: validate_number(&form.lispro, FieldKind::Lispro, &context)?,
        bolus: validate_number(&form.bolus, FieldKind::Bolus, &context)?,
        observations: validate_numeric_input(&form.observations, FieldKind::Observations, &context)?
            .and_then(FieldValue::into_text),
    })
}

/// Blank observations are stored as NULL.
fn normalized(fields: &EntryFields) -> EntryFields {
    EntryFields {
        observations: fields
            .observations
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string),
        ..fields.clone()
    }
}

pub struct TrackerService {
    db: Option<Database>,
    db_path: Option<PathBuf>,
}

impl TrackerService {
    pub fn new(db_path: &Path) -> TrackerResult<Self> {
        let db = Database::open(db_path)?;
        Ok(Self {
            db: Some(db),
            db_path: Some(db_path.to_path_buf()),
        })
    }

    pub fn new_in_memory() -> TrackerResult<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Some(db),
            db_path: None,
        })
    }

    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn db(&self) -> TrackerResult<&Database> {
        self.db
            .as_ref()
            .ok_or_else(|| TrackerError::Storage(anyhow!("Database connection is closed")))
    }

    // --- Day editing ---

    /// Persist a whole day.
    ///
    /// The dose is always written. Every meal that is fixed, submitted, or already
    /// stored for the date is then reconciled: rows with data are upserted and the
    /// rest are deleted, so removed extra snacks and cleared meals leave no rows behind.
    pub fn save_daily_data(
        &self,
        date: &str,
        glargina: f64,
        meals: &BTreeMap<MealSlot, EntryFields>,
    ) -> TrackerResult<String> {
        let day = parse_iso_date(date)?;
        let db = self.db()?;

        db.upsert_glargina_dose(date, Some(glargina))?;

        let mut slots: BTreeSet<MealSlot> = FIXED_MEALS.iter().copied().map(MealSlot::Fixed).collect();
        slots.extend(meals.keys().copied());
        slots.extend(db.fetch_meals_for_date(date)?);

        let mut saved = 0;
        let mut removed = 0;
        for slot in slots {
            match meals.get(&slot).filter(|f| !f.is_empty()) {
                Some(fields) => {
                    db.upsert_entry(date, slot, &normalized(fields))?;
                    saved += 1;
                }
                None => {
                    if db.delete_entry(date, slot)? {
                        removed += 1;
                    }
                }
            }
        }

        info!(date, glargina, saved, removed, "saved day");
        Ok(format!(
            "Data for {} saved successfully.",
            day.format("%d/%m/%Y")
        ))
    }

    /// Validate raw form strings and, only if all are valid, save the day.
    /// An empty long-acting dose is saved as 0.
    pub fn save_day_form(&self, date: &str, form: &DayForm) -> TrackerResult<String> {
        let glargina = validate_number(&form.glargina, FieldKind::Glargina, "")?.unwrap_or(0.0);
        let meals = form
            .meals
            .iter()
            .map(|(slot, meal)| Ok((*slot, validate_meal_form(*slot, meal)?)))
            .collect::<TrackerResult<BTreeMap<_, _>>>()?;
        self.save_daily_data(date, glargina, &meals)
    }

    /// Load a day for editing: every fixed meal plus any stored extra snacks.
    pub fn get_daily_data(&self, date: &str) -> TrackerResult<DailyData> {
        parse_iso_date(date)?;
        let db = self.db()?;

        let glargina = db.fetch_glargina_dose(date)?;
        let mut meals: BTreeMap<MealSlot, EntryFields> = FIXED_MEALS
            .iter()
            .map(|m| (MealSlot::Fixed(*m), EntryFields::default()))
            .collect();
        for entry in db.fetch_range(date, date)? {
            meals.insert(entry.meal, entry.fields);
        }

        Ok(DailyData {
            date: date.to_string(),
            glargina,
            meals,
        })
    }

    /// Write a single meal row without touching the rest of the day.
    /// Empty fields delete the row, as in [`TrackerService::save_daily_data`].
    pub fn set_meal(&self, date: &str, slot: MealSlot, fields: &EntryFields) -> TrackerResult<()> {
        parse_iso_date(date)?;
        let db = self.db()?;
        if fields.is_empty() {
            db.delete_entry(date, slot)?;
        } else {
            db.upsert_entry(date, slot, &normalized(fields))?;
        }
        Ok(())
    }

    /// Drop a meal row (typically an extra snack). Returns whether a row existed.
    pub fn remove_meal(&self, date: &str, slot: MealSlot) -> TrackerResult<bool> {
        parse_iso_date(date)?;
        Ok(self.db()?.delete_entry(date, slot)?)
    }

    pub fn set_glargina(&self, date: &str, dose: Option<f64>) -> TrackerResult<()> {
        parse_iso_date(date)?;
        if dose.is_some_and(|d| d < 0.0) {
            return Err(TrackerError::NegativeValue {
                field: FieldKind::Glargina.title().to_string(),
                context: String::new(),
            });
        }
        self.db()?.upsert_glargina_dose(date, dose)?;
        Ok(())
    }

    // --- Reports ---

    /// Sums and averages over `[start, end]`.
    ///
    /// Absent fields count as zero in the sums. Doses of exactly zero are left out
    /// of the long-acting average.
    pub fn calculate_period_totals(&self, start: &str, end: &str) -> TrackerResult<PeriodTotals> {
        let data = self.get_report_data(start, end)?;
        Ok(report::period_totals(&data))
    }

    /// One aggregate per calendar day in `[start, end]`, including days with no data.
    pub fn get_daily_aggregated_data(
        &self,
        start: &str,
        end: &str,
    ) -> TrackerResult<BTreeMap<String, DailyAggregate>> {
        let start_date = parse_iso_date(start)?;
        let end_date = parse_iso_date(end)?;
        let db = self.db()?;

        let mut sums: BTreeMap<String, (DailyAggregate, f64, u32)> = BTreeMap::new();
        let mut day = start_date;
        while day <= end_date {
            sums.insert(iso_date(day), (DailyAggregate::default(), 0.0, 0));
            day += Duration::days(1);
        }

        for entry in db.fetch_range(start, end)? {
            if let Some((agg, glucose_sum, glucose_count)) = sums.get_mut(&entry.date) {
                agg.carbs += entry.fields.carbs.unwrap_or(0.0);
                if let Some(g) = entry.fields.glucose {
                    *glucose_sum += g;
                    *glucose_count += 1;
                }
            }
        }
        for dose in db.fetch_glargina_range(start, end)? {
            if let Some((agg, _, _)) = sums.get_mut(&dose.date) {
                agg.glargina = dose.dose;
            }
        }

        Ok(sums
            .into_iter()
            .map(|(date, (mut agg, sum, count))| {
                agg.glucose = (count > 0).then(|| sum / f64::from(count));
                (date, agg)
            })
            .collect())
    }

    /// Rows and per-date doses for the report formatter.
    pub fn get_report_data(&self, start: &str, end: &str) -> TrackerResult<ReportData> {
        parse_iso_date(start)?;
        parse_iso_date(end)?;
        let db = self.db()?;
        let rows = db.fetch_range(start, end)?;
        let glargina_by_date = db
            .fetch_glargina_range(start, end)?
            .into_iter()
            .map(|d| (d.date, d.dose))
            .collect();
        Ok(ReportData {
            rows,
            glargina_by_date,
        })
    }

    // --- Backup / restore ---

    /// Copy the database file to `destination`.
    pub fn create_backup(&mut self, source: &Path, destination: &Path) -> TrackerResult<String> {
        ensure_distinct(source, destination)?;
        self.with_connection_released(|| copy_file(source, destination))?;
        info!(destination = %destination.display(), "backup created");
        Ok(format!("Backup created at: {}", destination.display()))
    }

    /// Copy a backup file over the live database at `destination`.
    pub fn restore_backup(&mut self, source: &Path, destination: &Path) -> TrackerResult<String> {
        ensure_distinct(source, destination)?;
        self.with_connection_released(|| copy_file(source, destination))?;
        info!(source = %source.display(), "database restored");
        Ok(format!("Database restored from: {}", source.display()))
    }

    /// Run `op` with the database file closed, then reopen it whatever `op` returned.
    fn with_connection_released<T>(
        &mut self,
        op: impl FnOnce() -> TrackerResult<T>,
    ) -> TrackerResult<T> {
        let Some(path) = self.db_path.clone() else {
            return op();
        };

        if let Some(db) = self.db.take() {
            if let Err(e) = db.close() {
                warn!(error = %e, "database did not close cleanly");
            }
        }

        let result = op();
        match Database::open(&path) {
            Ok(db) => {
                self.db = Some(db);
                result
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to reopen database");
                result.and(Err(TrackerError::Storage(e)))
            }
        }
    }
}

/// `fs::copy` truncates the destination first, so copying a file onto itself empties it.
fn ensure_distinct(source: &Path, destination: &Path) -> TrackerResult<()> {
    if let (Ok(a), Ok(b)) = (source.canonicalize(), destination.canonicalize()) {
        if a == b {
            return Err(TrackerError::InvalidInput(format!(
                "'{}' and '{}' are the same file",
                source.display(),
                destination.display()
            )));
        }
    }
    Ok(())
}

fn copy_file(source: &Path, destination: &Path) -> TrackerResult<()> {
    if !source.is_file() {
        return Err(TrackerError::NotFound(source.to_path_buf()));
    }
    std::fs::copy(source, destination)?;
    Ok(())
}
