use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::models::{Entry, EntryFields, GlarginaDose, MealSlot};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Release the file handle. Consumes the database; open it again with [`Database::open`].
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| e)
            .context("Failed to close database")
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS entries (
                    date TEXT NOT NULL,
                    meal TEXT NOT NULL,
                    carbs REAL,
                    glicemia REAL,
                    lispro REAL,
                    bolus REAL,
                    observations TEXT,
                    PRIMARY KEY (date, meal)
                );

                CREATE INDEX IF NOT EXISTS idx_date ON entries (date);

                CREATE TABLE IF NOT EXISTS glargina_doses (
                    date TEXT PRIMARY KEY NOT NULL,
                    dose REAL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn meal_from_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<MealSlot> {
        let key: String = row.get(idx)?;
        MealSlot::from_storage_key(&key).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
    }

    // Expects columns starting at `offset`: carbs, glicemia, lispro, bolus, observations
    fn fields_from_row(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<EntryFields> {
        Ok(EntryFields {
            carbs: row.get(offset)?,
            glucose: row.get(offset + 1)?,
            lispro: row.get(offset + 2)?,
            bolus: row.get(offset + 3)?,
            observations: row.get(offset + 4)?,
        })
    }

    fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
        Ok(Entry {
            date: row.get(0)?,
            meal: Self::meal_from_column(row, 1)?,
            fields: Self::fields_from_row(row, 2)?,
        })
    }

    // --- Entries ---

    /// Insert or fully replace the row for `(date, meal)`.
    pub fn upsert_entry(&self, date: &str, meal: MealSlot, fields: &EntryFields) -> Result<()> {
        self.conn.execute(
            "INSERT INTO entries (date, meal, carbs, glicemia, lispro, bolus, observations)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(date, meal) DO UPDATE SET
                carbs = excluded.carbs,
                glicemia = excluded.glicemia,
                lispro = excluded.lispro,
                bolus = excluded.bolus,
                observations = excluded.observations",
            params![
                date,
                meal.storage_key(),
                fields.carbs,
                fields.glucose,
                fields.lispro,
                fields.bolus,
                fields.observations,
            ],
        )?;
        debug!(date, meal = %meal, "upserted entry");
        Ok(())
    }

    pub fn fetch_entry(&self, date: &str, meal: MealSlot) -> Result<Option<EntryFields>> {
        let fields = self
            .conn
            .query_row(
                "SELECT carbs, glicemia, lispro, bolus, observations
                 FROM entries WHERE date = ?1 AND meal = ?2",
                params![date, meal.storage_key()],
                |row| Self::fields_from_row(row, 0),
            )
            .optional()?;
        Ok(fields)
    }

    /// All entries with `start <= date <= end`, ordered by date then meal key.
    pub fn fetch_range(&self, start: &str, end: &str) -> Result<Vec<Entry>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, meal, carbs, glicemia, lispro, bolus, observations
             FROM entries
             WHERE date BETWEEN ?1 AND ?2
             ORDER BY date, meal",
        )?;
        let entries = stmt
            .query_map(params![start, end], Self::entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Meal slots that have a stored row on `date`.
    pub fn fetch_meals_for_date(&self, date: &str) -> Result<Vec<MealSlot>> {
        let mut stmt = self
            .conn
            .prepare("SELECT meal FROM entries WHERE date = ?1 ORDER BY meal")?;
        let meals = stmt
            .query_map(params![date], |row| Self::meal_from_column(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    /// Returns whether a row was removed. Missing rows are not an error.
    pub fn delete_entry(&self, date: &str, meal: MealSlot) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM entries WHERE date = ?1 AND meal = ?2",
            params![date, meal.storage_key()],
        )?;
        if rows > 0 {
            debug!(date, meal = %meal, "deleted entry");
        }
        Ok(rows > 0)
    }

    // --- Glargina doses ---

    pub fn upsert_glargina_dose(&self, date: &str, dose: Option<f64>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO glargina_doses (date, dose)
             VALUES (?1, ?2)
             ON CONFLICT(date) DO UPDATE SET dose = excluded.dose",
            params![date, dose],
        )?;
        debug!(date, ?dose, "upserted glargina dose");
        Ok(())
    }

    /// The stored dose for `date`. A row holding NULL reads the same as no row.
    pub fn fetch_glargina_dose(&self, date: &str) -> Result<Option<f64>> {
        let dose: Option<Option<f64>> = self
            .conn
            .query_row(
                "SELECT dose FROM glargina_doses WHERE date = ?1",
                params![date],
                |row| row.get(0),
            )
            .optional()?;
        Ok(dose.flatten())
    }

    pub fn fetch_glargina_range(&self, start: &str, end: &str) -> Result<Vec<GlarginaDose>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, dose
             FROM glargina_doses
             WHERE date BETWEEN ?1 AND ?2
             ORDER BY date",
        )?;
        let doses = stmt
            .query_map(params![start, end], |row| {
                Ok(GlarginaDose {
                    date: row.get(0)?,
                    dose: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(doses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FixedMeal;

    const LUNCH: MealSlot = MealSlot::Fixed(FixedMeal::Lunch);
    const DINNER: MealSlot = MealSlot::Fixed(FixedMeal::Dinner);

    fn sample_fields() -> EntryFields {
        EntryFields {
            carbs: Some(50.0),
            glucose: Some(120.0),
            lispro: Some(4.0),
            bolus: Some(0.0),
            observations: None,
        }
    }

    #[test]
    fn test_fresh_database_has_schema_version() {
        let db = Database::open_in_memory().unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_upsert_and_fetch_entry() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_entry("2024-03-01", LUNCH, &sample_fields())
            .unwrap();

        let fetched = db.fetch_entry("2024-03-01", LUNCH).unwrap().unwrap();
        assert_eq!(fetched, sample_fields());

        assert!(db.fetch_entry("2024-03-01", DINNER).unwrap().is_none());
        assert!(db.fetch_entry("2024-03-02", LUNCH).unwrap().is_none());
    }

    #[test]
    fn test_upsert_entry_replaces_every_field() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_entry("2024-03-01", LUNCH, &sample_fields())
            .unwrap();

        let replacement = EntryFields {
            carbs: Some(30.0),
            observations: Some("pão".to_string()),
            ..EntryFields::default()
        };
        db.upsert_entry("2024-03-01", LUNCH, &replacement).unwrap();

        let fetched = db.fetch_entry("2024-03-01", LUNCH).unwrap().unwrap();
        assert_eq!(fetched, replacement);
        // Still a single row for the key
        assert_eq!(db.fetch_range("2024-03-01", "2024-03-01").unwrap().len(), 1);
    }

    #[test]
    fn test_extra_meal_stored_under_typed_key() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_entry("2024-03-01", MealSlot::Extra(2), &sample_fields())
            .unwrap();

        let raw: String = db
            .conn
            .query_row("SELECT meal FROM entries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(raw, "extra:2");

        let meals = db.fetch_meals_for_date("2024-03-01").unwrap();
        assert_eq!(meals, vec![MealSlot::Extra(2)]);
    }

    #[test]
    fn test_fetch_range_inclusive_and_ordered() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_entry("2024-03-03", LUNCH, &sample_fields())
            .unwrap();
        db.upsert_entry("2024-03-01", LUNCH, &sample_fields())
            .unwrap();
        db.upsert_entry("2024-03-01", DINNER, &sample_fields())
            .unwrap();
        db.upsert_entry("2024-02-28", LUNCH, &sample_fields())
            .unwrap();
        db.upsert_entry("2024-03-04", LUNCH, &sample_fields())
            .unwrap();

        let rows = db.fetch_range("2024-03-01", "2024-03-03").unwrap();
        let keys: Vec<(&str, MealSlot)> = rows.iter().map(|e| (e.date.as_str(), e.meal)).collect();
        assert_eq!(
            keys,
            vec![
                ("2024-03-01", LUNCH), // "Almoço" < "Jantar"
                ("2024-03-01", DINNER),
                ("2024-03-03", LUNCH),
            ]
        );
    }

    #[test]
    fn test_delete_entry() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_entry("2024-03-01", LUNCH, &sample_fields())
            .unwrap();

        assert!(db.delete_entry("2024-03-01", LUNCH).unwrap());
        assert!(db.fetch_entry("2024-03-01", LUNCH).unwrap().is_none());

        // Deleting again is a no-op
        assert!(!db.delete_entry("2024-03-01", LUNCH).unwrap());
    }

    #[test]
    fn test_glargina_upsert_and_fetch() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.fetch_glargina_dose("2024-03-01").unwrap().is_none());

        db.upsert_glargina_dose("2024-03-01", Some(20.0)).unwrap();
        assert_eq!(db.fetch_glargina_dose("2024-03-01").unwrap(), Some(20.0));

        db.upsert_glargina_dose("2024-03-01", Some(22.0)).unwrap();
        assert_eq!(db.fetch_glargina_dose("2024-03-01").unwrap(), Some(22.0));

        db.upsert_glargina_dose("2024-03-01", None).unwrap();
        assert!(db.fetch_glargina_dose("2024-03-01").unwrap().is_none());
    }

    #[test]
    fn test_glargina_range() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_glargina_dose("2024-03-02", Some(0.0)).unwrap();
        db.upsert_glargina_dose("2024-03-01", Some(20.0)).unwrap();
        db.upsert_glargina_dose("2024-03-05", Some(18.0)).unwrap();

        let doses = db.fetch_glargina_range("2024-03-01", "2024-03-03").unwrap();
        assert_eq!(
            doses,
            vec![
                GlarginaDose {
                    date: "2024-03-01".to_string(),
                    dose: Some(20.0)
                },
                GlarginaDose {
                    date: "2024-03-02".to_string(),
                    dose: Some(0.0)
                },
            ]
        );
    }

    #[test]
    fn test_close_and_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carb_tracker.db");

        let db = Database::open(&path).unwrap();
        db.upsert_entry("2024-03-01", LUNCH, &sample_fields())
            .unwrap();
        db.upsert_glargina_dose("2024-03-01", Some(20.0)).unwrap();
        db.close().unwrap();

        let db = Database::open(&path).unwrap();
        assert_eq!(
            db.fetch_entry("2024-03-01", LUNCH).unwrap(),
            Some(sample_fields())
        );
        assert_eq!(db.fetch_glargina_dose("2024-03-01").unwrap(), Some(20.0));
    }
}
