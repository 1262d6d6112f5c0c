use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{TrackerError, TrackerResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Label shared by every dynamically created snack row.
pub const EXTRA_MEAL_PREFIX: &str = "Lanche Extra";

const EXTRA_KEY_PREFIX: &str = "extra:";

// --- Meal identity ---

/// Meals that are always shown on a day, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FixedMeal {
    Fasting,
    Breakfast,
    MorningSnack,
    Lunch,
    AfternoonSnack,
    Dinner,
}

pub const FIXED_MEALS: &[FixedMeal] = &[
    FixedMeal::Fasting,
    FixedMeal::Breakfast,
    FixedMeal::MorningSnack,
    FixedMeal::Lunch,
    FixedMeal::AfternoonSnack,
    FixedMeal::Dinner,
];

impl FixedMeal {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            FixedMeal::Fasting => "Jejum",
            FixedMeal::Breakfast => "Café da manhã",
            FixedMeal::MorningSnack => "Colação",
            FixedMeal::Lunch => "Almoço",
            FixedMeal::AfternoonSnack => "Café da tarde",
            FixedMeal::Dinner => "Jantar",
        }
    }

    fn from_label(s: &str) -> Option<Self> {
        let lower = s.to_lowercase();
        FIXED_MEALS
            .iter()
            .copied()
            .find(|m| m.label().to_lowercase() == lower)
    }
}

/// Identity of a meal row within a day.
///
/// Extra snacks carry a numeric id; the display label is derived from it and
/// never parsed back for bookkeeping. Ordering puts fixed meals first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MealSlot {
    Fixed(FixedMeal),
    Extra(u32),
}

impl MealSlot {
    /// Value stored in the `meal` column.
    #[must_use]
    pub fn storage_key(&self) -> String {
        match self {
            MealSlot::Fixed(m) => m.label().to_string(),
            MealSlot::Extra(n) => format!("{EXTRA_KEY_PREFIX}{n}"),
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        match self {
            MealSlot::Fixed(m) => m.label().to_string(),
            MealSlot::Extra(n) => format!("{EXTRA_MEAL_PREFIX} {n}"),
        }
    }

    #[must_use]
    pub fn is_extra(&self) -> bool {
        matches!(self, MealSlot::Extra(_))
    }

    pub fn from_storage_key(key: &str) -> TrackerResult<Self> {
        if let Some(n) = key.strip_prefix(EXTRA_KEY_PREFIX) {
            let id = n
                .parse::<u32>()
                .map_err(|_| TrackerError::InvalidInput(format!("Invalid extra meal key '{key}'")))?;
            return Ok(MealSlot::Extra(id));
        }
        FixedMeal::from_label(key)
            .map(MealSlot::Fixed)
            .ok_or_else(|| TrackerError::InvalidInput(format!("Unknown meal '{key}'")))
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for MealSlot {
    type Err = TrackerError;

    /// Accepts a fixed meal label, a storage key (`extra:3`), or a typed
    /// extra label (`Lanche Extra 3`, `extra 3`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(slot) = Self::from_storage_key(s) {
            return Ok(slot);
        }
        let lower = s.to_lowercase();
        let extra_prefixes = [EXTRA_MEAL_PREFIX.to_lowercase(), "extra".to_string()];
        for prefix in &extra_prefixes {
            if let Some(rest) = lower.strip_prefix(prefix.as_str()) {
                if let Ok(n) = rest.trim().parse::<u32>() {
                    return Ok(MealSlot::Extra(n));
                }
            }
        }
        let known: Vec<&str> = FIXED_MEALS.iter().map(|m| m.label()).collect();
        Err(TrackerError::InvalidInput(format!(
            "Unknown meal '{s}'. Must be one of: {}, or '{EXTRA_MEAL_PREFIX} <n>'",
            known.join(", ")
        )))
    }
}

impl Serialize for MealSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for MealSlot {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// --- Entries ---

/// The value columns of one meal row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryFields {
    pub carbs: Option<f64>,
    pub glucose: Option<f64>,
    pub lispro: Option<f64>,
    pub bolus: Option<f64>,
    #[serde(default)]
    pub observations: Option<String>,
}

impl EntryFields {
    /// True when no field carries data. Whitespace-only observations count as empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.carbs.is_none()
            && self.glucose.is_none()
            && self.lispro.is_none()
            && self.bolus.is_none()
            && self
                .observations
                .as_deref()
                .is_none_or(|o| o.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub date: String,
    pub meal: MealSlot,
    #[serde(flatten)]
    pub fields: EntryFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlarginaDose {
    pub date: String,
    pub dose: Option<f64>,
}

/// A day as loaded for editing: the long-acting dose and every meal row.
#[derive(Debug, Clone, Serialize)]
pub struct DailyData {
    pub date: String,
    pub glargina: Option<f64>,
    pub meals: BTreeMap<MealSlot, EntryFields>,
}

impl DailyData {
    /// One past the highest extra-snack id used on this day.
    pub fn next_extra_slot(&self) -> TrackerResult<MealSlot> {
        let max = self
            .meals
            .keys()
            .filter_map(|slot| match slot {
                MealSlot::Extra(n) => Some(*n),
                MealSlot::Fixed(_) => None,
            })
            .max()
            .unwrap_or(0);
        max.checked_add(1).map(MealSlot::Extra).ok_or_else(|| {
            TrackerError::InvalidInput(format!("No extra snack id left after {max}"))
        })
    }
}

// --- Form input ---

/// Which form field a raw string came from. Drives validation messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Carbs,
    Glucose,
    Lispro,
    Bolus,
    Observations,
    Glargina,
}

impl FieldKind {
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            FieldKind::Carbs => "Carboidratos (g)",
            FieldKind::Glucose => "Glicemia (mg/dL)",
            FieldKind::Lispro => "Insulina Lispro (UI)",
            FieldKind::Bolus => "Bolus correção (UI)",
            FieldKind::Observations => "Observações",
            FieldKind::Glargina => "Insulina Glargina (UI)",
        }
    }
}

/// Raw strings for one meal row, as typed into the form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MealForm {
    pub carbs: String,
    pub glucose: String,
    pub lispro: String,
    pub bolus: String,
    pub observations: String,
}

/// Raw strings for an entire day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DayForm {
    pub glargina: String,
    pub meals: BTreeMap<MealSlot, MealForm>,
}

// --- Aggregates ---

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodTotals {
    pub carbs: f64,
    pub glucose_sum: f64,
    pub glucose_count: u32,
    pub lispro: f64,
    pub bolus: f64,
    pub glargina_sum: f64,
    pub glargina_count: u32,
    pub avg_glucose: f64,
    pub avg_glargina: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyAggregate {
    pub carbs: f64,
    pub glucose: Option<f64>,
    pub glargina: Option<f64>,
}

// --- Calculators ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DoseCalculation {
    pub carb_bolus: f64,
    pub correction_bolus: f64,
    pub total: f64,
}

/// Numerator of the "1800 rule" for the insulin sensitivity factor.
pub const ISF_RULE_CONSTANT: f64 = 1800.0;

/// Meal bolus: carbs over the carb ratio plus the correction towards target.
///
/// A current glucose below target yields a negative correction, which lowers the total.
pub fn insulin_dose(
    carbs: f64,
    current_glucose: f64,
    target_glucose: f64,
    carb_ratio: f64,
    isf: f64,
) -> TrackerResult<DoseCalculation> {
    for (name, value) in [
        ("Carboidratos (g)", carbs),
        ("Glicemia Atual (mg/dL)", current_glucose),
        ("Relação Carboidrato/Insulina", carb_ratio),
        ("Fator de Sensibilidade à Insulina", isf),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(TrackerError::InvalidInput(format!(
                "'{name}' must be a positive number"
            )));
        }
    }
    if !target_glucose.is_finite() || target_glucose < 0.0 {
        return Err(TrackerError::InvalidInput(
            "'Glicemia Alvo (mg/dL)' must not be negative".to_string(),
        ));
    }

    let carb_bolus = carbs / carb_ratio;
    let correction_bolus = (current_glucose - target_glucose) / isf;
    Ok(DoseCalculation {
        carb_bolus,
        correction_bolus,
        total: carb_bolus + correction_bolus,
    })
}

pub fn insulin_sensitivity_factor(total_daily_insulin: f64) -> TrackerResult<f64> {
    if !total_daily_insulin.is_finite() || total_daily_insulin <= 0.0 {
        return Err(TrackerError::InvalidInput(
            "Total daily insulin must be a positive number".to_string(),
        ));
    }
    Ok(ISF_RULE_CONSTANT / total_daily_insulin)
}

/// Parse a calculator field, accepting `,` as decimal separator.
pub fn parse_calculator_input(value: &str, field: &str) -> TrackerResult<f64> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TrackerError::InvalidInput(format!(
            "'{field}' must not be empty"
        )));
    }
    match value.replace(',', ".").parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(TrackerError::InvalidInput(format!(
            "'{field}' must be a valid number"
        ))),
    }
}

/// Parse a storage date. Only the zero-padded `YYYY-MM-DD` form is accepted,
/// since stored dates are compared as strings.
pub fn parse_iso_date(s: &str) -> TrackerResult<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .filter(|d| iso_date(*d) == s)
        .ok_or_else(|| TrackerError::InvalidInput(format!("Invalid date '{s}'. Use YYYY-MM-DD")))
}

#[must_use]
pub fn iso_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meal_slot_parse_labels_and_keys() {
        assert_eq!(
            "Almoço".parse::<MealSlot>().unwrap(),
            MealSlot::Fixed(FixedMeal::Lunch)
        );
        assert_eq!(
            "jantar".parse::<MealSlot>().unwrap(),
            MealSlot::Fixed(FixedMeal::Dinner)
        );
        assert_eq!("extra:4".parse::<MealSlot>().unwrap(), MealSlot::Extra(4));
        assert_eq!(
            "Lanche Extra 2".parse::<MealSlot>().unwrap(),
            MealSlot::Extra(2)
        );
        assert_eq!("extra 7".parse::<MealSlot>().unwrap(), MealSlot::Extra(7));
        assert!("brunch".parse::<MealSlot>().is_err());
    }

    #[test]
    fn test_meal_slot_storage_key_roundtrip() {
        for slot in [MealSlot::Fixed(FixedMeal::Breakfast), MealSlot::Extra(12)] {
            assert_eq!(MealSlot::from_storage_key(&slot.storage_key()).unwrap(), slot);
        }
        assert_eq!(MealSlot::Extra(3).label(), "Lanche Extra 3");
        assert_eq!(MealSlot::Extra(3).storage_key(), "extra:3");
    }

    #[test]
    fn test_meal_slot_ordering() {
        let mut slots = vec![
            MealSlot::Extra(2),
            MealSlot::Fixed(FixedMeal::Dinner),
            MealSlot::Extra(1),
            MealSlot::Fixed(FixedMeal::Fasting),
        ];
        slots.sort();
        assert_eq!(
            slots,
            vec![
                MealSlot::Fixed(FixedMeal::Fasting),
                MealSlot::Fixed(FixedMeal::Dinner),
                MealSlot::Extra(1),
                MealSlot::Extra(2),
            ]
        );
    }

    #[test]
    fn test_entry_fields_is_empty() {
        assert!(EntryFields::default().is_empty());
        let blank_obs = EntryFields {
            observations: Some("   ".to_string()),
            ..EntryFields::default()
        };
        assert!(blank_obs.is_empty());
        let zero_carbs = EntryFields {
            carbs: Some(0.0),
            ..EntryFields::default()
        };
        assert!(!zero_carbs.is_empty());
    }

    #[test]
    fn test_next_extra_slot() {
        let mut day = DailyData {
            date: "2024-03-01".to_string(),
            glargina: None,
            meals: BTreeMap::new(),
        };
        assert_eq!(day.next_extra_slot().unwrap(), MealSlot::Extra(1));
        day.meals.insert(MealSlot::Extra(3), EntryFields::default());
        day.meals
            .insert(MealSlot::Fixed(FixedMeal::Lunch), EntryFields::default());
        assert_eq!(day.next_extra_slot().unwrap(), MealSlot::Extra(4));
    }

    #[test]
    fn test_next_extra_slot_exhausted() {
        let mut day = DailyData {
            date: "2024-03-01".to_string(),
            glargina: None,
            meals: BTreeMap::new(),
        };
        day.meals.insert(MealSlot::Extra(u32::MAX), EntryFields::default());
        let err = day.next_extra_slot().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_parse_iso_date_requires_padding() {
        assert!(parse_iso_date("2024-03-01").is_ok());
        assert!(parse_iso_date("2024-3-1").is_err());
        assert!(parse_iso_date("2024-03-1").is_err());
        assert!(parse_iso_date("2024-02-30").is_err());
    }

    #[test]
    fn test_insulin_dose() {
        let dose = insulin_dose(60.0, 200.0, 100.0, 15.0, 50.0).unwrap();
        assert!((dose.carb_bolus - 4.0).abs() < 1e-9);
        assert!((dose.correction_bolus - 2.0).abs() < 1e-9);
        assert!((dose.total - 6.0).abs() < 1e-9);

        // Below target lowers the total
        let dose = insulin_dose(30.0, 80.0, 100.0, 10.0, 40.0).unwrap();
        assert!((dose.correction_bolus + 0.5).abs() < 1e-9);
        assert!((dose.total - 2.5).abs() < 1e-9);

        assert!(insulin_dose(60.0, 200.0, 100.0, 0.0, 50.0).is_err());
        assert!(insulin_dose(60.0, 200.0, -1.0, 15.0, 50.0).is_err());
        assert!(insulin_dose(60.0, 200.0, 0.0, 15.0, 50.0).is_ok());
    }

    #[test]
    fn test_insulin_sensitivity_factor() {
        let isf = insulin_sensitivity_factor(40.0).unwrap();
        assert!((isf - 45.0).abs() < 1e-9);
        assert!(insulin_sensitivity_factor(0.0).is_err());
        assert!(insulin_sensitivity_factor(-3.0).is_err());
    }

    #[test]
    fn test_parse_calculator_input_accepts_comma() {
        assert!((parse_calculator_input("12,5", "x").unwrap() - 12.5).abs() < 1e-9);
        assert!(parse_calculator_input("", "x").is_err());
        assert!(parse_calculator_input("abc", "x").is_err());
    }

    #[test]
    fn test_calculators_reject_non_finite() {
        for raw in ["NaN", "inf", "-inf", "infinity"] {
            assert!(parse_calculator_input(raw, "x").is_err(), "{raw}");
        }
        assert!(insulin_dose(60.0, 150.0, 100.0, f64::NAN, 50.0).is_err());
        assert!(insulin_dose(60.0, 150.0, f64::NAN, 10.0, 50.0).is_err());
        assert!(insulin_sensitivity_factor(f64::NAN).is_err());
        assert!(insulin_sensitivity_factor(f64::INFINITY).is_err());
    }

    #[test]
    fn test_day_form_deserializes_meal_labels() {
        let json = r#"{
            "glargina": "20",
            "meals": {
                "Almoço": {"carbs": "50", "glucose": "120"},
                "Lanche Extra 1": {"observations": "fruta"}
            }
        }"#;
        let form: DayForm = serde_json::from_str(json).unwrap();
        assert_eq!(form.glargina, "20");
        assert_eq!(form.meals.len(), 2);
        let lunch = &form.meals[&MealSlot::Fixed(FixedMeal::Lunch)];
        assert_eq!(lunch.carbs, "50");
        assert_eq!(lunch.lispro, "");
        assert_eq!(form.meals[&MealSlot::Extra(1)].observations, "fruta");
    }
}
