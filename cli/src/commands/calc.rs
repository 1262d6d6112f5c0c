use anyhow::Result;

use carblog_core::models::{insulin_dose, insulin_sensitivity_factor, parse_calculator_input};

pub(crate) fn cmd_calc_insulin(
    carbs: &str,
    current: &str,
    target: &str,
    ratio: &str,
    isf: &str,
    json: bool,
) -> Result<()> {
    let dose = insulin_dose(
        parse_calculator_input(carbs, "Carboidratos (g)")?,
        parse_calculator_input(current, "Glicemia Atual (mg/dL)")?,
        parse_calculator_input(target, "Glicemia Alvo (mg/dL)")?,
        parse_calculator_input(ratio, "Relação Carboidrato/Insulina")?,
        parse_calculator_input(isf, "Fator de Sensibilidade à Insulina")?,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&dose)?);
    } else {
        println!("Total insulin needed: {:.1} UI", dose.total);
        println!(
            "  (carb bolus: {:.1} UI, correction bolus: {:.1} UI)",
            dose.carb_bolus, dose.correction_bolus
        );
    }
    Ok(())
}

pub(crate) fn cmd_calc_isf(total_daily_insulin: &str, json: bool) -> Result<()> {
    let tdi = parse_calculator_input(total_daily_insulin, "Insulina Total Diária")?;
    let isf = insulin_sensitivity_factor(tdi)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "total_daily_insulin": tdi, "isf": isf })
        );
    } else {
        println!("Insulin sensitivity factor (1800 rule): {isf:.1} mg/dL/UI");
    }
    Ok(())
}
