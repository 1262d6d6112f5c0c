use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;

use carblog_core::models::parse_iso_date;
use carblog_core::report::{build_day_reports, period_totals, write_csv};

use crate::config::Session;

use super::helpers::{fmt_opt, parse_iso, print_meal_table};

pub(crate) fn cmd_report(
    session: &Session,
    start: Option<String>,
    end: Option<String>,
    csv: Option<&Path>,
    json: bool,
) -> Result<()> {
    let start = parse_iso(start)?;
    let end = parse_iso(end)?;
    let data = session.service.get_report_data(&start, &end)?;
    let days = build_day_reports(&data);

    if let Some(path) = csv {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        write_csv(file, &days)?;
        if json {
            println!(
                "{}",
                serde_json::json!({ "written": path.display().to_string(), "days": days.len() })
            );
        } else {
            println!("Report written to {}", path.display());
        }
        return Ok(());
    }

    let totals = period_totals(&data);
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "start": start,
                "end": end,
                "days": days,
                "totals": totals,
            }))?
        );
        return Ok(());
    }

    let settings = &session.settings;
    println!(
        "Report {} to {}\n",
        settings.format_report_date(parse_iso_date(&start)?),
        settings.format_report_date(parse_iso_date(&end)?)
    );

    for day in &days {
        println!(
            "Date: {}",
            settings.format_report_date(parse_iso_date(&day.date)?)
        );
        if day.entries.is_empty() {
            println!("  No meals recorded for this day.");
        } else {
            print_meal_table(
                day.entries.iter().map(|e| (&e.meal, &e.fields)),
                Some(settings.glucose_alert_threshold),
            );
        }
        match day.glargina {
            Some(dose) => println!("  Glargina: {dose:.1} UI"),
            None => println!("  Glargina: N/A"),
        }
        println!(
            "  Day totals: carbs {:.1} g | avg glucose {:.1} mg/dL | lispro {:.1} UI | bolus {:.1} UI\n",
            day.carbs, day.avg_glucose, day.lispro, day.bolus
        );
    }

    println!("Period totals");
    println!("  Carbs:              {:.1} g", totals.carbs);
    println!("  Average glucose:    {:.1} mg/dL", totals.avg_glucose);
    println!("  Lispro total:       {:.1} UI", totals.lispro);
    println!("  Correction total:   {:.1} UI", totals.bolus);
    println!(
        "  Glargina daily avg: {} UI",
        fmt_opt(Some(totals.avg_glargina))
    );

    Ok(())
}
