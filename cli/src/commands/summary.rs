use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use carblog_core::models::parse_iso_date;

use crate::config::Session;

use super::helpers::{fmt_opt, no_neg_zero, parse_iso};

pub(crate) fn cmd_totals(
    session: &Session,
    start: Option<String>,
    end: Option<String>,
    json: bool,
) -> Result<()> {
    let start = parse_iso(start)?;
    let end = parse_iso(end)?;
    let totals = session.service.calculate_period_totals(&start, &end)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&totals)?);
        return Ok(());
    }

    let settings = &session.settings;
    let from = settings.format_report_date(parse_iso_date(&start)?);
    let to = settings.format_report_date(parse_iso_date(&end)?);
    println!("=== {from} to {to} ===\n");

    let carbs = no_neg_zero(totals.carbs);
    let avg_g = no_neg_zero(totals.avg_glucose);
    let lispro = no_neg_zero(totals.lispro);
    let bolus = no_neg_zero(totals.bolus);
    let avg_glargina = no_neg_zero(totals.avg_glargina);
    println!("  Carbs:              {carbs:.1} g");
    println!("  Average glucose:    {avg_g:.1} mg/dL");
    println!("  Lispro total:       {lispro:.1} UI");
    println!("  Correction total:   {bolus:.1} UI");
    println!("  Glargina daily avg: {avg_glargina:.1} UI");

    Ok(())
}

pub(crate) fn cmd_daily(
    session: &Session,
    start: Option<String>,
    end: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct DailyRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Carbs (g)")]
        carbs: String,
        #[tabled(rename = "Avg glucose")]
        glucose: String,
        #[tabled(rename = "Glargina (UI)")]
        glargina: String,
    }

    let start = parse_iso(start)?;
    let end = parse_iso(end)?;
    let days = session.service.get_daily_aggregated_data(&start, &end)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&days)?);
        return Ok(());
    }

    if days.is_empty() {
        eprintln!("Empty range: {start} is after {end}");
        process::exit(2);
    }

    let settings = &session.settings;
    let rows = days
        .iter()
        .map(|(date, agg)| {
            let carbs = no_neg_zero(agg.carbs);
            Ok(DailyRow {
                date: settings.format_report_date(parse_iso_date(date)?),
                carbs: format!("{carbs:.1}"),
                glucose: fmt_opt(agg.glucose),
                glargina: fmt_opt(agg.glargina),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
