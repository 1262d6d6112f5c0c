mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    MealFlags, cmd_backup, cmd_calc_insulin, cmd_calc_isf, cmd_config_reset, cmd_config_set,
    cmd_config_show, cmd_daily, cmd_day_save, cmd_day_show, cmd_glargina, cmd_log, cmd_remove,
    cmd_report, cmd_restore, cmd_totals,
};
use crate::config::{Config, Session};

#[derive(Parser)]
#[command(
    name = "carblog",
    version,
    about = "A diabetes diary: carbs, glucose and insulin per meal",
    long_about = "Record carbohydrates, glucose readings and insulin doses per meal, \
                  the daily glargina dose, and summarize any date range."
)]
struct Cli {
    /// Database file (overrides the configured location)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log debug output to stderr (`RUST_LOG` takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or save a whole day
    Day {
        #[command(subcommand)]
        command: DayCommands,
    },
    /// Log or update one meal (unset flags keep stored values, "" clears)
    Log {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: String,
        /// Meal label ("Almoço", "Jantar", ...), "extra" for a new extra snack, or "extra N"
        meal: String,
        /// Carbohydrates in grams
        #[arg(long)]
        carbs: Option<String>,
        /// Glucose reading in mg/dL
        #[arg(long)]
        glucose: Option<String>,
        /// Lispro (meal) insulin units
        #[arg(long)]
        lispro: Option<String>,
        /// Correction bolus units
        #[arg(long)]
        bolus: Option<String>,
        /// Free-text observations
        #[arg(long = "obs")]
        observations: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the daily glargina dose (omit DOSE to clear it)
    Glargina {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: String,
        /// Dose in units
        dose: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove one meal entry
    Remove {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: String,
        /// Meal label or "extra N"
        meal: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Totals and averages over a date range
    Totals {
        /// First day (inclusive)
        start: String,
        /// Last day (inclusive, default: today)
        end: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Per-day carbs, average glucose and glargina over a date range
    Daily {
        /// First day (inclusive)
        start: String,
        /// Last day (inclusive, default: today)
        end: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Detailed report for a date range
    Report {
        /// First day (inclusive)
        start: String,
        /// Last day (inclusive, default: today)
        end: Option<String>,
        /// Write the report as CSV to this file
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy the database file to DEST
    Backup {
        /// Destination file
        destination: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace the database file with SOURCE
    Restore {
        /// Backup file to restore
        source: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Dosing calculators
    Calc {
        #[command(subcommand)]
        command: CalcCommands,
    },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum DayCommands {
    /// Show all meals and the glargina dose for a date (default: today)
    Show {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace a whole day from a JSON form
    Save {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: String,
        /// Form file (`-` for stdin)
        #[arg(short, long)]
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CalcCommands {
    /// Meal insulin dose from carbs and current glucose
    Insulin {
        /// Carbohydrates in grams
        #[arg(long)]
        carbs: String,
        /// Current glucose in mg/dL
        #[arg(long)]
        current: String,
        /// Target glucose in mg/dL
        #[arg(long)]
        target: String,
        /// Grams of carbs covered by one unit
        #[arg(long)]
        ratio: String,
        /// Insulin sensitivity factor in mg/dL per unit
        #[arg(long)]
        isf: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Insulin sensitivity factor from total daily insulin (1800 rule)
    Fsi {
        /// Total daily insulin in units
        tdi: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change one or more settings
    Set {
        /// strftime pattern for report dates (e.g. "%d/%m/%Y")
        #[arg(long)]
        date_format: Option<String>,
        /// Glucose readings at or above this value are flagged
        #[arg(long)]
        glucose_alert: Option<f64>,
        /// Database location override ("" clears it)
        #[arg(long)]
        db_location: Option<String>,
        /// UI theme name
        #[arg(long)]
        theme: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore default settings
    Reset {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        // Calculators never touch the data directory
        Commands::Calc { command } => run_calc(command),
        command => {
            let config = Config::load(cli.config, cli.db)?;
            let mut session = Session::open(config)?;
            run_with_session(&mut session, command)
        }
    }
}

fn run_calc(command: CalcCommands) -> Result<()> {
    match command {
        CalcCommands::Insulin {
            carbs,
            current,
            target,
            ratio,
            isf,
            json,
        } => cmd_calc_insulin(&carbs, &current, &target, &ratio, &isf, json),
        CalcCommands::Fsi { tdi, json } => cmd_calc_isf(&tdi, json),
    }
}

fn run_with_session(session: &mut Session, command: Commands) -> Result<()> {
    match command {
        Commands::Day { command } => match command {
            DayCommands::Show { date, json } => cmd_day_show(session, date, json),
            DayCommands::Save { date, file, json } => cmd_day_save(session, Some(date), &file, json),
        },
        Commands::Log {
            date,
            meal,
            carbs,
            glucose,
            lispro,
            bolus,
            observations,
            json,
        } => {
            let flags = MealFlags {
                carbs,
                glucose,
                lispro,
                bolus,
                observations,
            };
            cmd_log(session, Some(date), &meal, flags, json)
        }
        Commands::Glargina { date, dose, json } => cmd_glargina(session, Some(date), dose, json),
        Commands::Remove { date, meal, json } => cmd_remove(session, Some(date), &meal, json),
        Commands::Totals { start, end, json } => cmd_totals(session, Some(start), end, json),
        Commands::Daily { start, end, json } => cmd_daily(session, Some(start), end, json),
        Commands::Report {
            start,
            end,
            csv,
            json,
        } => cmd_report(session, Some(start), end, csv.as_deref(), json),
        Commands::Backup { destination, json } => cmd_backup(session, &destination, json),
        Commands::Restore { source, json } => cmd_restore(session, &source, json),
        Commands::Config { command } => match command {
            ConfigCommands::Show { json } => cmd_config_show(session, json),
            ConfigCommands::Set {
                date_format,
                glucose_alert,
                db_location,
                theme,
                json,
            } => cmd_config_set(
                session,
                date_format,
                glucose_alert,
                db_location,
                theme,
                json,
            ),
            ConfigCommands::Reset { json } => cmd_config_reset(session, json),
        },
        Commands::Calc { command } => run_calc(command),
    }
}
