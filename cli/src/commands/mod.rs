mod backup;
mod calc;
mod day;
mod helpers;
mod report;
mod settings;
mod summary;

pub(crate) use backup::{cmd_backup, cmd_restore};
pub(crate) use calc::{cmd_calc_insulin, cmd_calc_isf};
pub(crate) use day::{MealFlags, cmd_day_save, cmd_day_show, cmd_glargina, cmd_log, cmd_remove};
pub(crate) use report::cmd_report;
pub(crate) use settings::{cmd_config_reset, cmd_config_set, cmd_config_show};
pub(crate) use summary::{cmd_daily, cmd_totals};
