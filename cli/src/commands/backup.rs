use anyhow::Result;
use std::path::Path;
use std::process;

use carblog_core::error::TrackerError;

use crate::config::Session;

use super::helpers::json_error;

fn exit_not_found(path: &Path, json: bool) -> ! {
    let message = format!("File not found: {}", path.display());
    if json {
        println!("{}", json_error(&message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn cmd_backup(session: &mut Session, destination: &Path, json: bool) -> Result<()> {
    let source = session.db_path.clone();
    match session.service.create_backup(&source, destination) {
        Ok(message) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "backup": destination.display().to_string() })
                );
            } else {
                println!("{message}");
            }
            Ok(())
        }
        Err(TrackerError::NotFound(path)) => exit_not_found(&path, json),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn cmd_restore(session: &mut Session, source: &Path, json: bool) -> Result<()> {
    let destination = session.db_path.clone();
    match session.service.restore_backup(source, &destination) {
        Ok(message) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "restored": source.display().to_string() })
                );
            } else {
                println!("{message}");
            }
            Ok(())
        }
        Err(TrackerError::NotFound(path)) => exit_not_found(&path, json),
        Err(e) => Err(e.into()),
    }
}
