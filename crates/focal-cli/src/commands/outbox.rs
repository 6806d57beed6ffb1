use std::path::Path;

use crate::commands::common::{format_outbox_lines, open_local_service};
use crate::error::CliError;

pub async fn run_outbox_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let service = open_local_service(db_path).await?;
    let entries = service.outbox_entries();

    if as_json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Outbox is empty.");
        return Ok(());
    }

    for line in format_outbox_lines(entries) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_outbox_count(db_path: &Path) -> Result<(), CliError> {
    let service = open_local_service(db_path).await?;
    println!("{}", service.outbox_count());
    Ok(())
}

pub async fn run_outbox_clear(db_path: &Path) -> Result<(), CliError> {
    let mut service = open_local_service(db_path).await?;
    let dropped = service.outbox_count();
    service.clear_outbox().await;
    println!("Dropped {dropped} pending mutation(s)");
    Ok(())
}
