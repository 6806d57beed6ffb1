use std::path::Path;

use crate::commands::common::open_remote_service;
use crate::error::CliError;

pub async fn run_flush(db_path: &Path) -> Result<(), CliError> {
    let mut remote = open_remote_service(db_path).await?;
    if remote.service.outbox_count() == 0 {
        println!("Nothing to flush.");
        return Ok(());
    }

    let report = remote.service.flush_outbox(Some(&remote.session)).await?;
    println!(
        "Pushed {} mutation(s), {} failed",
        report.pushed, report.failed
    );
    if report.failed > 0 {
        println!("Failed mutations stay queued; run `focal outbox list` for details.");
    }
    Ok(())
}
